//! The constraint-solver collaborator contract.
//!
//! The orchestrator delegates the actual consistent-assignment search to an
//! implementation of [`ConstraintSolver`]. The contract is narrow: the
//! solver sees the batch in flight through a [`ResolveContext`] (ranked
//! candidates, current wirings, on-demand fragments) and returns per-resource
//! wire lists, or a failure for the unsatisfiable-mandatory case.
//!
//! [`BasicSolver`] is a complete deterministic reference implementation; a
//! full uses-constraint solver drops in through the same trait.

mod basic;

pub use basic::BasicSolver;

use std::cmp::Ordering;
use std::sync::Arc;

use thiserror::Error;

use modweave_types::{Capability, Requirement, Resource, ResourceKey, Wire, Wiring};

/// What the orchestrator exposes to the solver for one batch.
///
/// Candidate lookup runs the full filter pipeline and records diagnostics as
/// a side effect, which is why it takes `&mut self`.
pub trait ResolveContext {
    /// Ranked, filtered candidates for a requirement.
    fn find_providers(&mut self, requirement: &Requirement) -> Vec<Capability>;

    /// Whether the requirement applies at resolve time.
    fn is_effective(&self, requirement: &Requirement) -> bool;

    /// The current wiring of a resource, including interim results from
    /// earlier batches of the same operation.
    fn wiring_of(&self, key: ResourceKey) -> Option<Arc<Wiring>>;

    /// True when the resource is wired in the current view.
    fn is_resolved(&self, key: ResourceKey) -> bool;

    /// Root resources of the batch that must resolve. Empty during an
    /// optional batch.
    fn mandatory_resources(&self) -> Vec<Arc<Resource>>;

    /// Root resources of the batch that may resolve. Empty during a
    /// mandatory batch.
    fn optional_resources(&self) -> Vec<Arc<Resource>>;

    /// Enabled fragments targeting the given host, found through the
    /// metadata index.
    fn on_demand_fragments(&mut self, host: &Arc<Resource>) -> Vec<Arc<Resource>>;

    /// The candidate ranking used to break ties, identical to the order
    /// `find_providers` returns.
    fn rank(&self, a: &Capability, b: &Capability) -> Ordering;
}

/// Successful solver output.
#[derive(Debug, Default)]
pub struct SolveOutcome {
    /// Wires per resolved resource, requirer-side, in resolution order.
    /// Every resource the solver resolved has an entry, even when it needed
    /// no wires.
    pub wires: Vec<(Arc<Resource>, Vec<Wire>)>,
    /// Resources dropped from the result because of a class-space
    /// consistency conflict, with the solver's explanation.
    pub uses_violations: Vec<(Arc<Resource>, String)>,
}

/// The solver could not satisfy a mandatory resource.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct SolveFailure {
    pub message: String,
    /// The unsatisfiable requirement, when one can be named.
    pub requirement: Option<Requirement>,
}

impl SolveFailure {
    pub fn new(message: String, requirement: Option<Requirement>) -> Self {
        SolveFailure {
            message,
            requirement,
        }
    }
}

/// The solving collaborator.
pub trait ConstraintSolver: Send + Sync {
    /// Resolve the batch exposed by the context.
    fn solve(&self, ctx: &mut dyn ResolveContext) -> Result<SolveOutcome, SolveFailure>;

    /// Resolve a single dynamic package requirement of an already-resolved
    /// resource against the given pre-filtered candidates.
    fn solve_dynamic(
        &self,
        ctx: &mut dyn ResolveContext,
        resource: &Arc<Resource>,
        requirement: &Requirement,
        candidates: Vec<Capability>,
    ) -> Result<SolveOutcome, SolveFailure>;
}
