//! A deterministic greedy reference solver.
//!
//! `BasicSolver` walks each batch root depth-first, taking candidates in the
//! ranking order the context provides and recursing into unresolved
//! providers, with fallback to the next candidate when a provider cannot
//! resolve. It honors cardinality, optionality, fragment host attachment,
//! and hosted payload wires.
//!
//! It deliberately does *not* check uses constraints; that search is a
//! separately specified algorithm, and any full solver drops in through
//! [`ConstraintSolver`](super::ConstraintSolver). For module sets without
//! class-space conflicts (everything in this workspace's tests and the
//! CLI), the greedy assignment is a valid solution.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::trace;

use modweave_types::namespaces::{
    is_non_payload_capability, is_non_payload_requirement, FRAGMENT, HOST,
};
use modweave_types::{
    Capability, Cardinality, Requirement, Resolution, Resource, ResourceKey, Wire,
};

use super::{ConstraintSolver, ResolveContext, SolveFailure, SolveOutcome};

/// The reference solver. Stateless; all working state lives per call.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicSolver;

impl BasicSolver {
    pub fn new() -> Self {
        BasicSolver
    }
}

impl ConstraintSolver for BasicSolver {
    fn solve(&self, ctx: &mut dyn ResolveContext) -> Result<SolveOutcome, SolveFailure> {
        let mandatory = ctx.mandatory_resources();
        let optional = ctx.optional_resources();
        let mut state = SolveState::new(ctx);
        for resource in &mandatory {
            state.resolve_resource(resource)?;
        }
        for resource in &optional {
            if let Err(failure) = state.resolve_resource(resource) {
                trace!(%resource, %failure, "optional resource dropped");
            }
        }
        Ok(state.into_outcome())
    }

    fn solve_dynamic(
        &self,
        ctx: &mut dyn ResolveContext,
        resource: &Arc<Resource>,
        requirement: &Requirement,
        candidates: Vec<Capability>,
    ) -> Result<SolveOutcome, SolveFailure> {
        let mut state = SolveState::new(ctx);
        for candidate in candidates {
            match state.provider_for(&candidate) {
                Ok(provider) => {
                    let wire = Wire::new(
                        candidate,
                        provider,
                        requirement.clone(),
                        Arc::clone(resource),
                    );
                    state.commit(resource, vec![wire]);
                    return Ok(state.into_outcome());
                }
                Err(failure) => {
                    trace!(%failure, "dynamic candidate unusable");
                }
            }
        }
        Err(SolveFailure::new(
            format!("no resolvable provider for dynamic requirement {requirement}"),
            Some(requirement.clone()),
        ))
    }
}

struct ResolvedEntry {
    resource: Arc<Resource>,
    wires: Vec<Wire>,
}

struct SolveState<'c> {
    ctx: &'c mut dyn ResolveContext,
    resolved: HashMap<ResourceKey, ResolvedEntry>,
    /// Commit order, for deterministic output.
    order: Vec<ResourceKey>,
    in_progress: HashSet<ResourceKey>,
    failed: HashSet<ResourceKey>,
}

impl<'c> SolveState<'c> {
    fn new(ctx: &'c mut dyn ResolveContext) -> Self {
        SolveState {
            ctx,
            resolved: HashMap::new(),
            order: Vec::new(),
            in_progress: HashSet::new(),
            failed: HashSet::new(),
        }
    }

    fn is_done(&self, key: ResourceKey) -> bool {
        self.ctx.is_resolved(key) || self.resolved.contains_key(&key)
    }

    fn resolve_resource(&mut self, resource: &Arc<Resource>) -> Result<(), SolveFailure> {
        let key = resource.key();
        // Dependency cycles are legal in a module graph: a resource already
        // being resolved counts as available.
        if self.is_done(key) || self.in_progress.contains(&key) {
            return Ok(());
        }
        if self.failed.contains(&key) {
            return Err(SolveFailure::new(
                format!("{resource} already failed in this solve"),
                None,
            ));
        }
        self.in_progress.insert(key);
        let result = if resource.is_fragment() {
            self.resolve_fragment(resource)
        } else {
            self.resolve_module(resource)
        };
        self.in_progress.remove(&key);
        match result {
            Ok(wires) => {
                self.commit(resource, wires);
                if !resource.is_fragment() && resource.host_capability().is_some() {
                    // Pull in fragments targeting this freshly resolved
                    // host; attachment failures just skip the fragment.
                    for fragment in self.ctx.on_demand_fragments(resource) {
                        self.try_attach_fragment(&fragment, resource);
                    }
                }
                Ok(())
            }
            Err(failure) => {
                trace!(%resource, %failure, "resource failed to resolve");
                self.failed.insert(key);
                Err(failure)
            }
        }
    }

    fn resolve_module(&mut self, resource: &Arc<Resource>) -> Result<Vec<Wire>, SolveFailure> {
        let mut wires = Vec::new();
        for requirement in resource.requirements() {
            if !self.ctx.is_effective(&requirement) || requirement.is_dynamic() {
                continue;
            }
            wires.extend(self.resolve_requirement(&requirement, resource)?);
        }
        Ok(wires)
    }

    /// A fragment root: wire its host and execution-environment
    /// requirements as its own, then resolve its payload requirements as
    /// hosted requirements of each wired host.
    fn resolve_fragment(&mut self, fragment: &Arc<Resource>) -> Result<Vec<Wire>, SolveFailure> {
        let mut own_wires = Vec::new();
        let mut hosts: Vec<Arc<Resource>> = Vec::new();

        for requirement in fragment.requirements() {
            if !self.ctx.is_effective(&requirement) || requirement.is_dynamic() {
                continue;
            }
            if requirement.namespace() == HOST {
                let candidates = self.ctx.find_providers(&requirement);
                let mut matched = false;
                for candidate in candidates {
                    let host = Arc::clone(candidate.resource());
                    if self.resolve_resource(&host).is_err() {
                        continue;
                    }
                    own_wires.push(Wire::new(
                        candidate,
                        Arc::clone(&host),
                        requirement.clone(),
                        Arc::clone(fragment),
                    ));
                    hosts.push(host);
                    matched = true;
                    if requirement.cardinality() == Cardinality::Single {
                        break;
                    }
                }
                if !matched && requirement.resolution() == Resolution::Mandatory {
                    return Err(SolveFailure::new(
                        format!("no resolvable host for {fragment}"),
                        Some(requirement.clone()),
                    ));
                }
            } else if is_non_payload_requirement(requirement.namespace()) {
                own_wires.extend(self.resolve_requirement(&requirement, fragment)?);
            }
            // Payload requirements are hosted, handled per host below.
        }

        for host in &hosts {
            let payload = self.resolve_payload(fragment, host)?;
            self.commit(host, payload);
        }
        Ok(own_wires)
    }

    /// Resolve a fragment's payload requirements with the host as requirer.
    fn resolve_payload(
        &mut self,
        fragment: &Arc<Resource>,
        host: &Arc<Resource>,
    ) -> Result<Vec<Wire>, SolveFailure> {
        let mut wires = Vec::new();
        for requirement in fragment.requirements() {
            if is_non_payload_requirement(requirement.namespace()) {
                continue;
            }
            if !self.ctx.is_effective(&requirement) || requirement.is_dynamic() {
                continue;
            }
            wires.extend(self.resolve_requirement(&requirement, host)?);
        }
        Ok(wires)
    }

    /// Attach an on-demand fragment to a host resolved in this solve. Any
    /// failure skips the fragment without failing the host.
    fn try_attach_fragment(&mut self, fragment: &Arc<Resource>, host: &Arc<Resource>) {
        let key = fragment.key();
        if self.is_done(key) || self.in_progress.contains(&key) || self.failed.contains(&key) {
            return;
        }
        let Some(host_capability) = host.host_capability() else {
            return;
        };
        let host_requirements = fragment.requirements_in(HOST);
        let Some(host_requirement) = host_requirements.first() else {
            return;
        };
        if !host_requirement.matches(&host_capability) {
            return;
        }

        self.in_progress.insert(key);
        let attachment = self.resolve_on_demand_content(fragment, host);
        self.in_progress.remove(&key);

        match attachment {
            Ok((own_wires, payload_wires)) => {
                let mut wires = vec![Wire::new(
                    host_capability,
                    Arc::clone(host),
                    host_requirement.clone(),
                    Arc::clone(fragment),
                )];
                wires.extend(own_wires);
                self.commit(fragment, wires);
                self.commit(host, payload_wires);
            }
            Err(failure) => {
                trace!(%fragment, %host, %failure, "on-demand fragment skipped");
            }
        }
    }

    /// Non-host own wires plus hosted payload wires for an on-demand
    /// attachment.
    #[allow(clippy::type_complexity)]
    fn resolve_on_demand_content(
        &mut self,
        fragment: &Arc<Resource>,
        host: &Arc<Resource>,
    ) -> Result<(Vec<Wire>, Vec<Wire>), SolveFailure> {
        let mut own_wires = Vec::new();
        for requirement in fragment.requirements() {
            if requirement.namespace() == HOST
                || !self.ctx.is_effective(&requirement)
                || requirement.is_dynamic()
            {
                continue;
            }
            if is_non_payload_requirement(requirement.namespace()) {
                own_wires.extend(self.resolve_requirement(&requirement, fragment)?);
            }
        }
        let payload_wires = self.resolve_payload(fragment, host)?;
        Ok((own_wires, payload_wires))
    }

    /// Wire one requirement for `requirer`, walking candidates in rank
    /// order with fallback.
    fn resolve_requirement(
        &mut self,
        requirement: &Requirement,
        requirer: &Arc<Resource>,
    ) -> Result<Vec<Wire>, SolveFailure> {
        let candidates = self.ctx.find_providers(requirement);
        let mut wires = Vec::new();
        for candidate in candidates {
            // Best candidate is the requirer's own capability: the
            // requirement is satisfied internally, without a wire.
            if candidate.resource().key() == requirer.key() {
                match requirement.cardinality() {
                    Cardinality::Single => {
                        if wires.is_empty() {
                            return Ok(wires);
                        }
                        break;
                    }
                    Cardinality::Multiple => continue,
                }
            }
            match self.provider_for(&candidate) {
                Ok(provider) => {
                    wires.push(Wire::new(
                        candidate,
                        provider,
                        requirement.clone(),
                        Arc::clone(requirer),
                    ));
                    if requirement.cardinality() == Cardinality::Single {
                        return Ok(wires);
                    }
                }
                Err(failure) => {
                    trace!(%failure, "candidate unusable, trying next");
                }
            }
        }
        if wires.is_empty() && requirement.resolution() == Resolution::Mandatory {
            return Err(SolveFailure::new(
                format!("no resolvable provider for {requirement}"),
                Some(requirement.clone()),
            ));
        }
        Ok(wires)
    }

    /// The effective provider of a candidate capability: the declaring
    /// resource, or its host when the capability is fragment payload.
    fn provider_for(&mut self, candidate: &Capability) -> Result<Arc<Resource>, SolveFailure> {
        let declaring = Arc::clone(candidate.resource());
        let hosted = declaring.is_fragment()
            && candidate.namespace() != FRAGMENT
            && !is_non_payload_capability(candidate.namespace());
        if !hosted {
            self.resolve_resource(&declaring)?;
            return Ok(declaring);
        }

        self.resolve_resource(&declaring)?;
        if let Some(entry) = self.resolved.get(&declaring.key()) {
            if let Some(host_wire) = entry
                .wires
                .iter()
                .find(|w| w.requirement().namespace() == HOST)
            {
                return Ok(Arc::clone(host_wire.provider()));
            }
        }
        if let Some(wiring) = self.ctx.wiring_of(declaring.key()) {
            if let Some(host_wire) = wiring
                .required_wires()
                .iter()
                .find(|w| w.requirement().namespace() == HOST)
            {
                return Ok(Arc::clone(host_wire.provider()));
            }
        }
        Err(SolveFailure::new(
            format!("fragment {declaring} is not attached to a host"),
            None,
        ))
    }

    fn commit(&mut self, resource: &Arc<Resource>, wires: Vec<Wire>) {
        match self.resolved.entry(resource.key()) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                entry.get_mut().wires.extend(wires)
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(ResolvedEntry {
                    resource: Arc::clone(resource),
                    wires,
                });
                self.order.push(resource.key());
            }
        }
    }

    fn into_outcome(mut self) -> SolveOutcome {
        let mut wires = Vec::with_capacity(self.order.len());
        for key in &self.order {
            if let Some(entry) = self.resolved.remove(key) {
                wires.push((entry.resource, entry.wires));
            }
        }
        SolveOutcome {
            wires,
            uses_violations: Vec::new(),
        }
    }
}
