//! The resolver entry points.

use std::sync::Arc;

use modweave_types::{
    CapabilityIndex, Requirement, Resource, ResourceKey, Wiring, WiringMap,
};

use crate::config::ResolverConfig;
use crate::error::ResolveError;
use crate::hooks::{DefaultResolverHook, PermissionCheck, ResolverHook};
use crate::process::{DynamicRequest, ResolveProcess};
use crate::report::ResolutionReport;
use crate::solve::ConstraintSolver;
use crate::token::ResolveToken;

/// The immutable wiring delta produced by one resolve operation: new or
/// extended wirings per resource, to be merged into the live graph under the
/// caller's synchronization.
#[derive(Debug, Default)]
pub struct WiringDelta {
    wirings: WiringMap,
}

impl WiringDelta {
    pub(crate) fn new(wirings: WiringMap) -> Self {
        WiringDelta { wirings }
    }

    pub fn get(&self, key: ResourceKey) -> Option<&Arc<Wiring>> {
        self.wirings.get(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResourceKey, &Arc<Wiring>)> {
        self.wirings.iter()
    }

    /// Wirings sorted by resource key, for deterministic output.
    pub fn sorted(&self) -> Vec<&Arc<Wiring>> {
        let mut entries: Vec<_> = self.wirings.values().collect();
        entries.sort_by_key(|w| w.resource().key());
        entries
    }

    pub fn len(&self) -> usize {
        self.wirings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wirings.is_empty()
    }

    /// Merge this delta into a live wiring map.
    pub fn merge_into(&self, wirings: &mut WiringMap) {
        for (key, wiring) in &self.wirings {
            wirings.insert(*key, Arc::clone(wiring));
        }
    }
}

impl From<WiringDelta> for WiringMap {
    fn from(delta: WiringDelta) -> WiringMap {
        delta.wirings
    }
}

/// Result of a resolve operation: the delta plus the diagnostics for
/// everything that did not make it in.
#[derive(Debug)]
pub struct ResolveOutcome {
    pub delta: WiringDelta,
    pub report: ResolutionReport,
}

/// The resolution orchestrator.
///
/// Stateless between operations: each `resolve_delta` call works on its own
/// snapshot copy and disabled/failed sets, so independent resolves may run
/// concurrently on different threads (with distinct [`ResolveToken`]s).
pub struct ModuleResolver {
    config: ResolverConfig,
    index: Arc<dyn CapabilityIndex>,
    solver: Box<dyn ConstraintSolver>,
    hook: Box<dyn ResolverHook>,
    permissions: Option<Box<dyn PermissionCheck>>,
}

impl ModuleResolver {
    pub fn new(index: Arc<dyn CapabilityIndex>, solver: Box<dyn ConstraintSolver>) -> Self {
        ModuleResolver {
            config: ResolverConfig::default(),
            index,
            solver,
            hook: Box::new(DefaultResolverHook),
            permissions: None,
        }
    }

    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_hook(mut self, hook: Box<dyn ResolverHook>) -> Self {
        self.hook = hook;
        self
    }

    pub fn with_permissions(mut self, permissions: Box<dyn PermissionCheck>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    pub(crate) fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub(crate) fn index(&self) -> &dyn CapabilityIndex {
        self.index.as_ref()
    }

    pub(crate) fn solver(&self) -> &dyn ConstraintSolver {
        self.solver.as_ref()
    }

    pub(crate) fn hook(&self) -> &dyn ResolverHook {
        self.hook.as_ref()
    }

    pub(crate) fn permissions(&self) -> Option<&dyn PermissionCheck> {
        self.permissions.as_deref()
    }

    /// Attempt to resolve the given unresolved resources against a snapshot
    /// of current wirings.
    ///
    /// `triggers` are the resources that caused the operation; when
    /// `triggers_mandatory` is set, their failure is a hard error. The
    /// snapshot is only read; the returned delta holds the new or extended
    /// wirings to merge.
    pub fn resolve_delta(
        &self,
        token: &ResolveToken,
        triggers: &[Arc<Resource>],
        triggers_mandatory: bool,
        unresolved: &[Arc<Resource>],
        wirings: &WiringMap,
    ) -> Result<ResolveOutcome, ResolveError> {
        ResolveProcess::new_delta(self, triggers, triggers_mandatory, unresolved, wirings)
            .resolve(token)
    }

    /// Resolve one dynamic package import of an already-resolved resource.
    ///
    /// `requirement` must be a declared dynamic package requirement;
    /// `package` is the concrete package name being requested. Failure to
    /// wire the import is not an error: the outcome simply carries an empty
    /// delta and the diagnostics.
    pub fn resolve_dynamic_delta(
        &self,
        token: &ResolveToken,
        requirement: &Requirement,
        package: &str,
        unresolved: &[Arc<Resource>],
        wirings: &WiringMap,
    ) -> Result<ResolveOutcome, ResolveError> {
        if !requirement.is_dynamic() {
            return Err(ResolveError::NotDynamic(requirement.to_string()));
        }
        let dynamic = DynamicRequest::new(requirement.clone(), package);
        ResolveProcess::new_dynamic(self, dynamic, unresolved, wirings).resolve(token)
    }
}
