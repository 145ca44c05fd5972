//! Shared fixtures for cross-crate resolution scenario tests.

use std::sync::Arc;

use modweave_index::ModuleIndex;
use modweave_resolver::{
    BasicSolver, ModuleResolver, ResolveError, ResolveOutcome, ResolveToken, ResolverConfig,
    ResolverHook,
};
use modweave_types::{Resource, ResourceBuilder, Version, WiringMap};

/// An index plus the resolver wired against it.
pub struct Harness {
    pub index: Arc<ModuleIndex>,
    resolver: ModuleResolver,
    token: ResolveToken,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ResolverConfig::default())
    }

    pub fn with_config(config: ResolverConfig) -> Self {
        let index = Arc::new(ModuleIndex::new());
        let shared: Arc<dyn modweave_types::CapabilityIndex> = index.clone();
        let resolver =
            ModuleResolver::new(shared, Box::new(BasicSolver::new())).with_config(config);
        Harness {
            index,
            resolver,
            token: ResolveToken::new(),
        }
    }

    pub fn with_hook(config: ResolverConfig, hook: Box<dyn ResolverHook>) -> Self {
        let index = Arc::new(ModuleIndex::new());
        let shared: Arc<dyn modweave_types::CapabilityIndex> = index.clone();
        let resolver = ModuleResolver::new(shared, Box::new(BasicSolver::new()))
            .with_config(config)
            .with_hook(hook);
        Harness {
            index,
            resolver,
            token: ResolveToken::new(),
        }
    }

    pub fn install(&self, builder: ResourceBuilder) -> Arc<Resource> {
        self.index.install(builder)
    }

    pub fn resolver(&self) -> &ModuleResolver {
        &self.resolver
    }

    pub fn token(&self) -> &ResolveToken {
        &self.token
    }

    /// Resolve with the given triggers against a snapshot; all installed
    /// but unwired resources count as unresolved.
    pub fn resolve(
        &self,
        triggers: &[Arc<Resource>],
        triggers_mandatory: bool,
        wirings: &WiringMap,
    ) -> Result<ResolveOutcome, ResolveError> {
        let unresolved: Vec<Arc<Resource>> = self
            .index
            .resources()
            .into_iter()
            .filter(|r| !wirings.contains_key(&r.key()))
            .collect();
        self.resolver
            .resolve_delta(&self.token, triggers, triggers_mandatory, &unresolved, wirings)
    }

    /// Resolve exactly the given resources (as both triggers and the
    /// unresolved set) against a snapshot.
    pub fn resolve_scoped(
        &self,
        resources: &[Arc<Resource>],
        wirings: &WiringMap,
    ) -> Result<ResolveOutcome, ResolveError> {
        self.resolver
            .resolve_delta(&self.token, resources, false, resources, wirings)
    }

    /// Resolve everything and merge the delta into the snapshot.
    pub fn resolve_and_merge(&self, wirings: &mut WiringMap) -> ResolveOutcome {
        let triggers = self.index.resources();
        let outcome = self
            .resolve(&triggers, false, wirings)
            .expect("non-mandatory resolve cannot fail hard");
        outcome.delta.merge_into(wirings);
        outcome
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

pub fn v(s: &str) -> Version {
    s.parse().expect("test version must parse")
}
