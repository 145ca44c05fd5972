//! Shared fixtures for the resolver's unit tests.

use std::sync::Arc;

use modweave_index::ModuleIndex;
use modweave_types::{Resource, ResourceBuilder, Version, Wiring, WiringMap};

use crate::solve::BasicSolver;
use crate::ModuleResolver;

pub(crate) fn v(s: &str) -> Version {
    s.parse().unwrap()
}

/// Install the builders into a fresh index, in order.
pub(crate) fn index_with(
    builders: Vec<ResourceBuilder>,
) -> (Arc<ModuleIndex>, Vec<Arc<Resource>>) {
    let index = Arc::new(ModuleIndex::new());
    let resources = builders
        .into_iter()
        .map(|builder| index.install(builder))
        .collect();
    (index, resources)
}

pub(crate) fn resolver(index: Arc<ModuleIndex>) -> ModuleResolver {
    ModuleResolver::new(index, Box::new(BasicSolver::new()))
}

/// A minimal wiring for an already-resolved resource: its effective
/// declarations and no wires.
pub(crate) fn empty_wiring(resource: &Arc<Resource>) -> Arc<Wiring> {
    Arc::new(Wiring::new(
        Arc::clone(resource),
        resource.capabilities(),
        resource.requirements(),
        Vec::new(),
        Vec::new(),
        Default::default(),
    ))
}

pub(crate) fn snapshot_of(resources: &[&Arc<Resource>]) -> WiringMap {
    resources
        .iter()
        .map(|r| (r.key(), empty_wiring(r)))
        .collect()
}
