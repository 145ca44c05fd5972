//! # In-memory capability index
//!
//! The resolver's metadata-index collaborator: stores installed resources
//! and answers capability lookups by namespace and filter.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ModuleIndex`] | Thread-safe registry of installed resources with namespace-bucketed capability lookup |
//! | [`descriptor::ResourceDescriptor`] | Serde form of a module declaration, for JSON module sets |
//!
//! Install order is the index's contract: module ids are assigned
//! monotonically, lookups return capabilities in install order (then
//! declaration order), and updating a module creates a new *revision* of the
//! same module id rather than a new id.

pub mod descriptor;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use modweave_types::{Capability, CapabilityIndex, Query, Resource, ResourceBuilder, ResourceKey};

pub use descriptor::{load_set, CapabilityDecl, RequirementDecl, ResourceDescriptor};

#[derive(Default)]
struct Inner {
    next_module: u64,
    /// Install order, including every live revision.
    resources: Vec<Arc<Resource>>,
    /// Highest revision installed per module id.
    latest_revision: HashMap<u64, u32>,
    /// Namespace -> capability handles, in install/declaration order.
    by_namespace: HashMap<String, Vec<Capability>>,
}

impl Inner {
    fn add(&mut self, resource: &Arc<Resource>) {
        self.resources.push(Arc::clone(resource));
        for capability in resource.capabilities() {
            self.by_namespace
                .entry(capability.namespace().to_string())
                .or_default()
                .push(capability);
        }
    }
}

/// Thread-safe in-memory registry of installed resources.
///
/// All methods take `&self`; interior mutability makes the index shareable
/// as `Arc<ModuleIndex>` between the caller and the resolver. Lookups clone
/// handles out and never hold the lock across resolver calls.
#[derive(Default)]
pub struct ModuleIndex {
    inner: RwLock<Inner>,
}

impl ModuleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new module, assigning the next module id.
    pub fn install(&self, builder: ResourceBuilder) -> Arc<Resource> {
        let mut inner = self.inner.write();
        let module = inner.next_module;
        inner.next_module += 1;
        let resource = builder.build(module);
        inner.latest_revision.insert(module, 0);
        inner.add(&resource);
        resource
    }

    /// Install a new revision (generation) of an existing module.
    ///
    /// The previous revision stays installed until explicitly removed, which
    /// is what makes same-module-id ranking meaningful during resolution.
    pub fn install_revision(&self, module: u64, builder: ResourceBuilder) -> Arc<Resource> {
        let mut inner = self.inner.write();
        let revision = inner
            .latest_revision
            .get(&module)
            .map(|r| r + 1)
            .unwrap_or(0);
        let resource = builder.build_revision(module, revision);
        inner.latest_revision.insert(module, revision);
        inner.add(&resource);
        resource
    }

    /// Remove one resource (revision) and its capabilities.
    pub fn remove(&self, key: ResourceKey) {
        let mut inner = self.inner.write();
        inner.resources.retain(|r| r.key() != key);
        for bucket in inner.by_namespace.values_mut() {
            bucket.retain(|c| c.resource().key() != key);
        }
    }

    /// Every installed resource, in install order.
    pub fn resources(&self) -> Vec<Arc<Resource>> {
        self.inner.read().resources.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().resources.is_empty()
    }
}

impl CapabilityIndex for ModuleIndex {
    fn find_capabilities(&self, query: &Query) -> Vec<Capability> {
        let inner = self.inner.read();
        match inner.by_namespace.get(&query.namespace) {
            None => Vec::new(),
            Some(bucket) => bucket
                .iter()
                .filter(|c| query.matches(c))
                .cloned()
                .collect(),
        }
    }
}
