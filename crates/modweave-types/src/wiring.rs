//! Wirings: the full resolved state of one resource.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::capability::Capability;
use crate::namespaces::{attrs, PACKAGE};
use crate::requirement::Requirement;
use crate::resource::{Resource, ResourceKey};
use crate::wire::Wire;

/// The snapshot form exchanged with the resolver: resolved state per
/// resource identity. Callers own the synchronization around merging deltas
/// into their live map.
pub type WiringMap = HashMap<ResourceKey, Arc<Wiring>>;

/// The resolved capability/requirement/wire state of one resource.
///
/// Immutable once built. The capability and requirement lists are the
/// *effective* lists: non-effective and substituted entries removed, and
/// fragment payload merged in (for hosts) or stripped out (for fragments).
#[derive(Debug, PartialEq, Eq)]
pub struct Wiring {
    resource: Arc<Resource>,
    capabilities: Vec<Capability>,
    requirements: Vec<Requirement>,
    provided: Vec<Wire>,
    required: Vec<Wire>,
    substituted: BTreeSet<String>,
}

impl Wiring {
    pub fn new(
        resource: Arc<Resource>,
        capabilities: Vec<Capability>,
        requirements: Vec<Requirement>,
        provided: Vec<Wire>,
        required: Vec<Wire>,
        substituted: BTreeSet<String>,
    ) -> Self {
        Wiring {
            resource,
            capabilities,
            requirements,
            provided,
            required,
            substituted,
        }
    }

    pub fn resource(&self) -> &Arc<Resource> {
        &self.resource
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// Wires where this resource is the provider, in capability-list order.
    pub fn provided_wires(&self) -> &[Wire] {
        &self.provided
    }

    /// Wires where this resource is the requirer, in requirement-list order.
    pub fn required_wires(&self) -> &[Wire] {
        &self.required
    }

    /// Package names whose own export was shadowed by an import.
    pub fn substituted_names(&self) -> &BTreeSet<String> {
        &self.substituted
    }

    /// True when the capability is a package export of this resource that
    /// has been substituted by an import of the same name.
    pub fn is_substituted(&self, capability: &Capability) -> bool {
        if capability.namespace() != PACKAGE {
            return false;
        }
        match capability.attribute(attrs::PACKAGE).map(|v| v.to_string()) {
            Some(name) => self.substituted.contains(&name),
            None => false,
        }
    }
}

impl fmt::Display for Wiring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "wiring of {} ({} provided, {} required)",
            self.resource,
            self.provided.len(),
            self.required.len()
        )
    }
}
