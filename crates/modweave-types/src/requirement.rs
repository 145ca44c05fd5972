//! Requirements: filtered queries a resource issues against capabilities.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::capability::{Capability, Query};
use crate::filter::Filter;
use crate::namespaces::{directives, PACKAGE};
use crate::resource::Resource;

/// When a requirement must be satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Unsatisfied at resolve time fails the requirer.
    Mandatory,
    /// Unsatisfied at resolve time is dropped from the wiring.
    Optional,
    /// Package requirement satisfied lazily, possibly never.
    Dynamic,
}

/// How many providers a requirement may wire to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Single,
    Multiple,
}

/// The declared content of one requirement, owned by its [`Resource`].
///
/// The filter is parsed once at declaration and kept alongside the raw
/// directive text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementData {
    pub namespace: String,
    pub directives: BTreeMap<String, String>,
    pub filter: Option<Filter>,
}

impl RequirementData {
    pub fn new(namespace: &str) -> Self {
        RequirementData {
            namespace: namespace.to_string(),
            directives: BTreeMap::new(),
            filter: None,
        }
    }

    pub fn directive(mut self, key: &str, value: &str) -> Self {
        self.directives.insert(key.to_string(), value.to_string());
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.directives
            .insert(directives::FILTER.to_string(), filter.to_string());
        self.filter = Some(filter);
        self
    }
}

/// A handle to one declared requirement of a shared [`Resource`].
#[derive(Clone)]
pub struct Requirement {
    resource: Arc<Resource>,
    index: usize,
}

impl Requirement {
    pub fn new(resource: Arc<Resource>, index: usize) -> Self {
        Requirement { resource, index }
    }

    pub fn resource(&self) -> &Arc<Resource> {
        &self.resource
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn data(&self) -> &RequirementData {
        &self.resource.requirement_data()[self.index]
    }

    pub fn namespace(&self) -> &str {
        &self.data().namespace
    }

    pub fn directive(&self, key: &str) -> Option<&str> {
        self.data().directives.get(key).map(|s| s.as_str())
    }

    pub fn resolution(&self) -> Resolution {
        match self.directive(directives::RESOLUTION) {
            Some(directives::RESOLUTION_OPTIONAL) => Resolution::Optional,
            Some(directives::RESOLUTION_DYNAMIC) => Resolution::Dynamic,
            _ => Resolution::Mandatory,
        }
    }

    pub fn cardinality(&self) -> Cardinality {
        match self.directive(directives::CARDINALITY) {
            Some(directives::CARDINALITY_MULTIPLE) => Cardinality::Multiple,
            _ => Cardinality::Single,
        }
    }

    /// True unless the `effective` directive is set to something other than
    /// `resolve`.
    pub fn is_effective_at_resolve(&self) -> bool {
        match self.directive(directives::EFFECTIVE) {
            None | Some(directives::EFFECTIVE_RESOLVE) => true,
            Some(_) => false,
        }
    }

    /// A deferred package requirement: package namespace with
    /// `resolution=dynamic`.
    pub fn is_dynamic(&self) -> bool {
        self.namespace() == PACKAGE && self.resolution() == Resolution::Dynamic
    }

    /// True when the capability is in this requirement's namespace and
    /// satisfies its filter.
    pub fn matches(&self, capability: &Capability) -> bool {
        if capability.namespace() != self.namespace() {
            return false;
        }
        match &self.data().filter {
            None => true,
            Some(f) => f.matches(capability.attributes()),
        }
    }

    pub fn to_query(&self) -> Query {
        Query::new(self.namespace(), self.data().filter.clone())
    }
}

impl PartialEq for Requirement {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.resource.key() == other.resource.key()
    }
}

impl Eq for Requirement {}

impl Hash for Requirement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.resource.key().hash(state);
        self.index.hash(state);
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.namespace())?;
        if let Some(filter) = self.directive(directives::FILTER) {
            write!(f, " {filter}")?;
        }
        write!(f, " of {}", self.resource())
    }
}

impl fmt::Debug for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Requirement({self})")
    }
}
