//! Capabilities: named, attributed facts a resource provides.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::filter::Filter;
use crate::namespaces::attrs;
use crate::resource::Resource;
use crate::value::Value;
use crate::version::Version;

/// The declared content of one capability, owned by its [`Resource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityData {
    pub namespace: String,
    pub attributes: BTreeMap<String, Value>,
    pub directives: BTreeMap<String, String>,
}

impl CapabilityData {
    pub fn new(namespace: &str) -> Self {
        CapabilityData {
            namespace: namespace.to_string(),
            attributes: BTreeMap::new(),
            directives: BTreeMap::new(),
        }
    }

    pub fn attribute(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn directive(mut self, key: &str, value: &str) -> Self {
        self.directives.insert(key.to_string(), value.to_string());
        self
    }
}

/// A handle to one declared capability of a shared [`Resource`].
///
/// Equality and hashing go by (resource identity, declaration index), so
/// clones of the same handle compare equal and can key maps.
#[derive(Clone)]
pub struct Capability {
    resource: Arc<Resource>,
    index: usize,
}

impl Capability {
    pub fn new(resource: Arc<Resource>, index: usize) -> Self {
        Capability { resource, index }
    }

    pub fn resource(&self) -> &Arc<Resource> {
        &self.resource
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn data(&self) -> &CapabilityData {
        &self.resource.capability_data()[self.index]
    }

    pub fn namespace(&self) -> &str {
        &self.data().namespace
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.data().attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.data().attributes.get(key)
    }

    pub fn directive(&self, key: &str) -> Option<&str> {
        self.data().directives.get(key).map(|s| s.as_str())
    }

    /// The capability's `version` attribute, or `0.0.0` when absent.
    pub fn version(&self) -> Version {
        self.attribute(attrs::VERSION)
            .and_then(|v| v.as_version())
            .cloned()
            .unwrap_or(Version::EMPTY)
    }
}

impl PartialEq for Capability {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.resource.key() == other.resource.key()
    }
}

impl Eq for Capability {}

impl Hash for Capability {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.resource.key().hash(state);
        self.index.hash(state);
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.namespace())?;
        let mut first = true;
        for (key, value) in self.attributes() {
            write!(f, "{}{}={}", if first { " {" } else { "; " }, key, value)?;
            first = false;
        }
        if !first {
            write!(f, "}}")?;
        }
        write!(f, " of {}", self.resource())
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Capability({self})")
    }
}

/// An ad-hoc capability lookup: namespace plus optional filter.
///
/// This is the query form accepted by [`CapabilityIndex`], used both for
/// requirement lookups and for free-standing queries such as finding the
/// fragments that target a host.
#[derive(Debug, Clone)]
pub struct Query {
    pub namespace: String,
    pub filter: Option<Filter>,
}

impl Query {
    pub fn new(namespace: &str, filter: Option<Filter>) -> Self {
        Query {
            namespace: namespace.to_string(),
            filter,
        }
    }

    pub fn matches(&self, capability: &Capability) -> bool {
        if capability.namespace() != self.namespace {
            return false;
        }
        match &self.filter {
            None => true,
            Some(f) => f.matches(capability.attributes()),
        }
    }
}

/// The metadata-index collaborator: capability lookup by namespace and
/// filter, in deterministic install order.
pub trait CapabilityIndex: Send + Sync {
    fn find_capabilities(&self, query: &Query) -> Vec<Capability>;
}
