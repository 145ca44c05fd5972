//! Resources: installed module revisions and their declarations.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::capability::{Capability, CapabilityData};
use crate::filter::Filter;
use crate::namespaces::{attrs, directives, EXECUTION_ENVIRONMENT, FRAGMENT, HOST, IDENTITY};
use crate::requirement::{Requirement, RequirementData};
use crate::version::{Version, VersionRange};

/// The identity of one installed module revision.
///
/// `module` reflects install order (lower = installed earlier); `revision`
/// counts generations of the same module as it is updated in place (higher =
/// installed more recently). Together they uniquely identify a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    pub module: u64,
    pub revision: u32,
}

impl ResourceKey {
    pub fn new(module: u64, revision: u32) -> Self {
        ResourceKey { module, revision }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.revision)
    }
}

/// One module revision: identity, flags, and ordered declarations.
///
/// Resources are immutable once built and shared as `Arc<Resource>`;
/// [`Capability`] and [`Requirement`] are index handles into the declaration
/// lists. Declaration order is significant and preserved through resolution.
#[derive(Debug)]
pub struct Resource {
    symbolic_name: String,
    version: Version,
    key: ResourceKey,
    fragment: bool,
    capabilities: Vec<CapabilityData>,
    requirements: Vec<RequirementData>,
}

impl Resource {
    pub fn symbolic_name(&self) -> &str {
        &self.symbolic_name
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn key(&self) -> ResourceKey {
        self.key
    }

    pub fn is_fragment(&self) -> bool {
        self.fragment
    }

    /// Singleton status comes from the identity capability's `singleton`
    /// directive.
    pub fn is_singleton(&self) -> bool {
        self.capabilities
            .iter()
            .find(|c| c.namespace == IDENTITY)
            .and_then(|c| c.directives.get(directives::SINGLETON))
            .map(|v| v == "true")
            .unwrap_or(false)
    }

    pub fn capability_data(&self) -> &[CapabilityData] {
        &self.capabilities
    }

    pub fn requirement_data(&self) -> &[RequirementData] {
        &self.requirements
    }

    /// Handles to every declared capability, in declaration order.
    pub fn capabilities(self: &Arc<Self>) -> Vec<Capability> {
        (0..self.capabilities.len())
            .map(|i| Capability::new(Arc::clone(self), i))
            .collect()
    }

    /// Handles to the declared capabilities in one namespace.
    pub fn capabilities_in(self: &Arc<Self>, namespace: &str) -> Vec<Capability> {
        (0..self.capabilities.len())
            .filter(|&i| self.capabilities[i].namespace == namespace)
            .map(|i| Capability::new(Arc::clone(self), i))
            .collect()
    }

    /// Handles to every declared requirement, in declaration order.
    pub fn requirements(self: &Arc<Self>) -> Vec<Requirement> {
        (0..self.requirements.len())
            .map(|i| Requirement::new(Arc::clone(self), i))
            .collect()
    }

    /// Handles to the declared requirements in one namespace.
    pub fn requirements_in(self: &Arc<Self>, namespace: &str) -> Vec<Requirement> {
        (0..self.requirements.len())
            .filter(|&i| self.requirements[i].namespace == namespace)
            .map(|i| Requirement::new(Arc::clone(self), i))
            .collect()
    }

    /// The identity capability (always declared first by the builder).
    pub fn identity(self: &Arc<Self>) -> Option<Capability> {
        self.capabilities_in(IDENTITY).into_iter().next()
    }

    /// The host capability, when this resource accepts fragments.
    pub fn host_capability(self: &Arc<Self>) -> Option<Capability> {
        self.capabilities_in(HOST).into_iter().next()
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Resource {}

impl Hash for Resource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} (id={})",
            self.symbolic_name, self.version, self.key
        )
    }
}

/// Fluent construction of a [`Resource`].
///
/// The builder declares the structural capabilities the same way a manifest
/// parser would: every resource gets an identity capability; attachable
/// non-fragments get a host capability; fragments get a fragment capability
/// naming their target host plus the host requirement.
pub struct ResourceBuilder {
    symbolic_name: String,
    version: Version,
    fragment_host: Option<(String, Option<VersionRange>)>,
    singleton: bool,
    attachment: Option<String>,
    capabilities: Vec<CapabilityData>,
    requirements: Vec<RequirementData>,
}

impl ResourceBuilder {
    /// Start a regular (host-capable) module.
    pub fn module(symbolic_name: &str, version: Version) -> Self {
        ResourceBuilder {
            symbolic_name: symbolic_name.to_string(),
            version,
            fragment_host: None,
            singleton: false,
            attachment: None,
            capabilities: Vec::new(),
            requirements: Vec::new(),
        }
    }

    /// Start a fragment targeting `host`, optionally version-constrained.
    pub fn fragment(
        symbolic_name: &str,
        version: Version,
        host: &str,
        host_range: Option<VersionRange>,
    ) -> Self {
        let mut builder = Self::module(symbolic_name, version);
        builder.fragment_host = Some((host.to_string(), host_range));
        builder
    }

    pub fn singleton(mut self, singleton: bool) -> Self {
        self.singleton = singleton;
        self
    }

    /// Set the host attachment policy (`always` is the default).
    pub fn attachment_policy(mut self, policy: &str) -> Self {
        self.attachment = Some(policy.to_string());
        self
    }

    /// Declare an exported package capability.
    pub fn export_package(mut self, package: &str, version: Version) -> Self {
        self.capabilities.push(
            CapabilityData::new(crate::namespaces::PACKAGE)
                .attribute(attrs::PACKAGE, package)
                .attribute(attrs::VERSION, version),
        );
        self
    }

    /// Declare a mandatory package import.
    pub fn import_package(self, package: &str, range: Option<VersionRange>) -> Self {
        self.import_package_directed(package, range, None)
    }

    /// Declare an optional package import.
    pub fn import_package_optional(self, package: &str, range: Option<VersionRange>) -> Self {
        self.import_package_directed(package, range, Some(directives::RESOLUTION_OPTIONAL))
    }

    /// Declare a dynamic (deferred) package import.
    pub fn import_package_dynamic(self, package: &str, range: Option<VersionRange>) -> Self {
        self.import_package_directed(package, range, Some(directives::RESOLUTION_DYNAMIC))
    }

    fn import_package_directed(
        mut self,
        package: &str,
        range: Option<VersionRange>,
        resolution: Option<&str>,
    ) -> Self {
        let mut clauses = vec![Filter::equal(attrs::PACKAGE, package)];
        if let Some(range) = &range {
            clauses.push(range.to_filter(attrs::VERSION));
        }
        let filter = if clauses.len() == 1 {
            clauses.remove(0)
        } else {
            Filter::and(clauses)
        };
        let mut data = RequirementData::new(crate::namespaces::PACKAGE).filter(filter);
        if let Some(resolution) = resolution {
            data = data.directive(directives::RESOLUTION, resolution);
        }
        self.requirements.push(data);
        self
    }

    /// Declare a mandatory execution-environment requirement.
    pub fn require_execution_environment(mut self, ee: &str) -> Self {
        self.requirements.push(
            RequirementData::new(EXECUTION_ENVIRONMENT).filter(Filter::equal(attrs::EE, ee)),
        );
        self
    }

    /// Declare an offered execution environment (system module).
    pub fn provide_execution_environment(mut self, ee: &str, version: Version) -> Self {
        self.capabilities.push(
            CapabilityData::new(EXECUTION_ENVIRONMENT)
                .attribute(attrs::EE, ee)
                .attribute(attrs::VERSION, version),
        );
        self
    }

    /// Declare a raw capability.
    pub fn capability(mut self, data: CapabilityData) -> Self {
        self.capabilities.push(data);
        self
    }

    /// Declare a raw requirement.
    pub fn requirement(mut self, data: RequirementData) -> Self {
        self.requirements.push(data);
        self
    }

    /// Build the first revision of a module.
    pub fn build(self, module: u64) -> Arc<Resource> {
        self.build_revision(module, 0)
    }

    /// Build a specific revision (generation) of a module.
    pub fn build_revision(self, module: u64, revision: u32) -> Arc<Resource> {
        let mut capabilities = Vec::with_capacity(self.capabilities.len() + 2);
        let mut requirements = Vec::with_capacity(self.requirements.len() + 1);

        let mut identity = CapabilityData::new(IDENTITY)
            .attribute(attrs::NAME, self.symbolic_name.as_str())
            .attribute(attrs::VERSION, self.version.clone());
        if self.singleton {
            identity = identity.directive(directives::SINGLETON, "true");
        }
        capabilities.push(identity);

        match &self.fragment_host {
            None => {
                let attach_never = self.attachment.as_deref()
                    == Some(directives::FRAGMENT_ATTACHMENT_NEVER);
                if !attach_never {
                    let mut host = CapabilityData::new(HOST)
                        .attribute(attrs::HOST, self.symbolic_name.as_str())
                        .attribute(attrs::VERSION, self.version.clone());
                    if let Some(policy) = &self.attachment {
                        host = host.directive(directives::FRAGMENT_ATTACHMENT, policy);
                    }
                    capabilities.push(host);
                }
            }
            Some((host_name, host_range)) => {
                capabilities.push(
                    CapabilityData::new(FRAGMENT).attribute(attrs::FRAGMENT, host_name.as_str()),
                );
                let mut clauses = vec![Filter::equal(attrs::HOST, host_name)];
                if let Some(range) = host_range {
                    clauses.push(range.to_filter(attrs::VERSION));
                }
                let filter = if clauses.len() == 1 {
                    clauses.remove(0)
                } else {
                    Filter::and(clauses)
                };
                requirements.push(RequirementData::new(HOST).filter(filter));
            }
        }

        capabilities.extend(self.capabilities);
        requirements.extend(self.requirements);

        Arc::new(Resource {
            symbolic_name: self.symbolic_name,
            version: self.version,
            key: ResourceKey::new(module, revision),
            fragment: self.fragment_host.is_some(),
            capabilities,
            requirements,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespaces::PACKAGE;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn test_module_structural_capabilities() {
        let resource = ResourceBuilder::module("util.text", v("1.2.0"))
            .export_package("util.text", v("1.2.0"))
            .build(1);
        assert!(!resource.is_fragment());
        assert!(!resource.is_singleton());

        let identity = resource.identity().unwrap();
        assert_eq!(
            identity.attribute(attrs::NAME).unwrap().as_str(),
            Some("util.text")
        );
        assert!(resource.host_capability().is_some());
        assert_eq!(resource.capabilities_in(PACKAGE).len(), 1);
    }

    #[test]
    fn test_singleton_directive() {
        let resource = ResourceBuilder::module("app", v("1.0"))
            .singleton(true)
            .build(1);
        assert!(resource.is_singleton());
    }

    #[test]
    fn test_no_host_capability_when_attachment_never() {
        let resource = ResourceBuilder::module("sealed", v("1.0"))
            .attachment_policy(directives::FRAGMENT_ATTACHMENT_NEVER)
            .build(1);
        assert!(resource.host_capability().is_none());
    }

    #[test]
    fn test_fragment_structure() {
        let fragment = ResourceBuilder::fragment(
            "util.text.nls",
            v("1.0"),
            "util.text",
            Some("[1.0,2.0)".parse().unwrap()),
        )
        .build(2);
        assert!(fragment.is_fragment());
        assert!(fragment.host_capability().is_none());
        assert_eq!(fragment.capabilities_in(FRAGMENT).len(), 1);

        let host_reqs = fragment.requirements_in(HOST);
        assert_eq!(host_reqs.len(), 1);

        let host = ResourceBuilder::module("util.text", v("1.5"))
            .build(1)
            .host_capability()
            .unwrap();
        assert!(host_reqs[0].matches(&host));

        let wrong_version = ResourceBuilder::module("util.text", v("2.0"))
            .build(3)
            .host_capability()
            .unwrap();
        assert!(!host_reqs[0].matches(&wrong_version));
    }

    #[test]
    fn test_declaration_order_preserved() {
        let resource = ResourceBuilder::module("m", v("1.0"))
            .export_package("a", v("1.0"))
            .export_package("b", v("1.0"))
            .import_package("x", None)
            .import_package("y", None)
            .build(1);
        let packages: Vec<String> = resource
            .capabilities_in(PACKAGE)
            .iter()
            .map(|c| c.attribute(attrs::PACKAGE).unwrap().to_string())
            .collect();
        assert_eq!(packages, vec!["a", "b"]);
        assert_eq!(resource.requirements().len(), 2);
    }

    #[test]
    fn test_resource_equality_by_key() {
        let a = ResourceBuilder::module("m", v("1.0")).build(1);
        let b = ResourceBuilder::module("other", v("2.0")).build(1);
        let c = ResourceBuilder::module("m", v("1.0")).build(2);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
