//! Well-known capability namespaces, attribute keys, and directive names.

/// Module identity: one per resource, carries `name`, `version`, and the
/// `singleton` directive.
pub const IDENTITY: &str = "modweave.identity";
/// Exported/imported code packages.
pub const PACKAGE: &str = "modweave.package";
/// Fragment attachment points offered by host modules.
pub const HOST: &str = "modweave.host";
/// Execution environments offered by the system module.
pub const EXECUTION_ENVIRONMENT: &str = "modweave.ee";
/// Declared by fragments, names the host they target; used for on-demand
/// fragment lookup.
pub const FRAGMENT: &str = "modweave.fragment";

/// Capability namespaces that are *not* merged into a host when a fragment
/// attaches (the fragment keeps them in its own wiring).
pub const NON_PAYLOAD_CAPABILITIES: &[&str] = &[IDENTITY];
/// Requirement namespaces that are *not* merged into a host when a fragment
/// attaches.
pub const NON_PAYLOAD_REQUIREMENTS: &[&str] = &[HOST, EXECUTION_ENVIRONMENT];

/// Attribute keys.
pub mod attrs {
    /// Symbolic name on identity capabilities.
    pub const NAME: &str = "name";
    /// Version on any capability namespace.
    pub const VERSION: &str = "version";
    /// Package name on package capabilities.
    pub const PACKAGE: &str = "package";
    /// Host symbolic name on host capabilities.
    pub const HOST: &str = "host";
    /// Target host symbolic name on fragment capabilities.
    pub const FRAGMENT: &str = "fragment";
    /// Environment name on execution-environment capabilities.
    pub const EE: &str = "ee";
}

/// Directive names and their recognized values.
pub mod directives {
    /// On capabilities and requirements; anything other than
    /// [`EFFECTIVE_RESOLVE`] is ignored at resolve time.
    pub const EFFECTIVE: &str = "effective";
    pub const EFFECTIVE_RESOLVE: &str = "resolve";

    /// On requirements: `mandatory` (default), `optional`, or `dynamic`.
    pub const RESOLUTION: &str = "resolution";
    pub const RESOLUTION_MANDATORY: &str = "mandatory";
    pub const RESOLUTION_OPTIONAL: &str = "optional";
    pub const RESOLUTION_DYNAMIC: &str = "dynamic";

    /// On requirements: `single` (default) or `multiple`.
    pub const CARDINALITY: &str = "cardinality";
    pub const CARDINALITY_SINGLE: &str = "single";
    pub const CARDINALITY_MULTIPLE: &str = "multiple";

    /// On requirements: the match expression source text.
    pub const FILTER: &str = "filter";

    /// On identity capabilities: `true` restricts resolution to one resource
    /// per symbolic name.
    pub const SINGLETON: &str = "singleton";

    /// On host capabilities: `always` (default) or `never`.
    pub const FRAGMENT_ATTACHMENT: &str = "fragment-attachment";
    pub const FRAGMENT_ATTACHMENT_ALWAYS: &str = "always";
    pub const FRAGMENT_ATTACHMENT_NEVER: &str = "never";
}

/// True when the namespace survives in a fragment's own wiring instead of
/// being merged into the host.
pub fn is_non_payload_capability(namespace: &str) -> bool {
    NON_PAYLOAD_CAPABILITIES.contains(&namespace)
}

/// True when the namespace stays a fragment's own requirement instead of
/// being hosted.
pub fn is_non_payload_requirement(namespace: &str) -> bool {
    NON_PAYLOAD_REQUIREMENTS.contains(&namespace)
}
