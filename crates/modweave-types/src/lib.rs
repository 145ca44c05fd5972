//! Shared data model for the modweave workspace.
//!
//! This crate is the canonical source for the module-graph vocabulary used by
//! every other crate in the workspace:
//!
//! - [`Version`] / [`VersionRange`]: ordered module and capability versions
//! - [`Value`]: typed attribute values carried by capabilities
//! - [`Filter`]: attribute-match expressions used by requirements
//! - [`Resource`]: one installed module revision and its declarations
//! - [`Capability`] / [`Requirement`]: handles into a resource's declarations
//! - [`Wire`]: a resolved requirement-to-capability binding
//! - [`Wiring`]: the full resolved state of one resource
//!
//! Other crates should import these types from here rather than defining
//! their own variants.

pub mod capability;
pub mod filter;
pub mod namespaces;
pub mod requirement;
pub mod resource;
pub mod value;
pub mod version;
pub mod wire;
pub mod wiring;

pub use capability::{Capability, CapabilityData, CapabilityIndex, Query};
pub use filter::{Filter, FilterError};
pub use requirement::{Cardinality, Requirement, RequirementData, Resolution};
pub use resource::{Resource, ResourceBuilder, ResourceKey};
pub use value::Value;
pub use version::{Version, VersionError, VersionRange};
pub use wire::Wire;
pub use wiring::{Wiring, WiringMap};
