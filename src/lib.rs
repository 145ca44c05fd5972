//! modweave
//!
//! A dynamic, versioned module-graph wiring resolver:
//!
//! - **Model**: modules declare capabilities and requirements with version
//!   ranges, filters, and optionality/cardinality directives
//! - **Resolution**: an orchestrator computes consistent requirement-to-
//!   capability wires incrementally as modules come and go
//! - **Diagnostics**: every resolution failure is explained in a structured
//!   report
//!
//! See [`modweave_resolver`] for the orchestrator and [`modweave_index`]
//! for the in-memory module registry. This crate adds the CLI that loads a
//! JSON module set, resolves it, and prints the wirings and report.

pub mod args;
pub mod runner;

pub use modweave_index as index;
pub use modweave_resolver as resolver;
pub use modweave_types as types;
