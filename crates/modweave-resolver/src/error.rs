//! Resolver error taxonomy.
//!
//! Only failures the caller must act on become errors: a mandatory trigger
//! that cannot resolve, a hook vetoing the operation, or a reentrant call.
//! Partial failures (optional resources, uses-constraint casualties) are
//! recovered locally and explained through the
//! [`ResolutionReport`](crate::ResolutionReport) instead.

use thiserror::Error;

use crate::report::ResolutionReport;

#[derive(Debug, Error)]
pub enum ResolveError {
    /// A resolve call re-entered through a token that is already resolving.
    /// Programming error in the caller; not retryable as-is.
    #[error("resolve operation re-entered on the same resolve token")]
    Reentrant,

    /// The resolver hook vetoed the whole operation before it started.
    #[error("resolve operation rejected by resolver hook: {reason}")]
    RejectedByHook { reason: String },

    /// Mandatory trigger resources could not be resolved. The attached
    /// report explains every failure.
    #[error("mandatory resources failed to resolve: {reason}")]
    MandatoryResolveFailed {
        reason: String,
        report: ResolutionReport,
    },

    /// `resolve_dynamic_delta` was invoked with a requirement that is not a
    /// dynamic package requirement.
    #[error("not a dynamic package requirement: {0}")]
    NotDynamic(String),
}

impl ResolveError {
    /// The diagnostic report attached to this error, if any.
    pub fn report(&self) -> Option<&ResolutionReport> {
        match self {
            ResolveError::MandatoryResolveFailed { report, .. } => Some(report),
            _ => None,
        }
    }
}
