//! Policy collaborators: the resolver hook and the permission check.
//!
//! The hook is one typed trait with a method per capability and no-op
//! defaults, so implementations override only what they need. Hooks run
//! inside the resolve operation; calling back into the resolver from a hook
//! trips the reentrancy guard by design.

use std::sync::Arc;

use modweave_types::{Capability, Requirement, Resource};

use crate::report::ResolutionReport;

/// Reason a hook vetoed a resolve operation before it started.
#[derive(Debug, Clone)]
pub struct HookRejection {
    pub reason: String,
}

impl HookRejection {
    pub fn new(reason: &str) -> Self {
        HookRejection {
            reason: reason.to_string(),
        }
    }
}

/// Admin-defined resolution policy.
///
/// Filter methods remove entries from the passed list; they must never add.
pub trait ResolverHook: Send + Sync {
    /// Called once before anything else with the trigger resources. An
    /// `Err` vetoes the whole operation; `end` is not called in that case.
    fn begin(&self, _triggers: &[Arc<Resource>]) -> Result<(), HookRejection> {
        Ok(())
    }

    /// Remove unresolved resources that must not resolve in this operation.
    fn filter_resolvable(&self, _candidates: &mut Vec<Arc<Resource>>) {}

    /// Remove candidate capabilities the requirement must not see.
    fn filter_matches(&self, _requirement: &Requirement, _candidates: &mut Vec<Capability>) {}

    /// Restrict which same-name singletons count as true collisions of
    /// `singleton` (identified by its identity capability). Removing a
    /// candidate permits co-existence.
    fn filter_singleton_collisions(
        &self,
        _singleton: &Capability,
        _collisions: &mut Vec<Capability>,
    ) {
    }

    /// Receives the built report before the operation returns.
    fn handle_report(&self, _report: &ResolutionReport) {}

    /// Called once at the end of every operation whose `begin` succeeded.
    fn end(&self) {}
}

/// The no-op hook used when no policy is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultResolverHook;

impl ResolverHook for DefaultResolverHook {}

/// Access-control collaborator. Absent when no security policy is
/// configured, in which case the permission filter step is a no-op.
pub trait PermissionCheck: Send + Sync {
    /// May `requirer` require the given capability?
    fn can_require(&self, requirer: &Arc<Resource>, capability: &Capability) -> bool;

    /// May `provider` provide the given capability?
    fn can_provide(&self, provider: &Arc<Resource>, capability: &Capability) -> bool;
}
