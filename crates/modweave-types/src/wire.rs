//! Wires: resolved requirement-to-capability bindings.

use std::fmt;
use std::sync::Arc;

use crate::capability::Capability;
use crate::requirement::Requirement;
use crate::resource::Resource;

/// One resolved binding of a requirement to a providing capability.
///
/// Provider and requirer are explicit rather than derived from the handles:
/// when a fragment attaches to a host, the fragment's payload capabilities
/// are provided *by the host*, and its payload requirements are required by
/// the host, while the handles still point at the declaring fragment.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Wire {
    capability: Capability,
    provider: Arc<Resource>,
    requirement: Requirement,
    requirer: Arc<Resource>,
}

impl Wire {
    pub fn new(
        capability: Capability,
        provider: Arc<Resource>,
        requirement: Requirement,
        requirer: Arc<Resource>,
    ) -> Self {
        Wire {
            capability,
            provider,
            requirement,
            requirer,
        }
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    pub fn provider(&self) -> &Arc<Resource> {
        &self.provider
    }

    pub fn requirement(&self) -> &Requirement {
        &self.requirement
    }

    pub fn requirer(&self) -> &Arc<Resource> {
        &self.requirer
    }
}

impl fmt::Display for Wire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} provided by {}",
            self.requirer, self.capability, self.provider
        )
    }
}

impl fmt::Debug for Wire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Wire({self})")
    }
}
