//! Diagnostic resolution reports.
//!
//! One report is produced per resolve invocation, mapping each affected
//! resource to an ordered list of entries explaining why it did not (or
//! almost did not) resolve. Reports are immutable once built.

use std::collections::HashMap;
use std::sync::Arc;

use modweave_types::{Capability, Requirement, Resource, ResourceKey};

/// One diagnostic entry attached to a resource.
#[derive(Debug, Clone)]
pub enum Entry {
    /// A requirement had no matching capability at all.
    MissingCapability { requirement: Requirement },
    /// Requirements matched only capabilities whose providers themselves
    /// failed to resolve: the resource failed transitively, not directly.
    UnresolvedProvider {
        requirements: Vec<(Requirement, Vec<Capability>)>,
    },
    /// The solver reported a class-space consistency conflict for this
    /// resource.
    UsesConstraintViolation { message: String },
    /// This singleton lost its symbolic-name collision to `winner`.
    SingletonSelection { winner: Arc<Resource> },
    /// The resolver hook excluded this resource from the operation.
    FilteredByResolverHook,
}

impl Entry {
    /// Stable kind tag used in JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Entry::MissingCapability { .. } => "missing-capability",
            Entry::UnresolvedProvider { .. } => "unresolved-provider",
            Entry::UsesConstraintViolation { .. } => "uses-constraint-violation",
            Entry::SingletonSelection { .. } => "singleton-selection",
            Entry::FilteredByResolverHook => "filtered-by-resolver-hook",
        }
    }

    fn message(&self) -> String {
        match self {
            Entry::MissingCapability { requirement } => {
                format!("no capability matches {requirement}")
            }
            Entry::UnresolvedProvider { requirements } => {
                let mut lines = vec!["matching providers did not resolve:".to_string()];
                for (requirement, capabilities) in requirements {
                    lines.push(format!("  {requirement}"));
                    for capability in capabilities {
                        lines.push(format!("    candidate {capability}"));
                    }
                }
                lines.join("\n")
            }
            Entry::UsesConstraintViolation { message } => {
                format!("uses constraint violation: {message}")
            }
            Entry::SingletonSelection { winner } => {
                format!("singleton collision lost to {winner}")
            }
            Entry::FilteredByResolverHook => "filtered by resolver hook".to_string(),
        }
    }
}

/// Immutable per-resource diagnostics for one resolve invocation.
#[derive(Debug, Default)]
pub struct ResolutionReport {
    entries: Vec<(Arc<Resource>, Vec<Entry>)>,
    by_key: HashMap<ResourceKey, usize>,
}

impl ResolutionReport {
    /// Resources with entries, in the order they were first diagnosed.
    pub fn resources(&self) -> impl Iterator<Item = &Arc<Resource>> {
        self.entries.iter().map(|(resource, _)| resource)
    }

    /// The entries recorded for one resource, in diagnosis order.
    pub fn entries_for(&self, key: ResourceKey) -> &[Entry] {
        match self.by_key.get(&key) {
            Some(&index) => &self.entries[index].1,
            None => &[],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// A human-readable explanation of why `key`'s resource did not resolve.
    pub fn message_for(&self, key: ResourceKey) -> Option<String> {
        let &index = self.by_key.get(&key)?;
        let (resource, entries) = &self.entries[index];
        let mut lines = vec![format!("{resource} could not be resolved:")];
        for entry in entries {
            lines.push(format!("  {}", entry.message().replace('\n', "\n  ")));
        }
        Some(lines.join("\n"))
    }

    /// Diff-friendly JSON rendering of the whole report.
    pub fn to_json(&self) -> serde_json::Value {
        let entries: Vec<serde_json::Value> = self
            .entries
            .iter()
            .map(|(resource, entries)| {
                serde_json::json!({
                    "resource": resource.to_string(),
                    "entries": entries
                        .iter()
                        .map(|e| serde_json::json!({
                            "kind": e.kind(),
                            "message": e.message(),
                        }))
                        .collect::<Vec<_>>(),
                })
            })
            .collect();
        serde_json::json!({ "entries": entries })
    }
}

/// Accumulates entries during a resolve operation.
#[derive(Debug, Default)]
pub(crate) struct ReportBuilder {
    report: ResolutionReport,
}

impl ReportBuilder {
    /// Peek at the entries recorded so far for one resource.
    pub(crate) fn entries_for(&self, key: ResourceKey) -> &[Entry] {
        self.report.entries_for(key)
    }

    pub(crate) fn add_entry(&mut self, resource: Arc<Resource>, entry: Entry) {
        let report = &mut self.report;
        match report.by_key.get(&resource.key()) {
            Some(&index) => report.entries[index].1.push(entry),
            None => {
                report.by_key.insert(resource.key(), report.entries.len());
                report.entries.push((resource, vec![entry]));
            }
        }
    }

    pub(crate) fn build(self) -> ResolutionReport {
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modweave_types::{ResourceBuilder, Version};

    fn resource(name: &str, module: u64) -> Arc<Resource> {
        ResourceBuilder::module(name, Version::new(1, 0, 0)).build(module)
    }

    #[test]
    fn test_entries_grouped_per_resource_in_order() {
        let a = resource("a", 1);
        let b = resource("b", 2);

        let mut builder = ReportBuilder::default();
        builder.add_entry(a.clone(), Entry::FilteredByResolverHook);
        builder.add_entry(b.clone(), Entry::SingletonSelection { winner: a.clone() });
        builder.add_entry(
            a.clone(),
            Entry::UsesConstraintViolation {
                message: "conflict".into(),
            },
        );
        let report = builder.build();

        assert_eq!(report.len(), 2);
        let names: Vec<&str> = report.resources().map(|r| r.symbolic_name()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(report.entries_for(a.key()).len(), 2);
        assert_eq!(report.entries_for(b.key()).len(), 1);
        assert!(report.entries_for(ResourceKey::new(99, 0)).is_empty());
    }

    #[test]
    fn test_message_and_json() {
        let a = resource("a", 1);
        let winner = resource("a", 2);
        let mut builder = ReportBuilder::default();
        builder.add_entry(
            a.clone(),
            Entry::SingletonSelection {
                winner: winner.clone(),
            },
        );
        let report = builder.build();

        let message = report.message_for(a.key()).unwrap();
        assert!(message.contains("singleton collision"));
        assert!(message.contains("a@1.0.0"));

        let json = report.to_json();
        assert_eq!(json["entries"][0]["entries"][0]["kind"], "singleton-selection");
    }
}
