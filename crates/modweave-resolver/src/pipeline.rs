//! The candidate filter pipeline.
//!
//! Narrows the metadata index's raw candidate list for one requirement down
//! to what the solver may use, in a fixed order: disabled providers,
//! non-effective capabilities, substituted exports, permission checks, the
//! policy hook, resolved hosts (flag-controlled), and providers already
//! known to have failed. Empty results are diagnosed as missing
//! capabilities; surviving candidates are recorded for unresolved-provider
//! diagnosis and ranked.
//!
//! Every step is an explicit transform on an owned list; steps remove
//! entries, never add.

use std::cmp::Ordering;

use tracing::{debug, Level};

use modweave_types::namespaces::{directives, HOST, PACKAGE};
use modweave_types::{Capability, Query, Requirement, Resolution};

use crate::process::{ResolveProcess, UnresolvedProviderRecord};
use crate::report::Entry;
use crate::targets;

impl ResolveProcess<'_> {
    /// Full candidate lookup for a requirement: index query plus the filter
    /// pipeline. This is what the solver sees as `find_providers`.
    pub(crate) fn lookup_providers(&mut self, requirement: &Requirement) -> Vec<Capability> {
        self.find_providers_with_lookup(requirement, &requirement.to_query())
    }

    /// Candidate lookup where the index query differs from the diagnosed
    /// requirement (the dynamic-import case: the lookup is specialized to
    /// one package name, diagnostics attach to the declared requirement).
    pub(crate) fn find_providers_with_lookup(
        &mut self,
        requirement: &Requirement,
        lookup: &Query,
    ) -> Vec<Capability> {
        debug!(
            target: targets::PROVIDERS,
            %requirement,
            "finding capabilities for requirement"
        );
        let candidates = self.resolver.index().find_capabilities(lookup);
        let result = self.filter_providers(requirement, candidates, true);
        if tracing::enabled!(target: targets::PROVIDERS, Level::DEBUG) {
            for (i, capability) in result.iter().enumerate() {
                debug!(
                    target: targets::PROVIDERS,
                    index = i,
                    %capability,
                    "returning candidate to solver"
                );
            }
        }
        result
    }

    /// Run the filter pipeline over an unfiltered candidate list.
    ///
    /// `filter_resolved_hosts` selects between "new host attachment" (true:
    /// drop hosts that are already resolved) and dynamic fragment
    /// attachment (false: already-resolved hosts are exactly what is
    /// wanted).
    pub(crate) fn filter_providers(
        &mut self,
        requirement: &Requirement,
        mut candidates: Vec<Capability>,
        filter_resolved_hosts: bool,
    ) -> Vec<Capability> {
        self.filter_disabled(&mut candidates);
        filter_non_effective(&mut candidates);
        self.filter_substituted(&mut candidates);
        self.filter_permissions(requirement, &mut candidates);

        let hook_snapshot = if tracing::enabled!(target: targets::HOOKS, Level::DEBUG) {
            Some(candidates.clone())
        } else {
            None
        };
        self.resolver
            .hook()
            .filter_matches(requirement, &mut candidates);
        if let Some(before) = hook_snapshot {
            for removed in before.iter().filter(|c| !candidates.contains(*c)) {
                debug!(
                    target: targets::HOOKS,
                    capability = %removed,
                    "candidate filtered by resolver hook"
                );
            }
        }

        // After the hook, so policy gets to see the host capability.
        if filter_resolved_hosts && requirement.namespace() == HOST {
            let wirings = &self.wirings;
            candidates.retain(|c| !wirings.contains_key(&c.resource().key()));
        }

        if candidates.is_empty() {
            let requirer = requirement.resource();
            if !self.wirings.contains_key(&requirer.key()) || requirement.is_dynamic() {
                self.report.add_entry(
                    requirer.clone(),
                    Entry::MissingCapability {
                        requirement: requirement.clone(),
                    },
                );
                if requirement.resolution() == Resolution::Mandatory {
                    self.add_transitive_failure(requirer.clone());
                }
            }
        } else {
            self.record_unresolved_providers(requirement, &candidates);
        }

        self.filter_failed(&mut candidates);

        candidates.sort_by(|a, b| self.compare(a, b));
        candidates
    }

    pub(crate) fn filter_disabled(&self, candidates: &mut Vec<Capability>) {
        candidates.retain(|capability| {
            let keep = !self.disabled.contains_key(&capability.resource().key());
            if !keep {
                debug!(
                    target: targets::PROVIDERS,
                    %capability,
                    "candidate filtered: provider disabled"
                );
            }
            keep
        });
    }

    fn filter_substituted(&self, candidates: &mut Vec<Capability>) {
        candidates.retain(|capability| {
            let substituted = self
                .wirings
                .get(&capability.resource().key())
                .map(|wiring| wiring.is_substituted(capability))
                .unwrap_or(false);
            if substituted {
                debug!(
                    target: targets::PROVIDERS,
                    %capability,
                    "candidate filtered: capability substituted"
                );
            }
            !substituted
        });
    }

    fn filter_permissions(&self, requirement: &Requirement, candidates: &mut Vec<Capability>) {
        let Some(permissions) = self.resolver.permissions() else {
            return;
        };
        if candidates.is_empty() {
            return;
        }
        let requirer = requirement.resource();
        candidates.retain(|capability| {
            // A module importing its own export is always permitted.
            if requirement.namespace() == PACKAGE
                && capability.resource().key() == requirer.key()
            {
                return true;
            }
            if !permissions.can_require(requirer, capability) {
                debug!(
                    target: targets::PROVIDERS,
                    %capability,
                    "candidate filtered: requirer lacks permission"
                );
                return false;
            }
            if !permissions.can_provide(capability.resource(), capability) {
                debug!(
                    target: targets::PROVIDERS,
                    %capability,
                    "candidate filtered: provider lacks permission"
                );
                return false;
            }
            true
        });
    }

    fn filter_failed(&self, candidates: &mut Vec<Capability>) {
        candidates.retain(|capability| {
            let keep = !self.failed.contains_key(&capability.resource().key());
            if !keep {
                debug!(
                    target: targets::PROVIDERS,
                    %capability,
                    "candidate filtered: provider failed to resolve"
                );
            }
            keep
        });
    }

    /// Remember which still-unresolved providers matched this requirement,
    /// for the unresolved-provider report pass.
    fn record_unresolved_providers(&mut self, requirement: &Requirement, candidates: &[Capability]) {
        let fresh: Vec<Capability> = candidates
            .iter()
            .filter(|c| !self.wirings.contains_key(&c.resource().key()))
            .cloned()
            .collect();
        let requirer = requirement.resource();
        let record = self
            .unresolved_providers
            .entry(requirer.key())
            .or_insert_with(|| UnresolvedProviderRecord {
                resource: requirer.clone(),
                requirements: Vec::new(),
            });
        let index = match record
            .requirements
            .iter()
            .position(|(r, _)| r == requirement)
        {
            Some(index) => index,
            None => {
                record
                    .requirements
                    .push((requirement.clone(), Vec::new()));
                record.requirements.len() - 1
            }
        };
        let capabilities = &mut record.requirements[index].1;
        for capability in fresh {
            if !capabilities.contains(&capability) {
                capabilities.push(capability);
            }
        }
    }

    /// The pinned candidate ranking: already-resolved providers first, then
    /// higher capability version, then lower module id; same module id with
    /// distinct revisions ranks the most recently installed generation
    /// first.
    pub(crate) fn compare(&self, a: &Capability, b: &Capability) -> Ordering {
        let resolved_a = self.previously_resolved.contains(&a.resource().key());
        let resolved_b = self.previously_resolved.contains(&b.resource().key());
        if resolved_a != resolved_b {
            return if resolved_a {
                Ordering::Less
            } else {
                Ordering::Greater
            };
        }

        let version_order = b.version().cmp(&a.version());
        if version_order != Ordering::Equal {
            return version_order;
        }

        let key_a = a.resource().key();
        let key_b = b.resource().key();
        if key_a.module == key_b.module && key_a.revision != key_b.revision {
            return key_b.revision.cmp(&key_a.revision);
        }
        key_a.module.cmp(&key_b.module)
    }
}

/// Remove capabilities whose `effective` directive is set and not `resolve`.
fn filter_non_effective(candidates: &mut Vec<Capability>) {
    candidates.retain(|capability| {
        match capability.directive(directives::EFFECTIVE) {
            None | Some(directives::EFFECTIVE_RESOLVE) => true,
            Some(_) => {
                debug!(
                    target: targets::PROVIDERS,
                    %capability,
                    "candidate filtered: not effective at resolve time"
                );
                false
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use modweave_types::namespaces::attrs;
    use modweave_types::{
        CapabilityData, Requirement, Resource, ResourceBuilder, WiringMap,
    };

    use super::*;
    use crate::hooks::ResolverHook;
    use crate::process::ResolveProcess;
    use crate::test_support::{index_with, resolver, snapshot_of, v};
    use crate::ModuleResolver;

    fn package_requirement(resource: &Arc<Resource>) -> Requirement {
        resource.requirements_in(PACKAGE)[0].clone()
    }

    fn provider_names(candidates: &[Capability]) -> Vec<String> {
        candidates
            .iter()
            .map(|c| {
                format!(
                    "{}@{}",
                    c.resource().symbolic_name(),
                    c.resource().version()
                )
            })
            .collect()
    }

    #[test]
    fn test_ranking_contract_version_then_install_order() {
        // Same package from three providers: versions 1.0, 3.0, 2.0 in
        // install order.
        let (index, resources) = index_with(vec![
            ResourceBuilder::module("p1", v("1.0")).export_package("pkg", v("1.0")),
            ResourceBuilder::module("p3", v("1.0")).export_package("pkg", v("3.0")),
            ResourceBuilder::module("p2", v("1.0")).export_package("pkg", v("2.0")),
            ResourceBuilder::module("app", v("1.0")).import_package("pkg", None),
        ]);
        let app = resources[3].clone();
        let module_resolver = resolver(index);
        let unresolved = resources.clone();
        let mut process = ResolveProcess::new_delta(
            &module_resolver,
            &[],
            false,
            &unresolved,
            &WiringMap::new(),
        );
        // Nothing is disabled for this lookup.
        process.disabled.clear();

        let requirement = package_requirement(&app);
        let ranked = process.lookup_providers(&requirement);
        assert_eq!(provider_names(&ranked), vec!["p3@1.0.0", "p2@1.0.0", "p1@1.0.0"]);
    }

    #[test]
    fn test_ranking_contract_resolved_providers_first() {
        let (index, resources) = index_with(vec![
            ResourceBuilder::module("old", v("1.0")).export_package("pkg", v("1.0")),
            ResourceBuilder::module("new", v("1.0")).export_package("pkg", v("9.0")),
            ResourceBuilder::module("app", v("1.0")).import_package("pkg", None),
        ]);
        let old = resources[0].clone();
        let app = resources[2].clone();
        let module_resolver = resolver(index);
        // "old" is already resolved; it outranks the higher version.
        let snapshot = snapshot_of(&[&old]);
        let unresolved = vec![resources[1].clone(), app.clone()];
        let mut process =
            ResolveProcess::new_delta(&module_resolver, &[], false, &unresolved, &snapshot);
        process.disabled.clear();

        let ranked = process.lookup_providers(&package_requirement(&app));
        assert_eq!(provider_names(&ranked), vec!["old@1.0.0", "new@1.0.0"]);
    }

    #[test]
    fn test_ranking_contract_same_module_newest_revision_first() {
        let index = Arc::new(modweave_index::ModuleIndex::new());
        let gen0 =
            index.install(ResourceBuilder::module("lib", v("1.0")).export_package("pkg", v("1.0")));
        let gen1 = index.install_revision(
            gen0.key().module,
            ResourceBuilder::module("lib", v("1.0")).export_package("pkg", v("1.0")),
        );
        let app = index.install(ResourceBuilder::module("app", v("1.0")).import_package("pkg", None));

        let module_resolver = resolver(index);
        let unresolved = vec![gen0.clone(), gen1.clone(), app.clone()];
        let mut process = ResolveProcess::new_delta(
            &module_resolver,
            &[],
            false,
            &unresolved,
            &WiringMap::new(),
        );
        process.disabled.clear();

        let ranked = process.lookup_providers(&package_requirement(&app));
        let keys: Vec<_> = ranked.iter().map(|c| c.resource().key()).collect();
        assert_eq!(keys, vec![gen1.key(), gen0.key()]);
    }

    #[test]
    fn test_disabled_providers_filtered() {
        let (index, resources) = index_with(vec![
            ResourceBuilder::module("lib", v("1.0")).export_package("pkg", v("1.0")),
            ResourceBuilder::module("app", v("1.0")).import_package("pkg", None),
        ]);
        let app = resources[1].clone();
        let module_resolver = resolver(index);
        let unresolved = resources.clone();
        let mut process = ResolveProcess::new_delta(
            &module_resolver,
            &[],
            false,
            &unresolved,
            &WiringMap::new(),
        );
        // Everything starts disabled; nothing was re-enabled yet.
        let ranked = process.lookup_providers(&package_requirement(&app));
        assert!(ranked.is_empty());
        // The requirer gets a missing-capability entry and joins the
        // failure set.
        assert_eq!(process.transitive_failures.len(), 1);
        assert_eq!(process.transitive_failures[0].key(), app.key());
    }

    #[test]
    fn test_non_effective_capability_filtered() {
        let (index, resources) = index_with(vec![
            ResourceBuilder::module("lib", v("1.0")).capability(
                CapabilityData::new(PACKAGE)
                    .attribute(attrs::PACKAGE, "pkg")
                    .attribute(attrs::VERSION, v("1.0"))
                    .directive(directives::EFFECTIVE, "active"),
            ),
            ResourceBuilder::module("app", v("1.0")).import_package("pkg", None),
        ]);
        let app = resources[1].clone();
        let module_resolver = resolver(index);
        let unresolved = resources.clone();
        let mut process = ResolveProcess::new_delta(
            &module_resolver,
            &[],
            false,
            &unresolved,
            &WiringMap::new(),
        );
        process.disabled.clear();
        let ranked = process.lookup_providers(&package_requirement(&app));
        assert!(ranked.is_empty());
    }

    #[test]
    fn test_failed_providers_filtered_and_recorded_for_diagnosis() {
        let (index, resources) = index_with(vec![
            ResourceBuilder::module("lib", v("1.0")).export_package("pkg", v("1.0")),
            ResourceBuilder::module("app", v("1.0")).import_package("pkg", None),
        ]);
        let lib = resources[0].clone();
        let app = resources[1].clone();
        let module_resolver = resolver(index);
        let unresolved = resources.clone();
        let mut process = ResolveProcess::new_delta(
            &module_resolver,
            &[],
            false,
            &unresolved,
            &WiringMap::new(),
        );
        process.disabled.clear();
        process.failed.insert(lib.key(), lib.clone());

        let ranked = process.lookup_providers(&package_requirement(&app));
        assert!(ranked.is_empty());
        // The candidate was recorded before the failed-provider filter, so
        // the unresolved-provider diagnosis can name it later.
        let record = process.unresolved_providers.get(&app.key()).unwrap();
        assert_eq!(record.requirements.len(), 1);
        assert_eq!(record.requirements[0].1.len(), 1);
    }

    struct VetoLib;

    impl ResolverHook for VetoLib {
        fn filter_matches(&self, _requirement: &Requirement, candidates: &mut Vec<Capability>) {
            candidates.retain(|c| c.resource().symbolic_name() != "lib");
        }
    }

    #[test]
    fn test_hook_filters_matches() {
        let (index, resources) = index_with(vec![
            ResourceBuilder::module("lib", v("1.0")).export_package("pkg", v("1.0")),
            ResourceBuilder::module("other", v("1.0")).export_package("pkg", v("1.0")),
            ResourceBuilder::module("app", v("1.0")).import_package("pkg", None),
        ]);
        let app = resources[2].clone();
        let module_resolver =
            resolver(index).with_hook(Box::new(VetoLib));
        let unresolved = resources.clone();
        let mut process = ResolveProcess::new_delta(
            &module_resolver,
            &[],
            false,
            &unresolved,
            &WiringMap::new(),
        );
        process.disabled.clear();
        let ranked = process.lookup_providers(&package_requirement(&app));
        assert_eq!(provider_names(&ranked), vec!["other@1.0.0"]);
    }

    #[test]
    fn test_resolved_hosts_filtered_only_when_requested() {
        let (index, resources) = index_with(vec![
            ResourceBuilder::module("host", v("1.0")),
            ResourceBuilder::fragment("frag", v("1.0"), "host", None),
        ]);
        let host = resources[0].clone();
        let fragment = resources[1].clone();
        let module_resolver = resolver(index);
        let snapshot = snapshot_of(&[&host]);
        let unresolved = vec![fragment.clone()];
        let mut process =
            ResolveProcess::new_delta(&module_resolver, &[], false, &unresolved, &snapshot);
        process.disabled.clear();

        let host_requirement = fragment.requirements_in(modweave_types::namespaces::HOST)[0].clone();
        let raw = module_resolver
            .index()
            .find_capabilities(&host_requirement.to_query());

        let with_filter = process.filter_providers(&host_requirement, raw.clone(), true);
        assert!(with_filter.is_empty());

        let without_filter = process.filter_providers(&host_requirement, raw, false);
        assert_eq!(without_filter.len(), 1);
    }

    struct DenyAll;

    impl crate::hooks::PermissionCheck for DenyAll {
        fn can_require(&self, _r: &Arc<Resource>, _c: &Capability) -> bool {
            false
        }
        fn can_provide(&self, _p: &Arc<Resource>, _c: &Capability) -> bool {
            false
        }
    }

    #[test]
    fn test_permission_check_filters_but_allows_self_import() {
        let (index, resources) = index_with(vec![
            ResourceBuilder::module("lib", v("1.0")).export_package("pkg", v("1.0")),
            ResourceBuilder::module("app", v("1.0"))
                .export_package("pkg", v("0.5"))
                .import_package("pkg", None),
        ]);
        let app = resources[1].clone();
        let module_resolver: ModuleResolver =
            resolver(index).with_permissions(Box::new(DenyAll));
        let unresolved = resources.clone();
        let mut process = ResolveProcess::new_delta(
            &module_resolver,
            &[],
            false,
            &unresolved,
            &WiringMap::new(),
        );
        process.disabled.clear();

        let ranked = process.lookup_providers(&package_requirement(&app));
        // Only the self-provided candidate survives the deny-all policy.
        assert_eq!(provider_names(&ranked), vec!["app@1.0.0"]);
    }
}
