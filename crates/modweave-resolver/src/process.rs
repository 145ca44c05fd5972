//! One resolve operation: state, scheduling, and failure propagation.
//!
//! A [`ResolveProcess`] owns the whole lifetime of a single
//! `resolve_delta`/`resolve_dynamic_delta` call: the disabled and failed
//! sets, the private working copy of the wiring snapshot, the diagnostics
//! being accumulated, and the batch currently handed to the solver. The
//! caller's snapshot is never touched.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, Level};

use modweave_types::namespaces::{attrs, directives, FRAGMENT, HOST};
use modweave_types::{
    Capability, Filter, Query, Requirement, Resolution, Resource, ResourceKey, Wire, Wiring,
    WiringMap,
};

use crate::delta::{self, is_non_payload_fragment, ResolvedWires, ResultMap};
use crate::error::ResolveError;
use crate::report::{Entry, ReportBuilder};
use crate::resolver::{ModuleResolver, ResolveOutcome, WiringDelta};
use crate::solve::ResolveContext;
use crate::targets;
use crate::token::ResolveToken;

/// A dynamic package import being resolved for an already-wired resource.
#[derive(Debug, Clone)]
pub(crate) struct DynamicRequest {
    pub resource: Arc<Resource>,
    pub requirement: Requirement,
    /// The concrete lookup: the requested package name combined with the
    /// declared dynamic requirement's constraints.
    pub lookup: Query,
}

impl DynamicRequest {
    pub(crate) fn new(requirement: Requirement, package: &str) -> Self {
        let mut clauses = vec![Filter::equal(attrs::PACKAGE, package)];
        if let Some(declared) = &requirement.data().filter {
            clauses.push(declared.clone());
        }
        DynamicRequest {
            resource: Arc::clone(requirement.resource()),
            lookup: Query::new(requirement.namespace(), Some(Filter::and(clauses))),
            requirement,
        }
    }
}

/// Requirement-to-candidates records kept for unresolved-provider diagnosis.
pub(crate) struct UnresolvedProviderRecord {
    pub resource: Arc<Resource>,
    pub requirements: Vec<(Requirement, Vec<Capability>)>,
}

pub(crate) struct RunFailure {
    pub reason: String,
}

pub(crate) struct ResolveProcess<'a> {
    pub(crate) resolver: &'a ModuleResolver,
    /// Requested to resolve; never modified after construction.
    pub(crate) unresolved: Vec<Arc<Resource>>,
    /// Unresolved resources excluded from this operation: everything starts
    /// disabled, the hook's filter-resolvable pass re-enables survivors, and
    /// singleton losers are disabled again later.
    pub(crate) disabled: HashMap<ResourceKey, Arc<Resource>>,
    pub(crate) triggers: Vec<Arc<Resource>>,
    pub(crate) optionals: Vec<Arc<Resource>>,
    pub(crate) triggers_mandatory: bool,
    /// The caller's snapshot, pristine; the final delta is computed against
    /// this.
    pub(crate) snapshot: WiringMap,
    /// Private working copy; interim batch results are merged in so later
    /// batches see earlier resolutions.
    pub(crate) wirings: WiringMap,
    /// Keys wired before this operation started; used by the ranking.
    pub(crate) previously_resolved: HashSet<ResourceKey>,
    pub(crate) dynamic: Option<DynamicRequest>,
    pub(crate) report: ReportBuilder,
    pub(crate) currently_resolving: Vec<Arc<Resource>>,
    pub(crate) currently_mandatory: bool,
    /// Seeded with each batch; resources still here after the solver call
    /// failed to resolve in that batch.
    pub(crate) transitive_failures: Vec<Arc<Resource>>,
    /// Resources known to have failed in this operation; candidates from
    /// these providers are filtered from later solver calls.
    pub(crate) failed: HashMap<ResourceKey, Arc<Resource>>,
    /// Lazy symbolic-name index over unresolved + previously resolved.
    pub(crate) by_name: Option<HashMap<String, Vec<Arc<Resource>>>>,
    pub(crate) unresolved_providers: HashMap<ResourceKey, UnresolvedProviderRecord>,
    pub(crate) uses_violations: Vec<(Arc<Resource>, String)>,
}

impl<'a> ResolveProcess<'a> {
    pub(crate) fn new_delta(
        resolver: &'a ModuleResolver,
        triggers: &[Arc<Resource>],
        triggers_mandatory: bool,
        unresolved: &[Arc<Resource>],
        wirings: &WiringMap,
    ) -> Self {
        let mut optionals = unresolved.to_vec();
        if triggers_mandatory {
            optionals.retain(|r| !triggers.iter().any(|t| t.key() == r.key()));
        }
        Self::new(
            resolver,
            triggers.to_vec(),
            triggers_mandatory,
            optionals,
            unresolved,
            wirings,
            None,
        )
    }

    pub(crate) fn new_dynamic(
        resolver: &'a ModuleResolver,
        dynamic: DynamicRequest,
        unresolved: &[Arc<Resource>],
        wirings: &WiringMap,
    ) -> Self {
        let triggers = vec![Arc::clone(&dynamic.resource)];
        Self::new(
            resolver,
            triggers,
            false,
            unresolved.to_vec(),
            unresolved,
            wirings,
            Some(dynamic),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn new(
        resolver: &'a ModuleResolver,
        triggers: Vec<Arc<Resource>>,
        triggers_mandatory: bool,
        optionals: Vec<Arc<Resource>>,
        unresolved: &[Arc<Resource>],
        wirings: &WiringMap,
        dynamic: Option<DynamicRequest>,
    ) -> Self {
        ResolveProcess {
            resolver,
            unresolved: unresolved.to_vec(),
            disabled: unresolved
                .iter()
                .map(|r| (r.key(), Arc::clone(r)))
                .collect(),
            triggers,
            optionals,
            triggers_mandatory,
            snapshot: wirings.clone(),
            wirings: wirings.clone(),
            previously_resolved: wirings.keys().copied().collect(),
            dynamic,
            report: ReportBuilder::default(),
            currently_resolving: Vec::new(),
            currently_mandatory: false,
            transitive_failures: Vec::new(),
            failed: HashMap::new(),
            by_name: None,
            unresolved_providers: HashMap::new(),
            uses_violations: Vec::new(),
        }
    }

    pub(crate) fn resolve(mut self, token: &ResolveToken) -> Result<ResolveOutcome, ResolveError> {
        let _guard = token.acquire()?;
        let resolver = self.resolver;

        if let Err(rejection) = resolver.hook().begin(&self.triggers) {
            return Err(ResolveError::RejectedByHook {
                reason: rejection.reason,
            });
        }

        let mut result: Option<ResultMap> = None;
        let failure = self.run(&mut result).err();

        self.compute_unresolved_provider_entries(result.as_ref());
        let violations = std::mem::take(&mut self.uses_violations);
        for (resource, message) in violations {
            self.report
                .add_entry(resource, Entry::UsesConstraintViolation { message });
        }
        let report = std::mem::take(&mut self.report).build();
        if tracing::enabled!(target: targets::REPORT, Level::DEBUG) {
            for resource in report.resources() {
                if let Some(message) = report.message_for(resource.key()) {
                    debug!(target: targets::REPORT, "{message}");
                }
            }
        }
        resolver.hook().handle_report(&report);
        resolver.hook().end();

        match failure {
            Some(failure) => Err(ResolveError::MandatoryResolveFailed {
                reason: failure.reason,
                report,
            }),
            None => {
                let result = result.unwrap_or_default();
                let delta = delta::generate_delta(&result, &self.snapshot);
                Ok(ResolveOutcome {
                    delta: WiringDelta::new(delta),
                    report,
                })
            }
        }
    }

    fn run(&mut self, result: &mut Option<ResultMap>) -> Result<(), RunFailure> {
        self.filter_resolvable();
        self.select_singletons();

        // Disabled resources must not reach the solver.
        {
            let disabled = &self.disabled;
            self.optionals.retain(|r| !disabled.contains_key(&r.key()));
        }
        let triggers_before = self.triggers.len();
        {
            let disabled = &self.disabled;
            self.triggers.retain(|r| !disabled.contains_key(&r.key()));
        }
        if triggers_before != self.triggers.len() && self.triggers_mandatory {
            return Err(RunFailure {
                reason: "mandatory trigger modules were disabled before resolution".to_string(),
            });
        }

        if self.dynamic.is_some() {
            let map = self.resolve_dynamic_request();
            *result = Some(map);
            return Ok(());
        }

        let mut map = ResultMap::new();
        let attachments = self.resolve_non_payload_fragments();
        self.apply_interim(&attachments);
        if !attachments.is_empty() {
            // Fast-path fragments are done; keep the solver away from them.
            let keys: HashSet<ResourceKey> = attachments.keys().copied().collect();
            self.triggers.retain(|r| !keys.contains(&r.key()));
            self.optionals.retain(|r| !keys.contains(&r.key()));
            map.extend(attachments);
        }
        *result = Some(map);
        if let Some(map) = result.as_mut() {
            if self.triggers_mandatory {
                let triggers = self.triggers.clone();
                self.resolve_in_batches(triggers, true, map)?;
            }
            let optionals = self.optionals.clone();
            self.resolve_in_batches(optionals, false, map)?;
        }
        Ok(())
    }

    fn filter_resolvable(&mut self) {
        let mut enabled = self.unresolved.clone();
        self.resolver.hook().filter_resolvable(&mut enabled);
        for resource in &enabled {
            self.disabled.remove(&resource.key());
        }
        let mut still_disabled: Vec<Arc<Resource>> = self.disabled.values().cloned().collect();
        still_disabled.sort_by_key(|r| r.key());
        for resource in still_disabled {
            debug!(
                target: targets::HOOKS,
                %resource,
                "resource filtered by resolver hook"
            );
            self.report
                .add_entry(resource, Entry::FilteredByResolverHook);
        }
    }

    /// Feed the resources to the solver in batches, skipping anything
    /// already wired or failed. A failed mandatory batch does not stop the
    /// remaining batches (independent triggers still resolve and the
    /// report explains every failure), but the first failure is returned
    /// once all batches ran.
    fn resolve_in_batches(
        &mut self,
        revisions: Vec<Arc<Resource>>,
        mandatory: bool,
        result: &mut ResultMap,
    ) -> Result<(), RunFailure> {
        let batch_size = self.resolver.config().effective_batch_size();
        let total = revisions.len();
        let mut batch: Vec<Arc<Resource>> = Vec::new();
        let mut first_failure: Option<RunFailure> = None;
        for (i, revision) in revisions.into_iter().enumerate() {
            if !self.wirings.contains_key(&revision.key())
                && !self.failed.contains_key(&revision.key())
            {
                batch.push(revision);
            }
            if (batch.len() == batch_size || i + 1 == total) && !batch.is_empty() {
                debug!(
                    target: targets::ROOTS,
                    size = batch.len(),
                    mandatory,
                    "resolving batch"
                );
                let to_resolve = std::mem::take(&mut batch);
                if let Err(failure) = self.resolve_batch(to_resolve, mandatory, result) {
                    first_failure.get_or_insert(failure);
                }
            }
        }
        match first_failure {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    fn resolve_batch(
        &mut self,
        batch: Vec<Arc<Resource>>,
        mandatory: bool,
        result: &mut ResultMap,
    ) -> Result<(), RunFailure> {
        self.currently_resolving = batch.clone();
        self.currently_mandatory = mandatory;
        self.transitive_failures.clear();
        self.transitive_failures.extend(batch.iter().cloned());

        let resolver = self.resolver;
        let solved = resolver.solver().solve(self);

        self.currently_resolving = Vec::new();
        self.currently_mandatory = false;

        match solved {
            Ok(outcome) => {
                for (resource, message) in outcome.uses_violations {
                    debug!(
                        target: targets::USES,
                        %resource,
                        %message,
                        "uses constraint violation"
                    );
                    self.add_transitive_failure(Arc::clone(&resource));
                    self.uses_violations.push((resource, message));
                }

                let mut interim = ResultMap::new();
                for (resource, wires) in outcome.wires {
                    debug!(target: targets::ROOTS, %resource, "resolved");
                    match interim.entry(resource.key()) {
                        std::collections::hash_map::Entry::Occupied(mut entry) => {
                            entry.get_mut().wires.extend(wires)
                        }
                        std::collections::hash_map::Entry::Vacant(entry) => {
                            entry.insert(ResolvedWires { resource, wires });
                        }
                    }
                }
                self.apply_interim(&interim);

                // Whatever resolved is no longer a failure candidate.
                {
                    let resolved = &interim;
                    self.transitive_failures
                        .retain(|r| !resolved.contains_key(&r.key()));
                }
                for (key, resolved) in interim {
                    match result.entry(key) {
                        std::collections::hash_map::Entry::Occupied(mut entry) => {
                            entry.get_mut().wires.extend(resolved.wires)
                        }
                        std::collections::hash_map::Entry::Vacant(entry) => {
                            entry.insert(resolved);
                        }
                    }
                }
                let failures = std::mem::take(&mut self.transitive_failures);
                for resource in failures {
                    debug!(target: targets::ROOTS, %resource, "failed to resolve in batch");
                    self.failed.insert(resource.key(), resource);
                }
                Ok(())
            }
            Err(failure) => {
                let failures = std::mem::take(&mut self.transitive_failures);
                for resource in failures {
                    self.failed.insert(resource.key(), resource);
                }
                if mandatory {
                    Err(RunFailure {
                        reason: failure.to_string(),
                    })
                } else {
                    debug!(
                        target: targets::ROOTS,
                        %failure,
                        "optional batch failed; continuing"
                    );
                    Ok(())
                }
            }
        }
    }

    /// Dynamic attachment of fragments that add no payload to their host:
    /// wire them directly against already-resolved hosts without invoking
    /// the solver.
    fn resolve_non_payload_fragments(&mut self) -> ResultMap {
        let mut fragments: Vec<Arc<Resource>> = Vec::new();
        if self.triggers_mandatory {
            for trigger in self.triggers.clone() {
                if is_non_payload_fragment(&trigger) {
                    fragments.push(trigger);
                }
            }
        }
        for optional in self.optionals.clone() {
            if is_non_payload_fragment(&optional) {
                fragments.push(optional);
            }
        }
        if fragments.is_empty() {
            return ResultMap::new();
        }

        let mut attachments = ResultMap::new();
        for fragment in fragments {
            let mut all_wires: Vec<Wire> = Vec::new();
            let mut satisfied = true;
            for requirement in fragment.requirements() {
                let matching = self
                    .resolver
                    .index()
                    .find_capabilities(&requirement.to_query());
                // Resolved hosts are exactly what dynamic attachment wants.
                let candidates = self.filter_providers(&requirement, matching, false);
                let mut new_wires: Vec<Wire> = Vec::new();
                for candidate in candidates {
                    if requirement.namespace() == HOST {
                        let attachment = candidate.directive(directives::FRAGMENT_ATTACHMENT);
                        let attach_always = attachment.is_none()
                            || attachment == Some(directives::FRAGMENT_ATTACHMENT_ALWAYS);
                        if !attach_always
                            || !self.wirings.contains_key(&candidate.resource().key())
                        {
                            continue;
                        }
                    }
                    if new_wires.is_empty()
                        || requirement.cardinality() == modweave_types::Cardinality::Multiple
                    {
                        new_wires.push(Wire::new(
                            candidate.clone(),
                            Arc::clone(candidate.resource()),
                            requirement.clone(),
                            Arc::clone(&fragment),
                        ));
                    }
                }
                if new_wires.is_empty() {
                    if requirement.resolution() != Resolution::Optional {
                        // Unmatched mandatory requirement: skip the fragment.
                        all_wires.clear();
                        satisfied = false;
                        break;
                    }
                } else {
                    all_wires.extend(new_wires);
                }
            }
            if satisfied && !all_wires.is_empty() {
                debug!(
                    target: targets::ROOTS,
                    %fragment,
                    "fragment attached via non-payload fast path"
                );
                attachments.insert(
                    fragment.key(),
                    ResolvedWires {
                        resource: fragment,
                        wires: all_wires,
                    },
                );
            }
        }
        attachments
    }

    fn resolve_dynamic_request(&mut self) -> ResultMap {
        let Some(dynamic) = self.dynamic.clone() else {
            return ResultMap::new();
        };
        let candidates =
            self.find_providers_with_lookup(&dynamic.requirement, &dynamic.lookup);
        let resolver = self.resolver;
        match resolver.solver().solve_dynamic(
            self,
            &dynamic.resource,
            &dynamic.requirement,
            candidates,
        ) {
            Ok(outcome) => {
                for (resource, message) in outcome.uses_violations {
                    self.add_transitive_failure(Arc::clone(&resource));
                    self.uses_violations.push((resource, message));
                }
                let mut map = ResultMap::new();
                for (resource, wires) in outcome.wires {
                    map.insert(resource.key(), ResolvedWires { resource, wires });
                }
                map
            }
            Err(failure) => {
                debug!(
                    target: targets::ROOTS,
                    requirement = %dynamic.requirement,
                    %failure,
                    "dynamic requirement did not resolve"
                );
                ResultMap::new()
            }
        }
    }

    /// Merge interim results into the private working copy so later batches
    /// see state resolved by earlier ones.
    fn apply_interim(&mut self, interim: &ResultMap) {
        if interim.is_empty() {
            return;
        }
        let updated = delta::generate_delta(interim, &self.wirings);
        for (key, wiring) in updated {
            self.wirings.insert(key, wiring);
        }
    }

    pub(crate) fn add_transitive_failure(&mut self, resource: Arc<Resource>) {
        if !self
            .transitive_failures
            .iter()
            .any(|r| r.key() == resource.key())
        {
            self.transitive_failures.push(resource);
        }
    }

    /// For every resource asked to resolve that did not, prune its recorded
    /// requirement-to-candidates map of providers that did resolve, and
    /// report what remains as unresolved providers.
    fn compute_unresolved_provider_entries(&mut self, result: Option<&ResultMap>) {
        let mut should_have_resolved: Vec<Arc<Resource>> = Vec::new();
        for resource in &self.unresolved {
            if self.disabled.contains_key(&resource.key()) {
                continue;
            }
            if let Some(result) = result {
                if result.contains_key(&resource.key()) {
                    continue;
                }
            }
            should_have_resolved.push(Arc::clone(resource));
        }
        for resource in should_have_resolved {
            let Some(record) = self.unresolved_providers.remove(&resource.key()) else {
                continue;
            };
            let mut requirements = record.requirements;
            if let Some(result) = result {
                for (_, capabilities) in requirements.iter_mut() {
                    capabilities.retain(|c| !result.contains_key(&c.resource().key()));
                }
                requirements.retain(|(_, capabilities)| !capabilities.is_empty());
            }
            if !requirements.is_empty() {
                self.report
                    .add_entry(resource, Entry::UnresolvedProvider { requirements });
            }
        }
    }
}

impl ResolveContext for ResolveProcess<'_> {
    fn find_providers(&mut self, requirement: &Requirement) -> Vec<Capability> {
        self.lookup_providers(requirement)
    }

    fn is_effective(&self, requirement: &Requirement) -> bool {
        requirement.is_effective_at_resolve()
    }

    fn wiring_of(&self, key: ResourceKey) -> Option<Arc<Wiring>> {
        self.wirings.get(&key).cloned()
    }

    fn is_resolved(&self, key: ResourceKey) -> bool {
        self.wirings.contains_key(&key)
    }

    fn mandatory_resources(&self) -> Vec<Arc<Resource>> {
        if self.currently_mandatory {
            self.currently_resolving.clone()
        } else {
            Vec::new()
        }
    }

    fn optional_resources(&self) -> Vec<Arc<Resource>> {
        if self.currently_mandatory {
            Vec::new()
        } else {
            self.currently_resolving.clone()
        }
    }

    fn on_demand_fragments(&mut self, host: &Arc<Resource>) -> Vec<Arc<Resource>> {
        let Some(host_capability) = host.host_capability() else {
            return Vec::new();
        };
        let query = Query::new(
            FRAGMENT,
            Some(Filter::equal(attrs::FRAGMENT, host.symbolic_name())),
        );
        let mut candidates = self.resolver.index().find_capabilities(&query);
        self.filter_disabled(&mut candidates);
        let mut fragments = Vec::new();
        for candidate in candidates {
            let fragment = candidate.resource();
            let host_requirements = fragment.requirements_in(HOST);
            let Some(host_requirement) = host_requirements.first() else {
                continue;
            };
            if host_requirement.matches(&host_capability) {
                fragments.push(Arc::clone(fragment));
            }
        }
        fragments
    }

    fn rank(&self, a: &Capability, b: &Capability) -> std::cmp::Ordering {
        self.compare(a, b)
    }
}
