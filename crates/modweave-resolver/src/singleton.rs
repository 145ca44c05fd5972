//! Singleton collision selection.
//!
//! Runs once per resolve operation, before scheduling: for every
//! symbolic-name group containing singleton resources, pick the winners and
//! disable the losers with `SingletonSelection` diagnostics. Already
//! resolved singletons always win; among unresolved colliders the highest
//! version wins. The policy hook can shrink a singleton's collision set to
//! permit co-existence.
//!
//! The pass is idempotent: it only ever moves resources into the disabled
//! set, and a re-run with the same inputs makes the same choices.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use modweave_types::{Capability, Resource};

use crate::process::ResolveProcess;
use crate::report::Entry;
use crate::targets;

fn contains(list: &[Arc<Resource>], resource: &Arc<Resource>) -> bool {
    list.iter().any(|r| r.key() == resource.key())
}

fn push_unique(list: &mut Vec<Arc<Resource>>, resource: &Arc<Resource>) {
    if !contains(list, resource) {
        list.push(Arc::clone(resource));
    }
}

impl ResolveProcess<'_> {
    pub(crate) fn select_singletons(&mut self) {
        let mut processed_names: HashSet<String> = HashSet::new();
        for revision in self.unresolved.clone() {
            if !revision.is_singleton() || self.disabled.contains_key(&revision.key()) {
                continue;
            }
            let name = revision.symbolic_name().to_string();
            if !processed_names.insert(name.clone()) {
                continue;
            }

            let same_name = self.revisions_named(&name);
            if same_name.len() < 2 {
                continue;
            }

            // Seed the selected set with already-resolved singletons (at
            // most one per collision group, by invariant).
            let mut selected: Vec<Arc<Resource>> = same_name
                .iter()
                .filter(|r| r.is_singleton() && self.wirings.contains_key(&r.key()))
                .cloned()
                .collect();

            let collision_map = self.collision_map(&same_name);
            for singleton in &same_name {
                if contains(&selected, singleton) {
                    continue;
                }
                let Some((_, collisions)) = collision_map
                    .iter()
                    .find(|(candidate, _)| candidate.key() == singleton.key())
                else {
                    // Not a resolvable singleton.
                    continue;
                };
                if self.disabled.contains_key(&singleton.key()) {
                    continue;
                }

                let mut pick_one: Vec<Arc<Resource>> = Vec::new();
                for collision in collisions {
                    if contains(&selected, collision) {
                        // A selected resource already collides with this
                        // singleton; it loses immediately.
                        self.disable_singleton(singleton, collision);
                        break;
                    }
                    push_unique(&mut pick_one, collision);
                }

                if !self.disabled.contains_key(&singleton.key()) {
                    // The collision relation is directional through the
                    // hook; check the reverse direction too.
                    for (other, other_collisions) in &collision_map {
                        if other.key() != singleton.key() && contains(other_collisions, singleton)
                        {
                            if contains(&selected, other) {
                                self.disable_singleton(singleton, other);
                                break;
                            }
                            push_unique(&mut pick_one, other);
                        }
                    }
                }

                if !self.disabled.contains_key(&singleton.key()) {
                    push_unique(&mut pick_one, singleton);
                    let winner = self.pick_one_to_resolve(pick_one);
                    selected.push(winner);
                }
            }
        }
    }

    /// Resources sharing a symbolic name, over unresolved plus previously
    /// resolved, built lazily once per operation.
    fn revisions_named(&mut self, name: &str) -> Vec<Arc<Resource>> {
        if self.by_name.is_none() {
            let mut by_name: std::collections::HashMap<String, Vec<Arc<Resource>>> =
                std::collections::HashMap::new();
            let mut seen = HashSet::new();
            let mut previously_resolved: Vec<Arc<Resource>> = self
                .wirings
                .values()
                .map(|w| Arc::clone(w.resource()))
                .collect();
            previously_resolved.sort_by_key(|r| r.key());
            for resource in self.unresolved.clone().into_iter().chain(previously_resolved) {
                if !seen.insert(resource.key()) {
                    continue;
                }
                by_name
                    .entry(resource.symbolic_name().to_string())
                    .or_default()
                    .push(resource);
            }
            self.by_name = Some(by_name);
        }
        self.by_name
            .as_ref()
            .and_then(|map| map.get(name))
            .cloned()
            .unwrap_or_default()
    }

    /// Per-singleton collision sets for one name group, after the hook has
    /// had its say.
    fn collision_map(
        &self,
        same_name: &[Arc<Resource>],
    ) -> Vec<(Arc<Resource>, Vec<Arc<Resource>>)> {
        let mut map = Vec::new();
        for singleton in same_name {
            if !singleton.is_singleton() || self.disabled.contains_key(&singleton.key()) {
                continue;
            }
            let Some(identity) = singleton.identity() else {
                continue;
            };
            let mut collision_identities: Vec<Capability> = same_name
                .iter()
                .filter(|other| {
                    other.key() != singleton.key()
                        && other.is_singleton()
                        && !self.disabled.contains_key(&other.key())
                })
                .filter_map(|other| other.identity())
                .collect();
            self.resolver
                .hook()
                .filter_singleton_collisions(&identity, &mut collision_identities);
            let collisions: Vec<Arc<Resource>> = collision_identities
                .iter()
                .map(|identity| Arc::clone(identity.resource()))
                .collect();
            map.push((Arc::clone(singleton), collisions));
        }
        map
    }

    /// Select the highest-versioned member; disable and report the rest.
    /// The list always contains at least the singleton being decided.
    fn pick_one_to_resolve(&mut self, candidates: Vec<Arc<Resource>>) -> Arc<Resource> {
        let mut winner = Arc::clone(&candidates[0]);
        for candidate in &candidates[1..] {
            if candidate.version() > winner.version() {
                winner = Arc::clone(candidate);
            }
        }
        for candidate in &candidates {
            if candidate.key() != winner.key() {
                self.disable_singleton(candidate, &winner);
            }
        }
        winner
    }

    fn disable_singleton(&mut self, loser: &Arc<Resource>, winner: &Arc<Resource>) {
        debug!(
            target: targets::HOOKS,
            %loser,
            %winner,
            "singleton collision decided"
        );
        self.disabled.insert(loser.key(), Arc::clone(loser));
        self.report.add_entry(
            Arc::clone(loser),
            Entry::SingletonSelection {
                winner: Arc::clone(winner),
            },
        );
    }
}
