//! Property-style tests over the resolver's contracts.

use std::collections::HashMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use modweave_integration_tests::{v, Harness};
use modweave_resolver::ResolverConfig;
use modweave_types::{Resource, ResourceBuilder, ResourceKey, Version, WiringMap};

#[test]
fn test_idempotence_resolving_a_satisfied_set_yields_empty_delta() {
    let harness = Harness::new();
    harness.install(ResourceBuilder::module("lib", v("1.0")).export_package("lib.api", v("1.0")));
    harness.install(ResourceBuilder::module("app", v("1.0")).import_package("lib.api", None));

    let mut wirings = WiringMap::new();
    let first = harness.resolve_and_merge(&mut wirings);
    assert_eq!(first.delta.len(), 2);

    // Everything is already satisfied by the snapshot: nothing to do.
    let triggers = harness.index.resources();
    let second = harness.resolve(&triggers, false, &wirings).unwrap();
    assert!(second.delta.is_empty());
    assert!(second.report.is_empty());
}

#[test]
fn test_batch_merge_is_order_independent() {
    fn build(harness: &Harness) -> Vec<Arc<Resource>> {
        vec![
            harness.install(
                ResourceBuilder::module("a", v("1.0")).export_package("a.api", v("1.0")),
            ),
            harness.install(
                ResourceBuilder::module("b", v("1.0"))
                    .export_package("b.api", v("1.0"))
                    .import_package("a.api", None),
            ),
            harness.install(
                ResourceBuilder::module("c", v("1.0"))
                    .import_package("a.api", None)
                    .import_package("b.api", None),
            ),
        ]
    }

    // One shot: resolve {a, b, c} together.
    let together = Harness::new();
    let _ = build(&together);
    let mut all_at_once = WiringMap::new();
    together.resolve_and_merge(&mut all_at_once);

    // Incremental: resolve {a, b}, merge, then {c} against the merged
    // snapshot.
    let incremental = Harness::new();
    let resources = build(&incremental);
    let mut stepwise = WiringMap::new();
    let first = incremental.resolve_scoped(&resources[..2], &stepwise).unwrap();
    first.delta.merge_into(&mut stepwise);
    let second = incremental
        .resolve_scoped(&resources[2..], &stepwise)
        .unwrap();
    second.delta.merge_into(&mut stepwise);

    assert_eq!(all_at_once.len(), stepwise.len());
    for (key, wiring) in &all_at_once {
        assert_eq!(
            wiring.as_ref(),
            stepwise[key].as_ref(),
            "wiring for {key} differs between batch orders"
        );
    }
}

#[test]
fn test_no_silent_failures() {
    let harness = Harness::new();
    let mut expected_failures = Vec::new();
    expected_failures.push(
        harness.install(
            ResourceBuilder::module("direct", v("1.0")).import_package("missing.api", None),
        ),
    );
    expected_failures.push(
        harness.install(
            ResourceBuilder::module("transitive", v("1.0")).import_package("direct.api", None),
        ),
    );
    harness.install(
        ResourceBuilder::module("fine", v("1.0")).export_package("fine.api", v("1.0")),
    );
    // "direct" would provide this, but fails itself.
    harness.install(
        ResourceBuilder::module("direct2", v("1.0"))
            .export_package("direct.api", v("1.0"))
            .import_package("missing.api", None),
    );
    expected_failures.push(harness.index.resources()[3].clone());

    let mut wirings = WiringMap::new();
    let outcome = harness.resolve_and_merge(&mut wirings);

    for resource in harness.index.resources() {
        if wirings.contains_key(&resource.key()) {
            continue;
        }
        assert!(
            !outcome.report.entries_for(resource.key()).is_empty(),
            "unresolved {resource} has no report entry"
        );
    }
    for failure in expected_failures {
        assert!(!wirings.contains_key(&failure.key()));
    }
}

/// Randomized singleton groups: whatever the shapes, no two resolved
/// resources may share a singleton symbolic name, and every loser is
/// diagnosed.
#[test]
fn test_singleton_uniqueness_over_random_groups() {
    for seed in 0..16u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let harness = Harness::with_config(ResolverConfig::with_batch_size(
            rng.gen_range(1..4),
        ));

        let group_count = rng.gen_range(1..4usize);
        let mut installed: Vec<Arc<Resource>> = Vec::new();
        for group in 0..group_count {
            let name = format!("group{group}");
            let members = rng.gen_range(1..5usize);
            for _ in 0..members {
                let version = Version::new(rng.gen_range(0..4), rng.gen_range(0..10), 0);
                let singleton = rng.gen_bool(0.7);
                installed.push(
                    harness.install(
                        ResourceBuilder::module(&name, version).singleton(singleton),
                    ),
                );
            }
        }

        let mut wirings = WiringMap::new();
        let outcome = harness.resolve_and_merge(&mut wirings);

        let mut resolved_singletons: HashMap<String, Vec<ResourceKey>> = HashMap::new();
        for resource in &installed {
            if resource.is_singleton() && wirings.contains_key(&resource.key()) {
                resolved_singletons
                    .entry(resource.symbolic_name().to_string())
                    .or_default()
                    .push(resource.key());
            }
        }
        for (name, keys) in resolved_singletons {
            assert_eq!(
                keys.len(),
                1,
                "seed {seed}: multiple resolved singletons named {name}: {keys:?}"
            );
        }

        // Singleton losers are never silent.
        for resource in &installed {
            if resource.is_singleton() && !wirings.contains_key(&resource.key()) {
                assert!(
                    !outcome.report.entries_for(resource.key()).is_empty(),
                    "seed {seed}: disabled singleton {resource} has no report entry"
                );
            }
        }
    }
}

/// Independent resolves on separate threads, each with its own token and
/// snapshot copy, do not interfere.
#[test]
fn test_concurrent_resolves_on_distinct_threads() {
    use modweave_resolver::ResolveToken;

    let harness = Harness::new();
    harness.install(ResourceBuilder::module("lib", v("1.0")).export_package("lib.api", v("1.0")));
    harness.install(ResourceBuilder::module("app", v("1.0")).import_package("lib.api", None));
    let resources = harness.index.resources();

    std::thread::scope(|scope| {
        let mut handles = Vec::new();
        for _ in 0..4 {
            let resolver = harness.resolver();
            let resources = resources.clone();
            handles.push(scope.spawn(move || {
                let token = ResolveToken::new();
                let outcome = resolver
                    .resolve_delta(&token, &resources, false, &resources, &WiringMap::new())
                    .unwrap();
                assert_eq!(outcome.delta.len(), 2);
                assert!(outcome.report.is_empty());
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
    });
}

/// Re-resolving after an update installs a new generation: the ranking
/// prefers the newest revision of the same module.
#[test]
fn test_update_prefers_newest_generation() {
    let harness = Harness::new();
    let gen0 = harness.install(
        ResourceBuilder::module("lib", v("1.0")).export_package("lib.api", v("1.0")),
    );
    let gen1 = harness.index.install_revision(
        gen0.key().module,
        ResourceBuilder::module("lib", v("1.0")).export_package("lib.api", v("1.0")),
    );
    let app = harness.install(
        ResourceBuilder::module("app", v("1.0")).import_package("lib.api", None),
    );

    let mut wirings = WiringMap::new();
    harness.resolve_and_merge(&mut wirings);

    assert_eq!(
        wirings[&app.key()].required_wires()[0].provider().key(),
        gen1.key()
    );
}
