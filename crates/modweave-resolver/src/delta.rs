//! Wiring delta construction.
//!
//! Turns per-resource wire lists from the solver into new or extended
//! [`Wiring`] records. Wire tuples are shared between the provider and
//! requirer views; declaration order is preserved through every transform.
//!
//! Each step is an explicit transform over owned lists: entries are only
//! ever removed or inserted at computed positions, never mutated in place.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::debug;

use modweave_types::namespaces::{
    self, attrs, directives, is_non_payload_capability, is_non_payload_requirement, PACKAGE,
};
use modweave_types::{
    Capability, Requirement, Resolution, Resource, ResourceKey, Wire, Wiring, WiringMap,
};

use crate::targets;

/// Wires resolved for one resource, requirer-side.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedWires {
    pub resource: Arc<Resource>,
    pub wires: Vec<Wire>,
}

/// Accumulated solver output for one resolve operation.
pub(crate) type ResultMap = HashMap<ResourceKey, ResolvedWires>;

type ProvidedWireMap = HashMap<Capability, SmallVec<[Wire; 1]>>;

/// Build the wiring delta for a result against a wiring snapshot.
///
/// Resources with no prior wiring get a fresh [`Wiring`]; already-wired
/// resources (dynamic imports, hosts gaining fragments, providers gaining
/// wires) get an extension that never disturbs existing entries' relative
/// order.
pub(crate) fn generate_delta(result: &ResultMap, wirings: &WiringMap) -> WiringMap {
    // Group the shared wire tuples by provider capability and by requirer,
    // so both sides see the same wires. Requirers are walked in key order
    // so per-capability wire lists come out the same regardless of how the
    // result accumulated.
    let mut ordered: Vec<&ResolvedWires> = result.values().collect();
    ordered.sort_by_key(|resolved| resolved.resource.key());
    let mut provided: HashMap<ResourceKey, (Arc<Resource>, ProvidedWireMap)> = HashMap::new();
    let mut required: HashMap<ResourceKey, (Arc<Resource>, Vec<Wire>)> = HashMap::new();
    for resolved in ordered {
        let mut required_wires = Vec::with_capacity(resolved.wires.len());
        for wire in &resolved.wires {
            required_wires.push(wire.clone());
            let provider = wire.provider();
            let entry = provided
                .entry(provider.key())
                .or_insert_with(|| (Arc::clone(provider), ProvidedWireMap::new()));
            entry
                .1
                .entry(wire.capability().clone())
                .or_default()
                .push(wire.clone());
        }
        required.insert(resolved.resource.key(), (Arc::clone(&resolved.resource), required_wires));
    }

    let mut delta = WiringMap::new();
    for (key, (resource, required_wires)) in &required {
        let provided_map = provided.get(key).map(|(_, map)| map);
        let wiring = match wirings.get(key) {
            None => create_new_wiring(resource, provided_map, required_wires),
            // Extension of an already-wired resource (dynamic import case).
            Some(existing) => {
                create_wiring_delta(resource, existing, provided_map, Some(required_wires))
            }
        };
        debug!(target: targets::WIRING, %wiring, "generated wiring");
        delta.insert(*key, Arc::new(wiring));
    }
    // Already-resolved providers gain provided wires, and hosts may gain
    // newly attached fragments.
    for (key, (resource, provided_map)) in &provided {
        if delta.contains_key(key) {
            continue;
        }
        if let Some(existing) = wirings.get(key) {
            let wiring = create_wiring_delta(resource, existing, Some(provided_map), None);
            debug!(target: targets::WIRING, %wiring, "extended wiring");
            delta.insert(*key, Arc::new(wiring));
        }
    }
    delta
}

fn create_new_wiring(
    resource: &Arc<Resource>,
    provided_map: Option<&ProvidedWireMap>,
    required_wires: &[Wire],
) -> Wiring {
    let mut capabilities = resource.capabilities();
    let mut requirements = resource.requirements();

    if resource.is_fragment() {
        // A fragment's own wiring keeps only non-payload declarations; the
        // payload lives in the host's wiring.
        remove_payload_content(&mut capabilities, &mut requirements);
    } else if let Some(host_capability) = resource.host_capability() {
        if let Some(host_wires) = provided_map.and_then(|map| map.get(&host_capability)) {
            add_payload_content(host_wires, &mut capabilities, &mut requirements);
        }
    }

    remove_non_effective_capabilities(&mut capabilities);
    remove_non_effective_requirements(&mut requirements, required_wires);
    let substituted = remove_substituted_capabilities(&mut capabilities, required_wires);

    let mut provided = Vec::new();
    add_provided_wires(provided_map, &mut provided, &capabilities);

    Wiring::new(
        Arc::clone(resource),
        capabilities,
        requirements,
        provided,
        required_wires.to_vec(),
        substituted,
    )
}

fn create_wiring_delta(
    resource: &Arc<Resource>,
    existing: &Wiring,
    provided_map: Option<&ProvidedWireMap>,
    required_wires: Option<&Vec<Wire>>,
) -> Wiring {
    let mut capabilities = existing.capabilities().to_vec();
    let mut requirements = existing.requirements().to_vec();

    // Newly attached fragments contribute payload first, so the wire
    // ordering below sees the final capability positions.
    if let Some(map) = provided_map {
        if let Some(host_capability) = resource.host_capability() {
            if let Some(new_host_wires) = map.get(&host_capability) {
                add_payload_content(new_host_wires, &mut capabilities, &mut requirements);
            }
        }
    }

    let mut provided = existing.provided_wires().to_vec();
    add_provided_wires(provided_map, &mut provided, &capabilities);

    let mut required = existing.required_wires().to_vec();
    if let Some(new_required) = required_wires {
        add_required_wires(new_required, &mut required, &requirements);
    }

    // Substitution is computed once, when the wiring is first created.
    let substituted = existing.substituted_names().clone();

    Wiring::new(
        Arc::clone(resource),
        capabilities,
        requirements,
        provided,
        required,
        substituted,
    )
}

fn remove_payload_content(capabilities: &mut Vec<Capability>, requirements: &mut Vec<Requirement>) {
    capabilities.retain(|c| is_non_payload_capability(c.namespace()));
    requirements.retain(|r| is_non_payload_requirement(r.namespace()));
}

/// Merge the payload of every fragment attached through `host_wires` into
/// the host's capability and requirement lists, grouped by namespace and
/// inserted after existing same-namespace entries.
fn add_payload_content(
    host_wires: &[Wire],
    capabilities: &mut Vec<Capability>,
    requirements: &mut Vec<Requirement>,
) {
    for host_wire in host_wires {
        let fragment = host_wire.requirer();

        let mut current_namespace: Option<String> = None;
        let mut cursor = 0usize;
        for fragment_capability in fragment.capabilities() {
            let namespace = fragment_capability.namespace();
            if is_non_payload_capability(namespace) {
                continue;
            }
            if current_namespace.as_deref() != Some(namespace) {
                current_namespace = Some(namespace.to_string());
                cursor = capabilities
                    .iter()
                    .rposition(|c| c.namespace() == namespace)
                    .map(|i| i + 1)
                    .unwrap_or(0);
            }
            capabilities.insert(cursor, fragment_capability);
            cursor += 1;
        }

        let mut current_namespace: Option<String> = None;
        let mut cursor = 0usize;
        for fragment_requirement in fragment.requirements() {
            let namespace = fragment_requirement.namespace();
            if is_non_payload_requirement(namespace) {
                continue;
            }
            if current_namespace.as_deref() != Some(namespace) {
                current_namespace = Some(namespace.to_string());
                let dynamic = fragment_requirement.is_dynamic();
                // Dynamic requirements stay last within their namespace
                // group: a non-dynamic insert skips past them.
                cursor = requirements
                    .iter()
                    .rposition(|r| r.namespace() == namespace && (dynamic || !r.is_dynamic()))
                    .map(|i| i + 1)
                    .unwrap_or(0);
            }
            requirements.insert(cursor, fragment_requirement);
            cursor += 1;
        }
    }
}

fn remove_non_effective_capabilities(capabilities: &mut Vec<Capability>) {
    capabilities.retain(|capability| {
        match capability.directive(directives::EFFECTIVE) {
            None | Some(directives::EFFECTIVE_RESOLVE) => true,
            Some(_) => {
                debug!(
                    target: targets::WIRING,
                    %capability,
                    "capability dropped from wiring: not effective at resolve time"
                );
                false
            }
        }
    });
}

/// Remove non-effective requirements and optional requirements that did not
/// resolve. Dynamic requirements stay: they are satisfied lazily.
fn remove_non_effective_requirements(requirements: &mut Vec<Requirement>, required_wires: &[Wire]) {
    requirements.retain(|requirement| {
        if !matches!(
            requirement.directive(directives::EFFECTIVE),
            None | Some(directives::EFFECTIVE_RESOLVE)
        ) {
            return false;
        }
        if requirement.resolution() == Resolution::Optional {
            return required_wires
                .iter()
                .any(|wire| wire.requirement() == requirement);
        }
        true
    });
}

/// Detect package substitution: an own package export shadowed by an import
/// of the same name is removed from the capability list, and the name is
/// recorded for later candidate filtering.
fn remove_substituted_capabilities(
    capabilities: &mut Vec<Capability>,
    required_wires: &[Wire],
) -> BTreeSet<String> {
    let mut substituted = BTreeSet::new();
    for wire in required_wires {
        if wire.capability().namespace() != PACKAGE {
            continue;
        }
        let Some(package) = wire
            .capability()
            .attribute(attrs::PACKAGE)
            .map(|v| v.to_string())
        else {
            continue;
        };
        capabilities.retain(|capability| {
            let shadowed = capability.namespace() == PACKAGE
                && capability.attribute(attrs::PACKAGE).map(|v| v.to_string()).as_deref()
                    == Some(package.as_str());
            if shadowed {
                substituted.insert(package.clone());
            }
            !shadowed
        });
    }
    substituted
}

/// Append new provided wires in capability-list order, skipping wires the
/// list already holds. When extending a non-empty list, re-sort to restore
/// capability positions without disturbing the relative order of wires on
/// the same capability.
fn add_provided_wires(
    provided_map: Option<&ProvidedWireMap>,
    existing: &mut Vec<Wire>,
    ordered_capabilities: &[Capability],
) {
    let Some(map) = provided_map else { return };
    let original_len = existing.len();
    for capability in ordered_capabilities {
        if let Some(new_wires) = map.get(capability) {
            for wire in new_wires {
                if !existing.contains(wire) {
                    existing.push(wire.clone());
                }
            }
        }
    }
    if original_len != 0 {
        existing.sort_by_key(|wire| position_of(ordered_capabilities, wire.capability()));
    }
}

/// Append new required wires, skipping duplicates and restoring
/// requirement-list order when extending a non-empty list.
fn add_required_wires(
    to_add: &[Wire],
    existing: &mut Vec<Wire>,
    ordered_requirements: &[Requirement],
) {
    let original_len = existing.len();
    for wire in to_add {
        if !existing.contains(wire) {
            existing.push(wire.clone());
        }
    }
    if original_len != 0 {
        existing
            .sort_by_key(|wire| position_of(ordered_requirements, wire.requirement()));
    }
}

/// Position in the ordered list; entries not present sort first.
fn position_of<T: PartialEq>(ordered: &[T], item: &T) -> isize {
    ordered
        .iter()
        .position(|entry| entry == item)
        .map(|i| i as isize)
        .unwrap_or(-1)
}

/// True for fragments whose requirements are all non-payload (host and
/// execution environment only).
pub(crate) fn is_non_payload_fragment(resource: &Arc<Resource>) -> bool {
    if !resource.is_fragment() {
        return false;
    }
    resource
        .requirement_data()
        .iter()
        .all(|r| namespaces::is_non_payload_requirement(&r.namespace))
}

#[cfg(test)]
mod tests {
    use super::*;
    use modweave_types::{ResourceBuilder, Version, VersionRange};

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    fn resolved(resource: &Arc<Resource>, wires: Vec<Wire>) -> (ResourceKey, ResolvedWires) {
        (
            resource.key(),
            ResolvedWires {
                resource: Arc::clone(resource),
                wires,
            },
        )
    }

    #[test]
    fn test_new_wiring_for_simple_module() {
        let provider = ResourceBuilder::module("lib", v("1.0"))
            .export_package("lib.api", v("1.0"))
            .build(1);
        let consumer = ResourceBuilder::module("app", v("1.0"))
            .import_package("lib.api", None)
            .build(2);

        let capability = provider.capabilities_in(PACKAGE)[0].clone();
        let requirement = consumer.requirements_in(PACKAGE)[0].clone();
        let wire = Wire::new(
            capability,
            Arc::clone(&provider),
            requirement,
            Arc::clone(&consumer),
        );

        let result: ResultMap = [
            resolved(&provider, vec![]),
            resolved(&consumer, vec![wire.clone()]),
        ]
        .into_iter()
        .collect();

        let delta = generate_delta(&result, &WiringMap::new());
        assert_eq!(delta.len(), 2);

        let provider_wiring = &delta[&provider.key()];
        assert_eq!(provider_wiring.provided_wires(), &[wire.clone()]);
        assert!(provider_wiring.required_wires().is_empty());

        let consumer_wiring = &delta[&consumer.key()];
        assert_eq!(consumer_wiring.required_wires(), &[wire]);
        assert!(consumer_wiring.provided_wires().is_empty());
    }

    #[test]
    fn test_unresolved_optional_requirement_removed() {
        let consumer = ResourceBuilder::module("app", v("1.0"))
            .import_package_optional("extras", None)
            .build(1);
        let result: ResultMap = [resolved(&consumer, vec![])].into_iter().collect();
        let delta = generate_delta(&result, &WiringMap::new());
        let wiring = &delta[&consumer.key()];
        assert!(wiring.requirements().is_empty());
    }

    #[test]
    fn test_dynamic_requirement_survives_in_wiring() {
        let consumer = ResourceBuilder::module("app", v("1.0"))
            .import_package_dynamic("plugins.*", None)
            .build(1);
        let result: ResultMap = [resolved(&consumer, vec![])].into_iter().collect();
        let delta = generate_delta(&result, &WiringMap::new());
        assert_eq!(delta[&consumer.key()].requirements().len(), 1);
    }

    #[test]
    fn test_substituted_export_removed_and_recorded() {
        let provider = ResourceBuilder::module("lib", v("2.0"))
            .export_package("shared.api", v("2.0"))
            .build(1);
        // Exports and imports the same package; the import wins.
        let substituting = ResourceBuilder::module("app", v("1.0"))
            .export_package("shared.api", v("1.0"))
            .import_package("shared.api", Some(VersionRange::at_least(v("2.0"))))
            .build(2);

        let wire = Wire::new(
            provider.capabilities_in(PACKAGE)[0].clone(),
            Arc::clone(&provider),
            substituting.requirements_in(PACKAGE)[0].clone(),
            Arc::clone(&substituting),
        );
        let result: ResultMap = [
            resolved(&provider, vec![]),
            resolved(&substituting, vec![wire]),
        ]
        .into_iter()
        .collect();

        let delta = generate_delta(&result, &WiringMap::new());
        let wiring = &delta[&substituting.key()];
        assert!(wiring.substituted_names().contains("shared.api"));
        assert!(wiring.capabilities().iter().all(|c| c.namespace() != PACKAGE));
        assert!(wiring.is_substituted(&substituting.capabilities_in(PACKAGE)[0]));
    }

    #[test]
    fn test_fragment_payload_merged_into_host() {
        let host = ResourceBuilder::module("host", v("1.0"))
            .export_package("host.api", v("1.0"))
            .build(1);
        let fragment = ResourceBuilder::fragment("host.extra", v("1.0"), "host", None)
            .export_package("host.extra", v("1.0"))
            .build(2);

        let host_capability = host.host_capability().unwrap();
        let host_requirement = fragment.requirements_in(namespaces::HOST)[0].clone();
        let host_wire = Wire::new(
            host_capability,
            Arc::clone(&host),
            host_requirement,
            Arc::clone(&fragment),
        );

        let result: ResultMap = [
            resolved(&host, vec![]),
            resolved(&fragment, vec![host_wire.clone()]),
        ]
        .into_iter()
        .collect();

        let delta = generate_delta(&result, &WiringMap::new());

        // Host wiring gains the fragment's payload capability, grouped after
        // its own package exports.
        let host_wiring = &delta[&host.key()];
        let packages: Vec<String> = host_wiring
            .capabilities()
            .iter()
            .filter(|c| c.namespace() == PACKAGE)
            .map(|c| c.attribute(attrs::PACKAGE).unwrap().to_string())
            .collect();
        assert_eq!(packages, vec!["host.api", "host.extra"]);
        assert_eq!(host_wiring.provided_wires(), &[host_wire.clone()]);

        // Fragment wiring keeps only non-payload content.
        let fragment_wiring = &delta[&fragment.key()];
        assert!(fragment_wiring
            .capabilities()
            .iter()
            .all(|c| is_non_payload_capability(c.namespace())));
        assert_eq!(fragment_wiring.required_wires(), &[host_wire]);
    }

    #[test]
    fn test_extension_delta_preserves_existing_wires() {
        let host = ResourceBuilder::module("host", v("1.0"))
            .export_package("host.api", v("1.0"))
            .build(1);
        let consumer = ResourceBuilder::module("app", v("1.0"))
            .import_package("host.api", None)
            .build(2);

        // First cycle: consumer wires to host.
        let first_wire = Wire::new(
            host.capabilities_in(PACKAGE)[0].clone(),
            Arc::clone(&host),
            consumer.requirements_in(PACKAGE)[0].clone(),
            Arc::clone(&consumer),
        );
        let first: ResultMap = [
            resolved(&host, vec![]),
            resolved(&consumer, vec![first_wire.clone()]),
        ]
        .into_iter()
        .collect();
        let mut wirings = WiringMap::new();
        for (key, wiring) in generate_delta(&first, &WiringMap::new()) {
            wirings.insert(key, wiring);
        }

        // Second cycle: a fragment attaches to the already-resolved host.
        let fragment = ResourceBuilder::fragment("host.nls", v("1.0"), "host", None).build(3);
        let host_wire = Wire::new(
            host.host_capability().unwrap(),
            Arc::clone(&host),
            fragment.requirements_in(namespaces::HOST)[0].clone(),
            Arc::clone(&fragment),
        );
        let second: ResultMap = [resolved(&fragment, vec![host_wire.clone()])]
            .into_iter()
            .collect();
        let delta = generate_delta(&second, &wirings);

        let host_wiring = &delta[&host.key()];
        // The original package wire survives; the list re-sorts into
        // capability-declaration order, where the host capability precedes
        // the package capability.
        assert_eq!(
            host_wiring.provided_wires(),
            &[host_wire.clone(), first_wire.clone()]
        );

        let fragment_wiring = &delta[&fragment.key()];
        assert_eq!(fragment_wiring.required_wires(), &[host_wire]);
    }

    #[test]
    fn test_non_payload_fragment_detection() {
        let plain = ResourceBuilder::fragment("f", v("1.0"), "host", None).build(1);
        assert!(is_non_payload_fragment(&plain));

        let with_ee = ResourceBuilder::fragment("f", v("1.0"), "host", None)
            .require_execution_environment("wasm")
            .build(2);
        assert!(is_non_payload_fragment(&with_ee));

        let with_payload = ResourceBuilder::fragment("f", v("1.0"), "host", None)
            .import_package("util", None)
            .build(3);
        assert!(!is_non_payload_fragment(&with_payload));

        let not_fragment = ResourceBuilder::module("m", v("1.0")).build(4);
        assert!(!is_non_payload_fragment(&not_fragment));
    }
}
