//! Serde descriptors for declaring module sets in JSON.
//!
//! A module set is a JSON array of [`ResourceDescriptor`]s. Packages can be
//! declared through the `exports`/`imports` sugar (`"pkg"`, `"pkg@1.2"`,
//! `"pkg@[1.0,2.0)"`) or as raw capabilities/requirements.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use modweave_types::namespaces::attrs;
use modweave_types::{
    CapabilityData, Filter, RequirementData, ResourceBuilder, Value, Version, VersionRange,
};

/// One module declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub name: String,
    pub version: String,
    /// Target host name (optionally `host@[range]`); presence makes this a
    /// fragment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragment_of: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub singleton: bool,
    /// Host attachment policy: `always` (default) or `never`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
    /// Exported packages: `"pkg"` or `"pkg@1.2"`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exports: Vec<String>,
    /// Imported packages: `"pkg"`, `"pkg@[1.0,2.0)"`, with optional
    /// `?` (optional) or `~` (dynamic) prefix.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<CapabilityDecl>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<RequirementDecl>,
}

/// A raw capability declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityDecl {
    pub namespace: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub directives: BTreeMap<String, String>,
}

/// A raw requirement declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequirementDecl {
    pub namespace: String,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub directives: BTreeMap<String, String>,
}

impl ResourceDescriptor {
    /// Turn this descriptor into a [`ResourceBuilder`].
    pub fn into_builder(self) -> Result<ResourceBuilder> {
        let version: Version = self
            .version
            .parse()
            .with_context(|| format!("module '{}': bad version '{}'", self.name, self.version))?;

        let mut builder = match &self.fragment_of {
            None => ResourceBuilder::module(&self.name, version),
            Some(host_spec) => {
                let (host, range) = split_versioned(host_spec)
                    .with_context(|| format!("module '{}': bad fragment host", self.name))?;
                let range = range
                    .map(|r| r.parse::<VersionRange>())
                    .transpose()
                    .with_context(|| format!("module '{}': bad host range", self.name))?;
                ResourceBuilder::fragment(&self.name, version, &host, range)
            }
        };
        builder = builder.singleton(self.singleton);
        if let Some(policy) = &self.attachment {
            builder = builder.attachment_policy(policy);
        }

        for export in &self.exports {
            let (package, version) = split_versioned(export)
                .with_context(|| format!("module '{}': bad export '{export}'", self.name))?;
            let version = match version {
                None => Version::EMPTY,
                Some(v) => v
                    .parse()
                    .with_context(|| format!("module '{}': bad export '{export}'", self.name))?,
            };
            builder = builder.export_package(&package, version);
        }

        for import in &self.imports {
            let (spec, optional, dynamic) = match import.strip_prefix('?') {
                Some(rest) => (rest, true, false),
                None => match import.strip_prefix('~') {
                    Some(rest) => (rest, false, true),
                    None => (import.as_str(), false, false),
                },
            };
            let (package, range) = split_versioned(spec)
                .with_context(|| format!("module '{}': bad import '{import}'", self.name))?;
            let range = range
                .map(|r| r.parse::<VersionRange>())
                .transpose()
                .with_context(|| format!("module '{}': bad import '{import}'", self.name))?;
            builder = if optional {
                builder.import_package_optional(&package, range)
            } else if dynamic {
                builder.import_package_dynamic(&package, range)
            } else {
                builder.import_package(&package, range)
            };
        }

        for decl in self.capabilities {
            let mut data = CapabilityData::new(&decl.namespace);
            for (key, value) in decl.attributes {
                data = data.attribute(&key, decode_value(&key, value)?);
            }
            for (key, value) in decl.directives {
                data = data.directive(&key, &value);
            }
            builder = builder.capability(data);
        }

        for decl in self.requirements {
            let mut data = RequirementData::new(&decl.namespace);
            if let Some(filter) = &decl.filter {
                let parsed: Filter = filter
                    .parse()
                    .with_context(|| format!("module '{}': bad filter '{filter}'", self.name))?;
                data = data.filter(parsed);
            }
            for (key, value) in decl.directives {
                data = data.directive(&key, &value);
            }
            builder = builder.requirement(data);
        }

        Ok(builder)
    }
}

/// Split `name@version-or-range` into its parts.
fn split_versioned(spec: &str) -> Result<(String, Option<String>)> {
    let spec = spec.trim();
    if spec.is_empty() {
        bail!("empty name");
    }
    match spec.split_once('@') {
        None => Ok((spec.to_string(), None)),
        Some((name, version)) if !name.is_empty() && !version.is_empty() => {
            Ok((name.to_string(), Some(version.to_string())))
        }
        Some(_) => bail!("malformed '{spec}'"),
    }
}

/// Map a JSON attribute value to a typed [`Value`].
///
/// The `version` attribute key parses as a [`Version`]; other strings stay
/// strings.
fn decode_value(key: &str, value: serde_json::Value) -> Result<Value> {
    Ok(match value {
        serde_json::Value::String(s) if key == attrs::VERSION => {
            Value::Version(s.parse().with_context(|| format!("bad version '{s}'"))?)
        }
        serde_json::Value::String(s) => Value::Str(s),
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => bail!("non-integer number attribute '{key}'"),
        },
        serde_json::Value::Array(items) => Value::List(
            items
                .into_iter()
                .map(|i| decode_value(key, i))
                .collect::<Result<Vec<_>>>()?,
        ),
        other => bail!("unsupported attribute value for '{key}': {other}"),
    })
}

/// Parse a JSON module set.
pub fn load_set(json: &str) -> Result<Vec<ResourceDescriptor>> {
    serde_json::from_str(json).context("parsing module set")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ModuleIndex;
    use modweave_types::namespaces::PACKAGE;

    #[test]
    fn test_load_and_install_set() {
        let json = r#"[
            {"name": "util.text", "version": "1.2.0", "exports": ["util.text@1.2"]},
            {"name": "app", "version": "1.0.0", "imports": ["util.text@[1.0,2.0)", "?extras"]},
            {"name": "util.text.nls", "version": "1.0.0", "fragment_of": "util.text"}
        ]"#;
        let set = load_set(json).unwrap();
        assert_eq!(set.len(), 3);

        let index = ModuleIndex::new();
        let resources: Vec<_> = set
            .into_iter()
            .map(|d| index.install(d.into_builder().unwrap()))
            .collect();
        assert_eq!(resources[1].requirements_in(PACKAGE).len(), 2);
        assert!(resources[2].is_fragment());
    }

    #[test]
    fn test_bad_descriptors_rejected() {
        assert!(load_set("not json").is_err());

        let bad_version = ResourceDescriptor {
            name: "m".into(),
            version: "not.a.version".into(),
            fragment_of: None,
            singleton: false,
            attachment: None,
            exports: vec![],
            imports: vec![],
            capabilities: vec![],
            requirements: vec![],
        };
        assert!(bad_version.into_builder().is_err());

        let bad_import = ResourceDescriptor {
            name: "m".into(),
            version: "1.0".into(),
            fragment_of: None,
            singleton: false,
            attachment: None,
            exports: vec![],
            imports: vec!["pkg@".into()],
            capabilities: vec![],
            requirements: vec![],
        };
        assert!(bad_import.into_builder().is_err());
    }

    #[test]
    fn test_raw_capability_round_trip() {
        let json = r#"[{
            "name": "sys", "version": "1.0",
            "capabilities": [
                {"namespace": "modweave.ee", "attributes": {"ee": "wasm", "version": "2.0"}}
            ]
        }]"#;
        let set = load_set(json).unwrap();
        let index = ModuleIndex::new();
        let sys = index.install(set[0].clone().into_builder().unwrap());
        let caps = sys.capabilities_in(modweave_types::namespaces::EXECUTION_ENVIRONMENT);
        assert_eq!(caps.len(), 1);
        assert_eq!(
            caps[0].version(),
            "2.0".parse::<modweave_types::Version>().unwrap()
        );
    }
}
