//! Package records as they appear in manifests, lock files and resolver output.

use crate::types::PackageName;
use crate::version::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A marker field as found in the wild: one expression, a list of clauses,
/// or a table of `variable = "<op> <value>"` pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MarkerValue {
    Expr(String),
    Clauses(Vec<String>),
    Table(BTreeMap<String, String>),
}

impl From<&str> for MarkerValue {
    fn from(s: &str) -> Self {
        Self::Expr(s.to_owned())
    }
}

/// The field bag shared by lock records, manifest tables and resolver results.
///
/// Keys without a dedicated field (VCS keys, `editable`, inline marker
/// variables such as `os_name`) are kept in `fields` so nothing is lost when a
/// record is read and written back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extras: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hashes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markers: Option<MarkerValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl PackageEntry {
    pub fn with_version(version: impl Into<String>) -> Self {
        Self {
            version: Some(version.into()),
            ..Self::default()
        }
    }

    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn field_bool(&self, key: &str) -> bool {
        self.fields.get(key).and_then(Value::as_bool).unwrap_or(false)
    }
}

/// One package chosen by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedCandidate {
    pub name: String,
    #[serde(flatten)]
    pub entry: PackageEntry,
    /// Direct runtime requirements of the chosen distribution.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

impl ResolvedCandidate {
    pub fn new(name: impl Into<String>, entry: PackageEntry) -> Self {
        Self {
            name: name.into(),
            entry,
            dependencies: Vec::new(),
        }
    }

    pub fn package_name(&self) -> PackageName {
        PackageName::new(&self.name)
    }

    pub fn is_prerelease(&self) -> bool {
        self.entry
            .version
            .as_deref()
            .map(crate::specifier::strip_version)
            .and_then(|v| Version::parse(v).ok())
            .is_some_and(|v| v.is_prerelease())
    }
}

/// A canonical record ready to be written into a lock section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedPackage {
    pub name: String,
    #[serde(flatten)]
    pub entry: PackageEntry,
}

impl From<ResolvedCandidate> for LockedPackage {
    fn from(candidate: ResolvedCandidate) -> Self {
        Self {
            name: candidate.name,
            entry: candidate.entry,
        }
    }
}
