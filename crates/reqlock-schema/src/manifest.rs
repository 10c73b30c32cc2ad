use crate::environment::MarkerEnvironment;
use crate::marker::MarkerError;
use crate::record::PackageEntry;
use crate::requirement::{Requirement, RequirementError};
use crate::types::{Category, PackageName};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse manifest: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("source '{0}' has an empty url")]
    EmptySourceUrl(String),
    #[error("source '{0}' is declared more than once")]
    DuplicateSource(String),
    #[error("package '{name}' is declared more than once in [{category}]")]
    DuplicatePackage { category: String, name: String },
    #[error("invalid entry for '{name}' in [{category}]: {source}")]
    InvalidEntry {
        category: String,
        name: String,
        #[source]
        source: RequirementError,
    },
    #[error("package '{name}' in [{category}] uses unknown index '{index}'")]
    UnknownIndex {
        category: String,
        name: String,
        index: String,
    },
    #[error("invalid marker override: {0}")]
    MarkerOverride(#[from] MarkerError),
}

/// A `Pipfile`-shaped project manifest.
///
/// Every top-level table that is not one of the known sections is a
/// dependency category, so `[packages]`, `[dev-packages]` and custom groups
/// such as `[docs]` all land in `categories`.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Manifest {
    #[serde(default, rename = "source", skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Source>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requires: BTreeMap<String, String>,
    /// Marker variable overrides used when evaluating markers.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resolver: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scripts: BTreeMap<String, toml::Value>,
    #[serde(default, rename = "pipenv", skip_serializing_if = "BTreeMap::is_empty")]
    pub settings: BTreeMap<String, toml::Value>,
    #[serde(flatten)]
    pub categories: BTreeMap<String, BTreeMap<String, ManifestEntry>>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Source {
    pub name: String,
    pub url: String,
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,
}

fn default_verify_ssl() -> bool {
    true
}

/// A user declaration: `requests = "*"` or `requests = { version = ">=2", ... }`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ManifestEntry {
    Specifier(String),
    Table(PackageEntry),
}

impl ManifestEntry {
    /// The declaration as a record; a bare string becomes its `version`.
    pub fn to_entry(&self) -> PackageEntry {
        match self {
            Self::Specifier(spec) => PackageEntry::with_version(spec.clone()),
            Self::Table(entry) => entry.clone(),
        }
    }

    pub fn index(&self) -> Option<&str> {
        match self {
            Self::Specifier(_) => None,
            Self::Table(entry) => entry.index.as_deref(),
        }
    }

    pub fn requirement(&self, name: &str) -> Result<Requirement, RequirementError> {
        Requirement::from_entry(name, &self.to_entry())
    }
}

/// Canonical package name to the index it must be fetched from.
pub type IndexLookup = BTreeMap<PackageName, String>;

impl Manifest {
    pub fn category(&self, category: &Category) -> Option<&BTreeMap<String, ManifestEntry>> {
        self.categories.get(category.as_str())
    }

    /// Declared category names, sorted.
    pub fn category_names(&self) -> impl Iterator<Item = Category> + '_ {
        self.categories.keys().map(|k| Category::new(k.as_str()))
    }

    /// Find a declaration by canonical name, whatever its spelling in the file.
    pub fn entry(&self, category: &Category, name: &PackageName) -> Option<&ManifestEntry> {
        self.category(category)?
            .iter()
            .find(|(declared, _)| name.matches(declared))
            .map(|(_, entry)| entry)
    }

    /// The declared requirement for `name`, if the category declares it.
    pub fn requirement(
        &self,
        category: &Category,
        name: &PackageName,
    ) -> Option<Result<Requirement, RequirementError>> {
        self.entry(category, name)
            .map(|entry| entry.requirement(name.original()))
    }

    /// Packages in `category` pinned to a named index.
    pub fn index_lookup(&self, category: &Category) -> IndexLookup {
        self.category(category)
            .into_iter()
            .flatten()
            .filter_map(|(name, entry)| {
                entry
                    .index()
                    .map(|index| (PackageName::new(name.as_str()), index.to_owned()))
            })
            .collect()
    }

    /// Marker variable values declared by the manifest: the `[requires]`
    /// python version first, then the `[resolver]` table.
    pub fn marker_overrides(&self) -> Vec<(&str, &str)> {
        let mut out = Vec::new();
        for key in ["python_version", "python_full_version"] {
            if let Some(value) = self.requires.get(key) {
                out.push((key, value.as_str()));
            }
        }
        out.extend(self.resolver.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        out
    }

    /// Overlay the manifest's marker overrides on `base`.
    pub fn marker_environment(
        &self,
        base: MarkerEnvironment,
    ) -> Result<MarkerEnvironment, ManifestError> {
        Ok(base.with_overrides(self.marker_overrides())?)
    }
}

pub fn parse_manifest_str(input: &str) -> Result<Manifest, ManifestError> {
    Ok(toml::from_str(input)?)
}

pub fn parse_manifest_file(path: impl AsRef<Path>) -> Result<Manifest, ManifestError> {
    let content = fs::read_to_string(path)?;
    parse_manifest_str(&content)
}
