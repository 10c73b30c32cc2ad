use crate::manifest::{ManifestError, Source};
use crate::normalize::NormalizedManifest;
use crate::record::{LockedPackage, PackageEntry};
use crate::types::{Category, ManifestDigest, PackageName};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const LOCK_SPEC_VERSION: u32 = 6;
pub const DIGEST_ALGORITHM: &str = "blake3";

#[derive(Debug, Error)]
pub enum LockError {
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),
    #[error("lock file I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("lock file JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported pipfile-spec {0}, expected 6")]
    UnsupportedSpec(u32),
    #[error("lock file manifest drift: {0}")]
    ManifestDrift(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockMeta {
    /// Digest of the normalized manifest, keyed by algorithm.
    #[serde(default)]
    pub hash: BTreeMap<String, String>,
    #[serde(rename = "pipfile-spec")]
    pub pipfile_spec: u32,
    #[serde(default)]
    pub requires: BTreeMap<String, String>,
    #[serde(default)]
    pub sources: Vec<Source>,
}

/// A `Pipfile.lock`-shaped lock file.
///
/// Sections are keyed by lock section name (`default`, `develop`, or a custom
/// category) and then by canonical package name. Both levels are ordered maps,
/// so the serialized form is deterministic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockFile {
    #[serde(rename = "_meta")]
    pub meta: LockMeta,
    #[serde(flatten)]
    pub sections: BTreeMap<String, BTreeMap<String, PackageEntry>>,
}

impl LockFile {
    /// An empty lock for `normalized`, with the two standard sections present.
    pub fn new(normalized: &NormalizedManifest) -> Result<Self, LockError> {
        let mut lock = Self {
            meta: LockMeta {
                hash: BTreeMap::new(),
                pipfile_spec: LOCK_SPEC_VERSION,
                requires: BTreeMap::new(),
                sources: Vec::new(),
            },
            sections: BTreeMap::new(),
        };
        for category in [Category::default_packages(), Category::dev_packages()] {
            lock.sections
                .insert(category.lock_section().to_owned(), BTreeMap::new());
        }
        lock.refresh_meta(normalized)?;
        Ok(lock)
    }

    pub fn digest(&self) -> Option<&str> {
        self.meta.hash.get(DIGEST_ALGORITHM).map(String::as_str)
    }

    pub fn section(&self, category: &Category) -> Option<&BTreeMap<String, PackageEntry>> {
        self.sections.get(category.lock_section())
    }

    /// The record for `name` in `category`'s section, matched by canonical name.
    pub fn find(&self, category: &Category, name: &PackageName) -> Option<&PackageEntry> {
        let section = self.section(category)?;
        section.get(name.as_str()).or_else(|| {
            section
                .iter()
                .find(|(key, _)| name.matches(key))
                .map(|(_, entry)| entry)
        })
    }

    pub fn contains(&self, category: &Category, name: &PackageName) -> bool {
        self.find(category, name).is_some()
    }

    /// Replace `category`'s section with `records` and refresh the metadata.
    pub fn apply(
        &mut self,
        category: &Category,
        records: &[LockedPackage],
        normalized: &NormalizedManifest,
    ) -> Result<(), LockError> {
        let section = records
            .iter()
            .map(|record| {
                (
                    PackageName::new(record.name.as_str()).as_str().to_owned(),
                    record.entry.clone(),
                )
            })
            .collect();
        self.sections
            .insert(category.lock_section().to_owned(), section);
        self.refresh_meta(normalized)
    }

    fn refresh_meta(&mut self, normalized: &NormalizedManifest) -> Result<(), LockError> {
        let digest = normalized.digest()?;
        self.meta.hash = BTreeMap::from([(DIGEST_ALGORITHM.to_owned(), digest.into_inner())]);
        self.meta.requires.clone_from(&normalized.requires);
        self.meta.sources.clone_from(&normalized.sources);
        Ok(())
    }

    /// True when the manifest changed since this lock was written.
    pub fn is_stale(&self, normalized: &NormalizedManifest) -> Result<bool, LockError> {
        let current: ManifestDigest = normalized.digest()?;
        Ok(self.digest() != Some(current.as_str()))
    }

    /// Check that every package the manifest declares is locked.
    ///
    /// This catches cases where the manifest changed but the lock wasn't updated.
    pub fn verify_manifest_intent(&self, normalized: &NormalizedManifest) -> Result<(), LockError> {
        for (category, declared) in &normalized.categories {
            let category = Category::new(category.as_str());
            for name in declared.keys() {
                if !self.contains(&category, &PackageName::new(name.as_str())) {
                    return Err(LockError::ManifestDrift(format!(
                        "package '{name}' is in [{category}] but not in lock section '{}'. Run 'reqlock lock' to re-resolve.",
                        category.lock_section()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), LockError> {
        let path = path.as_ref();
        let mut content = serde_json::to_string_pretty(self)?;
        content.push('\n');
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        std::io::Write::write_all(&mut tmp, content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| LockError::Io(e.error))?;
        // Fsync parent directory to ensure rename durability on power loss.
        if let Ok(f) = fs::File::open(dir) {
            let _ = f.sync_all();
        }
        Ok(())
    }

    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self, LockError> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(input: &str) -> Result<Self, LockError> {
        let lock: Self = serde_json::from_str(input)?;
        if lock.meta.pipfile_spec != LOCK_SPEC_VERSION {
            return Err(LockError::UnsupportedSpec(lock.meta.pipfile_spec));
        }
        Ok(lock)
    }
}
