//! Installed-distribution sources.
//!
//! The graph builder only needs `{name, version, requires}` per installed
//! distribution. Two sources are provided: a JSON listing produced by an
//! external inspector, and a scan of a `site-packages` directory reading each
//! `*.dist-info/METADATA` file.

use reqlock_schema::PackageName;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum InspectError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse distribution listing {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstalledDistribution {
    pub name: String,
    pub version: String,
    /// Direct requirements as PEP 508 strings, markers included.
    #[serde(default, alias = "requires_dist")]
    pub requires: Vec<String>,
}

impl InstalledDistribution {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            requires: Vec::new(),
        }
    }

    #[must_use]
    pub fn requires<I, S>(mut self, requires: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires.extend(requires.into_iter().map(Into::into));
        self
    }

    pub fn package_name(&self) -> PackageName {
        PackageName::new(self.name.as_str())
    }
}

/// Anything that can enumerate installed distributions.
pub trait DistributionSource {
    fn distributions(&self) -> Result<Vec<InstalledDistribution>, InspectError>;
}

impl DistributionSource for [InstalledDistribution] {
    fn distributions(&self) -> Result<Vec<InstalledDistribution>, InspectError> {
        Ok(self.to_vec())
    }
}

impl DistributionSource for Vec<InstalledDistribution> {
    fn distributions(&self) -> Result<Vec<InstalledDistribution>, InspectError> {
        Ok(self.clone())
    }
}

/// A JSON array of [`InstalledDistribution`] on disk.
pub struct JsonListing {
    path: PathBuf,
}

impl JsonListing {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DistributionSource for JsonListing {
    fn distributions(&self) -> Result<Vec<InstalledDistribution>, InspectError> {
        let content = fs::read_to_string(&self.path).map_err(|source| InspectError::Io {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| InspectError::Json {
            path: self.path.clone(),
            source,
        })
    }
}

/// A `site-packages` directory.
pub struct SitePackages {
    root: PathBuf,
}

impl SitePackages {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl DistributionSource for SitePackages {
    fn distributions(&self) -> Result<Vec<InstalledDistribution>, InspectError> {
        if !self.root.is_dir() {
            return Err(InspectError::NotADirectory(self.root.clone()));
        }
        let io_err = |source| InspectError::Io {
            path: self.root.clone(),
            source,
        };

        let mut dirs: Vec<PathBuf> = fs::read_dir(&self.root)
            .map_err(io_err)?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| {
                p.is_dir()
                    && p.extension()
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("dist-info"))
            })
            .collect();
        dirs.sort();

        let mut out = Vec::with_capacity(dirs.len());
        for dir in dirs {
            let metadata = dir.join("METADATA");
            let text = match fs::read_to_string(&metadata) {
                Ok(text) => text,
                Err(e) => {
                    warn!("skipping {}: {e}", metadata.display());
                    continue;
                }
            };
            match parse_metadata(&text) {
                Some(dist) => {
                    debug!("found {} {} in {}", dist.name, dist.version, dir.display());
                    out.push(dist);
                }
                None => warn!("skipping {}: missing Name or Version", metadata.display()),
            }
        }
        Ok(out)
    }
}

/// Read `Name`, `Version` and every `Requires-Dist` from core metadata.
///
/// Only the header block is read; parsing stops at the first blank line.
pub fn parse_metadata(text: &str) -> Option<InstalledDistribution> {
    let mut name = None;
    let mut version = None;
    let mut requires = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            break;
        }
        // Continuation lines belong to long free-text fields.
        if line.starts_with([' ', '\t']) {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "name" => name = Some(value.to_owned()),
            "version" => version = Some(value.to_owned()),
            "requires-dist" => requires.push(value.to_owned()),
            _ => {}
        }
    }

    Some(InstalledDistribution {
        name: name.filter(|n| !n.is_empty())?,
        version: version.filter(|v| !v.is_empty())?,
        requires,
    })
}
