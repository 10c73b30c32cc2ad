use crate::batch::{self, BatchInputs, ResolverOutput};
use crate::concurrency::ProjectLock;
use crate::graph::DependencyGraph;
use crate::inspect::DistributionSource;
use crate::reverse::ReverseIndex;
use crate::CoreError;
use reqlock_schema::{
    parse_manifest_file, Category, LockError, LockFile, LockedPackage, Manifest, MarkerEnvironment,
    PackageEntry, PackageName,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Project-level API: reads the manifest and lock file, drives the graph
/// builder and batch reconciliation, and writes the lock back.
pub struct Engine {
    manifest_path: PathBuf,
    lock_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct LockOptions {
    pub category: Category,
    /// `(variable, value)` pairs overlaid on the host and manifest markers.
    pub overrides: Vec<(String, String)>,
    /// Constraints added to whatever the resolver output carries.
    pub constraints: Vec<String>,
    /// Require an existing lock and fail if reconciliation would change it.
    pub locked: bool,
    /// Compute the result without writing the lock file.
    pub dry_run: bool,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            category: Category::default_packages(),
            overrides: Vec::new(),
            constraints: Vec::new(),
            locked: false,
            dry_run: false,
        }
    }
}

/// Result of a successful lock run.
#[derive(Debug, Clone, Serialize)]
pub struct LockResult {
    pub category: Category,
    pub section: String,
    pub packages: Vec<LockedPackage>,
    pub written: bool,
    /// The category's section as it was locked before this run, read while
    /// the project lock was held. `None` when there was no lock file or it
    /// had no such section.
    #[serde(skip)]
    pub previous: Option<BTreeMap<String, PackageEntry>>,
    #[serde(skip)]
    pub lock_file: LockFile,
}

impl LockResult {
    /// The record `name` had in the section before this run.
    pub fn previous_record(&self, name: &PackageName) -> Option<&PackageEntry> {
        let section = self.previous.as_ref()?;
        section
            .get(name.as_str())
            .or_else(|| section.iter().find(|(k, _)| name.matches(k)).map(|(_, v)| v))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub lock_exists: bool,
    pub stale: bool,
    pub drift: Option<String>,
    pub locked_packages: usize,
}

impl CheckReport {
    pub fn is_ok(&self) -> bool {
        self.lock_exists && !self.stale && self.drift.is_none()
    }
}

impl Engine {
    pub fn new(manifest_path: impl Into<PathBuf>, lock_path: impl Into<PathBuf>) -> Self {
        Self {
            manifest_path: manifest_path.into(),
            lock_path: lock_path.into(),
        }
    }

    /// An engine for `manifest_path` with the lock file next to it.
    pub fn for_manifest(manifest_path: impl Into<PathBuf>) -> Self {
        let manifest_path = manifest_path.into();
        let lock_path = manifest_path
            .parent()
            .unwrap_or(Path::new("."))
            .join("Pipfile.lock");
        Self::new(manifest_path, lock_path)
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    fn guard_path(&self) -> PathBuf {
        let name = self
            .lock_path
            .file_name()
            .map_or_else(|| "Pipfile.lock".into(), |n| n.to_string_lossy());
        self.lock_path.with_file_name(format!(".{name}.lk"))
    }

    pub fn load_manifest(&self) -> Result<Manifest, CoreError> {
        Ok(parse_manifest_file(&self.manifest_path)?)
    }

    /// The current lock file, or `None` when there is none yet.
    pub fn load_lock(&self) -> Result<Option<LockFile>, CoreError> {
        if !self.lock_path.exists() {
            return Ok(None);
        }
        Ok(Some(LockFile::read_from_file(&self.lock_path)?))
    }

    /// Host markers, overlaid by the manifest, overlaid by `overrides`.
    pub fn environment(
        &self,
        manifest: &Manifest,
        overrides: &[(String, String)],
    ) -> Result<MarkerEnvironment, CoreError> {
        let env = manifest.marker_environment(MarkerEnvironment::host())?;
        let env = env.with_overrides(overrides.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;
        debug!(
            "marker environment: {}",
            env.iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(env)
    }

    pub fn graph(
        &self,
        source: &dyn DistributionSource,
        overrides: &[(String, String)],
    ) -> Result<DependencyGraph, CoreError> {
        // Inspecting installed packages does not need a project.
        let manifest = if self.manifest_path.exists() {
            self.load_manifest()?
        } else {
            Manifest::default()
        };
        let env = self.environment(&manifest, overrides)?;
        Ok(DependencyGraph::from_source(source, &env))
    }

    pub fn reverse_dependencies(
        &self,
        source: &dyn DistributionSource,
        overrides: &[(String, String)],
    ) -> Result<ReverseIndex, CoreError> {
        Ok(ReverseIndex::invert(&self.graph(source, overrides)?))
    }

    /// Reconcile `output` into the lock file for `options.category`.
    pub fn lock(
        &self,
        output: ResolverOutput,
        source: Option<&dyn DistributionSource>,
        options: &LockOptions,
    ) -> Result<LockResult, CoreError> {
        info!(
            "locking [{}] from {}",
            options.category,
            self.manifest_path.display()
        );
        let _guard = ProjectLock::acquire(&self.guard_path())?;

        let manifest = self.load_manifest()?;
        let normalized = manifest.normalize()?;
        let previous = self.load_lock()?;
        if options.locked && previous.is_none() {
            return Err(LockError::ManifestDrift(format!(
                "locked mode: no lock file at {}",
                self.lock_path.display()
            ))
            .into());
        }

        let env = self.environment(&manifest, &options.overrides)?;
        let graph = source.map_or_else(DependencyGraph::default, |s| {
            DependencyGraph::from_source(s, &env)
        });
        let reverse = ReverseIndex::invert(&graph);

        let (results, mut constraints) = output.into_parts();
        constraints.extend(options.constraints.iter().cloned());
        debug!(
            "{} candidates, {} constraints, {} installed",
            results.len(),
            constraints.len(),
            graph.len()
        );

        let packages = batch::reconcile(
            &results,
            previous.as_ref(),
            &options.category,
            &BatchInputs {
                manifest: Some(&manifest),
                reverse: &reverse,
                constraints: &constraints,
            },
        )?;

        let before = previous
            .as_ref()
            .and_then(|lock| lock.section(&options.category))
            .cloned();
        let mut lock_file = match previous {
            Some(lock) => lock,
            None => LockFile::new(&normalized)?,
        };
        lock_file.apply(&options.category, &packages, &normalized)?;

        if options.locked && lock_file.section(&options.category) != before.as_ref() {
            return Err(LockError::ManifestDrift(format!(
                "locked mode: section '{}' would change",
                options.category.lock_section()
            ))
            .into());
        }

        let written = !options.dry_run;
        if written {
            lock_file.write_to_file(&self.lock_path)?;
            info!(
                "wrote {} packages to {}",
                packages.len(),
                self.lock_path.display()
            );
        }

        Ok(LockResult {
            section: options.category.lock_section().to_owned(),
            category: options.category.clone(),
            packages,
            written,
            previous: before,
            lock_file,
        })
    }

    /// Compare the lock file against the manifest without changing either.
    pub fn check(&self) -> Result<CheckReport, CoreError> {
        let manifest = self.load_manifest()?;
        let normalized = manifest.normalize()?;
        let Some(lock) = self.load_lock()? else {
            return Ok(CheckReport {
                lock_exists: false,
                stale: true,
                drift: None,
                locked_packages: 0,
            });
        };
        let drift = match lock.verify_manifest_intent(&normalized) {
            Ok(()) => None,
            Err(LockError::ManifestDrift(msg)) => Some(msg),
            Err(e) => return Err(e.into()),
        };
        Ok(CheckReport {
            lock_exists: true,
            stale: lock.is_stale(&normalized)?,
            drift,
            locked_packages: lock.sections.values().map(std::collections::BTreeMap::len).sum(),
        })
    }
}

/// Read resolver output from a JSON file.
pub fn load_resolver_output(path: &Path) -> Result<ResolverOutput, CoreError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
