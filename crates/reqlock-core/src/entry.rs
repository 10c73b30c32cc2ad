//! Per-package reconciliation of manifest intent, lock history and the
//! resolver's fresh candidate.
//!
//! An [`Entry`] is built once per package per batch. Construction normalizes
//! the candidate's version and pulls markers out of both the candidate and
//! the historical lock record, so the [`current`](Entry::current) and
//! [`historical`](Entry::historical) views never change afterwards.

use crate::lifecycle::{validate_transition, EntryState};
use crate::reverse::ReverseIndex;
use reqlock_schema::extract;
use reqlock_schema::specifier::{self, ANY};
use reqlock_schema::{
    Category, IndexLookup, Link, LockedPackage, Manifest, MarkerValue, PackageEntry,
    PackageName, Requirement, Version,
};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("dependency conflict: {package} is locked at {locked}, which does not satisfy {constraint}")]
    DependencyConflict {
        package: String,
        constraint: String,
        locked: String,
    },
    #[error("invalid entry state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

/// Read-only inputs shared by every entry of one batch.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileContext<'a> {
    pub category: &'a Category,
    pub manifest: Option<&'a Manifest>,
    pub reverse: &'a ReverseIndex,
    pub index_lookup: &'a IndexLookup,
    /// Extra PEP 508 constraints the resolver was given.
    pub constraints: &'a [String],
}

/// The fixed set of facts both the live candidate and the lock history expose.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequirementView {
    specifier: Option<String>,
    extras: BTreeSet<String>,
    markers: Option<String>,
    link: Option<Link>,
}

impl RequirementView {
    fn from_entry(entry: &PackageEntry, markers: Option<String>) -> Self {
        Self {
            specifier: entry.version.as_deref().map(specifier::normalize),
            extras: entry.extras.iter().cloned().collect(),
            markers,
            link: Link::from_entry(entry),
        }
    }

    /// The normalized specifier, e.g. `==1.2.0`.
    pub fn specifier(&self) -> Option<&str> {
        self.specifier.as_deref()
    }

    /// The bare version with every operator stripped.
    pub fn version(&self) -> Option<&str> {
        self.specifier.as_deref().map(specifier::strip_version)
    }

    pub fn extras(&self) -> &BTreeSet<String> {
        &self.extras
    }

    pub fn markers(&self) -> Option<&str> {
        self.markers.as_deref()
    }

    pub fn link(&self) -> Option<&Link> {
        self.link.as_ref()
    }
}

/// Where a constraint checked during validation came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintOrigin {
    Manifest,
    Resolver,
    Parent(PackageName),
}

#[derive(Debug, Clone)]
pub struct Constraint {
    pub requirement: Requirement,
    pub origin: ConstraintOrigin,
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.origin {
            ConstraintOrigin::Manifest => write!(f, "'{}' (from the manifest)", self.requirement),
            ConstraintOrigin::Resolver => write!(f, "'{}' (from resolver constraints)", self.requirement),
            ConstraintOrigin::Parent(parent) => {
                write!(f, "'{}' (required by {parent})", self.requirement)
            }
        }
    }
}

pub struct Entry<'a> {
    name: PackageName,
    ctx: ReconcileContext<'a>,
    state: EntryState,
    manifest: Option<Requirement>,
    current: RequirementView,
    historical: RequirementView,
    working: PackageEntry,
}

impl<'a> Entry<'a> {
    /// Normalize `candidate` and `lock_record` once and capture both views.
    pub fn new(
        name: &str,
        candidate: PackageEntry,
        lock_record: Option<&PackageEntry>,
        ctx: ReconcileContext<'a>,
    ) -> Result<Self, ReconcileError> {
        let name = PackageName::new(name);

        let mut candidate = candidate;
        candidate.version = candidate.version.as_deref().map(specifier::normalize);
        let (markers, working) = extract::extract(candidate);
        let (original_markers, history) = extract::extract(lock_record.cloned().unwrap_or_default());

        let manifest = match ctx.manifest.and_then(|m| m.requirement(ctx.category, &name)) {
            Some(Ok(req)) => Some(req),
            Some(Err(e)) => {
                debug!("ignoring manifest entry for {name}: {e}");
                None
            }
            None => None,
        };

        validate_transition(EntryState::Raw, EntryState::MarkersExtracted)?;
        Ok(Self {
            current: RequirementView::from_entry(&working, markers),
            historical: RequirementView::from_entry(&history, original_markers),
            name,
            ctx,
            state: EntryState::MarkersExtracted,
            manifest,
            working,
        })
    }

    pub fn name(&self) -> &PackageName {
        &self.name
    }

    pub fn state(&self) -> EntryState {
        self.state
    }

    /// The resolver's candidate for this run.
    pub fn current(&self) -> &RequirementView {
        &self.current
    }

    /// What the lock file recorded before this run.
    pub fn historical(&self) -> &RequirementView {
        &self.historical
    }

    /// The user's declaration, when the category declares this package.
    pub fn manifest(&self) -> Option<&Requirement> {
        self.manifest.as_ref()
    }

    pub fn markers(&self) -> Option<&str> {
        self.current.markers()
    }

    pub fn original_markers(&self) -> Option<&str> {
        self.historical.markers()
    }

    /// True when the candidate's version differs from the locked one.
    pub fn version_changed(&self) -> bool {
        self.current.version() != self.historical.version()
    }

    /// Every constraint that names this package: manifest first, then the
    /// resolver's, then each parent's in parent-name order.
    pub fn constraints(&self) -> Vec<Constraint> {
        let mut out = Vec::new();
        if let Some(req) = &self.manifest {
            out.push(Constraint {
                requirement: req.clone(),
                origin: ConstraintOrigin::Manifest,
            });
        }
        for raw in self.ctx.constraints {
            match Requirement::parse(raw) {
                Ok(req) if req.name() == &self.name => out.push(Constraint {
                    requirement: req,
                    origin: ConstraintOrigin::Resolver,
                }),
                Ok(_) => {}
                Err(e) => debug!("skipping resolver constraint: {e}"),
            }
        }
        for (parent, spec) in self.ctx.reverse.constraints(&self.name) {
            match Requirement::parse(&format!("{}{spec}", self.name)) {
                Ok(req) => out.push(Constraint {
                    requirement: req,
                    origin: ConstraintOrigin::Parent(parent.clone()),
                }),
                Err(e) => debug!("skipping constraint from {parent}: {e}"),
            }
        }
        out
    }

    fn pinned_version(&self) -> Option<(&str, Version)> {
        if self.current.link().is_some() {
            return None;
        }
        let bare = self.current.version().filter(|v| *v != ANY)?;
        match Version::parse(bare) {
            Ok(version) => Some((bare, version)),
            Err(e) => {
                debug!("not checking constraints for {}: {e}", self.name);
                None
            }
        }
    }

    /// Check the pinned version against every constraint, prereleases
    /// allowed. The first unsatisfied constraint is a conflict.
    pub fn validate_constraints(&mut self) -> Result<(), ReconcileError> {
        validate_transition(self.state, EntryState::ConstraintsValidated)?;
        if let Some((locked, version)) = self.pinned_version() {
            for constraint in self.constraints() {
                trace!("{}: checking {locked} against {constraint}", self.name);
                if !constraint.requirement.specifier().contains(&version, true) {
                    return Err(ReconcileError::DependencyConflict {
                        package: self.name.to_string(),
                        constraint: constraint.to_string(),
                        locked: locked.to_owned(),
                    });
                }
            }
        }
        self.state = EntryState::ConstraintsValidated;
        Ok(())
    }

    /// Validate and produce the record to persist. Safe to call repeatedly.
    pub fn canonicalize(&mut self) -> Result<LockedPackage, ReconcileError> {
        self.validate_constraints()?;

        let mut entry = self.working.clone();

        let extras: BTreeSet<String> = if self.current.extras() == self.historical.extras() {
            self.current.extras().clone()
        } else {
            self.current
                .extras()
                .union(self.historical.extras())
                .cloned()
                .collect()
        };
        entry.extras = extras.into_iter().collect();

        entry.markers = self
            .markers()
            .or_else(|| self.original_markers())
            .map(|m| MarkerValue::Expr(m.to_owned()));

        entry.hashes.sort();
        entry.hashes.dedup();

        entry.version = entry
            .version
            .as_deref()
            .map(|v| specifier::strip_version(v).to_owned());

        if let Some(index) = self.ctx.index_lookup.get(&self.name) {
            entry.index = Some(index.clone());
        }

        validate_transition(self.state, EntryState::Canonicalized)?;
        self.state = EntryState::Canonicalized;
        Ok(LockedPackage {
            name: self.name.to_string(),
            entry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqlock_schema::parse_manifest_str;
    use serde_json::json;

    struct Fixture {
        category: Category,
        manifest: Option<Manifest>,
        reverse: ReverseIndex,
        index_lookup: IndexLookup,
        constraints: Vec<String>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                category: Category::default_packages(),
                manifest: None,
                reverse: ReverseIndex::default(),
                index_lookup: IndexLookup::new(),
                constraints: Vec::new(),
            }
        }

        fn with_manifest(mut self, toml: &str) -> Self {
            let manifest = parse_manifest_str(toml).unwrap();
            self.index_lookup = manifest.index_lookup(&self.category);
            self.manifest = Some(manifest);
            self
        }

        fn ctx(&self) -> ReconcileContext<'_> {
            ReconcileContext {
                category: &self.category,
                manifest: self.manifest.as_ref(),
                reverse: &self.reverse,
                index_lookup: &self.index_lookup,
                constraints: &self.constraints,
            }
        }
    }

    fn entry(value: serde_json::Value) -> PackageEntry {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn construction_extracts_markers_once() {
        let fx = Fixture::new();
        let e = Entry::new(
            "Foo",
            entry(json!({"version": "1.0", "os_name": "== 'nt'"})),
            Some(&entry(json!({"version": "==0.9", "markers": "sys_platform == 'win32'"}))),
            fx.ctx(),
        )
        .unwrap();
        assert_eq!(e.state(), EntryState::MarkersExtracted);
        assert_eq!(e.name().as_str(), "foo");
        assert_eq!(e.markers(), Some(r#"os_name == "nt""#));
        assert_eq!(e.original_markers(), Some(r#"sys_platform == "win32""#));
        assert_eq!(e.current().specifier(), Some("==1.0"));
        assert_eq!(e.current().version(), Some("1.0"));
        assert_eq!(e.historical().version(), Some("0.9"));
        assert!(e.version_changed());
    }

    #[test]
    fn manifest_conflict_is_reported() {
        let fx = Fixture::new().with_manifest("[packages]\nfoo = \">=2.0\"\n");
        let mut e = Entry::new("foo", PackageEntry::with_version("1.5.0"), None, fx.ctx()).unwrap();
        match e.canonicalize() {
            Err(ReconcileError::DependencyConflict {
                package,
                constraint,
                locked,
            }) => {
                assert_eq!(package, "foo");
                assert_eq!(locked, "1.5.0");
                assert!(constraint.contains("foo>=2.0"));
            }
            other => panic!("expected conflict, got {other:?}"),
        }

        let mut ok = Entry::new("foo", PackageEntry::with_version("2.3.0"), None, fx.ctx()).unwrap();
        assert_eq!(ok.canonicalize().unwrap().entry.version.as_deref(), Some("2.3.0"));
    }

    #[test]
    fn prereleases_satisfy_constraints() {
        let fx = Fixture::new().with_manifest("[packages]\nfoo = \">=2.0\"\n");
        let mut e = Entry::new("foo", PackageEntry::with_version("2.1rc1"), None, fx.ctx()).unwrap();
        assert!(e.validate_constraints().is_ok());
    }

    #[test]
    fn resolver_constraints_only_apply_to_their_package() {
        let mut fx = Fixture::new();
        fx.constraints = vec![
            "bar<1".to_owned(),
            "not a requirement ((".to_owned(),
            "Foo!=1.5.0".to_owned(),
        ];
        let mut e = Entry::new("foo", PackageEntry::with_version("1.5.0"), None, fx.ctx()).unwrap();
        let err = e.validate_constraints().unwrap_err();
        assert!(err.to_string().contains("resolver constraints"));
    }

    #[test]
    fn vcs_entries_are_not_checked() {
        let fx = Fixture::new().with_manifest("[packages]\nfoo = \">=2.0\"\n");
        let mut e = Entry::new(
            "foo",
            entry(json!({"version": "1.0", "git": "https://example.com/foo.git", "ref": "abc"})),
            None,
            fx.ctx(),
        )
        .unwrap();
        let out = e.canonicalize().unwrap();
        assert_eq!(out.entry.field_str("git"), Some("https://example.com/foo.git"));
    }

    #[test]
    fn canonical_record_shape() {
        let fx = Fixture::new().with_manifest(
            "[[source]]\nname = \"internal\"\nurl = \"https://example.com\"\n[packages]\nfoo = { version = \"*\", index = \"internal\" }\n",
        );
        let mut e = Entry::new(
            "Foo",
            entry(json!({
                "version": "==1.0.0",
                "hashes": ["sha256:b", "sha256:a", "sha256:b"],
                "extras": ["y", "x"],
                "markers": ["python_version >= '3.8'"]
            })),
            Some(&entry(json!({"version": "==0.9.0", "extras": ["x", "z"]}))),
            fx.ctx(),
        )
        .unwrap();
        let out = e.canonicalize().unwrap();
        assert_eq!(
            serde_json::to_value(&out).unwrap(),
            json!({
                "name": "foo",
                "version": "1.0.0",
                "hashes": ["sha256:a", "sha256:b"],
                "extras": ["x", "y", "z"],
                "markers": "python_version >= \"3.8\"",
                "index": "internal"
            })
        );
        assert_eq!(e.state(), EntryState::Canonicalized);
    }

    #[test]
    fn historical_markers_restored_when_none_current() {
        let fx = Fixture::new();
        let mut e = Entry::new(
            "foo",
            PackageEntry::with_version("1.0"),
            Some(&entry(json!({"version": "1.0", "os_name": "== 'posix'"}))),
            fx.ctx(),
        )
        .unwrap();
        let out = e.canonicalize().unwrap();
        assert_eq!(out.entry.markers, Some(MarkerValue::from(r#"os_name == "posix""#)));
        assert!(out.entry.fields.is_empty());
    }

    #[test]
    fn canonicalize_is_repeatable() {
        let fx = Fixture::new();
        let mut e = Entry::new("foo", PackageEntry::with_version("1.0"), None, fx.ctx()).unwrap();
        let first = e.canonicalize().unwrap();
        let second = e.canonicalize().unwrap();
        assert_eq!(first, second);
    }
}
