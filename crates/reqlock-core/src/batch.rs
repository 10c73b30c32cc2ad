//! Reconciliation of a whole resolver result set against the previous lock.

use crate::entry::{Entry, ReconcileContext, ReconcileError};
use crate::reverse::ReverseIndex;
use reqlock_schema::{
    Category, LockFile, LockedPackage, Manifest, PackageEntry, PackageName, ResolvedCandidate,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// What an external resolver hands over: either a bare list of candidates,
/// or the candidates together with the constraints it was asked to honour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ResolverOutput {
    Candidates(Vec<ResolvedCandidate>),
    Full {
        results: Vec<ResolvedCandidate>,
        #[serde(default)]
        constraints: Vec<String>,
    },
}

impl ResolverOutput {
    pub fn into_parts(self) -> (Vec<ResolvedCandidate>, Vec<String>) {
        match self {
            Self::Candidates(results) => (results, Vec::new()),
            Self::Full {
                results,
                constraints,
            } => (results, constraints),
        }
    }
}

/// Shared, read-only inputs for one batch.
#[derive(Debug, Clone, Copy)]
pub struct BatchInputs<'a> {
    pub manifest: Option<&'a Manifest>,
    pub reverse: &'a ReverseIndex,
    pub constraints: &'a [String],
}

/// Reconcile `results` for `category` against `previous_lock`.
///
/// Without a previous lock (or with one that records nothing) the results
/// pass through as they are. Otherwise a package missing from the category's
/// own lock section passes through unchanged and every tracked package is
/// reconciled. Output
/// keeps the order of `results`. The first dependency conflict aborts the
/// batch.
pub fn reconcile(
    results: &[ResolvedCandidate],
    previous_lock: Option<&LockFile>,
    category: &Category,
    inputs: &BatchInputs<'_>,
) -> Result<Vec<LockedPackage>, ReconcileError> {
    let Some(lock) = previous_lock.filter(|l| l.sections.values().any(|s| !s.is_empty())) else {
        debug!("no previous lock; passing {} results through", results.len());
        return Ok(results.iter().cloned().map(LockedPackage::from).collect());
    };

    let index_lookup = inputs
        .manifest
        .map(|m| m.index_lookup(category))
        .unwrap_or_default();
    let ctx = ReconcileContext {
        category,
        manifest: inputs.manifest,
        reverse: inputs.reverse,
        index_lookup: &index_lookup,
        constraints: inputs.constraints,
    };

    let mut out = Vec::with_capacity(results.len());
    for candidate in results {
        let name = candidate.package_name();
        let Some(tracked) = lock.find(category, &name) else {
            debug!("{} is not tracked in [{category}]; passing through", candidate.name);
            out.push(LockedPackage::from(candidate.clone()));
            continue;
        };
        let history = historical_record(lock, category, &name).unwrap_or(tracked);
        let mut entry = Entry::new(&candidate.name, candidate.entry.clone(), Some(history), ctx)?;
        if entry.version_changed() {
            info!(
                "{}: {} -> {}",
                entry.name(),
                entry.historical().version().unwrap_or("(none)"),
                entry.current().version().unwrap_or("(none)")
            );
        }
        out.push(entry.canonicalize()?);
    }
    Ok(out)
}

/// The default-section record of a package tracked by another category.
/// It takes precedence as history over the category's own record.
fn historical_record<'l>(
    lock: &'l LockFile,
    category: &Category,
    name: &PackageName,
) -> Option<&'l PackageEntry> {
    if category.is_default() {
        return None;
    }
    lock.find(&Category::default_packages(), name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lock(value: serde_json::Value) -> LockFile {
        LockFile::from_json_str(&value.to_string()).unwrap()
    }

    fn candidates(value: serde_json::Value) -> Vec<ResolvedCandidate> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn resolver_output_accepts_both_shapes() {
        let bare: ResolverOutput = serde_json::from_value(json!([{"name": "a", "version": "1"}])).unwrap();
        assert_eq!(bare.into_parts().0.len(), 1);
        let full: ResolverOutput = serde_json::from_value(json!({
            "results": [{"name": "a", "version": "1"}],
            "constraints": ["a<2"]
        }))
        .unwrap();
        let (results, constraints) = full.into_parts();
        assert_eq!(results.len(), 1);
        assert_eq!(constraints, vec!["a<2"]);
    }

    #[test]
    fn untracked_packages_pass_through_in_order() {
        let reverse = ReverseIndex::default();
        let inputs = BatchInputs {
            manifest: None,
            reverse: &reverse,
            constraints: &[],
        };
        let previous = lock(json!({
            "_meta": {"pipfile-spec": 6},
            "default": {"tracked": {"version": "==1.0", "hashes": ["sha256:z"]}}
        }));
        let results = candidates(json!([
            {"name": "New_Pkg", "version": "==3.0", "os_name": "== 'nt'"},
            {"name": "Tracked", "version": "1.1", "hashes": ["sha256:b", "sha256:a"]}
        ]));
        let out = reconcile(&results, Some(&previous), &Category::default_packages(), &inputs).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name, "New_Pkg");
        assert_eq!(out[0].entry.version.as_deref(), Some("==3.0"));
        assert!(out[0].entry.fields.contains_key("os_name"));
        assert_eq!(out[1].name, "tracked");
        assert_eq!(out[1].entry.version.as_deref(), Some("1.1"));
        assert_eq!(out[1].entry.hashes, vec!["sha256:a", "sha256:b"]);
    }

    #[test]
    fn default_section_is_history_for_other_categories() {
        let reverse = ReverseIndex::default();
        let inputs = BatchInputs {
            manifest: None,
            reverse: &reverse,
            constraints: &[],
        };
        let previous = lock(json!({
            "_meta": {"pipfile-spec": 6},
            "default": {"shared": {"version": "1.0", "markers": "os_name == 'posix'"}},
            "develop": {"shared": {"version": "1.0", "markers": "os_name == 'nt'"}}
        }));
        let results = candidates(json!([{"name": "shared", "version": "1.0"}]));
        let out = reconcile(&results, Some(&previous), &Category::dev_packages(), &inputs).unwrap();
        assert_eq!(
            out[0].entry.markers,
            Some(reqlock_schema::MarkerValue::from(r#"os_name == "posix""#))
        );
    }

    #[test]
    fn default_only_packages_pass_through_for_other_categories() {
        let reverse = ReverseIndex::default();
        let inputs = BatchInputs {
            manifest: None,
            reverse: &reverse,
            constraints: &[],
        };
        let previous = lock(json!({
            "_meta": {"pipfile-spec": 6},
            "default": {"shared": {"version": "==1.0"}},
            "develop": {"other": {"version": "==2.0"}}
        }));
        let results = candidates(json!([
            {"name": "Shared", "version": "==1.0", "os_name": "== 'nt'"}
        ]));
        let out = reconcile(&results, Some(&previous), &Category::dev_packages(), &inputs).unwrap();
        assert_eq!(out, vec![LockedPackage::from(results[0].clone())]);
        assert_eq!(out[0].name, "Shared");
        assert_eq!(out[0].entry.version.as_deref(), Some("==1.0"));
        assert!(out[0].entry.fields.contains_key("os_name"));
        assert!(out[0].entry.markers.is_none());
    }
}
