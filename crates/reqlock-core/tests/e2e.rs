use reqlock_core::{
    load_resolver_output, CoreError, Engine, InstalledDistribution, LockOptions, ProjectLock,
    ResolverOutput,
};
use reqlock_schema::{Category, LockError, LockFile, PackageName};
use serde_json::json;
use std::fs;
use std::path::Path;

const MANIFEST: &str = r#"
[[source]]
name = "pypi"
url = "https://pypi.org/simple"
verify_ssl = true

[requires]
python_version = "3.11"

[packages]
requests = ">=2.0"

[dev-packages]
pytest = "*"
"#;

fn setup(manifest: &str) -> (tempfile::TempDir, Engine) {
    let dir = tempfile::tempdir().unwrap();
    let manifest_path = dir.path().join("Pipfile");
    fs::write(&manifest_path, manifest).unwrap();
    let engine = Engine::for_manifest(&manifest_path);
    (dir, engine)
}

fn output(value: serde_json::Value) -> ResolverOutput {
    serde_json::from_value(value).unwrap()
}

fn read_lock(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn first_lock_writes_file_with_meta() {
    let (_dir, engine) = setup(MANIFEST);
    let result = engine
        .lock(
            output(json!([{"name": "requests", "version": "==2.31.0", "hashes": ["sha256:b"]}])),
            None,
            &LockOptions::default(),
        )
        .unwrap();
    assert!(result.written);
    assert_eq!(result.section, "default");

    let written = read_lock(engine.lock_path());
    assert_eq!(written["_meta"]["pipfile-spec"], 6);
    assert_eq!(written["_meta"]["requires"]["python_version"], "3.11");
    assert_eq!(written["_meta"]["sources"][0]["name"], "pypi");
    assert!(written["_meta"]["hash"]["blake3"].is_string());
    assert_eq!(written["default"]["requests"]["version"], "==2.31.0");
    assert_eq!(written["develop"], json!({}));
}

#[test]
fn relock_reconciles_against_previous_lock() {
    let (_dir, engine) = setup(MANIFEST);
    engine
        .lock(
            output(json!([{"name": "requests", "version": "2.31.0"}])),
            None,
            &LockOptions::default(),
        )
        .unwrap();
    engine
        .lock(
            output(json!([{"name": "requests", "version": "==2.32.0", "hashes": ["sha256:z", "sha256:a"]}])),
            None,
            &LockOptions::default(),
        )
        .unwrap();

    let written = read_lock(engine.lock_path());
    assert_eq!(written["default"]["requests"]["version"], "2.32.0");
    assert_eq!(
        written["default"]["requests"]["hashes"],
        json!(["sha256:a", "sha256:z"])
    );
}

#[test]
fn result_carries_section_as_locked_before_the_run() {
    let (_dir, engine) = setup(MANIFEST);
    let first = engine
        .lock(
            output(json!([{"name": "requests", "version": "2.31.0"}])),
            None,
            &LockOptions::default(),
        )
        .unwrap();
    assert!(first.previous.is_none());

    let second = engine
        .lock(
            output(json!([
                {"name": "Requests", "version": "2.32.0"},
                {"name": "idna", "version": "3.6"}
            ])),
            None,
            &LockOptions::default(),
        )
        .unwrap();
    let old = second
        .previous_record(&PackageName::new("requests"))
        .unwrap();
    assert_eq!(old.version.as_deref(), Some("2.31.0"));
    assert!(second.previous_record(&PackageName::new("idna")).is_none());
    assert_eq!(
        second.lock_file.sections["default"]["requests"].version.as_deref(),
        Some("2.32.0")
    );
}

#[test]
fn conflict_leaves_lock_untouched() {
    let (_dir, engine) = setup(MANIFEST);
    engine
        .lock(
            output(json!([{"name": "requests", "version": "2.31.0"}])),
            None,
            &LockOptions::default(),
        )
        .unwrap();
    let before = fs::read_to_string(engine.lock_path()).unwrap();

    let err = engine
        .lock(
            output(json!([{"name": "requests", "version": "1.9"}])),
            None,
            &LockOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, CoreError::Reconcile(_)));
    assert_eq!(fs::read_to_string(engine.lock_path()).unwrap(), before);
}

#[test]
fn dev_category_uses_develop_section() {
    let (_dir, engine) = setup(MANIFEST);
    let options = LockOptions {
        category: Category::dev_packages(),
        ..LockOptions::default()
    };
    engine
        .lock(output(json!([{"name": "pytest", "version": "8.0.0"}])), None, &options)
        .unwrap();
    let lock = LockFile::read_from_file(engine.lock_path()).unwrap();
    assert!(lock.sections["develop"].contains_key("pytest"));
    assert!(lock.sections["default"].is_empty());
}

#[test]
fn dry_run_does_not_write() {
    let (_dir, engine) = setup(MANIFEST);
    let options = LockOptions {
        dry_run: true,
        ..LockOptions::default()
    };
    let result = engine
        .lock(output(json!([{"name": "requests", "version": "2.31.0"}])), None, &options)
        .unwrap();
    assert!(!result.written);
    assert_eq!(result.packages.len(), 1);
    assert!(!engine.lock_path().exists());
}

#[test]
fn locked_mode_refuses_changes() {
    let (_dir, engine) = setup(MANIFEST);
    let locked = LockOptions {
        locked: true,
        ..LockOptions::default()
    };
    let err = engine
        .lock(output(json!([{"name": "requests", "version": "2.31.0"}])), None, &locked)
        .unwrap_err();
    assert!(matches!(err, CoreError::Lock(LockError::ManifestDrift(_))));

    engine
        .lock(
            output(json!([{"name": "requests", "version": "2.31.0"}])),
            None,
            &LockOptions::default(),
        )
        .unwrap();
    engine
        .lock(output(json!([{"name": "requests", "version": "2.31.0"}])), None, &locked)
        .unwrap();
    let err = engine
        .lock(output(json!([{"name": "requests", "version": "2.32.0"}])), None, &locked)
        .unwrap_err();
    assert!(err.to_string().contains("would change"), "{err}");
}

#[test]
fn installed_parents_constrain_relock() {
    let (_dir, engine) = setup(MANIFEST);
    engine
        .lock(
            output(json!([{"name": "urllib3", "version": "1.26.18"}])),
            None,
            &LockOptions::default(),
        )
        .unwrap();
    let installed = vec![
        InstalledDistribution::new("requests", "2.31.0").requires(["urllib3<2,>=1.21.1"]),
        InstalledDistribution::new("urllib3", "1.26.18"),
    ];
    let err = engine
        .lock(
            output(json!([{"name": "urllib3", "version": "2.2.0"}])),
            Some(&installed),
            &LockOptions::default(),
        )
        .unwrap_err();
    assert!(err.to_string().contains("required by requests"), "{err}");
}

#[test]
fn check_reports_missing_stale_and_drift() {
    let (dir, engine) = setup(MANIFEST);
    let report = engine.check().unwrap();
    assert!(!report.lock_exists);
    assert!(!report.is_ok());

    engine
        .lock(
            output(json!([{"name": "requests", "version": "2.31.0"}])),
            None,
            &LockOptions::default(),
        )
        .unwrap();
    let report = engine.check().unwrap();
    assert!(!report.stale);
    // pytest is declared but nothing locked it
    assert!(report.drift.as_deref().unwrap().contains("pytest"));

    fs::write(
        dir.path().join("Pipfile"),
        MANIFEST.replace(">=2.0", ">=2.1"),
    )
    .unwrap();
    assert!(engine.check().unwrap().stale);
}

#[test]
fn resolver_output_file_with_constraints() {
    let (dir, engine) = setup(MANIFEST);
    let results = dir.path().join("results.json");
    fs::write(
        &results,
        json!({
            "results": [{"name": "requests", "version": "2.31.0"}],
            "constraints": ["requests<2.30"]
        })
        .to_string(),
    )
    .unwrap();
    engine
        .lock(
            output(json!([{"name": "requests", "version": "2.29.0"}])),
            None,
            &LockOptions::default(),
        )
        .unwrap();
    let err = engine
        .lock(load_resolver_output(&results).unwrap(), None, &LockOptions::default())
        .unwrap_err();
    assert!(err.to_string().contains("requests<2.30"), "{err}");
}

#[test]
fn guard_is_released_after_lock() {
    let (dir, engine) = setup(MANIFEST);
    let guard = dir.path().join(".Pipfile.lock.lk");
    let held = ProjectLock::acquire(&guard).unwrap();
    assert!(ProjectLock::try_acquire(&guard).unwrap().is_none());
    drop(held);
    engine
        .lock(
            output(json!([{"name": "requests", "version": "2.31.0"}])),
            None,
            &LockOptions::default(),
        )
        .unwrap();
    assert!(ProjectLock::try_acquire(&guard).unwrap().is_some());
}
