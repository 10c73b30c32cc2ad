use super::{colorize_status, json_pretty, EXIT_FAILURE, EXIT_SUCCESS};
use reqlock_core::Engine;

pub fn run(engine: &Engine, json: bool) -> Result<u8, String> {
    let report = engine.check().map_err(|e| e.to_string())?;
    let status = if !report.lock_exists {
        "missing"
    } else if report.stale {
        "stale"
    } else if report.drift.is_some() {
        "drift"
    } else {
        "ok"
    };

    if json {
        let payload = serde_json::json!({
            "status": status,
            "lock_file": engine.lock_path(),
            "lock_exists": report.lock_exists,
            "stale": report.stale,
            "drift": report.drift,
            "locked_packages": report.locked_packages,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("lock file: {}", engine.lock_path().display());
        println!("status:    {}", colorize_status(status));
        println!("packages:  {}", report.locked_packages);
        if report.stale && report.lock_exists {
            println!("the manifest changed since the lock was written");
        }
        if let Some(drift) = &report.drift {
            println!("{drift}");
        }
    }
    Ok(if report.is_ok() {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    })
}
