use super::{colorize_status, json_pretty, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use reqlock_core::{load_resolver_output, Engine, LockOptions, ResolverOutput};
use reqlock_schema::{specifier, PackageName};
use std::path::Path;

pub struct LockArgs<'a> {
    pub results: &'a Path,
    pub source: Option<&'a dyn reqlock_core::DistributionSource>,
    pub options: LockOptions,
}

fn read_results(path: &Path) -> Result<ResolverOutput, String> {
    if path == Path::new("-") {
        return serde_json::from_reader(std::io::stdin().lock())
            .map_err(|e| format!("failed to parse resolver results from stdin: {e}"));
    }
    load_resolver_output(path)
        .map_err(|e| format!("failed to read resolver results {}: {e}", path.display()))
}

pub fn run(engine: &Engine, args: LockArgs<'_>, json: bool) -> Result<u8, String> {
    let output = read_results(args.results)?;

    let pb = if json {
        None
    } else {
        Some(spinner("reconciling lock..."))
    };
    let result = match engine.lock(output, args.source, &args.options) {
        Ok(r) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, "lock reconciled");
            }
            r
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "lock failed");
            }
            return Err(e.to_string());
        }
    };

    let status_of = |name: &str, version: Option<&str>| -> &'static str {
        match result.previous_record(&PackageName::new(name)) {
            None => "added",
            Some(old) => {
                let old = old.version.as_deref().map(specifier::strip_version);
                let new = version.map(specifier::strip_version);
                if old == new {
                    "unchanged"
                } else {
                    "updated"
                }
            }
        }
    };

    if json {
        let packages: Vec<_> = result
            .packages
            .iter()
            .map(|p| {
                serde_json::json!({
                    "name": p.name,
                    "version": p.entry.version,
                    "status": status_of(&p.name, p.entry.version.as_deref()),
                })
            })
            .collect();
        let payload = serde_json::json!({
            "category": result.category,
            "section": result.section,
            "written": result.written,
            "lock_file": engine.lock_path(),
            "packages": packages,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        for p in &result.packages {
            let version = p.entry.version.as_deref().unwrap_or("*");
            let status = status_of(&p.name, p.entry.version.as_deref());
            println!("{:<32} {:<16} {}", p.name, version, colorize_status(status));
        }
        if result.written {
            println!(
                "locked {} packages into '{}' of {}",
                result.packages.len(),
                result.section,
                engine.lock_path().display()
            );
        } else {
            println!(
                "dry run: {} packages would be locked into '{}'",
                result.packages.len(),
                result.section
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
