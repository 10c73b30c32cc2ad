use super::{json_pretty, EXIT_FAILURE, EXIT_SUCCESS};
use reqlock_core::{DistributionSource, Engine, ReverseEntry};
use reqlock_schema::PackageName;

fn print_entry(name: &PackageName, entry: &ReverseEntry) {
    println!("{name}=={}", entry.installed.as_deref().unwrap_or("?"));
    if entry.parents.is_empty() {
        println!("  (top level)");
    }
    for parent in &entry.parents {
        let spec = entry
            .constraints
            .get(&parent.name)
            .map_or("Any", String::as_str);
        println!("  <- {}=={} [requires: {spec}]", parent.name, parent.version);
    }
}

pub fn run(
    engine: &Engine,
    source: &dyn DistributionSource,
    overrides: &[(String, String)],
    package: Option<&str>,
    json: bool,
) -> Result<u8, String> {
    let index = engine
        .reverse_dependencies(source, overrides)
        .map_err(|e| e.to_string())?;

    if let Some(name) = package.map(PackageName::new) {
        let Some(entry) = index.get(&name) else {
            eprintln!("package '{name}' is not installed");
            return Ok(EXIT_FAILURE);
        };
        if json {
            println!("{}", json_pretty(entry)?);
        } else {
            print_entry(&name, entry);
        }
        return Ok(EXIT_SUCCESS);
    }

    if json {
        println!("{}", json_pretty(&index)?);
    } else if index.is_empty() {
        println!("no installed packages");
    } else {
        for (name, entry) in index.iter() {
            print_entry(name, entry);
        }
    }
    Ok(EXIT_SUCCESS)
}
