use super::{json_pretty, EXIT_FAILURE, EXIT_SUCCESS};
use reqlock_core::{DistributionSource, Engine, RequirementTree};
use reqlock_schema::PackageName;

fn print_tree(tree: &RequirementTree, depth: usize) {
    let indent = "  ".repeat(depth);
    if depth == 0 {
        println!("{}=={}", tree.package_name, tree.installed_version);
    } else {
        println!(
            "{indent}- {} [required: {}, installed: {}]",
            tree.package_name, tree.required_version, tree.installed_version
        );
    }
    for child in &tree.dependencies {
        print_tree(child, depth + 1);
    }
}

pub fn run(
    engine: &Engine,
    source: &dyn DistributionSource,
    overrides: &[(String, String)],
    package: Option<&str>,
    json: bool,
) -> Result<u8, String> {
    let graph = engine.graph(source, overrides).map_err(|e| e.to_string())?;
    let package = package.map(PackageName::new);
    if let Some(name) = &package {
        if !graph.contains(name) {
            eprintln!("package '{name}' is not installed");
            return Ok(EXIT_FAILURE);
        }
    }
    let trees = graph.requirement_tree(package.as_ref());

    if json {
        println!("{}", json_pretty(&trees)?);
    } else if trees.is_empty() {
        println!("no installed packages");
    } else {
        for tree in &trees {
            print_tree(tree, 0);
        }
    }
    for dropped in graph.dropped() {
        eprintln!("warning: skipped {}: {}", dropped.name, dropped.reason);
    }
    Ok(EXIT_SUCCESS)
}
