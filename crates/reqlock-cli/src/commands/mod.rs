pub mod check;
pub mod completions;
pub mod graph;
pub mod lock;
pub mod man_pages;
pub mod reverse_deps;

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use reqlock_core::{DistributionSource, JsonListing, SitePackages};
use std::path::PathBuf;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_MANIFEST_ERROR: u8 = 2;
pub const EXIT_LOCK_ERROR: u8 = 3;
pub const EXIT_CONFLICT: u8 = 4;

/// Where to read the installed distributions from.
#[derive(Debug, Clone, Args)]
pub struct SourceArgs {
    /// A site-packages directory to scan for `*.dist-info` metadata.
    #[arg(long, conflicts_with = "installed")]
    pub site_packages: Option<PathBuf>,
    /// A JSON listing of installed distributions (name, version, requires).
    #[arg(long)]
    pub installed: Option<PathBuf>,
}

impl SourceArgs {
    pub fn source(&self) -> Option<Box<dyn DistributionSource>> {
        if let Some(dir) = &self.site_packages {
            return Some(Box::new(SitePackages::new(dir)));
        }
        self.installed
            .as_ref()
            .map(|path| Box::new(JsonListing::new(path)) as Box<dyn DistributionSource>)
    }

    pub fn require_source(&self) -> Result<Box<dyn DistributionSource>, String> {
        self.source()
            .ok_or_else(|| "no installed packages given; pass --site-packages or --installed".to_owned())
    }
}

/// Marker environment overrides on top of the host and manifest values.
#[derive(Debug, Clone, Default, Args)]
pub struct MarkerArgs {
    /// Evaluate markers for this Python version (e.g. 3.11).
    #[arg(long)]
    pub python_version: Option<String>,
    /// Evaluate markers for this exact interpreter version (e.g. 3.11.4).
    #[arg(long)]
    pub python_full_version: Option<String>,
    /// Override a marker variable, e.g. `sys_platform=linux`. Repeatable.
    #[arg(long = "marker", value_name = "KEY=VALUE", value_parser = parse_marker_override)]
    pub markers: Vec<(String, String)>,
}

impl MarkerArgs {
    pub fn overrides(&self) -> Vec<(String, String)> {
        let mut out = Vec::with_capacity(self.markers.len() + 2);
        if let Some(version) = &self.python_version {
            out.push(("python_version".to_owned(), version.clone()));
        }
        if let Some(version) = &self.python_full_version {
            out.push(("python_full_version".to_owned(), version.clone()));
        }
        out.extend(self.markers.iter().cloned());
        out
    }
}

pub fn parse_marker_override(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty marker name in '{raw}'"));
    }
    Ok((key.to_owned(), value.trim().to_owned()))
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn finish(pb: &ProgressBar, msg: String) {
    if let Ok(style) = ProgressStyle::with_template("{msg}") {
        pb.set_style(style);
    }
    pb.finish_with_message(msg);
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    finish(pb, format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    finish(pb, format!("✗ {msg}"));
}

pub fn colorize_status(status: &str) -> String {
    use console::Style;
    match status {
        "ok" | "unchanged" => Style::new().green().apply_to(status).to_string(),
        "updated" | "added" => Style::new().cyan().apply_to(status).to_string(),
        "stale" | "drift" => Style::new().yellow().apply_to(status).to_string(),
        "missing" => Style::new().red().bold().apply_to(status).to_string(),
        other => other.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_pretty_serializes_object() {
        let val = serde_json::json!({"key": "value"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"key\""));
        assert!(result.contains("\"value\""));
    }

    #[test]
    fn marker_override_parses_key_value() {
        assert_eq!(
            parse_marker_override("sys_platform=linux").unwrap(),
            ("sys_platform".to_owned(), "linux".to_owned())
        );
        assert_eq!(
            parse_marker_override(" extra = dev ").unwrap(),
            ("extra".to_owned(), "dev".to_owned())
        );
        assert!(parse_marker_override("sys_platform").is_err());
        assert!(parse_marker_override("=linux").is_err());
    }

    #[test]
    fn python_version_goes_first() {
        let args = MarkerArgs {
            python_version: Some("3.9".into()),
            python_full_version: Some("3.9.18".into()),
            markers: vec![("os_name".into(), "nt".into())],
        };
        assert_eq!(
            args.overrides(),
            vec![
                ("python_version".to_owned(), "3.9".to_owned()),
                ("python_full_version".to_owned(), "3.9.18".to_owned()),
                ("os_name".to_owned(), "nt".to_owned())
            ]
        );
    }

    #[test]
    fn missing_source_is_reported() {
        let args = SourceArgs {
            site_packages: None,
            installed: None,
        };
        assert!(args.source().is_none());
        assert!(args.require_source().is_err());
    }

    #[test]
    fn colorize_status_keeps_text() {
        for status in ["ok", "stale", "drift", "missing", "updated"] {
            assert!(colorize_status(status).contains(status));
        }
        assert_eq!(colorize_status("other"), "other");
    }

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_FAILURE,
            EXIT_MANIFEST_ERROR,
            EXIT_LOCK_ERROR,
            EXIT_CONFLICT,
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn spinner_finishes() {
        let pb = spinner("testing...");
        spin_ok(&pb, "done");
        let pb = spinner("testing...");
        spin_fail(&pb, "failed");
    }
}
