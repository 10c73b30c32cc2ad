//! Marker extraction: collapse every marker source on a record into one
//! normalized expression.
//!
//! A record can carry markers as a literal `markers` field (string, list or
//! table) and as inline marker-variable keys (`os_name = "== 'nt'"`). Both are
//! consumed here. Clauses that fail to parse are dropped rather than reported.

use crate::marker::{Marker, MARKER_VARIABLES};
use crate::record::{MarkerValue, PackageEntry};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Parse and re-render a marker expression in canonical form.
pub fn normalize_marker(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Marker::parse(trimmed).ok().map(|m| m.to_string())
}

/// Remove every marker source from `entry` and return the merged expression
/// together with the stripped record.
///
/// Returns `None` when the record carried no usable markers. Running this on
/// its own output always yields `None`.
pub fn extract(mut entry: PackageEntry) -> (Option<String>, PackageEntry) {
    let mut clauses = BTreeSet::new();

    for key in MARKER_VARIABLES {
        if let Some(value) = entry.fields.remove(key) {
            if let Some(clause) = value.as_str().and_then(|v| variable_clause(key, v)) {
                clauses.insert(clause);
            }
        }
    }
    if let Some(markers) = entry.markers.take() {
        if let Some(expr) = to_string(&markers) {
            clauses.insert(expr);
        }
    }

    (combine(clauses), entry)
}

/// Convert any supported marker value into one normalized string.
pub fn to_string(value: &MarkerValue) -> Option<String> {
    match value {
        MarkerValue::Expr(expr) => normalize_marker(expr),
        MarkerValue::Clauses(list) => combine(list.iter().filter_map(|c| normalize_marker(c))),
        MarkerValue::Table(table) => {
            let entry = PackageEntry {
                markers: table.get("markers").cloned().map(MarkerValue::Expr),
                fields: table
                    .iter()
                    .filter(|(k, _)| k.as_str() != "markers")
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect::<BTreeMap<_, _>>(),
                ..PackageEntry::default()
            };
            extract(entry).0
        }
    }
}

fn variable_clause(key: &str, value: &str) -> Option<String> {
    normalize_marker(&format!("{key} {}", value.trim()))
}

/// Join normalized clauses with `and`, deduplicated and in sorted order.
fn combine(clauses: impl IntoIterator<Item = String>) -> Option<String> {
    let unique: BTreeSet<String> = clauses.into_iter().collect();
    let parsed = unique.iter().filter_map(|c| Marker::parse(c).ok());
    Marker::all(parsed).map(|m| m.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(value: serde_json::Value) -> PackageEntry {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn inline_variable_keys_become_clauses() {
        let (markers, cleaned) = extract(entry(json!({
            "version": "==1.0",
            "os_name": "== 'nt'",
            "sys_platform": "!= 'cygwin'"
        })));
        assert_eq!(
            markers.as_deref(),
            Some(r#"os_name == "nt" and sys_platform != "cygwin""#)
        );
        assert!(cleaned.fields.is_empty());
        assert_eq!(cleaned.version.as_deref(), Some("==1.0"));
    }

    #[test]
    fn literal_markers_field_is_consumed_and_merged() {
        let (markers, cleaned) = extract(entry(json!({
            "markers": "python_version < '3.8' or os_name == 'nt'",
            "platform_machine": "== 'x86_64'"
        })));
        assert_eq!(
            markers.as_deref(),
            Some(r#"platform_machine == "x86_64" and (python_version < "3.8" or os_name == "nt")"#)
        );
        assert!(cleaned.markers.is_none());
    }

    #[test]
    fn no_markers_yields_none() {
        let (markers, cleaned) = extract(entry(json!({"version": "==2.0", "editable": true})));
        assert!(markers.is_none());
        assert!(cleaned.field_bool("editable"));
    }

    #[test]
    fn extraction_is_destructive_and_idempotent() {
        let (first, cleaned) = extract(entry(json!({
            "markers": "os_name == 'posix'",
            "python_version": ">= '3.9'"
        })));
        assert!(first.is_some());
        for key in MARKER_VARIABLES {
            assert!(!cleaned.fields.contains_key(key));
        }
        let (second, again) = extract(cleaned.clone());
        assert!(second.is_none());
        assert_eq!(again, cleaned);
    }

    #[test]
    fn duplicate_clauses_collapse() {
        let (markers, _) = extract(entry(json!({
            "markers": "os_name == \"nt\"",
            "os_name": "=='nt'"
        })));
        assert_eq!(markers.as_deref(), Some(r#"os_name == "nt""#));
    }

    #[test]
    fn unparsable_clauses_are_dropped() {
        let (markers, cleaned) = extract(entry(json!({
            "markers": "this is not a marker",
            "os_name": "== 'nt'"
        })));
        assert_eq!(markers.as_deref(), Some(r#"os_name == "nt""#));
        assert!(cleaned.fields.is_empty());
    }

    #[test]
    fn to_string_handles_every_shape() {
        assert_eq!(
            to_string(&MarkerValue::from("os_name=='nt'")).as_deref(),
            Some(r#"os_name == "nt""#)
        );
        assert_eq!(
            to_string(&MarkerValue::Clauses(vec![
                "sys_platform == 'linux'".to_owned(),
                "os_name == 'posix'".to_owned(),
            ]))
            .as_deref(),
            Some(r#"os_name == "posix" and sys_platform == "linux""#)
        );
        let table = BTreeMap::from([("python_version".to_owned(), "< '3.10'".to_owned())]);
        assert_eq!(
            to_string(&MarkerValue::Table(table)).as_deref(),
            Some(r#"python_version < "3.10""#)
        );
        let literal = BTreeMap::from([("markers".to_owned(), "os_name == 'nt'".to_owned())]);
        assert_eq!(
            to_string(&MarkerValue::Table(literal)).as_deref(),
            Some(r#"os_name == "nt""#)
        );
        let mixed = BTreeMap::from([
            ("markers".to_owned(), "os_name == 'nt'".to_owned()),
            ("sys_platform".to_owned(), "== 'win32'".to_owned()),
        ]);
        assert_eq!(
            to_string(&MarkerValue::Table(mixed)).as_deref(),
            Some(r#"os_name == "nt" and sys_platform == "win32""#)
        );
        assert_eq!(to_string(&MarkerValue::from("")), None);
        assert_eq!(to_string(&MarkerValue::Clauses(Vec::new())), None);
    }
}
