use crate::marker::{is_marker_variable, MarkerError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Values for marker variables, passed explicitly wherever markers are evaluated.
///
/// Variables without a value stay undefined; evaluating a marker that reads
/// one yields [`MarkerError::UndefinedVariable`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkerEnvironment {
    values: BTreeMap<String, String>,
}

impl MarkerEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// The variables this process can answer for the host it runs on.
    ///
    /// The interpreter is assumed to be CPython. Its version (`python_version`
    /// and friends) is left undefined; callers supply it as an override.
    pub fn host() -> Self {
        let os = std::env::consts::OS;
        let arch = std::env::consts::ARCH;

        let os_name = if os == "windows" { "nt" } else { "posix" };
        let sys_platform = match os {
            "macos" => "darwin",
            "windows" => "win32",
            other => other,
        };
        let platform_system = match os {
            "linux" => "Linux".to_owned(),
            "macos" => "Darwin".to_owned(),
            "windows" => "Windows".to_owned(),
            other => capitalize(other),
        };
        let platform_machine = match (os, arch) {
            ("windows", "x86_64") => "AMD64",
            ("windows", "aarch64") => "ARM64",
            ("macos", "aarch64") => "arm64",
            (_, other) => other,
        };

        let mut env = Self::new();
        env.insert("os_name", os_name);
        env.insert("sys_platform", sys_platform);
        env.insert("platform_system", &platform_system);
        env.insert("platform_machine", platform_machine);
        env.insert("implementation_name", "cpython");
        env.insert("platform_python_implementation", "CPython");
        env
    }

    fn insert(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_owned(), value.to_owned());
    }

    /// Set a variable; only recognized marker variables are accepted.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), MarkerError> {
        if !is_marker_variable(key) {
            return Err(MarkerError::UnknownVariable(key.to_owned()));
        }
        self.insert(key, value);
        Ok(())
    }

    /// Overlay `overrides`, skipping empty values.
    ///
    /// The interpreter version variables stay consistent with each other. A
    /// `python_full_version` override fills in `python_version`; a bare
    /// `python_version` implies `python_full_version` `X.Y.0` unless the
    /// current full version already matches it. `implementation_version`
    /// follows `python_full_version` unless it is given explicitly.
    pub fn with_overrides<'a>(
        mut self,
        overrides: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, MarkerError> {
        let mut given = BTreeMap::new();
        for (key, value) in overrides {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            self.set(key, value)?;
            given.insert(key, value.to_owned());
        }

        let full = match (given.get("python_full_version"), given.get("python_version")) {
            (Some(full), short) => {
                if short.is_none() {
                    self.insert("python_version", &short_version_of(full));
                }
                Some(full.clone())
            }
            (None, Some(short)) => {
                let derived = full_version_of(short);
                let current = self.get("python_full_version");
                if current.is_some_and(|c| short_version_of(c) == short.as_str()) {
                    None
                } else {
                    self.insert("python_full_version", &derived);
                    Some(derived)
                }
            }
            (None, None) => None,
        };
        if let (Some(full), false) = (full, given.contains_key("implementation_version")) {
            self.insert("implementation_version", &full);
        }
        Ok(self)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn short_version_of(full: &str) -> String {
    full.split('.').take(2).collect::<Vec<_>>().join(".")
}

/// `3.11` becomes `3.11.0`; anything with a micro part is kept.
fn full_version_of(short: &str) -> String {
    if short.split('.').count() >= 3 {
        short.to_owned()
    } else {
        format!("{short}.0")
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_defines_platform_and_implementation_but_not_version() {
        let env = MarkerEnvironment::host();
        assert!(env.get("os_name").is_some());
        assert!(env.get("sys_platform").is_some());
        assert_eq!(env.get("implementation_name"), Some("cpython"));
        assert_eq!(env.get("platform_python_implementation"), Some("CPython"));
        assert!(env.get("python_version").is_none());
        assert!(env.get("python_full_version").is_none());
    }

    #[test]
    fn implementation_defaults_can_be_overridden() {
        let env = MarkerEnvironment::host()
            .with_overrides([
                ("implementation_name", "pypy"),
                ("platform_python_implementation", "PyPy"),
            ])
            .unwrap();
        assert_eq!(env.get("implementation_name"), Some("pypy"));
        assert_eq!(env.get("platform_python_implementation"), Some("PyPy"));
    }

    #[test]
    fn short_version_implies_full_version() {
        let env = MarkerEnvironment::new()
            .with_overrides([("python_version", "3.11")])
            .unwrap();
        assert_eq!(env.get("python_full_version"), Some("3.11.0"));
        assert_eq!(env.get("implementation_version"), Some("3.11.0"));
    }

    #[test]
    fn later_short_version_replaces_stale_full_version() {
        let env = MarkerEnvironment::new()
            .with_overrides([("python_full_version", "3.11.4")])
            .unwrap()
            .with_overrides([("python_version", "3.11")])
            .unwrap();
        assert_eq!(env.get("python_full_version"), Some("3.11.4"));

        let env = env.with_overrides([("python_version", "3.12")]).unwrap();
        assert_eq!(env.get("python_full_version"), Some("3.12.0"));
        assert_eq!(env.get("implementation_version"), Some("3.12.0"));
    }

    #[test]
    fn explicit_implementation_version_wins() {
        let env = MarkerEnvironment::new()
            .with_overrides([("python_version", "3.10"), ("implementation_version", "7.3.15")])
            .unwrap();
        assert_eq!(env.get("python_full_version"), Some("3.10.0"));
        assert_eq!(env.get("implementation_version"), Some("7.3.15"));
    }

    #[test]
    fn overrides_replace_and_extend() {
        let env = MarkerEnvironment::host()
            .with_overrides([("os_name", "nt"), ("python_version", "3.12")])
            .unwrap();
        assert_eq!(env.get("os_name"), Some("nt"));
        assert_eq!(env.get("python_version"), Some("3.12"));
    }

    #[test]
    fn full_version_implies_short_version() {
        let env = MarkerEnvironment::new()
            .with_overrides([("python_full_version", "3.10.4")])
            .unwrap();
        assert_eq!(env.get("python_version"), Some("3.10"));
        assert_eq!(env.get("implementation_version"), Some("3.10.4"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = MarkerEnvironment::new().with_overrides([("python_flavour", "x")]);
        assert!(matches!(result, Err(MarkerError::UnknownVariable(_))));
    }

    #[test]
    fn empty_override_values_are_ignored() {
        let env = MarkerEnvironment::new()
            .with_overrides([("python_version", "  ")])
            .unwrap();
        assert_eq!(env.get("python_version"), None);
    }
}
