//! PEP 508 requirements and the source-link descriptor.

use crate::extract;
use crate::marker::{Marker, MarkerError};
use crate::record::PackageEntry;
use crate::specifier::{self, SpecifierError, SpecifierSet};
use crate::types::PackageName;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

pub const VCS_SCHEMES: [&str; 4] = ["git", "hg", "svn", "bzr"];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequirementError {
    #[error("invalid requirement '{input}': {reason}")]
    Malformed { input: String, reason: String },
    #[error("invalid requirement '{input}': {source}")]
    Specifier {
        input: String,
        #[source]
        source: SpecifierError,
    },
    #[error("invalid requirement '{input}': {source}")]
    Marker {
        input: String,
        #[source]
        source: MarkerError,
    },
}

/// Where a requirement is fetched from when it is not an index release.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Link {
    Vcs {
        vcs: String,
        url: String,
        reference: Option<String>,
        subdirectory: Option<String>,
        editable: bool,
    },
    Url {
        url: String,
    },
    Path {
        path: String,
        editable: bool,
    },
}

impl Link {
    /// Parse a direct reference URL such as `git+https://host/repo.git@v1.0`.
    pub fn from_url(raw: &str) -> Self {
        let (url, fragment) = match raw.split_once('#') {
            Some((url, fragment)) => (url, Some(fragment)),
            None => (raw, None),
        };
        let subdirectory = fragment.and_then(|f| {
            f.split('&')
                .find_map(|kv| kv.strip_prefix("subdirectory="))
                .map(str::to_owned)
        });

        for vcs in VCS_SCHEMES {
            let Some(rest) = url.strip_prefix(vcs).and_then(|r| r.strip_prefix('+')) else {
                continue;
            };
            let (url, reference) = split_vcs_reference(rest);
            return Self::Vcs {
                vcs: vcs.to_owned(),
                url,
                reference,
                subdirectory,
                editable: false,
            };
        }
        if let Some(path) = raw.strip_prefix("file://") {
            return Self::Path {
                path: path.to_owned(),
                editable: false,
            };
        }
        Self::Url {
            url: raw.to_owned(),
        }
    }

    /// Read a link from a manifest or lock table (`git = "..."`, `path = "..."`).
    pub fn from_entry(entry: &PackageEntry) -> Option<Self> {
        let editable = entry.field_bool("editable");
        for vcs in VCS_SCHEMES {
            if let Some(url) = entry.field_str(vcs) {
                return Some(Self::Vcs {
                    vcs: vcs.to_owned(),
                    url: url.to_owned(),
                    reference: entry.field_str("ref").map(str::to_owned),
                    subdirectory: entry.field_str("subdirectory").map(str::to_owned),
                    editable,
                });
            }
        }
        if let Some(path) = entry.field_str("path") {
            return Some(Self::Path {
                path: path.to_owned(),
                editable,
            });
        }
        entry.field_str("file").map(|url| Self::Url {
            url: url.to_owned(),
        })
    }

    pub fn is_vcs(&self) -> bool {
        matches!(self, Self::Vcs { .. })
    }
}

// The reference is the last '@' in the path part, not the one in `user@host`.
fn split_vcs_reference(url: &str) -> (String, Option<String>) {
    let path_start = url
        .find("://")
        .map_or(0, |i| i + 3 + url[i + 3..].find('/').unwrap_or(url.len() - i - 3));
    match url[path_start..].rfind('@') {
        Some(at) => {
            let at = path_start + at;
            (url[..at].to_owned(), Some(url[at + 1..].to_owned()))
        }
        None => (url.to_owned(), None),
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vcs {
                vcs,
                url,
                reference,
                subdirectory,
                ..
            } => {
                write!(f, "{vcs}+{url}")?;
                if let Some(r) = reference {
                    write!(f, "@{r}")?;
                }
                if let Some(sub) = subdirectory {
                    write!(f, "#subdirectory={sub}")?;
                }
                Ok(())
            }
            Self::Url { url } => f.write_str(url),
            Self::Path { path, .. } => write!(f, "file://{path}"),
        }
    }
}

/// A named requirement. Two requirements are equal when their names are.
#[derive(Debug, Clone)]
pub struct Requirement {
    name: PackageName,
    specifier: SpecifierSet,
    extras: BTreeSet<String>,
    marker: Option<Marker>,
    link: Option<Link>,
}

impl Requirement {
    /// An unconstrained requirement on `name`.
    pub fn named(name: impl Into<PackageName>) -> Self {
        Self {
            name: name.into(),
            specifier: SpecifierSet::default(),
            extras: BTreeSet::new(),
            marker: None,
            link: None,
        }
    }

    /// Parse a PEP 508 requirement string.
    pub fn parse(input: &str) -> Result<Self, RequirementError> {
        let malformed = |reason: &str| RequirementError::Malformed {
            input: input.to_owned(),
            reason: reason.to_owned(),
        };
        let text = input.trim();

        let name_end = text
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
            .unwrap_or(text.len());
        let name = &text[..name_end];
        if name.is_empty()
            || !name.starts_with(|c: char| c.is_ascii_alphanumeric())
            || !name.ends_with(|c: char| c.is_ascii_alphanumeric())
        {
            return Err(malformed("missing or invalid package name"));
        }
        let mut rest = text[name_end..].trim_start();

        let mut extras = BTreeSet::new();
        if let Some(after) = rest.strip_prefix('[') {
            let close = after.find(']').ok_or_else(|| malformed("unclosed extras"))?;
            for extra in after[..close].split(',') {
                let extra = extra.trim();
                if extra.is_empty() {
                    continue;
                }
                if !extra
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
                {
                    return Err(malformed("invalid extra name"));
                }
                extras.insert(extra.to_owned());
            }
            rest = after[close + 1..].trim_start();
        }

        let mut link = None;
        let mut specifier = SpecifierSet::default();
        let marker_text;
        if let Some(after) = rest.strip_prefix('@') {
            let after = after.trim_start();
            let (url, markers) = match after.find(|c: char| c.is_whitespace()) {
                Some(ws) => {
                    let tail = after[ws..].trim_start();
                    let markers = tail
                        .strip_prefix(';')
                        .ok_or_else(|| malformed("expected ';' after URL"))?;
                    (&after[..ws], Some(markers))
                }
                None => (after, None),
            };
            if url.is_empty() {
                return Err(malformed("empty URL"));
            }
            link = Some(Link::from_url(url));
            marker_text = markers;
        } else {
            let (spec_text, markers) = match rest.split_once(';') {
                Some((s, m)) => (s, Some(m)),
                None => (rest, None),
            };
            let mut spec_text = spec_text.trim();
            if let Some(inner) = spec_text.strip_prefix('(') {
                spec_text = inner
                    .strip_suffix(')')
                    .ok_or_else(|| malformed("unclosed version parenthesis"))?
                    .trim();
            }
            if !spec_text.is_empty() {
                specifier = SpecifierSet::parse(spec_text).map_err(|source| {
                    RequirementError::Specifier {
                        input: input.to_owned(),
                        source,
                    }
                })?;
            }
            marker_text = markers;
        }

        let marker = match marker_text.map(str::trim) {
            Some("") => return Err(malformed("empty marker")),
            Some(m) => Some(Marker::parse(m).map_err(|source| RequirementError::Marker {
                input: input.to_owned(),
                source,
            })?),
            None => None,
        };

        Ok(Self {
            name: PackageName::new(name),
            specifier,
            extras,
            marker,
            link,
        })
    }

    /// Build a requirement from a manifest or lock table.
    ///
    /// The version is normalized first, so a bare `1.0` pins and `*` leaves the
    /// requirement unconstrained. Markers that fail to parse are ignored.
    pub fn from_entry(
        name: impl Into<PackageName>,
        entry: &PackageEntry,
    ) -> Result<Self, RequirementError> {
        let name = name.into();
        let specifier = match entry.version.as_deref() {
            Some(raw) => {
                let normalized = specifier::normalize(raw);
                SpecifierSet::parse(&normalized).map_err(|source| RequirementError::Specifier {
                    input: format!("{name}{normalized}"),
                    source,
                })?
            }
            None => SpecifierSet::default(),
        };
        let (markers, _) = extract::extract(entry.clone());
        Ok(Self {
            name,
            specifier,
            extras: entry.extras.iter().map(|e| e.trim().to_owned()).collect(),
            marker: markers.and_then(|m| Marker::parse(&m).ok()),
            link: Link::from_entry(entry),
        })
    }

    pub fn name(&self) -> &PackageName {
        &self.name
    }

    pub fn specifier(&self) -> &SpecifierSet {
        &self.specifier
    }

    pub fn extras(&self) -> &BTreeSet<String> {
        &self.extras
    }

    pub fn marker(&self) -> Option<&Marker> {
        self.marker.as_ref()
    }

    /// The marker rendered in canonical form.
    pub fn markers(&self) -> Option<String> {
        self.marker.as_ref().map(ToString::to_string)
    }

    pub fn link(&self) -> Option<&Link> {
        self.link.as_ref()
    }

    /// The bare version this requirement pins, if it is an exact pin.
    pub fn version(&self) -> Option<&str> {
        self.specifier.pinned_version()
    }
}

impl PartialEq for Requirement {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Requirement {}

impl Hash for Requirement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.as_str())?;
        if !self.extras.is_empty() {
            let extras: Vec<&str> = self.extras.iter().map(String::as_str).collect();
            write!(f, "[{}]", extras.join(","))?;
        }
        if let Some(link) = &self.link {
            write!(f, " @ {link}")?;
            if self.marker.is_some() {
                f.write_str(" ")?;
            }
        } else if !self.specifier.is_empty() {
            write!(f, "{}", self.specifier)?;
        }
        if let Some(marker) = &self.marker {
            write!(f, "; {marker}")?;
        }
        Ok(())
    }
}

impl FromStr for Requirement {
    type Err = RequirementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_name_extras_specifier_and_marker() {
        let req = Requirement::parse("Requests[socks, security] >=2.8.1, ==2.8.* ; python_version < '2.7'")
            .unwrap();
        assert_eq!(req.name().as_str(), "requests");
        assert_eq!(req.extras().len(), 2);
        assert_eq!(req.specifier().to_string(), ">=2.8.1,==2.8.*");
        assert_eq!(req.markers().as_deref(), Some(r#"python_version < "2.7""#));
    }

    #[test]
    fn parses_parenthesized_specifier() {
        let req = Requirement::parse("six (>=1.10)").unwrap();
        assert_eq!(req.specifier().to_string(), ">=1.10");
    }

    #[test]
    fn parses_direct_vcs_reference() {
        let req =
            Requirement::parse("pkg @ git+ssh://git@github.com/org/pkg.git@v1.2#subdirectory=src ; os_name == 'posix'")
                .unwrap();
        match req.link() {
            Some(Link::Vcs {
                vcs,
                url,
                reference,
                subdirectory,
                ..
            }) => {
                assert_eq!(vcs, "git");
                assert_eq!(url, "ssh://git@github.com/org/pkg.git");
                assert_eq!(reference.as_deref(), Some("v1.2"));
                assert_eq!(subdirectory.as_deref(), Some("src"));
            }
            other => panic!("expected vcs link, got {other:?}"),
        }
        assert!(req.marker().is_some());
    }

    #[test]
    fn rejects_malformed_requirements() {
        for bad in ["", ">=1.0", "-pkg", "pkg[extra", "pkg >=", "pkg ; ", "pkg; os_name ="] {
            assert!(Requirement::parse(bad).is_err(), "{bad:?} should fail");
        }
    }

    #[test]
    fn equality_is_by_canonical_name() {
        let a = Requirement::parse("Foo_Bar>=1").unwrap();
        let b = Requirement::parse("foo-bar==2").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn from_entry_normalizes_version_and_reads_link() {
        let entry: PackageEntry = serde_json::from_value(json!({
            "version": "1.5.0",
            "extras": ["x"],
            "os_name": "== 'nt'"
        }))
        .unwrap();
        let req = Requirement::from_entry("foo", &entry).unwrap();
        assert_eq!(req.version(), Some("1.5.0"));
        assert_eq!(req.markers().as_deref(), Some(r#"os_name == "nt""#));

        let vcs: PackageEntry = serde_json::from_value(json!({
            "git": "https://example.com/foo.git",
            "ref": "abc123",
            "editable": true
        }))
        .unwrap();
        let req = Requirement::from_entry("foo", &vcs).unwrap();
        assert!(req.link().is_some_and(Link::is_vcs));
        assert_eq!(req.version(), None);
    }

    #[test]
    fn star_version_is_unconstrained() {
        let req = Requirement::from_entry("foo", &PackageEntry::with_version("*")).unwrap();
        assert!(req.specifier().is_empty());
    }

    #[test]
    fn display_renders_pep508() {
        let req = Requirement::parse("a[y,x]>=1;os_name=='nt'").unwrap();
        assert_eq!(req.to_string(), r#"a[x,y]>=1; os_name == "nt""#);
    }
}
