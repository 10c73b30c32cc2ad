//! Version specifier normalization and PEP 440 matching.
//!
//! [`normalize`] and [`strip_version`] work on raw strings and never fail;
//! every version field passes through [`normalize`] before it is reconciled.
//! [`SpecifierSet`] is the parsed form used to test a pinned version against
//! a constraint.

use crate::version::{Version, VersionError};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Comparison operators, longest first so prefix matching is unambiguous.
pub const OPERATORS: [&str; 8] = ["===", "~=", "==", "!=", "<=", ">=", "<", ">"];

const ANY_ALIASES: [&str; 3] = ["any", "<any>", "*"];

/// The unconstrained specifier.
pub const ANY: &str = "*";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SpecifierError {
    #[error("invalid specifier '{0}'")]
    Invalid(String),
    #[error("invalid version in specifier '{spec}': {source}")]
    Version {
        spec: String,
        #[source]
        source: VersionError,
    },
    #[error("'~=' requires at least two release segments: '{0}'")]
    CompatibleTooShort(String),
}

fn leading_operator(s: &str) -> Option<&'static str> {
    OPERATORS.iter().copied().find(|op| s.starts_with(op))
}

/// Canonicalize a raw specifier string.
///
/// Empty input and the aliases `any`, `<any>` and `*` become `"*"`. Input that
/// already starts with an operator is kept, collapsing a run of redundant `=`
/// after `==`. Anything else is treated as an exact pin.
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || ANY_ALIASES.iter().any(|a| trimmed.eq_ignore_ascii_case(a)) {
        return ANY.to_owned();
    }
    if leading_operator(trimmed).is_some() {
        if trimmed.starts_with("==") && trimmed.matches('=').count() > 3 {
            return format!("=={}", trimmed.trim_start_matches('='));
        }
        return trimmed.to_owned();
    }
    format!("=={trimmed}")
}

/// Strip every leading operator token, returning the bare version.
///
/// Expects a single clause. Only the leading operators go, so a compound
/// specifier keeps its later clauses: `>=1,<2` becomes `1,<2`.
pub fn strip_version(spec: &str) -> &str {
    let mut rest = spec.trim();
    while let Some(op) = leading_operator(rest) {
        rest = rest[op.len()..].trim_start();
    }
    rest
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Arbitrary,
    Compatible,
    Equal,
    NotEqual,
    LessEqual,
    GreaterEqual,
    Less,
    Greater,
}

impl Operator {
    fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "===" => Self::Arbitrary,
            "~=" => Self::Compatible,
            "==" => Self::Equal,
            "!=" => Self::NotEqual,
            "<=" => Self::LessEqual,
            ">=" => Self::GreaterEqual,
            "<" => Self::Less,
            ">" => Self::Greater,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Arbitrary => "===",
            Self::Compatible => "~=",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::LessEqual => "<=",
            Self::GreaterEqual => ">=",
            Self::Less => "<",
            Self::Greater => ">",
        }
    }
}

/// A single `<op><version>` clause.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Specifier {
    operator: Operator,
    text: String,
    version: Option<Version>,
    wildcard: bool,
}

impl Specifier {
    pub fn parse(input: &str) -> Result<Self, SpecifierError> {
        let trimmed = input.trim();
        let op = leading_operator(trimmed).ok_or_else(|| SpecifierError::Invalid(input.to_owned()))?;
        let operator = Operator::from_token(op).ok_or_else(|| SpecifierError::Invalid(input.to_owned()))?;
        let text = trimmed[op.len()..].trim().to_owned();
        if text.is_empty() {
            return Err(SpecifierError::Invalid(input.to_owned()));
        }

        if operator == Operator::Arbitrary {
            return Ok(Self {
                operator,
                text,
                version: None,
                wildcard: false,
            });
        }

        let (version_text, wildcard) = match text.strip_suffix(".*") {
            Some(prefix) if matches!(operator, Operator::Equal | Operator::NotEqual) => {
                (prefix, true)
            }
            _ => (text.as_str(), false),
        };
        let version = Version::parse(version_text).map_err(|source| SpecifierError::Version {
            spec: input.to_owned(),
            source,
        })?;
        if operator == Operator::Compatible && version.release().len() < 2 {
            return Err(SpecifierError::CompatibleTooShort(input.to_owned()));
        }

        Ok(Self {
            operator,
            text,
            version: Some(version),
            wildcard,
        })
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// The version text as written after the operator.
    pub fn version_text(&self) -> &str {
        &self.text
    }

    /// True for a single exact pin (`==1.2` or `===1.2`).
    pub fn is_pin(&self) -> bool {
        matches!(self.operator, Operator::Equal | Operator::Arbitrary) && !self.wildcard
    }

    pub fn contains(&self, candidate: &Version, prereleases: bool) -> bool {
        if candidate.is_prerelease() && !prereleases {
            return false;
        }
        let Some(spec) = &self.version else {
            return candidate.to_string().eq_ignore_ascii_case(&self.text);
        };
        match self.operator {
            Operator::Arbitrary => unreachable!("arbitrary equality carries no parsed version"),
            Operator::Equal => self.equals(spec, candidate),
            Operator::NotEqual => !self.equals(spec, candidate),
            Operator::Compatible => {
                let prefix = &spec.release()[..spec.release().len() - 1];
                candidate >= spec
                    && candidate.epoch() == spec.epoch()
                    && release_has_prefix(candidate.release(), prefix)
            }
            Operator::LessEqual => candidate.public() <= *spec,
            Operator::GreaterEqual => candidate.public() >= *spec,
            Operator::Less => {
                candidate.public() < *spec
                    && !(!spec.is_prerelease()
                        && candidate.is_prerelease()
                        && candidate.base() == spec.base())
            }
            Operator::Greater => {
                candidate.public() > *spec
                    && !(!spec.is_postrelease()
                        && candidate.is_postrelease()
                        && candidate.base() == spec.base())
                    && !(candidate.has_local() && candidate.base() == spec.base())
            }
        }
    }

    fn equals(&self, spec: &Version, candidate: &Version) -> bool {
        if self.wildcard {
            return candidate.epoch() == spec.epoch()
                && release_has_prefix(candidate.release(), spec.release());
        }
        if spec.has_local() {
            candidate == spec
        } else {
            candidate.public() == *spec
        }
    }
}

fn release_has_prefix(release: &[u64], prefix: &[u64]) -> bool {
    prefix
        .iter()
        .enumerate()
        .all(|(i, want)| release.get(i).copied().unwrap_or(0) == *want)
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.operator.as_str(), self.text)
    }
}

impl FromStr for Specifier {
    type Err = SpecifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A comma-separated conjunction of specifiers. Empty means unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SpecifierSet {
    specifiers: Vec<Specifier>,
}

impl SpecifierSet {
    pub fn parse(input: &str) -> Result<Self, SpecifierError> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed == ANY {
            return Ok(Self::default());
        }
        let specifiers = trimmed
            .split(',')
            .map(Specifier::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { specifiers })
    }

    pub fn is_empty(&self) -> bool {
        self.specifiers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Specifier> {
        self.specifiers.iter()
    }

    /// The bare version of a single exact pin, if this set is one.
    pub fn pinned_version(&self) -> Option<&str> {
        match self.specifiers.as_slice() {
            [only] if only.is_pin() => Some(only.version_text()),
            _ => None,
        }
    }

    pub fn contains(&self, candidate: &Version, prereleases: bool) -> bool {
        self.specifiers
            .iter()
            .all(|spec| spec.contains(candidate, prereleases))
    }
}

impl fmt::Display for SpecifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.specifiers.is_empty() {
            return f.write_str(ANY);
        }
        let parts: Vec<String> = self.specifiers.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join(","))
    }
}

impl FromStr for SpecifierSet {
    type Err = SpecifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
