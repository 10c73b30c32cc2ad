//! Newtype wrappers for string identifiers, providing compile-time type safety.
//!
//! All newtypes serialize/deserialize as plain strings so lock and manifest
//! files keep their usual shape.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string.
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// A manifest dependency group (`packages`, `dev-packages`, or a custom name).
    Category
);

string_newtype!(
    /// Hex blake3 digest of a normalized manifest, recorded in the lock metadata.
    ManifestDigest
);

impl Category {
    pub const DEFAULT: &'static str = "packages";
    pub const DEVELOP: &'static str = "dev-packages";

    pub fn default_packages() -> Self {
        Self::new(Self::DEFAULT)
    }

    pub fn dev_packages() -> Self {
        Self::new(Self::DEVELOP)
    }

    pub fn is_default(&self) -> bool {
        self.0 == Self::DEFAULT
    }

    /// Accepts a category name or the lock section that records it, so
    /// `default` and `packages` name the same category.
    pub fn from_user_input(name: &str) -> Self {
        match name.trim() {
            "default" => Self::default_packages(),
            "develop" => Self::dev_packages(),
            other => Self::new(other),
        }
    }

    /// Name of the lock file section that records this category.
    pub fn lock_section(&self) -> &str {
        match self.0.as_str() {
            Self::DEFAULT => "default",
            Self::DEVELOP => "develop",
            other => other,
        }
    }
}

/// A distribution name, compared by its canonical form.
///
/// The canonical form is lowercase with every run of `-`, `_` and `.`
/// collapsed into a single `-`. The spelling it was created from is kept
/// for display only.
#[derive(Debug, Clone)]
pub struct PackageName {
    canonical: String,
    original: String,
}

impl PackageName {
    pub fn new(name: impl Into<String>) -> Self {
        let original = name.into();
        Self {
            canonical: canonicalize_name(&original),
            original,
        }
    }

    /// The canonical spelling, used for lookups and as the lock key.
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// The spelling this name was created from.
    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn matches(&self, other: &str) -> bool {
        self.canonical == canonicalize_name(other)
    }
}

pub fn canonicalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                out.push('-');
            }
            in_separator = true;
        } else {
            out.push(c.to_ascii_lowercase());
            in_separator = false;
        }
    }
    out
}

impl PartialEq for PackageName {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for PackageName {}

impl PartialOrd for PackageName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical.cmp(&other.canonical)
    }
}

impl Hash for PackageName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl AsRef<str> for PackageName {
    fn as_ref(&self) -> &str {
        &self.canonical
    }
}

// Lookups by `&str` must pass the canonical spelling.
impl Borrow<str> for PackageName {
    fn borrow(&self) -> &str {
        &self.canonical
    }
}

impl From<&str> for PackageName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PackageName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl Serialize for PackageName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.canonical)
    }
}

impl<'de> Deserialize<'de> for PackageName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}
