//! Names, versions, specifiers, markers, manifests and lock files for reqlock.
//!
//! This crate defines the schema layer: PEP 440 versions and specifier
//! normalization (`specifier`), PEP 508 requirements (`Requirement`) and
//! markers (`Marker`, `MarkerEnvironment`), the marker extractor that folds
//! every marker source on a record into one expression (`extract`), the
//! `Pipfile`-shaped manifest (`Manifest`) with its normalized digest form,
//! and the `Pipfile.lock`-shaped lock file (`LockFile`).

pub mod environment;
pub mod extract;
pub mod lock;
pub mod manifest;
pub mod marker;
pub mod normalize;
pub mod record;
pub mod requirement;
pub mod specifier;
pub mod types;
pub mod version;

pub use environment::MarkerEnvironment;
pub use lock::{LockError, LockFile, LockMeta};
pub use manifest::{
    parse_manifest_file, parse_manifest_str, IndexLookup, Manifest, ManifestEntry, ManifestError,
    Source,
};
pub use marker::{Marker, MarkerError};
pub use normalize::NormalizedManifest;
pub use record::{LockedPackage, MarkerValue, PackageEntry, ResolvedCandidate};
pub use requirement::{Link, Requirement, RequirementError};
pub use specifier::{Specifier, SpecifierError, SpecifierSet};
pub use types::{canonicalize_name, Category, ManifestDigest, PackageName};
pub use version::{Version, VersionError};
