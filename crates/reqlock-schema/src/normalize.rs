use crate::manifest::{Manifest, ManifestError, Source};
use crate::record::PackageEntry;
use crate::specifier;
use crate::types::{ManifestDigest, PackageName};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Canonical, validated representation of a parsed manifest.
///
/// Package keys are canonical names and versions are normalized specifiers.
/// This is the input to the digest recorded in the lock file, so two manifests
/// that differ only in spelling or formatting share a digest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedManifest {
    pub sources: Vec<Source>,
    pub requires: BTreeMap<String, String>,
    pub categories: BTreeMap<String, BTreeMap<String, PackageEntry>>,
}

impl Manifest {
    /// Validate sources and declarations and produce the canonical form.
    pub fn normalize(&self) -> Result<NormalizedManifest, ManifestError> {
        let mut sources = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            let name = source.name.trim();
            if source.url.trim().is_empty() {
                return Err(ManifestError::EmptySourceUrl(name.to_owned()));
            }
            if sources.iter().any(|s: &Source| s.name == name) {
                return Err(ManifestError::DuplicateSource(name.to_owned()));
            }
            sources.push(Source {
                name: name.to_owned(),
                url: source.url.trim().to_owned(),
                verify_ssl: source.verify_ssl,
            });
        }

        let mut categories = BTreeMap::new();
        for (category, declared) in &self.categories {
            let mut entries = BTreeMap::new();
            for (name, declaration) in declared {
                declaration
                    .requirement(name)
                    .map_err(|source| ManifestError::InvalidEntry {
                        category: category.clone(),
                        name: name.clone(),
                        source,
                    })?;
                let mut entry = declaration.to_entry();
                if let Some(index) = entry.index.as_deref() {
                    if !sources.iter().any(|s| s.name == index) {
                        return Err(ManifestError::UnknownIndex {
                            category: category.clone(),
                            name: name.clone(),
                            index: index.to_owned(),
                        });
                    }
                }
                entry.version = entry.version.as_deref().map(specifier::normalize);
                let canonical = PackageName::new(name.as_str()).as_str().to_owned();
                if entries.insert(canonical, entry).is_some() {
                    return Err(ManifestError::DuplicatePackage {
                        category: category.clone(),
                        name: name.clone(),
                    });
                }
            }
            categories.insert(category.clone(), entries);
        }

        Ok(NormalizedManifest {
            sources,
            requires: self.requires.clone(),
            categories,
        })
    }
}

impl NormalizedManifest {
    pub fn canonical_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Hex blake3 digest of the canonical JSON.
    pub fn digest(&self) -> Result<ManifestDigest, serde_json::Error> {
        let json = self.canonical_json()?;
        Ok(ManifestDigest::new(
            blake3::hash(json.as_bytes()).to_hex().to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use crate::manifest::parse_manifest_str;

    #[test]
    fn normalizes_names_and_versions() {
        let m = parse_manifest_str(
            r#"
[packages]
Flask_Login = "0.6.3"
requests = "any"
"#,
        )
        .unwrap();
        let n = m.normalize().unwrap();
        let packages = &n.categories["packages"];
        assert_eq!(packages["flask-login"].version.as_deref(), Some("==0.6.3"));
        assert_eq!(packages["requests"].version.as_deref(), Some("*"));
    }

    #[test]
    fn digest_ignores_spelling_and_formatting() {
        let a = parse_manifest_str("[packages]\nFlask_Login = \"0.6\"\n")
            .unwrap()
            .normalize()
            .unwrap();
        let b = parse_manifest_str("[packages]\nflask-login   =   \"==0.6\"\n")
            .unwrap()
            .normalize()
            .unwrap();
        assert_eq!(a.digest().unwrap(), b.digest().unwrap());
        assert_eq!(a.digest().unwrap().len(), 64);
    }

    #[test]
    fn digest_changes_with_content() {
        let a = parse_manifest_str("[packages]\nfoo = \"*\"\n")
            .unwrap()
            .normalize()
            .unwrap();
        let b = parse_manifest_str("[packages]\nfoo = \">=1\"\n")
            .unwrap()
            .normalize()
            .unwrap();
        assert_ne!(a.digest().unwrap(), b.digest().unwrap());
    }

    #[test]
    fn rejects_duplicate_canonical_names() {
        let m = parse_manifest_str("[packages]\nFoo_Bar = \"*\"\nfoo-bar = \"*\"\n").unwrap();
        assert!(matches!(
            m.normalize(),
            Err(crate::ManifestError::DuplicatePackage { .. })
        ));
    }

    #[test]
    fn rejects_invalid_declarations() {
        let m = parse_manifest_str("[packages]\nfoo = \"~=1\"\n").unwrap();
        assert!(matches!(
            m.normalize(),
            Err(crate::ManifestError::InvalidEntry { .. })
        ));
    }

    #[test]
    fn rejects_unknown_index_and_bad_sources() {
        let m = parse_manifest_str(
            "[[source]]\nname = \"pypi\"\nurl = \"https://pypi.org/simple\"\n\n[packages]\nfoo = { version = \"*\", index = \"nope\" }\n",
        )
        .unwrap();
        assert!(matches!(
            m.normalize(),
            Err(crate::ManifestError::UnknownIndex { .. })
        ));

        let m = parse_manifest_str("[[source]]\nname = \"a\"\nurl = \"  \"\n").unwrap();
        assert!(matches!(
            m.normalize(),
            Err(crate::ManifestError::EmptySourceUrl(_))
        ));

        let m = parse_manifest_str(
            "[[source]]\nname = \"a\"\nurl = \"x\"\n[[source]]\nname = \"a\"\nurl = \"y\"\n",
        )
        .unwrap();
        assert!(matches!(
            m.normalize(),
            Err(crate::ManifestError::DuplicateSource(_))
        ));
    }
}
