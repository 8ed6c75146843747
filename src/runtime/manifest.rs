//! Sanitizer manifest definitions and loader.
//!
//! A manifest binds built-in sanitizers into application scopes, so the
//! registration phase can be configured from YAML instead of code:
//!
//! ```yaml
//! sanitizers:
//!   - scope: app::users
//!     builtin: sanitize_keep_lines
//!     name: address
//!   - scope: app::users
//!     builtin: sanitize
//!     set_default: true
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::builtins::builtin_callable;
use crate::registration::{Registrar, RegistrationError, SanitizerMarker};

/// One registration entry of a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizerBinding {
    /// Scope the sanitizer is registered under
    pub scope: String,

    /// Source name of the built-in callable
    pub builtin: String,

    /// Explicit transform name; omitted means the built-in's source name
    #[serde(default)]
    pub name: Option<String>,

    /// Take the scope's default slot even if one already exists
    #[serde(default)]
    pub set_default: bool,
}

impl SanitizerBinding {
    fn marker(&self) -> SanitizerMarker {
        SanitizerMarker {
            name: self.name.clone(),
            set_default: self.set_default,
        }
    }
}

/// Sanitizer bindings loaded from YAML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizerManifest {
    #[serde(default)]
    pub sanitizers: Vec<SanitizerBinding>,
}

/// Error type for manifest loading and application
#[derive(Debug)]
pub enum ManifestError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_yaml::Error),
    InvalidFile {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    NotADirectory(PathBuf),
    UnknownBuiltin {
        scope: String,
        builtin: String,
    },
    Registration(RegistrationError),
}

impl fmt::Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestError::Io { path, source } => {
                write!(f, "Failed to read manifest {}: {}", path.display(), source)
            }
            ManifestError::Parse(e) => write!(f, "Failed to parse manifest YAML: {}", e),
            ManifestError::InvalidFile { path, source } => {
                write!(f, "Failed to parse manifest {}: {}", path.display(), source)
            }
            ManifestError::NotADirectory(path) => {
                write!(f, "Manifest directory does not exist: {}", path.display())
            }
            ManifestError::UnknownBuiltin { scope, builtin } => {
                write!(f, "Unknown built-in sanitizer '{}' bound in scope '{}'", builtin, scope)
            }
            ManifestError::Registration(e) => write!(f, "Registration failed: {}", e),
        }
    }
}

impl std::error::Error for ManifestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ManifestError::Io { source, .. } => Some(source),
            ManifestError::Parse(e) => Some(e),
            ManifestError::InvalidFile { source, .. } => Some(source),
            ManifestError::Registration(e) => Some(e),
            ManifestError::NotADirectory(_) | ManifestError::UnknownBuiltin { .. } => None,
        }
    }
}

impl From<serde_yaml::Error> for ManifestError {
    fn from(e: serde_yaml::Error) -> Self {
        ManifestError::Parse(e)
    }
}

impl From<RegistrationError> for ManifestError {
    fn from(e: RegistrationError) -> Self {
        ManifestError::Registration(e)
    }
}

impl SanitizerManifest {
    /// Parse a manifest from a YAML string.
    pub fn load_from_str(contents: &str) -> Result<Self, ManifestError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Load a manifest from a YAML file.
    ///
    /// # Example
    /// ```ignore
    /// use sanitizer::runtime::SanitizerManifest;
    ///
    /// let manifest = SanitizerManifest::load_from_file("config/sanitizers.yaml")?;
    /// println!("{} bindings", manifest.sanitizers.len());
    /// ```
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| ManifestError::InvalidFile {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Register every binding through the validator, in file order.
    ///
    /// Stops at the first failing binding; the registrar must then be
    /// discarded.
    pub fn apply(&self, registrar: &mut Registrar) -> Result<usize, ManifestError> {
        for binding in &self.sanitizers {
            let callable =
                builtin_callable(&binding.builtin).ok_or_else(|| ManifestError::UnknownBuiltin {
                    scope: binding.scope.clone(),
                    builtin: binding.builtin.clone(),
                })?;
            registrar.register(&binding.scope, callable, &binding.marker())?;
        }
        Ok(self.sanitizers.len())
    }

    /// Append the bindings of another manifest.
    pub fn merge(&mut self, other: SanitizerManifest) {
        self.sanitizers.extend(other.sanitizers);
    }
}

/// Load and merge all manifests in a directory.
///
/// Files are read in name order so registration order is reproducible. Only
/// `.yaml` and `.yml` files are considered. The first file that fails to
/// read or parse aborts the load, since a registry missing its bindings must
/// not be served.
pub fn load_manifests_from_dir<P: AsRef<Path>>(dir_path: P) -> Result<SanitizerManifest, ManifestError> {
    let dir_path = dir_path.as_ref();
    if !dir_path.is_dir() {
        return Err(ManifestError::NotADirectory(dir_path.to_path_buf()));
    }

    let entries = fs::read_dir(dir_path).map_err(|source| ManifestError::Io {
        path: dir_path.to_path_buf(),
        source,
    })?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "yaml" || ext == "yml"))
        .collect();
    paths.sort();

    let mut manifest = SanitizerManifest::default();
    for path in paths {
        let loaded = SanitizerManifest::load_from_file(&path).map_err(|e| {
            tracing::error!("Rejecting manifest directory {}: {}", dir_path.display(), e);
            e
        })?;
        tracing::debug!("Loaded {} bindings from {}", loaded.sanitizers.len(), path.display());
        manifest.merge(loaded);
    }

    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform_registry::{RequestKey, DEFAULT_NAME};
    use std::io::Write;
    use tempfile::TempDir;

    fn write_manifest(dir: &Path, name: &str, yaml: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        path
    }

    const USERS: &str = r#"
sanitizers:
  - scope: app::users
    builtin: sanitize_keep_lines
    name: address
  - scope: app::users
    builtin: sanitize
"#;

    #[test]
    fn test_load_and_apply_manifest() {
        let manifest = SanitizerManifest::load_from_str(USERS).unwrap();
        assert_eq!(manifest.sanitizers.len(), 2);
        assert_eq!(manifest.sanitizers[0].name.as_deref(), Some("address"));
        assert!(!manifest.sanitizers[1].set_default);

        let mut registrar = Registrar::new();
        assert_eq!(manifest.apply(&mut registrar).unwrap(), 2);
        let registry = registrar.finish();

        let request = RequestKey::for_type::<String>("app::users", "address");
        let found = registry.resolve_request(&request, false).unwrap();
        assert_eq!(found.transform.source_name(), "sanitize_keep_lines");

        let request = RequestKey::for_type::<String>("app::users", DEFAULT_NAME);
        let found = registry.resolve_request(&request, true).unwrap();
        assert_eq!(found.transform.source_name(), "sanitize");
    }

    #[test]
    fn test_unknown_builtin_is_rejected() {
        let manifest = SanitizerManifest::load_from_str(
            "sanitizers:\n  - scope: app\n    builtin: rot13\n",
        )
        .unwrap();

        let err = manifest.apply(&mut Registrar::new()).unwrap_err();
        assert!(matches!(err, ManifestError::UnknownBuiltin { .. }));
        assert!(err.to_string().contains("rot13"));
    }

    #[test]
    fn test_duplicate_binding_is_rejected() {
        let yaml = r#"
sanitizers:
  - scope: app
    builtin: sanitize
  - scope: app
    builtin: sanitize
"#;
        let manifest = SanitizerManifest::load_from_str(yaml).unwrap();

        let err = manifest.apply(&mut Registrar::new()).unwrap_err();
        assert!(matches!(
            err,
            ManifestError::Registration(RegistrationError::Duplicate { .. })
        ));
    }

    #[test]
    fn test_load_from_file_reports_path() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.yaml");

        let err = SanitizerManifest::load_from_file(&missing).unwrap_err();
        assert!(err.to_string().contains("missing.yaml"));
    }

    #[test]
    fn test_load_manifests_from_dir() {
        let temp_dir = TempDir::new().unwrap();
        write_manifest(temp_dir.path(), "b_users.yaml", USERS);
        write_manifest(
            temp_dir.path(),
            "a_orders.yml",
            "sanitizers:\n  - scope: app::orders\n    builtin: sanitize_line\n",
        );
        write_manifest(temp_dir.path(), "notes.txt", "not a manifest");

        let manifest = load_manifests_from_dir(temp_dir.path()).unwrap();

        assert_eq!(manifest.sanitizers.len(), 3);
        assert_eq!(manifest.sanitizers[0].scope, "app::orders");
    }

    #[test]
    fn test_broken_manifest_fails_directory_load() {
        let temp_dir = TempDir::new().unwrap();
        write_manifest(temp_dir.path(), "a_orders.yml", USERS);
        write_manifest(
            temp_dir.path(),
            "users.yaml",
            "sanitizers:\n  - scope: app::users\n    builtin: sanitize_keep_lines\n    name: address\n  - [\n",
        );

        let err = load_manifests_from_dir(temp_dir.path()).unwrap_err();

        assert!(matches!(err, ManifestError::InvalidFile { .. }));
        assert!(err.to_string().contains("users.yaml"));
    }

    #[test]
    fn test_load_manifests_from_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let result = load_manifests_from_dir(temp_dir.path().join("nope"));
        assert!(matches!(result, Err(ManifestError::NotADirectory(_))));
    }
}
