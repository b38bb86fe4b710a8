//! Bundle file discovery and loading.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ConfigError, Result};

use super::spec::BundleFile;

/// Default bundle file names, searched in order.
pub const DEFAULT_BUNDLE_FILES: &[&str] = &["Convergefile.yaml", "Convergefile.yml", "converge.yaml"];

/// Loader for bundle files.
#[derive(Debug, Default)]
pub struct BundleLoader {
    base_path: Option<PathBuf>,
}

impl BundleLoader {
    /// Creates a new loader.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for `.env` resolution.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads a bundle file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or unparseable.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<BundleFile> {
        let path = path.as_ref();
        info!("Loading bundle from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ParseError {
            message: format!("Failed to read file: {e}"),
            location: Some(path.display().to_string()),
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses a bundle from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<BundleFile> {
        debug!("Parsing bundle YAML");

        let bundle: BundleFile = serde_yaml::from_str(content).map_err(|e| {
            ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location: source.map(|p| p.display().to_string()),
            }
        })?;

        debug!(
            "Parsed bundle for cluster '{}': {} resources",
            bundle.cluster,
            bundle.resource_count()
        );
        Ok(bundle)
    }

    /// Loads a bundle with environment overrides applied.
    ///
    /// `CONVERGE_CLUSTER` and `CONVERGE_STATE_BUCKET` override their
    /// file counterparts.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`BundleLoader::load_file`].
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<BundleFile> {
        let mut bundle = self.load_file(path)?;

        if let Ok(cluster) = std::env::var("CONVERGE_CLUSTER") {
            debug!("Overriding cluster from environment");
            bundle.cluster = cluster;
        }
        if let Ok(bucket) = std::env::var("CONVERGE_STATE_BUCKET") {
            debug!("Overriding state.bucket from environment");
            bundle.state.bucket = Some(bucket);
        }

        Ok(bundle)
    }

    /// Loads the `.env` file next to the bundle, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| ConfigError::ParseError {
                message: format!("Failed to load .env file: {e}"),
                location: Some(env_path.display().to_string()),
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Finds the bundle file in `start_dir` or any of its parents.
///
/// # Errors
///
/// Returns [`ConfigError::FileNotFound`] when no candidate exists.
pub fn find_bundle_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_BUNDLE_FILES {
            let candidate = current.join(filename);
            if candidate.exists() {
                info!("Found bundle file: {}", candidate.display());
                return Ok(candidate);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(ConfigError::FileNotFound {
        path: start.join(DEFAULT_BUNDLE_FILES[0]),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal() {
        let loader = BundleLoader::new();
        let bundle = loader
            .parse_yaml("cluster: test\n", None)
            .expect("parse");
        assert_eq!(bundle.cluster, "test");
    }

    #[test]
    fn test_missing_file() {
        let loader = BundleLoader::new();
        let err = loader
            .load_file("/definitely/not/here/Convergefile.yaml")
            .expect_err("missing");
        assert!(matches!(
            err,
            crate::error::ConvergeError::Config(ConfigError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_invalid_yaml_reports_location() {
        let loader = BundleLoader::new();
        let err = loader
            .parse_yaml("cluster: [unclosed", Some(Path::new("Convergefile.yaml")))
            .expect_err("invalid");
        let crate::error::ConvergeError::Config(ConfigError::ParseError { location, .. }) = err
        else {
            panic!("expected a parse error");
        };
        assert_eq!(location.as_deref(), Some("Convergefile.yaml"));
    }

    #[test]
    fn test_find_walks_parents() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("Convergefile.yaml"), "cluster: c\n").expect("write");
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).expect("mkdir");

        let found = find_bundle_file(&nested).expect("found");
        assert_eq!(found, dir.path().join("Convergefile.yaml"));
    }
}
