//! Generator configuration
//!
//! Loaded from TOML; every key is optional.
//!
//! ```toml
//! staging_root = "protected/modules"
//! archive_dir = "."
//! min_platform_version = "1.16.0"
//! compression = "deflated"
//! warnings = "allow"
//! lock_timeout_ms = 0
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::archive::Compression;
use crate::identifier::ModuleIdentifier;
use crate::validation::WarningPolicy;
use crate::MIN_HUMHUB_VERSION;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("min_platform_version {0:?} is not a semantic version")]
    InvalidVersion(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Parent directory of every module working tree.
    pub staging_root: PathBuf,
    /// Directory the `<token>.zip` archives are written to.
    pub archive_dir: PathBuf,
    /// Written to `humhub.minVersion` in the manifest.
    pub min_platform_version: String,
    pub compression: Compression,
    pub warnings: WarningPolicy,
    /// How long `generate()` waits for a live run on the same paths.
    /// Zero fails at once with `Busy`.
    pub lock_timeout_ms: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            staging_root: PathBuf::from("protected/modules"),
            archive_dir: PathBuf::from("."),
            min_platform_version: MIN_HUMHUB_VERSION.to_string(),
            compression: Compression::default(),
            warnings: WarningPolicy::default(),
            lock_timeout_ms: 0,
        }
    }
}

impl GeneratorConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        semver::Version::parse(&self.min_platform_version)
            .map_err(|_| ConfigError::InvalidVersion(self.min_platform_version.clone()))?;
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// `staging_root/<token>`
    pub fn base_path(&self, id: &ModuleIdentifier) -> PathBuf {
        self.staging_root.join(id.as_str())
    }

    /// `archive_dir/<token>.zip`
    pub fn archive_path(&self, id: &ModuleIdentifier) -> PathBuf {
        self.archive_dir.join(id.archive_file_name())
    }
}
