// src/config/loader.rs
//! Configuration loader: TOML file plus environment overrides

use crate::config::SystemConfig;
use crate::error::{EmgError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default prefix for environment overrides, e.g. `EMG_FILTER__MAINS_FREQ_HZ=60`
pub const DEFAULT_ENV_PREFIX: &str = "EMG";

/// Builds a [`SystemConfig`] from layered sources
///
/// Later sources win: built-in defaults, then the TOML file (if any), then
/// `EMG_`-prefixed environment variables with `__` separating nested keys.
pub struct ConfigLoader {
    path: Option<PathBuf>,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    /// Loader with defaults and environment overrides only
    pub fn new() -> Self {
        Self {
            path: None,
            env_prefix: Some(DEFAULT_ENV_PREFIX.to_string()),
        }
    }

    /// Loader reading the given TOML file
    pub fn with_file<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            ..Self::new()
        }
    }

    /// Change or disable (`None`) the environment prefix
    pub fn env_prefix(mut self, prefix: Option<&str>) -> Self {
        self.env_prefix = prefix.map(str::to_string);
        self
    }

    /// Load and validate the configuration
    pub fn load(&self) -> Result<SystemConfig> {
        let mut builder = config::Config::builder();

        if let Some(path) = &self.path {
            if !path.exists() {
                return Err(EmgError::config(
                    "loader",
                    format!("configuration file not found: {}", path.display()),
                ));
            }
            info!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(
                config::File::from(path.as_path()).format(config::FileFormat::Toml),
            );
        }

        if let Some(prefix) = &self.env_prefix {
            debug!(prefix = %prefix, "applying environment overrides");
            builder = builder.add_source(
                config::Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config: SystemConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
