use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;

use crate::domain::errors::ConfigError;
use crate::domain::models::CouplingConfig;

/// Base config file name, looked up in the working directory
pub const CONFIG_FILE: &str = "coupler.yaml";

/// Optional local overrides, merged on top of [`CONFIG_FILE`]
pub const LOCAL_CONFIG_FILE: &str = "coupler.local.yaml";

/// Prefix of environment overrides (`__` separates nested keys)
pub const ENV_PREFIX: &str = "COUPLER_";

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. coupler.yaml
    /// 3. coupler.local.yaml (optional overrides)
    /// 4. Environment variables (COUPLER_* prefix, highest priority)
    pub fn load() -> Result<CouplingConfig> {
        Self::load_from_dir(".")
    }

    /// Same as [`load`](Self::load) with config files looked up in `dir`
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<CouplingConfig> {
        let dir = dir.as_ref();
        let config: CouplingConfig = Self::figment_for(dir)
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<CouplingConfig> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }

        let config: CouplingConfig = Figment::new()
            .merge(Serialized::defaults(CouplingConfig::default()))
            .merge(Yaml::file(path))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &CouplingConfig) -> Result<(), ConfigError> {
        config.validate()
    }

    fn figment_for(dir: &Path) -> Figment {
        Figment::new()
            // 1. Start with programmatic defaults
            .merge(Serialized::defaults(CouplingConfig::default()))
            // 2. Merge project config
            .merge(Yaml::file(dir.join(CONFIG_FILE)))
            // 3. Merge local overrides
            .merge(Yaml::file(dir.join(LOCAL_CONFIG_FILE)))
            // 4. Merge environment variables (highest priority)
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }
}
