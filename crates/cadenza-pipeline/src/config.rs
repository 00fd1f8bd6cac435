//! Pipeline configuration.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Where the pipeline reads raw payloads and writes the star schema,
/// expressed as paths within one storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Prefix under which catalog record objects live. Must end with `/`.
    pub catalog_prefix: String,
    /// Prefix under which event log batch objects live. Must end with `/`.
    pub events_prefix: String,
    /// Root path for the written star-schema tables.
    pub output_root: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            catalog_prefix: "raw/catalog/".to_string(),
            events_prefix: "raw/events/".to_string(),
            output_root: "warehouse".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Builds a config from `CADENZA_*` environment variables, falling back
    /// to defaults for unset values.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if a value fails validation.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            catalog_prefix: env_string("CADENZA_CATALOG_PREFIX", &defaults.catalog_prefix),
            events_prefix: env_string("CADENZA_EVENTS_PREFIX", &defaults.events_prefix),
            output_root: env_string("CADENZA_OUTPUT_ROOT", &defaults.output_root),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates path conventions: prefixes end with `/`, the output root
    /// does not.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        for (name, prefix) in [
            ("catalog_prefix", &self.catalog_prefix),
            ("events_prefix", &self.events_prefix),
        ] {
            if prefix.is_empty() || !prefix.ends_with('/') {
                return Err(PipelineError::Config(format!(
                    "{name} must be non-empty and end with '/': `{prefix}`"
                )));
            }
        }
        if self.output_root.is_empty() || self.output_root.ends_with('/') {
            return Err(PipelineError::Config(format!(
                "output_root must be non-empty and not end with '/': `{}`",
                self.output_root
            )));
        }
        Ok(())
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn prefix_without_trailing_slash_is_rejected() {
        let config = PipelineConfig {
            catalog_prefix: "raw/catalog".to_string(),
            ..PipelineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn output_root_with_trailing_slash_is_rejected() {
        let config = PipelineConfig {
            output_root: "warehouse/".to_string(),
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_env_applies_overrides_and_validates() {
        std::env::set_var("CADENZA_OUTPUT_ROOT", "lake");
        let config = PipelineConfig::from_env().expect("config");
        assert_eq!(config.output_root, "lake");
        assert_eq!(config.catalog_prefix, "raw/catalog/");

        std::env::set_var("CADENZA_OUTPUT_ROOT", "lake/");
        assert!(PipelineConfig::from_env().is_err());
        std::env::remove_var("CADENZA_OUTPUT_ROOT");
    }
}
