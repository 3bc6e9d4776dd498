//! Alignment configuration file handling.
//!
//! A `PsiConfig` holds the operator-chosen parameters of an alignment job
//! (curve, variant, lengths, parallelism, bucketing, logging). It is loaded
//! from TOML and turned into a [`ProtocolContext`](crate::ProtocolContext)
//! for every run; the context performs validation.

use crate::context::{CurveName, PsiVariant, LENGTH_32, STAT_SEC_PARAM};
use crate::error::{PsiError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default log level
const DEFAULT_LOG_LEVEL: &str = "info";

/// Parameters shared by every bucket of an alignment job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PsiConfig {
    #[serde(default = "default_curve")]
    pub curve: CurveName,

    #[serde(default = "default_variant")]
    pub psi_variant: PsiVariant,

    #[serde(default = "default_length")]
    pub point_encoding_len: usize,

    /// Bytes compared per value. Must equal `point_encoding_len` for `filter_ecdh`.
    #[serde(default = "default_length")]
    pub compare_len: usize,

    /// `-log2` of the tolerated filter false-positive rate.
    #[serde(default = "default_security_parameter")]
    pub security_parameter: u32,

    /// Worker threads per run (0 = one per core)
    #[serde(default)]
    pub thread_count: usize,

    #[serde(default = "default_one")]
    pub chunk_size: usize,

    /// Run the correction round that removes filter false positives.
    #[serde(default = "default_true")]
    pub verify_results: bool,

    /// Number of buckets keys are split into before alignment
    #[serde(default = "default_one")]
    pub bucket_num: usize,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_curve() -> CurveName {
    CurveName::Ristretto255
}

fn default_variant() -> PsiVariant {
    PsiVariant::FilterEcdh
}

fn default_length() -> usize {
    LENGTH_32
}

fn default_security_parameter() -> u32 {
    STAT_SEC_PARAM
}

fn default_one() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for PsiConfig {
    fn default() -> Self {
        Self {
            curve: default_curve(),
            psi_variant: default_variant(),
            point_encoding_len: default_length(),
            compare_len: default_length(),
            security_parameter: default_security_parameter(),
            thread_count: 0,
            chunk_size: default_one(),
            verify_results: true,
            bucket_num: default_one(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PsiConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| PsiError::Io(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            PsiError::Io(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        toml::from_str(&contents).map_err(|e| {
            PsiError::Io(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| PsiError::Io(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| PsiError::Io(format!("Failed to create config directory: {}", e)))?;
        }

        fs::write(path, contents).map_err(|e| {
            PsiError::Io(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = PsiConfig::from_toml_str("").unwrap();
        assert_eq!(config, PsiConfig::default());
        assert_eq!(config.security_parameter, 40);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_config() {
        let config = PsiConfig::from_toml_str(
            r#"
curve = "secp256k1"
psi_variant = "ecdh"
point_encoding_len = 33
compare_len = 16
thread_count = 4

[logging]
level = "debug"
"#,
        )
        .unwrap();
        assert_eq!(config.curve, CurveName::Secp256k1);
        assert_eq!(config.psi_variant, PsiVariant::Ecdh);
        assert_eq!(config.compare_len, 16);
        assert_eq!(config.thread_count, 4);
        assert!(config.verify_results);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_unknown_variant_is_rejected() {
        let result = PsiConfig::from_toml_str(r#"psi_variant = "bloom""#);
        assert!(matches!(result, Err(PsiError::Io(_))));
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir()
            .join(format!("psi-align-config-{}", std::process::id()))
            .join("psi.toml");
        let mut config = PsiConfig::default();
        config.bucket_num = 8;
        config.verify_results = false;

        config.save(&path).unwrap();
        let loaded = PsiConfig::load(&path).unwrap();
        assert_eq!(loaded, config);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_load_missing_file() {
        let result = PsiConfig::load(Path::new("/nonexistent/psi-align.toml"));
        assert!(matches!(result, Err(PsiError::Io(_))));
    }
}
