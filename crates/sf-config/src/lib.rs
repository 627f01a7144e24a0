// SPDX-License-Identifier: MIT OR Apache-2.0
//! sf-config
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Layered runtime configuration for every `sf-*` binary and library
//! caller: built-in default, overlaid by a TOML config file, overlaid by
//! `SKILL_FORGE_*` environment variables, overlaid by explicit CLI
//! overrides, with CLI flags applied last as the outermost layer.

use std::path::{Path, PathBuf};
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Errors raised while loading or parsing configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested config file does not exist.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },
    /// The file could not be read from disk.
    #[error("failed to read config file '{path}': {reason}")]
    ReadError {
        /// Path that failed to read.
        path: String,
        /// Underlying I/O error description.
        reason: String,
    },
    /// The file's contents are not valid TOML for this shape.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },
}

fn default_home_dir() -> PathBuf {
    std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
}

/// Resolved runtime configuration. Every field has a built-in default, so
/// `ForgeConfig::default()` alone is always a usable configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ForgeConfig {
    /// Path to the SQLite ledger database.
    pub ledger_db_path: PathBuf,
    /// Path to the trusted-skill registry YAML file.
    pub registry_path: PathBuf,
    /// Directory artifacts (build logs, reports, research notes) are written under.
    pub output_dir: PathBuf,
    /// Path to the append-only execution log.
    pub log_path: PathBuf,
    /// Path to the policy YAML file consulted by `sf-policy`.
    pub policy_file: PathBuf,
    /// Address of the retry-advisory language-model gateway, if configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lm_gateway_addr: Option<String>,
    /// Name of the builder binary `sf-sandbox` looks up on `PATH`.
    pub builder_binary_name: String,
    /// Sandbox build timeout, in seconds.
    pub build_timeout_secs: u64,
    /// Verification tool timeout, in seconds.
    pub verify_timeout_secs: u64,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        let home = default_home_dir().join(".skill-forge");
        Self {
            ledger_db_path: home.join("ledger.sqlite3"),
            registry_path: home.join("registry.yaml"),
            output_dir: home.join("artifacts"),
            log_path: home.join("executions.jsonl"),
            policy_file: home.join("policy.yaml"),
            lm_gateway_addr: None,
            builder_binary_name: "skill-builder".to_string(),
            build_timeout_secs: 120,
            verify_timeout_secs: 120,
        }
    }
}

impl ForgeConfig {
    /// [`Self::build_timeout_secs`] as a [`Duration`].
    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }

    /// [`Self::verify_timeout_secs`] as a [`Duration`].
    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs)
    }
}

/// Every field optional — the shape both the TOML file and CLI overrides
/// are parsed/collected into before being overlaid onto a [`ForgeConfig`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForgeConfigOverlay {
    /// See [`ForgeConfig::ledger_db_path`].
    pub ledger_db_path: Option<PathBuf>,
    /// See [`ForgeConfig::registry_path`].
    pub registry_path: Option<PathBuf>,
    /// See [`ForgeConfig::output_dir`].
    pub output_dir: Option<PathBuf>,
    /// See [`ForgeConfig::log_path`].
    pub log_path: Option<PathBuf>,
    /// See [`ForgeConfig::policy_file`].
    pub policy_file: Option<PathBuf>,
    /// See [`ForgeConfig::lm_gateway_addr`].
    pub lm_gateway_addr: Option<String>,
    /// See [`ForgeConfig::builder_binary_name`].
    pub builder_binary_name: Option<String>,
    /// See [`ForgeConfig::build_timeout_secs`].
    pub build_timeout_secs: Option<u64>,
    /// See [`ForgeConfig::verify_timeout_secs`].
    pub verify_timeout_secs: Option<u64>,
}

impl ForgeConfigOverlay {
    fn apply(self, base: &mut ForgeConfig) {
        if let Some(v) = self.ledger_db_path {
            base.ledger_db_path = v;
        }
        if let Some(v) = self.registry_path {
            base.registry_path = v;
        }
        if let Some(v) = self.output_dir {
            base.output_dir = v;
        }
        if let Some(v) = self.log_path {
            base.log_path = v;
        }
        if let Some(v) = self.policy_file {
            base.policy_file = v;
        }
        if let Some(v) = self.lm_gateway_addr {
            base.lm_gateway_addr = Some(v);
        }
        if let Some(v) = self.builder_binary_name {
            base.builder_binary_name = v;
        }
        if let Some(v) = self.build_timeout_secs {
            base.build_timeout_secs = v;
        }
        if let Some(v) = self.verify_timeout_secs {
            base.verify_timeout_secs = v;
        }
    }
}

/// Parse a TOML string into a [`ForgeConfigOverlay`].
pub fn parse_toml(content: &str) -> Result<ForgeConfigOverlay, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

/// Read the environment-variable overlay. Recognised variables:
/// `SKILL_FORGE_LEDGER_DB_PATH`, `SKILL_FORGE_REGISTRY_PATH`,
/// `SKILL_FORGE_OUTPUT_DIR`, `SKILL_FORGE_LOG_PATH`,
/// `SKILL_FORGE_POLICY_FILE`, `SKILL_FORGE_LM_GATEWAY_ADDR`,
/// `SKILL_FORGE_BUILDER_BINARY_NAME`, `SKILL_FORGE_BUILD_TIMEOUT_SECS`,
/// `SKILL_FORGE_VERIFY_TIMEOUT_SECS`.
pub fn env_overlay() -> ForgeConfigOverlay {
    ForgeConfigOverlay {
        ledger_db_path: std::env::var("SKILL_FORGE_LEDGER_DB_PATH").ok().map(PathBuf::from),
        registry_path: std::env::var("SKILL_FORGE_REGISTRY_PATH").ok().map(PathBuf::from),
        output_dir: std::env::var("SKILL_FORGE_OUTPUT_DIR").ok().map(PathBuf::from),
        log_path: std::env::var("SKILL_FORGE_LOG_PATH").ok().map(PathBuf::from),
        policy_file: std::env::var("SKILL_FORGE_POLICY_FILE").ok().map(PathBuf::from),
        lm_gateway_addr: std::env::var("SKILL_FORGE_LM_GATEWAY_ADDR").ok(),
        builder_binary_name: std::env::var("SKILL_FORGE_BUILDER_BINARY_NAME").ok(),
        build_timeout_secs: std::env::var("SKILL_FORGE_BUILD_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok()),
        verify_timeout_secs: std::env::var("SKILL_FORGE_VERIFY_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok()),
    }
}

/// Load configuration with full precedence: default, overlaid by
/// `file_path`'s TOML contents (if given), overlaid by `SKILL_FORGE_*`
/// environment variables, overlaid last by `cli_overrides`.
pub fn load_config(
    file_path: Option<&Path>,
    cli_overrides: ForgeConfigOverlay,
) -> Result<ForgeConfig, ConfigError> {
    let mut config = ForgeConfig::default();

    if let Some(path) = file_path {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        parse_toml(&content)?.apply(&mut config);
    }

    env_overlay().apply(&mut config);
    cli_overrides.apply(&mut config);

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_internally_consistent() {
        let config = ForgeConfig::default();
        assert_eq!(config.build_timeout(), Duration::from_secs(120));
        assert!(config.ledger_db_path.ends_with("ledger.sqlite3"));
    }

    #[test]
    fn file_overlay_overrides_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "builder_binary_name = \"custom-builder\"\nbuild_timeout_secs = 30\n").unwrap();

        let config = load_config(Some(&path), ForgeConfigOverlay::default()).unwrap();
        assert_eq!(config.builder_binary_name, "custom-builder");
        assert_eq!(config.build_timeout_secs, 30);
        assert_eq!(config.verify_timeout_secs, 120);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.toml");
        let err = load_config(Some(&path), ForgeConfigOverlay::default()).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn cli_override_wins_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "builder_binary_name = \"from-file\"\n").unwrap();

        let overrides = ForgeConfigOverlay {
            builder_binary_name: Some("from-cli".to_string()),
            ..Default::default()
        };
        let config = load_config(Some(&path), overrides).unwrap();
        assert_eq!(config.builder_binary_name, "from-cli");
    }

    #[test]
    fn no_file_path_uses_default_plus_env() {
        let config = load_config(None, ForgeConfigOverlay::default()).unwrap();
        assert_eq!(config, ForgeConfig::default());
    }
}
