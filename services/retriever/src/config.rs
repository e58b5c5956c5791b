//! Retriever configuration (retriever.yaml).
//!
//! Supports environment variable substitution using `${VAR}` and
//! `${VAR:-default}` syntax.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use adaptors::AdaptorConfig;

// ============================================================================
// Configuration types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieverConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Definitions document; falls back to `DEFINITIONS_PATH` or the
    /// shipped default.
    #[serde(default)]
    pub definitions_path: Option<PathBuf>,
    pub adaptor: AdaptorConfig,
    #[serde(default)]
    pub source: SourceConfig,
    /// Where `retrieve` writes result files.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Local directory of `*.grib` payloads with `*.json` header sidecars.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub directory: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("data/fields"),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_metrics_port() -> u16 {
    9100
}

// ============================================================================
// Loading
// ============================================================================

/// Load retriever.yaml with environment variable substitution.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<RetrieverConfig> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read retriever config from {:?}", path.as_ref()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<RetrieverConfig> {
    let expanded = expand_env_vars(content)?;

    let config: RetrieverConfig =
        serde_yaml::from_str(&expanded).context("Failed to parse retriever config YAML")?;

    validate_config(&config)?;

    Ok(config)
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand `${VAR}` and `${VAR:-default}` in YAML content. Empty variables
/// count as unset, so their default applies.
fn expand_env_vars(content: &str) -> Result<String> {
    let expanded = shellexpand::env_with_context(content, |name: &str| {
        Ok::<_, std::env::VarError>(std::env::var(name).ok().filter(|v| !v.is_empty()))
    })
    .context("Failed to expand environment variables")?;

    // Without a default, an unset variable is left in place by the expander.
    if let Some(start) = expanded.find("${") {
        let rest = &expanded[start + 2..];
        match rest.find('}') {
            Some(end) => anyhow::bail!("Environment variable {} not set", &rest[..end]),
            None => {
                let tail = rest.lines().next().unwrap_or_default();
                anyhow::bail!("Unclosed variable substitution: ${{{}", tail)
            }
        }
    }
    Ok(expanded.into_owned())
}

// ============================================================================
// Validation
// ============================================================================

pub const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
pub const VALID_LOG_FORMATS: [&str; 2] = ["json", "pretty"];

fn validate_config(config: &RetrieverConfig) -> Result<()> {
    anyhow::ensure!(
        VALID_LOG_LEVELS.contains(&config.logging.level.as_str()),
        "Invalid log level: {}. Must be one of: {:?}",
        config.logging.level,
        VALID_LOG_LEVELS
    );
    anyhow::ensure!(
        VALID_LOG_FORMATS.contains(&config.logging.format.as_str()),
        "Invalid log format: {}. Must be one of: {:?}",
        config.logging.format,
        VALID_LOG_FORMATS
    );
    anyhow::ensure!(
        !config.metrics.enabled || config.metrics.port > 0,
        "Metrics port must be greater than 0"
    );
    config
        .adaptor
        .validate()
        .context("Invalid adaptor section")?;
    Ok(())
}
