//! Harness configuration using Figment
//!
//! This module provides strongly-typed configuration loading for the harness.
//! Configuration is layered from:
//! 1. Built-in defaults
//! 2. `config/integtest.toml` (or an explicit file)
//! 3. Environment variables prefixed with `DAQ_INTEGTEST_` (sections split on `__`)
//!
//! Run-variant switches (`MDAPP_INTEGTEST_SWTPG`, `MDAPP_INTEGTEST_DQM`) are not part
//! of the file configuration; they are read once into [`HarnessOptions`] at the entry
//! point and passed explicitly to scenarios.
//!
//! # Example
//! ```no_run
//! use daq_integtest::config::HarnessConfig;
//!
//! let config = HarnessConfig::load()?;
//! println!("Run control: {}", config.tools.run_control);
//! # Ok::<(), daq_integtest::error::IntegtestError>(())
//! ```

use crate::error::{AppResult, IntegtestError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default location of the harness configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/integtest.toml";

/// Prefix for environment overrides, e.g. `DAQ_INTEGTEST_TOOLS__RUN_CONTROL=drunc`.
pub const ENV_PREFIX: &str = "DAQ_INTEGTEST_";

/// Enables the software trigger-primitive generation path.
pub const SWTPG_ENV: &str = "MDAPP_INTEGTEST_SWTPG";

/// Enables the data-quality-monitoring path.
pub const DQM_ENV: &str = "MDAPP_INTEGTEST_DQM";

/// Top-level harness configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// External collaborators
    #[serde(default)]
    pub tools: ToolsConfig,
    /// Run directory handling
    #[serde(default)]
    pub run: RunSettings,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

/// How the run-control tool consumes a command script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One invocation receives the whole token list; the tool honours `wait`.
    #[default]
    Batch,
    /// One invocation per command; the harness sleeps on `wait`.
    Stepwise,
}

/// External programs driven by the harness
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Run-control program (name on `PATH` or a path)
    #[serde(default = "default_run_control")]
    pub run_control: String,
    /// Arguments placed before the script tokens. Supports `{config}`, `{session}`,
    /// `{op_env}` and `{run_dir}`.
    #[serde(default = "default_run_control_args")]
    pub run_control_args: Vec<String>,
    /// Batch or stepwise script execution
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    /// Interpreter used to run `-m <confgen module>`
    #[serde(default = "default_confgen")]
    pub confgen: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            run_control: default_run_control(),
            run_control_args: default_run_control_args(),
            execution_mode: ExecutionMode::default(),
            confgen: default_confgen(),
        }
    }
}

/// Run directory handling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettings {
    /// Parent directory for per-run directories
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// Base for relative configuration databases of scenarios without a generator
    #[serde(default = "default_config_root")]
    pub config_root: PathBuf,
    /// Keep run directories after the run
    #[serde(default = "default_keep_run_dirs")]
    pub keep_run_dirs: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            config_root: default_config_root(),
            keep_run_dirs: default_keep_run_dirs(),
        }
    }
}

// Default value functions
fn default_name() -> String {
    "DAQ integration tests".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_run_control() -> String {
    "nanorc".to_string()
}

fn default_run_control_args() -> Vec<String> {
    vec!["{config}".to_string(), "{session}".to_string()]
}

fn default_confgen() -> String {
    "python".to_string()
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("integtest-runs")
}

fn default_config_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_keep_run_dirs() -> bool {
    true
}

const TEMPLATE_KEYS: [&str; 4] = ["config", "session", "op_env", "run_dir"];

impl HarnessConfig {
    /// Load configuration from `config/integtest.toml` and environment variables
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Figment::from(Serialized::defaults(HarnessConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(IntegtestError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.tools.run_control.trim().is_empty() {
            return Err(IntegtestError::Configuration(
                "tools.run_control cannot be empty".to_string(),
            ));
        }
        if self.tools.confgen.trim().is_empty() {
            return Err(IntegtestError::Configuration(
                "tools.confgen cannot be empty".to_string(),
            ));
        }

        for arg in &self.tools.run_control_args {
            for key in template_keys(arg) {
                if !TEMPLATE_KEYS.contains(&key.as_str()) {
                    return Err(IntegtestError::Configuration(format!(
                        "Unknown placeholder '{{{}}}' in tools.run_control_args. Must be one of: {}",
                        key,
                        TEMPLATE_KEYS.join(", ")
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Names of `{placeholder}` keys in a template, skipping `{{` escapes.
fn template_keys(template: &str) -> Vec<String> {
    let mut keys = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        if after.starts_with('{') {
            rest = &after[1..];
            continue;
        }
        match after.find('}') {
            Some(end) => {
                keys.push(after[..end].to_string());
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    keys
}

/// Run-variant switches passed explicitly to scenarios.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessOptions {
    /// Software trigger-primitive generation
    pub enable_software_tpg: bool,
    /// Data-quality monitoring
    pub enable_dqm: bool,
}

impl HarnessOptions {
    /// Reads `MDAPP_INTEGTEST_SWTPG` and `MDAPP_INTEGTEST_DQM`; presence enables.
    pub fn from_env() -> Self {
        Self {
            enable_software_tpg: std::env::var_os(SWTPG_ENV).is_some(),
            enable_dqm: std::env::var_os(DQM_ENV).is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = HarnessConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tools.run_control, "nanorc");
        assert_eq!(config.tools.execution_mode, ExecutionMode::Batch);
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = HarnessConfig::default();
        config.application.log_level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_placeholder_is_rejected() {
        let mut config = HarnessConfig::default();
        config.tools.run_control_args = vec!["{partition}".to_string()];
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("{partition}"), "{err}");
    }

    #[test]
    fn template_keys_skip_escapes() {
        assert_eq!(template_keys("{config}/{{literal}}"), vec!["config"]);
        assert_eq!(template_keys("--session={session}"), vec!["session"]);
        assert!(template_keys("plain").is_empty());
    }

    #[test]
    fn empty_run_control_is_rejected() {
        let mut config = HarnessConfig::default();
        config.tools.run_control = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
