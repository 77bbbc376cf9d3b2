//! User configuration stored in `~/.deployflow.toml`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Environment variable naming an alternative config file.
pub const CONFIG_ENV: &str = "DEPLOYFLOW_CONFIG";
/// Environment variable that overrides the stored API key.
pub const API_KEY_ENV: &str = "DEPLOYFLOW_API_KEY";

const CONFIG_FILE_NAME: &str = ".deployflow.toml";

/// Deployflow configuration (TOML).
///
/// Missing fields take their defaults, so an empty file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeployflowConfig {
    pub oracle: OracleConfig,
    pub limits: LimitsConfig,
    pub deploy: DeployConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OracleConfig {
    /// Base URL of an OpenAI-compatible API; `/chat/completions` is appended.
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub analysis_max_tokens: u32,
    pub deployment_max_tokens: u32,
    /// Per-request timeout. Unset means wait indefinitely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.deepseek.com".to_string(),
            api_key: String::new(),
            model: "deepseek-chat".to_string(),
            analysis_max_tokens: 750,
            deployment_max_tokens: 1000,
            request_timeout_secs: None,
        }
    }
}

impl OracleConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

/// Safety valves. Every ceiling is off unless set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LimitsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_analysis_turns: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_deployment_turns: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,
    /// Keep at most this many bytes of each of stdout and stderr per command.
    pub command_output_limit_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_analysis_turns: None,
            max_deployment_turns: None,
            command_timeout_secs: None,
            command_output_limit_bytes: 1_000_000,
        }
    }
}

impl LimitsConfig {
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

/// Names used by the bootstrap stages of the deployment conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeployConfig {
    /// Provisioning configuration the first stage must produce.
    pub config_file: String,
    /// Automation script the second stage must produce.
    pub script_file: String,
    /// Run in the workspace right after the provisioning config is written.
    pub init_command: String,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            config_file: "main.tf".to_string(),
            script_file: "auto-deploy.sh".to_string(),
            init_command: "terraform init".to_string(),
        }
    }
}

impl DeployflowConfig {
    pub fn validate(&self) -> Result<()> {
        if self.oracle.endpoint.trim().is_empty() {
            return Err(anyhow!("oracle.endpoint must be non-empty"));
        }
        if self.oracle.model.trim().is_empty() {
            return Err(anyhow!("oracle.model must be non-empty"));
        }
        if self.oracle.analysis_max_tokens == 0 || self.oracle.deployment_max_tokens == 0 {
            return Err(anyhow!("oracle max_tokens values must be > 0"));
        }
        if self.oracle.request_timeout_secs == Some(0) {
            return Err(anyhow!("oracle.request_timeout_secs must be > 0"));
        }
        if self.limits.max_analysis_turns == Some(0) || self.limits.max_deployment_turns == Some(0) {
            return Err(anyhow!("turn limits must be > 0"));
        }
        if self.limits.command_timeout_secs == Some(0) {
            return Err(anyhow!("limits.command_timeout_secs must be > 0"));
        }
        if self.limits.command_output_limit_bytes == 0 {
            return Err(anyhow!("limits.command_output_limit_bytes must be > 0"));
        }
        if self.deploy.config_file.trim().is_empty() || self.deploy.script_file.trim().is_empty() {
            return Err(anyhow!("deploy file names must be non-empty"));
        }
        if self.deploy.init_command.trim().is_empty() {
            return Err(anyhow!("deploy.init_command must be non-empty"));
        }
        Ok(())
    }

    /// Stored key, overridden by `DEPLOYFLOW_API_KEY` when set.
    pub fn api_key(&self) -> Option<String> {
        env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| Some(self.oracle.api_key.clone()).filter(|key| !key.trim().is_empty()))
    }
}

/// Config location: `$DEPLOYFLOW_CONFIG`, else `~/.deployflow.toml`.
pub fn default_config_path() -> Result<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    let home = dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(home.join(CONFIG_FILE_NAME))
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `DeployflowConfig::default()`.
pub fn load_config(path: &Path) -> Result<DeployflowConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        let cfg = DeployflowConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: DeployflowConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &DeployflowConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
