// src/config.rs

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

/// Root configuration loaded from `codementor.yaml`.
///
/// Every section has defaults, so an empty (or missing) file is a valid
/// configuration. Secrets such as the model API key are normally supplied
/// through the environment (see `apply_env`), not the YAML file.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Toolchain binaries (python / node / javac / java)
    #[serde(default)]
    pub runtime: Runtime,

    /// Limits applied to every run
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// HTTP API settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Language-model passthrough settings
    #[serde(default)]
    pub mentor: MentorConfig,

    /// External Python analysis tools
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

/// Runtime binary configuration.
///
/// Example:
///
/// runtime:
///   python: python3
///   node: node
///   javac: javac
///   java: java
#[derive(Debug, Clone, Deserialize)]
pub struct Runtime {
    #[serde(default = "default_python")]
    pub python: String,

    #[serde(default = "default_node")]
    pub node: String,

    #[serde(default = "default_javac")]
    pub javac: String,

    #[serde(default = "default_java")]
    pub java: String,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            python: default_python(),
            node: default_node(),
            javac: default_javac(),
            java: default_java(),
        }
    }
}

fn default_python() -> String {
    if cfg!(windows) {
        "python".to_string()
    } else {
        "python3".to_string()
    }
}

fn default_node() -> String {
    "node".to_string()
}

fn default_javac() -> String {
    "javac".to_string()
}

fn default_java() -> String {
    "java".to_string()
}

/// Execution limits.
///
/// Example:
///
/// execution:
///   timeout_secs: 10
///   max_code_length: 10000
///   max_concurrent_runs: 4
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Wall-clock budget for a whole run (compile + execute)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum accepted source length, in characters
    #[serde(default = "default_max_code_length")]
    pub max_code_length: usize,

    /// Number of runs the HTTP API executes at the same time
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,

    /// Parent for per-run directories; the system temp dir when unset
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_code_length: default_max_code_length(),
            max_concurrent_runs: default_max_concurrent_runs(),
            temp_dir: None,
        }
    }
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Upper bound accepted for `timeout_secs`.
pub const MAX_TIMEOUT_SECS: u64 = 3600;

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_code_length() -> usize {
    10_000
}

fn default_max_concurrent_runs() -> usize {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,

    /// Bearer token required on protected routes.
    ///
    /// Usually taken from `CODEMENTOR_API_KEY`; when absent the API is open.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            api_key: None,
        }
    }
}

fn default_addr() -> String {
    "127.0.0.1:8080".to_string()
}

/// OpenAI-compatible chat completion settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MentorConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub org_id: Option<String>,
}

impl Default for MentorConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            api_key: None,
            org_id: None,
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

/// Linter, formatter and complexity tools invoked by `analyze`.
///
/// analysis:
///   flake8: flake8
///   black: black
///   radon: radon
///   timeout_secs: 30
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_flake8")]
    pub flake8: String,

    #[serde(default = "default_black")]
    pub black: String,

    #[serde(default = "default_radon")]
    pub radon: String,

    /// Budget for each tool invocation
    #[serde(default = "default_analysis_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            flake8: default_flake8(),
            black: default_black(),
            radon: default_radon(),
            timeout_secs: default_analysis_timeout_secs(),
        }
    }
}

impl AnalysisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_flake8() -> String {
    "flake8".to_string()
}

fn default_black() -> String {
    "black".to_string()
}

fn default_radon() -> String {
    "radon".to_string()
}

fn default_analysis_timeout_secs() -> u64 {
    30
}

impl Config {
    /// Load and parse a YAML config file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::from_yaml(&raw)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        // an empty document deserializes to `null`, which serde_yaml rejects for structs
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).context("Failed to parse YAML config")
    }

    /// Overlay environment variables onto the file configuration.
    ///
    /// Environment always wins over `codementor.yaml`.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("OPENAI_API_KEY") {
            self.mentor.api_key = Some(v);
        }
        if let Some(v) = non_empty("OPENAI_ORG_ID") {
            self.mentor.org_id = Some(v);
        }
        if let Some(v) = non_empty("OPENAI_MODEL") {
            self.mentor.model = v;
        }
        if let Some(v) = non_empty("OPENAI_BASE_URL") {
            self.mentor.base_url = v;
        }
        if let Some(v) = non_empty("CODEMENTOR_API_KEY") {
            self.server.api_key = Some(v);
        }
        if let Some(v) = non_empty("CODEMENTOR_ADDR") {
            self.server.addr = v;
        }
        if let Some(secs) = non_empty("CODEMENTOR_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.execution.timeout_secs = secs;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_yaml_gives_defaults() {
        let cfg = Config::from_yaml("").unwrap();
        assert_eq!(cfg.execution.timeout_secs, 10);
        assert_eq!(cfg.execution.max_code_length, 10_000);
        assert_eq!(cfg.runtime.node, "node");
        assert_eq!(cfg.mentor.model, "gpt-4o-mini");
        assert!(cfg.server.api_key.is_none());
        assert_eq!(cfg.analysis.radon, "radon");
        assert_eq!(cfg.analysis.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let cfg = Config::from_yaml(
            r#"
runtime:
  python: /opt/python/bin/python3
execution:
  timeout_secs: 3
"#,
        )
        .unwrap();

        assert_eq!(cfg.runtime.python, "/opt/python/bin/python3");
        assert_eq!(cfg.runtime.java, "java");
        assert_eq!(cfg.execution.timeout(), Duration::from_secs(3));
        assert_eq!(cfg.execution.max_concurrent_runs, 4);
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        assert!(Config::from_yaml("execution: [1, 2").is_err());
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_MODEL", "gpt-4o"),
            ("CODEMENTOR_API_KEY", "secret"),
            ("CODEMENTOR_TIMEOUT_SECS", "5"),
            ("OPENAI_BASE_URL", "  "),
        ]
        .into_iter()
        .collect();

        let mut cfg = Config::default();
        cfg.apply_env_from(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.mentor.api_key.as_deref(), Some("sk-test"));
        assert_eq!(cfg.mentor.model, "gpt-4o");
        assert_eq!(cfg.server.api_key.as_deref(), Some("secret"));
        assert_eq!(cfg.execution.timeout_secs, 5);
        // blank values are ignored
        assert_eq!(cfg.mentor.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_or_default(&dir.path().join("codementor.yaml")).unwrap();
        assert_eq!(cfg.server.addr, "127.0.0.1:8080");
    }
}
