//! Configuration for the mock server.
//!
//! Locates the rule tree and seeds the runtime knobs (delay, error rate).

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Main configuration for the mock server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MockServerConfig {
    /// Root directory of the rule tree
    #[serde(default = "default_mocks_dir")]
    pub mocks_dir: PathBuf,

    /// Address the HTTP binding listens on
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Global settings
    #[serde(default)]
    pub settings: GlobalSettings,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            mocks_dir: default_mocks_dir(),
            listen: default_listen(),
            settings: GlobalSettings::default(),
        }
    }
}

fn default_mocks_dir() -> PathBuf {
    PathBuf::from("./mocks")
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

impl MockServerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.settings.validate()
    }
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalSettings {
    /// Initial artificial delay applied to every response (ms)
    #[serde(default)]
    pub delay_ms: u64,

    /// Initial probability of replacing a response with a random error
    #[serde(default)]
    pub error_rate: f64,

    /// Name of the per-path error scenario directory
    #[serde(default = "default_scenarios_dir")]
    pub scenarios_dir: String,

    /// Name of the top-level status-code template directory
    #[serde(default = "default_templates_dir")]
    pub templates_dir: String,

    /// Log resolved rules
    #[serde(default = "default_true")]
    pub log_matches: bool,

    /// Log requests that fell through to 404
    #[serde(default = "default_true")]
    pub log_unmatched: bool,

    /// Run the operator console on stdin
    #[serde(default = "default_true")]
    pub console: bool,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            delay_ms: 0,
            error_rate: 0.0,
            scenarios_dir: default_scenarios_dir(),
            templates_dir: default_templates_dir(),
            log_matches: true,
            log_unmatched: true,
            console: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_scenarios_dir() -> String {
    "errors".to_string()
}

fn default_templates_dir() -> String {
    "_errors".to_string()
}

impl GlobalSettings {
    /// Validate the settings.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.error_rate) {
            anyhow::bail!("error_rate must be within 0.0..=1.0, got {}", self.error_rate);
        }
        for (field, name) in [
            ("scenarios_dir", &self.scenarios_dir),
            ("templates_dir", &self.templates_dir),
        ] {
            if name.is_empty() {
                anyhow::bail!("{} cannot be empty", field);
            }
            if name.contains(['/', '\\']) || name == "." || name == ".." {
                anyhow::bail!("{} must be a plain directory name, got {:?}", field, name);
            }
        }
        if self.scenarios_dir == self.templates_dir {
            anyhow::bail!("scenarios_dir and templates_dir must differ");
        }
        Ok(())
    }
}
