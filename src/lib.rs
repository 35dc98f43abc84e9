pub mod aggregate;
pub mod api;
pub mod db;
pub mod error;
pub mod event;
pub mod git;
pub mod impact;
pub mod job;
pub mod logging;
pub mod pipeline;
pub mod providers;
pub mod sync;
pub mod template;
pub mod trigger;
pub mod user;
pub mod utils;

#[cfg(test)]
pub(crate) mod fakes;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::db::{SqlJobStore, SqlTemplateStore};
use crate::error::SyncError;
use crate::event::Provider;
use crate::pipeline::HookContext;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SyncConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub provider: Vec<ProviderConfig>,
    #[serde(default)]
    pub workflow: Vec<WorkflowConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_database")]
    pub database: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            database: default_database(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct WebhookConfig {
    /// Shared secret expected from every provider; empty disables the check
    #[serde(default)]
    pub secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncSettings {
    #[serde(default = "default_deploy_type")]
    pub deploy_type: String,
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Scratch directory for checkouts; the system temp dir when unset
    pub work_dir: Option<PathBuf>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            deploy_type: default_deploy_type(),
            provider_timeout_secs: default_provider_timeout_secs(),
            max_concurrency: default_max_concurrency(),
            work_dir: None,
        }
    }
}

impl SyncSettings {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Also write logs to rolling files in this directory
    pub directory: Option<PathBuf>,
    #[serde(default = "default_rotation")]
    pub rotation: String,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            rotation: default_rotation(),
            file_prefix: default_file_prefix(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    pub kind: Provider,
    /// Token used for HTTPS clones of private repositories
    pub access_token: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkflowConfig {
    pub name: String,
    /// Repository name as reported by the provider
    pub repo: String,
    pub branches: Vec<String>,
    pub run_script: String,
    pub branch_scripts: Option<HashMap<String, String>>,
    pub working_dir: Option<PathBuf>,
    /// Event kinds that start this workflow: push, tag, merge_request
    #[serde(default = "default_events")]
    pub events: Vec<String>,
}

impl WorkflowConfig {
    /// Returns the script to run for a specific branch.
    /// If `branch_scripts` contains the branch, returns that script,
    /// otherwise returns the general `run_script`.
    pub fn get_run_script_for_branch(&self, branch: &str) -> &str {
        if let Some(scripts) = &self.branch_scripts {
            if let Some(custom_script) = scripts.get(branch) {
                return custom_script;
            }
        }
        &self.run_script
    }

    pub fn handles(&self, event_kind: &str) -> bool {
        self.events.iter().any(|e| e == event_kind)
    }
}

impl SyncConfig {
    pub fn access_token(&self, provider: Provider) -> Option<&str> {
        self.provider
            .iter()
            .find(|p| p.kind == provider)
            .and_then(|p| p.access_token.as_deref())
    }

    /// `BIND_ADDRESS` and `WEBHOOK_SECRET` take precedence over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("BIND_ADDRESS") {
            self.server.bind_address = addr;
        }
        if let Ok(secret) = std::env::var("WEBHOOK_SECRET") {
            self.webhook.secret = secret;
        }
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.sync.provider_timeout_secs == 0 {
            return Err(SyncError::ConfigError(
                "sync.provider_timeout_secs must be > 0".into(),
            ));
        }
        if self.sync.max_concurrency == 0 {
            return Err(SyncError::ConfigError(
                "sync.max_concurrency must be > 0".into(),
            ));
        }
        logging::parse_rotation(&self.logging.rotation)?;
        for (i, p) in self.provider.iter().enumerate() {
            if self.provider[..i].iter().any(|q| q.kind == p.kind) {
                return Err(SyncError::ConfigError(format!(
                    "provider '{}' is configured more than once",
                    p.kind
                )));
            }
        }
        for wf in &self.workflow {
            if wf.name.trim().is_empty() {
                return Err(SyncError::ConfigError("workflow.name must be non-empty".into()));
            }
            if wf.run_script.trim().is_empty() {
                return Err(SyncError::ConfigError(format!(
                    "workflow '{}' has an empty run_script",
                    wf.name
                )));
            }
        }
        Ok(())
    }
}

fn default_bind_address() -> String {
    "127.0.0.1:8888".to_string()
}

fn default_database() -> PathBuf {
    PathBuf::from("data/template_sync.db")
}

fn default_deploy_type() -> String {
    template::K8S_DEPLOY_TYPE.to_string()
}

fn default_provider_timeout_secs() -> u64 {
    30
}

fn default_max_concurrency() -> usize {
    4
}

fn default_rotation() -> String {
    "daily".to_string()
}

fn default_file_prefix() -> String {
    "template_sync".to_string()
}

fn default_events() -> Vec<String> {
    vec!["push".to_string()]
}

/// Load and parse the configuration file
pub fn load_config(path: impl AsRef<Path>) -> Result<SyncConfig, SyncError> {
    let path = path.as_ref();
    let config_str = std::fs::read_to_string(path).map_err(|e| {
        SyncError::ConfigError(format!("Failed to read config file '{}': {}", path.display(), e))
    })?;

    let config: SyncConfig = toml::from_str(&config_str).map_err(|e| {
        SyncError::ConfigError(format!("Failed to parse config file '{}': {}", path.display(), e))
    })?;

    config.validate()?;
    Ok(config)
}

pub struct AppState {
    pub config: SyncConfig,
    pub hooks: HookContext,
    pub templates: SqlTemplateStore,
    pub job_store: SqlJobStore,
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
}

pub type SharedState = Arc<AppState>;
