// src/config.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::error::ConfigError;

/// 单个请求的超时上限，保证取消时能尽快退出
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 5;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:136.0) Gecko/20100101 Firefox/136.0";

/// Settings for one scan worker. Fixed for the lifetime of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Number of (target, template) units in flight at once.
    pub concurrency_limit: usize,
    /// Per-request timeout, clamped to [`MAX_REQUEST_TIMEOUT_SECS`].
    pub timeout_secs: u64,
    pub proxy: Option<String>,
    pub user_agent: String,
    /// How long a stopping worker waits for already dispatched units.
    pub shutdown_grace_ms: u64,
    pub follow_redirects: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 50,
            timeout_secs: MAX_REQUEST_TIMEOUT_SECS,
            proxy: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            shutdown_grace_ms: 500,
            follow_redirects: true,
        }
    }
}

impl ScanConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.clamp(1, MAX_REQUEST_TIMEOUT_SECS))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency_limit.max(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Tasks bound to a worker (running or paused) at the same time.
    pub max_concurrent: usize,
    /// Try to start work as soon as a task is submitted.
    pub auto_start: bool,
    /// Bounded wait for a cancelled worker before the task is forced to Cancelled.
    pub cancel_grace_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 1,
            auto_start: false,
            cancel_grace_ms: 5000,
        }
    }
}

impl SchedulerConfig {
    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scan: ScanConfig,
    pub scheduler: SchedulerConfig,
    pub report_dir: Option<PathBuf>,
    pub report_format: Option<String>,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }
}
