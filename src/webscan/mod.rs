// src/webscan/mod.rs
pub mod matcher;
pub mod request;
pub mod template;
pub mod worker;

use std::fmt;
use std::path::PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use matcher::{evaluate, HttpResponse};
pub use request::{render, HttpRequestSpec, Variables};
pub use template::{Condition, Matcher, MatcherType, MatchPart, Step, StepKind, Template, TemplateInfo};
pub use worker::{ScanEvent, ScanSummary, ScanWorker};

/// 严重程度: critical, high, medium, low, info
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    #[default]
    Info,
}

/// 大小写不敏感，未知等级按 info 处理
impl From<String> for Severity {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" => Severity::Medium,
            "low" => Severity::Low,
            _ => Severity::Info,
        }
    }
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A confirmed hit. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub template_id: String,
    pub template_path: PathBuf,
    pub template_name: String,
    pub matched_url: String,
    pub method: String,
    /// Fully rendered request, kept for reproduction.
    pub request: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}
