// src/task/mod.rs
pub mod control;
pub mod scheduler;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use control::{Cancelled, TaskControl};
pub use scheduler::{QueueStats, Scheduler, SchedulerEvent};

pub type TaskId = String;

/// 任务优先级（数值越小优先级越高）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TaskPriority {
    Critical = 0,
    High = 1,
    #[default]
    Normal = 2,
    Low = 3,
    Background = 4,
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskPriority::Critical => "critical",
            TaskPriority::High => "high",
            TaskPriority::Normal => "normal",
            TaskPriority::Low => "low",
            TaskPriority::Background => "background",
        };
        f.write_str(name)
    }
}

impl FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "critical" => Ok(TaskPriority::Critical),
            "high" => Ok(TaskPriority::High),
            "normal" => Ok(TaskPriority::Normal),
            "low" => Ok(TaskPriority::Low),
            "background" => Ok(TaskPriority::Background),
            other => Err(format!("unknown priority `{}`", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Scheduled,
    Running,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled | TaskStatus::Failed)
    }

    /// Bound to a worker, i.e. occupying a scheduler slot.
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Running | TaskStatus::Paused)
    }

    /// The task state machine.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (Scheduled, Pending) => true,
            (Pending | Scheduled, Running) => true,
            (Running, Paused) | (Paused, Running) => true,
            // 暂停时 worker 仍可能排空最后一批单元
            (Running | Paused, Completed | Failed) => true,
            (Pending | Scheduled | Running | Paused, Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Scheduled => "scheduled",
            TaskStatus::Running => "running",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A schedulable scan job. Values handed out by the scheduler are snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub targets: Vec<String>,
    pub templates: Vec<PathBuf>,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    /// 0..=100, never decreases while running.
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result_count: usize,
    pub vuln_count: usize,
    pub error_message: Option<String>,
    // 保留字段，调度器不会自动重试
    pub retry_count: u32,
    pub max_retries: u32,
}

impl Task {
    pub fn new(
        name: impl Into<String>,
        targets: Vec<String>,
        templates: Vec<PathBuf>,
        priority: TaskPriority,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        let scheduled_at = scheduled_at.filter(|at| *at > now);
        let status = if scheduled_at.is_some() {
            TaskStatus::Scheduled
        } else {
            TaskStatus::Pending
        };

        Self {
            id: uuid::Uuid::new_v4().simple().to_string()[..8].to_string(),
            name: name.into(),
            targets,
            templates,
            priority,
            status,
            progress: 0,
            created_at: now,
            scheduled_at,
            started_at: None,
            completed_at: None,
            result_count: 0,
            vuln_count: 0,
            error_message: None,
            retry_count: 0,
            max_retries: 3,
        }
    }
}
