// src/lib.rs
//! Template driven HTTP vulnerability probing.
//!
//! YAML templates describe requests and matchers, a [`webscan::ScanWorker`]
//! runs every (target, template) pair of one task, and the
//! [`task::Scheduler`] runs tasks by priority with pause, resume and cancel.

pub mod cli;
pub mod common;
pub mod config;
pub mod error;
pub mod output;
pub mod task;
pub mod webscan;

pub use config::{AppConfig, ScanConfig, SchedulerConfig};
pub use output::{FileReportSink, ReportFormat, ResultSink};
pub use task::{QueueStats, Scheduler, SchedulerEvent, Task, TaskControl, TaskPriority, TaskStatus};
pub use webscan::{ScanEvent, ScanResult, ScanSummary, ScanWorker, Severity, Template};
