// src/output/report.rs
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use chrono::Local;
use serde::Serialize;
use crate::error::SinkError;
use crate::output::file;
use crate::task::Task;
use crate::webscan::ScanResult;

/// Receives every task once it reaches a terminal status.
pub trait ResultSink: Send + Sync {
    fn persist(&self, task: &Task, results: &[ScanResult]) -> Result<(), SinkError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    Json,
    #[default]
    Txt,
    Csv,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Json => "json",
            ReportFormat::Txt => "txt",
            ReportFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(ReportFormat::Json),
            "txt" | "text" => Ok(ReportFormat::Txt),
            "csv" => Ok(ReportFormat::Csv),
            other => Err(format!("unknown report format `{}`", other)),
        }
    }
}

#[derive(Serialize)]
struct Report<'a> {
    generated_at: String,
    task: &'a Task,
    summary: Summary,
    results: &'a [ScanResult],
}

#[derive(Serialize)]
struct Summary {
    targets: usize,
    templates: usize,
    results: usize,
    by_severity: BTreeMap<&'static str, usize>,
}

impl<'a> Report<'a> {
    fn new(task: &'a Task, results: &'a [ScanResult]) -> Self {
        let mut by_severity = BTreeMap::new();
        for result in results {
            *by_severity.entry(result.severity.as_str()).or_insert(0) += 1;
        }

        Self {
            generated_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            task,
            summary: Summary {
                targets: task.targets.len(),
                templates: task.templates.len(),
                results: results.len(),
                by_severity,
            },
            results,
        }
    }
}

/// Writes one report per finished task to `<dir>/<task-id>.<ext>`.
#[derive(Debug, Clone)]
pub struct FileReportSink {
    dir: PathBuf,
    format: ReportFormat,
}

impl FileReportSink {
    pub fn new(dir: impl Into<PathBuf>, format: ReportFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
        }
    }

    pub fn report_path(&self, task_id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", task_id, self.format.extension()))
    }

    /// Appends a single finding to `<dir>/findings.log` as soon as it is reported.
    pub fn append_finding(&self, task_id: &str, result: &ScanResult) -> Result<(), SinkError> {
        let line = format!(
            "{} [{}] [{}] {} {} {}",
            result.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
            task_id,
            result.severity,
            result.template_id,
            result.method,
            result.matched_url
        );
        file::append_line(&self.dir.join("findings.log"), &line)?;
        Ok(())
    }

    fn render(&self, report: &Report<'_>) -> Result<String, SinkError> {
        Ok(match self.format {
            ReportFormat::Json => serde_json::to_string_pretty(report)?,
            ReportFormat::Txt => text_report(report),
            ReportFormat::Csv => csv_report(report),
        })
    }
}

impl ResultSink for FileReportSink {
    fn persist(&self, task: &Task, results: &[ScanResult]) -> Result<(), SinkError> {
        let report = Report::new(task, results);
        let content = self.render(&report)?;
        write(&self.report_path(&task.id), &content)
    }
}

fn write(path: &Path, content: &str) -> Result<(), SinkError> {
    file::write_report(path, content)?;
    log::info!("Report written to {}", path.display());
    Ok(())
}

fn text_report(report: &Report<'_>) -> String {
    let task = report.task;
    let mut content = String::new();

    // 标题
    content.push_str("# POCSCAN-RS TASK REPORT\n");
    content.push_str(&format!("Date: {}\n\n", report.generated_at));

    // 任务
    content.push_str("## TASK\n");
    content.push_str(&format!("ID: {}\n", task.id));
    content.push_str(&format!("Name: {}\n", task.name));
    content.push_str(&format!("Status: {}\n", task.status));
    content.push_str(&format!("Priority: {}\n", task.priority));
    if let Some(started) = task.started_at {
        content.push_str(&format!("Started: {}\n", started.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")));
    }
    if let Some(completed) = task.completed_at {
        content.push_str(&format!("Finished: {}\n", completed.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")));
    }
    if let Some(error) = &task.error_message {
        content.push_str(&format!("Error: {}\n", error));
    }
    content.push('\n');

    // 摘要
    content.push_str("## SUMMARY\n");
    content.push_str(&format!("Targets: {}\n", report.summary.targets));
    content.push_str(&format!("Templates: {}\n", report.summary.templates));
    content.push_str(&format!("Results: {}\n", report.summary.results));
    for (severity, count) in &report.summary.by_severity {
        content.push_str(&format!("  {}: {}\n", severity, count));
    }
    content.push('\n');

    if !report.results.is_empty() {
        content.push_str("## RESULTS\n");
        for result in report.results {
            content.push_str(&format!(
                "- [{}] {} ({})\n",
                result.severity, result.template_name, result.template_id
            ));
            content.push_str(&format!("  URL: {} {}\n", result.method, result.matched_url));
            content.push_str(&format!("  Template: {}\n", result.template_path.display()));
            content.push_str("  Request:\n");
            for line in result.request.lines() {
                content.push_str(&format!("    {}\n", line));
            }
        }
        content.push('\n');
    }

    content
}

fn csv_field(value: &str) -> String {
    value.replace(',', ";").replace(['\r', '\n'], " ")
}

fn csv_report(report: &Report<'_>) -> String {
    let mut content = String::from("TaskID,TemplateID,Name,Severity,Method,URL,Template,Timestamp\n");
    for result in report.results {
        content.push_str(&format!(
            "{},{},{},{},{},{},{},{}\n",
            report.task.id,
            csv_field(&result.template_id),
            csv_field(&result.template_name),
            result.severity,
            result.method,
            csv_field(&result.matched_url),
            csv_field(&result.template_path.to_string_lossy()),
            result.timestamp.to_rfc3339(),
        ));
    }
    content
}
