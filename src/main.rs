// src/main.rs
use std::sync::Arc;
use std::time::Instant;
use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::*;
use log::{info, warn};
use tokio::sync::broadcast::error::RecvError;
use pocscan_rs::cli::Args;
use pocscan_rs::common::{banner, logger, utils};
use pocscan_rs::{
    AppConfig, FileReportSink, ReportFormat, ResultSink, ScanResult, Scheduler, SchedulerEvent, Severity,
};

fn severity_label(severity: Severity) -> ColoredString {
    let label = format!("[{}]", severity);
    match severity {
        Severity::Critical => label.bright_red().bold(),
        Severity::High => label.red(),
        Severity::Medium => label.yellow(),
        Severity::Low => label.cyan(),
        Severity::Info => label.blue(),
    }
}

fn format_result(result: &ScanResult) -> String {
    format!(
        "{} {} {} {} ({})",
        "[+]".green(),
        severity_label(result.severity),
        result.template_id.bold(),
        result.matched_url,
        result.template_name
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logger::init(args.verbose, args.silent, args.log_file.as_deref()).context("failed to initialise logging")?;
    if !args.silent {
        banner::show();
    }

    // 加载配置，命令行参数优先
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path).with_context(|| format!("failed to load {}", path.display()))?,
        None => AppConfig::default(),
    };
    args.apply(&mut config);

    let mut targets = args.target.clone();
    if let Some(path) = &args.target_file {
        let lines = utils::read_lines_from_file(path).with_context(|| format!("failed to read {}", path.display()))?;
        targets.extend(lines);
    }
    if targets.is_empty() {
        bail!("no targets given, use -t or -f");
    }

    let sink = match &config.report_dir {
        Some(dir) => {
            let format = match config.report_format.as_deref() {
                Some(raw) => raw.parse::<ReportFormat>().map_err(anyhow::Error::msg)?,
                None => ReportFormat::default(),
            };
            Some(Arc::new(FileReportSink::new(dir, format)))
        }
        None => None,
    };

    let scheduler = match &sink {
        Some(sink) => {
            let sink: Arc<dyn ResultSink> = sink.clone();
            Scheduler::with_sink(config.scheduler.clone(), config.scan.clone(), sink)
        }
        None => Scheduler::new(config.scheduler.clone(), config.scan.clone()),
    };

    let name = args.name.clone().unwrap_or_else(|| format!("scan {}", targets[0]));
    let mut events = scheduler.subscribe();
    let task_id = scheduler.submit(name, targets, args.templates.clone(), args.priority, None);
    scheduler.dispatch();

    let start = Instant::now();
    let pb = utils::create_progress_bar(0, "Scanning");
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                if let Err(e) = res {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                pb.println(format!("{} interrupted, stopping task {}", "[!]".yellow(), task_id));
                scheduler.cancel(&task_id).await;
                break;
            }
            event = events.recv() => match event {
                Ok(SchedulerEvent::ResultFound { task_id: id, result }) if id == task_id => {
                    pb.println(format_result(&result));
                    if let Some(sink) = &sink {
                        if let Err(e) = sink.append_finding(&id, &result) {
                            warn!("Failed to record finding: {}", e);
                        }
                    }
                }
                Ok(SchedulerEvent::Progress { task_id: id, processed, total, .. }) if id == task_id => {
                    pb.set_length(total as u64);
                    pb.set_position(processed as u64);
                }
                Ok(SchedulerEvent::Log { task_id: id, message }) if id == task_id => {
                    pb.set_message(message);
                }
                Ok(SchedulerEvent::StatusChanged { task_id: id, status }) if id == task_id && status.is_terminal() => break,
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => warn!("Dropped {} scheduler events", n),
                Err(RecvError::Closed) => break,
            },
        }
    }
    pb.finish_and_clear();

    let Some(task) = scheduler.wait(&task_id).await else {
        bail!("task {} disappeared", task_id);
    };

    println!();
    println!("{}", "[*] Scan summary".bright_cyan());
    println!("    Task:     {} ({})", task.name, task.id);
    println!("    Status:   {}", task.status);
    println!("    Progress: {}%", task.progress);
    println!("    Findings: {}", task.vuln_count.to_string().bold());
    println!("    Elapsed:  {:.2?}", start.elapsed());
    if let Some(error) = &task.error_message {
        println!("    Error:    {}", error.red());
    }
    if let Some(sink) = &sink {
        println!("    Report:   {}", sink.report_path(&task.id).display());
    }

    info!("Done: {} finding(s) in {:.2?}", task.vuln_count, start.elapsed());
    Ok(())
}
