// src/cli.rs
use std::path::PathBuf;
use clap::Parser;
use crate::config::AppConfig;
use crate::output::ReportFormat;
use crate::task::TaskPriority;

#[derive(Parser, Debug)]
#[command(
    name = "pocscan-rs",
    version,
    about = "Template driven HTTP vulnerability scanner with a prioritised task queue"
)]
pub struct Args {
    /// Targets, comma separated (URL, host or host:port)
    #[arg(short, long, value_delimiter = ',')]
    pub target: Vec<String>,

    /// File with one target per line
    #[arg(short = 'f', long)]
    pub target_file: Option<PathBuf>,

    /// Template files or directories, comma separated
    #[arg(long = "templates", value_delimiter = ',', required = true)]
    pub templates: Vec<PathBuf>,

    /// Task name (default: derived from the first target)
    #[arg(long)]
    pub name: Option<String>,

    /// Task priority (critical, high, normal, low, background)
    #[arg(long, default_value = "normal")]
    pub priority: TaskPriority,

    /// Units scanned in parallel
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Per request timeout in seconds (max 5)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// HTTP/SOCKS proxy for every request
    #[arg(long)]
    pub proxy: Option<String>,

    /// Tasks running at the same time
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// YAML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Report directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Report format (txt, json, csv)
    #[arg(long)]
    pub format: Option<ReportFormat>,

    /// Log file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Silent mode (no banner)
    #[arg(short, long)]
    pub silent: bool,
}

impl Args {
    /// Command line flags win over the configuration file.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(concurrency) = self.concurrency {
            config.scan.concurrency_limit = concurrency;
        }
        if let Some(timeout) = self.timeout {
            config.scan.timeout_secs = timeout;
        }
        if let Some(proxy) = &self.proxy {
            config.scan.proxy = Some(proxy.clone());
        }
        if let Some(max) = self.max_concurrent {
            config.scheduler.max_concurrent = max;
        }
        if let Some(dir) = &self.output {
            config.report_dir = Some(dir.clone());
        }
        if let Some(format) = self.format {
            config.report_format = Some(format.to_string());
        }
    }
}
