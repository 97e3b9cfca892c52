// src/output/mod.rs
pub mod file;
pub mod report;

pub use report::{FileReportSink, ReportFormat, ResultSink};
