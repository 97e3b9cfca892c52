// src/error.rs
//! Error types shared by the template engine, the worker and the scheduler.

use thiserror::Error;

use crate::task::TaskStatus;

/// 模板解析失败，该模板会被跳过
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("failed to read template: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed template: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("template is missing required field `{0}`")]
    MissingField(&'static str),
}

/// raw 请求无法解析，该请求单元会被跳过
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestBuildError {
    #[error("raw request has no parseable request line")]
    MissingRequestLine,

    #[error("invalid request url `{0}`")]
    InvalidUrl(String),
}

/// Problems in a matcher definition. Never returned from evaluation, only logged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatcherConfigError {
    #[error("unknown matcher type")]
    UnknownType,

    #[error("invalid regex `{pattern}`: {reason}")]
    InvalidRegex { pattern: String, reason: String },

    #[error("matcher has no values")]
    EmptyValues,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TargetError {
    #[error("empty target")]
    Empty,

    #[error("invalid target `{0}`")]
    Invalid(String),
}

/// 进程级错误，会让整个任务进入 Failed 状态
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("invalid proxy `{0}`")]
    Proxy(String),

    #[error("worker pool closed")]
    PoolClosed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("task `{0}` not found")]
    NotFound(String),

    #[error("invalid state transition: cannot transition from {from} to {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("no free slot ({0} tasks already running)")]
    NoFreeSlot(usize),
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
