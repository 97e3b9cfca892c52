// src/webscan/request.rs
use std::fmt::Write as _;
use url::Url;
use crate::common::target::Target;
use crate::error::RequestBuildError;
use crate::webscan::template::{Step, StepKind};

/// Placeholder values available while rendering a step.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    values: Vec<(String, String)>,
}

impl Variables {
    pub fn from_target(target: &Target) -> Self {
        let mut variables = Self::default();
        variables.insert("BaseURL", target.base_url());
        variables.insert("RootURL", target.root_url());
        variables.insert("Hostname", target.hostname());
        variables.insert("Host", target.host());
        if let Some(port) = target.port() {
            variables.insert("Port", port.to_string());
        }
        variables
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.values.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.values.push((key, value)),
        }
    }

    /// 替换 `{{Name}}` 占位符，未知的占位符原样保留
    pub fn substitute(&self, input: &str) -> String {
        let mut result = input.to_string();
        for (key, value) in &self.values {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }
}

/// One concrete HTTP request produced from a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequestSpec {
    pub method: String,
    pub url: String,
    /// Value sent as the `Host` header.
    pub host: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequestSpec {
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Adds the header unless the request already carries one with that name.
    pub fn ensure_header(&mut self, name: &str, value: &str) {
        if !self.has_header(name) {
            self.headers.push((name.to_string(), value.to_string()));
        }
    }

    /// HTTP/1.1 wire form of the request, for reproduction in reports.
    pub fn to_raw_text(&self) -> String {
        let request_target = match Url::parse(&self.url) {
            Ok(url) => match url.query() {
                Some(query) => format!("{}?{}", url.path(), query),
                None => url.path().to_string(),
            },
            Err(_) => self.url.clone(),
        };

        let mut text = String::new();
        let _ = write!(text, "{} {} HTTP/1.1\r\n", self.method, request_target);
        let _ = write!(text, "Host: {}\r\n", self.host);
        for (name, value) in &self.headers {
            let _ = write!(text, "{}: {}\r\n", name, value);
        }
        text.push_str("\r\n");
        if let Some(body) = &self.body {
            text.push_str(body);
        }
        text
    }
}

/// Renders a step against a target.
///
/// Raw steps yield one entry per raw block, standard steps one entry per
/// path, always in declaration order. A block that cannot be parsed yields an
/// error in its slot; the remaining entries are unaffected.
pub fn render(
    step: &Step,
    target: &Target,
    variables: &Variables,
) -> Vec<Result<HttpRequestSpec, RequestBuildError>> {
    match &step.kind {
        StepKind::Raw(blocks) => blocks
            .iter()
            .map(|block| parse_raw(&variables.substitute(block), target))
            .collect(),
        StepKind::Standard { method, paths, headers, body } => paths
            .iter()
            .map(|path| {
                let url = resolve_url(&variables.substitute(path), target.base_url())?;
                Ok(HttpRequestSpec {
                    method: method.clone(),
                    url,
                    host: target.hostname(),
                    headers: headers
                        .iter()
                        .filter(|(k, _)| !k.eq_ignore_ascii_case("host"))
                        .map(|(k, v)| (k.clone(), variables.substitute(v)))
                        .collect(),
                    body: body.as_ref().map(|b| variables.substitute(b)),
                })
            })
            .collect(),
    }
}

/// 解析 raw 请求：请求行 / 头部（直到第一个空行）/ 正文
fn parse_raw(text: &str, target: &Target) -> Result<HttpRequestSpec, RequestBuildError> {
    let text = text.replace("\r\n", "\n");
    let mut lines = text.trim().lines();

    let request_line = lines.next().unwrap_or_default().trim();
    let mut parts = request_line.split_whitespace();
    let (method, path) = match (parts.next(), parts.next()) {
        (Some(method), Some(path)) if method.chars().all(|c| c.is_ascii_alphabetic()) => {
            (method.to_uppercase(), path)
        }
        _ => return Err(RequestBuildError::MissingRequestLine),
    };

    let mut headers = Vec::new();
    for line in lines.by_ref() {
        if line.trim().is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            // Host 头由目标决定
            if !name.eq_ignore_ascii_case("host") {
                headers.push((name.to_string(), value.trim().to_string()));
            }
        }
    }

    let body = lines.collect::<Vec<_>>().join("\n");
    let body = body.trim_end_matches('\n');

    Ok(HttpRequestSpec {
        method,
        url: resolve_url(path, target.root_url())?,
        host: target.hostname(),
        headers,
        body: (!body.is_empty()).then(|| body.to_string()),
    })
}

fn resolve_url(path: &str, base: &str) -> Result<String, RequestBuildError> {
    let url = if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else if path.starts_with('/') {
        format!("{}{}", base.trim_end_matches('/'), path)
    } else {
        format!("{}/{}", base.trim_end_matches('/'), path)
    };

    Url::parse(&url).map_err(|_| RequestBuildError::InvalidUrl(url.clone()))?;
    Ok(url)
}
