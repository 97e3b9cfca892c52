// src/common/target.rs
use std::fmt;
use url::Url;
use crate::error::TargetError;

/// A normalized scan target.
///
/// `base_url` keeps any path given by the operator (without the trailing
/// slash), `root_url` is always `scheme://host[:port]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    base_url: String,
    root_url: String,
    host: String,
    port: Option<u16>,
}

impl Target {
    /// Parses a target that already carries a scheme.
    pub fn parse(raw: &str) -> Result<Self, TargetError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(TargetError::Empty);
        }

        let url = Url::parse(raw).map_err(|_| TargetError::Invalid(raw.to_string()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(TargetError::Invalid(raw.to_string()));
        }
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| TargetError::Invalid(raw.to_string()))?
            .to_string();
        let port = url.port();

        let authority = match port {
            Some(port) => format!("{}:{}", host, port),
            None => host.clone(),
        };
        let root_url = format!("{}://{}", url.scheme(), authority);
        let path = url.path().trim_end_matches('/');
        let base_url = format!("{}{}", root_url, path);

        Ok(Self { base_url, root_url, host, port })
    }

    /// 规范化用户输入：缺少协议时同时生成 http 和 https 两个目标
    pub fn normalize(raw: &str) -> Result<Vec<Self>, TargetError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(TargetError::Empty);
        }

        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Ok(vec![Self::parse(raw)?]);
        }

        Ok(vec![
            Self::parse(&format!("http://{}", raw))?,
            Self::parse(&format!("https://{}", raw))?,
        ])
    }

    /// Normalizes a list of raw inputs, skipping invalid ones and duplicates.
    pub fn normalize_all<S: AsRef<str>>(inputs: &[S]) -> Vec<Self> {
        let mut targets: Vec<Self> = Vec::new();
        for input in inputs {
            match Self::normalize(input.as_ref()) {
                Ok(normalized) => {
                    for target in normalized {
                        if !targets.contains(&target) {
                            targets.push(target);
                        }
                    }
                }
                Err(e) => log::warn!("Skipping target {:?}: {}", input.as_ref(), e),
            }
        }
        targets
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn root_url(&self) -> &str {
        &self.root_url
    }

    /// `host[:port]`, the value of the `{{Hostname}}` placeholder.
    pub fn hostname(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }

    /// Bare host without port, the value of the `{{Host}}` placeholder.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_url)
    }
}
