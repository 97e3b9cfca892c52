// src/webscan/matcher.rs
use std::borrow::Cow;
use log::{debug, warn};
use regex::{Regex, RegexBuilder};
use crate::error::MatcherConfigError;
use crate::webscan::template::{Condition, MatchPart, Matcher, MatcherType};

/// The parts of an HTTP response the matchers look at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub async fn from_reqwest(resp: reqwest::Response) -> Result<Self, reqwest::Error> {
        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .map(|(name, value)| {
                (canonical_header_name(name.as_str()), String::from_utf8_lossy(value.as_bytes()).into_owned())
            })
            .collect();
        let body = resp.text().await?;
        Ok(Self { status, headers, body })
    }

    /// 头部序列化为 `Name: value` 行
    pub fn header_text(&self) -> String {
        self.headers
            .iter()
            .map(|(name, value)| format!("{}: {}\n", name, value))
            .collect()
    }

    fn part(&self, part: MatchPart) -> Cow<'_, str> {
        match part {
            MatchPart::Body => Cow::Borrowed(&self.body),
            MatchPart::Header => Cow::Owned(self.header_text()),
            MatchPart::Status => Cow::Owned(self.status.to_string()),
            MatchPart::All => Cow::Owned(format!("{}{}", self.body, self.header_text())),
        }
    }
}

/// `x-powered-by` -> `X-Powered-By`, the casing templates are written against.
pub fn canonical_header_name(name: &str) -> String {
    name.split('-')
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join("-")
}

/// Regex patterns of one matcher, compiled once when the template is loaded.
#[derive(Debug, Clone, Default)]
pub struct Patterns(Vec<Regex>);

impl Patterns {
    /// Case-insensitive, multiline. Invalid patterns are logged and dropped.
    pub fn compile(patterns: &[String]) -> Self {
        let compiled = patterns
            .iter()
            .filter_map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .multi_line(true)
                    .build()
                    .map_err(|e| {
                        let err = MatcherConfigError::InvalidRegex {
                            pattern: pattern.clone(),
                            reason: e.to_string(),
                        };
                        warn!("{}", err);
                    })
                    .ok()
            })
            .collect();
        Self(compiled)
    }

    pub fn is_match(&self, content: &str) -> bool {
        self.0.iter().any(|re| re.is_match(content))
    }
}

impl PartialEq for Patterns {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.0.iter().zip(&other.0).all(|(a, b)| a.as_str() == b.as_str())
    }
}

impl Eq for Patterns {}

/// Evaluates a step's matcher set.
///
/// An empty matcher list never matches. Broken matchers evaluate to false.
pub fn evaluate(response: &HttpResponse, matchers: &[Matcher], condition: Condition) -> bool {
    if matchers.is_empty() {
        return false;
    }
    condition.combine(matchers.iter().map(|m| matches(m, response)))
}

/// Evaluates one matcher, logging and swallowing configuration problems.
pub fn matches(matcher: &Matcher, response: &HttpResponse) -> bool {
    match try_match(matcher, response) {
        Ok(hit) => hit,
        Err(e) => {
            debug!("Matcher treated as no-match: {}", e);
            false
        }
    }
}

fn try_match(matcher: &Matcher, response: &HttpResponse) -> Result<bool, MatcherConfigError> {
    match matcher.kind {
        MatcherType::Status => {
            if matcher.status.is_empty() {
                return Err(MatcherConfigError::EmptyValues);
            }
            Ok(matcher.status.contains(&response.status))
        }
        MatcherType::Word => {
            if matcher.words.is_empty() {
                return Err(MatcherConfigError::EmptyValues);
            }
            let content = response.part(matcher.part);
            Ok(matcher
                .condition
                .combine(matcher.words.iter().map(|word| content.contains(word.as_str()))))
        }
        MatcherType::Regex => {
            if matcher.regex.is_empty() {
                return Err(MatcherConfigError::EmptyValues);
            }
            // 无效的正则在加载时已被丢弃，不影响其余正则
            Ok(matcher.compiled.is_match(&response.part(matcher.part)))
        }
        MatcherType::Unknown => Err(MatcherConfigError::UnknownType),
    }
}
