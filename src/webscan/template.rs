// src/webscan/template.rs
//! Template loading.
//!
//! A template file is YAML with a required `id` and `info` block and a list of
//! HTTP steps under `http:` (or the older `requests:` key). Every step is
//! either a list of raw HTTP requests or a method/path/headers/body request,
//! optionally followed by matchers.

use std::fs;
use std::path::{Path, PathBuf};
use glob::glob;
use log::{debug, error, info, warn};
use serde::{Deserialize, Deserializer, Serialize};
use crate::error::TemplateError;
use crate::webscan::matcher::Patterns;
use crate::webscan::Severity;

// 模板里的枚举值大小写不敏感，无法识别的值落到默认值

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Condition {
    And,
    #[default]
    Or,
}

impl From<String> for Condition {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "and" => Condition::And,
            _ => Condition::Or,
        }
    }
}

impl Condition {
    /// Folds a sequence of booleans with this condition.
    pub fn combine<I: IntoIterator<Item = bool>>(self, results: I) -> bool {
        let mut results = results.into_iter();
        match self {
            Condition::And => results.all(|r| r),
            Condition::Or => results.any(|r| r),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum MatcherType {
    #[default]
    Word,
    Regex,
    Status,
    /// dsl, binary, xpath ... 都不支持，匹配结果恒为 false
    Unknown,
}

impl From<String> for MatcherType {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "word" => MatcherType::Word,
            "regex" => MatcherType::Regex,
            "status" => MatcherType::Status,
            _ => MatcherType::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum MatchPart {
    #[default]
    Body,
    Header,
    Status,
    All,
}

impl From<String> for MatchPart {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "body" => MatchPart::Body,
            "header" | "headers" => MatchPart::Header,
            "status" => MatchPart::Status,
            _ => MatchPart::All,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matcher {
    pub kind: MatcherType,
    pub part: MatchPart,
    /// Only used by `word` matchers.
    pub condition: Condition,
    pub words: Vec<String>,
    pub regex: Vec<String>,
    pub status: Vec<u16>,
    pub(crate) compiled: Patterns,
}

#[derive(Deserialize)]
struct MatcherFile {
    #[serde(rename = "type", default)]
    kind: MatcherType,
    #[serde(default)]
    part: MatchPart,
    #[serde(default)]
    condition: Condition,
    #[serde(default)]
    words: Vec<String>,
    #[serde(default)]
    regex: Vec<String>,
    #[serde(default)]
    status: Vec<u16>,
}

impl From<MatcherFile> for Matcher {
    fn from(def: MatcherFile) -> Self {
        Matcher {
            compiled: Patterns::compile(&def.regex),
            kind: def.kind,
            part: def.part,
            condition: def.condition,
            words: def.words,
            regex: def.regex,
            status: def.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepKind {
    /// Raw HTTP request blocks, one request each.
    Raw(Vec<String>),
    /// One request per path, sharing method, headers and body.
    Standard {
        method: String,
        paths: Vec<String>,
        headers: Vec<(String, String)>,
        body: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub kind: StepKind,
    pub matchers: Vec<Matcher>,
    pub matchers_condition: Condition,
}

impl Step {
    pub fn has_matchers(&self) -> bool {
        !self.matchers.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "string_or_list")]
    pub author: Vec<String>,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub id: String,
    pub path: PathBuf,
    pub info: TemplateInfo,
    pub steps: Vec<Step>,
}

// 文件中的原始结构
#[derive(Deserialize)]
struct TemplateFile {
    id: Option<String>,
    info: Option<TemplateInfo>,
    #[serde(default)]
    http: Vec<StepFile>,
    #[serde(default)]
    requests: Vec<StepFile>,
}

#[derive(Deserialize)]
struct StepFile {
    #[serde(default)]
    raw: Vec<String>,
    method: Option<String>,
    #[serde(default)]
    path: Vec<String>,
    #[serde(default)]
    headers: serde_yaml::Mapping,
    body: Option<String>,
    #[serde(default)]
    matchers: Vec<MatcherFile>,
    #[serde(default, rename = "matchers-condition")]
    matchers_condition: Condition,
}

impl From<StepFile> for Step {
    fn from(def: StepFile) -> Self {
        let kind = if !def.raw.is_empty() {
            StepKind::Raw(def.raw)
        } else {
            StepKind::Standard {
                method: def
                    .method
                    .map(|m| m.trim().to_uppercase())
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "GET".to_string()),
                paths: def.path,
                headers: def
                    .headers
                    .iter()
                    .filter_map(|(k, v)| Some((scalar_to_string(k)?, scalar_to_string(v)?)))
                    .collect(),
                body: def.body,
            }
        };

        Step {
            kind,
            matchers: def.matchers.into_iter().map(Matcher::from).collect(),
            matchers_condition: def.matchers_condition,
        }
    }
}

fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// `tags: a,b,c` 和 `tags: [a, b, c]` 两种写法都接受
fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    let items = match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(s)) => s.split(',').map(str::to_string).collect(),
        Some(OneOrMany::Many(list)) => list,
    };

    Ok(items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

impl Template {
    /// Reads and parses a template file.
    pub fn parse(path: &Path) -> Result<Self, TemplateError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content, path)
    }

    pub fn from_yaml(content: &str, path: impl Into<PathBuf>) -> Result<Self, TemplateError> {
        let file: TemplateFile = serde_yaml::from_str(content)?;

        let id = file
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or(TemplateError::MissingField("id"))?;
        let info = file.info.ok_or(TemplateError::MissingField("info"))?;

        let steps = file
            .http
            .into_iter()
            .chain(file.requests)
            .map(Step::from)
            .collect();

        Ok(Self {
            id,
            path: path.into(),
            info,
            steps,
        })
    }
}

/// Expands a template argument: a file is returned as is, a directory yields
/// every `.yml`/`.yaml` file below it, sorted.
pub fn discover(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }
    if !path.is_dir() {
        error!("Template path does not exist: {}", path.display());
        return Vec::new();
    }

    let mut found = Vec::new();
    for ext in ["yml", "yaml"] {
        let pattern = format!("{}/**/*.{}", path.display(), ext);
        match glob(&pattern) {
            Ok(paths) => {
                for entry in paths {
                    match entry {
                        Ok(p) => found.push(p),
                        Err(e) => error!("Error accessing template file: {}", e),
                    }
                }
            }
            Err(e) => error!("Failed to search for template files: {}", e),
        }
    }

    found.sort();
    found.dedup();
    debug!("Discovered {} template files under {}", found.len(), path.display());
    found
}

/// 批量加载模板，解析失败的模板只记录警告并跳过
pub fn load_templates(paths: &[PathBuf]) -> Vec<Template> {
    let mut templates = Vec::with_capacity(paths.len());

    for path in paths {
        match Template::parse(path) {
            Ok(template) => {
                debug!("Loaded template: {} ({})", template.id, path.display());
                templates.push(template);
            }
            Err(e) => {
                warn!("Skipping template {}: {}", path.display(), e);
            }
        }
    }

    info!("Loaded {}/{} templates", templates.len(), paths.len());
    templates
}
