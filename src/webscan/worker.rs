// src/webscan/worker.rs
//! Runs every (target, template) pair of one task.
//!
//! Pairs run in parallel up to `concurrency_limit`; the steps of one pair run
//! strictly in order. Pause and stop are only observed between pairs and
//! between requests, a stop additionally aborts the requests in flight.

use std::path::PathBuf;
use std::sync::Arc;
use chrono::Utc;
use log::{debug, info, warn};
use reqwest::redirect::Policy;
use reqwest::{Client, Method};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use crate::common::target::Target;
use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::task::TaskControl;
use crate::webscan::matcher::{evaluate, HttpResponse};
use crate::webscan::request::{render, HttpRequestSpec, Variables};
use crate::webscan::template::{self, Step, StepKind, Template};
use crate::webscan::ScanResult;

/// Events streamed from a worker to whoever drives it.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    Result(ScanResult),
    Progress {
        processed: usize,
        total: usize,
        label: String,
    },
    Log(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub total: usize,
    pub processed: usize,
    pub matched: usize,
    pub cancelled: bool,
}

pub struct ScanWorker {
    targets: Vec<Target>,
    templates: Vec<Arc<Template>>,
    config: ScanConfig,
    control: TaskControl,
}

impl ScanWorker {
    pub fn new(targets: Vec<Target>, templates: Vec<Template>, config: ScanConfig, control: TaskControl) -> Self {
        Self {
            targets,
            templates: templates.into_iter().map(Arc::new).collect(),
            config,
            control,
        }
    }

    /// Normalizes raw target strings and loads the template files (or
    /// directories). Broken inputs are logged and skipped.
    pub fn load(
        raw_targets: &[String],
        template_paths: &[PathBuf],
        config: ScanConfig,
        control: TaskControl,
    ) -> Self {
        let targets = Target::normalize_all(raw_targets);
        let paths: Vec<PathBuf> = template_paths
            .iter()
            .flat_map(|p| template::discover(p))
            .collect();
        let templates = template::load_templates(&paths);
        Self::new(targets, templates, config, control)
    }

    pub fn total_units(&self) -> usize {
        self.targets.len() * self.templates.len()
    }

    pub fn build_client(config: &ScanConfig) -> Result<Client, ScanError> {
        let request_timeout = config.request_timeout();
        let redirect = if config.follow_redirects {
            Policy::limited(10)
        } else {
            Policy::none()
        };

        let mut builder = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(request_timeout.min(std::time::Duration::from_secs(2)))
            .danger_accept_invalid_certs(true) // 忽略SSL证书错误
            .redirect(redirect);

        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy.as_str()).map_err(|_| ScanError::Proxy(proxy.clone()))?;
            builder = builder.proxy(proxy);
        }

        Ok(builder.build()?)
    }

    /// Runs the scan to completion or until the task is cancelled.
    ///
    /// Every result is sent before this returns; returning is the completion
    /// signal. Only failing to set up the shared client is an error.
    pub async fn run(self, events: mpsc::UnboundedSender<ScanEvent>) -> Result<ScanSummary, ScanError> {
        let client = Self::build_client(&self.config)?;
        let total = self.total_units();
        let concurrency = self.config.concurrency();

        let _ = events.send(ScanEvent::Log(format!(
            "[*] Scan started: {} targets, {} templates, concurrency {}",
            self.targets.len(),
            self.templates.len(),
            concurrency
        )));
        info!("Starting scan of {} units with concurrency {}", total, concurrency);

        let token = self.control.token().clone();
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut units: JoinSet<Option<ScanResult>> = JoinSet::new();
        let mut tally = Tally {
            events: &events,
            control: &self.control,
            total,
            processed: 0,
            matched: 0,
        };

        'dispatch: for target in &self.targets {
            for template in &self.templates {
                let permit = loop {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => break 'dispatch,
                        permit = semaphore.clone().acquire_owned() => {
                            break permit.map_err(|_| ScanError::PoolClosed)?;
                        }
                        Some(done) = units.join_next(), if !units.is_empty() => tally.record(done),
                    }
                };

                // 拿到许可后再过检查点：暂停时等待，同时继续收集已完成的单元
                loop {
                    tokio::select! {
                        biased;
                        res = self.control.checkpoint() => {
                            if res.is_err() {
                                break 'dispatch;
                            }
                            break;
                        }
                        Some(done) = units.join_next(), if !units.is_empty() => tally.record(done),
                    }
                }

                let unit = Unit {
                    client: client.clone(),
                    target: target.clone(),
                    template: Arc::clone(template),
                    user_agent: self.config.user_agent.clone(),
                    token: token.clone(),
                };
                units.spawn(async move {
                    let _permit = permit;
                    unit.run().await
                });
            }
        }

        // 等待已派发的单元
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                done = units.join_next() => match done {
                    Some(done) => tally.record(done),
                    None => break,
                },
            }
        }

        let cancelled = token.is_cancelled();
        if cancelled {
            // 丢弃未完成的单元，只等待一个很短的宽限期
            units.abort_all();
            let grace = self.config.shutdown_grace();
            if timeout(grace, async { while units.join_next().await.is_some() {} }).await.is_err() {
                debug!("Units still draining after {:?}, leaving them behind", grace);
            }
            let _ = events.send(ScanEvent::Log("[*] Scan stopped".to_string()));
        } else {
            let _ = events.send(ScanEvent::Log("[*] Scan finished".to_string()));
        }
        drop(client);

        let summary = ScanSummary {
            total,
            processed: tally.processed,
            matched: tally.matched,
            cancelled,
        };
        info!(
            "Scan {}: {}/{} units, {} matches",
            if cancelled { "stopped" } else { "finished" },
            summary.processed,
            summary.total,
            summary.matched
        );
        Ok(summary)
    }
}

struct Tally<'a> {
    events: &'a mpsc::UnboundedSender<ScanEvent>,
    control: &'a TaskControl,
    total: usize,
    processed: usize,
    matched: usize,
}

impl Tally<'_> {
    fn record(&mut self, done: Result<Option<ScanResult>, JoinError>) {
        // 取消之后不再上报任何结果
        if self.control.is_cancelled() {
            return;
        }

        self.processed += 1;
        match done {
            Ok(Some(result)) => {
                self.matched += 1;
                let _ = self.events.send(ScanEvent::Result(result));
            }
            Ok(None) => {}
            Err(e) if e.is_panic() => warn!("Scan unit panicked: {}", e),
            Err(_) => {}
        }

        let _ = self.events.send(ScanEvent::Progress {
            processed: self.processed,
            total: self.total,
            label: format!("Scanning... {}/{}", self.processed, self.total),
        });
    }
}

/// One (target, template) pair.
struct Unit {
    client: Client,
    target: Target,
    template: Arc<Template>,
    user_agent: String,
    token: CancellationToken,
}

impl Unit {
    async fn run(self) -> Option<ScanResult> {
        let variables = Variables::from_target(&self.target);
        let mut last: Option<(HttpRequestSpec, HttpResponse)> = None;

        for step in &self.template.steps {
            // 多个 path 是同一请求的变体，逐个匹配；raw 块是一个序列，只匹配最后的响应
            let per_request = matches!(step.kind, StepKind::Standard { .. });

            for rendered in render(step, &self.target, &variables) {
                if self.token.is_cancelled() {
                    return None;
                }

                let mut request = match rendered {
                    Ok(request) => request,
                    Err(e) => {
                        debug!("[{}] skipping request for {}: {}", self.template.id, self.target, e);
                        continue;
                    }
                };
                request.ensure_header("User-Agent", &self.user_agent);

                let sent = tokio::select! {
                    biased;
                    _ = self.token.cancelled() => return None,
                    sent = send(&self.client, &request) => sent,
                };

                match sent {
                    Ok(response) => last = Some((request, response)),
                    Err(e) => {
                        debug!("[{}] {} {} failed: {}", self.template.id, request.method, request.url, e);
                        continue;
                    }
                }

                if per_request && step.has_matchers() {
                    if let Some(result) = self.check(step, last.as_ref()) {
                        return Some(result);
                    }
                }
            }

            if !per_request && step.has_matchers() {
                if let Some(result) = self.check(step, last.as_ref()) {
                    return Some(result);
                }
            }
        }

        None
    }

    fn check(
        &self,
        step: &Step,
        last: Option<&(HttpRequestSpec, HttpResponse)>,
    ) -> Option<ScanResult> {
        let (request, response) = last?;
        if !evaluate(response, &step.matchers, step.matchers_condition) {
            return None;
        }

        debug!("[{}] matched at {}", self.template.id, request.url);
        Some(ScanResult {
            template_id: self.template.id.clone(),
            template_path: self.template.path.clone(),
            template_name: self.template.info.name.clone(),
            matched_url: request.url.clone(),
            method: request.method.clone(),
            request: request.to_raw_text(),
            severity: self.template.info.severity,
            timestamp: Utc::now(),
        })
    }
}

async fn send(client: &Client, request: &HttpRequestSpec) -> Result<HttpResponse, reqwest::Error> {
    let method = Method::from_bytes(request.method.as_bytes()).unwrap_or(Method::GET);
    let mut builder = client.request(method, request.url.as_str());
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = &request.body {
        builder = builder.body(body.clone());
    }

    let resp = builder.send().await?;
    HttpResponse::from_reqwest(resp).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::Router;
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn serve(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn template(yaml: &str) -> Template {
        Template::from_yaml(yaml, "inline.yaml").unwrap()
    }

    async fn run(targets: &[String], templates: Vec<Template>) -> (ScanSummary, Vec<ScanEvent>) {
        let targets = Target::normalize_all(targets);
        let worker = ScanWorker::new(targets, templates, ScanConfig::default(), TaskControl::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let summary = worker.run(tx).await.unwrap();

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (summary, events)
    }

    fn results(events: &[ScanEvent]) -> Vec<&ScanResult> {
        events
            .iter()
            .filter_map(|e| match e {
                ScanEvent::Result(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn raw_sequence_matches_on_last_response() {
        let app = Router::new()
            .route("/login", post(|| async { "token issued" }))
            .route("/secret", get(|| async { (StatusCode::OK, "flag{owned}") }));
        let base = serve(app).await;

        let tpl = template(
            r#"
id: chain
info: { name: Chain, severity: critical }
http:
  - raw:
      - |
        POST /login HTTP/1.1
        Host: {{Hostname}}

        user=admin
      - |
        GET /secret HTTP/1.1
        Host: {{Hostname}}
    matchers:
      - type: word
        words: ["flag{"]
"#,
        );

        let (summary, events) = run(&[base.clone()], vec![tpl]).await;
        let found = results(&events);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].matched_url, format!("{}/secret", base));
        assert_eq!(found[0].method, "GET");
        assert!(found[0].request.contains("User-Agent: Mozilla/5.0"));
        assert_eq!(summary.matched, 1);
        assert_eq!(summary.processed, 1);
        assert!(!summary.cancelled);
    }

    #[tokio::test]
    async fn earlier_step_without_matchers_feeds_nothing() {
        let app = Router::new()
            .route("/a", get(|| async { "needle" }))
            .route("/b", get(|| async { "hay" }));
        let base = serve(app).await;

        // 第一步命中关键字但没有 matchers，第二步有 matchers 但不命中
        let tpl = template(
            r#"
id: two-steps
info: { name: Two }
http:
  - path: ["{{BaseURL}}/a"]
  - path: ["{{BaseURL}}/b"]
    matchers:
      - type: word
        words: ["needle"]
"#,
        );

        let (summary, events) = run(&[base], vec![tpl]).await;
        assert!(results(&events).is_empty());
        assert_eq!(summary.matched, 0);
    }

    #[tokio::test]
    async fn path_variants_match_individually() {
        let app = Router::new().route("/v2/admin", get(|| async { "admin panel" }));
        let base = serve(app).await;

        let tpl = template(
            r#"
id: variants
info: { name: Variants }
http:
  - path: ["{{BaseURL}}/v1/admin", "{{BaseURL}}/v2/admin", "{{BaseURL}}/v3/admin"]
    matchers-condition: and
    matchers:
      - type: status
        status: [200]
      - type: regex
        regex: ["ADMIN\\s+PANEL"]
"#,
        );

        let (_, events) = run(&[base.clone()], vec![tpl]).await;
        let found = results(&events);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].matched_url, format!("{}/v2/admin", base));
    }

    #[tokio::test]
    async fn network_errors_are_no_match() {
        // 端口 1 上没有服务
        let tpl = template(
            r#"
id: unreachable
info: { name: Unreachable }
http:
  - path: ["{{BaseURL}}/"]
    matchers:
      - type: status
        status: [200]
"#,
        );

        let (summary, events) = run(&["http://127.0.0.1:1".to_string()], vec![tpl]).await;
        assert!(results(&events).is_empty());
        assert_eq!(summary.processed, 1);
        assert!(matches!(
            events.iter().rev().find(|e| matches!(e, ScanEvent::Progress { .. })),
            Some(ScanEvent::Progress { processed: 1, total: 1, .. })
        ));
    }

    #[tokio::test]
    async fn cancelled_worker_reports_nothing() {
        let base = serve(Router::new().route("/", get(|| async { "ok" }))).await;
        let tpl = template(
            r#"
id: any
info: { name: Any }
http:
  - path: ["{{BaseURL}}/"]
    matchers:
      - type: status
        status: [200]
"#,
        );

        let control = TaskControl::new();
        control.cancel();
        let worker = ScanWorker::new(
            Target::normalize_all(&[base]),
            vec![tpl],
            ScanConfig::default(),
            control,
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let summary = worker.run(tx).await.unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.processed, 0);
        while let Some(event) = rx.recv().await {
            assert!(!matches!(event, ScanEvent::Result(_)));
        }
    }

    #[tokio::test]
    async fn header_words_match_canonical_names() {
        let app = Router::new().route("/", get(|| async { ([("X-Powered-By", "Express")], "hello") }));
        let base = serve(app).await;
        let tpl = template(
            r#"
id: powered-by
info: { name: Powered by Express, severity: low }
http:
  - path: ["{{BaseURL}}/"]
    matchers:
      - type: word
        part: header
        words: ["X-Powered-By: Express"]
"#,
        );

        let (summary, events) = run(&[base], vec![tpl]).await;
        assert_eq!(summary.matched, 1);
        assert_eq!(results(&events)[0].template_id, "powered-by");
    }

    const SLOW_TEMPLATE: &str = r#"
id: slow-ID
info: { name: Slow }
http:
  - path: ["{{BaseURL}}/"]
    matchers:
      - type: status
        status: [200]
"#;

    #[tokio::test]
    async fn paused_worker_dispatches_nothing_until_resumed() {
        let app = Router::new().route(
            "/",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                "ok"
            }),
        );
        let base = serve(app).await;
        let templates: Vec<Template> = (0..10)
            .map(|i| template(&SLOW_TEMPLATE.replace("ID", &i.to_string())))
            .collect();

        let control = TaskControl::new();
        let config = ScanConfig {
            concurrency_limit: 1,
            ..Default::default()
        };
        let worker = ScanWorker::new(Target::normalize_all(&[base]), templates, config, control.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(worker.run(tx));

        let mut found = 0;
        while found < 3 {
            if let Some(ScanEvent::Result(_)) = rx.recv().await {
                found += 1;
            }
        }
        assert!(control.pause());

        // 暂停前已派发的单元仍会完成
        tokio::time::sleep(Duration::from_millis(400)).await;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, ScanEvent::Result(_)) {
                found += 1;
            }
        }
        assert!(found < 10);

        tokio::time::sleep(Duration::from_millis(600)).await;
        while let Ok(event) = rx.try_recv() {
            assert!(!matches!(event, ScanEvent::Result(_)), "unit finished while paused");
        }
        assert!(!handle.is_finished());

        assert!(control.resume());
        let summary = timeout(Duration::from_secs(10), handle).await.unwrap().unwrap().unwrap();
        assert_eq!(summary.matched, 10);
        assert_eq!(summary.processed, 10);
        assert!(!summary.cancelled);
    }

    #[test]
    fn bad_proxy_is_rejected() {
        let config = ScanConfig {
            proxy: Some("not a proxy url".to_string()),
            ..Default::default()
        };
        assert!(matches!(ScanWorker::build_client(&config), Err(ScanError::Proxy(_))));
    }
}
