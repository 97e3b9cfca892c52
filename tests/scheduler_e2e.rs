// tests/scheduler_e2e.rs
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::time::timeout;
use pocscan_rs::{
    FileReportSink, ReportFormat, ScanConfig, Scheduler, SchedulerConfig, SchedulerEvent, TaskPriority, TaskStatus,
};

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn write_template(dir: &tempfile::TempDir, name: &str, yaml: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, yaml).unwrap();
    path
}

const STATUS_200: &str = r#"
id: status-ok
info:
  name: Status OK
  severity: medium
http:
  - method: GET
    path:
      - "{{BaseURL}}/"
    matchers:
      - type: status
        status: [200]
"#;

fn scheduler(max_concurrent: usize) -> Scheduler {
    Scheduler::new(
        SchedulerConfig {
            max_concurrent,
            ..Default::default()
        },
        ScanConfig::default(),
    )
}

#[tokio::test]
async fn every_target_is_reported() {
    let a = serve(Router::new().route("/", get(|| async { "a" }))).await;
    let b = serve(Router::new().route("/", get(|| async { "b" }))).await;
    let dir = tempfile::tempdir().unwrap();
    let template = write_template(&dir, "status.yaml", STATUS_200);

    let s = scheduler(1);
    let mut events = s.subscribe();
    let id = s.submit("two targets", vec![a.clone(), b.clone()], vec![template], TaskPriority::Normal, None);
    assert!(s.start(&id));

    let task = timeout(Duration::from_secs(10), s.wait(&id)).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.progress, 100);
    assert_eq!(task.result_count, 2);
    assert_eq!(task.vuln_count, 2);

    let mut urls: Vec<String> = s.results(&id).unwrap().into_iter().map(|r| r.matched_url).collect();
    urls.sort();
    let mut expected = vec![format!("{}/", a), format!("{}/", b)];
    expected.sort();
    assert_eq!(urls, expected);

    // 进度单调不减
    let mut last = 0;
    let mut found = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            SchedulerEvent::Progress { progress, .. } => {
                assert!(progress >= last);
                last = progress;
            }
            SchedulerEvent::ResultFound { .. } => found += 1,
            _ => {}
        }
    }
    assert_eq!(found, 2);
}

#[tokio::test]
async fn template_without_matchers_never_matches() {
    let base = serve(Router::new().route("/", get(|| async { "anything" }))).await;
    let dir = tempfile::tempdir().unwrap();
    let template = write_template(
        &dir,
        "raw.yaml",
        r#"
id: raw-no-matchers
info: { name: Raw }
requests:
  - raw:
      - |
        GET / HTTP/1.1
        Host: {{Hostname}}
"#,
    );

    let s = scheduler(1);
    let id = s.submit("raw", vec![base], vec![template], TaskPriority::Normal, None);
    s.dispatch();

    let task = timeout(Duration::from_secs(10), s.wait(&id)).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.result_count, 0);
}

#[tokio::test]
async fn pause_resume_and_cancel_a_running_task() {
    let slow = serve(Router::new().route(
        "/",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            (StatusCode::OK, "late")
        }),
    ))
    .await;
    let dir = tempfile::tempdir().unwrap();
    let template = write_template(&dir, "status.yaml", STATUS_200);

    let s = scheduler(1);
    let other = s.submit("waiting", vec![], vec![], TaskPriority::Low, None);
    let id = s.submit("slow", vec![slow], vec![template], TaskPriority::High, None);
    assert_eq!(s.dispatch(), 1);
    assert_eq!(s.get(&id).unwrap().status, TaskStatus::Running);

    // 槽位已满
    assert!(!s.start(&other));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(s.pause(&id));
    assert!(!s.pause(&id));
    assert_eq!(s.get(&id).unwrap().status, TaskStatus::Paused);
    // 暂停的任务仍占用槽位
    assert_eq!(s.dispatch(), 0);

    assert!(s.resume(&id));
    assert!(!s.resume(&id));
    assert_eq!(s.get(&id).unwrap().status, TaskStatus::Running);

    let mut events = s.subscribe();
    assert!(s.cancel(&id).await);
    let task = s.get(&id).unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert!(task.completed_at.is_some());
    assert!(!s.cancel(&id).await);

    // 等待慢请求本该返回的时间之后，也不应再有结果
    tokio::time::sleep(Duration::from_secs(4)).await;
    while let Ok(event) = events.try_recv() {
        if let SchedulerEvent::ResultFound { task_id, .. } = event {
            assert_ne!(task_id, id);
        }
    }
    assert_eq!(s.get(&id).unwrap().result_count, 0);

    // 取消后空出的槽位交给下一个任务
    let next = timeout(Duration::from_secs(5), s.wait(&other)).await.unwrap().unwrap();
    assert_eq!(next.status, TaskStatus::Completed);
}

#[tokio::test]
async fn bad_proxy_fails_the_task() {
    let dir = tempfile::tempdir().unwrap();
    let template = write_template(&dir, "status.yaml", STATUS_200);
    let s = Scheduler::new(
        SchedulerConfig::default(),
        ScanConfig {
            proxy: Some("not a proxy url".to_string()),
            ..Default::default()
        },
    );

    let id = s.submit("proxied", vec!["http://127.0.0.1:1".to_string()], vec![template], TaskPriority::Normal, None);
    assert!(s.start(&id));

    let task = timeout(Duration::from_secs(5), s.wait(&id)).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error_message.unwrap().contains("not a proxy url"));
}

#[tokio::test]
async fn finished_tasks_are_written_to_the_report_dir() {
    let base = serve(Router::new().route("/", get(|| async { "ok" }))).await;
    let dir = tempfile::tempdir().unwrap();
    let reports = tempfile::tempdir().unwrap();
    let template = write_template(&dir, "status.yaml", STATUS_200);

    let sink = Arc::new(FileReportSink::new(reports.path(), ReportFormat::Json));
    let s = Scheduler::with_sink(SchedulerConfig::default(), ScanConfig::default(), sink.clone());
    let id = s.submit("reported", vec![base], vec![dir.path().to_path_buf()], TaskPriority::Normal, None);
    let cancelled = s.submit("never run", vec![], vec![template], TaskPriority::Low, None);
    assert!(s.cancel(&cancelled).await);
    s.dispatch();

    let task = timeout(Duration::from_secs(10), s.wait(&id)).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(sink.report_path(&id)).unwrap()).unwrap();
    assert_eq!(report["task"]["status"], "Completed");
    assert_eq!(report["results"].as_array().unwrap().len(), 1);
    assert_eq!(report["results"][0]["template_id"], "status-ok");

    assert!(sink.report_path(&cancelled).exists());
}
