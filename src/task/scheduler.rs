// src/task/scheduler.rs
//! Task scheduler.
//!
//! Owns the task set, keeps at most `max_concurrent` tasks bound to a worker
//! and always starts the pending task with the smallest
//! `(priority, created_at)` when a slot frees up. Only the scheduler changes a
//! task's status; the bound worker only feeds progress and results through an
//! event channel that the scheduler applies under the same lock.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use crate::config::{ScanConfig, SchedulerConfig};
use crate::error::SchedulerError;
use crate::output::report::ResultSink;
use crate::task::{Task, TaskControl, TaskId, TaskPriority, TaskStatus};
use crate::webscan::{ScanEvent, ScanResult, ScanSummary, ScanWorker};

const EVENT_CAPACITY: usize = 1024;

/// Notifications published by the scheduler, keyed by task id.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    TaskAdded {
        task_id: TaskId,
    },
    TaskRemoved {
        task_id: TaskId,
    },
    StatusChanged {
        task_id: TaskId,
        status: TaskStatus,
    },
    Progress {
        task_id: TaskId,
        progress: u8,
        processed: usize,
        total: usize,
    },
    ResultFound {
        task_id: TaskId,
        result: ScanResult,
    },
    Log {
        task_id: TaskId,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub scheduled: usize,
    pub running: usize,
    pub paused: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub failed: usize,
}

struct Entry {
    task: Task,
    // 同一时间创建的任务按提交顺序排队
    seq: u64,
    results: Vec<ScanResult>,
    control: Option<TaskControl>,
    handle: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct State {
    entries: HashMap<TaskId, Entry>,
    order: Vec<TaskId>,
    next_seq: u64,
}

impl State {
    fn active_count(&self) -> usize {
        self.entries.values().filter(|e| e.task.status.is_active()).count()
    }

    fn next_pending(&self) -> Option<TaskId> {
        self.entries
            .values()
            .filter(|e| e.task.status == TaskStatus::Pending)
            .min_by_key(|e| (e.task.priority, e.task.created_at, e.seq))
            .map(|e| e.task.id.clone())
    }

    fn entry_mut(&mut self, task_id: &str) -> Result<&mut Entry, SchedulerError> {
        self.entries
            .get_mut(task_id)
            .ok_or_else(|| SchedulerError::NotFound(task_id.to_string()))
    }
}

struct Inner {
    config: SchedulerConfig,
    scan_config: RwLock<ScanConfig>,
    state: Mutex<State>,
    events: broadcast::Sender<SchedulerEvent>,
    sink: Option<Arc<dyn ResultSink>>,
}

/// Cheap to clone; all clones drive the same task set.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

fn transition(task: &mut Task, next: TaskStatus) -> Result<(), SchedulerError> {
    if !task.status.can_transition_to(next) {
        return Err(SchedulerError::InvalidTransition {
            from: task.status,
            to: next,
        });
    }
    task.status = next;
    if next.is_terminal() {
        task.completed_at = Some(Utc::now());
    }
    Ok(())
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, scan_config: ScanConfig) -> Self {
        Self::build(config, scan_config, None)
    }

    /// Same as [`Scheduler::new`], handing every finished task to `sink`.
    pub fn with_sink(config: SchedulerConfig, scan_config: ScanConfig, sink: Arc<dyn ResultSink>) -> Self {
        Self::build(config, scan_config, Some(sink))
    }

    fn build(config: SchedulerConfig, scan_config: ScanConfig, sink: Option<Arc<dyn ResultSink>>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                config,
                scan_config: RwLock::new(scan_config),
                state: Mutex::new(State::default()),
                events,
                sink,
            }),
        }
    }

    /// Worker settings for tasks started from now on.
    pub fn set_scan_config(&self, config: ScanConfig) {
        *self.inner.scan_config.write() = config;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.inner.events.subscribe()
    }

    fn emit(&self, event: SchedulerEvent) {
        // 没有订阅者时发送失败是正常的
        let _ = self.inner.events.send(event);
    }

    fn max_concurrent(&self) -> usize {
        self.inner.config.max_concurrent.max(1)
    }

    /// Adds a task. A `scheduled_at` in the future keeps it `Scheduled` until
    /// that time. Must be called from within a tokio runtime.
    pub fn submit(
        &self,
        name: impl Into<String>,
        targets: Vec<String>,
        templates: Vec<PathBuf>,
        priority: TaskPriority,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> TaskId {
        let task = Task::new(name, targets, templates, priority, scheduled_at);
        let task_id = task.id.clone();
        let wake_at = task.scheduled_at;

        {
            let mut state = self.inner.state.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            info!(
                "Task added: {} - {} (priority: {}, status: {})",
                task.id, task.name, task.priority, task.status
            );
            state.order.push(task_id.clone());
            state.entries.insert(
                task_id.clone(),
                Entry {
                    task,
                    seq,
                    results: Vec::new(),
                    control: None,
                    handle: None,
                },
            );
        }
        self.emit(SchedulerEvent::TaskAdded { task_id: task_id.clone() });

        match wake_at {
            Some(at) => self.schedule_wakeup(task_id.clone(), at),
            None if self.inner.config.auto_start => {
                self.dispatch();
            }
            None => {}
        }

        task_id
    }

    fn schedule_wakeup(&self, task_id: TaskId, at: DateTime<Utc>) {
        let delay = (at - Utc::now()).to_std().unwrap_or_default();
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                Scheduler { inner }.promote(&task_id);
            }
        });
    }

    /// 定时任务到点后转为 Pending 并尝试调度
    fn promote(&self, task_id: &str) {
        let promoted = {
            let mut state = self.inner.state.lock();
            match state.entry_mut(task_id) {
                Ok(entry) if entry.task.status == TaskStatus::Scheduled => {
                    entry.task.status = TaskStatus::Pending;
                    true
                }
                _ => false,
            }
        };

        if promoted {
            debug!("Scheduled task {} is now pending", task_id);
            self.emit(SchedulerEvent::StatusChanged {
                task_id: task_id.to_string(),
                status: TaskStatus::Pending,
            });
            self.dispatch();
        }
    }

    /// Fills free slots with the best pending tasks. Returns how many started.
    pub fn dispatch(&self) -> usize {
        let mut started = 0;
        let mut state = self.inner.state.lock();
        while state.active_count() < self.max_concurrent() {
            let Some(task_id) = state.next_pending() else {
                break;
            };
            match self.start_locked(&mut state, &task_id) {
                Ok(()) => started += 1,
                Err(e) => {
                    error!("Failed to start task {}: {}", task_id, e);
                    break;
                }
            }
        }
        started
    }

    /// Starts a pending or scheduled task now, if a slot is free.
    pub fn start(&self, task_id: &str) -> bool {
        let mut state = self.inner.state.lock();
        match self.start_locked(&mut state, task_id) {
            Ok(()) => true,
            Err(e) => {
                debug!("start({}) rejected: {}", task_id, e);
                false
            }
        }
    }

    fn start_locked(&self, state: &mut State, task_id: &str) -> Result<(), SchedulerError> {
        let active = state.active_count();
        let max = self.max_concurrent();
        let entry = state.entry_mut(task_id)?;

        if !entry.task.status.can_transition_to(TaskStatus::Running) || entry.task.status.is_active() {
            return Err(SchedulerError::InvalidTransition {
                from: entry.task.status,
                to: TaskStatus::Running,
            });
        }
        if active >= max {
            return Err(SchedulerError::NoFreeSlot(active));
        }

        transition(&mut entry.task, TaskStatus::Running)?;
        entry.task.started_at = Some(Utc::now());
        entry.task.progress = 0;

        let control = TaskControl::new();
        entry.control = Some(control.clone());

        let scheduler = self.clone();
        let id = task_id.to_string();
        let targets = entry.task.targets.clone();
        let templates = entry.task.templates.clone();
        entry.handle = Some(tokio::spawn(async move {
            scheduler.run_task(id, targets, templates, control).await;
        }));

        info!("Task started: {} - {}", entry.task.id, entry.task.name);
        self.emit(SchedulerEvent::StatusChanged {
            task_id: task_id.to_string(),
            status: TaskStatus::Running,
        });
        Ok(())
    }

    /// Binds a worker to the task and applies its events until it finishes.
    async fn run_task(self, task_id: TaskId, targets: Vec<String>, templates: Vec<PathBuf>, control: TaskControl) {
        let scan_config = self.inner.scan_config.read().clone();
        let loader_control = control.clone();
        let worker = match tokio::task::spawn_blocking(move || {
            ScanWorker::load(&targets, &templates, scan_config, loader_control)
        })
        .await
        {
            Ok(worker) => worker,
            Err(e) => {
                self.finish(&task_id, &control, Err(format!("failed to prepare worker: {}", e)));
                return;
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let (outcome, ()) = tokio::join!(worker.run(tx), async {
            while let Some(event) = rx.recv().await {
                self.apply(&task_id, &control, event);
            }
        });

        self.finish(&task_id, &control, outcome.map_err(|e| e.to_string()));
    }

    fn apply(&self, task_id: &str, control: &TaskControl, event: ScanEvent) {
        let mut state = self.inner.state.lock();
        let Ok(entry) = state.entry_mut(task_id) else {
            return;
        };
        // 取消后到达的事件全部丢弃
        if control.is_cancelled() || !entry.task.status.is_active() {
            return;
        }

        match event {
            ScanEvent::Result(result) => {
                info!(
                    "[{}] [{}] {} matched at {}",
                    entry.task.name, result.severity, result.template_id, result.matched_url
                );
                entry.results.push(result.clone());
                entry.task.result_count += 1;
                entry.task.vuln_count += 1;
                self.emit(SchedulerEvent::ResultFound {
                    task_id: task_id.to_string(),
                    result,
                });
            }
            ScanEvent::Progress { processed, total, .. } => {
                let percent = if total == 0 { 100 } else { (processed * 100 / total).min(100) as u8 };
                entry.task.progress = entry.task.progress.max(percent);
                self.emit(SchedulerEvent::Progress {
                    task_id: task_id.to_string(),
                    progress: entry.task.progress,
                    processed,
                    total,
                });
            }
            ScanEvent::Log(message) => {
                debug!("[{}] {}", entry.task.name, message);
                self.emit(SchedulerEvent::Log {
                    task_id: task_id.to_string(),
                    message,
                });
            }
        }
    }

    /// Worker completion signal.
    fn finish(&self, task_id: &str, control: &TaskControl, outcome: Result<ScanSummary, String>) {
        let finished = {
            let mut state = self.inner.state.lock();
            let Ok(entry) = state.entry_mut(task_id) else {
                return;
            };
            entry.control = None;
            entry.handle = None;

            // 已被 cancel 强制结束
            if entry.task.status.is_terminal() {
                None
            } else {
                let cancelled = control.is_cancelled() || matches!(&outcome, Ok(s) if s.cancelled);
                let next = match (&outcome, cancelled) {
                    (_, true) => TaskStatus::Cancelled,
                    (Ok(_), false) => TaskStatus::Completed,
                    (Err(_), false) => TaskStatus::Failed,
                };

                match transition(&mut entry.task, next) {
                    Ok(()) => {
                        match (&outcome, next) {
                            (Ok(_), TaskStatus::Completed) => {
                                entry.task.progress = 100;
                                info!("Task completed: {} ({} results)", task_id, entry.task.result_count);
                            }
                            (Err(e), TaskStatus::Failed) => {
                                entry.task.error_message = Some(e.clone());
                                error!("Task failed: {}, error: {}", task_id, e);
                            }
                            _ => info!("Task cancelled: {}", task_id),
                        }
                        Some((entry.task.clone(), entry.results.clone()))
                    }
                    Err(e) => {
                        warn!("Ignoring completion of {}: {}", task_id, e);
                        None
                    }
                }
            }
        };

        if let Some((task, results)) = finished {
            self.persist(&task, &results);
            self.emit(SchedulerEvent::StatusChanged {
                task_id: task.id.clone(),
                status: task.status,
            });
        }
        self.dispatch();
    }

    fn persist(&self, task: &Task, results: &[ScanResult]) {
        if let Some(sink) = &self.inner.sink {
            if let Err(e) = sink.persist(task, results) {
                error!("Failed to persist task {}: {}", task.id, e);
            }
        }
    }

    pub fn pause(&self, task_id: &str) -> bool {
        self.toggle(task_id, TaskStatus::Running, TaskStatus::Paused)
    }

    pub fn resume(&self, task_id: &str) -> bool {
        self.toggle(task_id, TaskStatus::Paused, TaskStatus::Running)
    }

    fn toggle(&self, task_id: &str, from: TaskStatus, to: TaskStatus) -> bool {
        let result = {
            let mut state = self.inner.state.lock();
            state.entry_mut(task_id).and_then(|entry| {
                if entry.task.status != from {
                    return Err(SchedulerError::InvalidTransition {
                        from: entry.task.status,
                        to,
                    });
                }
                if let Some(control) = &entry.control {
                    match to {
                        TaskStatus::Paused => control.pause(),
                        _ => control.resume(),
                    };
                }
                transition(&mut entry.task, to)
            })
        };

        match result {
            Ok(()) => {
                info!("Task {} is now {}", task_id, to);
                self.emit(SchedulerEvent::StatusChanged {
                    task_id: task_id.to_string(),
                    status: to,
                });
                true
            }
            Err(e) => {
                debug!("{} -> {} rejected: {}", task_id, to, e);
                false
            }
        }
    }

    /// Cancels a non-terminal task.
    ///
    /// A bound worker is asked to stop and given `cancel_grace` to do so;
    /// afterwards the task is Cancelled whether or not the worker returned.
    pub async fn cancel(&self, task_id: &str) -> bool {
        let bound = {
            let mut state = self.inner.state.lock();
            let entry = match state.entry_mut(task_id) {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("cancel rejected: {}", e);
                    return false;
                }
            };
            if entry.task.status.is_terminal() {
                debug!("cancel({}) rejected: task already {}", task_id, entry.task.status);
                return false;
            }

            match &entry.control {
                Some(control) => {
                    control.cancel();
                    Some(entry.handle.take())
                }
                None => None,
            }
        };

        if let Some(Some(handle)) = bound {
            let grace = self.inner.config.cancel_grace();
            if timeout(grace, handle).await.is_err() {
                warn!("Worker of task {} did not stop within {:?}, forcing cancel", task_id, grace);
            }
        }

        let finished = {
            let mut state = self.inner.state.lock();
            match state.entry_mut(task_id) {
                Ok(entry) if !entry.task.status.is_terminal() => {
                    entry.control = None;
                    entry.handle = None;
                    match transition(&mut entry.task, TaskStatus::Cancelled) {
                        Ok(()) => Some((entry.task.clone(), entry.results.clone())),
                        Err(e) => {
                            warn!("cancel({}): {}", task_id, e);
                            None
                        }
                    }
                }
                _ => None,
            }
        };

        if let Some((task, results)) = finished {
            info!("Task cancelled: {}", task_id);
            self.persist(&task, &results);
            self.emit(SchedulerEvent::StatusChanged {
                task_id: task.id.clone(),
                status: TaskStatus::Cancelled,
            });
        }
        self.dispatch();
        true
    }

    /// Changes the priority of a task that has not started yet.
    pub fn change_priority(&self, task_id: &str, priority: TaskPriority) -> bool {
        let mut state = self.inner.state.lock();
        match state.entry_mut(task_id) {
            Ok(entry) if matches!(entry.task.status, TaskStatus::Pending | TaskStatus::Scheduled) => {
                entry.task.priority = priority;
                info!("Task {} priority changed to {}", task_id, priority);
                true
            }
            _ => false,
        }
    }

    /// Removes a finished task. Non-terminal tasks must be cancelled first.
    pub fn remove(&self, task_id: &str) -> bool {
        let removed = {
            let mut state = self.inner.state.lock();
            match state.entries.get(task_id) {
                Some(entry) if entry.task.status.is_terminal() => {
                    state.entries.remove(task_id);
                    state.order.retain(|id| id != task_id);
                    true
                }
                _ => false,
            }
        };

        if removed {
            self.emit(SchedulerEvent::TaskRemoved {
                task_id: task_id.to_string(),
            });
        }
        removed
    }

    /// Removes every completed, cancelled or failed task.
    pub fn clear_finished(&self) -> usize {
        let finished: Vec<TaskId> = self
            .list()
            .into_iter()
            .filter(|t| t.status.is_terminal())
            .map(|t| t.id)
            .collect();
        finished.iter().filter(|id| self.remove(id)).count()
    }

    pub fn get(&self, task_id: &str) -> Option<Task> {
        self.inner.state.lock().entries.get(task_id).map(|e| e.task.clone())
    }

    /// All tasks in submission order.
    pub fn list(&self) -> Vec<Task> {
        let state = self.inner.state.lock();
        state
            .order
            .iter()
            .filter_map(|id| state.entries.get(id))
            .map(|e| e.task.clone())
            .collect()
    }

    pub fn results(&self, task_id: &str) -> Option<Vec<ScanResult>> {
        self.inner.state.lock().entries.get(task_id).map(|e| e.results.clone())
    }

    pub fn tasks_by_status(&self, status: TaskStatus) -> Vec<Task> {
        self.list().into_iter().filter(|t| t.status == status).collect()
    }

    pub fn queue_stats(&self) -> QueueStats {
        let state = self.inner.state.lock();
        let mut stats = QueueStats {
            total: state.entries.len(),
            ..Default::default()
        };
        for entry in state.entries.values() {
            match entry.task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Scheduled => stats.scheduled += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Paused => stats.paused += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
                TaskStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// Waits until the task reaches a terminal state. `None` if it does not exist.
    pub async fn wait(&self, task_id: &str) -> Option<Task> {
        let mut events = self.subscribe();
        loop {
            let task = self.get(task_id)?;
            if task.status.is_terminal() {
                return Some(task);
            }
            match events.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return self.get(task_id),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn scheduler(max_concurrent: usize) -> Scheduler {
        Scheduler::new(
            SchedulerConfig {
                max_concurrent,
                ..Default::default()
            },
            ScanConfig::default(),
        )
    }

    fn submit(s: &Scheduler, name: &str, priority: TaskPriority) -> TaskId {
        s.submit(name, Vec::new(), Vec::new(), priority, None)
    }

    #[tokio::test]
    async fn higher_priority_starts_first() {
        let s = scheduler(1);
        let mut events = s.subscribe();

        let low = submit(&s, "A", TaskPriority::Low);
        tokio::time::sleep(Duration::from_millis(2)).await;
        let critical = submit(&s, "B", TaskPriority::Critical);
        assert_eq!(s.get(&low).unwrap().status, TaskStatus::Pending);

        assert_eq!(s.dispatch(), 1);
        assert_eq!(s.get(&critical).unwrap().status, TaskStatus::Running);
        assert_eq!(s.get(&low).unwrap().status, TaskStatus::Pending);

        s.wait(&low).await.unwrap();

        let mut started = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let SchedulerEvent::StatusChanged { task_id, status: TaskStatus::Running } = event {
                started.push(task_id);
            }
        }
        assert_eq!(started, vec![critical, low]);
    }

    #[tokio::test]
    async fn fifo_within_a_priority() {
        let s = scheduler(1);
        let first = submit(&s, "first", TaskPriority::High);
        let second = submit(&s, "second", TaskPriority::High);

        assert_eq!(s.dispatch(), 1);
        assert_eq!(s.get(&first).unwrap().status, TaskStatus::Running);
        assert_eq!(s.get(&second).unwrap().status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn empty_task_completes_at_full_progress() {
        let s = scheduler(1);
        let id = submit(&s, "empty", TaskPriority::Normal);
        assert!(s.start(&id));
        assert!(!s.start(&id));

        let task = s.wait(&id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.progress, 100);
        assert!(task.started_at.is_some());
        assert!(task.completed_at.is_some());
        assert_eq!(s.results(&id), Some(Vec::new()));
    }

    #[tokio::test]
    async fn pause_and_resume_require_matching_state() {
        let s = scheduler(1);
        let id = submit(&s, "idle", TaskPriority::Normal);
        assert!(!s.pause(&id));
        assert!(!s.resume(&id));
        assert!(!s.pause("missing"));
        assert_eq!(s.get(&id).unwrap().status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn cancel_pending_and_remove() {
        let s = scheduler(1);
        let id = submit(&s, "doomed", TaskPriority::Normal);
        assert!(!s.remove(&id));

        assert!(s.cancel(&id).await);
        assert_eq!(s.get(&id).unwrap().status, TaskStatus::Cancelled);
        assert!(!s.cancel(&id).await);
        assert!(!s.change_priority(&id, TaskPriority::High));

        assert!(s.remove(&id));
        assert!(s.get(&id).is_none());
        assert!(!s.cancel(&id).await);
    }

    #[tokio::test]
    async fn change_priority_only_before_start() {
        let s = scheduler(1);
        let a = submit(&s, "a", TaskPriority::Background);
        let b = submit(&s, "b", TaskPriority::Normal);

        assert!(s.change_priority(&a, TaskPriority::Critical));
        assert_eq!(s.dispatch(), 1);
        assert_eq!(s.get(&a).unwrap().status, TaskStatus::Running);
        assert_eq!(s.get(&b).unwrap().status, TaskStatus::Pending);
        assert!(!s.change_priority(&a, TaskPriority::Low));
    }

    #[tokio::test]
    async fn scheduled_task_is_promoted_when_due() {
        let s = scheduler(1);
        let at = Utc::now() + chrono::Duration::milliseconds(150);
        let id = s.submit("later", Vec::new(), Vec::new(), TaskPriority::Normal, Some(at));
        assert_eq!(s.get(&id).unwrap().status, TaskStatus::Scheduled);

        // Scheduled 任务不参与普通调度
        assert_eq!(s.dispatch(), 0);

        let task = tokio::time::timeout(Duration::from_secs(5), s.wait(&id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.scheduled_at, Some(at));
        assert!(task.started_at.is_some());
    }

    #[tokio::test]
    async fn stats_and_clear_finished() {
        let s = scheduler(2);
        let done = submit(&s, "done", TaskPriority::Normal);
        let cancelled = submit(&s, "cancelled", TaskPriority::Normal);
        let _waiting = s.submit(
            "waiting",
            Vec::new(),
            Vec::new(),
            TaskPriority::Normal,
            Some(Utc::now() + chrono::Duration::hours(1)),
        );

        assert!(s.start(&done));
        assert!(s.cancel(&cancelled).await);
        s.wait(&done).await.unwrap();

        let stats = s.queue_stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.scheduled, 1);
        assert_eq!(s.tasks_by_status(TaskStatus::Scheduled).len(), 1);

        assert_eq!(s.clear_finished(), 2);
        let names: Vec<String> = s.list().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["waiting"]);
    }

    #[tokio::test]
    async fn auto_start_dispatches_on_submit() {
        let s = Scheduler::new(
            SchedulerConfig {
                auto_start: true,
                ..Default::default()
            },
            ScanConfig::default(),
        );
        let id = submit(&s, "auto", TaskPriority::Normal);
        let task = s.wait(&id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
    }
}
