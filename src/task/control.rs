// src/task/control.rs
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Cooperative pause / stop switch shared between the scheduler and a worker.
///
/// The worker only looks at it between units, so a pause never interrupts a
/// request that is already in flight. Cancellation always wins over a pause.
#[derive(Debug, Clone)]
pub struct TaskControl {
    cancel: CancellationToken,
    paused: Arc<watch::Sender<bool>>,
}

/// Returned by [`TaskControl::checkpoint`] once the task was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl Default for TaskControl {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskControl {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            cancel: CancellationToken::new(),
            paused: Arc::new(paused),
        }
    }

    /// Returns false if the task was already paused.
    pub fn pause(&self) -> bool {
        self.paused.send_if_modified(|paused| !std::mem::replace(paused, true))
    }

    /// Returns false if the task was not paused.
    pub fn resume(&self) -> bool {
        self.paused.send_if_modified(|paused| std::mem::replace(paused, false))
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// 单元之间的检查点：暂停时在这里等待，取消时立即返回
    pub async fn checkpoint(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            return Err(Cancelled);
        }

        let mut paused = self.paused.subscribe();
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Cancelled),
            res = paused.wait_for(|p| !*p) => match res {
                Ok(_) => Ok(()),
                // sender lives in self, cannot be dropped here
                Err(_) => Err(Cancelled),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn pause_and_resume_report_changes() {
        let control = TaskControl::new();
        assert!(!control.resume());
        assert!(control.pause());
        assert!(!control.pause());
        assert!(control.is_paused());
        assert!(control.resume());
        assert!(!control.is_paused());
    }

    #[tokio::test]
    async fn checkpoint_waits_while_paused() {
        let control = TaskControl::new();
        control.pause();

        let waiter = control.clone();
        let handle = tokio::spawn(async move { waiter.checkpoint().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        control.resume();
        let res = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert_eq!(res, Ok(()));
    }

    #[tokio::test]
    async fn cancel_interrupts_a_paused_checkpoint() {
        let control = TaskControl::new();
        control.pause();

        let waiter = control.clone();
        let handle = tokio::spawn(async move { waiter.checkpoint().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        control.cancel();
        let res = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert_eq!(res, Err(Cancelled));
        assert_eq!(control.checkpoint().await, Err(Cancelled));
    }
}
