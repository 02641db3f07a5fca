//! 生命周期计时器：到期后无条件结束进程，不等待进行中的请求。

use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// 启动时创建的一次性倒计时，没有取消入口。
#[derive(Debug)]
pub struct LifecycleTimer {
    timeout: Duration,
}

impl LifecycleTimer {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// 等待配置的时长。
    pub async fn countdown(&self) {
        tokio::time::sleep(self.timeout).await;
    }

    /// 在独立任务中倒计时，到期后记录日志并调用 `on_expire`。
    pub fn spawn<F>(self, on_expire: F) -> JoinHandle<()>
    where
        F: FnOnce() + Send + 'static,
    {
        tokio::spawn(async move {
            self.countdown().await;
            info!(
                minutes = self.timeout.as_secs() / 60,
                "file server timed out, exiting"
            );
            on_expire();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test(start_paused = true)]
    async fn fires_only_after_timeout() {
        let (tx, mut rx) = oneshot::channel();
        let handle = LifecycleTimer::new(Duration::from_secs(600)).spawn(move || {
            let _ = tx.send(());
        });

        tokio::time::sleep(Duration::from_secs(599)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        handle.await.expect("timer task");
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn busy_work_does_not_delay_expiry() {
        let (tx, rx) = oneshot::channel();
        let start = tokio::time::Instant::now();
        LifecycleTimer::new(Duration::from_secs(60)).spawn(move || {
            let _ = tx.send(tokio::time::Instant::now());
        });
        let worker = tokio::spawn(async {
            loop {
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
        });

        let fired_at = rx.await.expect("timer fired");
        assert_eq!(fired_at.duration_since(start), Duration::from_secs(60));
        worker.abort();
    }
}
