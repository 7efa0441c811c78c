// 同步调度器 - 按配置的间隔定时触发批量刷新
//
// 启动时不立即刷新，第一次刷新发生在一个完整周期之后

use super::cancel::CancelHandle;
use super::orchestrator::SyncOrchestrator;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn};

struct RunningTimer {
    cancel: CancelHandle,
    task: JoinHandle<()>,
    period: Duration,
}

pub struct SyncScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    running: Mutex<Option<RunningTimer>>,
}

impl SyncScheduler {
    pub fn new(orchestrator: Arc<SyncOrchestrator>) -> Self {
        Self {
            orchestrator,
            running: Mutex::new(None),
        }
    }

    /// 启动定时任务；已在运行时忽略
    pub async fn start(&self, period: Duration) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            warn!("同步定时器已在运行，忽略重复启动");
            return;
        }

        let cancel = CancelHandle::new();
        let token = cancel.token();
        let orchestrator = self.orchestrator.clone();

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // 第一次 tick 立即返回，跳过
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        // 批次进行中被 stop 时不强行中断，结果由令牌丢弃
                        orchestrator.refresh_all(&token).await;
                    }
                }
            }
            info!("同步定时任务已退出");
        });

        info!("同步定时器已启动，间隔: {}秒", period.as_secs());
        *running = Some(RunningTimer {
            cancel,
            task,
            period,
        });
    }

    /// 停止定时任务
    pub async fn stop(&self) {
        if let Some(timer) = self.running.lock().await.take() {
            timer.cancel.cancel();
            drop(timer.task);
            info!("同步定时器已停止");
        }
    }

    /// 以新的间隔重启
    pub async fn restart(&self, period: Duration) {
        self.stop().await;
        self.start(period).await;
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// 当前定时器的间隔
    pub async fn period(&self) -> Option<Duration> {
        self.running.lock().await.as_ref().map(|t| t.period)
    }
}
