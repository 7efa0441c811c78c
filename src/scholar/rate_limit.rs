// 全局限流 - 所有调用方共享一个"上次请求时间"，两次出站请求之间至少间隔 min_interval

use super::clock::{Clock, Sleeper};
use super::{ScholarFetcher, ScholarInfo};
use crate::error::FetchError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub struct RateLimiter {
    min_interval: Duration,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    /// 持锁期间完成"检查-等待-登记"，并发调用方在锁上排队
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration, clock: Arc<dyn Clock>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            min_interval,
            clock,
            sleeper,
            last_request: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// 等到距上次请求满 min_interval 后登记本次请求，返回实际等待的时长
    pub async fn acquire(&self) -> Duration {
        let mut last = self.last_request.lock().await;

        let mut waited = Duration::ZERO;
        if let Some(previous) = *last {
            let elapsed = self.clock.now().saturating_duration_since(previous);
            if elapsed < self.min_interval {
                waited = self.min_interval - elapsed;
                tracing::debug!("限流等待 {:?}", waited);
                self.sleeper.sleep(waited).await;
            }
        }

        *last = Some(self.clock.now());
        waited
    }
}

/// 限流装饰器：每次抓取前先通过共享的 RateLimiter
pub struct RateLimitedFetcher<F> {
    inner: F,
    limiter: Arc<RateLimiter>,
}

impl<F> RateLimitedFetcher<F> {
    pub fn new(inner: F, limiter: Arc<RateLimiter>) -> Self {
        Self { inner, limiter }
    }
}

#[async_trait]
impl<F: ScholarFetcher> ScholarFetcher for RateLimitedFetcher<F> {
    async fn fetch(&self, scholar_id: &str) -> Result<ScholarInfo, FetchError> {
        self.limiter.acquire().await;
        self.inner.fetch(scholar_id).await
    }
}
