// 指数退避重试 - 显式循环，等待通过注入的 Sleeper 完成

use super::clock::Sleeper;
use super::{ScholarFetcher, ScholarInfo};
use crate::error::FetchError;
use crate::models::RetrySettings;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// 第 attempt 次失败后的等待时长：base × 2^(attempt-1)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self::new(
            settings.max_attempts,
            Duration::from_millis(settings.base_delay_ms),
        )
    }
}

/// 重试装饰器：只重试网络错误和空响应，其余错误立即返回
pub struct RetryingFetcher<F> {
    inner: F,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl<F> RetryingFetcher<F> {
    pub fn new(inner: F, policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            inner,
            policy,
            sleeper,
        }
    }
}

#[async_trait]
impl<F: ScholarFetcher> ScholarFetcher for RetryingFetcher<F> {
    async fn fetch(&self, scholar_id: &str) -> Result<ScholarInfo, FetchError> {
        let mut attempt = 1;
        loop {
            match self.inner.fetch(scholar_id).await {
                Ok(info) => return Ok(info),
                Err(e) if !e.is_retryable() || attempt >= self.policy.max_attempts => {
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.policy.delay_after(attempt);
                    warn!(
                        "抓取学者 {} 失败 (第 {}/{} 次): {}，{:?} 后重试",
                        scholar_id, attempt, self.policy.max_attempts, e, delay
                    );
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
