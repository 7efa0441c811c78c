// 学者数据抓取模块
//
// GoogleScholarClient 只做单次请求；限流和重试以装饰器的方式叠加：
// `client.with_rate_limit(limiter).with_retry(policy, sleeper)`

pub mod client;
pub mod clock;
pub mod rate_limit;
pub mod retry;

use crate::error::FetchError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use client::{
    extract_scholar_id, parse_profile, profile_url, GoogleScholarClient, UNKNOWN_SCHOLAR,
};
pub use clock::{Clock, ManualClock, Sleeper, SystemClock};
pub use rate_limit::{RateLimitedFetcher, RateLimiter};
pub use retry::{RetryPolicy, RetryingFetcher};

/// 一次抓取的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScholarInfo {
    pub name: String,
    pub citation_count: i64,
}

/// 学者信息抓取接口
#[async_trait]
pub trait ScholarFetcher: Send + Sync {
    async fn fetch(&self, scholar_id: &str) -> Result<ScholarInfo, FetchError>;
}

#[async_trait]
impl<T: ScholarFetcher + ?Sized> ScholarFetcher for Arc<T> {
    async fn fetch(&self, scholar_id: &str) -> Result<ScholarInfo, FetchError> {
        (**self).fetch(scholar_id).await
    }
}

/// 装饰器组合
pub trait ScholarFetcherExt: ScholarFetcher + Sized {
    fn with_rate_limit(self, limiter: Arc<RateLimiter>) -> RateLimitedFetcher<Self> {
        RateLimitedFetcher::new(self, limiter)
    }

    fn with_retry(self, policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> RetryingFetcher<Self> {
        RetryingFetcher::new(self, policy, sleeper)
    }
}

impl<T: ScholarFetcher + Sized> ScholarFetcherExt for T {}
