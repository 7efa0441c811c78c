// Google Scholar 主页客户端
// 单次请求 + 多模式回退解析，不包含重试

use super::{ScholarFetcher, ScholarInfo};
use crate::error::FetchError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use tracing::{debug, info};

const PROFILE_URL_BASE: &str = "https://scholar.google.com/citations";
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
pub const UNKNOWN_SCHOLAR: &str = "Unknown Scholar";

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

static BARE_ID: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").ok());

static URL_ID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_all(&[
        r"user=([A-Za-z0-9_-]+)",
        r"profile/([A-Za-z0-9_-]+)",
    ])
});

static NAME_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_all(&[
        r#"<div id="gsc_prf_in">([^<]+)</div>"#,
        r#"<span id="gsc_prf_in">([^<]+)</span>"#,
        r#"class="gsc_prf_in">([^<]+)<"#,
    ])
});

// 页面结构随语言和版本变化，按顺序尝试
static CITATION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_all(&[
        r#"Citations</a></td><td class="gsc_rsb_std">(\d+)</td>"#,
        r#"Citations</a><td class="gsc_rsb_std">(\d+)</td>"#,
        r#"总引用次数</a></td><td class="gsc_rsb_std">(\d+)</td>"#,
        r#"被引次数</td><td[^>]*>(\d+)</td>"#,
        r#"gsc_rsb_std">(\d+)</td>"#,
    ])
});

fn is_bare_id(value: &str) -> bool {
    BARE_ID.as_ref().is_some_and(|re| re.is_match(value))
}

/// 从用户输入中提取学者ID：支持直接输入ID或 Google Scholar 主页链接
pub fn extract_scholar_id(input: &str) -> Result<String, FetchError> {
    let trimmed = input.trim();

    if trimmed.contains("scholar.google.com") {
        for re in URL_ID_PATTERNS.iter() {
            if let Some(id) = re.captures(trimmed).and_then(|c| c.get(1)) {
                return Ok(id.as_str().to_string());
            }
        }
    }

    if is_bare_id(trimmed) {
        return Ok(trimmed.to_string());
    }

    Err(FetchError::InvalidIdentifier(trimmed.to_string()))
}

/// 学者主页地址
pub fn profile_url(scholar_id: &str) -> String {
    format!("{}?user={}&hl=en", PROFILE_URL_BASE, scholar_id)
}

fn decode_entities(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn first_capture<'a>(patterns: &[Regex], html: &'a str) -> Option<&'a str> {
    patterns
        .iter()
        .find_map(|re| re.captures(html).and_then(|c| c.get(1)))
        .map(|m| m.as_str())
}

/// 解析主页 HTML，提取姓名与总引用数
pub fn parse_profile(body: &[u8]) -> Result<ScholarInfo, FetchError> {
    let html = std::str::from_utf8(body).map_err(|_| FetchError::Parse)?;

    let name = first_capture(&NAME_PATTERNS, html)
        .map(|n| decode_entities(n.trim()))
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| UNKNOWN_SCHOLAR.to_string());

    let citation_count = first_capture(&CITATION_PATTERNS, html)
        .and_then(|c| c.parse::<i64>().ok())
        .ok_or(FetchError::Parse)?;

    Ok(ScholarInfo {
        name,
        citation_count,
    })
}

/// Google Scholar 客户端
#[derive(Clone)]
pub struct GoogleScholarClient {
    client: Client,
}

impl GoogleScholarClient {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl ScholarFetcher for GoogleScholarClient {
    async fn fetch(&self, scholar_id: &str) -> Result<ScholarInfo, FetchError> {
        if !is_bare_id(scholar_id) {
            return Err(FetchError::InvalidIdentifier(scholar_id.to_string()));
        }

        let url = profile_url(scholar_id);
        debug!("请求学者主页: {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Network(format!("HTTP {}", status.as_u16())));
        }

        let body = response.bytes().await?;
        if body.is_empty() {
            return Err(FetchError::NoData);
        }

        let info = parse_profile(&body)?;
        info!(
            "获取学者 {} 成功: {} ({} 次引用)",
            scholar_id, info.name, info.citation_count
        );
        Ok(info)
    }
}
