//! Locale identifiers and the user-facing message catalog

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("unsupported locale: {0}")]
pub struct UnsupportedLocale(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Zh,
}

impl Locale {
    pub fn code(&self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Zh => "zh",
        }
    }

    /// Parse a locale tag, falling back to English for anything unknown.
    ///
    /// Region subtags are ignored: `zh-CN` and `zh_TW` both map to [`Locale::Zh`].
    pub fn resolve(tag: &str) -> Self {
        tag.parse().unwrap_or_default()
    }

    pub fn request_failed(&self, status: u16) -> String {
        match self {
            Locale::En => format!("Request failed (HTTP {})", status),
            Locale::Zh => format!("请求失败 (HTTP {})", status),
        }
    }

    pub fn request_timeout(&self, endpoint: &str, waited: Duration) -> String {
        let secs = waited.as_secs_f64();
        match self {
            Locale::En => format!(
                "Request to {} timed out after {:.1}s. The backend may still be working; try again or use cached data.",
                endpoint, secs
            ),
            Locale::Zh => format!(
                "请求 {} 在 {:.1} 秒后超时。后端可能仍在处理，请稍后重试或使用缓存数据。",
                endpoint, secs
            ),
        }
    }

    pub fn request_cancelled(&self, endpoint: &str) -> String {
        match self {
            Locale::En => format!("Request to {} was cancelled", endpoint),
            Locale::Zh => format!("请求 {} 已取消", endpoint),
        }
    }

    pub fn unexpected_response(&self, endpoint: &str) -> String {
        match self {
            Locale::En => format!("Unexpected response from {}", endpoint),
            Locale::Zh => format!("{} 返回了无法识别的响应", endpoint),
        }
    }

    pub fn scan_completed(&self, count: u64) -> String {
        match self {
            Locale::En => format!("Scan completed: {} resources found", count),
            Locale::Zh => format!("扫描完成：发现 {} 个资源", count),
        }
    }

    pub fn scan_failed(&self, error: Option<&str>) -> String {
        match (self, error) {
            (Locale::En, Some(error)) => format!("Scan failed: {}", error),
            (Locale::En, None) => "Scan failed".to_string(),
            (Locale::Zh, Some(error)) => format!("扫描失败：{}", error),
            (Locale::Zh, None) => "扫描失败".to_string(),
        }
    }

    pub fn job_lost(&self, polls: u32) -> String {
        match self {
            Locale::En => format!("Job status unavailable after {} checks", polls),
            Locale::Zh => format!("检查 {} 次后仍无法获取任务状态", polls),
        }
    }
}

impl FromStr for Locale {
    type Err = UnsupportedLocale;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let primary = s
            .trim()
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_lowercase();

        match primary.as_str() {
            "en" => Ok(Locale::En),
            "zh" => Ok(Locale::Zh),
            _ => Err(UnsupportedLocale(s.to_string())),
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
