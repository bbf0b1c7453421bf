//! 检测结果数据结构
//!
//! 定义站点状态枚举、历史事件和单次检测结果

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 站点状态枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteStatus {
    /// 检测进行中，也是首次检测完成前的初始状态
    Checking,
    /// 站点在线
    Online,
    /// 站点离线
    Offline,
}

impl std::fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SiteStatus::Checking => write!(f, "检测中"),
            SiteStatus::Online => write!(f, "在线"),
            SiteStatus::Offline => write!(f, "离线"),
        }
    }
}

impl SiteStatus {
    /// 判断是否在线
    pub fn is_online(&self) -> bool {
        matches!(self, SiteStatus::Online)
    }

    /// 判断是否为已完成检测的终态
    pub fn is_settled(&self) -> bool {
        !matches!(self, SiteStatus::Checking)
    }
}

/// 响应时间分级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatencyClass {
    /// 小于1秒
    Fast,
    /// 1秒到3秒
    Medium,
    /// 3秒及以上
    Slow,
}

impl LatencyClass {
    /// 根据响应时间（毫秒）分级
    pub fn classify(response_time_ms: u64) -> Self {
        match response_time_ms {
            0..=999 => LatencyClass::Fast,
            1000..=2999 => LatencyClass::Medium,
            _ => LatencyClass::Slow,
        }
    }
}

impl std::fmt::Display for LatencyClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LatencyClass::Fast => write!(f, "fast"),
            LatencyClass::Medium => write!(f, "medium"),
            LatencyClass::Slow => write!(f, "slow"),
        }
    }
}

/// 历史事件，记录一次已完成的检测
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEvent {
    /// 检测完成时间
    pub timestamp: DateTime<Utc>,
    /// 检测结果状态（Online或Offline）
    pub status: SiteStatus,
    /// 响应时间（毫秒），仅在线时存在
    pub response_time_ms: Option<u64>,
}

impl HistoryEvent {
    /// 创建在线事件
    pub fn online(timestamp: DateTime<Utc>, response_time_ms: u64) -> Self {
        Self {
            timestamp,
            status: SiteStatus::Online,
            response_time_ms: Some(response_time_ms),
        }
    }

    /// 创建离线事件
    pub fn offline(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            status: SiteStatus::Offline,
            response_time_ms: None,
        }
    }
}

/// 单次检测结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    /// 站点ID
    pub endpoint_id: String,
    /// 站点URL
    pub url: String,
    /// 检测完成时间
    pub checked_at: DateTime<Utc>,
    /// 检测结论
    pub status: SiteStatus,
    /// 实际耗时，无论成功与否都会记录
    #[serde(with = "duration_serde")]
    pub elapsed: Duration,
    /// HTTP状态码（如果有）
    pub status_code: Option<u16>,
    /// 错误信息（如果有）
    pub error_message: Option<String>,
}

impl CheckResult {
    /// 创建新的检测结果
    pub fn new(endpoint_id: String, url: String, status: SiteStatus) -> Self {
        Self {
            endpoint_id,
            url,
            checked_at: Utc::now(),
            status,
            elapsed: Duration::from_millis(0),
            status_code: None,
            error_message: None,
        }
    }

    /// 设置检测完成时间
    pub fn with_checked_at(mut self, checked_at: DateTime<Utc>) -> Self {
        self.checked_at = checked_at;
        self
    }

    /// 设置实际耗时
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    /// 设置HTTP状态码
    pub fn with_status_code(mut self, status_code: Option<u16>) -> Self {
        self.status_code = status_code;
        self
    }

    /// 设置错误信息
    pub fn with_error(mut self, error_message: String) -> Self {
        self.error_message = Some(error_message);
        self
    }

    /// 对外可见的响应时间（毫秒），离线时为空
    pub fn response_time_ms(&self) -> Option<u64> {
        if self.status.is_online() {
            Some(self.elapsed.as_millis() as u64)
        } else {
            None
        }
    }

    /// 转换为历史事件
    pub fn to_history_event(&self) -> HistoryEvent {
        match self.response_time_ms() {
            Some(ms) => HistoryEvent::online(self.checked_at, ms),
            None => HistoryEvent::offline(self.checked_at),
        }
    }
}

/// Duration序列化模块
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
