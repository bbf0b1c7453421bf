//! 检测执行器
//!
//! 对单个站点执行一次带超时的探测，并把结果转换为状态变更和历史事件

use crate::error::{MonitorError, ProbeError};
use crate::health::probe::{ProbeClient, ProbeResponse};
use crate::health::result::{CheckResult, SiteStatus};
use crate::monitor::registry::Endpoint;
use crate::monitor::MonitorEvent;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

/// 检测执行器
pub struct CheckExecutor {
    /// 探测客户端
    probe: Arc<dyn ProbeClient>,
    /// 单次检测超时时间
    timeout: Duration,
    /// 状态变更事件发送器
    events: Option<broadcast::Sender<MonitorEvent>>,
}

impl CheckExecutor {
    /// 创建新的检测执行器
    ///
    /// # 参数
    /// * `probe` - 探测客户端
    /// * `timeout` - 单次检测超时时间，必须大于0
    pub fn new(probe: Arc<dyn ProbeClient>, timeout: Duration) -> Result<Self, MonitorError> {
        if timeout.is_zero() {
            return Err(MonitorError::InvalidTimeout);
        }

        Ok(Self {
            probe,
            timeout,
            events: None,
        })
    }

    /// 设置事件发送器，每次站点状态变化后发布快照
    pub fn with_events(mut self, events: broadcast::Sender<MonitorEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 检测单个站点
    ///
    /// 探测错误、非成功状态和超时都会被归类为离线，不会向调用方返回错误
    pub async fn check(&self, endpoint: &RwLock<Endpoint>) -> CheckResult {
        let (id, url) = {
            let mut guard = endpoint.write().await;
            guard.mark_checking();
            self.publish(|| MonitorEvent::EndpointUpdated(guard.snapshot()));
            (guard.id().to_string(), guard.url().to_string())
        };

        debug!("开始检测站点: {} ({})", id, url);
        let start_time = Instant::now();

        // 探测客户端自身也会遵守截止时间，这里再兜底一次，防止实现挂起
        let outcome = match timeout(self.timeout, self.probe.probe(&url, self.timeout)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProbeError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        };

        let elapsed = start_time.elapsed();
        let result = Self::classify(id, url, outcome, elapsed);

        {
            let mut guard = endpoint.write().await;
            guard.apply(&result);
            self.publish(|| MonitorEvent::EndpointUpdated(guard.snapshot()));
        }

        match result.status {
            SiteStatus::Online => debug!(
                "站点检测正常: {} - {}ms",
                result.endpoint_id,
                result.elapsed.as_millis()
            ),
            _ => warn!(
                "站点检测失败: {},{}",
                result.endpoint_id,
                result.error_message.as_deref().unwrap_or("N/A")
            ),
        }

        result
    }

    /// 把探测结果转换为检测结论
    fn classify(
        id: String,
        url: String,
        outcome: Result<ProbeResponse, ProbeError>,
        elapsed: Duration,
    ) -> CheckResult {
        let checked_at = Utc::now();

        match outcome {
            Ok(response) if response.ok => CheckResult::new(id, url, SiteStatus::Online)
                .with_checked_at(checked_at)
                .with_elapsed(elapsed)
                .with_status_code(response.status_code),
            Ok(response) => {
                let message = response.error.unwrap_or_else(|| match response.status_code {
                    Some(status_code) => ProbeError::UnexpectedStatus { status_code }.to_string(),
                    None => "站点不可达".to_string(),
                });
                CheckResult::new(id, url, SiteStatus::Offline)
                    .with_checked_at(checked_at)
                    .with_elapsed(elapsed)
                    .with_status_code(response.status_code)
                    .with_error(message)
            }
            Err(e) => CheckResult::new(id, url, SiteStatus::Offline)
                .with_checked_at(checked_at)
                .with_elapsed(elapsed)
                .with_error(e.to_string()),
        }
    }

    fn publish(&self, event: impl FnOnce() -> MonitorEvent) {
        if let Some(events) = &self.events {
            // 没有订阅者时发送失败是正常情况
            let _ = events.send(event());
        }
    }
}
