//! 监控核心模块
//!
//! 组合站点注册表、检测执行器和调度器，对外提供控制接口和只读快照

pub mod history;
pub mod registry;
pub mod stats;

pub use history::{HistoryLedger, Timeline, TimelineEvent};
pub use registry::{filter_sites, Endpoint, EndpointRegistry, EndpointSnapshot};
pub use stats::Summary;

use crate::config::{Config, GlobalConfig};
use crate::error::{MonitorError, Result};
use crate::health::checker::CheckExecutor;
use crate::health::probe::{HttpProbeClient, ProbeClient};
use crate::health::scheduler::{RoundReport, RoundScheduler, Scheduler, SchedulerStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// 事件通道容量
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// 推送给展示层的事件
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// 单个站点状态发生变化（进入检测中或检测完成）
    EndpointUpdated(EndpointSnapshot),
    /// 一轮检测全部完成
    RoundCompleted(RoundReport),
}

/// 监控整体快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    /// 快照时间
    pub taken_at: DateTime<Utc>,
    /// 站点列表，按注册顺序
    pub endpoints: Vec<EndpointSnapshot>,
    /// 最近事件时间线
    pub timeline: Vec<TimelineEvent>,
    /// 汇总统计
    pub summary: Summary,
    /// 调度器状态
    pub scheduler: SchedulerStatus,
}

/// 监控参数
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    /// 调度间隔
    pub check_interval: Duration,
    /// 单次检测超时时间
    pub request_timeout: Duration,
    /// 时间线默认条数
    pub timeline_limit: usize,
}

impl From<&GlobalConfig> for MonitorSettings {
    fn from(global: &GlobalConfig) -> Self {
        Self {
            check_interval: global.check_interval(),
            request_timeout: global.request_timeout(),
            timeline_limit: global.timeline_limit,
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from(&GlobalConfig::default())
    }
}

/// 站点监控器
pub struct Monitor {
    registry: Arc<EndpointRegistry>,
    scheduler: RoundScheduler,
    events: broadcast::Sender<MonitorEvent>,
    timeline_limit: usize,
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("endpoints", &self.registry.len())
            .field("interval", &self.scheduler.interval())
            .field("timeline_limit", &self.timeline_limit)
            .finish()
    }
}

impl Monitor {
    /// 创建新的监控器
    ///
    /// # 参数
    /// * `registry` - 已注册好站点的注册表
    /// * `probe` - 探测客户端
    /// * `settings` - 监控参数
    pub fn new(
        registry: EndpointRegistry,
        probe: Arc<dyn ProbeClient>,
        settings: MonitorSettings,
    ) -> Result<Self> {
        if settings.timeline_limit == 0 {
            return Err(MonitorError::InvalidTimelineLimit.into());
        }

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let registry = Arc::new(registry);
        let executor =
            Arc::new(CheckExecutor::new(probe, settings.request_timeout)?.with_events(events.clone()));
        let scheduler = RoundScheduler::new(
            Arc::clone(&registry),
            executor,
            settings.check_interval,
            events.clone(),
        )?;

        Ok(Self {
            registry,
            scheduler,
            events,
            timeline_limit: settings.timeline_limit,
        })
    }

    /// 根据配置创建使用HTTP探测的监控器
    pub fn from_config(config: &Config) -> Result<Self> {
        let registry = EndpointRegistry::from_sites(&config.sites, config.global.history_capacity)?;
        let probe = Arc::new(HttpProbeClient::new(&config.global.user_agent)?);
        Self::new(registry, probe, MonitorSettings::from(&config.global))
    }

    /// 开启自动刷新，使用当前调度间隔
    pub async fn start(&self) -> Result<()> {
        self.scheduler.start(self.scheduler.interval()).await
    }

    /// 关闭自动刷新
    pub async fn stop(&self) -> Result<()> {
        self.scheduler.stop().await
    }

    /// 手动触发一轮检测
    pub async fn run_round(&self) -> Result<RoundReport> {
        self.scheduler.run_round().await
    }

    /// 修改调度间隔
    pub async fn set_interval(&self, interval: Duration) -> Result<()> {
        self.scheduler.set_interval(interval).await
    }

    /// 是否处于自动刷新状态
    pub async fn is_running(&self) -> bool {
        self.scheduler.get_status().await.is_running
    }

    /// 订阅站点更新和轮次完成事件
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    /// 当前汇总统计
    pub async fn summary(&self) -> Summary {
        Summary::from_endpoints(&self.registry.snapshot().await)
    }

    /// 最近 `limit` 条合并事件
    pub async fn timeline(&self, limit: usize) -> Timeline {
        self.registry.timeline(limit).await
    }

    /// 调度器状态
    pub async fn scheduler_status(&self) -> SchedulerStatus {
        self.scheduler.get_status().await
    }

    /// 生成完整快照，统计和时间线基于同一份站点快照计算
    pub async fn snapshot(&self) -> MonitorSnapshot {
        let endpoints = self.registry.snapshot().await;
        let timeline = Timeline::from_snapshots(&endpoints, self.timeline_limit).to_vec();
        let summary = Summary::from_endpoints(&endpoints);

        MonitorSnapshot {
            taken_at: Utc::now(),
            endpoints,
            timeline,
            summary,
            scheduler: self.scheduler.get_status().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;

    #[test]
    fn test_settings_from_global_config() {
        let settings = MonitorSettings::default();
        assert_eq!(settings.check_interval, Duration::from_secs(30));
        assert_eq!(settings.request_timeout, Duration::from_millis(6000));
        assert_eq!(settings.timeline_limit, 10);
    }

    #[tokio::test]
    async fn test_from_config_builds_registry() {
        let config = Config {
            global: GlobalConfig::default(),
            sites: vec![SiteConfig {
                id: Some("blog".to_string()),
                name: "Blog".to_string(),
                url: "https://example.com".to_string(),
                description: None,
            }],
        };

        let monitor = Monitor::from_config(&config).unwrap();
        assert_eq!(monitor.registry().len(), 1);
        assert!(!monitor.is_running().await);

        let snapshot = monitor.snapshot().await;
        assert_eq!(snapshot.summary.total, 1);
        assert_eq!(snapshot.summary.checking, 1);
        assert!(snapshot.timeline.is_empty());
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let probe: Arc<dyn ProbeClient> = Arc::new(HttpProbeClient::new("test").unwrap());
        let registry = || EndpointRegistry::new(10).unwrap();

        let err = tokio_test::assert_err!(Monitor::new(
            registry(),
            Arc::clone(&probe),
            MonitorSettings {
                timeline_limit: 0,
                ..MonitorSettings::default()
            },
        ));
        assert!(matches!(
            err,
            crate::error::SiteVitalsError::Monitor(MonitorError::InvalidTimelineLimit)
        ));
        tokio_test::assert_err!(Monitor::new(
            registry(),
            Arc::clone(&probe),
            MonitorSettings {
                check_interval: Duration::ZERO,
                ..MonitorSettings::default()
            },
        ));

        let monitor = tokio_test::assert_ok!(Monitor::new(
            registry(),
            probe,
            MonitorSettings::default()
        ));
        // 空注册表也可以完成一轮
        let summary = tokio_test::block_on(async {
            monitor.run_round().await.unwrap();
            monitor.summary().await
        });
        assert_eq!(summary.total, 0);
        assert_eq!(summary.uptime_pct, 0.0);
    }

    #[test]
    fn test_debug_output_summarizes_monitor() {
        let probe: Arc<dyn ProbeClient> = Arc::new(HttpProbeClient::new("test").unwrap());
        let monitor =
            Monitor::new(EndpointRegistry::new(10).unwrap(), probe, MonitorSettings::default())
                .unwrap();
        let debug = format!("{monitor:?}");
        assert!(debug.contains("endpoints: 0"));
        assert!(debug.contains("timeline_limit: 10"));
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let report = RoundReport {
            round: 1,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            online: 0,
            offline: 0,
            results: vec![],
        };
        let json = serde_json::to_string(&MonitorEvent::RoundCompleted(report)).unwrap();
        assert!(json.contains("\"type\":\"round_completed\""));
    }
}
