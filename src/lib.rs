//! Site Vitals - 网站可用性与延迟监控工具
//!
//! 按固定间隔并发探测一组站点，记录：
//! - 每个站点的当前状态和响应时间
//! - 有界的历史事件和合并时间线
//! - 在线率、平均响应时间等汇总统计

pub mod cli;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod monitor;

// 重新导出主要类型
pub use config::{Config, GlobalConfig, SiteConfig};
pub use error::{Result, SiteVitalsError};
pub use health::{CheckResult, HttpProbeClient, ProbeClient, ProbeResponse, SiteStatus};
pub use monitor::{Monitor, MonitorEvent, MonitorSettings, MonitorSnapshot, Summary};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
