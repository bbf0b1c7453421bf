//! 站点检测模块
//!
//! 提供HTTP探测、单站点检测执行和轮次调度功能

pub mod checker;
pub mod probe;
pub mod result;
pub mod scheduler;

// 重新导出主要类型
pub use checker::CheckExecutor;
pub use probe::{HttpProbeClient, ProbeClient, ProbeResponse};
pub use result::{CheckResult, HistoryEvent, LatencyClass, SiteStatus};
pub use scheduler::{RoundReport, RoundScheduler, Scheduler, SchedulerStatus};
