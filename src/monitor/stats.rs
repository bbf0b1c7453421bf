//! 汇总统计
//!
//! 基于站点快照即时计算，不缓存任何中间状态

use crate::health::result::SiteStatus;
use crate::monitor::registry::EndpointSnapshot;
use serde::{Deserialize, Serialize};

/// 站点汇总统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// 站点总数
    pub total: usize,
    /// 在线站点数
    pub online: usize,
    /// 离线站点数
    pub offline: usize,
    /// 检测中站点数（含尚未完成首次检测的站点）
    pub checking: usize,
    /// 在线站点的平均响应时间（毫秒，四舍五入）
    pub avg_response_time_ms: u64,
    /// 在线率（百分比，保留一位小数）
    pub uptime_pct: f64,
}

impl Summary {
    /// 从站点快照计算汇总统计
    pub fn from_endpoints(endpoints: &[EndpointSnapshot]) -> Self {
        Self::compute(
            endpoints
                .iter()
                .map(|endpoint| (endpoint.status, endpoint.response_time_ms)),
        )
    }

    /// 从 (状态, 响应时间) 序列计算汇总统计
    pub fn compute(states: impl IntoIterator<Item = (SiteStatus, Option<u64>)>) -> Self {
        let mut total = 0;
        let mut online = 0;
        let mut offline = 0;
        let mut checking = 0;
        let mut latency_sum: u64 = 0;

        for (status, response_time_ms) in states {
            total += 1;
            match status {
                SiteStatus::Online => {
                    online += 1;
                    latency_sum += response_time_ms.unwrap_or(0);
                }
                SiteStatus::Offline => offline += 1,
                SiteStatus::Checking => checking += 1,
            }
        }

        let avg_response_time_ms = if online == 0 {
            0
        } else {
            (latency_sum as f64 / online as f64).round() as u64
        };

        let uptime_pct = if total == 0 {
            0.0
        } else {
            (online as f64 / total as f64 * 1000.0).round() / 10.0
        };

        Self {
            total,
            online,
            offline,
            checking,
            avg_response_time_ms,
            uptime_pct,
        }
    }
}
