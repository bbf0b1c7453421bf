//! 历史记录与时间线
//!
//! 每个站点保留一个有界的历史事件环，时间线是所有站点历史的合并视图

use crate::error::MonitorError;
use crate::health::result::{HistoryEvent, SiteStatus};
use crate::monitor::registry::EndpointSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// 有界历史记录，最新事件在前
#[derive(Debug, Clone)]
pub struct HistoryLedger {
    /// 最大保留条数
    capacity: usize,
    /// 历史事件，队首为最新
    events: VecDeque<HistoryEvent>,
}

impl HistoryLedger {
    /// 创建新的历史记录
    ///
    /// # 参数
    /// * `capacity` - 最大保留条数，必须大于0
    pub fn new(capacity: usize) -> Result<Self, MonitorError> {
        if capacity == 0 {
            return Err(MonitorError::InvalidCapacity(capacity));
        }

        Ok(Self {
            capacity,
            events: VecDeque::with_capacity(capacity),
        })
    }

    /// 按时间戳插入一条事件，超出容量时淘汰最旧的一条并返回
    ///
    /// 时间戳相同时后记录的排在前面。检测中状态、缺少响应时间的在线事件
    /// 以及带响应时间的离线事件都会被拒绝
    pub fn record(&mut self, event: HistoryEvent) -> Result<Option<HistoryEvent>, MonitorError> {
        Self::validate(&event)?;

        let position = self
            .events
            .iter()
            .position(|existing| existing.timestamp <= event.timestamp)
            .unwrap_or(self.events.len());
        self.events.insert(position, event);

        if self.events.len() > self.capacity {
            Ok(self.events.pop_back())
        } else {
            Ok(None)
        }
    }

    fn validate(event: &HistoryEvent) -> Result<(), MonitorError> {
        match (event.status, event.response_time_ms) {
            (SiteStatus::Online, Some(_)) | (SiteStatus::Offline, None) => Ok(()),
            (SiteStatus::Online, None) => Err(MonitorError::InvalidHistoryEvent(
                "在线事件缺少响应时间".to_string(),
            )),
            (SiteStatus::Offline, Some(_)) => Err(MonitorError::InvalidHistoryEvent(
                "离线事件不应带有响应时间".to_string(),
            )),
            (SiteStatus::Checking, _) => Err(MonitorError::InvalidHistoryEvent(
                "检测中状态不能写入历史".to_string(),
            )),
        }
    }

    /// 最新一条事件
    pub fn latest(&self) -> Option<&HistoryEvent> {
        self.events.front()
    }

    /// 按从新到旧的顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 复制为从新到旧排列的列表
    pub fn to_vec(&self) -> Vec<HistoryEvent> {
        self.events.iter().cloned().collect()
    }
}

/// 时间线中的一条事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// 站点ID
    pub endpoint_id: String,
    /// 站点名称
    pub endpoint_name: String,
    /// 历史事件
    #[serde(flatten)]
    pub event: HistoryEvent,
}

/// 单个站点在时间线中的事件来源
#[derive(Debug, Clone)]
struct TimelineSource {
    endpoint_id: String,
    endpoint_name: String,
    /// 从新到旧
    events: Vec<HistoryEvent>,
}

/// 跨站点合并的时间线视图
///
/// 持有创建时刻的历史快照，可以多次调用 [`Timeline::iter`] 重新遍历。
/// 时间戳相同的事件按站点注册顺序排列，先注册的在前。
#[derive(Debug, Clone)]
pub struct Timeline {
    sources: Vec<TimelineSource>,
    limit: usize,
}

impl Timeline {
    /// 从站点快照构建时间线，快照顺序即注册顺序
    pub fn from_snapshots(endpoints: &[EndpointSnapshot], limit: usize) -> Self {
        let sources = endpoints
            .iter()
            .map(|endpoint| TimelineSource {
                endpoint_id: endpoint.id.clone(),
                endpoint_name: endpoint.name.clone(),
                events: endpoint.history.clone(),
            })
            .collect();

        Self { sources, limit }
    }

    /// 最大条数
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// 惰性地按时间倒序合并各站点历史
    pub fn iter(&self) -> TimelineIter<'_> {
        TimelineIter {
            sources: &self.sources,
            cursors: vec![0; self.sources.len()],
            remaining: self.limit,
        }
    }

    /// 收集为列表
    pub fn to_vec(&self) -> Vec<TimelineEvent> {
        self.iter().collect()
    }
}

impl<'a> IntoIterator for &'a Timeline {
    type Item = TimelineEvent;
    type IntoIter = TimelineIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// 时间线迭代器，对各站点的有序历史做多路归并
#[derive(Debug)]
pub struct TimelineIter<'a> {
    sources: &'a [TimelineSource],
    cursors: Vec<usize>,
    remaining: usize,
}

impl Iterator for TimelineIter<'_> {
    type Item = TimelineEvent;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let mut newest: Option<(usize, &HistoryEvent)> = None;
        for (index, source) in self.sources.iter().enumerate() {
            let Some(candidate) = source.events.get(self.cursors[index]) else {
                continue;
            };
            // 严格大于才替换，保证相同时间戳时先注册的站点在前
            match newest {
                Some((_, current)) if candidate.timestamp <= current.timestamp => {}
                _ => newest = Some((index, candidate)),
            }
        }

        let (index, event) = newest?;
        self.cursors[index] += 1;
        self.remaining -= 1;

        let source = &self.sources[index];
        Some(TimelineEvent {
            endpoint_id: source.endpoint_id.clone(),
            endpoint_name: source.endpoint_name.clone(),
            event: event.clone(),
        })
    }
}
