//! 站点注册表
//!
//! 持有配置的站点及其运行时状态。注册表在启动时一次性构建，运行期间不增删站点；
//! 每个站点的可变字段只由该站点自己的检测任务写入。

use crate::config::SiteConfig;
use crate::error::MonitorError;
use crate::health::result::{CheckResult, HistoryEvent, LatencyClass, SiteStatus};
use crate::monitor::history::{HistoryLedger, Timeline};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// 受监控的站点
#[derive(Debug)]
pub struct Endpoint {
    id: String,
    name: String,
    url: String,
    description: Option<String>,
    status: SiteStatus,
    response_time_ms: Option<u64>,
    last_checked_at: Option<DateTime<Utc>>,
    last_status_code: Option<u16>,
    last_error: Option<String>,
    history: HistoryLedger,
}

impl Endpoint {
    /// 创建处于初始检测中状态的站点
    pub fn new(
        id: String,
        name: String,
        url: String,
        description: Option<String>,
        history_capacity: usize,
    ) -> Result<Self, MonitorError> {
        Ok(Self {
            id,
            name,
            url,
            description,
            status: SiteStatus::Checking,
            response_time_ms: None,
            last_checked_at: None,
            last_status_code: None,
            last_error: None,
            history: HistoryLedger::new(history_capacity)?,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> SiteStatus {
        self.status
    }

    pub fn response_time_ms(&self) -> Option<u64> {
        self.response_time_ms
    }

    pub fn last_checked_at(&self) -> Option<DateTime<Utc>> {
        self.last_checked_at
    }

    pub fn history(&self) -> &HistoryLedger {
        &self.history
    }

    /// 标记为检测中，保留上一次的延迟和时间戳
    pub(crate) fn mark_checking(&mut self) {
        self.status = SiteStatus::Checking;
    }

    /// 应用一次已完成的检测结果并追加历史事件
    pub(crate) fn apply(&mut self, result: &CheckResult) -> HistoryEvent {
        self.status = result.status;
        self.response_time_ms = result.response_time_ms();
        self.last_checked_at = Some(result.checked_at);
        self.last_status_code = result.status_code;
        self.last_error = result.error_message.clone();

        let event = result.to_history_event();
        if let Err(e) = self.history.record(event.clone()) {
            tracing::warn!("站点 {} 的历史事件未记录: {}", self.id, e);
        }
        event
    }

    /// 只追加历史事件，不改变当前状态
    pub(crate) fn record_event(&mut self, event: HistoryEvent) -> Result<(), MonitorError> {
        self.history.record(event).map(|_| ())
    }

    /// 生成只读快照
    pub fn snapshot(&self) -> EndpointSnapshot {
        EndpointSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            url: self.url.clone(),
            description: self.description.clone(),
            status: self.status,
            response_time_ms: self.response_time_ms,
            latency_class: self.response_time_ms.map(LatencyClass::classify),
            last_checked_at: self.last_checked_at,
            last_status_code: self.last_status_code,
            last_error: self.last_error.clone(),
            history: self.history.to_vec(),
        }
    }

    fn matches(&self, term: &str) -> bool {
        text_matches(&self.name, self.description.as_deref(), term)
    }
}

/// 名称或描述是否包含关键字，`term` 需已转为小写
fn text_matches(name: &str, description: Option<&str>, term: &str) -> bool {
    name.to_lowercase().contains(term)
        || description.is_some_and(|d| d.to_lowercase().contains(term))
}

/// 按与 [`EndpointRegistry::search`] 相同的规则过滤站点配置
pub fn filter_sites<'a>(sites: &'a [SiteConfig], term: &str) -> Vec<&'a SiteConfig> {
    let term = term.trim().to_lowercase();
    sites
        .iter()
        .filter(|site| {
            term.is_empty() || text_matches(&site.name, site.description.as_deref(), &term)
        })
        .collect()
}

/// 站点只读快照，供展示层使用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointSnapshot {
    pub id: String,
    pub name: String,
    pub url: String,
    pub description: Option<String>,
    pub status: SiteStatus,
    pub response_time_ms: Option<u64>,
    pub latency_class: Option<LatencyClass>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_status_code: Option<u16>,
    pub last_error: Option<String>,
    /// 从新到旧
    pub history: Vec<HistoryEvent>,
}

/// 站点注册表
#[derive(Debug)]
pub struct EndpointRegistry {
    /// 按注册顺序排列的站点
    endpoints: Vec<Arc<RwLock<Endpoint>>>,
    /// ID到下标的索引
    index: HashMap<String, usize>,
    /// 每个站点的历史容量
    history_capacity: usize,
}

impl EndpointRegistry {
    /// 创建空注册表
    ///
    /// # 参数
    /// * `history_capacity` - 每个站点保留的历史条数，必须大于0
    pub fn new(history_capacity: usize) -> Result<Self, MonitorError> {
        if history_capacity == 0 {
            return Err(MonitorError::InvalidCapacity(history_capacity));
        }

        Ok(Self {
            endpoints: Vec::new(),
            index: HashMap::new(),
            history_capacity,
        })
    }

    /// 从站点配置列表构建注册表
    pub fn from_sites(sites: &[SiteConfig], history_capacity: usize) -> Result<Self, MonitorError> {
        let mut registry = Self::new(history_capacity)?;
        for site in sites {
            registry.register(site)?;
        }
        Ok(registry)
    }

    /// 注册站点，返回其ID
    ///
    /// 未配置ID时生成UUID
    pub fn register(&mut self, site: &SiteConfig) -> Result<String, MonitorError> {
        let id = site
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if self.index.contains_key(&id) {
            return Err(MonitorError::DuplicateEndpoint(id));
        }

        let endpoint = Endpoint::new(
            id.clone(),
            site.name.clone(),
            site.url.clone(),
            site.description.clone(),
            self.history_capacity,
        )?;

        self.index.insert(id.clone(), self.endpoints.len());
        self.endpoints.push(Arc::new(RwLock::new(endpoint)));
        tracing::debug!("注册站点: {} ({})", site.name, site.url);

        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn history_capacity(&self) -> usize {
        self.history_capacity
    }

    /// 按注册顺序遍历站点槽位
    pub(crate) fn slots(&self) -> impl Iterator<Item = &Arc<RwLock<Endpoint>>> {
        self.endpoints.iter()
    }

    fn slot(&self, id: &str) -> Result<&Arc<RwLock<Endpoint>>, MonitorError> {
        self.index
            .get(id)
            .map(|&i| &self.endpoints[i])
            .ok_or_else(|| MonitorError::EndpointNotFound(id.to_string()))
    }

    /// 获取单个站点快照
    pub async fn get(&self, id: &str) -> Option<EndpointSnapshot> {
        match self.slot(id) {
            Ok(slot) => Some(slot.read().await.snapshot()),
            Err(_) => None,
        }
    }

    /// 按注册顺序获取全部站点快照
    pub async fn snapshot(&self) -> Vec<EndpointSnapshot> {
        let mut snapshots = Vec::with_capacity(self.endpoints.len());
        for slot in &self.endpoints {
            snapshots.push(slot.read().await.snapshot());
        }
        snapshots
    }

    /// 向指定站点追加一条历史事件
    pub async fn record_event(&self, id: &str, event: HistoryEvent) -> Result<(), MonitorError> {
        let slot = self.slot(id)?;
        slot.write().await.record_event(event)
    }

    /// 按名称或描述搜索站点，空关键字返回全部
    pub async fn search(&self, term: &str) -> Vec<EndpointSnapshot> {
        let term = term.trim().to_lowercase();
        let mut matched = Vec::new();
        for slot in &self.endpoints {
            let endpoint = slot.read().await;
            if term.is_empty() || endpoint.matches(&term) {
                matched.push(endpoint.snapshot());
            }
        }
        matched
    }

    /// 合并所有站点历史的时间线
    pub async fn timeline(&self, limit: usize) -> Timeline {
        Timeline::from_snapshots(&self.snapshot().await, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn site(id: Option<&str>, name: &str, description: Option<&str>) -> SiteConfig {
        SiteConfig {
            id: id.map(str::to_string),
            name: name.to_string(),
            url: format!("https://{}.example.com", name.to_lowercase()),
            description: description.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_initial_state_is_checking() {
        let registry =
            EndpointRegistry::from_sites(&[site(Some("blog"), "Blog", None)], 10).unwrap();

        let snapshot = registry.get("blog").await.unwrap();
        assert_eq!(snapshot.status, SiteStatus::Checking);
        assert!(snapshot.response_time_ms.is_none());
        assert!(snapshot.last_checked_at.is_none());
        assert!(snapshot.history.is_empty());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let mut registry = EndpointRegistry::new(10).unwrap();
        let a = registry.register(&site(None, "A", None)).unwrap();
        let b = registry.register(&site(None, "B", None)).unwrap();
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let result = EndpointRegistry::from_sites(
            &[site(Some("x"), "A", None), site(Some("x"), "B", None)],
            10,
        );
        assert_eq!(
            result.unwrap_err(),
            MonitorError::DuplicateEndpoint("x".to_string())
        );
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            EndpointRegistry::new(0),
            Err(MonitorError::InvalidCapacity(0))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_preserves_registration_order() {
        let registry = EndpointRegistry::from_sites(
            &[
                site(Some("c"), "C", None),
                site(Some("a"), "A", None),
                site(Some("b"), "B", None),
            ],
            10,
        )
        .unwrap();

        let ids: Vec<_> = registry.snapshot().await.into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_apply_online_and_offline() {
        let mut endpoint = Endpoint::new(
            "blog".to_string(),
            "Blog".to_string(),
            "https://example.com".to_string(),
            None,
            2,
        )
        .unwrap();

        let online = CheckResult::new(
            "blog".to_string(),
            "https://example.com".to_string(),
            SiteStatus::Online,
        )
        .with_elapsed(Duration::from_millis(120))
        .with_status_code(Some(200));
        endpoint.apply(&online);

        assert_eq!(endpoint.status(), SiteStatus::Online);
        assert_eq!(endpoint.response_time_ms(), Some(120));
        assert_eq!(endpoint.last_checked_at(), Some(online.checked_at));

        let offline = CheckResult::new(
            "blog".to_string(),
            "https://example.com".to_string(),
            SiteStatus::Offline,
        )
        .with_elapsed(Duration::from_millis(6000))
        .with_error("请求超时".to_string());
        endpoint.apply(&offline);

        let snapshot = endpoint.snapshot();
        assert_eq!(snapshot.status, SiteStatus::Offline);
        assert!(snapshot.response_time_ms.is_none());
        assert!(snapshot.latency_class.is_none());
        assert_eq!(snapshot.last_error.as_deref(), Some("请求超时"));
        assert_eq!(snapshot.history.len(), 2);
        assert_eq!(snapshot.history[0].status, SiteStatus::Offline);
        assert_eq!(snapshot.history[1].response_time_ms, Some(120));

        // 容量为2，第三次检测淘汰最旧的事件
        endpoint.apply(&online);
        assert_eq!(endpoint.history().len(), 2);
        assert_eq!(endpoint.history().latest().unwrap().status, SiteStatus::Online);
    }

    #[tokio::test]
    async fn test_mark_checking_keeps_last_values() {
        let mut endpoint = Endpoint::new(
            "blog".to_string(),
            "Blog".to_string(),
            "https://example.com".to_string(),
            None,
            10,
        )
        .unwrap();
        let online = CheckResult::new(
            "blog".to_string(),
            "https://example.com".to_string(),
            SiteStatus::Online,
        )
        .with_elapsed(Duration::from_millis(80));
        endpoint.apply(&online);

        endpoint.mark_checking();
        assert_eq!(endpoint.status(), SiteStatus::Checking);
        assert_eq!(endpoint.response_time_ms(), Some(80));
        assert_eq!(endpoint.history().len(), 1);
    }

    #[tokio::test]
    async fn test_record_event_unknown_endpoint() {
        let registry = EndpointRegistry::new(10).unwrap();
        let result = registry
            .record_event("missing", HistoryEvent::offline(Utc::now()))
            .await;
        assert_eq!(
            result.unwrap_err(),
            MonitorError::EndpointNotFound("missing".to_string())
        );
    }

    #[tokio::test]
    async fn test_record_event_respects_capacity() {
        let registry =
            EndpointRegistry::from_sites(&[site(Some("blog"), "Blog", None)], 3).unwrap();
        for _ in 0..5 {
            registry
                .record_event("blog", HistoryEvent::online(Utc::now(), 10))
                .await
                .unwrap();
        }
        assert_eq!(registry.get("blog").await.unwrap().history.len(), 3);
    }

    #[tokio::test]
    async fn test_late_events_merge_into_timeline_in_order() {
        let registry = EndpointRegistry::from_sites(
            &[site(Some("blog"), "Blog", None), site(Some("docs"), "Docs", None)],
            10,
        )
        .unwrap();
        let at = |secs| DateTime::from_timestamp(secs, 0).unwrap();

        for secs in [1, 5, 3] {
            registry
                .record_event("blog", HistoryEvent::online(at(secs), 10))
                .await
                .unwrap();
        }
        registry
            .record_event("docs", HistoryEvent::offline(at(4)))
            .await
            .unwrap();

        let timestamps: Vec<_> = registry
            .timeline(10)
            .await
            .iter()
            .map(|entry| entry.event.timestamp)
            .collect();
        assert_eq!(timestamps, vec![at(5), at(4), at(3), at(1)]);
    }

    #[tokio::test]
    async fn test_record_event_rejects_online_without_latency() {
        let registry =
            EndpointRegistry::from_sites(&[site(Some("blog"), "Blog", None)], 3).unwrap();
        let event = HistoryEvent {
            timestamp: Utc::now(),
            status: SiteStatus::Online,
            response_time_ms: None,
        };

        let result = registry.record_event("blog", event).await;
        assert!(matches!(result, Err(MonitorError::InvalidHistoryEvent(_))));
        assert!(registry.get("blog").await.unwrap().history.is_empty());
    }

    #[tokio::test]
    async fn test_search_by_name_or_description() {
        let registry = EndpointRegistry::from_sites(
            &[
                site(Some("blog"), "Blog", Some("个人博客")),
                site(Some("docs"), "Docs", Some("API reference")),
                site(Some("shop"), "Shop", None),
            ],
            10,
        )
        .unwrap();

        let by_name: Vec<_> = registry.search("BLOG").await.into_iter().map(|e| e.id).collect();
        assert_eq!(by_name, vec!["blog"]);

        let by_description: Vec<_> = registry.search("api").await.into_iter().map(|e| e.id).collect();
        assert_eq!(by_description, vec!["docs"]);

        assert_eq!(registry.search("  ").await.len(), 3);
        assert!(registry.search("nothing").await.is_empty());
    }

    #[test]
    fn test_filter_sites_matches_search_rules() {
        let sites = [
            site(Some("blog"), "Blog", Some("个人博客")),
            site(Some("docs"), "Docs", Some("API reference")),
        ];

        let matched: Vec<_> = filter_sites(&sites, " Api ").iter().map(|s| s.name.as_str()).collect();
        assert_eq!(matched, vec!["Docs"]);
        assert_eq!(filter_sites(&sites, "").len(), 2);
    }
}
