//! 轮次调度器模块
//!
//! 以轮次为单位并发检测所有站点，并按固定间隔重新调度

use crate::error::{MonitorError, Result, SiteVitalsError};
use crate::health::checker::CheckExecutor;
use crate::health::result::{CheckResult, SiteStatus};
use crate::monitor::registry::EndpointRegistry;
use crate::monitor::MonitorEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};

/// 一轮检测的报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundReport {
    /// 轮次序号，从1开始
    pub round: u64,
    /// 开始时间
    pub started_at: DateTime<Utc>,
    /// 结束时间
    pub finished_at: DateTime<Utc>,
    /// 在线站点数
    pub online: usize,
    /// 离线站点数
    pub offline: usize,
    /// 各站点检测结果，按注册顺序排列
    pub results: Vec<CheckResult>,
}

/// 调度器状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    /// 是否处于自动刷新状态
    pub is_running: bool,
    /// 调度间隔（毫秒）
    pub interval_ms: u64,
    /// 已完成轮次
    pub rounds_completed: u64,
    /// 是否有轮次正在执行
    pub round_in_progress: bool,
    /// 最近一轮开始时间
    pub last_round_started_at: Option<DateTime<Utc>>,
    /// 最近一轮结束时间
    pub last_round_finished_at: Option<DateTime<Utc>>,
    /// 下一轮预计开始时间
    pub next_round_at: Option<DateTime<Utc>>,
}

/// 调度器trait，定义控制接口
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// 立即执行一轮，然后按间隔持续执行；已在运行时不做任何事
    async fn start(&self, interval: Duration) -> Result<()>;

    /// 取消后续轮次，正在进行的检测会继续完成
    async fn stop(&self) -> Result<()>;

    /// 手动执行一轮，等待所有站点检测完成后返回
    async fn run_round(&self) -> Result<RoundReport>;

    /// 修改调度间隔，对正在等待的下一轮立即生效
    async fn set_interval(&self, interval: Duration) -> Result<()>;

    /// 获取调度器状态
    async fn get_status(&self) -> SchedulerStatus;
}

/// 轮次调度器实现
pub struct RoundScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    /// 站点注册表
    registry: Arc<EndpointRegistry>,
    /// 检测执行器
    executor: Arc<CheckExecutor>,
    /// 轮次锁，保证同一站点不会同时有两个检测
    round_lock: Mutex<()>,
    /// 调度间隔
    interval_tx: watch::Sender<Duration>,
    /// 调度循环任务
    task: Mutex<Option<LoopTask>>,
    /// 调度器状态
    status: RwLock<SchedulerStatus>,
    /// 事件发送器
    events: broadcast::Sender<MonitorEvent>,
}

/// 运行中的调度循环及其停止信号
struct LoopTask {
    handle: JoinHandle<()>,
    cancel: watch::Sender<bool>,
}

impl RoundScheduler {
    /// 创建新的轮次调度器
    ///
    /// # 参数
    /// * `registry` - 站点注册表
    /// * `executor` - 检测执行器
    /// * `interval` - 默认调度间隔，必须大于0
    /// * `events` - 事件发送器
    pub fn new(
        registry: Arc<EndpointRegistry>,
        executor: Arc<CheckExecutor>,
        interval: Duration,
        events: broadcast::Sender<MonitorEvent>,
    ) -> Result<Self> {
        if interval.is_zero() {
            return Err(MonitorError::InvalidInterval.into());
        }

        let status = SchedulerStatus {
            is_running: false,
            interval_ms: interval.as_millis() as u64,
            rounds_completed: 0,
            round_in_progress: false,
            last_round_started_at: None,
            last_round_finished_at: None,
            next_round_at: None,
        };
        let (interval_tx, _) = watch::channel(interval);

        Ok(Self {
            inner: Arc::new(SchedulerInner {
                registry,
                executor,
                round_lock: Mutex::new(()),
                interval_tx,
                task: Mutex::new(None),
                status: RwLock::new(status),
                events,
            }),
        })
    }

    /// 当前调度间隔
    pub fn interval(&self) -> Duration {
        *self.inner.interval_tx.borrow()
    }
}

impl SchedulerInner {
    /// 在独立任务中执行一轮并等待结果
    ///
    /// 调用方放弃等待时，该轮仍会执行完毕
    async fn run_round(self: Arc<Self>) -> Result<RoundReport> {
        let inner = Arc::clone(&self);
        tokio::spawn(async move {
            let _round_guard = inner.round_lock.lock().await;
            inner.execute_round().await
        })
        .await
        .map_err(|e| SiteVitalsError::Other(anyhow::anyhow!("检测轮次异常终止: {e}")))
    }

    /// 调度循环发起的一轮
    ///
    /// 拿到轮次锁后再检查停止信号，已停止时返回 None，不会开始新的检测
    async fn run_scheduled_round(
        self: Arc<Self>,
        cancel: watch::Receiver<bool>,
    ) -> Result<Option<RoundReport>> {
        let inner = Arc::clone(&self);
        tokio::spawn(async move {
            let _round_guard = inner.round_lock.lock().await;
            if *cancel.borrow() {
                debug!("调度器已停止，跳过本轮");
                return None;
            }
            Some(inner.execute_round().await)
        })
        .await
        .map_err(|e| SiteVitalsError::Other(anyhow::anyhow!("检测轮次异常终止: {e}")))
    }

    /// 执行一轮检测，调用方必须持有轮次锁
    async fn execute_round(&self) -> RoundReport {
        let started_at = Utc::now();
        {
            let mut status = self.status.write().await;
            status.round_in_progress = true;
            status.last_round_started_at = Some(started_at);
        }
        debug!("开始检测轮次，站点数量: {}", self.registry.len());

        let handles: Vec<JoinHandle<CheckResult>> = self
            .registry
            .slots()
            .map(|slot| {
                let slot = Arc::clone(slot);
                let executor = Arc::clone(&self.executor);
                tokio::spawn(async move { executor.check(&slot).await })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for outcome in futures::future::join_all(handles).await {
            match outcome {
                Ok(result) => results.push(result),
                Err(e) => error!("站点检测任务异常终止: {}", e),
            }
        }

        let finished_at = Utc::now();
        let online = results
            .iter()
            .filter(|r| r.status == SiteStatus::Online)
            .count();
        let offline = results.len() - online;

        let round = {
            let mut status = self.status.write().await;
            status.rounds_completed += 1;
            status.round_in_progress = false;
            status.last_round_finished_at = Some(finished_at);
            status.rounds_completed
        };

        let report = RoundReport {
            round,
            started_at,
            finished_at,
            online,
            offline,
            results,
        };

        info!(
            "检测轮次 #{} 完成: 在线 {}，离线 {}，耗时 {}ms",
            round,
            online,
            offline,
            (finished_at - started_at).num_milliseconds()
        );
        let _ = self.events.send(MonitorEvent::RoundCompleted(report.clone()));

        report
    }

    /// 调度循环：执行一轮，等待间隔，再执行下一轮
    async fn run_loop(
        self: Arc<Self>,
        mut interval_rx: watch::Receiver<Duration>,
        mut cancel_rx: watch::Receiver<bool>,
    ) {
        info!("调度循环已启动");

        loop {
            if *cancel_rx.borrow() {
                return;
            }
            match Arc::clone(&self).run_scheduled_round(cancel_rx.clone()).await {
                Ok(Some(_)) => {}
                Ok(None) => return,
                Err(e) => error!("执行检测轮次失败: {}", e),
            }

            // 间隔从上一轮结束时开始计算，轮次之间不会重叠
            let waited_from = Instant::now();
            let mut interval = *interval_rx.borrow_and_update();
            let sleep = tokio::time::sleep(interval);
            tokio::pin!(sleep);
            self.set_next_round(interval).await;

            loop {
                tokio::select! {
                    biased;
                    // 发送端被丢弃同样视为停止
                    _ = cancel_rx.changed() => {
                        debug!("调度循环收到停止信号");
                        return;
                    }
                    _ = &mut sleep => break,
                    changed = interval_rx.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        interval = *interval_rx.borrow_and_update();
                        debug!("调度间隔已更新为 {}ms", interval.as_millis());
                        sleep.as_mut().reset(waited_from + interval);
                        self.set_next_round(interval.saturating_sub(waited_from.elapsed()))
                            .await;
                    }
                }
            }
        }
    }

    async fn set_next_round(&self, remaining: Duration) {
        let next_round_at = chrono::Duration::from_std(remaining)
            .ok()
            .and_then(|delta| Utc::now().checked_add_signed(delta));
        self.status.write().await.next_round_at = next_round_at;
    }
}

#[async_trait]
impl Scheduler for RoundScheduler {
    async fn start(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(MonitorError::InvalidInterval.into());
        }

        let mut task = self.inner.task.lock().await;
        if task.as_ref().is_some_and(|running| !running.handle.is_finished()) {
            debug!("调度器已在运行，忽略重复启动");
            return Ok(());
        }

        info!(
            "启动调度器，站点数量: {}，间隔: {}ms",
            self.inner.registry.len(),
            interval.as_millis()
        );

        self.inner.interval_tx.send_replace(interval);
        {
            let mut status = self.inner.status.write().await;
            status.is_running = true;
            status.interval_ms = interval.as_millis() as u64;
        }

        let interval_rx = self.inner.interval_tx.subscribe();
        let (cancel, cancel_rx) = watch::channel(false);
        let handle = tokio::spawn(Arc::clone(&self.inner).run_loop(interval_rx, cancel_rx));
        *task = Some(LoopTask { handle, cancel });

        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let task = self.inner.task.lock().await.take();
        match task {
            Some(LoopTask { handle, cancel }) => {
                // 先发停止信号，尚未拿到轮次锁的调度轮次会直接放弃；
                // 已开始的检测在各自任务中继续完成
                cancel.send_replace(true);
                handle.abort();
                if let Err(e) = handle.await {
                    if !e.is_cancelled() {
                        error!("调度循环异常终止: {}", e);
                    }
                }
                info!("调度器已停止");
            }
            None => debug!("调度器未运行"),
        }

        let mut status = self.inner.status.write().await;
        status.is_running = false;
        status.next_round_at = None;

        Ok(())
    }

    async fn run_round(&self) -> Result<RoundReport> {
        Arc::clone(&self.inner).run_round().await
    }

    async fn set_interval(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(MonitorError::InvalidInterval.into());
        }

        self.inner.interval_tx.send_replace(interval);
        self.inner.status.write().await.interval_ms = interval.as_millis() as u64;
        info!("调度间隔设置为 {}ms", interval.as_millis());

        Ok(())
    }

    async fn get_status(&self) -> SchedulerStatus {
        self.inner.status.read().await.clone()
    }
}

impl Drop for RoundScheduler {
    fn drop(&mut self) {
        // 调度循环持有内部状态的引用，必须显式终止
        if let Ok(mut task) = self.inner.task.try_lock() {
            if let Some(running) = task.take() {
                running.cancel.send_replace(true);
                running.handle.abort();
            }
        }
    }
}
