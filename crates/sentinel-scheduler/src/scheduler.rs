use crate::collaborator::{Opinion, ReleaseAnalyst, SnapshotCollector};
use crate::store::CalendarStore;
use crate::triggers::due_flags;
use chrono::{DateTime, Utc};
use sentinel_config::SchedulerConfig;
use sentinel_core::{AlertSink, Result, RetryPolicy, SentinelError};
use sentinel_types::{
    Alert, AlertOrigin, AlertType, MetricSnapshot, ReleaseFlag, ReleasePhase, ScheduledRelease,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

const UNAVAILABLE: &str = "unavailable";

/// 一次触发
#[derive(Debug, Clone)]
pub struct FiredTrigger {
    pub release_id: String,
    pub flag: ReleaseFlag,
    pub alert: Alert,
}

/// 一次 tick 的结果
#[derive(Debug, Clone, Default)]
pub struct TickOutcome {
    pub fired: Vec<FiredTrigger>,
    /// data_collected 时采集到的新快照
    pub snapshots: Vec<MetricSnapshot>,
}

impl TickOutcome {
    pub fn is_empty(&self) -> bool {
        self.fired.is_empty() && self.snapshots.is_empty()
    }
}

/// 经济数据发布调度器
///
/// 按固定间隔轮询日历，为每个发布触发 24h 预警、60/30/15/5 分钟倒计时和发布后数据采集。
/// 每个标记只触发一次，触发后写回日历存储。
pub struct ReleaseScheduler {
    store: Arc<dyn CalendarStore>,
    analyst: Option<Arc<dyn ReleaseAnalyst>>,
    collector: Option<Arc<dyn SnapshotCollector>>,
    poll_interval: Duration,
    post_delay: Duration,
    retry: RetryPolicy,
    collaborator_timeout: Duration,
    running: Arc<RwLock<bool>>,
}

impl ReleaseScheduler {
    pub fn new(store: Arc<dyn CalendarStore>, config: &SchedulerConfig) -> Self {
        Self {
            store,
            analyst: None,
            collector: None,
            poll_interval: config.poll_interval(),
            post_delay: config.post_delay(),
            retry: RetryPolicy::default(),
            collaborator_timeout: Duration::from_secs(30),
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub fn with_analyst(mut self, analyst: Arc<dyn ReleaseAnalyst>) -> Self {
        self.analyst = Some(analyst);
        self
    }

    pub fn with_collector(mut self, collector: Arc<dyn SnapshotCollector>) -> Self {
        self.collector = Some(collector);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_collaborator_timeout(mut self, timeout: Duration) -> Self {
        self.collaborator_timeout = timeout;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn post_delay(&self) -> Duration {
        self.post_delay
    }

    pub fn store(&self) -> &Arc<dyn CalendarStore> {
        &self.store
    }

    /// 按本调度器的轮询周期和发布后延迟推导发布状态
    pub fn phase(&self, release: &ScheduledRelease, now: DateTime<Utc>) -> ReleasePhase {
        release.phase(now, chrono_duration(self.poll_interval), chrono_duration(self.post_delay))
    }

    /// 执行一次轮询，只生成告警，不投递
    pub async fn tick(&self, now: DateTime<Utc>) -> TickOutcome {
        self.run_tick(now, None).await
    }

    /// 执行一次轮询，并把告警和快照交给 sink，投递完成后再记录标记
    pub async fn tick_into(&self, now: DateTime<Utc>, sink: &dyn AlertSink) -> TickOutcome {
        self.run_tick(now, Some(sink)).await
    }

    async fn run_tick(&self, now: DateTime<Utc>, sink: Option<&dyn AlertSink>) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        let mut releases = match self.store.load().await {
            Ok(releases) => releases,
            Err(e) => {
                error!(error = %e, "Failed to load release calendar, skipping tick");
                return outcome;
            }
        };
        releases.sort_by_key(|r| r.instant());

        let poll = chrono_duration(self.poll_interval);
        let post_delay = chrono_duration(self.post_delay);

        for release in releases.iter_mut() {
            for flag in due_flags(release, now, poll, post_delay) {
                let (alert, snapshot) = self.fire(release, flag, now).await;

                if let Some(sink) = sink {
                    sink.submit_alert(alert.clone(), AlertOrigin::Scheduler).await;
                    if let Some(snapshot) = snapshot.clone() {
                        sink.submit_snapshot(snapshot).await;
                    }
                }

                release.mark(flag);
                if let Err(e) = self.store.mark_sent(&release.id, flag).await {
                    // 同一窗口的下一次 tick 可能重发，由 1 小时去重窗口拦截
                    error!(
                        release_id = %release.id,
                        flag = %flag,
                        error = %e,
                        "Failed to persist release flag"
                    );
                }

                info!(release_id = %release.id, flag = %flag, "Release trigger fired");
                outcome.fired.push(FiredTrigger {
                    release_id: release.id.clone(),
                    flag,
                    alert,
                });
                outcome.snapshots.extend(snapshot);
            }
        }

        outcome
    }

    async fn fire(
        &self,
        release: &ScheduledRelease,
        flag: ReleaseFlag,
        now: DateTime<Utc>,
    ) -> (Alert, Option<MetricSnapshot>) {
        let name = release.kind.display_name();
        let local_time = release.scheduled_at.format("%Y-%m-%d %H:%M %:z");

        let (alert_type, message, snapshot) = match flag {
            ReleaseFlag::Warning24h => {
                let outlook = self.predict(release).await;
                (
                    AlertType::ReleaseWarning,
                    format!(
                        "{} is released in 24 hours ({}, impact: {:?}). Outlook: {}",
                        name, local_time, release.impact, outlook
                    ),
                    None,
                )
            }
            ReleaseFlag::DataCollected => {
                let snapshot = self.collect().await;
                let analysis = match &snapshot {
                    Some(snapshot) => self.analyze(release, snapshot).await,
                    None => format!("analysis {}", UNAVAILABLE),
                };
                (
                    AlertType::ReleaseResult,
                    format!("{} has been released ({}). Analysis: {}", name, local_time, analysis),
                    snapshot,
                )
            }
            countdown => {
                let minutes = countdown.countdown_minutes().unwrap_or_default();
                (
                    AlertType::ReleaseCountdown,
                    format!("{} is released in {} minutes ({})", name, minutes, local_time),
                    None,
                )
            }
        };

        let alert = Alert::new(
            alert_type,
            release.impact.severity(),
            format!("{}:{}", release.id, flag),
            None,
            message,
        )
        .at(now);

        (alert, snapshot)
    }

    async fn predict(&self, release: &ScheduledRelease) -> String {
        let Some(analyst) = self.analyst.as_deref() else {
            return format!("prediction {}", UNAVAILABLE);
        };

        match self.call("analyst.predict", move || analyst.predict(release)).await {
            Ok(opinion) => opinion.to_string(),
            Err(e) => {
                warn!(release_id = %release.id, error = %e, "Prediction unavailable");
                format!("prediction {}", UNAVAILABLE)
            }
        }
    }

    async fn analyze(&self, release: &ScheduledRelease, snapshot: &MetricSnapshot) -> String {
        let Some(analyst) = self.analyst.as_deref() else {
            return format!("analysis {}", UNAVAILABLE);
        };

        let result: Result<Opinion> = self
            .call("analyst.analyze", move || analyst.analyze(release, snapshot))
            .await;
        match result {
            Ok(opinion) => opinion.to_string(),
            Err(e) => {
                warn!(release_id = %release.id, error = %e, "Analysis unavailable");
                format!("analysis {}", UNAVAILABLE)
            }
        }
    }

    async fn collect(&self) -> Option<MetricSnapshot> {
        let collector = self.collector.as_deref()?;

        match self.call("collector.collect", move || collector.collect()).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(error = %e, "Post-release snapshot collection failed");
                None
            }
        }
    }

    /// 协作方调用：单次超时 + 重试
    async fn call<T, F, Fut>(&self, operation: &str, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let timeout = self.collaborator_timeout;
        let f = &f;
        self.retry
            .run(operation, move || async move {
                tokio::time::timeout(timeout, f())
                    .await
                    .map_err(|_| SentinelError::Timeout(timeout))?
            })
            .await
    }

    /// 启动轮询循环
    pub async fn start(self: Arc<Self>, sink: Arc<dyn AlertSink>) -> Option<JoinHandle<()>> {
        let mut running = self.running.write().await;
        if *running {
            warn!("Release scheduler is already running");
            return None;
        }
        *running = true;
        drop(running);

        info!(
            poll_interval = ?self.poll_interval,
            post_delay = ?self.post_delay,
            "Release scheduler started"
        );

        let scheduler = self.clone();
        Some(tokio::spawn(async move {
            let mut ticker = interval(scheduler.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                if !*scheduler.running.read().await {
                    info!("Release scheduler stopped");
                    break;
                }

                let outcome = scheduler.tick_into(Utc::now(), sink.as_ref()).await;
                if !outcome.is_empty() {
                    debug!(fired = outcome.fired.len(), "Scheduler tick completed");
                }
            }
        }))
    }

    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
        info!("Release scheduler stopping...");
    }
}

fn chrono_duration(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(1))
}
