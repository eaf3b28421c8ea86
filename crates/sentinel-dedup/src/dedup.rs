use crate::store::AlertLog;
use chrono::{DateTime, Utc};
use sentinel_config::DedupConfig;
use sentinel_core::StoreFailPolicy;
use sentinel_types::{Alert, AlertOrigin};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// 告警去重器
///
/// 同一个去重键在窗口内只放行一次。告警日志出错时按 [`StoreFailPolicy`] 处理，
/// 所有调用点使用同一策略。
pub struct Deduplicator {
    log: Arc<dyn AlertLog>,
    detector_window: Duration,
    scheduler_window: Duration,
    fail_policy: StoreFailPolicy,
}

impl Deduplicator {
    pub fn new(log: Arc<dyn AlertLog>, fail_policy: StoreFailPolicy) -> Self {
        let defaults = DedupConfig::default();
        Self {
            log,
            detector_window: defaults.detector_window(),
            scheduler_window: defaults.scheduler_window(),
            fail_policy,
        }
    }

    pub fn from_config(log: Arc<dyn AlertLog>, config: &DedupConfig) -> Self {
        Self {
            log,
            detector_window: config.detector_window(),
            scheduler_window: config.scheduler_window(),
            fail_policy: config.on_store_error,
        }
    }

    pub fn log(&self) -> &Arc<dyn AlertLog> {
        &self.log
    }

    pub fn fail_policy(&self) -> StoreFailPolicy {
        self.fail_policy
    }

    /// 告警来源对应的去重窗口
    pub fn window_for(&self, origin: AlertOrigin) -> Duration {
        match origin {
            AlertOrigin::Detector => self.detector_window,
            AlertOrigin::Scheduler => self.scheduler_window,
        }
    }

    /// 窗口内没有同键记录时返回 true（不写入）
    pub async fn should_emit(&self, alert: &Alert, window: Duration) -> bool {
        let key = alert.dedup_key();
        match self.log.exists(&key, window_start(alert, window)).await {
            Ok(true) => {
                debug!(key = %key, "Duplicate alert suppressed");
                false
            }
            Ok(false) => true,
            Err(e) => {
                error!(
                    alert_id = %alert.id,
                    key = %key,
                    policy = ?self.fail_policy,
                    error = %e,
                    "Alert log lookup failed"
                );
                self.fail_policy.emits()
            }
        }
    }

    /// 写入告警日志，失败时记录错误并返回 None
    pub async fn record(&self, alert: &Alert) -> Option<String> {
        match self.log.insert(alert).await {
            Ok(id) => Some(id),
            Err(e) => {
                error!(alert_id = %alert.id, error = %e, "Failed to persist alert");
                None
            }
        }
    }

    /// 原子的检查并写入，返回是否应当发出
    pub async fn try_emit(&self, alert: &Alert, window: Duration) -> bool {
        let since = window_start(alert, window);
        match self.log.try_insert(alert, since).await {
            Ok(Some(id)) => {
                debug!(alert_id = %id, alert_type = %alert.alert_type, "Alert accepted");
                true
            }
            Ok(None) => {
                debug!(key = %alert.dedup_key(), "Duplicate alert suppressed");
                false
            }
            Err(e) => {
                error!(
                    alert_id = %alert.id,
                    policy = ?self.fail_policy,
                    error = %e,
                    "Alert log unavailable, applying store failure policy"
                );
                self.fail_policy.emits()
            }
        }
    }

    /// 按来源窗口去重
    pub async fn try_emit_from(&self, alert: &Alert, origin: AlertOrigin) -> bool {
        self.try_emit(alert, self.window_for(origin)).await
    }
}

fn window_start(alert: &Alert, window: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|w| alert.timestamp.checked_sub_signed(w))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AlertRecord, MemoryAlertLog};
    use async_trait::async_trait;
    use sentinel_core::{Result, SentinelError};
    use sentinel_types::{AlertType, DedupKey, Severity};

    struct BrokenLog;

    #[async_trait]
    impl AlertLog for BrokenLog {
        async fn exists(&self, _key: &DedupKey, _since: DateTime<Utc>) -> Result<bool> {
            Err(SentinelError::store("disk full"))
        }

        async fn insert(&self, _alert: &Alert) -> Result<String> {
            Err(SentinelError::store("disk full"))
        }

        async fn recent(&self, _limit: usize) -> Result<Vec<AlertRecord>> {
            Err(SentinelError::store("disk full"))
        }
    }

    fn alert() -> Alert {
        Alert::new(AlertType::DominanceHigh, Severity::Medium, "btc_dominance", Some(60.0), "high")
    }

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_same_alert_twice_persists_once() {
        let log = Arc::new(MemoryAlertLog::new());
        let dedup = Deduplicator::new(log.clone(), StoreFailPolicy::Emit);

        assert!(dedup.try_emit(&alert(), HOUR).await);
        assert!(!dedup.try_emit(&alert(), HOUR).await);
        assert_eq!(log.len().await, 1);
    }

    #[tokio::test]
    async fn test_two_step_api() {
        let log = Arc::new(MemoryAlertLog::new());
        let dedup = Deduplicator::new(log.clone(), StoreFailPolicy::Emit);
        let a = alert();

        assert!(dedup.should_emit(&a, HOUR).await);
        assert!(dedup.record(&a).await.is_some());
        assert!(!dedup.should_emit(&alert(), HOUR).await);
    }

    #[tokio::test]
    async fn test_outside_window_emits_again() {
        let log = Arc::new(MemoryAlertLog::new());
        let dedup = Deduplicator::new(log.clone(), StoreFailPolicy::Emit);

        let earlier = alert().at(Utc::now() - chrono::Duration::hours(2));
        assert!(dedup.try_emit(&earlier, HOUR).await);
        assert!(dedup.try_emit(&alert(), HOUR).await);
        assert_eq!(log.len().await, 2);
    }

    #[tokio::test]
    async fn test_store_failure_policy() {
        let open = Deduplicator::new(Arc::new(BrokenLog), StoreFailPolicy::Emit);
        assert!(open.try_emit(&alert(), HOUR).await);
        assert!(open.should_emit(&alert(), HOUR).await);
        assert!(open.record(&alert()).await.is_none());

        let closed = Deduplicator::new(Arc::new(BrokenLog), StoreFailPolicy::Suppress);
        assert!(!closed.try_emit(&alert(), HOUR).await);
        assert!(!closed.should_emit(&alert(), HOUR).await);
    }

    #[test]
    fn test_window_per_origin() {
        let config = DedupConfig {
            detector_window_secs: 600,
            ..Default::default()
        };
        let dedup = Deduplicator::from_config(Arc::new(MemoryAlertLog::new()), &config);

        assert_eq!(dedup.window_for(AlertOrigin::Detector), Duration::from_secs(600));
        assert_eq!(dedup.window_for(AlertOrigin::Scheduler), HOUR);
    }
}
