use async_trait::async_trait;
use sentinel_core::AlertSink;
use sentinel_dedup::Deduplicator;
use sentinel_detect::ThresholdDetector;
use sentinel_notify::DeliveryService;
use sentinel_types::{Alert, AlertOrigin, MetricSnapshot};
use std::sync::Arc;
use tracing::{debug, info};

/// 告警流水线：检测 → 去重 → 路由投递
///
/// 快照推送和发布调度两条路径共用同一个实例，可并发调用。
pub struct AlertPipeline {
    detector: ThresholdDetector,
    dedup: Deduplicator,
    delivery: Arc<DeliveryService>,
}

impl AlertPipeline {
    pub fn new(detector: ThresholdDetector, dedup: Deduplicator, delivery: Arc<DeliveryService>) -> Self {
        Self {
            detector,
            dedup,
            delivery,
        }
    }
}

#[async_trait]
impl AlertSink for AlertPipeline {
    async fn submit_alert(&self, alert: Alert, origin: AlertOrigin) -> Option<Arc<Alert>> {
        if !self.dedup.try_emit_from(&alert, origin).await {
            return None;
        }

        let alert = Arc::new(alert);
        let summary = self.delivery.deliver(alert.clone()).await;
        info!(
            alert_id = %alert.id,
            alert_type = %alert.alert_type,
            origin = ?origin,
            channels = summary.immediate.len(),
            deferred = summary.deferred,
            "Alert emitted"
        );
        Some(alert)
    }

    async fn submit_snapshot(&self, snapshot: MetricSnapshot) -> Vec<Arc<Alert>> {
        let candidates = self.detector.evaluate(&snapshot);
        debug!(candidates = candidates.len(), "Snapshot evaluated");

        let mut emitted = Vec::new();
        for alert in candidates {
            if let Some(alert) = self.submit_alert(alert, AlertOrigin::Detector).await {
                emitted.push(alert);
            }
        }
        emitted
    }
}
