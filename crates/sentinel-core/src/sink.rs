use async_trait::async_trait;
use sentinel_types::{Alert, AlertOrigin, MetricSnapshot};
use std::sync::Arc;

/// 告警汇入点
///
/// 阈值检测和发布调度两条路径都把产出交给同一个 sink（去重 → 路由 → 投递）。
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// 提交候选告警，返回通过去重并已投递的告警
    async fn submit_alert(&self, alert: Alert, origin: AlertOrigin) -> Option<Arc<Alert>>;

    /// 提交一份新快照做阈值检测，返回发出的告警
    async fn submit_snapshot(&self, snapshot: MetricSnapshot) -> Vec<Arc<Alert>>;
}
