use crate::rules::{ChangeRule, DominanceRule, FlowRule, RatioBandRule, SnapshotRule};
use sentinel_config::DetectorConfig;
use sentinel_types::{Alert, MetricSnapshot};
use tracing::{debug, info, trace};

/// 阈值检测器
///
/// 无状态：按插入顺序对快照逐条执行规则，缺失的指标直接跳过。
pub struct ThresholdDetector {
    rules: Vec<Box<dyn SnapshotRule>>,
}

impl ThresholdDetector {
    pub fn new(rules: Vec<Box<dyn SnapshotRule>>) -> Self {
        Self { rules }
    }

    /// 默认规则表
    pub fn from_config(config: &DetectorConfig) -> Self {
        let mut detector = Self::new(Vec::new());
        detector.add_rule(Box::new(RatioBandRule::new(config.ratio.clone())));
        detector.add_rule(Box::new(DominanceRule::new(config.dominance.clone())));
        detector.add_rule(Box::new(FlowRule::new(config.flow.clone())));
        detector.add_rule(Box::new(ChangeRule::new(config.supply_change.clone())));
        detector
    }

    pub fn add_rule(&mut self, rule: Box<dyn SnapshotRule>) {
        info!(rule = rule.name(), metric = rule.metric(), "Adding detection rule");
        self.rules.push(rule);
    }

    pub fn evaluate(&self, snapshot: &MetricSnapshot) -> Vec<Alert> {
        let mut alerts = Vec::new();

        for rule in &self.rules {
            let Some(value) = snapshot.get(rule.metric()) else {
                trace!(rule = rule.name(), metric = rule.metric(), "Metric missing, rule skipped");
                continue;
            };

            if let Some(alert) = rule.evaluate(value, snapshot.collected_at) {
                debug!(
                    rule = rule.name(),
                    alert_type = %alert.alert_type,
                    value,
                    "Threshold breached"
                );
                alerts.push(alert);
            }
        }

        alerts
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

impl Default for ThresholdDetector {
    fn default() -> Self {
        Self::from_config(&DetectorConfig::default())
    }
}
