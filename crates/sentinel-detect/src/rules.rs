use chrono::{DateTime, Utc};
use sentinel_config::{ChangeThreshold, DominanceBounds, FlowThreshold, RatioBands};
use sentinel_types::{Alert, AlertType, Severity};

/// 快照规则
///
/// 每条规则只读取一个指标，返回至多一条候选告警。
pub trait SnapshotRule: Send + Sync {
    fn name(&self) -> &str;
    fn metric(&self) -> &str;
    fn evaluate(&self, value: f64, at: DateTime<Utc>) -> Option<Alert>;
}

/// 比率分档规则，四档互斥
pub struct RatioBandRule {
    bands: RatioBands,
}

impl RatioBandRule {
    pub fn new(bands: RatioBands) -> Self {
        Self { bands }
    }
}

impl SnapshotRule for RatioBandRule {
    fn name(&self) -> &str {
        "ratio_bands"
    }

    fn metric(&self) -> &str {
        &self.bands.metric
    }

    fn evaluate(&self, value: f64, at: DateTime<Utc>) -> Option<Alert> {
        let b = &self.bands;
        let label = b.metric.to_uppercase();

        let (alert_type, severity, message) = if value < b.extreme_low {
            (
                AlertType::RatioExtremeLow,
                Severity::High,
                format!(
                    "{} at {:.2} is below the extreme-low bound {:.2}: strong bullish signal",
                    label, value, b.extreme_low
                ),
            )
        } else if value < b.low {
            (
                AlertType::RatioLow,
                Severity::Medium,
                format!(
                    "{} at {:.2} is below {:.2}: bullish signal",
                    label, value, b.low
                ),
            )
        } else if value > b.extreme_high {
            (
                AlertType::RatioExtremeHigh,
                Severity::High,
                format!(
                    "{} at {:.2} is above the extreme-high bound {:.2}: strong bearish signal",
                    label, value, b.extreme_high
                ),
            )
        } else if value > b.high {
            (
                AlertType::RatioHigh,
                Severity::Medium,
                format!(
                    "{} at {:.2} is above {:.2}: bearish signal",
                    label, value, b.high
                ),
            )
        } else {
            return None;
        };

        Some(Alert::new(alert_type, severity, &b.metric, Some(value), message).at(at))
    }
}

/// 占比越界规则，两个方向都是 medium
pub struct DominanceRule {
    bounds: DominanceBounds,
}

impl DominanceRule {
    pub fn new(bounds: DominanceBounds) -> Self {
        Self { bounds }
    }
}

impl SnapshotRule for DominanceRule {
    fn name(&self) -> &str {
        "dominance_bounds"
    }

    fn metric(&self) -> &str {
        &self.bounds.metric
    }

    fn evaluate(&self, value: f64, at: DateTime<Utc>) -> Option<Alert> {
        let b = &self.bounds;
        let (alert_type, message) = if value > b.upper {
            (
                AlertType::DominanceHigh,
                format!(
                    "BTC dominance at {:.1}% is above {:.1}%: capital rotating into bitcoin",
                    value, b.upper
                ),
            )
        } else if value < b.lower {
            (
                AlertType::DominanceLow,
                format!(
                    "BTC dominance at {:.1}% is below {:.1}%: altcoin season conditions",
                    value, b.lower
                ),
            )
        } else {
            return None;
        };

        Some(Alert::new(alert_type, Severity::Medium, &b.metric, Some(value), message).at(at))
    }
}

/// 资金流规则，绝对值超过名义阈值即为 high，符号决定方向
pub struct FlowRule {
    threshold: FlowThreshold,
}

impl FlowRule {
    pub fn new(threshold: FlowThreshold) -> Self {
        Self { threshold }
    }
}

impl SnapshotRule for FlowRule {
    fn name(&self) -> &str {
        "flow_magnitude"
    }

    fn metric(&self) -> &str {
        &self.threshold.metric
    }

    fn evaluate(&self, value: f64, at: DateTime<Utc>) -> Option<Alert> {
        if value.abs() <= self.threshold.notional {
            return None;
        }

        let (alert_type, direction) = if value > 0.0 {
            (AlertType::ExtremeInflow, "inflow")
        } else {
            (AlertType::ExtremeOutflow, "outflow")
        };
        let message = format!(
            "Extreme ETF net {} of ${:.2}M (threshold ${:.2}M)",
            direction,
            value.abs() / 1_000_000.0,
            self.threshold.notional / 1_000_000.0
        );

        Some(Alert::new(alert_type, Severity::High, &self.threshold.metric, Some(value), message).at(at))
    }
}

/// 变化率规则：增长为 medium，下降为 high
pub struct ChangeRule {
    threshold: ChangeThreshold,
}

impl ChangeRule {
    pub fn new(threshold: ChangeThreshold) -> Self {
        Self { threshold }
    }
}

impl SnapshotRule for ChangeRule {
    fn name(&self) -> &str {
        "percent_change"
    }

    fn metric(&self) -> &str {
        &self.threshold.metric
    }

    fn evaluate(&self, value: f64, at: DateTime<Utc>) -> Option<Alert> {
        if value.abs() <= self.threshold.percent {
            return None;
        }

        let (alert_type, severity, message) = if value > 0.0 {
            (
                AlertType::SupplyGrowth,
                Severity::Medium,
                format!("Stablecoin supply grew {:+.2}%: fresh liquidity entering", value),
            )
        } else {
            (
                AlertType::SupplyDecline,
                Severity::High,
                format!("Stablecoin supply fell {:+.2}%: liquidity leaving the market", value),
            )
        };

        Some(Alert::new(alert_type, severity, &self.threshold.metric, Some(value), message).at(at))
    }
}
