use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 告警级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

/// 告警类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    /// 比率极低（看涨）
    RatioExtremeLow,
    /// 比率偏低（看涨）
    RatioLow,
    /// 比率偏高（看跌）
    RatioHigh,
    /// 比率极高（看跌）
    RatioExtremeHigh,
    DominanceHigh,
    DominanceLow,
    ExtremeInflow,
    ExtremeOutflow,
    SupplyGrowth,
    SupplyDecline,
    /// 数据发布前 24 小时预警
    ReleaseWarning,
    /// 数据发布倒计时
    ReleaseCountdown,
    /// 数据发布后的结果
    ReleaseResult,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::RatioExtremeLow => "ratio_extreme_low",
            AlertType::RatioLow => "ratio_low",
            AlertType::RatioHigh => "ratio_high",
            AlertType::RatioExtremeHigh => "ratio_extreme_high",
            AlertType::DominanceHigh => "dominance_high",
            AlertType::DominanceLow => "dominance_low",
            AlertType::ExtremeInflow => "extreme_inflow",
            AlertType::ExtremeOutflow => "extreme_outflow",
            AlertType::SupplyGrowth => "supply_growth",
            AlertType::SupplyDecline => "supply_decline",
            AlertType::ReleaseWarning => "release_warning",
            AlertType::ReleaseCountdown => "release_countdown",
            AlertType::ReleaseResult => "release_result",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 告警来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertOrigin {
    Detector,
    Scheduler,
}

/// 告警实例，创建后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub message: String,
    pub severity: Severity,
    pub metric: String,
    pub value: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        alert_type: AlertType,
        severity: Severity,
        metric: impl Into<String>,
        value: Option<f64>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            alert_type,
            message: message.into(),
            severity,
            metric: metric.into(),
            value,
            timestamp: Utc::now(),
        }
    }

    /// 指定告警时间（调度器按 tick 时间生成告警）
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::of(self)
    }
}

/// 去重键：(类型, 指标, 数值桶)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn of(alert: &Alert) -> Self {
        let bucket = alert
            .value
            .map(value_bucket)
            .unwrap_or_else(|| "-".to_string());
        Self(format!("{}:{}:{}", alert.alert_type, alert.metric, bucket))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 把数值归入两位有效数字的桶，输出 `{尾数}e{指数}`，避免浮点格式噪声
fn value_bucket(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }

    let mut exponent = value.abs().log10().floor() as i32 - 1;
    let mut mantissa = (value / 10f64.powi(exponent)).round() as i64;
    // 9.96 -> 100e-1，归一成 10e0
    if mantissa.abs() >= 100 {
        mantissa /= 10;
        exponent += 1;
    }

    format!("{}e{}", mantissa, exponent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert_with(value: Option<f64>) -> Alert {
        Alert::new(AlertType::RatioHigh, Severity::Medium, "ssr", value, "test")
    }

    #[test]
    fn test_dedup_key_ignores_id_and_message() {
        let a = alert_with(Some(7.0));
        let mut b = alert_with(Some(7.0));
        b.message = "different".to_string();

        assert_ne!(a.id, b.id);
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn test_value_bucket_two_significant_digits() {
        assert_eq!(value_bucket(1.5), "15e-1");
        assert_eq!(value_bucket(7.03), value_bucket(7.0));
        assert_ne!(value_bucket(7.0), value_bucket(7.5));
        assert_eq!(value_bucket(2_000_000.0), "20e5");
        assert_eq!(value_bucket(-1_500_000.0), "-15e5");
        assert_eq!(value_bucket(9.96), value_bucket(10.0));
        assert_eq!(value_bucket(0.0), "0");
    }

    #[test]
    fn test_dedup_key_without_value() {
        let alert = Alert::new(
            AlertType::ReleaseCountdown,
            Severity::High,
            "cpi-2026-11-12:60min",
            None,
            "CPI in 60 minutes",
        );
        assert_eq!(
            alert.dedup_key().as_str(),
            "release_countdown:cpi-2026-11-12:60min:-"
        );
    }

    #[test]
    fn test_alert_serializes_type_field() {
        let alert = alert_with(Some(7.0));
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["type"], "ratio_high");
        assert_eq!(json["severity"], "medium");
    }
}
