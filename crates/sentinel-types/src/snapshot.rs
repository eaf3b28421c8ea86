use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SSR: &str = "ssr";
pub const BTC_DOMINANCE: &str = "btc_dominance";
pub const ETF_NET_FLOW: &str = "etf_net_flow";
pub const STABLECOIN_SUPPLY_CHANGE_PCT: &str = "stablecoin_supply_change_pct";

/// 指标快照
///
/// 由上游采集器产生，任何字段都可能缺失。未识别的指标保存在 `extra` 中。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    #[serde(default = "Utc::now")]
    pub collected_at: DateTime<Utc>,

    /// 稳定币供应比率
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssr: Option<f64>,

    /// BTC 市值占比（百分比）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub btc_dominance: Option<f64>,

    /// ETF 净流入（美元，带符号）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etf_net_flow: Option<f64>,

    /// 稳定币供应量变化（百分比，带符号）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stablecoin_supply_change_pct: Option<f64>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, f64>,
}

impl MetricSnapshot {
    pub fn new() -> Self {
        Self {
            collected_at: Utc::now(),
            ..Default::default()
        }
    }

    pub fn with(mut self, metric: &str, value: f64) -> Self {
        match metric {
            SSR => self.ssr = Some(value),
            BTC_DOMINANCE => self.btc_dominance = Some(value),
            ETF_NET_FLOW => self.etf_net_flow = Some(value),
            STABLECOIN_SUPPLY_CHANGE_PCT => self.stablecoin_supply_change_pct = Some(value),
            other => {
                self.extra.insert(other.to_string(), value);
            }
        }
        self
    }

    /// 按名称读取指标，缺失或非有限值返回 None
    pub fn get(&self, metric: &str) -> Option<f64> {
        let value = match metric {
            SSR => self.ssr,
            BTC_DOMINANCE => self.btc_dominance,
            ETF_NET_FLOW => self.etf_net_flow,
            STABLECOIN_SUPPLY_CHANGE_PCT => self.stablecoin_supply_change_pct,
            other => self.extra.get(other).copied(),
        };
        value.filter(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_known_and_extra_metrics() {
        let snapshot = MetricSnapshot::new()
            .with(SSR, 4.2)
            .with("fear_greed_index", 71.0);

        assert_eq!(snapshot.get(SSR), Some(4.2));
        assert_eq!(snapshot.get("fear_greed_index"), Some(71.0));
        assert_eq!(snapshot.get(BTC_DOMINANCE), None);
    }

    #[test]
    fn test_nan_is_treated_as_missing() {
        let snapshot = MetricSnapshot::new().with(ETF_NET_FLOW, f64::NAN);
        assert_eq!(snapshot.get(ETF_NET_FLOW), None);
    }

    #[test]
    fn test_deserialize_partial_snapshot() {
        let snapshot: MetricSnapshot =
            serde_json::from_str(r#"{"btc_dominance": 61.5, "funding_rate": 0.01}"#).unwrap();

        assert_eq!(snapshot.get(BTC_DOMINANCE), Some(61.5));
        assert_eq!(snapshot.get("funding_rate"), Some(0.01));
        assert_eq!(snapshot.get(SSR), None);
    }
}
