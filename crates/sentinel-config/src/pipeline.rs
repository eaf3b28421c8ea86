use sentinel_core::{RetryPolicy, StoreFailPolicy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 阈值检测配置
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub ratio: RatioBands,
    pub dominance: DominanceBounds,
    pub flow: FlowThreshold,
    pub supply_change: ChangeThreshold,
}

/// 比率指标分档（互斥）
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RatioBands {
    pub metric: String,
    pub extreme_low: f64,
    pub low: f64,
    pub high: f64,
    pub extreme_high: f64,
}

impl Default for RatioBands {
    fn default() -> Self {
        Self {
            metric: "ssr".to_string(),
            extreme_low: 2.0,
            low: 3.0,
            high: 6.0,
            extreme_high: 8.0,
        }
    }
}

/// 占比指标上下界
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DominanceBounds {
    pub metric: String,
    pub upper: f64,
    pub lower: f64,
}

impl Default for DominanceBounds {
    fn default() -> Self {
        Self {
            metric: "btc_dominance".to_string(),
            upper: 55.0,
            lower: 40.0,
        }
    }
}

/// 资金流阈值（绝对值）
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FlowThreshold {
    pub metric: String,
    pub notional: f64,
}

impl Default for FlowThreshold {
    fn default() -> Self {
        Self {
            metric: "etf_net_flow".to_string(),
            notional: 1_000_000.0,
        }
    }
}

/// 变化率阈值（百分比，绝对值）
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChangeThreshold {
    pub metric: String,
    pub percent: f64,
}

impl Default for ChangeThreshold {
    fn default() -> Self {
        Self {
            metric: "stablecoin_supply_change_pct".to_string(),
            percent: 5.0,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), String> {
        let r = &self.ratio;
        if !(r.extreme_low < r.low && r.low < r.high && r.high < r.extreme_high) {
            return Err(format!(
                "ratio bands must be strictly increasing: {} < {} < {} < {}",
                r.extreme_low, r.low, r.high, r.extreme_high
            ));
        }
        if self.dominance.lower >= self.dominance.upper {
            return Err(format!(
                "dominance lower bound ({}) must be below upper bound ({})",
                self.dominance.lower, self.dominance.upper
            ));
        }
        if self.flow.notional <= 0.0 {
            return Err("flow notional threshold must be greater than 0".to_string());
        }
        if self.supply_change.percent <= 0.0 {
            return Err("supply change percent threshold must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// 去重配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DedupConfig {
    /// 阈值检测告警的去重窗口（秒）
    pub detector_window_secs: u64,
    /// 调度告警的去重窗口（秒）
    pub scheduler_window_secs: u64,
    /// 告警日志不可用时的处理方式
    pub on_store_error: StoreFailPolicy,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            detector_window_secs: 4 * 3600,
            scheduler_window_secs: 3600,
            on_store_error: StoreFailPolicy::Emit,
        }
    }
}

impl DedupConfig {
    pub fn detector_window(&self) -> Duration {
        Duration::from_secs(self.detector_window_secs)
    }

    pub fn scheduler_window(&self) -> Duration {
        Duration::from_secs(self.scheduler_window_secs)
    }
}

/// 发布调度配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// 轮询周期（秒），同时也是触发窗口宽度
    pub poll_interval_secs: u64,
    /// 发布后多久采集数据（秒）
    pub post_delay_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: 300,
            post_delay_secs: 60,
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn post_delay(&self) -> Duration {
        Duration::from_secs(self.post_delay_secs)
    }
}

/// 投递配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// 单次发送超时（秒）
    pub send_timeout_secs: u64,
    /// 免费用户批量发送周期（秒）
    pub free_flush_interval_secs: u64,
    /// 关闭后免费用户也立即发送
    pub defer_free_tier: bool,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            send_timeout_secs: 10,
            free_flush_interval_secs: 300,
            defer_free_tier: true,
        }
    }
}

impl DeliveryConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn free_flush_interval(&self) -> Duration {
        Duration::from_secs(self.free_flush_interval_secs)
    }
}

/// 外部调用重试配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            jitter: 0.2,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_jitter(self.jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_detector_config_is_valid() {
        assert!(DetectorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_overlapping_ratio_bands_rejected() {
        let mut config = DetectorConfig::default();
        config.ratio.low = 7.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_config_to_policy() {
        let policy = RetryConfig::default().to_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
    }
}
