use async_trait::async_trait;
use sentinel_core::Result;
use sentinel_types::{MetricSnapshot, ScheduledRelease};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 观点方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stance {
    Bullish,
    Bearish,
    #[default]
    Neutral,
}

impl fmt::Display for Stance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stance::Bullish => "bullish",
            Stance::Bearish => "bearish",
            Stance::Neutral => "neutral",
        };
        f.write_str(s)
    }
}

/// 预测/分析结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opinion {
    pub summary: String,
    #[serde(default)]
    pub stance: Stance,
    /// 0.0 ~ 1.0
    #[serde(default)]
    pub confidence: f64,
}

impl fmt::Display for Opinion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {:.0}% confidence)",
            self.summary,
            self.stance,
            self.confidence.clamp(0.0, 1.0) * 100.0
        )
    }
}

/// 发布前预测、发布后分析
#[async_trait]
pub trait ReleaseAnalyst: Send + Sync {
    async fn predict(&self, release: &ScheduledRelease) -> Result<Opinion>;

    async fn analyze(&self, release: &ScheduledRelease, snapshot: &MetricSnapshot) -> Result<Opinion>;
}

/// 主动拉取最新指标快照
#[async_trait]
pub trait SnapshotCollector: Send + Sync {
    async fn collect(&self) -> Result<MetricSnapshot>;
}
