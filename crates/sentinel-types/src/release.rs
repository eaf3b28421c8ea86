use crate::alert::Severity;
use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// 经济数据发布类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseKind {
    Cpi,
    CoreCpi,
    Pce,
    CorePce,
    Ppi,
    Nfp,
    Fomc,
    Gdp,
    RetailSales,
    JoblessClaims,
}

impl ReleaseKind {
    pub fn slug(&self) -> &'static str {
        match self {
            ReleaseKind::Cpi => "cpi",
            ReleaseKind::CoreCpi => "core-cpi",
            ReleaseKind::Pce => "pce",
            ReleaseKind::CorePce => "core-pce",
            ReleaseKind::Ppi => "ppi",
            ReleaseKind::Nfp => "nfp",
            ReleaseKind::Fomc => "fomc",
            ReleaseKind::Gdp => "gdp",
            ReleaseKind::RetailSales => "retail-sales",
            ReleaseKind::JoblessClaims => "jobless-claims",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ReleaseKind::Cpi => "CPI",
            ReleaseKind::CoreCpi => "Core CPI",
            ReleaseKind::Pce => "PCE",
            ReleaseKind::CorePce => "Core PCE",
            ReleaseKind::Ppi => "PPI",
            ReleaseKind::Nfp => "Nonfarm Payrolls",
            ReleaseKind::Fomc => "FOMC Rate Decision",
            ReleaseKind::Gdp => "GDP",
            ReleaseKind::RetailSales => "Retail Sales",
            ReleaseKind::JoblessClaims => "Initial Jobless Claims",
        }
    }

    pub fn default_impact(&self) -> Impact {
        match self {
            ReleaseKind::Cpi | ReleaseKind::CoreCpi | ReleaseKind::Fomc | ReleaseKind::Nfp => {
                Impact::High
            }
            ReleaseKind::Pce | ReleaseKind::CorePce | ReleaseKind::Ppi | ReleaseKind::Gdp => {
                Impact::Medium
            }
            ReleaseKind::RetailSales | ReleaseKind::JoblessClaims => Impact::Low,
        }
    }

    /// 美东当地发布时间
    pub fn local_release_time(&self) -> NaiveTime {
        match self {
            ReleaseKind::Fomc => NaiveTime::from_hms_opt(14, 0, 0),
            _ => NaiveTime::from_hms_opt(8, 30, 0),
        }
        .unwrap_or_default()
    }
}

impl fmt::Display for ReleaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// 影响程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    Low,
    Medium,
    High,
}

impl Impact {
    pub fn severity(&self) -> Severity {
        match self {
            Impact::Low => Severity::Low,
            Impact::Medium => Severity::Medium,
            Impact::High => Severity::High,
        }
    }
}

/// 已触发的通知标记，每个发布最多触发一次
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReleaseFlag {
    #[serde(rename = "24h_warning")]
    Warning24h,
    #[serde(rename = "60min")]
    Min60,
    #[serde(rename = "30min")]
    Min30,
    #[serde(rename = "15min")]
    Min15,
    #[serde(rename = "5min")]
    Min5,
    #[serde(rename = "data_collected")]
    DataCollected,
}

impl ReleaseFlag {
    pub const ALL: [ReleaseFlag; 6] = [
        ReleaseFlag::Warning24h,
        ReleaseFlag::Min60,
        ReleaseFlag::Min30,
        ReleaseFlag::Min15,
        ReleaseFlag::Min5,
        ReleaseFlag::DataCollected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseFlag::Warning24h => "24h_warning",
            ReleaseFlag::Min60 => "60min",
            ReleaseFlag::Min30 => "30min",
            ReleaseFlag::Min15 => "15min",
            ReleaseFlag::Min5 => "5min",
            ReleaseFlag::DataCollected => "data_collected",
        }
    }

    /// 倒计时分钟数（仅倒计时标记）
    pub fn countdown_minutes(&self) -> Option<i64> {
        match self {
            ReleaseFlag::Warning24h => Some(1440),
            ReleaseFlag::Min60 => Some(60),
            ReleaseFlag::Min30 => Some(30),
            ReleaseFlag::Min15 => Some(15),
            ReleaseFlag::Min5 => Some(5),
            ReleaseFlag::DataCollected => None,
        }
    }

    /// 触发窗口起点相对发布时间的偏移
    pub fn offset(&self, post_delay: Duration) -> Duration {
        match self.countdown_minutes() {
            Some(minutes) => -Duration::minutes(minutes),
            None => post_delay,
        }
    }
}

impl fmt::Display for ReleaseFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 发布状态（由标记集合和当前时间推导）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "minutes", rename_all = "snake_case")]
pub enum ReleasePhase {
    Scheduled,
    PreWarned,
    /// 最近一次倒计时通知的分钟数
    IntervalNotified(i64),
    DataCollected,
    Completed,
}

/// 计划中的数据发布
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledRelease {
    pub id: String,
    pub kind: ReleaseKind,
    pub scheduled_at: DateTime<FixedOffset>,
    pub impact: Impact,
    #[serde(default)]
    pub notifications_sent: BTreeSet<ReleaseFlag>,
}

impl ScheduledRelease {
    pub fn new(kind: ReleaseKind, scheduled_at: DateTime<FixedOffset>, impact: Impact) -> Self {
        Self {
            id: format!("{}-{}", kind.slug(), scheduled_at.date_naive()),
            kind,
            scheduled_at,
            impact,
            notifications_sent: BTreeSet::new(),
        }
    }

    pub fn instant(&self) -> DateTime<Utc> {
        self.scheduled_at.with_timezone(&Utc)
    }

    pub fn has_fired(&self, flag: ReleaseFlag) -> bool {
        self.notifications_sent.contains(&flag)
    }

    /// 记录标记，已存在时返回 false
    pub fn mark(&mut self, flag: ReleaseFlag) -> bool {
        self.notifications_sent.insert(flag)
    }

    /// 触发窗口 `[start, end)`
    pub fn window(
        &self,
        flag: ReleaseFlag,
        poll_interval: Duration,
        post_delay: Duration,
    ) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.instant() + flag.offset(post_delay);
        (start, start + poll_interval)
    }

    pub fn is_completed(&self, now: DateTime<Utc>, poll_interval: Duration, post_delay: Duration) -> bool {
        if ReleaseFlag::ALL.iter().all(|f| self.has_fired(*f)) {
            return true;
        }
        let (_, last_end) = self.window(ReleaseFlag::DataCollected, poll_interval, post_delay);
        now >= last_end
    }

    pub fn phase(&self, now: DateTime<Utc>, poll_interval: Duration, post_delay: Duration) -> ReleasePhase {
        if self.is_completed(now, poll_interval, post_delay) {
            return ReleasePhase::Completed;
        }
        if self.has_fired(ReleaseFlag::DataCollected) {
            return ReleasePhase::DataCollected;
        }

        let latest_countdown = self
            .notifications_sent
            .iter()
            .filter(|f| **f != ReleaseFlag::Warning24h)
            .filter_map(|f| f.countdown_minutes())
            .min();

        match latest_countdown {
            Some(minutes) => ReleasePhase::IntervalNotified(minutes),
            None if self.has_fired(ReleaseFlag::Warning24h) => ReleasePhase::PreWarned,
            None => ReleasePhase::Scheduled,
        }
    }
}
