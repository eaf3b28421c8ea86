use chrono::{Datelike, FixedOffset, NaiveDate, Offset, TimeZone, Utc, Weekday};
use sentinel_core::{Result, SentinelError};
use sentinel_types::{Impact, ReleaseKind, ScheduledRelease};
use serde::Deserialize;

/// 日历输入条目
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CalendarEntry {
    pub kind: ReleaseKind,
    pub date: NaiveDate,
    #[serde(default)]
    pub impact: Option<Impact>,
}

/// 日历输入文件（TOML）
///
/// ```toml
/// [[releases]]
/// kind = "cpi"
/// date = "2026-01-13"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CalendarFile {
    #[serde(default)]
    pub releases: Vec<CalendarEntry>,
}

impl CalendarFile {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| SentinelError::invalid_input(e.to_string()))
    }
}

/// 美东时区偏移：3 月第二个周日至 11 月第一个周日为 EDT (-4)，其余为 EST (-5)
pub fn eastern_offset(date: NaiveDate) -> FixedOffset {
    let year = date.year();
    let dst_start = NaiveDate::from_weekday_of_month_opt(year, 3, Weekday::Sun, 2);
    let dst_end = NaiveDate::from_weekday_of_month_opt(year, 11, Weekday::Sun, 1);

    let in_dst = match (dst_start, dst_end) {
        (Some(start), Some(end)) => date >= start && date < end,
        _ => false,
    };

    let hours = if in_dst { 4 } else { 5 };
    FixedOffset::west_opt(hours * 3600).unwrap_or_else(|| Utc.fix())
}

/// 发布日历生成器
pub struct CalendarBuilder;

impl CalendarBuilder {
    /// 按年生成发布列表，日期不属于该年的条目会被拒绝
    pub fn build_year(year: i32, entries: &[CalendarEntry]) -> Result<Vec<ScheduledRelease>> {
        let mut releases = Vec::with_capacity(entries.len());

        for entry in entries {
            if entry.date.year() != year {
                return Err(SentinelError::invalid_input(format!(
                    "{} on {} is outside {}",
                    entry.kind.slug(),
                    entry.date,
                    year
                )));
            }

            let local = entry.date.and_time(entry.kind.local_release_time());
            let scheduled_at = eastern_offset(entry.date)
                .from_local_datetime(&local)
                .single()
                .ok_or_else(|| {
                    SentinelError::invalid_input(format!("ambiguous local time {}", local))
                })?;

            let impact = entry.impact.unwrap_or_else(|| entry.kind.default_impact());
            releases.push(ScheduledRelease::new(entry.kind, scheduled_at, impact));
        }

        releases.sort_by_key(|r| r.instant());
        Ok(releases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_eastern_offset_boundaries() {
        // 2026: 3 月 8 日开始夏令时，11 月 1 日结束
        assert_eq!(eastern_offset(date(2026, 3, 7)).utc_minus_local(), 5 * 3600);
        assert_eq!(eastern_offset(date(2026, 3, 8)).utc_minus_local(), 4 * 3600);
        assert_eq!(eastern_offset(date(2026, 10, 31)).utc_minus_local(), 4 * 3600);
        assert_eq!(eastern_offset(date(2026, 11, 1)).utc_minus_local(), 5 * 3600);
    }

    #[test]
    fn test_build_year() {
        let entries = vec![
            CalendarEntry {
                kind: ReleaseKind::Fomc,
                date: date(2026, 6, 17),
                impact: None,
            },
            CalendarEntry {
                kind: ReleaseKind::Cpi,
                date: date(2026, 1, 13),
                impact: Some(Impact::Medium),
            },
        ];

        let releases = CalendarBuilder::build_year(2026, &entries).unwrap();
        assert_eq!(releases.len(), 2);

        assert_eq!(releases[0].id, "cpi-2026-01-13");
        assert_eq!(releases[0].impact, Impact::Medium);
        assert_eq!(releases[0].instant(), Utc.with_ymd_and_hms(2026, 1, 13, 13, 30, 0).unwrap());

        assert_eq!(releases[1].id, "fomc-2026-06-17");
        assert_eq!(releases[1].impact, Impact::High);
        assert_eq!(releases[1].instant(), Utc.with_ymd_and_hms(2026, 6, 17, 18, 0, 0).unwrap());
    }

    #[test]
    fn test_entry_outside_year_rejected() {
        let entries = vec![CalendarEntry {
            kind: ReleaseKind::Nfp,
            date: date(2027, 1, 8),
            impact: None,
        }];
        assert!(CalendarBuilder::build_year(2026, &entries).is_err());
    }

    #[test]
    fn test_parse_calendar_file() {
        let file = CalendarFile::parse(
            r#"
[[releases]]
kind = "core_cpi"
date = "2026-02-11"

[[releases]]
kind = "jobless_claims"
date = "2026-02-12"
impact = "medium"
"#,
        )
        .unwrap();

        assert_eq!(file.releases.len(), 2);
        assert_eq!(file.releases[0].kind, ReleaseKind::CoreCpi);
        assert_eq!(file.releases[1].impact, Some(Impact::Medium));
        assert!(CalendarFile::parse("releases = 3").is_err());
    }
}
