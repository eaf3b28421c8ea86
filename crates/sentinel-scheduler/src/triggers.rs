use chrono::{DateTime, Duration, Utc};
use sentinel_types::{ReleaseFlag, ScheduledRelease};

/// 当前时刻落在触发窗口内、且尚未触发的标记
///
/// 窗口 `[起点, 起点 + poll)`；错过的窗口不会补发。
pub fn due_flags(
    release: &ScheduledRelease,
    now: DateTime<Utc>,
    poll_interval: Duration,
    post_delay: Duration,
) -> Vec<ReleaseFlag> {
    ReleaseFlag::ALL
        .iter()
        .copied()
        .filter(|flag| !release.has_fired(*flag))
        .filter(|flag| {
            let (start, end) = release.window(*flag, poll_interval, post_delay);
            start <= now && now < end
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};
    use sentinel_types::{Impact, ReleaseKind};

    fn release() -> ScheduledRelease {
        let et = FixedOffset::west_opt(4 * 3600).unwrap();
        let at = et.with_ymd_and_hms(2026, 6, 10, 8, 30, 0).unwrap();
        ScheduledRelease::new(ReleaseKind::Cpi, at, Impact::High)
    }

    fn poll() -> Duration {
        Duration::minutes(5)
    }

    #[test]
    fn test_windows_are_half_open() {
        let r = release();
        let t = r.instant();

        assert_eq!(
            due_flags(&r, t - Duration::minutes(60), poll(), Duration::minutes(1)),
            vec![ReleaseFlag::Min60]
        );
        assert!(due_flags(&r, t - Duration::minutes(55), poll(), Duration::minutes(1)).is_empty());
        assert_eq!(
            due_flags(&r, t - Duration::minutes(56), poll(), Duration::minutes(1)),
            vec![ReleaseFlag::Min60]
        );
    }

    #[test]
    fn test_fired_flags_are_not_due() {
        let mut r = release();
        let now = r.instant() - Duration::hours(24);
        assert_eq!(
            due_flags(&r, now, poll(), Duration::minutes(1)),
            vec![ReleaseFlag::Warning24h]
        );

        r.mark(ReleaseFlag::Warning24h);
        assert!(due_flags(&r, now, poll(), Duration::minutes(1)).is_empty());
    }

    #[test]
    fn test_data_collected_after_post_delay() {
        let r = release();
        let t = r.instant();

        assert!(due_flags(&r, t, poll(), Duration::minutes(1)).is_empty());
        assert_eq!(
            due_flags(&r, t + Duration::minutes(1), poll(), Duration::minutes(1)),
            vec![ReleaseFlag::DataCollected]
        );
        assert!(due_flags(&r, t + Duration::minutes(6), poll(), Duration::minutes(1)).is_empty());
    }
}
