use async_trait::async_trait;
use chrono::Datelike;
use sentinel_core::{Result, SentinelError};
use sentinel_types::{ReleaseFlag, ScheduledRelease};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// 发布日历存储
#[async_trait]
pub trait CalendarStore: Send + Sync {
    async fn load(&self) -> Result<Vec<ScheduledRelease>>;

    /// 定点记录一个已触发标记
    async fn mark_sent(&self, release_id: &str, flag: ReleaseFlag) -> Result<()>;

    /// 替换某一年的全部发布（其他年份保持不变）
    async fn replace_year(&self, year: i32, releases: Vec<ScheduledRelease>) -> Result<()>;
}

fn mark_in(releases: &mut [ScheduledRelease], release_id: &str, flag: ReleaseFlag) -> Result<()> {
    let release = releases
        .iter_mut()
        .find(|r| r.id == release_id)
        .ok_or_else(|| SentinelError::NotFound(format!("release {}", release_id)))?;
    release.mark(flag);
    Ok(())
}

/// 重新生成某年时，同 id 的发布保留已触发标记
fn merge_year(current: &mut Vec<ScheduledRelease>, year: i32, mut releases: Vec<ScheduledRelease>) {
    let mut fired: HashMap<String, BTreeSet<ReleaseFlag>> = HashMap::new();
    current.retain_mut(|r| {
        if r.scheduled_at.year() != year {
            return true;
        }
        fired.insert(r.id.clone(), std::mem::take(&mut r.notifications_sent));
        false
    });

    for release in releases.iter_mut() {
        if let Some(sent) = fired.remove(&release.id) {
            release.notifications_sent.extend(sent);
        }
    }

    current.extend(releases);
    current.sort_by_key(|r| r.instant());
}

/// 发布日历（内存实现）
pub struct MemoryCalendarStore {
    releases: Arc<RwLock<Vec<ScheduledRelease>>>,
}

impl MemoryCalendarStore {
    pub fn new() -> Self {
        Self::with_releases(Vec::new())
    }

    pub fn with_releases(releases: Vec<ScheduledRelease>) -> Self {
        Self {
            releases: Arc::new(RwLock::new(releases)),
        }
    }
}

impl Default for MemoryCalendarStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CalendarStore for MemoryCalendarStore {
    async fn load(&self) -> Result<Vec<ScheduledRelease>> {
        Ok(self.releases.read().await.clone())
    }

    async fn mark_sent(&self, release_id: &str, flag: ReleaseFlag) -> Result<()> {
        let mut releases = self.releases.write().await;
        mark_in(&mut releases, release_id, flag)
    }

    async fn replace_year(&self, year: i32, releases: Vec<ScheduledRelease>) -> Result<()> {
        let mut current = self.releases.write().await;
        merge_year(&mut current, year, releases);
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CalendarDocument {
    #[serde(default)]
    releases: Vec<ScheduledRelease>,
}

/// 发布日历（单个 JSON 文档）
///
/// 每次修改整体重写：先写临时文件，再 rename 覆盖。
pub struct JsonCalendarStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonCalendarStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<CalendarDocument> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Calendar file not found, starting empty");
                Ok(CalendarDocument::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write_document(&self, document: &CalendarDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let bytes = serde_json::to_vec_pretty(document)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl CalendarStore for JsonCalendarStore {
    async fn load(&self) -> Result<Vec<ScheduledRelease>> {
        Ok(self.read_document().await?.releases)
    }

    async fn mark_sent(&self, release_id: &str, flag: ReleaseFlag) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document().await?;
        mark_in(&mut document.releases, release_id, flag)?;
        self.write_document(&document).await
    }

    async fn replace_year(&self, year: i32, releases: Vec<ScheduledRelease>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document().await?;
        let count = releases.len();
        merge_year(&mut document.releases, year, releases);
        self.write_document(&document).await?;

        info!(year, releases = count, path = %self.path.display(), "Calendar year replaced");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};
    use sentinel_types::{Impact, ReleaseKind};
    use tempfile::tempdir;

    fn release(year: i32, month: u32, day: u32) -> ScheduledRelease {
        let et = FixedOffset::west_opt(5 * 3600).unwrap();
        let at = et.with_ymd_and_hms(year, month, day, 8, 30, 0).unwrap();
        ScheduledRelease::new(ReleaseKind::Ppi, at, Impact::Medium)
    }

    #[tokio::test]
    async fn test_memory_store_mark_sent() {
        let store = MemoryCalendarStore::with_releases(vec![release(2026, 1, 14)]);
        store.mark_sent("ppi-2026-01-14", ReleaseFlag::Min30).await.unwrap();

        let releases = store.load().await.unwrap();
        assert!(releases[0].has_fired(ReleaseFlag::Min30));

        let missing = store.mark_sent("ppi-1999-01-01", ReleaseFlag::Min30).await;
        assert!(matches!(missing, Err(SentinelError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_replace_year_keeps_other_years() {
        let store = MemoryCalendarStore::with_releases(vec![release(2025, 12, 11), release(2026, 1, 14)]);
        store
            .replace_year(2026, vec![release(2026, 2, 12), release(2026, 3, 12)])
            .await
            .unwrap();

        let ids: Vec<_> = store.load().await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["ppi-2025-12-11", "ppi-2026-02-12", "ppi-2026-03-12"]);
    }

    #[tokio::test]
    async fn test_replace_year_keeps_fired_flags() {
        let mut fired = release(2026, 1, 14);
        fired.mark(ReleaseFlag::Warning24h);
        fired.mark(ReleaseFlag::Min30);
        let store = MemoryCalendarStore::with_releases(vec![fired, release(2026, 2, 12)]);

        store
            .replace_year(2026, vec![release(2026, 1, 14), release(2026, 3, 12)])
            .await
            .unwrap();

        let releases = store.load().await.unwrap();
        assert_eq!(releases.len(), 2);
        assert_eq!(releases[0].id, "ppi-2026-01-14");
        assert!(releases[0].has_fired(ReleaseFlag::Warning24h));
        assert!(releases[0].has_fired(ReleaseFlag::Min30));
        assert!(!releases[0].has_fired(ReleaseFlag::Min5));
        assert!(releases[1].notifications_sent.is_empty());
    }

    #[tokio::test]
    async fn test_json_store_persists_flags() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("calendar.json");

        let store = JsonCalendarStore::new(&path);
        assert!(store.load().await.unwrap().is_empty());

        store.replace_year(2026, vec![release(2026, 1, 14)]).await.unwrap();
        store.mark_sent("ppi-2026-01-14", ReleaseFlag::Warning24h).await.unwrap();

        let reopened = JsonCalendarStore::new(&path);
        let releases = reopened.load().await.unwrap();
        assert_eq!(releases.len(), 1);
        assert!(releases[0].has_fired(ReleaseFlag::Warning24h));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_json_store_corrupt_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("calendar.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonCalendarStore::new(&path);
        assert!(store.load().await.is_err());
    }
}
