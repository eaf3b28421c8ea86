use crate::store::{AlertLog, AlertRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_core::{Result, SentinelError};
use sentinel_types::{Alert, DedupKey};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// 内存索引：键 → (记录 ID, 告警时间)
#[derive(Default)]
struct LogIndex {
    records: Vec<AlertRecord>,
    by_key: HashMap<DedupKey, Vec<(String, DateTime<Utc>)>>,
}

impl LogIndex {
    fn contains(&self, key: &DedupKey, since: DateTime<Utc>) -> bool {
        self.by_key
            .get(key)
            .is_some_and(|entries| entries.iter().any(|(_, ts)| *ts >= since))
    }

    fn push(&mut self, record: AlertRecord) {
        self.by_key
            .entry(record.key.clone())
            .or_default()
            .push((record.id.clone(), record.alert.timestamp));
        self.records.push(record);
    }

    fn remove(&mut self, record: &AlertRecord) {
        if let Some(entries) = self.by_key.get_mut(&record.key) {
            entries.retain(|(id, _)| id != &record.id);
            if entries.is_empty() {
                self.by_key.remove(&record.key);
            }
        }
        if let Some(pos) = self.records.iter().rposition(|r| r.id == record.id) {
            self.records.remove(pos);
        }
    }
}

/// 告警日志（JSON Lines 文件实现）
///
/// 每条告警追加一行。打开时把整个文件读入内存索引；检查和占位在同步锁内完成，
/// 文件追加在锁外进行，追加失败时撤销占位。
pub struct JsonlAlertLog {
    path: PathBuf,
    index: Mutex<LogIndex>,
    file: tokio::sync::Mutex<File>,
}

impl JsonlAlertLog {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut index = LogIndex::default();
        match fs::read_to_string(&path).await {
            Ok(content) => {
                for (line_no, line) in content.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<AlertRecord>(line) {
                        Ok(record) => index.push(record),
                        Err(e) => warn!(
                            path = %path.display(),
                            line = line_no + 1,
                            error = %e,
                            "Skipping malformed alert log line"
                        ),
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        info!(
            path = %path.display(),
            records = index.records.len(),
            "Alert log opened"
        );

        Ok(Self {
            path,
            index: Mutex::new(index),
            file: tokio::sync::Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_index(&self) -> Result<MutexGuard<'_, LogIndex>> {
        self.index
            .lock()
            .map_err(|_| SentinelError::store("alert log index lock poisoned"))
    }

    async fn append(&self, record: &AlertRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    /// 追加失败则撤销占位
    async fn commit(&self, record: AlertRecord) -> Result<String> {
        if let Err(e) = self.append(&record).await {
            self.lock_index()?.remove(&record);
            return Err(SentinelError::store(format!(
                "failed to append to {}: {}",
                self.path.display(),
                e
            )));
        }

        debug!(alert_id = %record.id, key = %record.key, "Alert persisted");
        Ok(record.id)
    }
}

#[async_trait]
impl AlertLog for JsonlAlertLog {
    async fn exists(&self, key: &DedupKey, since: DateTime<Utc>) -> Result<bool> {
        Ok(self.lock_index()?.contains(key, since))
    }

    async fn insert(&self, alert: &Alert) -> Result<String> {
        let record = AlertRecord::new(alert);
        self.lock_index()?.push(record.clone());
        self.commit(record).await
    }

    async fn try_insert(&self, alert: &Alert, since: DateTime<Utc>) -> Result<Option<String>> {
        let record = AlertRecord::new(alert);
        {
            let mut index = self.lock_index()?;
            if index.contains(&record.key, since) {
                return Ok(None);
            }
            index.push(record.clone());
        }

        self.commit(record).await.map(Some)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AlertRecord>> {
        let index = self.lock_index()?;
        Ok(index.records.iter().rev().take(limit).cloned().collect())
    }
}
