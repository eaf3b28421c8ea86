use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_core::Result;
use sentinel_types::{Alert, DedupKey};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// 告警日志中的一条记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: String,
    pub key: DedupKey,
    pub alert: Alert,
}

impl AlertRecord {
    pub fn new(alert: &Alert) -> Self {
        Self {
            id: alert.id.clone(),
            key: alert.dedup_key(),
            alert: alert.clone(),
        }
    }

    /// 同键且时间在 `since` 之后
    pub fn matches(&self, key: &DedupKey, since: DateTime<Utc>) -> bool {
        &self.key == key && self.alert.timestamp >= since
    }
}

/// 告警日志存储
#[async_trait]
pub trait AlertLog: Send + Sync {
    /// 是否存在同键、时间不早于 `since` 的记录
    async fn exists(&self, key: &DedupKey, since: DateTime<Utc>) -> Result<bool>;

    /// 写入一条告警，返回记录 ID
    async fn insert(&self, alert: &Alert) -> Result<String>;

    /// 检查并写入
    ///
    /// 默认实现不是原子的；并发调用方需要的实现应当覆盖它。
    async fn try_insert(&self, alert: &Alert, since: DateTime<Utc>) -> Result<Option<String>> {
        if self.exists(&alert.dedup_key(), since).await? {
            return Ok(None);
        }
        self.insert(alert).await.map(Some)
    }

    /// 最近的记录，新的在前
    async fn recent(&self, limit: usize) -> Result<Vec<AlertRecord>>;
}

/// 告警日志（内存实现）
pub struct MemoryAlertLog {
    records: Arc<RwLock<Vec<AlertRecord>>>,
}

impl MemoryAlertLog {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl Default for MemoryAlertLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlertLog for MemoryAlertLog {
    async fn exists(&self, key: &DedupKey, since: DateTime<Utc>) -> Result<bool> {
        let records = self.records.read().await;
        Ok(records.iter().any(|r| r.matches(key, since)))
    }

    async fn insert(&self, alert: &Alert) -> Result<String> {
        let record = AlertRecord::new(alert);
        let id = record.id.clone();
        self.records.write().await.push(record);
        Ok(id)
    }

    async fn try_insert(&self, alert: &Alert, since: DateTime<Utc>) -> Result<Option<String>> {
        let record = AlertRecord::new(alert);
        let mut records = self.records.write().await;

        if records.iter().any(|r| r.matches(&record.key, since)) {
            return Ok(None);
        }

        let id = record.id.clone();
        records.push(record);
        Ok(Some(id))
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AlertRecord>> {
        let records = self.records.read().await;
        Ok(records.iter().rev().take(limit).cloned().collect())
    }
}
