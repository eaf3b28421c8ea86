use async_trait::async_trait;
use sentinel_core::{Result, SentinelError};
use sentinel_types::{Alert, Subscriber};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// 订阅者仓库，由外部账户系统维护
#[async_trait]
pub trait SubscriberRepository: Send + Sync {
    /// 关心该告警的订阅者（所有渠道接收所有告警类型）
    async fn interested(&self, alert: &Alert) -> Result<Vec<Subscriber>>;

    /// 停用失效的推送端点
    async fn deactivate_push_endpoint(&self, _subscriber_id: &str, _endpoint: &str) -> Result<()> {
        Ok(())
    }

    /// 同步聊天账号的验证/订阅状态
    async fn update_chat(&self, _handle: &str, _enabled: bool, _verified: bool) -> Result<()> {
        Ok(())
    }

    /// 聊天账号保存的 (chat_enabled, chat_verified)，无此账号返回 None
    async fn chat_flags(&self, _handle: &str) -> Result<Option<(bool, bool)>> {
        Ok(None)
    }
}

fn remove_endpoint(subscribers: &mut [Subscriber], subscriber_id: &str, endpoint: &str) -> bool {
    let Some(subscriber) = subscribers.iter_mut().find(|s| s.id == subscriber_id) else {
        return false;
    };
    let before = subscriber.push_endpoints.len();
    subscriber.push_endpoints.retain(|e| e.endpoint != endpoint);
    if subscriber.push_endpoints.is_empty() {
        subscriber.push_enabled = false;
    }
    subscriber.push_endpoints.len() != before
}

fn set_chat(subscribers: &mut [Subscriber], handle: &str, enabled: bool, verified: bool) -> bool {
    let mut changed = false;
    for subscriber in subscribers
        .iter_mut()
        .filter(|s| s.chat_handle.as_deref() == Some(handle))
    {
        subscriber.chat_enabled = enabled;
        subscriber.chat_verified = verified;
        changed = true;
    }
    changed
}

fn find_chat(subscribers: &[Subscriber], handle: &str) -> Option<(bool, bool)> {
    subscribers
        .iter()
        .find(|s| s.chat_handle.as_deref() == Some(handle))
        .map(|s| (s.chat_enabled, s.chat_verified))
}

/// 订阅者仓库（内存实现）
pub struct MemorySubscriberRepository {
    subscribers: Arc<RwLock<Vec<Subscriber>>>,
}

impl MemorySubscriberRepository {
    pub fn new(subscribers: Vec<Subscriber>) -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(subscribers)),
        }
    }

    pub async fn list(&self) -> Vec<Subscriber> {
        self.subscribers.read().await.clone()
    }
}

impl Default for MemorySubscriberRepository {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl SubscriberRepository for MemorySubscriberRepository {
    async fn interested(&self, _alert: &Alert) -> Result<Vec<Subscriber>> {
        let subscribers = self.subscribers.read().await;
        Ok(subscribers.iter().filter(|s| s.has_any_channel()).cloned().collect())
    }

    async fn deactivate_push_endpoint(&self, subscriber_id: &str, endpoint: &str) -> Result<()> {
        let mut subscribers = self.subscribers.write().await;
        remove_endpoint(&mut subscribers, subscriber_id, endpoint);
        Ok(())
    }

    async fn update_chat(&self, handle: &str, enabled: bool, verified: bool) -> Result<()> {
        let mut subscribers = self.subscribers.write().await;
        set_chat(&mut subscribers, handle, enabled, verified);
        Ok(())
    }

    async fn chat_flags(&self, handle: &str) -> Result<Option<(bool, bool)>> {
        Ok(find_chat(&self.subscribers.read().await, handle))
    }
}

/// 订阅者仓库（JSON 文件，启动时加载，修改后整体重写）
pub struct JsonSubscriberRepository {
    path: PathBuf,
    subscribers: RwLock<Vec<Subscriber>>,
}

impl JsonSubscriberRepository {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let subscribers: Vec<Subscriber> = match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Subscriber file not found, starting with none");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        info!(path = %path.display(), subscribers = subscribers.len(), "Subscribers loaded");
        Ok(Self {
            path,
            subscribers: RwLock::new(subscribers),
        })
    }

    pub async fn list(&self) -> Vec<Subscriber> {
        self.subscribers.read().await.clone()
    }

    async fn save(&self, subscribers: &[Subscriber]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let bytes = serde_json::to_vec_pretty(subscribers)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| SentinelError::store(format!("failed to replace {}: {}", self.path.display(), e)))
    }
}

#[async_trait]
impl SubscriberRepository for JsonSubscriberRepository {
    async fn interested(&self, _alert: &Alert) -> Result<Vec<Subscriber>> {
        let subscribers = self.subscribers.read().await;
        Ok(subscribers.iter().filter(|s| s.has_any_channel()).cloned().collect())
    }

    async fn deactivate_push_endpoint(&self, subscriber_id: &str, endpoint: &str) -> Result<()> {
        let mut subscribers = self.subscribers.write().await;
        if remove_endpoint(&mut subscribers, subscriber_id, endpoint) {
            info!(subscriber_id = %subscriber_id, endpoint = %endpoint, "Push endpoint deactivated");
            self.save(&subscribers).await?;
        }
        Ok(())
    }

    async fn update_chat(&self, handle: &str, enabled: bool, verified: bool) -> Result<()> {
        let mut subscribers = self.subscribers.write().await;
        if set_chat(&mut subscribers, handle, enabled, verified) {
            self.save(&subscribers).await?;
        }
        Ok(())
    }

    async fn chat_flags(&self, handle: &str) -> Result<Option<(bool, bool)>> {
        Ok(find_chat(&self.subscribers.read().await, handle))
    }
}
