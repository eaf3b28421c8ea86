use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::channels::{AnalystConfig, ChatConfig, CollectorConfig, MailConfig, PushConfig};
use crate::pipeline::{DedupConfig, DeliveryConfig, DetectorConfig, RetryConfig, SchedulerConfig};

/// 全局配置
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SentinelConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub detector: DetectorConfig,
    pub dedup: DedupConfig,
    pub scheduler: SchedulerConfig,
    pub delivery: DeliveryConfig,
    pub retry: RetryConfig,
    pub storage: StorageConfig,

    /// 未配置的渠道不注册发送器
    pub mail: Option<MailConfig>,
    pub push: Option<PushConfig>,
    pub chat: Option<ChatConfig>,

    pub analyst: Option<AnalystConfig>,
    pub collector: Option<CollectorConfig>,
}

/// HTTP 服务配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 账户系统签发聊天验证码时使用的共享令牌
    pub admin_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            admin_token: None,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// EnvFilter 语法，RUST_LOG 优先
    pub level: String,
    /// 输出 JSON 格式
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// 本地存储配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub alert_log_file: String,
    pub calendar_file: String,
    pub subscribers_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            alert_log_file: "alerts.jsonl".to_string(),
            calendar_file: "calendar.json".to_string(),
            subscribers_file: "subscribers.json".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn alert_log_path(&self) -> PathBuf {
        self.data_dir.join(&self.alert_log_file)
    }

    pub fn calendar_path(&self) -> PathBuf {
        self.data_dir.join(&self.calendar_file)
    }

    pub fn subscribers_path(&self) -> PathBuf {
        self.data_dir.join(&self.subscribers_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SentinelConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.scheduler.poll_interval_secs, 300);
        assert!(config.mail.is_none());
        assert_eq!(
            config.storage.calendar_path(),
            PathBuf::from("./data").join("calendar.json")
        );
    }
}
