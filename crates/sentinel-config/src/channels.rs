use serde::{Deserialize, Serialize};
use std::time::Duration;

/// SMTP 邮件配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MailConfig {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

fn default_smtp_port() -> u16 {
    587
}

/// Push 网关配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PushConfig {
    pub gateway_url: String,
    #[serde(default)]
    pub auth_token: Option<String>,
}

/// 聊天机器人配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatConfig {
    pub bot_token: String,
    #[serde(default = "default_chat_api_base")]
    pub api_base: String,
}

fn default_chat_api_base() -> String {
    "https://api.telegram.org".to_string()
}

/// 预测/分析服务配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalystConfig {
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_analyst_timeout")]
    pub timeout_secs: u64,
}

fn default_analyst_timeout() -> u64 {
    30
}

impl AnalystConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// 指标采集服务配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollectorConfig {
    pub url: String,
    #[serde(default = "default_collector_timeout")]
    pub timeout_secs: u64,
}

fn default_collector_timeout() -> u64 {
    15
}

impl CollectorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
