use crate::alert::Alert;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// 订阅等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    #[default]
    Free,
    Premium,
}

/// 通知渠道
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// 邮件
    Mail,
    /// Web Push
    Push,
    /// 聊天机器人
    Chat,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Mail, Channel::Push, Channel::Chat];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Mail => "mail",
            Channel::Push => "push",
            Channel::Chat => "chat",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Push 订阅端点（不透明的 endpoint + 密钥对）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PushEndpoint {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

/// 订阅者，由外部账户系统维护，核心只读
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_enabled: bool,
    #[serde(default)]
    pub push_enabled: bool,
    #[serde(default)]
    pub chat_enabled: bool,
    #[serde(default)]
    pub chat_verified: bool,
    #[serde(default)]
    pub chat_handle: Option<String>,
    #[serde(default)]
    pub push_endpoints: Vec<PushEndpoint>,
    #[serde(default)]
    pub plan_tier: PlanTier,
}

impl Subscriber {
    pub fn new(id: impl Into<String>, plan_tier: PlanTier) -> Self {
        Self {
            id: id.into(),
            plan_tier,
            ..Default::default()
        }
    }

    pub fn with_email(mut self, address: impl Into<String>) -> Self {
        self.email = Some(address.into());
        self.email_enabled = true;
        self
    }

    pub fn with_push(mut self, endpoint: PushEndpoint) -> Self {
        self.push_endpoints.push(endpoint);
        self.push_enabled = true;
        self
    }

    pub fn with_chat(mut self, handle: impl Into<String>, verified: bool) -> Self {
        self.chat_handle = Some(handle.into());
        self.chat_enabled = true;
        self.chat_verified = verified;
        self
    }

    pub fn accepts(&self, channel: Channel) -> bool {
        match channel {
            Channel::Mail => self.email_enabled && self.email.as_deref().is_some_and(|e| !e.is_empty()),
            Channel::Push => self.push_enabled && !self.push_endpoints.is_empty(),
            Channel::Chat => {
                self.chat_enabled
                    && self.chat_verified
                    && self.chat_handle.as_deref().is_some_and(|h| !h.is_empty())
            }
        }
    }

    pub fn has_any_channel(&self) -> bool {
        Channel::ALL.iter().any(|c| self.accepts(*c))
    }
}

/// 一次性投递任务：告警 × 订阅者 × 渠道
#[derive(Debug, Clone)]
pub struct NotificationJob {
    pub alert: Arc<Alert>,
    pub subscriber: Subscriber,
    pub channel: Channel,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> PushEndpoint {
        PushEndpoint {
            endpoint: "https://push.example.com/abc".to_string(),
            p256dh: "key".to_string(),
            auth: "auth".to_string(),
        }
    }

    #[test]
    fn test_channel_eligibility() {
        let subscriber = Subscriber::new("u1", PlanTier::Premium)
            .with_email("u1@example.com")
            .with_push(endpoint())
            .with_chat("12345", true);

        assert!(subscriber.accepts(Channel::Mail));
        assert!(subscriber.accepts(Channel::Push));
        assert!(subscriber.accepts(Channel::Chat));
    }

    #[test]
    fn test_unverified_chat_is_not_eligible() {
        let subscriber = Subscriber::new("u2", PlanTier::Free).with_chat("999", false);
        assert!(!subscriber.accepts(Channel::Chat));
        assert!(!subscriber.has_any_channel());
    }

    #[test]
    fn test_push_enabled_without_endpoints() {
        let mut subscriber = Subscriber::new("u3", PlanTier::Free);
        subscriber.push_enabled = true;
        assert!(!subscriber.accepts(Channel::Push));
    }
}
