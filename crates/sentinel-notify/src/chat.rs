use crate::dispatcher::{ChannelDispatcher, DeliveryPolicy, DispatchReport};
use crate::error::DeliveryError;
use crate::message::AlertMessage;
use async_trait::async_trait;
use sentinel_config::ChatConfig;
use sentinel_types::{Alert, Channel, Subscriber};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 聊天机器人消息发送
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// 返回对端是否接受了消息
    async fn send_one(&self, handle: &str, text: &str) -> Result<bool, DeliveryError>;
}

#[derive(Debug, Deserialize)]
struct BotApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram 风格的 Bot API
pub struct TelegramChatTransport {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
}

impl TelegramChatTransport {
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }
}

#[async_trait]
impl ChatTransport for TelegramChatTransport {
    async fn send_one(&self, handle: &str, text: &str) -> Result<bool, DeliveryError> {
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&json!({
                "chat_id": handle,
                "text": text,
                "disable_web_page_preview": true,
            }))
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(DeliveryError::from_status(status, "bot api"));
        }

        let body: BotApiResponse = response
            .json()
            .await
            .map_err(|e| DeliveryError::Transient(format!("invalid bot api response: {}", e)))?;

        if !body.ok {
            debug!(
                handle = %handle,
                description = body.description.as_deref().unwrap_or(""),
                "Bot API refused message"
            );
        }
        Ok(body.ok)
    }
}

/// 聊天渠道分发器
pub struct ChatDispatcher {
    transport: Arc<dyn ChatTransport>,
    policy: DeliveryPolicy,
}

impl ChatDispatcher {
    pub fn new(transport: Arc<dyn ChatTransport>, policy: DeliveryPolicy) -> Self {
        Self { transport, policy }
    }
}

#[async_trait]
impl ChannelDispatcher for ChatDispatcher {
    fn channel(&self) -> Channel {
        Channel::Chat
    }

    fn name(&self) -> &str {
        "chat"
    }

    async fn send_bulk(&self, recipients: &[Subscriber], alert: &Alert) -> DispatchReport {
        let mut report = DispatchReport::new(Channel::Chat);
        let message = AlertMessage::render(alert);
        let transport = self.transport.as_ref();
        let text = message.chat_text.as_str();

        for recipient in recipients {
            // 延迟队列里的订阅者可能在入队后取消了验证
            if !recipient.accepts(Channel::Chat) {
                warn!(
                    subscriber_id = %recipient.id,
                    alert_id = %alert.id,
                    verified = recipient.chat_verified,
                    enabled = recipient.chat_enabled,
                    "Chat recipient not verified or not subscribed, skipping"
                );
                report.failed += 1;
                continue;
            }

            let Some(handle) = recipient.chat_handle.as_deref() else {
                warn!(subscriber_id = %recipient.id, "Chat recipient has no handle");
                report.failed += 1;
                continue;
            };

            match self
                .policy
                .attempt("chat.send", move || transport.send_one(handle, text))
                .await
            {
                Ok(true) => {
                    debug!(subscriber_id = %recipient.id, alert_id = %alert.id, "Chat message sent");
                    report.sent += 1;
                }
                Ok(false) => {
                    warn!(
                        subscriber_id = %recipient.id,
                        alert_id = %alert.id,
                        channel = "chat",
                        "Chat message not accepted"
                    );
                    report.failed += 1;
                }
                Err(e) => {
                    warn!(
                        subscriber_id = %recipient.id,
                        alert_id = %alert.id,
                        channel = "chat",
                        error = %e,
                        "Chat delivery failed"
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            alert_id = %alert.id,
            sent = report.sent,
            failed = report.failed,
            "Chat batch dispatched"
        );
        report
    }
}
