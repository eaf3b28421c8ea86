use crate::dispatcher::{ChannelDispatcher, DeliveryPolicy, DispatchReport, ExpiredEndpoint};
use crate::error::DeliveryError;
use crate::message::AlertMessage;
use async_trait::async_trait;
use sentinel_config::PushConfig;
use sentinel_types::{Alert, Channel, PushEndpoint, Subscriber};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Web Push 发送
///
/// 端点失效（404/410）必须返回 [`DeliveryError::Gone`]。
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn push(&self, endpoint: &PushEndpoint, payload: &serde_json::Value) -> Result<(), DeliveryError>;
}

/// 通过推送网关投递（网关负责 VAPID 签名和负载加密）
pub struct GatewayPushTransport {
    client: reqwest::Client,
    gateway_url: String,
    auth_token: Option<String>,
}

impl GatewayPushTransport {
    pub fn new(config: &PushConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            gateway_url: config.gateway_url.clone(),
            auth_token: config.auth_token.clone(),
        }
    }
}

#[async_trait]
impl PushTransport for GatewayPushTransport {
    async fn push(&self, endpoint: &PushEndpoint, payload: &serde_json::Value) -> Result<(), DeliveryError> {
        let mut request = self.client.post(&self.gateway_url).json(&json!({
            "subscription": {
                "endpoint": endpoint.endpoint,
                "keys": {
                    "p256dh": endpoint.p256dh,
                    "auth": endpoint.auth,
                }
            },
            "payload": payload,
        }));

        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::from_status(status, "push gateway"))
        }
    }
}

/// 推送渠道分发器
///
/// 订阅者任一端点送达即计为成功；失效端点单独汇报，不计入失败。
pub struct PushDispatcher {
    transport: Arc<dyn PushTransport>,
    policy: DeliveryPolicy,
}

impl PushDispatcher {
    pub fn new(transport: Arc<dyn PushTransport>, policy: DeliveryPolicy) -> Self {
        Self { transport, policy }
    }
}

#[async_trait]
impl ChannelDispatcher for PushDispatcher {
    fn channel(&self) -> Channel {
        Channel::Push
    }

    fn name(&self) -> &str {
        "push"
    }

    async fn send_bulk(&self, recipients: &[Subscriber], alert: &Alert) -> DispatchReport {
        let mut report = DispatchReport::new(Channel::Push);
        let message = AlertMessage::render(alert);
        let transport = self.transport.as_ref();
        let payload = &message.push_payload;

        for recipient in recipients {
            let mut delivered = false;
            let mut transient_failure = recipient.push_endpoints.is_empty();

            for endpoint in &recipient.push_endpoints {
                match self
                    .policy
                    .attempt("push.send", move || transport.push(endpoint, payload))
                    .await
                {
                    Ok(()) => delivered = true,
                    Err(DeliveryError::Gone(reason)) => {
                        info!(
                            subscriber_id = %recipient.id,
                            endpoint = %endpoint.endpoint,
                            reason = %reason,
                            "Push endpoint expired"
                        );
                        report.expired.push(ExpiredEndpoint {
                            subscriber_id: recipient.id.clone(),
                            endpoint: endpoint.endpoint.clone(),
                        });
                    }
                    Err(e) => {
                        warn!(
                            subscriber_id = %recipient.id,
                            alert_id = %alert.id,
                            channel = "push",
                            error = %e,
                            "Push delivery failed"
                        );
                        transient_failure = true;
                    }
                }
            }

            if delivered {
                debug!(subscriber_id = %recipient.id, alert_id = %alert.id, "Push sent");
                report.sent += 1;
            } else if transient_failure {
                report.failed += 1;
            }
        }

        info!(
            alert_id = %alert.id,
            sent = report.sent,
            failed = report.failed,
            expired = report.expired.len(),
            "Push batch dispatched"
        );
        report
    }
}
