use crate::error::DeliveryError;
use async_trait::async_trait;
use sentinel_config::{DeliveryConfig, RetryConfig};
use sentinel_core::RetryPolicy;
use sentinel_types::{Alert, Channel, Subscriber};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;

/// 已失效的推送端点
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpiredEndpoint {
    pub subscriber_id: String,
    pub endpoint: String,
}

/// 一个渠道一次批量投递的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchReport {
    pub channel: Channel,
    pub sent: usize,
    pub failed: usize,
    pub expired: Vec<ExpiredEndpoint>,
}

impl DispatchReport {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            sent: 0,
            failed: 0,
            expired: Vec::new(),
        }
    }

    /// 整个渠道都失败（无分发器、任务崩溃）
    pub fn all_failed(channel: Channel, recipients: usize) -> Self {
        Self {
            failed: recipients,
            ..Self::new(channel)
        }
    }
}

/// 渠道分发器
///
/// 单个收件人失败不会中断批次，也不会向上传播，只计数。
#[async_trait]
pub trait ChannelDispatcher: Send + Sync {
    fn channel(&self) -> Channel;

    fn name(&self) -> &str;

    async fn send_bulk(&self, recipients: &[Subscriber], alert: &Alert) -> DispatchReport;
}

/// 单次发送的超时和重试策略
#[derive(Debug, Clone)]
pub struct DeliveryPolicy {
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl DeliveryPolicy {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Self {
        Self { timeout, retry }
    }

    pub fn from_config(delivery: &DeliveryConfig, retry: &RetryConfig) -> Self {
        Self::new(delivery.send_timeout(), retry.to_policy())
    }

    /// 每次尝试单独计时；只有可重试的错误才会重试
    pub async fn attempt<T, F, Fut>(&self, operation: &str, f: F) -> Result<T, DeliveryError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, DeliveryError>>,
    {
        let timeout = self.timeout;
        let f = &f;
        self.retry
            .run_if(
                operation,
                move || async move {
                    tokio::time::timeout(timeout, f())
                        .await
                        .map_err(|_| DeliveryError::Timeout(timeout))?
                },
                DeliveryError::is_retryable,
            )
            .await
    }
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self::from_config(&DeliveryConfig::default(), &RetryConfig::default())
    }
}
