use std::time::Duration;
use thiserror::Error;

/// 单次投递失败的分类
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeliveryError {
    /// 可重试（网络错误、5xx、限流）
    #[error("Transient delivery failure: {0}")]
    Transient(String),

    /// 推送端点已失效（404/410），不再重试
    #[error("Endpoint gone: {0}")]
    Gone(String),

    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),

    /// 对端明确拒绝（地址非法、4xx）
    #[error("Delivery rejected: {0}")]
    Rejected(String),
}

impl DeliveryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::Transient(_) | DeliveryError::Timeout(_))
    }

    pub fn is_gone(&self) -> bool {
        matches!(self, DeliveryError::Gone(_))
    }

    /// 按 HTTP 状态码分类
    pub fn from_status(status: reqwest::StatusCode, context: &str) -> Self {
        let msg = format!("{} returned {}", context, status);
        match status.as_u16() {
            404 | 410 => DeliveryError::Gone(msg),
            408 | 429 => DeliveryError::Transient(msg),
            s if s >= 500 => DeliveryError::Transient(msg),
            _ => DeliveryError::Rejected(msg),
        }
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => DeliveryError::from_status(status, "request"),
            None => DeliveryError::Transient(err.to_string()),
        }
    }
}
