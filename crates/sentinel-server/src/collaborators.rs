use async_trait::async_trait;
use reqwest::Client;
use sentinel_config::{AnalystConfig, CollectorConfig};
use sentinel_core::{Result, SentinelError};
use sentinel_scheduler::{Opinion, ReleaseAnalyst, SnapshotCollector};
use sentinel_types::{MetricSnapshot, ScheduledRelease};
use serde::Serialize;
use tracing::debug;

fn map_err(context: &str, e: reqwest::Error) -> SentinelError {
    SentinelError::collaborator(format!("{}: {}", context, e))
}

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    release: &'a ScheduledRelease,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshot: Option<&'a MetricSnapshot>,
}

/// 远程预测/分析服务
///
/// `POST {url}/predict` 和 `POST {url}/analyze`，响应体为 [`Opinion`]。
pub struct HttpAnalyst {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpAnalyst {
    pub fn new(config: &AnalystConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| map_err("failed to build analyst client", e))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    async fn post(&self, path: &str, body: &AnalyzeRequest<'_>) -> Result<Opinion> {
        let url = format!("{}/{}", self.base_url, path);
        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| map_err(path, e))?;

        let opinion: Opinion = response.json().await.map_err(|e| map_err(path, e))?;
        debug!(release_id = %body.release.id, endpoint = %path, "Analyst responded");
        Ok(opinion)
    }
}

#[async_trait]
impl ReleaseAnalyst for HttpAnalyst {
    async fn predict(&self, release: &ScheduledRelease) -> Result<Opinion> {
        self.post(
            "predict",
            &AnalyzeRequest {
                release,
                snapshot: None,
            },
        )
        .await
    }

    async fn analyze(&self, release: &ScheduledRelease, snapshot: &MetricSnapshot) -> Result<Opinion> {
        self.post(
            "analyze",
            &AnalyzeRequest {
                release,
                snapshot: Some(snapshot),
            },
        )
        .await
    }
}

/// 远程指标采集服务，`GET {url}` 返回 [`MetricSnapshot`]
pub struct HttpSnapshotCollector {
    client: Client,
    url: String,
}

impl HttpSnapshotCollector {
    pub fn new(config: &CollectorConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| map_err("failed to build collector client", e))?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl SnapshotCollector for HttpSnapshotCollector {
    async fn collect(&self) -> Result<MetricSnapshot> {
        let snapshot: MetricSnapshot = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| map_err("collect", e))?
            .json()
            .await
            .map_err(|e| map_err("collect", e))?;

        Ok(snapshot)
    }
}
