use anyhow::Result;
use sentinel_config::SentinelConfig;
use sentinel_dedup::{AlertLog, Deduplicator, JsonlAlertLog};
use sentinel_detect::ThresholdDetector;
use sentinel_notify::{
    ChannelDispatcher, ChatDispatcher, ChatSessionStore, DeliveryPolicy, DeliveryService, FanOut,
    GatewayPushTransport, JsonSubscriberRepository, MailDispatcher, NotificationRouter, PushDispatcher,
    SmtpMailTransport, SubscriberRepository, TelegramChatTransport,
};
use sentinel_scheduler::{CalendarStore, JsonCalendarStore, ReleaseScheduler};
use std::sync::Arc;
use tracing::info;

use crate::collaborators::{HttpAnalyst, HttpSnapshotCollector};
use crate::pipeline::AlertPipeline;

/// 应用状态
pub struct AppState {
    pub config: SentinelConfig,
    pub pipeline: Arc<AlertPipeline>,
    pub alert_log: Arc<dyn AlertLog>,
    pub calendar: Arc<dyn CalendarStore>,
    pub scheduler: Arc<ReleaseScheduler>,
    pub delivery: Arc<DeliveryService>,
    pub sessions: ChatSessionStore,
}

impl AppState {
    /// 由已构建好的存储和发送器组装
    pub fn new(
        config: SentinelConfig,
        alert_log: Arc<dyn AlertLog>,
        calendar: Arc<dyn CalendarStore>,
        repository: Arc<dyn SubscriberRepository>,
        fanout: Arc<FanOut>,
    ) -> Self {
        let delivery = Arc::new(
            DeliveryService::new(
                repository,
                NotificationRouter::new(config.delivery.defer_free_tier),
                fanout,
            )
            .with_flush_interval(config.delivery.free_flush_interval()),
        );

        let pipeline = Arc::new(AlertPipeline::new(
            ThresholdDetector::from_config(&config.detector),
            Deduplicator::from_config(alert_log.clone(), &config.dedup),
            delivery.clone(),
        ));

        let scheduler = Arc::new(
            ReleaseScheduler::new(calendar.clone(), &config.scheduler).with_retry(config.retry.to_policy()),
        );

        Self {
            config,
            pipeline,
            alert_log,
            calendar,
            scheduler,
            delivery,
            sessions: ChatSessionStore::new(),
        }
    }

    /// 按配置打开文件存储、注册已配置的渠道和外部服务
    pub async fn from_config(config: SentinelConfig) -> Result<Self> {
        let storage = &config.storage;
        let alert_log: Arc<dyn AlertLog> = Arc::new(JsonlAlertLog::open(storage.alert_log_path()).await?);
        let calendar: Arc<dyn CalendarStore> = Arc::new(JsonCalendarStore::new(storage.calendar_path()));
        let repository: Arc<dyn SubscriberRepository> =
            Arc::new(JsonSubscriberRepository::open(storage.subscribers_path()).await?);

        let fanout = Arc::new(FanOut::new());
        for dispatcher in build_dispatchers(&config)? {
            fanout.register(dispatcher).await;
        }

        let scheduler = build_scheduler(&config, calendar.clone())?;
        Ok(Self::new(config, alert_log, calendar, repository, fanout).with_scheduler(scheduler))
    }

    pub fn with_scheduler(mut self, scheduler: ReleaseScheduler) -> Self {
        self.scheduler = Arc::new(scheduler);
        self
    }
}

/// 调度器：按配置接入预测/分析和采集服务
fn build_scheduler(config: &SentinelConfig, calendar: Arc<dyn CalendarStore>) -> Result<ReleaseScheduler> {
    let mut scheduler = ReleaseScheduler::new(calendar, &config.scheduler).with_retry(config.retry.to_policy());

    if let Some(analyst) = &config.analyst {
        scheduler = scheduler
            .with_analyst(Arc::new(HttpAnalyst::new(analyst)?))
            .with_collaborator_timeout(analyst.timeout());
        info!(url = %analyst.url, "Release analyst configured");
    }
    if let Some(collector) = &config.collector {
        scheduler = scheduler.with_collector(Arc::new(HttpSnapshotCollector::new(collector)?));
        info!(url = %collector.url, "Snapshot collector configured");
    }

    Ok(scheduler)
}

/// 只为配置了的渠道创建发送器
fn build_dispatchers(config: &SentinelConfig) -> Result<Vec<Arc<dyn ChannelDispatcher>>> {
    let policy = DeliveryPolicy::from_config(&config.delivery, &config.retry);
    let mut dispatchers: Vec<Arc<dyn ChannelDispatcher>> = Vec::new();

    if let Some(mail) = &config.mail {
        let transport = SmtpMailTransport::new(mail)?;
        dispatchers.push(Arc::new(MailDispatcher::new(Arc::new(transport), policy.clone())));
        info!(smtp_host = %mail.smtp_host, "Mail channel configured");
    }

    if let Some(push) = &config.push {
        let transport = GatewayPushTransport::new(push);
        dispatchers.push(Arc::new(PushDispatcher::new(Arc::new(transport), policy.clone())));
        info!(gateway = %push.gateway_url, "Push channel configured");
    }

    if let Some(chat) = &config.chat {
        let transport = TelegramChatTransport::new(chat);
        dispatchers.push(Arc::new(ChatDispatcher::new(Arc::new(transport), policy)));
        info!("Chat channel configured");
    }

    Ok(dispatchers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_config::{ChatConfig, PushConfig};
    use sentinel_types::Channel;
    use tempfile::tempdir;

    #[test]
    fn test_only_configured_channels_get_dispatchers() {
        let mut config = SentinelConfig::default();
        assert!(build_dispatchers(&config).unwrap().is_empty());

        config.push = Some(PushConfig {
            gateway_url: "http://push.local/send".to_string(),
            auth_token: None,
        });
        config.chat = Some(ChatConfig {
            bot_token: "123:abc".to_string(),
            api_base: "http://chat.local".to_string(),
        });

        let channels: Vec<Channel> = build_dispatchers(&config)
            .unwrap()
            .iter()
            .map(|d| d.channel())
            .collect();
        assert_eq!(channels, vec![Channel::Push, Channel::Chat]);
    }

    #[tokio::test]
    async fn test_from_config_opens_file_stores() {
        let dir = tempdir().unwrap();
        let mut config = SentinelConfig::default();
        config.storage.data_dir = dir.path().join("data");

        let state = AppState::from_config(config).await.unwrap();
        assert!(state.alert_log.recent(10).await.unwrap().is_empty());
        assert!(state.calendar.load().await.unwrap().is_empty());
        assert!(dir.path().join("data").join("alerts.jsonl").exists());
    }
}
