use crate::dispatcher::DispatchReport;
use crate::fanout::FanOut;
use crate::router::{ChannelBatches, NotificationRouter};
use crate::subscribers::SubscriberRepository;
use sentinel_types::{Alert, NotificationJob};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// 免费用户的延迟投递队列
#[derive(Default)]
pub struct DeferredQueue {
    jobs: Mutex<Vec<NotificationJob>>,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_all(&self, jobs: Vec<NotificationJob>) {
        self.jobs.lock().await.extend(jobs);
    }

    pub async fn drain(&self) -> Vec<NotificationJob> {
        std::mem::take(&mut *self.jobs.lock().await)
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }
}

/// 一次投递的汇总
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeliverySummary {
    /// 付费用户立即投递的各渠道结果
    pub immediate: Vec<DispatchReport>,
    /// 进入延迟队列的任务数
    pub deferred: usize,
}

/// 投递服务：路由 → 立即投递 / 延迟队列 → 失效端点回写
pub struct DeliveryService {
    repository: Arc<dyn SubscriberRepository>,
    router: NotificationRouter,
    fanout: Arc<FanOut>,
    deferred: DeferredQueue,
    flush_interval: Duration,
    running: Arc<RwLock<bool>>,
}

impl DeliveryService {
    pub fn new(repository: Arc<dyn SubscriberRepository>, router: NotificationRouter, fanout: Arc<FanOut>) -> Self {
        Self {
            repository,
            router,
            fanout,
            deferred: DeferredQueue::new(),
            flush_interval: Duration::from_secs(300),
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    pub fn repository(&self) -> &Arc<dyn SubscriberRepository> {
        &self.repository
    }

    pub async fn pending(&self) -> usize {
        self.deferred.len().await
    }

    pub async fn deliver(&self, alert: Arc<Alert>) -> DeliverySummary {
        let subscribers = match self.repository.interested(&alert).await {
            Ok(subscribers) => subscribers,
            Err(e) => {
                error!(alert_id = %alert.id, error = %e, "Failed to load subscribers");
                return DeliverySummary::default();
            }
        };

        let plan = self.router.route(&alert, &subscribers);

        let deferred_jobs = plan.deferred.into_jobs(alert.clone());
        let deferred = deferred_jobs.len();
        if deferred > 0 {
            self.deferred.push_all(deferred_jobs).await;
            debug!(alert_id = %alert.id, jobs = deferred, "Free-tier jobs deferred");
        }

        let immediate = if plan.immediate.is_empty() {
            Vec::new()
        } else {
            let reports = self.fanout.dispatch(alert.clone(), plan.immediate).await;
            self.handle_expired(&reports).await;
            reports
        };

        DeliverySummary { immediate, deferred }
    }

    /// 投递延迟队列中的全部任务
    pub async fn flush_deferred(&self) -> Vec<DispatchReport> {
        let jobs = self.deferred.drain().await;
        if jobs.is_empty() {
            return Vec::new();
        }

        let count = jobs.len();
        let mut reports = Vec::new();
        for (alert, batches) in ChannelBatches::from_jobs(jobs) {
            let batch_reports = self.fanout.dispatch(alert, batches).await;
            self.handle_expired(&batch_reports).await;
            reports.extend(batch_reports);
        }

        info!(jobs = count, "Deferred queue flushed");
        reports
    }

    async fn handle_expired(&self, reports: &[DispatchReport]) {
        for expired in reports.iter().flat_map(|r| r.expired.iter()) {
            if let Err(e) = self
                .repository
                .deactivate_push_endpoint(&expired.subscriber_id, &expired.endpoint)
                .await
            {
                warn!(
                    subscriber_id = %expired.subscriber_id,
                    endpoint = %expired.endpoint,
                    error = %e,
                    "Failed to deactivate push endpoint"
                );
            }
        }
    }

    /// 启动延迟队列定时投递
    pub async fn start_flush_loop(self: Arc<Self>) -> Option<JoinHandle<()>> {
        let mut running = self.running.write().await;
        if *running {
            warn!("Deferred flush loop is already running");
            return None;
        }
        *running = true;
        drop(running);

        info!(flush_interval = ?self.flush_interval, "Deferred flush loop started");

        let service = self.clone();
        Some(tokio::spawn(async move {
            let mut ticker = interval(service.flush_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // 第一次 tick 立即返回，跳过
            ticker.tick().await;

            loop {
                ticker.tick().await;

                if !*service.running.read().await {
                    info!("Deferred flush loop stopped");
                    break;
                }

                service.flush_deferred().await;
            }
        }))
    }

    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
        info!("Deferred flush loop stopping...");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{ChannelDispatcher, DeliveryPolicy};
    use crate::error::DeliveryError;
    use crate::mail::{MailDispatcher, MailTransport};
    use crate::push::{PushDispatcher, PushTransport};
    use crate::chat::{ChatDispatcher, ChatTransport};
    use crate::subscribers::MemorySubscriberRepository;
    use async_trait::async_trait;
    use sentinel_core::RetryPolicy;
    use sentinel_types::{AlertType, Channel, PlanTier, PushEndpoint, Severity, Subscriber};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recorder {
        mail: AtomicUsize,
        push: AtomicUsize,
        chat: AtomicUsize,
    }

    struct OkMail(Arc<Recorder>);

    #[async_trait]
    impl MailTransport for OkMail {
        async fn send_mail(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), DeliveryError> {
            self.0.mail.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct DownMail;

    #[async_trait]
    impl MailTransport for DownMail {
        async fn send_mail(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), DeliveryError> {
            Err(DeliveryError::Transient("connection refused".to_string()))
        }
    }

    struct OkPush(Arc<Recorder>);

    #[async_trait]
    impl PushTransport for OkPush {
        async fn push(&self, endpoint: &PushEndpoint, _payload: &serde_json::Value) -> Result<(), DeliveryError> {
            if endpoint.endpoint.ends_with("/gone") {
                return Err(DeliveryError::Gone("410".to_string()));
            }
            self.0.push.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct OkChat(Arc<Recorder>);

    #[async_trait]
    impl ChatTransport for OkChat {
        async fn send_one(&self, _handle: &str, _text: &str) -> Result<bool, DeliveryError> {
            self.0.chat.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
    }

    fn policy() -> DeliveryPolicy {
        DeliveryPolicy::new(
            Duration::from_millis(200),
            RetryPolicy::new(2, Duration::from_millis(1)).with_jitter(0.0),
        )
    }

    fn endpoint(path: &str) -> PushEndpoint {
        PushEndpoint {
            endpoint: format!("https://push.example.com{}", path),
            p256dh: "k".to_string(),
            auth: "a".to_string(),
        }
    }

    fn everywhere(id: &str, tier: PlanTier) -> Subscriber {
        Subscriber::new(id, tier)
            .with_email(format!("{}@example.com", id))
            .with_push(endpoint(&format!("/{}", id)))
            .with_chat(id, true)
    }

    async fn fanout(recorder: &Arc<Recorder>, mail: Arc<dyn MailTransport>) -> Arc<FanOut> {
        let fanout = Arc::new(FanOut::new());
        let dispatchers: Vec<Arc<dyn ChannelDispatcher>> = vec![
            Arc::new(MailDispatcher::new(mail, policy())),
            Arc::new(PushDispatcher::new(Arc::new(OkPush(recorder.clone())), policy())),
            Arc::new(ChatDispatcher::new(Arc::new(OkChat(recorder.clone())), policy())),
        ];
        for dispatcher in dispatchers {
            fanout.register(dispatcher).await;
        }
        fanout
    }

    fn alert() -> Arc<Alert> {
        Arc::new(Alert::new(AlertType::RatioExtremeHigh, Severity::High, "ssr", Some(9.0), "extreme"))
    }

    #[tokio::test]
    async fn test_premium_immediate_free_deferred_until_flush() {
        let recorder = Arc::new(Recorder::default());
        let repo = Arc::new(MemorySubscriberRepository::new(vec![
            everywhere("premium", PlanTier::Premium),
            everywhere("free", PlanTier::Free),
        ]));
        let mail: Arc<dyn MailTransport> = Arc::new(OkMail(recorder.clone()));
        let service = DeliveryService::new(repo, NotificationRouter::default(), fanout(&recorder, mail).await);

        let summary = service.deliver(alert()).await;
        assert_eq!(summary.immediate.len(), 3);
        assert!(summary.immediate.iter().all(|r| r.sent == 1 && r.failed == 0));
        assert_eq!(summary.deferred, 3);
        assert_eq!(service.pending().await, 3);
        assert_eq!(recorder.mail.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.chat.load(Ordering::SeqCst), 1);

        let flushed = service.flush_deferred().await;
        assert_eq!(flushed.iter().map(|r| r.sent).sum::<usize>(), 3);
        assert_eq!(service.pending().await, 0);
        assert_eq!(recorder.mail.load(Ordering::SeqCst), 2);
        assert_eq!(recorder.push.load(Ordering::SeqCst), 2);
        assert_eq!(recorder.chat.load(Ordering::SeqCst), 2);

        assert!(service.flush_deferred().await.is_empty());
    }

    #[tokio::test]
    async fn test_mail_failure_does_not_affect_other_channels() {
        let recorder = Arc::new(Recorder::default());
        let repo = Arc::new(MemorySubscriberRepository::new(vec![everywhere("p", PlanTier::Premium)]));
        let service = DeliveryService::new(
            repo,
            NotificationRouter::default(),
            fanout(&recorder, Arc::new(DownMail)).await,
        );

        let summary = service.deliver(alert()).await;
        let by_channel = |c: Channel| summary.immediate.iter().find(|r| r.channel == c).cloned().unwrap();

        assert_eq!(by_channel(Channel::Mail).failed, 1);
        assert_eq!(by_channel(Channel::Mail).sent, 0);
        assert_eq!(by_channel(Channel::Push).sent, 1);
        assert_eq!(by_channel(Channel::Chat).sent, 1);
    }

    #[tokio::test]
    async fn test_expired_endpoint_deactivated() {
        let recorder = Arc::new(Recorder::default());
        let repo = Arc::new(MemorySubscriberRepository::new(vec![
            Subscriber::new("p", PlanTier::Premium).with_push(endpoint("/gone"))
        ]));
        let mail: Arc<dyn MailTransport> = Arc::new(OkMail(recorder.clone()));
        let service = DeliveryService::new(repo.clone(), NotificationRouter::default(), fanout(&recorder, mail).await);

        let summary = service.deliver(alert()).await;
        assert_eq!(summary.immediate[0].expired.len(), 1);

        let subscriber = &repo.list().await[0];
        assert!(!subscriber.push_enabled);
        assert!(!subscriber.has_any_channel());
    }
}
