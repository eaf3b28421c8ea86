use crate::dispatcher::{ChannelDispatcher, DispatchReport};
use crate::router::ChannelBatches;
use sentinel_types::{Alert, Channel};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// 多渠道并发投递
///
/// 每个有收件人的渠道一个任务，全部结束后返回。单个渠道崩溃或未注册只影响该渠道。
pub struct FanOut {
    dispatchers: Arc<RwLock<HashMap<Channel, Arc<dyn ChannelDispatcher>>>>,
}

impl FanOut {
    pub fn new() -> Self {
        Self {
            dispatchers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 注册分发器（同一渠道后注册的覆盖先注册的）
    pub async fn register(&self, dispatcher: Arc<dyn ChannelDispatcher>) {
        let mut dispatchers = self.dispatchers.write().await;
        info!(channel = %dispatcher.channel(), "Registered dispatcher: {}", dispatcher.name());
        dispatchers.insert(dispatcher.channel(), dispatcher);
    }

    pub async fn channels(&self) -> Vec<Channel> {
        let mut channels: Vec<_> = self.dispatchers.read().await.keys().copied().collect();
        channels.sort();
        channels
    }

    pub async fn dispatch(&self, alert: Arc<Alert>, batches: ChannelBatches) -> Vec<DispatchReport> {
        let ChannelBatches { mail, push, chat } = batches;
        let mut reports = Vec::new();
        let mut handles = Vec::new();

        {
            let dispatchers = self.dispatchers.read().await;
            for (channel, recipients) in [(Channel::Mail, mail), (Channel::Push, push), (Channel::Chat, chat)] {
                if recipients.is_empty() {
                    continue;
                }

                let Some(dispatcher) = dispatchers.get(&channel).cloned() else {
                    warn!(
                        channel = %channel,
                        recipients = recipients.len(),
                        alert_id = %alert.id,
                        "No dispatcher registered for channel"
                    );
                    reports.push(DispatchReport::all_failed(channel, recipients.len()));
                    continue;
                };

                let alert = alert.clone();
                let count = recipients.len();
                let handle = tokio::spawn(async move { dispatcher.send_bulk(&recipients, &alert).await });
                handles.push((channel, count, handle));
            }
        }

        for (channel, count, handle) in handles {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!(channel = %channel, alert_id = %alert.id, error = %e, "Dispatcher task failed");
                    reports.push(DispatchReport::all_failed(channel, count));
                }
            }
        }

        reports.sort_by_key(|r| r.channel);
        reports
    }
}

impl Default for FanOut {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sentinel_types::{AlertType, PlanTier, PushEndpoint, Severity, Subscriber};
    use std::time::{Duration, Instant};

    struct Counting(Channel);

    #[async_trait]
    impl ChannelDispatcher for Counting {
        fn channel(&self) -> Channel {
            self.0
        }

        fn name(&self) -> &str {
            "counting"
        }

        async fn send_bulk(&self, recipients: &[Subscriber], _alert: &Alert) -> DispatchReport {
            let mut report = DispatchReport::new(self.0);
            report.sent = recipients.len();
            report
        }
    }

    struct Panicking;

    #[async_trait]
    impl ChannelDispatcher for Panicking {
        fn channel(&self) -> Channel {
            Channel::Mail
        }

        fn name(&self) -> &str {
            "panicking"
        }

        async fn send_bulk(&self, _recipients: &[Subscriber], _alert: &Alert) -> DispatchReport {
            panic!("smtp client exploded");
        }
    }

    /// 先睡眠再返回，记录完成时刻
    struct Timed {
        channel: Channel,
        delay: Duration,
        finished: Arc<std::sync::Mutex<Vec<(Channel, Instant)>>>,
    }

    #[async_trait]
    impl ChannelDispatcher for Timed {
        fn channel(&self) -> Channel {
            self.channel
        }

        fn name(&self) -> &str {
            "timed"
        }

        async fn send_bulk(&self, recipients: &[Subscriber], _alert: &Alert) -> DispatchReport {
            tokio::time::sleep(self.delay).await;
            self.finished.lock().unwrap().push((self.channel, Instant::now()));
            let mut report = DispatchReport::new(self.channel);
            report.sent = recipients.len();
            report
        }
    }

    fn batches() -> ChannelBatches {
        let mut batches = ChannelBatches::default();
        batches.add(
            &Subscriber::new("a", PlanTier::Premium)
                .with_email("a@example.com")
                .with_chat("7", true),
        );
        batches
    }

    fn alert() -> Arc<Alert> {
        Arc::new(Alert::new(AlertType::RatioHigh, Severity::Medium, "ssr", Some(7.0), "high"))
    }

    #[tokio::test]
    async fn test_panicking_dispatcher_isolated() {
        let fanout = FanOut::new();
        fanout.register(Arc::new(Panicking)).await;
        fanout.register(Arc::new(Counting(Channel::Chat))).await;

        let reports = fanout.dispatch(alert(), batches()).await;
        assert_eq!(reports.len(), 2);

        assert_eq!(reports[0].channel, Channel::Mail);
        assert_eq!(reports[0].failed, 1);
        assert_eq!(reports[1].channel, Channel::Chat);
        assert_eq!(reports[1].sent, 1);
    }

    #[tokio::test]
    async fn test_missing_dispatcher_counts_failures() {
        let fanout = FanOut::new();
        fanout.register(Arc::new(Counting(Channel::Mail))).await;

        let reports = fanout.dispatch(alert(), batches()).await;
        let chat = reports.iter().find(|r| r.channel == Channel::Chat).unwrap();
        assert_eq!(chat.failed, 1);
        assert_eq!(fanout.channels().await, vec![Channel::Mail]);
    }

    #[tokio::test]
    async fn test_slow_channel_does_not_delay_others() {
        let finished = Arc::new(std::sync::Mutex::new(Vec::new()));
        let slow = Duration::from_millis(300);

        let fanout = FanOut::new();
        for (channel, delay) in [
            (Channel::Mail, slow),
            (Channel::Push, slow),
            (Channel::Chat, Duration::ZERO),
        ] {
            fanout
                .register(Arc::new(Timed {
                    channel,
                    delay,
                    finished: finished.clone(),
                }))
                .await;
        }

        let mut batches = batches();
        batches.add(&Subscriber::new("b", PlanTier::Premium).with_push(PushEndpoint {
            endpoint: "https://push.example.com/b".to_string(),
            p256dh: "k".to_string(),
            auth: "a".to_string(),
        }));

        let started = Instant::now();
        let reports = fanout.dispatch(alert(), batches).await;
        let elapsed = started.elapsed();

        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.sent == 1 && r.failed == 0));

        // 两个慢渠道并行，总耗时接近最慢的一个而不是两者之和
        assert!(elapsed >= slow);
        assert!(elapsed < slow * 2, "fan-out took {:?}", elapsed);

        let finished = finished.lock().unwrap();
        assert_eq!(finished[0].0, Channel::Chat);
        assert!(finished[0].1 - started < slow);
    }
}
