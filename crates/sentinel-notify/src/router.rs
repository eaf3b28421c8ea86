use sentinel_types::{Alert, Channel, NotificationJob, PlanTier, Subscriber};
use std::sync::Arc;
use tracing::debug;

/// 按渠道分组的收件人，同一订阅者可出现在 0~3 个列表中
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelBatches {
    pub mail: Vec<Subscriber>,
    pub push: Vec<Subscriber>,
    pub chat: Vec<Subscriber>,
}

impl ChannelBatches {
    pub fn get(&self, channel: Channel) -> &[Subscriber] {
        match channel {
            Channel::Mail => &self.mail,
            Channel::Push => &self.push,
            Channel::Chat => &self.chat,
        }
    }

    fn get_mut(&mut self, channel: Channel) -> &mut Vec<Subscriber> {
        match channel {
            Channel::Mail => &mut self.mail,
            Channel::Push => &mut self.push,
            Channel::Chat => &mut self.chat,
        }
    }

    /// 按渠道资格加入
    pub fn add(&mut self, subscriber: &Subscriber) {
        for channel in Channel::ALL {
            if subscriber.accepts(channel) {
                self.get_mut(channel).push(subscriber.clone());
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 投递次数（订阅者 × 渠道）
    pub fn len(&self) -> usize {
        self.mail.len() + self.push.len() + self.chat.len()
    }

    pub fn into_jobs(self, alert: Arc<Alert>) -> Vec<NotificationJob> {
        let mut jobs = Vec::with_capacity(self.len());
        for (channel, subscribers) in [
            (Channel::Mail, self.mail),
            (Channel::Push, self.push),
            (Channel::Chat, self.chat),
        ] {
            jobs.extend(subscribers.into_iter().map(|subscriber| NotificationJob {
                alert: alert.clone(),
                subscriber,
                channel,
            }));
        }
        jobs
    }

    /// 把任务按告警重新分组，保持首次出现的顺序
    pub fn from_jobs(jobs: Vec<NotificationJob>) -> Vec<(Arc<Alert>, ChannelBatches)> {
        let mut groups: Vec<(Arc<Alert>, ChannelBatches)> = Vec::new();

        for job in jobs {
            let index = match groups.iter().position(|(alert, _)| alert.id == job.alert.id) {
                Some(index) => index,
                None => {
                    groups.push((job.alert.clone(), ChannelBatches::default()));
                    groups.len() - 1
                }
            };
            groups[index].1.get_mut(job.channel).push(job.subscriber);
        }

        groups
    }
}

/// 路由结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutePlan {
    /// 付费用户，立即投递
    pub immediate: ChannelBatches,
    /// 免费用户，进入延迟队列
    pub deferred: ChannelBatches,
}

/// 通知路由器
///
/// 只负责分组，不做投递。订阅者由调用方从仓库注入。
#[derive(Debug, Clone)]
pub struct NotificationRouter {
    defer_free_tier: bool,
}

impl NotificationRouter {
    pub fn new(defer_free_tier: bool) -> Self {
        Self { defer_free_tier }
    }

    pub fn route(&self, alert: &Alert, subscribers: &[Subscriber]) -> RoutePlan {
        let mut plan = RoutePlan::default();

        for subscriber in subscribers.iter().filter(|s| s.has_any_channel()) {
            match subscriber.plan_tier {
                PlanTier::Free if self.defer_free_tier => plan.deferred.add(subscriber),
                _ => plan.immediate.add(subscriber),
            }
        }

        debug!(
            alert_id = %alert.id,
            immediate = plan.immediate.len(),
            deferred = plan.deferred.len(),
            "Alert routed"
        );
        plan
    }
}

impl Default for NotificationRouter {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_types::{AlertType, PushEndpoint, Severity};

    fn alert() -> Alert {
        Alert::new(AlertType::ExtremeInflow, Severity::High, "etf_net_flow", Some(2e6), "inflow")
    }

    fn push_endpoint() -> PushEndpoint {
        PushEndpoint {
            endpoint: "https://push.example.com/1".to_string(),
            p256dh: "k".to_string(),
            auth: "a".to_string(),
        }
    }

    #[test]
    fn test_route_splits_by_tier_and_channel() {
        let subscribers = vec![
            Subscriber::new("p1", PlanTier::Premium)
                .with_email("p1@example.com")
                .with_push(push_endpoint())
                .with_chat("42", true),
            Subscriber::new("p2", PlanTier::Premium).with_chat("43", false),
            Subscriber::new("f1", PlanTier::Free).with_email("f1@example.com"),
        ];

        let plan = NotificationRouter::default().route(&alert(), &subscribers);

        assert_eq!(plan.immediate.mail.len(), 1);
        assert_eq!(plan.immediate.push.len(), 1);
        assert_eq!(plan.immediate.chat.len(), 1);
        // 未验证的聊天账号没有任何可用渠道
        assert!(plan.immediate.get(Channel::Chat).iter().all(|s| s.id == "p1"));

        assert_eq!(plan.deferred.mail.len(), 1);
        assert_eq!(plan.deferred.len(), 1);
    }

    #[test]
    fn test_mail_requires_address() {
        let mut subscriber = Subscriber::new("x", PlanTier::Premium);
        subscriber.email_enabled = true;

        let plan = NotificationRouter::default().route(&alert(), &[subscriber]);
        assert!(plan.immediate.is_empty());
    }

    #[test]
    fn test_free_tier_immediate_when_deferral_disabled() {
        let subscribers = vec![Subscriber::new("f1", PlanTier::Free).with_email("f1@example.com")];
        let plan = NotificationRouter::new(false).route(&alert(), &subscribers);

        assert_eq!(plan.immediate.mail.len(), 1);
        assert!(plan.deferred.is_empty());
    }

    #[test]
    fn test_jobs_regroup_by_alert() {
        let first = Arc::new(alert());
        let second = Arc::new(alert());

        let mut batches = ChannelBatches::default();
        batches.add(&Subscriber::new("a", PlanTier::Free).with_email("a@example.com").with_chat("1", true));

        let mut jobs = batches.clone().into_jobs(first.clone());
        jobs.extend(batches.into_jobs(second.clone()));
        assert_eq!(jobs.len(), 4);

        let groups = ChannelBatches::from_jobs(jobs);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0.id, first.id);
        assert_eq!(groups[0].1.mail.len(), 1);
        assert_eq!(groups[0].1.chat.len(), 1);
        assert_eq!(groups[1].0.id, second.id);
    }
}
