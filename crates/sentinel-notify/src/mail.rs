use crate::dispatcher::{ChannelDispatcher, DeliveryPolicy, DispatchReport};
use crate::error::DeliveryError;
use crate::message::AlertMessage;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use sentinel_config::MailConfig;
use sentinel_types::{Alert, Channel, Subscriber};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 邮件发送
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send_mail(&self, to: &str, subject: &str, body: &str) -> Result<(), DeliveryError>;
}

/// SMTP 邮件发送（STARTTLS）
pub struct SmtpMailTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailTransport {
    pub fn new(config: &MailConfig) -> Result<Self, DeliveryError> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| DeliveryError::Rejected(format!("invalid sender {}: {}", config.from, e)))?;

        let creds = Credentials::new(config.username.clone(), config.password.clone());

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| DeliveryError::Rejected(format!("invalid SMTP relay: {}", e)))?
            .credentials(creds)
            .port(config.smtp_port)
            .build();

        Ok(Self { mailer, from })
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send_mail(&self, to: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        let to: Mailbox = to
            .parse()
            .map_err(|e| DeliveryError::Rejected(format!("invalid recipient {}: {}", to, e)))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| DeliveryError::Rejected(format!("failed to build message: {}", e)))?;

        match self.mailer.send(email).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_permanent() => Err(DeliveryError::Rejected(format!("SMTP: {}", e))),
            Err(e) => Err(DeliveryError::Transient(format!("SMTP: {}", e))),
        }
    }
}

/// 邮件渠道分发器
pub struct MailDispatcher {
    transport: Arc<dyn MailTransport>,
    policy: DeliveryPolicy,
}

impl MailDispatcher {
    pub fn new(transport: Arc<dyn MailTransport>, policy: DeliveryPolicy) -> Self {
        Self { transport, policy }
    }
}

#[async_trait]
impl ChannelDispatcher for MailDispatcher {
    fn channel(&self) -> Channel {
        Channel::Mail
    }

    fn name(&self) -> &str {
        "mail"
    }

    async fn send_bulk(&self, recipients: &[Subscriber], alert: &Alert) -> DispatchReport {
        let mut report = DispatchReport::new(Channel::Mail);
        let message = AlertMessage::render(alert);
        let transport = self.transport.as_ref();
        let subject = message.subject.as_str();
        let body = message.body.as_str();

        for recipient in recipients {
            let Some(address) = recipient.email.as_deref() else {
                warn!(subscriber_id = %recipient.id, "Mail recipient has no address");
                report.failed += 1;
                continue;
            };

            match self
                .policy
                .attempt("mail.send", move || transport.send_mail(address, subject, body))
                .await
            {
                Ok(()) => {
                    debug!(subscriber_id = %recipient.id, alert_id = %alert.id, "Mail sent");
                    report.sent += 1;
                }
                Err(e) => {
                    warn!(
                        subscriber_id = %recipient.id,
                        alert_id = %alert.id,
                        channel = "mail",
                        error = %e,
                        "Mail delivery failed"
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            alert_id = %alert.id,
            sent = report.sent,
            failed = report.failed,
            "Mail batch dispatched"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::RetryPolicy;
    use sentinel_types::{AlertType, PlanTier, Severity};
    use std::sync::Mutex;
    use std::time::Duration;

    /// 对指定地址始终失败的假传输
    struct FakeMail {
        fail_for: &'static str,
        delivered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MailTransport for FakeMail {
        async fn send_mail(&self, to: &str, subject: &str, _body: &str) -> Result<(), DeliveryError> {
            if to == self.fail_for {
                return Err(DeliveryError::Rejected("550 mailbox unavailable".to_string()));
            }
            assert!(subject.starts_with("[HIGH]"));
            self.delivered.lock().unwrap().push(to.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_batch() {
        let transport = Arc::new(FakeMail {
            fail_for: "bad@example.com",
            delivered: Mutex::new(Vec::new()),
        });
        let policy = DeliveryPolicy::new(Duration::from_secs(1), RetryPolicy::none());
        let dispatcher = MailDispatcher::new(transport.clone(), policy);

        let recipients = vec![
            Subscriber::new("a", PlanTier::Premium).with_email("bad@example.com"),
            Subscriber::new("b", PlanTier::Premium).with_email("good@example.com"),
            Subscriber::new("c", PlanTier::Premium),
        ];
        let alert = Alert::new(AlertType::SupplyDecline, Severity::High, "stablecoin_supply_change_pct", Some(-7.0), "decline");

        let report = dispatcher.send_bulk(&recipients, &alert).await;
        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(*transport.delivered.lock().unwrap(), vec!["good@example.com"]);
    }

    #[test]
    fn test_smtp_transport_rejects_bad_sender() {
        let config = MailConfig {
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: 587,
            username: "u".to_string(),
            password: "p".to_string(),
            from: "not an address".to_string(),
        };
        assert!(matches!(SmtpMailTransport::new(&config), Err(DeliveryError::Rejected(_))));
    }
}
