use sentinel_types::{Alert, Severity};
use serde_json::json;

/// 各渠道的告警文案
#[derive(Debug, Clone, PartialEq)]
pub struct AlertMessage {
    /// 邮件标题
    pub subject: String,
    /// 邮件正文
    pub body: String,
    /// 聊天消息
    pub chat_text: String,
    /// 推送负载
    pub push_payload: serde_json::Value,
}

impl AlertMessage {
    pub fn render(alert: &Alert) -> Self {
        let marker = severity_marker(alert.severity);
        let title = title_case(alert.alert_type.as_str());
        let time = alert.timestamp.format("%Y-%m-%d %H:%M UTC");

        let subject = format!("[{}] {}", alert.severity.as_str().to_uppercase(), title);

        let mut body = format!("{}\n\nSeverity: {}\nMetric: {}\n", alert.message, alert.severity.as_str(), alert.metric);
        if let Some(value) = alert.value {
            body.push_str(&format!("Value: {}\n", value));
        }
        body.push_str(&format!("Time: {}\nAlert ID: {}\n", time, alert.id));

        let chat_text = format!("{} {}\n{}\n{}", marker, title, alert.message, time);

        let push_payload = json!({
            "title": format!("{} {}", marker, title),
            "body": alert.message,
            "tag": alert.alert_type.as_str(),
            "data": {
                "alert_id": alert.id,
                "type": alert.alert_type.as_str(),
                "severity": alert.severity.as_str(),
                "metric": alert.metric,
                "value": alert.value,
                "timestamp": alert.timestamp.to_rfc3339(),
            }
        });

        Self {
            subject,
            body,
            chat_text,
            push_payload,
        }
    }
}

fn severity_marker(severity: Severity) -> &'static str {
    match severity {
        Severity::High => "🔴",
        Severity::Medium => "🟠",
        Severity::Low => "🔵",
    }
}

/// ratio_extreme_low -> Ratio Extreme Low
fn title_case(snake: &str) -> String {
    snake
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
