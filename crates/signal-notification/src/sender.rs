//! 알림 전송기.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::types::{Notification, NotificationError, NotificationResult, NotificationSender};

/// tracing 로그로 알림을 남기는 전송기.
#[derive(Debug, Default, Clone)]
pub struct LogSender;

#[async_trait]
impl NotificationSender for LogSender {
    async fn send(&self, notification: &Notification) -> NotificationResult<()> {
        warn!(
            ticker = %notification.ticker,
            severity = %notification.severity,
            alert_id = %notification.alert_id,
            "{}: {}",
            notification.title,
            notification.message
        );
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// 알림을 JSON으로 POST 하는 Webhook 전송기.
pub struct WebhookSender {
    client: reqwest::Client,
    url: String,
}

impl WebhookSender {
    /// 새 Webhook 전송기를 생성합니다.
    pub fn new(url: impl Into<String>) -> NotificationResult<Self> {
        let url = url.into();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(NotificationError::Config(format!("webhook URL: {}", url)));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self { client, url })
    }
}

#[async_trait]
impl NotificationSender for WebhookSender {
    async fn send(&self, notification: &Notification) -> NotificationResult<()> {
        debug!(url = %self.url, id = %notification.id, "Posting webhook notification");

        let response = self.client.post(&self.url).json(notification).send().await?;

        if response.status().is_success() {
            info!(alert_id = %notification.alert_id, "Webhook notification sent");
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Failed to send webhook notification: {} - {}", status, body);
            Err(NotificationError::Delivery(format!("HTTP {}: {}", status, body)))
        }
    }

    fn is_enabled(&self) -> bool {
        !self.url.is_empty()
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

/// 여러 전송기를 관리하는 알림 관리자.
#[derive(Default)]
pub struct NotificationManager {
    senders: Vec<Box<dyn NotificationSender>>,
}

impl NotificationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 알림 전송기를 추가합니다.
    pub fn add_sender<S: NotificationSender + 'static>(&mut self, sender: S) {
        self.senders.push(Box::new(sender));
    }

    /// 등록된 전송기 수.
    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    /// 활성화된 모든 전송기로 전송하고 실패한 전송기 수를 반환합니다.
    ///
    /// 실패한 전송은 로그만 남기고 재시도하지 않습니다.
    pub async fn notify(&self, notification: &Notification) -> usize {
        let mut failures = 0;

        for sender in self.senders.iter().filter(|s| s.is_enabled()) {
            if let Err(e) = sender.send(notification).await {
                error!("Failed to send notification via {}: {}", sender.name(), e);
                failures += 1;
            }
        }

        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signal_core::{AlertSeverity, AlertType, TradingAlert};

    struct BrokenSender;

    #[async_trait]
    impl NotificationSender for BrokenSender {
        async fn send(&self, _notification: &Notification) -> NotificationResult<()> {
            Err(NotificationError::Delivery("connection refused".to_string()))
        }

        fn is_enabled(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    #[test]
    fn test_webhook_rejects_invalid_url() {
        assert!(WebhookSender::new("ftp://example.com").is_err());
        assert!(WebhookSender::new("https://hooks.example.com/alerts").is_ok());
    }

    #[tokio::test]
    async fn test_manager_counts_failures() {
        let mut manager = NotificationManager::new();
        manager.add_sender(LogSender);
        manager.add_sender(BrokenSender);
        assert_eq!(manager.len(), 2);

        let alert = TradingAlert::new("AAPL", AlertType::RiskWarning, AlertSeverity::High, "drawdown");
        let failures = manager.notify(&Notification::from_alert(&alert)).await;
        assert_eq!(failures, 1);
    }
}
