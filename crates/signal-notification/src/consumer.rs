//! 이벤트 탭 소비자.
//!
//! 엔진의 브로드캐스트 탭에서 `NewAlert` 이벤트만 골라 정책을 적용하고 전달합니다.
//! 수신이 밀려 건너뛴 이벤트(lagged)는 경고 로그만 남깁니다.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use signal_core::Event;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::policy::{Decision, NotificationPolicy};
use crate::sender::NotificationManager;
use crate::types::Notification;

/// 소비자 집계 통계.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// 전달한 알림 수
    pub delivered: u64,
    /// 정책으로 걸러진 알림 수
    pub filtered: u64,
    /// 전송 실패 수 (전송기 단위)
    pub failed: u64,
    /// 수신 지연으로 놓친 이벤트 수
    pub lagged: u64,
}

/// 알림 소비자.
pub struct NotificationConsumer {
    policy: NotificationPolicy,
    manager: NotificationManager,
    stats: ConsumerStats,
}

impl NotificationConsumer {
    pub fn new(policy: NotificationPolicy, manager: NotificationManager) -> Self {
        Self {
            policy,
            manager,
            stats: ConsumerStats::default(),
        }
    }

    pub fn stats(&self) -> &ConsumerStats {
        &self.stats
    }

    /// 탭이 닫히거나 취소될 때까지 이벤트를 소비합니다.
    pub async fn run(
        mut self,
        mut events: broadcast::Receiver<Arc<Event>>,
        cancel: CancellationToken,
    ) -> ConsumerStats {
        info!(senders = self.manager.len(), "Notification consumer started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = events.recv() => match received {
                    Ok(event) => self.handle(&event, Utc::now()).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Notification consumer lagged behind event tap");
                        self.stats.lagged += skipped;
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        info!(
            delivered = self.stats.delivered,
            filtered = self.stats.filtered,
            failed = self.stats.failed,
            lagged = self.stats.lagged,
            "Notification consumer stopped"
        );
        self.stats
    }

    /// 이벤트 하나를 처리합니다. 알림 이외의 이벤트는 무시합니다.
    pub async fn handle(&mut self, event: &Event, at: DateTime<Utc>) {
        let Event::NewAlert { alert } = event else {
            return;
        };

        match self.policy.evaluate(alert, at) {
            Decision::Deliver => {
                let failures = self.manager.notify(&Notification::from_alert(alert)).await;
                self.stats.delivered += 1;
                self.stats.failed += failures as u64;
                counter!("notifications_sent_total").increment(1);
            }
            decision => {
                debug!(alert_id = %alert.id, severity = %alert.severity, ?decision, "Notification suppressed");
                self.stats.filtered += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::QuietHours;
    use crate::types::{NotificationResult, NotificationSender};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use chrono_tz::Tz;
    use signal_core::{AlertSeverity, AlertType, MarketStatus, TradingAlert};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct RecordingSender {
        sent: Arc<Mutex<Vec<Notification>>>,
    }

    #[async_trait]
    impl NotificationSender for RecordingSender {
        async fn send(&self, notification: &Notification) -> NotificationResult<()> {
            self.sent.lock().unwrap().push(notification.clone());
            Ok(())
        }

        fn is_enabled(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    fn consumer(sender: RecordingSender) -> NotificationConsumer {
        let mut manager = NotificationManager::new();
        manager.add_sender(sender);
        let policy = NotificationPolicy::new(
            AlertSeverity::High,
            Some(QuietHours {
                start_hour: 22,
                end_hour: 7,
            }),
            Tz::UTC,
        );
        NotificationConsumer::new(policy, manager)
    }

    fn alert_event(severity: AlertSeverity) -> Event {
        Event::NewAlert {
            alert: TradingAlert::new("NVDA", AlertType::VolumeSpike, severity, "volume 4.0x average"),
        }
    }

    #[tokio::test]
    async fn test_handle_applies_policy() {
        let sender = RecordingSender::default();
        let mut consumer = consumer(sender.clone());
        let noon = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).single().unwrap();
        let night = Utc.with_ymd_and_hms(2026, 10, 19, 23, 30, 0).single().unwrap();

        consumer.handle(&alert_event(AlertSeverity::Low), noon).await;
        consumer.handle(&alert_event(AlertSeverity::High), noon).await;
        consumer.handle(&alert_event(AlertSeverity::High), night).await;
        consumer.handle(&alert_event(AlertSeverity::Critical), night).await;
        consumer
            .handle(
                &Event::MarketStatusChanged {
                    status: MarketStatus::Open,
                    timestamp: noon,
                },
                noon,
            )
            .await;

        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].severity, AlertSeverity::Critical);
        assert_eq!(consumer.stats().filtered, 2);
    }

    #[tokio::test]
    async fn test_run_consumes_tap_until_closed() {
        let sender = RecordingSender::default();
        // 방해 금지 없이 모두 전달
        let mut manager = NotificationManager::new();
        manager.add_sender(sender.clone());
        let policy = NotificationPolicy::new(AlertSeverity::Low, None, Tz::UTC);
        let consumer = NotificationConsumer::new(policy, manager);

        let (tx, rx) = broadcast::channel(16);
        let handle = tokio::spawn(consumer.run(rx, CancellationToken::new()));

        tx.send(Arc::new(alert_event(AlertSeverity::Medium))).unwrap();
        tx.send(Arc::new(alert_event(AlertSeverity::Low))).unwrap();
        drop(tx);

        let stats = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.delivered, 2);
        assert_eq!(sender.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_lagged_receiver_is_counted() {
        let policy = NotificationPolicy::new(AlertSeverity::Low, None, Tz::UTC);
        let consumer = NotificationConsumer::new(policy, NotificationManager::new());

        let (tx, rx) = broadcast::channel(2);
        for _ in 0..5 {
            tx.send(Arc::new(alert_event(AlertSeverity::High))).unwrap();
        }
        drop(tx);

        let stats = consumer.run(rx, CancellationToken::new()).await;
        assert_eq!(stats.lagged, 3);
        assert_eq!(stats.delivered, 2);
    }
}
