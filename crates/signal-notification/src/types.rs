//! 알림 타입 및 trait 정의.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use signal_core::{AlertSeverity, AlertType, TradingAlert};
use uuid::Uuid;

/// 외부로 전달할 알림 메시지.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// 고유 알림 ID
    pub id: String,
    /// 원본 알림 ID
    pub alert_id: Uuid,
    /// 종목 티커
    pub ticker: String,
    /// 알림 유형
    pub alert_type: AlertType,
    /// 심각도
    pub severity: AlertSeverity,
    /// 제목
    pub title: String,
    /// 본문
    pub message: String,
    /// 타임스탬프
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// 리스크 알림으로부터 알림 메시지를 만듭니다.
    pub fn from_alert(alert: &TradingAlert) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            alert_id: alert.id,
            ticker: alert.ticker.clone(),
            alert_type: alert.alert_type,
            severity: alert.severity,
            title: format!("[{}] {}", alert.severity.to_string().to_uppercase(), alert.ticker),
            message: alert.message.clone(),
            timestamp: alert.created_at,
        }
    }
}

/// 알림 작업용 Result 타입.
pub type NotificationResult<T> = Result<T, NotificationError>;

/// 알림 에러.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("알림 전송 실패: {0}")]
    Delivery(String),

    #[error("잘못된 설정: {0}")]
    Config(String),

    #[error("네트워크 에러: {0}")]
    Http(#[from] reqwest::Error),

    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 알림 전송기 trait.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// 알림을 전송합니다.
    async fn send(&self, notification: &Notification) -> NotificationResult<()>;

    /// 전송기가 활성화되어 있는지 확인합니다.
    fn is_enabled(&self) -> bool;

    /// 전송기 이름을 반환합니다.
    fn name(&self) -> &str;
}
