//! # Signal Notification
//!
//! 배포 엔진의 이벤트 탭을 구독하는 별도 소비자로서 알림을 외부로 전달합니다.
//!
//! 지원 채널:
//! - 로그 (tracing)
//! - Webhook (HTTP POST)
//!
//! 심각도 하한과 방해 금지 시간대 정책을 적용하며, 실패한 전달은 재시도하지 않습니다.

pub mod consumer;
pub mod policy;
pub mod sender;
pub mod types;

pub use consumer::{ConsumerStats, NotificationConsumer};
pub use policy::{Decision, NotificationPolicy, QuietHours};
pub use sender::{LogSender, NotificationManager, WebhookSender};
pub use types::*;
