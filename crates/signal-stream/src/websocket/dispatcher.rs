//! 브로드캐스트 디스패처.
//!
//! 이벤트를 한 번만 직렬화한 뒤 일치하는 모든 연결의 송신 큐에 논블로킹으로 넣습니다.
//! 한 연결의 큐가 가득 차거나 닫혀도 다른 연결로의 전달은 계속됩니다 (최대 한 번 전달).

use std::sync::Arc;

use signal_core::Event;
use tracing::{debug, warn};

use super::messages::{EncodedEvent, Outbound};
use super::registry::ConnectionRegistry;
use super::topics::{classify, is_unconditional};
use crate::error::{StreamError, StreamResult};
use crate::metrics::{record_deliveries, record_dropped, record_publish};

/// 발행 한 번의 결과.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// 대상 연결 수
    pub targeted: usize,
    /// 큐에 넣은 연결 수
    pub delivered: usize,
    /// 큐가 가득 차 폐기된 수
    pub dropped_full: usize,
    /// 큐가 닫혀 폐기된 수
    pub dropped_closed: usize,
}

impl PublishReport {
    pub fn dropped(&self) -> usize {
        self.dropped_full + self.dropped_closed
    }
}

/// 이벤트 팬아웃.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// 이벤트를 구독 중인 연결에 전달합니다.
    ///
    /// 하트비트는 모든 연결에, 그 외 이벤트는 토픽이 하나라도 일치하거나
    /// `*`를 구독한 연결에 한 번씩 전달합니다. 호출은 블로킹되지 않습니다.
    pub fn publish(&self, event: &Event) -> StreamResult<PublishReport> {
        let topics = classify(event);
        let unconditional = is_unconditional(event);
        let mut report = PublishReport::default();

        if topics.is_empty() && !unconditional {
            return Ok(report);
        }

        let targets: Vec<_> = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|conn| unconditional || conn.matches(&topics))
            .collect();
        report.targeted = targets.len();

        if !targets.is_empty() {
            let encoded = EncodedEvent::encode(event)?;

            for conn in &targets {
                let frame = match encoded.frame_for(conn.id()) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(conn_id = %conn.id(), error = %e, "Failed to frame event");
                        continue;
                    }
                };

                match conn.try_enqueue(Outbound::Frame(frame)) {
                    Ok(()) => report.delivered += 1,
                    Err(StreamError::QueueFull(id)) => {
                        debug!(conn_id = %id, event_type = event.kind(), "Outbound queue full, dropping event");
                        report.dropped_full += 1;
                    }
                    Err(_) => report.dropped_closed += 1,
                }
            }
        }

        record_publish(event.kind(), report.targeted);
        record_deliveries(report.delivered);
        record_dropped("queue_full", report.dropped_full);
        record_dropped("queue_closed", report.dropped_closed);

        debug!(
            event_type = event.kind(),
            targeted = report.targeted,
            delivered = report.delivered,
            dropped = report.dropped(),
            "Event published"
        );

        Ok(report)
    }
}
