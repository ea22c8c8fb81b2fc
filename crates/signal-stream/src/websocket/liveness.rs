//! 생존 확인 모니터.
//!
//! 주기마다 모든 연결을 검사합니다:
//! - 이전 주기 이후 pong이 없었던 연결은 레지스트리에서 제거하고 강제 종료합니다.
//! - 나머지는 `alive = false`로 바꾸고 저수준 ping을 보냅니다.
//!   송신 큐가 가득 차 ping을 넣지 못하면 `alive`를 되돌리고 다음 주기에 다시 시도합니다.
//!
//! 응답하지 않는 연결은 최대 두 주기 안에 퇴출됩니다.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::messages::Outbound;
use super::registry::ConnectionRegistry;
use crate::error::StreamError;
use crate::metrics::record_eviction;

/// 검사 한 번의 결과.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LivenessReport {
    /// ping을 보낸 연결 수
    pub pinged: usize,
    /// 퇴출한 연결 수
    pub evicted: usize,
    /// 큐가 가득 차 ping을 다음 주기로 미룬 연결 수
    pub deferred: usize,
}

/// 주기적 ping/pong 검사기.
#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    registry: Arc<ConnectionRegistry>,
    period: Duration,
}

impl LivenessMonitor {
    pub fn new(registry: Arc<ConnectionRegistry>, period: Duration) -> Self {
        Self { registry, period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// 검사를 한 번 수행합니다.
    pub fn tick(&self) -> LivenessReport {
        let mut report = LivenessReport::default();

        for conn in self.registry.snapshot() {
            if !conn.take_alive() {
                if self.registry.unregister(conn.id()).is_some() {
                    report.evicted += 1;
                    record_eviction();
                    info!(conn_id = %conn.id(), "Evicting unresponsive connection");
                }
                conn.force_close();
                continue;
            }

            match conn.try_enqueue(Outbound::Ping) {
                Ok(()) => {
                    conn.record_ping();
                    report.pinged += 1;
                }
                Err(StreamError::QueueFull(_)) => {
                    // ping을 보내지 못한 주기는 응답 없음으로 세지 않음
                    conn.restore_alive();
                    report.deferred += 1;
                    debug!(conn_id = %conn.id(), "Outbound queue full, ping deferred to next check");
                }
                Err(e) => {
                    debug!(conn_id = %conn.id(), error = %e, "Ping not queued, closing connection");
                    if self.registry.unregister(conn.id()).is_some() {
                        report.evicted += 1;
                        record_eviction();
                    }
                    conn.force_close();
                }
            }
        }

        if report.evicted > 0 || report.deferred > 0 {
            debug!(
                pinged = report.pinged,
                evicted = report.evicted,
                deferred = report.deferred,
                "Liveness check finished"
            );
        }
        report
    }

    /// 취소될 때까지 주기적으로 검사합니다. 첫 검사는 한 주기 뒤에 실행됩니다.
    pub async fn run(self, cancel: CancellationToken) {
        info!(period_secs = self.period.as_secs(), "Liveness monitor started");

        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick();
                }
            }
        }

        info!("Liveness monitor stopped");
    }
}
