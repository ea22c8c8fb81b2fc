//! Prometheus 메트릭 설정 및 유틸리티.
//!
//! 연결 수, 발행/전달/폐기 건수, 생존 확인 퇴출 건수를 수집하고
//! `/metrics` 엔드포인트로 노출합니다.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::error::{StreamError, StreamResult};

/// Prometheus 메트릭 레코더를 설정하고 핸들을 반환합니다.
///
/// 레코더가 이미 설치되어 있으면 에러를 반환합니다.
pub fn setup_metrics_recorder() -> StreamResult<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("publish_fanout_connections".to_string()),
            &[0.0, 1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0],
        )
        .map_err(|e| StreamError::Metrics(e.to_string()))?
        .install_recorder()
        .map_err(|e| StreamError::Metrics(e.to_string()))?;

    describe_metrics();
    Ok(handle)
}

fn describe_metrics() {
    describe_gauge!("ws_connections_active", "Currently registered WebSocket connections");
    describe_counter!("events_published_total", "Events published to the dispatcher");
    describe_counter!("deliveries_total", "Frames enqueued onto connection queues");
    describe_counter!("deliveries_dropped_total", "Frames dropped per connection");
    describe_counter!("liveness_evictions_total", "Connections evicted by the liveness monitor");
    describe_counter!("feed_cycles_failed_total", "Producer cycles skipped after a failure");
    describe_counter!("notifications_sent_total", "Alert notifications delivered");
    describe_histogram!("publish_fanout_connections", "Connections targeted per publish");
}

// ============================================================================
// 연결 메트릭
// ============================================================================

/// 활성 연결 수 증가.
pub fn increment_active_connections() {
    gauge!("ws_connections_active").increment(1.0);
}

/// 활성 연결 수 감소.
pub fn decrement_active_connections() {
    gauge!("ws_connections_active").decrement(1.0);
}

/// 생존 확인 퇴출 카운터 증가.
pub fn record_eviction() {
    counter!("liveness_evictions_total").increment(1);
}

// ============================================================================
// 배포 메트릭
// ============================================================================

/// 이벤트 발행 기록.
pub fn record_publish(event_type: &'static str, targeted: usize) {
    counter!("events_published_total", "type" => event_type).increment(1);
    histogram!("publish_fanout_connections").record(targeted as f64);
}

/// 큐에 넣은 프레임 수 기록.
pub fn record_deliveries(count: usize) {
    if count > 0 {
        counter!("deliveries_total").increment(count as u64);
    }
}

/// 폐기된 프레임 수 기록. `reason`은 `queue_full` 또는 `queue_closed`.
pub fn record_dropped(reason: &'static str, count: usize) {
    if count > 0 {
        counter!("deliveries_dropped_total", "reason" => reason).increment(count as u64);
    }
}
