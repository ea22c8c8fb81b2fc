//! 배포 엔진.
//!
//! `main`에서 명시적으로 생성해 `Arc`로 공유합니다. 전역 상태는 없습니다.
//! 엔진은 레지스트리, 디스패처, 스냅샷 핸들, 이벤트 탭, 루트 취소 토큰을 소유합니다.

use std::sync::Arc;
use std::time::Instant;

use signal_core::{Event, StreamConfig};
use signal_data::DataSnapshot;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::error::StreamResult;
use crate::websocket::{ConnectionRegistry, Dispatcher, LivenessMonitor, PublishReport};

/// 이벤트 탭 버퍼 크기. 느린 탭 소비자는 lagged로 건너뜁니다.
const EVENT_TAP_CAPACITY: usize = 1024;

/// 공유 엔진 핸들.
pub type SharedEngine = Arc<StreamEngine>;

/// 실시간 배포 엔진.
pub struct StreamEngine {
    registry: Arc<ConnectionRegistry>,
    dispatcher: Dispatcher,
    snapshot: Arc<dyn DataSnapshot>,
    tap: broadcast::Sender<Arc<Event>>,
    settings: StreamConfig,
    started_at: Instant,
    root: CancellationToken,
    sessions: TaskTracker,
}

impl StreamEngine {
    pub fn new(settings: StreamConfig, snapshot: Arc<dyn DataSnapshot>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tap, _) = broadcast::channel(EVENT_TAP_CAPACITY);

        Self {
            dispatcher: Dispatcher::new(registry.clone()),
            registry,
            snapshot,
            tap,
            settings,
            started_at: Instant::now(),
            root: CancellationToken::new(),
            sessions: TaskTracker::new(),
        }
    }

    pub fn shared(self) -> SharedEngine {
        Arc::new(self)
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn snapshot(&self) -> Arc<dyn DataSnapshot> {
        self.snapshot.clone()
    }

    pub fn settings(&self) -> &StreamConfig {
        &self.settings
    }

    /// 연결 핸들러 태스크 추적기.
    pub fn sessions(&self) -> &TaskTracker {
        &self.sessions
    }

    /// 새 연결용 종료 토큰. 엔진 종료 시 함께 취소됩니다.
    pub fn connection_token(&self) -> CancellationToken {
        self.root.child_token()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.root.is_cancelled()
    }

    /// 이벤트를 연결들에 배포하고 탭 구독자에게도 전달합니다.
    pub fn publish(&self, event: Event) -> StreamResult<PublishReport> {
        let report = self.dispatcher.publish(&event)?;
        if self.tap.receiver_count() > 0 {
            // 수신자가 모두 사라진 경우만 실패하므로 무시
            let _ = self.tap.send(Arc::new(event));
        }
        Ok(report)
    }

    /// 배포된 이벤트 탭을 구독합니다 (알림 소비자 등).
    pub fn subscribe_events(&self) -> broadcast::Receiver<Arc<Event>> {
        self.tap.subscribe()
    }

    /// 수집 채널을 열고 수신한 이벤트를 배포하는 루프를 시작합니다.
    pub fn spawn_ingest(self: &Arc<Self>) -> (mpsc::Sender<Event>, JoinHandle<u64>) {
        let (tx, mut rx) = mpsc::channel::<Event>(self.settings.ingest_buffer);
        let engine = self.clone();

        let handle = tokio::spawn(async move {
            let mut published = 0u64;
            loop {
                tokio::select! {
                    _ = engine.root.cancelled() => break,
                    next = rx.recv() => match next {
                        Some(event) => {
                            let kind = event.kind();
                            match engine.publish(event) {
                                Ok(_) => published += 1,
                                Err(e) => error!(event_type = kind, error = %e, "Failed to publish event"),
                            }
                        }
                        None => break,
                    },
                }
            }
            debug!(published, "Ingest loop stopped");
            published
        });

        (tx, handle)
    }

    /// 생존 확인 모니터와 하트비트 타이머를 시작합니다.
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let monitor = LivenessMonitor::new(self.registry.clone(), self.settings.liveness_interval());
        let liveness = tokio::spawn(monitor.run(self.root.child_token()));

        let engine = self.clone();
        let heartbeat = tokio::spawn(async move { engine.heartbeat_loop().await });

        info!(
            liveness_secs = self.settings.liveness_interval_secs,
            heartbeat_secs = self.settings.heartbeat_interval_secs,
            "Stream engine started"
        );
        vec![liveness, heartbeat]
    }

    async fn heartbeat_loop(&self) {
        let period = self.settings.heartbeat_interval();
        let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.root.cancelled() => break,
                _ = ticker.tick() => {
                    let event = Event::heartbeat(self.registry.total_connections(), self.uptime_secs());
                    if let Err(e) = self.publish(event) {
                        warn!(error = %e, "Failed to publish heartbeat");
                    }
                }
            }
        }
    }

    /// 엔진을 종료합니다.
    ///
    /// 타이머를 멈추고 모든 연결에 close 프레임을 보낸 뒤, 송신이 끝나기를
    /// `shutdown_grace_ms`까지 기다립니다. 남은 연결 수를 반환합니다.
    pub async fn shutdown(&self) -> usize {
        if self.root.is_cancelled() {
            return self.registry.total_connections();
        }

        let open = self.registry.total_connections();
        info!(connections = open, "Shutting down stream engine");

        self.root.cancel();
        for conn in self.registry.snapshot() {
            conn.force_close();
        }

        self.sessions.close();
        if tokio::time::timeout(self.settings.shutdown_grace(), self.sessions.wait())
            .await
            .is_err()
        {
            warn!(
                grace_ms = self.settings.shutdown_grace_ms,
                "Connections did not close within grace period"
            );
        }

        let remaining = self.registry.total_connections();
        info!(remaining, "Stream engine stopped");
        remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::{Connection, ConnectionId, Outbound};
    use signal_core::{AlertSeverity, AlertType, TradingAlert};
    use signal_data::MemoryStore;
    use std::time::Duration;

    fn engine(settings: StreamConfig) -> SharedEngine {
        StreamEngine::new(settings, Arc::new(MemoryStore::with_defaults())).shared()
    }

    fn connect(engine: &StreamEngine, topics: &[&str]) -> (Arc<Connection>, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(16);
        let conn = Arc::new(Connection::new(ConnectionId::generate(), tx, engine.connection_token()));
        conn.mark_open();
        engine.registry().register(conn.clone()).unwrap();
        for topic in topics {
            engine.registry().subscribe(conn.id(), topic).unwrap();
        }
        (conn, rx)
    }

    fn alert() -> Event {
        Event::NewAlert {
            alert: TradingAlert::new("AAPL", AlertType::RiskWarning, AlertSeverity::Critical, "halt"),
        }
    }

    #[tokio::test]
    async fn test_publish_feeds_connections_and_tap() {
        let engine = engine(StreamConfig::default());
        let (_conn, mut rx) = connect(&engine, &["alerts"]);
        let mut tap = engine.subscribe_events();

        let report = engine.publish(alert()).unwrap();
        assert_eq!(report.delivered, 1);
        assert!(matches!(rx.try_recv(), Ok(Outbound::Frame(_))));
        assert_eq!(tap.recv().await.unwrap().kind(), "new_alert");
    }

    #[tokio::test]
    async fn test_ingest_channel_publishes() {
        let engine = engine(StreamConfig::default());
        let (_conn, mut rx) = connect(&engine, &["*"]);
        let (tx, handle) = engine.spawn_ingest();

        tx.send(alert()).await.unwrap();
        tx.send(Event::heartbeat(1, 0)).await.unwrap();
        drop(tx);

        let published = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(published, 2);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_reaches_unsubscribed_connection() {
        let settings = StreamConfig {
            heartbeat_interval_secs: 5,
            liveness_interval_secs: 3600,
            ..Default::default()
        };
        let engine = engine(settings);
        let (_conn, mut rx) = connect(&engine, &[]);
        let tasks = engine.start();

        tokio::time::sleep(Duration::from_secs(6)).await;
        match rx.try_recv() {
            Ok(Outbound::Frame(frame)) => assert!(frame.contains("system_heartbeat")),
            other => panic!("expected heartbeat frame, got {:?}", other),
        }

        engine.shutdown().await;
        for task in tasks {
            task.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_shutdown_closes_connections() {
        let engine = engine(StreamConfig {
            shutdown_grace_ms: 50,
            ..Default::default()
        });
        let (conn, _rx) = connect(&engine, &["signals"]);

        // 핸들러 없이 등록만 된 연결은 남음
        let remaining = engine.shutdown().await;
        assert_eq!(remaining, 1);
        assert!(conn.close_token().is_cancelled());
        assert!(engine.is_shutting_down());
        assert_eq!(engine.shutdown().await, 1);
    }
}
