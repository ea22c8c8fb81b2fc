//! WebSocket 연결 handler.
//!
//! 연결마다 두 개의 루프가 돕니다:
//! - 수신 루프: 제어 메시지 처리, pong 기록, 종료 감지
//! - 송신 루프: 송신 큐를 순서대로 소켓에 기록
//!
//! 종료는 `OPEN → CLOSING` 전이에 성공한 쪽에서 한 번만 수행합니다.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::messages::{Outbound, ProtocolError, ServerMessage};
use super::registry::{Connection, ConnectionId, ConnectionRegistry};
use super::session::Session;
use crate::engine::SharedEngine;

/// WebSocket 업그레이드 핸들러.
///
/// # 엔드포인트
///
/// `GET <server.ws_path>` (기본값 `/ws/trading`)
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(engine): State<SharedEngine>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        let tracker = engine.sessions().clone();
        tracker.track_future(handle_socket(socket, engine))
    })
}

/// WebSocket 연결 처리.
async fn handle_socket(socket: WebSocket, engine: SharedEngine) {
    let id = ConnectionId::generate();
    let (tx, rx) = mpsc::channel(engine.settings().outbound_queue_capacity);
    let close = engine.connection_token();
    let conn = Arc::new(Connection::new(id, tx, close.clone()));
    let session = Session::new(conn.clone(), engine.registry().clone(), engine.snapshot());

    // 환영 메시지가 어떤 이벤트보다 먼저 큐에 들어가도록 등록 전에 넣음
    if let Err(e) = session.welcome() {
        warn!(conn_id = %id, error = %e, "Failed to queue welcome message");
        return;
    }
    conn.mark_open();
    if let Err(e) = engine.registry().register(conn.clone()) {
        warn!(conn_id = %id, error = %e, "Connection rejected");
        return;
    }
    info!(conn_id = %id, "WebSocket connected");

    let (sink, mut stream) = socket.split();
    let writer = tokio::spawn(write_loop(sink, rx, close.clone(), id));

    loop {
        tokio::select! {
            _ = close.cancelled() => {
                debug!(conn_id = %id, "Connection closed by server");
                break;
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    // 큐가 가득 찬 경우 응답만 폐기되며 연결은 유지
                    let _ = session.handle_text(text.as_str()).await;
                }
                Some(Ok(Message::Pong(_))) => conn.mark_alive(),
                Some(Ok(Message::Ping(_))) => conn.touch(),
                Some(Ok(Message::Binary(_))) => {
                    let _ = session.reply(&ServerMessage::error(ProtocolError::InvalidMessage(
                        "binary frames are not supported".to_string(),
                    )));
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!(conn_id = %id, "Close received from client");
                    break;
                }
                Some(Err(e)) => {
                    debug!(conn_id = %id, error = %e, "WebSocket receive error");
                    break;
                }
            },
        }
    }

    teardown(engine.registry(), &conn, writer, engine.settings().shutdown_grace()).await;
}

/// 송신 큐를 소켓에 기록합니다.
///
/// 종료 신호를 받으면 남은 큐를 비우고 close 프레임을 보낸 뒤 끝납니다.
/// 쓰기 실패 시 연결 토큰을 취소해 수신 루프도 멈추게 합니다.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Outbound>,
    close: CancellationToken,
    id: ConnectionId,
) {
    loop {
        tokio::select! {
            biased;
            _ = close.cancelled() => break,
            next = rx.recv() => match next {
                Some(outbound) => {
                    if let Err(e) = sink.send(into_message(outbound)).await {
                        debug!(conn_id = %id, error = %e, "WebSocket write failed");
                        close.cancel();
                        return;
                    }
                }
                None => break,
            },
        }
    }

    while let Ok(outbound) = rx.try_recv() {
        if sink.send(into_message(outbound)).await.is_err() {
            return;
        }
    }

    let frame = CloseFrame {
        code: close_code::AWAY,
        reason: "server closing connection".into(),
    };
    let _ = sink.send(Message::Close(Some(frame))).await;
    let _ = sink.close().await;
}

fn into_message(outbound: Outbound) -> Message {
    match outbound {
        Outbound::Frame(text) => Message::Text(text.into()),
        Outbound::Ping => Message::Ping(Vec::new().into()),
    }
}

/// 연결 정리. 여러 번 호출돼도 한 번만 수행되며, 수행한 호출만 `true`를 받습니다.
///
/// 생존 확인 모니터가 먼저 레지스트리에서 제거했더라도 송신 루프 정리와
/// `Closed` 전이는 여기서 끝냅니다.
async fn teardown(
    registry: &ConnectionRegistry,
    conn: &Arc<Connection>,
    mut writer: JoinHandle<()>,
    grace: Duration,
) -> bool {
    if !conn.begin_close() {
        writer.abort();
        return false;
    }

    if registry.unregister(conn.id()).is_none() {
        debug!(conn_id = %conn.id(), "Connection already evicted before teardown");
    }
    conn.force_close();

    if tokio::time::timeout(grace, &mut writer).await.is_err() {
        debug!(conn_id = %conn.id(), "Writer did not flush in time, aborting");
        writer.abort();
    }

    conn.mark_closed();
    info!(conn_id = %conn.id(), dropped = conn.dropped(), "WebSocket disconnected");
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::{ConnectionPhase, LivenessMonitor};

    const GRACE: Duration = Duration::from_millis(200);

    fn open(registry: &ConnectionRegistry) -> (Arc<Connection>, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(4);
        let conn = Arc::new(Connection::new(ConnectionId::generate(), tx, CancellationToken::new()));
        conn.mark_open();
        registry.register(conn.clone()).unwrap();
        (conn, rx)
    }

    /// 종료 토큰이 취소될 때까지 기다리는 송신 루프 대역.
    fn writer(conn: &Connection) -> JoinHandle<()> {
        let close = conn.close_token().clone();
        tokio::spawn(async move { close.cancelled().await })
    }

    #[tokio::test]
    async fn test_teardown_runs_once() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = open(&registry);

        assert!(teardown(&registry, &conn, writer(&conn), GRACE).await);
        assert!(registry.is_empty());
        assert!(conn.close_token().is_cancelled());
        assert_eq!(conn.phase(), ConnectionPhase::Closed);

        assert!(!teardown(&registry, &conn, writer(&conn), GRACE).await);
        assert_eq!(conn.phase(), ConnectionPhase::Closed);
    }

    #[tokio::test]
    async fn test_concurrent_teardown_single_winner() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = open(&registry);
        let (_other, _other_rx) = open(&registry);

        let (first, second) = tokio::join!(
            teardown(&registry, &conn, writer(&conn), GRACE),
            teardown(&registry, &conn, writer(&conn), GRACE),
        );
        assert!(first ^ second);
        assert_eq!(registry.total_connections(), 1);
        assert!(registry.get(conn.id()).is_err());
        assert_eq!(conn.phase(), ConnectionPhase::Closed);
    }

    #[tokio::test]
    async fn test_eviction_then_client_close() {
        let registry = Arc::new(ConnectionRegistry::new());
        let monitor = LivenessMonitor::new(registry.clone(), Duration::from_secs(30));
        let (conn, _rx) = open(&registry);

        monitor.tick();
        assert_eq!(monitor.tick().evicted, 1);
        assert!(registry.is_empty());
        assert_eq!(conn.phase(), ConnectionPhase::Open);

        // 퇴출 뒤 수신 루프가 끝나면서 호출되는 정리
        assert!(teardown(&registry, &conn, writer(&conn), GRACE).await);
        assert!(registry.is_empty());
        assert_eq!(conn.phase(), ConnectionPhase::Closed);
        assert_eq!(monitor.tick().evicted, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_writer_aborted_after_grace() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = open(&registry);
        let stuck = tokio::spawn(std::future::pending::<()>());

        assert!(teardown(&registry, &conn, stuck, GRACE).await);
        assert_eq!(conn.phase(), ConnectionPhase::Closed);
        assert!(registry.is_empty());
    }
}
