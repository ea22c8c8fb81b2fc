//! 스트림 엔진 에러 타입.

use thiserror::Error;

use crate::websocket::ConnectionId;

/// 배포 엔진 에러.
#[derive(Debug, Error)]
pub enum StreamError {
    /// 이미 등록된 연결 ID
    #[error("Duplicate connection id: {0}")]
    DuplicateConnection(ConnectionId),

    /// 등록되지 않은 연결 ID
    #[error("Connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    /// 연결당 구독 수 상한 초과
    #[error("Subscription limit of {limit} reached: {id}")]
    SubscriptionLimit { id: ConnectionId, limit: usize },

    /// 송신 큐가 가득 참 (메시지 폐기)
    #[error("Outbound queue full: {0}")]
    QueueFull(ConnectionId),

    /// 송신 큐가 닫힘 (소켓 종료)
    #[error("Outbound queue closed: {0}")]
    QueueClosed(ConnectionId),

    /// 직렬화 에러
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O 에러
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// 메트릭 레코더 에러
    #[error("Metrics error: {0}")]
    Metrics(String),
}

/// 스트림 엔진 Result 타입.
pub type StreamResult<T> = Result<T, StreamError>;
