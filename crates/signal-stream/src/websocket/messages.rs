//! WebSocket 메시지 타입.
//!
//! 모든 메시지는 JSON 텍스트 프레임입니다.
//! 서버 메시지는 `{type, data, timestamp, connectionId}` 봉투로 감싸서 보냅니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;
use signal_core::Event;
use signal_data::DataError;
use thiserror::Error;

use super::registry::ConnectionId;
use crate::error::StreamResult;

/// 클라이언트 → 서버 메시지.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// 토픽 구독
    Subscribe { channel: String },
    /// 토픽 구독 해제
    Unsubscribe { channel: String },
    /// 애플리케이션 수준 ping
    Ping,
    /// 현재 상태 조회
    RequestData(DataRequest),
}

/// `request_data` 요청 본문.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DataRequest {
    /// `current_prices` | `latest_signals` | `active_alerts` | `market_status`
    pub request: String,
    #[serde(default)]
    pub tickers: Vec<String>,
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

const CLIENT_MESSAGE_TYPES: [&str; 4] = ["subscribe", "unsubscribe", "ping", "request_data"];

impl ClientMessage {
    /// 텍스트 프레임을 파싱합니다.
    ///
    /// JSON이 아니거나 `type`이 없으면 [`ProtocolError::InvalidMessage`],
    /// 알 수 없는 `type`이면 [`ProtocolError::UnknownMessageType`]을 반환합니다.
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| ProtocolError::InvalidMessage(e.to_string()))?;

        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::InvalidMessage("missing message type".to_string()))?;

        if !CLIENT_MESSAGE_TYPES.contains(&kind) {
            return Err(ProtocolError::UnknownMessageType(kind.to_string()));
        }

        serde_json::from_value(value).map_err(|e| ProtocolError::InvalidMessage(e.to_string()))
    }
}

/// 클라이언트에게 `error` 메시지로 응답하는 프로토콜 에러.
///
/// 연결을 끊지 않습니다.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("Unknown request type: {0}")]
    UnknownRequest(String),

    #[error("Subscription limit reached: at most {0} channels per connection")]
    SubscriptionLimit(usize),

    #[error("Data request failed: {0}")]
    Snapshot(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<DataError> for ProtocolError {
    fn from(err: DataError) -> Self {
        ProtocolError::Snapshot(err.to_string())
    }
}

/// 서버 → 클라이언트 제어 메시지.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    Welcome {
        connection_id: ConnectionId,
        available_channels: Vec<String>,
    },
    SubscriptionConfirmed { channel: String },
    SubscriptionCancelled { channel: String },
    Pong { timestamp: DateTime<Utc> },
    Error { error: String },
    DataResponse { request: String, result: Value },
}

impl ServerMessage {
    pub fn error(err: impl std::fmt::Display) -> Self {
        ServerMessage::Error {
            error: err.to_string(),
        }
    }

    /// 와이어 상의 메시지 타입 이름.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Welcome { .. } => "welcome",
            ServerMessage::SubscriptionConfirmed { .. } => "subscription_confirmed",
            ServerMessage::SubscriptionCancelled { .. } => "subscription_cancelled",
            ServerMessage::Pong { .. } => "pong",
            ServerMessage::Error { .. } => "error",
            ServerMessage::DataResponse { .. } => "data_response",
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<'a> {
    #[serde(flatten)]
    message: &'a ServerMessage,
    timestamp: DateTime<Utc>,
    connection_id: ConnectionId,
}

/// 제어 메시지를 연결용 텍스트 프레임으로 인코딩합니다.
pub fn encode(message: &ServerMessage, connection_id: ConnectionId) -> StreamResult<String> {
    let envelope = Envelope {
        message,
        timestamp: Utc::now(),
        connection_id,
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// 실시간 이벤트 타입 이름.
pub const REAL_TIME_UPDATE: &str = "real_time_update";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateEnvelope<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    data: &'a RawValue,
    timestamp: DateTime<Utc>,
    connection_id: ConnectionId,
}

/// 한 번 직렬화된 이벤트.
///
/// 연결마다 봉투만 새로 만들고 이벤트 본문은 그대로 끼워 넣습니다.
#[derive(Debug)]
pub struct EncodedEvent {
    payload: Box<RawValue>,
    timestamp: DateTime<Utc>,
}

impl EncodedEvent {
    pub fn encode(event: &Event) -> StreamResult<Self> {
        Ok(Self {
            payload: serde_json::value::to_raw_value(event)?,
            timestamp: Utc::now(),
        })
    }

    pub fn payload(&self) -> &str {
        self.payload.get()
    }

    /// 연결 하나를 위한 `real_time_update` 프레임.
    pub fn frame_for(&self, connection_id: ConnectionId) -> StreamResult<String> {
        let envelope = UpdateEnvelope {
            kind: REAL_TIME_UPDATE,
            data: &self.payload,
            timestamp: self.timestamp,
            connection_id,
        };
        Ok(serde_json::to_string(&envelope)?)
    }
}

/// 연결 송신 큐 항목.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// JSON 텍스트 프레임
    Frame(String),
    /// 생존 확인용 저수준 ping
    Ping,
}
