//! 연결별 제어 메시지 처리.
//!
//! 수신한 텍스트 프레임을 해석해 레지스트리를 갱신하거나 스냅샷을 조회하고,
//! 응답을 같은 연결의 송신 큐에 넣습니다. 이벤트와 응답이 같은 큐를 쓰므로
//! 연결 내 순서가 유지됩니다.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use signal_data::DataSnapshot;
use tracing::{debug, warn};

use super::messages::{encode, ClientMessage, DataRequest, Outbound, ProtocolError, ServerMessage};
use super::registry::{Connection, ConnectionRegistry};
use super::topics::{available_channels, normalize_topic, MAX_TOPIC_LEN};
use crate::error::{StreamError, StreamResult};

/// `latest_signals` 기본 개수
pub const DEFAULT_SIGNAL_LIMIT: usize = 10;
/// `latest_signals` 최대 개수
pub const MAX_SIGNAL_LIMIT: usize = 100;

/// 하나의 연결에 묶인 제어 메시지 처리기.
pub struct Session {
    conn: Arc<Connection>,
    registry: Arc<ConnectionRegistry>,
    snapshot: Arc<dyn DataSnapshot>,
}

impl Session {
    pub fn new(
        conn: Arc<Connection>,
        registry: Arc<ConnectionRegistry>,
        snapshot: Arc<dyn DataSnapshot>,
    ) -> Self {
        Self {
            conn,
            registry,
            snapshot,
        }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    /// 환영 메시지를 송신 큐에 넣습니다.
    pub fn welcome(&self) -> StreamResult<()> {
        self.reply(&ServerMessage::Welcome {
            connection_id: self.conn.id(),
            available_channels: available_channels(),
        })
    }

    /// 텍스트 프레임을 처리하고 응답을 큐에 넣습니다.
    ///
    /// 파싱 실패는 `error` 응답으로 끝나며 연결은 유지됩니다.
    pub async fn handle_text(&self, text: &str) -> StreamResult<()> {
        self.conn.touch();

        let response = match ClientMessage::from_json(text) {
            Ok(message) => self.process(message).await,
            Err(e) => {
                debug!(conn_id = %self.conn.id(), error = %e, "Rejected client message");
                ServerMessage::error(e)
            }
        };

        self.reply(&response)
    }

    /// 파싱된 메시지에 대한 응답을 만듭니다.
    pub async fn process(&self, message: ClientMessage) -> ServerMessage {
        match message {
            ClientMessage::Subscribe { channel } => {
                let channel = normalize_topic(&channel);
                if channel.is_empty() {
                    return ServerMessage::error(ProtocolError::InvalidMessage(
                        "channel must not be empty".to_string(),
                    ));
                }
                if channel.len() > MAX_TOPIC_LEN {
                    return ServerMessage::error(ProtocolError::InvalidMessage(format!(
                        "channel exceeds {} bytes",
                        MAX_TOPIC_LEN
                    )));
                }
                match self.registry.subscribe(self.conn.id(), &channel) {
                    Ok(true) => debug!(conn_id = %self.conn.id(), topic = %channel, "Subscribed"),
                    Ok(false) => {}
                    Err(StreamError::SubscriptionLimit { limit, .. }) => {
                        debug!(conn_id = %self.conn.id(), topic = %channel, limit, "Subscription limit reached");
                        return ServerMessage::error(ProtocolError::SubscriptionLimit(limit));
                    }
                    Err(e) => {
                        warn!(conn_id = %self.conn.id(), topic = %channel, error = %e, "Subscribe failed");
                        return ServerMessage::error(ProtocolError::InvalidMessage(e.to_string()));
                    }
                }
                ServerMessage::SubscriptionConfirmed { channel }
            }
            ClientMessage::Unsubscribe { channel } => {
                let channel = normalize_topic(&channel);
                if self.registry.unsubscribe(self.conn.id(), &channel) {
                    debug!(conn_id = %self.conn.id(), topic = %channel, "Unsubscribed");
                }
                ServerMessage::SubscriptionCancelled { channel }
            }
            ClientMessage::Ping => ServerMessage::Pong {
                timestamp: Utc::now(),
            },
            ClientMessage::RequestData(request) => {
                let kind = request.request.clone();
                match self.answer(&request).await {
                    Ok(result) => ServerMessage::DataResponse {
                        request: kind,
                        result,
                    },
                    Err(e) => {
                        debug!(conn_id = %self.conn.id(), request = %kind, error = %e, "Data request failed");
                        ServerMessage::error(e)
                    }
                }
            }
        }
    }

    async fn answer(&self, request: &DataRequest) -> Result<Value, ProtocolError> {
        let ticker = request.ticker.as_deref();

        let result = match request.request.as_str() {
            "current_prices" => {
                let mut tickers = request.tickers.clone();
                if tickers.is_empty() {
                    tickers.extend(request.ticker.clone());
                }
                serde_json::to_value(self.snapshot.current_prices(&tickers).await?)?
            }
            "latest_signals" => {
                let limit = request
                    .limit
                    .unwrap_or(DEFAULT_SIGNAL_LIMIT)
                    .clamp(1, MAX_SIGNAL_LIMIT);
                serde_json::to_value(self.snapshot.latest_signals(ticker, limit).await?)?
            }
            "active_alerts" => serde_json::to_value(self.snapshot.active_alerts(ticker).await?)?,
            "market_status" => json!({ "status": self.snapshot.market_status().await? }),
            other => return Err(ProtocolError::UnknownRequest(other.to_string())),
        };

        Ok(result)
    }

    /// 응답 메시지를 인코딩해 송신 큐에 넣습니다.
    pub fn reply(&self, message: &ServerMessage) -> StreamResult<()> {
        let frame = encode(message, self.conn.id())?;
        self.conn.try_enqueue(Outbound::Frame(frame)).inspect_err(|e| {
            warn!(conn_id = %self.conn.id(), kind = message.kind(), error = %e, "Reply not queued");
        })
    }
}
