//! 실시간 배포 WebSocket 계층.
//!
//! ```text
//! 프로듀서 → classify → Dispatcher → 연결별 송신 큐 → handler → 소켓
//! 소켓 → handler → Session → ConnectionRegistry (구독 변경) → 응답
//! ```
//!
//! # 메시지 형식
//!
//! ## 클라이언트 → 서버
//!
//! ```json
//! { "type": "subscribe", "channel": "ticker:AAPL" }
//! { "type": "unsubscribe", "channel": "signals" }
//! { "type": "ping" }
//! { "type": "request_data", "request": "latest_signals", "ticker": "AAPL", "limit": 5 }
//! ```
//!
//! ## 서버 → 클라이언트
//!
//! ```json
//! { "type": "real_time_update", "data": { "type": "new_signal", ... },
//!   "timestamp": "...", "connectionId": "..." }
//! ```

pub mod dispatcher;
pub mod handler;
pub mod liveness;
pub mod messages;
pub mod registry;
pub mod session;
pub mod topics;

pub use dispatcher::{Dispatcher, PublishReport};
pub use handler::websocket_handler;
pub use liveness::{LivenessMonitor, LivenessReport};
pub use messages::{ClientMessage, DataRequest, EncodedEvent, Outbound, ProtocolError, ServerMessage};
pub use registry::{Connection, ConnectionId, ConnectionPhase, ConnectionRegistry};
pub use session::Session;
pub use topics::{classify, TopicSet};
