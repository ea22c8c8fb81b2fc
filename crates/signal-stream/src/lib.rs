//! # Signal Stream
//!
//! 실시간 신호/알림 배포 엔진입니다.
//!
//! 프로듀서가 만든 이벤트를 토픽별로 분류해 WebSocket 구독자에게 팬아웃합니다.
//! 연결별 송신 큐는 제한되어 있으며, 가득 차면 해당 연결에 대해서만 메시지를 폐기합니다.
//!
//! - [`engine`]: 엔진 생성, 이벤트 수집, 하트비트, 종료
//! - [`websocket`]: 레지스트리, 라우터, 디스패처, 생존 확인, 연결 handler
//! - [`server`]: axum 라우터 (`/ws/trading`, `/health`, `/metrics`)

pub mod engine;
pub mod error;
pub mod metrics;
pub mod server;
pub mod websocket;

pub use engine::{SharedEngine, StreamEngine};
pub use error::{StreamError, StreamResult};
pub use server::create_router;
