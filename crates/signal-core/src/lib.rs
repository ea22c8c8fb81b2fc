//! # Signal Core
//!
//! 실시간 시그널 배포 시스템의 공통 도메인 모델과 기반 기능을 제공합니다:
//! - 이벤트 (`Event`) 및 매매 신호/알림/시세 타입
//! - 설정 로딩 (`AppConfig`)
//! - 로깅 초기화
//! - 공통 에러 타입

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;

pub use config::*;
pub use domain::*;
pub use error::*;
pub use logging::{init_logging, LogConfig, LogFormat};
