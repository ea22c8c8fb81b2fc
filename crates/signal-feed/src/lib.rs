//! # Signal Feed
//!
//! 배포 엔진에 이벤트를 공급하는 프로듀서 계층입니다.
//!
//! - [`EventProducer`]: 한 주기에 이벤트 묶음을 생성하는 트레잇
//! - [`MockMarketProducer`]: 랜덤 워크 기반 모의 시세/신호/알림 생성기
//! - [`MarketClock`]: 미국 동부 시간 기준 장 운영 상태 판별
//! - [`FeedScheduler`]: 주기 실행, 저장, 엔진 전달

pub mod clock;
pub mod error;
pub mod producer;
pub mod scheduler;

pub use clock::MarketClock;
pub use error::{FeedError, FeedResult};
pub use producer::{EventProducer, MockMarketProducer};
pub use scheduler::{FeedScheduler, FeedStats};
