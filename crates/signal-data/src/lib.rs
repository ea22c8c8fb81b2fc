//! # Signal Data
//!
//! 신호, 알림, 시세, 장 상태를 메모리에 보관하고
//! 클라이언트의 `request_data` 요청에 답할 스냅샷 조회를 제공합니다.
//!
//! - [`MemoryStore`]: 개수/기간 기준으로 보존되는 추가 전용 저장소
//! - [`DataSnapshot`]: 배포 엔진이 사용하는 조회 인터페이스

pub mod error;
pub mod snapshot;
pub mod store;

pub use error::{DataError, DataResult};
pub use snapshot::DataSnapshot;
pub use store::{MemoryStore, StoreStats};
