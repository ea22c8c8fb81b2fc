//! 데이터 모듈 오류 타입.

use thiserror::Error;

/// 데이터 관련 오류.
#[derive(Debug, Error)]
pub enum DataError {
    /// 레코드를 찾을 수 없음
    #[error("Record not found: {0}")]
    NotFound(String),

    /// 잘못된 데이터 형식
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// 저장소 내부 오류
    #[error("Storage error: {0}")]
    Storage(String),
}

/// 데이터 모듈 Result 타입.
pub type DataResult<T> = Result<T, DataError>;
