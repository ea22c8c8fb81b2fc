//! 피드 오류 타입.

use signal_data::DataError;
use thiserror::Error;

/// 이벤트 생성/전달 관련 오류.
#[derive(Debug, Error)]
pub enum FeedError {
    /// 프로듀서가 이벤트 생성에 실패
    #[error("Producer error: {0}")]
    Producer(String),

    /// 저장소 오류
    #[error("Storage error: {0}")]
    Storage(#[from] DataError),

    /// 수집 채널이 닫힘 (엔진 종료)
    #[error("Ingest channel closed")]
    ChannelClosed,
}

/// 피드 Result 타입.
pub type FeedResult<T> = Result<T, FeedError>;
