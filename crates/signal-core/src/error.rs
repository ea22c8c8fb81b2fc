//! 시그널 스트림 공통 에러 타입.

use thiserror::Error;

/// 핵심 에러.
#[derive(Debug, Error)]
pub enum SignalError {
    /// 설정 에러
    #[error("Configuration error: {0}")]
    Config(String),

    /// 직렬화 에러
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 잘못된 입력
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 내부 에러
    #[error("Internal error: {0}")]
    Internal(String),
}

/// 공통 Result 타입.
pub type SignalResult<T> = Result<T, SignalError>;

impl From<serde_json::Error> for SignalError {
    fn from(err: serde_json::Error) -> Self {
        SignalError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for SignalError {
    fn from(err: config::ConfigError) -> Self {
        SignalError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_serde_error() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: SignalError = err.into();
        assert!(matches!(err, SignalError::Serialization(_)));
        assert!(err.to_string().starts_with("Serialization error"));
    }
}
