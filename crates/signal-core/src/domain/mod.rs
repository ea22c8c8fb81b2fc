//! 도메인 모델.

mod alert;
mod event;
mod market;
mod signal;

pub use alert::*;
pub use event::*;
pub use market::*;
pub use signal::*;

/// 티커를 정규화합니다 (공백 제거, 대문자).
pub fn normalize_ticker(ticker: &str) -> String {
    ticker.trim().to_uppercase()
}
