//! 시세 및 장 운영 상태.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 장 운영 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketStatus {
    /// 프리마켓
    PreMarket,
    /// 정규장
    Open,
    /// 애프터마켓
    AfterHours,
    /// 휴장
    Closed,
}

impl MarketStatus {
    /// 거래가 가능한 상태인지 확인합니다.
    pub fn is_trading(&self) -> bool {
        !matches!(self, MarketStatus::Closed)
    }
}

impl std::fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::PreMarket => "pre_market",
            Self::Open => "open",
            Self::AfterHours => "after_hours",
            Self::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

/// 종목별 최신 시세.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    /// 종목 티커
    pub ticker: String,
    /// 현재가
    pub price: Decimal,
    /// 기준가 대비 변동폭
    pub change: Decimal,
    /// 기준가 대비 변동률 (%)
    pub change_percent: Decimal,
    /// 누적 거래량
    pub volume: u64,
    /// 시세 시각
    pub timestamp: DateTime<Utc>,
}
