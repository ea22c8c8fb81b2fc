//! 배포 엔진이 소비하는 실시간 이벤트.
//!
//! 이벤트는 생성 이후 변경되지 않으며, 브로드캐스트 대상 연결 전체가 읽기 전용으로 공유합니다.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{MarketStatus, PriceQuote, TradingAlert, TradingSignal};

/// 프로듀서가 발행하는 이벤트.
///
/// 직렬화 시 `type` 필드로 종류를 구분합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Event {
    /// 가격 갱신
    PriceUpdate {
        ticker: String,
        price: Decimal,
        change: Decimal,
        change_percent: Decimal,
        volume: u64,
        timestamp: DateTime<Utc>,
    },
    /// 새 매매 신호
    NewSignal { signal: TradingSignal },
    /// 새 알림
    NewAlert { alert: TradingAlert },
    /// 장 운영 상태 변경
    MarketStatusChanged {
        status: MarketStatus,
        timestamp: DateTime<Utc>,
    },
    /// 시스템 하트비트 (구독과 무관하게 모든 연결에 전달)
    SystemHeartbeat {
        connected_clients: usize,
        /// 가동 시간 (초)
        uptime: u64,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    /// 와이어 상의 이벤트 타입 이름.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::PriceUpdate { .. } => "price_update",
            Event::NewSignal { .. } => "new_signal",
            Event::NewAlert { .. } => "new_alert",
            Event::MarketStatusChanged { .. } => "market_status_changed",
            Event::SystemHeartbeat { .. } => "system_heartbeat",
        }
    }

    /// 이벤트에 연결된 종목 티커.
    pub fn ticker(&self) -> Option<&str> {
        match self {
            Event::PriceUpdate { ticker, .. } => Some(ticker),
            Event::NewSignal { signal } => Some(&signal.ticker),
            Event::NewAlert { alert } => Some(&alert.ticker),
            Event::MarketStatusChanged { .. } | Event::SystemHeartbeat { .. } => None,
        }
    }

    /// 시세 스냅샷으로부터 가격 갱신 이벤트를 만듭니다.
    pub fn price_update(quote: &PriceQuote) -> Self {
        Event::PriceUpdate {
            ticker: quote.ticker.clone(),
            price: quote.price,
            change: quote.change,
            change_percent: quote.change_percent,
            volume: quote.volume,
            timestamp: quote.timestamp,
        }
    }

    /// 현재 시각 기준 하트비트 이벤트를 만듭니다.
    pub fn heartbeat(connected_clients: usize, uptime: u64) -> Self {
        Event::SystemHeartbeat {
            connected_clients,
            uptime,
            timestamp: Utc::now(),
        }
    }
}
