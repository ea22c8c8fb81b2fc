//! 미국 장 운영 시계.
//!
//! 동부 시간 기준 평일:
//! - 04:00 ~ 09:30: 프리마켓
//! - 09:30 ~ 16:00: 정규장
//! - 16:00 ~ 20:00: 애프터마켓
//! - 그 외, 주말: 휴장
//!
//! 공휴일은 고려하지 않습니다.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::America::New_York;
use signal_core::{Event, MarketStatus};
use tracing::info;

const PRE_MARKET_OPEN: u32 = 4 * 60;
const REGULAR_OPEN: u32 = 9 * 60 + 30;
const REGULAR_CLOSE: u32 = 16 * 60;
const AFTER_HOURS_CLOSE: u32 = 20 * 60;

/// 장 상태 전환을 감지하는 시계.
#[derive(Debug, Default)]
pub struct MarketClock {
    last: Option<MarketStatus>,
}

impl MarketClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// 주어진 시각의 장 상태를 계산합니다.
    pub fn status_at(at: DateTime<Utc>) -> MarketStatus {
        let local = at.with_timezone(&New_York);
        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return MarketStatus::Closed;
        }

        let minutes = local.hour() * 60 + local.minute();
        match minutes {
            m if (PRE_MARKET_OPEN..REGULAR_OPEN).contains(&m) => MarketStatus::PreMarket,
            m if (REGULAR_OPEN..REGULAR_CLOSE).contains(&m) => MarketStatus::Open,
            m if (REGULAR_CLOSE..AFTER_HOURS_CLOSE).contains(&m) => MarketStatus::AfterHours,
            _ => MarketStatus::Closed,
        }
    }

    /// 상태가 바뀌었으면 `MarketStatusChanged` 이벤트를 반환합니다.
    ///
    /// 첫 관측은 항상 이벤트를 만듭니다.
    pub fn observe(&mut self, at: DateTime<Utc>) -> Option<Event> {
        let status = Self::status_at(at);
        if self.last == Some(status) {
            return None;
        }

        info!(from = ?self.last, to = %status, "Market status changed");
        self.last = Some(status);
        Some(Event::MarketStatusChanged {
            status,
            timestamp: at,
        })
    }

    /// 마지막으로 관측한 상태.
    pub fn current(&self) -> Option<MarketStatus> {
        self.last
    }
}
