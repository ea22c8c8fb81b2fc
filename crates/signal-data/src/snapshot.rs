//! 스냅샷 조회 인터페이스.
//!
//! 배포 엔진은 `request_data` 요청에 답할 때만 이 트레잇을 사용합니다.

use async_trait::async_trait;
use signal_core::{MarketStatus, PriceQuote, TradingAlert, TradingSignal};

use crate::error::DataResult;
use crate::store::MemoryStore;

/// 현재 상태 조회.
#[async_trait]
pub trait DataSnapshot: Send + Sync {
    /// 종목별 최신 시세. 빈 목록이면 전체 종목을 반환합니다.
    async fn current_prices(&self, tickers: &[String]) -> DataResult<Vec<PriceQuote>>;

    /// 최근 신호 (최신순).
    async fn latest_signals(&self, ticker: Option<&str>, limit: usize)
        -> DataResult<Vec<TradingSignal>>;

    /// 활성 알림 (최신순).
    async fn active_alerts(&self, ticker: Option<&str>) -> DataResult<Vec<TradingAlert>>;

    /// 현재 장 상태.
    async fn market_status(&self) -> DataResult<MarketStatus>;
}

#[async_trait]
impl DataSnapshot for MemoryStore {
    async fn current_prices(&self, tickers: &[String]) -> DataResult<Vec<PriceQuote>> {
        Ok(self.prices(tickers))
    }

    async fn latest_signals(
        &self,
        ticker: Option<&str>,
        limit: usize,
    ) -> DataResult<Vec<TradingSignal>> {
        Ok(self.signals(ticker, limit))
    }

    async fn active_alerts(&self, ticker: Option<&str>) -> DataResult<Vec<TradingAlert>> {
        Ok(self.alerts(ticker))
    }

    async fn market_status(&self) -> DataResult<MarketStatus> {
        Ok(self.status())
    }
}
