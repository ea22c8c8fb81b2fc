//! 메모리 기반 저장소.
//!
//! 신호와 알림은 추가 전용으로 보관하며, 개수 상한과 보존 기간을 넘는
//! 오래된 항목은 삽입 시점에 제거됩니다. 시세는 종목별 최신값만 유지합니다.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use signal_core::{
    MarketStatus, PriceQuote, StorageConfig, TradingAlert, TradingSignal, MAX_RETENTION_HOURS,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::{DataError, DataResult};

/// 저장소 집계 통계.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    /// 보관 중인 신호 수
    pub signals: usize,
    /// 보관 중인 알림 수
    pub alerts: usize,
    /// 활성 알림 수
    pub active_alerts: usize,
    /// 시세가 있는 종목 수
    pub tickers: usize,
    /// 보존 정책으로 제거된 누적 항목 수
    pub evicted: u64,
    /// 현재 장 상태
    pub market_status: MarketStatus,
}

struct StoreInner {
    signals: VecDeque<TradingSignal>,
    alerts: VecDeque<TradingAlert>,
    prices: HashMap<String, PriceQuote>,
    market_status: MarketStatus,
    evicted: u64,
}

/// 추가 전용 메모리 저장소 (스레드 안전, 복제 시 같은 데이터를 공유).
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<StoreInner>>,
    max_signals: usize,
    max_alerts: usize,
    retention: Duration,
}

impl MemoryStore {
    /// 보존 설정으로 저장소를 생성합니다.
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner {
                signals: VecDeque::with_capacity(config.max_signals.min(1024)),
                alerts: VecDeque::with_capacity(config.max_alerts.min(1024)),
                prices: HashMap::new(),
                market_status: MarketStatus::Closed,
                evicted: 0,
            })),
            max_signals: config.max_signals.max(1),
            max_alerts: config.max_alerts.max(1),
            retention: Duration::hours(config.retention_hours.clamp(1, MAX_RETENTION_HOURS)),
        }
    }

    /// 기본 설정으로 생성.
    pub fn with_defaults() -> Self {
        Self::new(&StorageConfig::default())
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("MemoryStore RwLock poisoned (read), recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("MemoryStore RwLock poisoned (write), recovering");
                poisoned.into_inner()
            }
        }
    }

    /// 신호를 저장합니다.
    pub fn insert_signal(&self, signal: TradingSignal) {
        let cutoff = Utc::now() - self.retention;
        let mut inner = self.write();

        inner.signals.push_back(signal);
        let evicted = prune(&mut inner.signals, self.max_signals, cutoff, |s| s.created_at);
        inner.evicted += evicted;
        if evicted > 0 {
            debug!(evicted, "Pruned signals beyond retention");
        }
    }

    /// 알림을 저장합니다.
    pub fn insert_alert(&self, alert: TradingAlert) {
        let cutoff = Utc::now() - self.retention;
        let mut inner = self.write();

        inner.alerts.push_back(alert);
        let evicted = prune(&mut inner.alerts, self.max_alerts, cutoff, |a| a.created_at);
        inner.evicted += evicted;
        if evicted > 0 {
            debug!(evicted, "Pruned alerts beyond retention");
        }
    }

    /// 종목의 최신 시세를 갱신합니다.
    pub fn upsert_price(&self, mut quote: PriceQuote) {
        quote.ticker = signal_core::normalize_ticker(&quote.ticker);
        let mut inner = self.write();
        inner.prices.insert(quote.ticker.clone(), quote);
    }

    /// 현재 장 상태를 기록합니다.
    pub fn set_market_status(&self, status: MarketStatus) {
        self.write().market_status = status;
    }

    /// 알림을 비활성화합니다.
    pub fn deactivate_alert(&self, id: Uuid) -> DataResult<()> {
        let mut inner = self.write();
        match inner.alerts.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                alert.is_active = false;
                Ok(())
            }
            None => Err(DataError::NotFound(format!("alert {}", id))),
        }
    }

    /// 저장소 통계를 반환합니다.
    pub fn stats(&self) -> StoreStats {
        let inner = self.read();
        StoreStats {
            signals: inner.signals.len(),
            alerts: inner.alerts.len(),
            active_alerts: inner.alerts.iter().filter(|a| a.is_active).count(),
            tickers: inner.prices.len(),
            evicted: inner.evicted,
            market_status: inner.market_status,
        }
    }

    /// 종목별 최신 시세. 빈 목록이면 전체 종목을 티커 순으로 반환합니다.
    pub fn prices(&self, tickers: &[String]) -> Vec<PriceQuote> {
        let inner = self.read();
        if tickers.is_empty() {
            let mut all: Vec<PriceQuote> = inner.prices.values().cloned().collect();
            all.sort_by(|a, b| a.ticker.cmp(&b.ticker));
            return all;
        }
        tickers
            .iter()
            .filter_map(|t| inner.prices.get(&signal_core::normalize_ticker(t)).cloned())
            .collect()
    }

    /// 최근 신호 (최신순).
    pub fn signals(&self, ticker: Option<&str>, limit: usize) -> Vec<TradingSignal> {
        let ticker = ticker.map(signal_core::normalize_ticker);
        let inner = self.read();
        inner
            .signals
            .iter()
            .rev()
            .filter(|s| ticker.as_deref().map_or(true, |t| s.ticker == t))
            .take(limit)
            .cloned()
            .collect()
    }

    /// 활성 알림 (최신순).
    pub fn alerts(&self, ticker: Option<&str>) -> Vec<TradingAlert> {
        let ticker = ticker.map(signal_core::normalize_ticker);
        let inner = self.read();
        inner
            .alerts
            .iter()
            .rev()
            .filter(|a| a.is_active)
            .filter(|a| ticker.as_deref().map_or(true, |t| a.ticker == t))
            .cloned()
            .collect()
    }

    /// 현재 장 상태.
    pub fn status(&self) -> MarketStatus {
        self.read().market_status
    }
}

/// 개수 상한과 기준 시각 이전 항목을 앞에서부터 제거하고 제거 수를 반환합니다.
fn prune<T>(
    items: &mut VecDeque<T>,
    max_len: usize,
    cutoff: DateTime<Utc>,
    created_at: impl Fn(&T) -> DateTime<Utc>,
) -> u64 {
    let mut evicted = 0;
    while items.len() > max_len {
        items.pop_front();
        evicted += 1;
    }
    while items.front().is_some_and(|item| created_at(item) < cutoff) {
        items.pop_front();
        evicted += 1;
    }
    evicted
}
