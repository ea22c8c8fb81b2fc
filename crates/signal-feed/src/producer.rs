//! 이벤트 프로듀서.
//!
//! 배포 엔진은 이벤트가 어떻게 계산되는지 알지 못하며,
//! 스케줄러가 주기마다 [`EventProducer::produce`]를 호출해 결과를 전달합니다.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use signal_core::{
    normalize_ticker, AlertSeverity, AlertType, Event, FeedConfig, PriceQuote, SignalAction,
    TradingAlert, TradingSignal,
};
use tracing::{debug, info};

use crate::error::FeedResult;

/// 모멘텀 판단에 사용하는 가격 이력 길이.
const MOMENTUM_WINDOW: usize = 5;

/// 주기당 가격 급변(쇼크) 발생 확률.
const SHOCK_PROBABILITY: f64 = 0.02;

/// 주기당 거래량 급증 발생 확률.
const VOLUME_SPIKE_PROBABILITY: f64 = 0.02;

/// 평상시 틱 변동폭 (비율).
const TICK_VOLATILITY: f64 = 0.005;

/// 한 주기에 이벤트 묶음을 생성하는 프로듀서.
#[async_trait]
pub trait EventProducer: Send {
    /// 로그에 표시할 이름.
    fn name(&self) -> &str;

    /// 한 주기의 이벤트를 생성합니다.
    async fn produce(&mut self) -> FeedResult<Vec<Event>>;
}

/// 종목별 모의 시세 상태.
#[derive(Debug, Clone)]
struct TickerState {
    /// 기준가 (당일 시가)
    base_price: Decimal,
    current_price: Decimal,
    /// 최근 가격 이력 (모멘텀 계산용)
    history: VecDeque<Decimal>,
    /// 틱당 평균 거래량
    base_volume: u64,
    /// 누적 거래량
    total_volume: u64,
}

impl TickerState {
    fn new(base_price: Decimal, base_volume: u64) -> Self {
        let mut history = VecDeque::with_capacity(MOMENTUM_WINDOW + 1);
        history.push_back(base_price);
        Self {
            base_price,
            current_price: base_price,
            history,
            base_volume,
            total_volume: 0,
        }
    }

    /// 이력 구간의 변동률 (비율).
    fn momentum(&self) -> f64 {
        let Some(first) = self.history.front() else {
            return 0.0;
        };
        if first.is_zero() {
            return 0.0;
        }
        ((self.current_price - first) / first).to_f64().unwrap_or(0.0)
    }
}

/// 알려진 종목의 기준가와 틱당 거래량.
fn seed_for(ticker: &str) -> (Decimal, u64) {
    match ticker {
        "AAPL" => (dec!(189.50), 52_000),
        "MSFT" => (dec!(415.20), 21_000),
        "GOOGL" => (dec!(171.30), 24_000),
        "AMZN" => (dec!(182.75), 38_000),
        "TSLA" => (dec!(242.10), 95_000),
        "NVDA" => (dec!(121.40), 310_000),
        "META" => (dec!(502.60), 15_000),
        "SPY" => (dec!(605.50), 60_000),
        "QQQ" => (dec!(528.30), 42_000),
        _ => (dec!(150), 10_000),
    }
}

/// 랜덤 워크 기반 모의 시세 프로듀서.
///
/// 주기마다 종목별 `PriceUpdate`를 하나씩 만들고, 확률적으로 매매 신호를,
/// 가격 급변이나 거래량 급증 시 알림을 생성합니다.
pub struct MockMarketProducer {
    tickers: Vec<String>,
    states: HashMap<String, TickerState>,
    signal_probability: f64,
    alert_move_threshold_pct: f64,
    volume_spike_ratio: f64,
    rng: StdRng,
}

impl MockMarketProducer {
    /// 피드 설정으로 생성합니다.
    pub fn new(config: &FeedConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// 고정 시드로 생성합니다 (재현 가능한 테스트용).
    pub fn with_seed(config: &FeedConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &FeedConfig, rng: StdRng) -> Self {
        let tickers: Vec<String> = config.tickers.iter().map(|t| normalize_ticker(t)).collect();
        let states = tickers
            .iter()
            .map(|t| {
                let (price, volume) = seed_for(t);
                (t.clone(), TickerState::new(price, volume))
            })
            .collect();

        info!(tickers = tickers.len(), "Mock market producer initialized");

        Self {
            tickers,
            states,
            signal_probability: config.signal_probability.clamp(0.0, 1.0),
            alert_move_threshold_pct: config.alert_move_threshold_pct,
            volume_spike_ratio: config.volume_spike_ratio.max(1.0),
            rng,
        }
    }

    /// 한 주기의 이벤트를 동기적으로 생성합니다.
    fn step(&mut self) -> Vec<Event> {
        let mut events = Vec::with_capacity(self.tickers.len() * 2);
        let now = Utc::now();

        for ticker in &self.tickers {
            let Some(state) = self.states.get_mut(ticker) else {
                continue;
            };

            // 평상시 ±0.5%, 드물게 임계값을 넘는 급변
            let move_ratio = if self.rng.gen_bool(SHOCK_PROBABILITY) {
                let magnitude = self.alert_move_threshold_pct / 100.0 * self.rng.gen_range(1.0..2.5);
                if self.rng.gen_bool(0.5) {
                    magnitude
                } else {
                    -magnitude
                }
            } else {
                self.rng.gen_range(-TICK_VOLATILITY..TICK_VOLATILITY)
            };

            let previous = state.current_price;
            let factor = Decimal::try_from(1.0 + move_ratio).unwrap_or(Decimal::ONE);
            state.current_price = (previous * factor).round_dp(2).max(dec!(0.01));

            state.history.push_back(state.current_price);
            while state.history.len() > MOMENTUM_WINDOW {
                state.history.pop_front();
            }

            let tick_volume = if self.rng.gen_bool(VOLUME_SPIKE_PROBABILITY) {
                let ratio = self.rng.gen_range(self.volume_spike_ratio..self.volume_spike_ratio * 2.0);
                (state.base_volume as f64 * ratio) as u64
            } else {
                (state.base_volume as f64 * self.rng.gen_range(0.5..1.5)) as u64
            };
            state.total_volume += tick_volume;

            let change = state.current_price - state.base_price;
            let change_percent = if state.base_price.is_zero() {
                Decimal::ZERO
            } else {
                (change / state.base_price * dec!(100)).round_dp(2)
            };

            let quote = PriceQuote {
                ticker: ticker.clone(),
                price: state.current_price,
                change,
                change_percent,
                volume: state.total_volume,
                timestamp: now,
            };
            events.push(Event::price_update(&quote));

            // 가격 급변 알림
            let move_pct = move_ratio.abs() * 100.0;
            if move_pct >= self.alert_move_threshold_pct {
                let severity = if move_pct >= self.alert_move_threshold_pct * 2.0 {
                    AlertSeverity::Critical
                } else {
                    AlertSeverity::High
                };
                let direction = if move_ratio > 0.0 { "up" } else { "down" };
                let alert = TradingAlert::new(
                    ticker,
                    AlertType::PriceThreshold,
                    severity,
                    format!("{} moved {} {:.2}% to {}", ticker, direction, move_pct, state.current_price),
                )
                .with_metadata("previousPrice", serde_json::json!(previous.to_string()))
                .with_metadata("movePercent", serde_json::json!(move_pct));
                events.push(Event::NewAlert { alert });
            }

            // 거래량 급증 알림
            let volume_ratio = tick_volume as f64 / state.base_volume.max(1) as f64;
            if volume_ratio >= self.volume_spike_ratio {
                let severity = if volume_ratio >= self.volume_spike_ratio * 1.5 {
                    AlertSeverity::High
                } else {
                    AlertSeverity::Medium
                };
                let alert = TradingAlert::new(
                    ticker,
                    AlertType::VolumeSpike,
                    severity,
                    format!("{} volume {:.1}x average", ticker, volume_ratio),
                )
                .with_metadata("volume", serde_json::json!(tick_volume));
                events.push(Event::NewAlert { alert });
            }

            // 확률적 매매 신호
            if self.rng.gen_bool(self.signal_probability) {
                let momentum = state.momentum();
                let action = if momentum > 0.001 {
                    SignalAction::Buy
                } else if momentum < -0.001 {
                    SignalAction::Sell
                } else {
                    SignalAction::Hold
                };
                let confidence = (0.5 + momentum.abs() * 50.0).clamp(0.5, 0.95);
                let price = state.current_price;
                let (target, stop) = match action {
                    SignalAction::Buy => (Some((price * dec!(1.03)).round_dp(2)), Some((price * dec!(0.98)).round_dp(2))),
                    SignalAction::Sell => (Some((price * dec!(0.97)).round_dp(2)), Some((price * dec!(1.02)).round_dp(2))),
                    SignalAction::Hold => (None, None),
                };

                let signal = TradingSignal::new(ticker, action, price)
                    .with_confidence(confidence)
                    .with_levels(target, stop)
                    .with_reasoning(
                        "momentum",
                        format!("{}-tick momentum {:+.2}%", MOMENTUM_WINDOW, momentum * 100.0),
                    )
                    .with_metadata("momentum", serde_json::json!(momentum));

                debug!(ticker = %ticker, action = %action, confidence, "Signal generated");

                if confidence >= 0.85 {
                    let alert = TradingAlert::new(
                        ticker,
                        AlertType::SignalConfidence,
                        AlertSeverity::Medium,
                        format!("High-confidence {} signal on {} ({:.0}%)", action, ticker, confidence * 100.0),
                    )
                    .with_metadata("signalId", serde_json::json!(signal.id));
                    events.push(Event::NewAlert { alert });
                }
                events.push(Event::NewSignal { signal });
            }
        }

        events
    }
}

#[async_trait]
impl EventProducer for MockMarketProducer {
    fn name(&self) -> &str {
        "mock_market"
    }

    async fn produce(&mut self) -> FeedResult<Vec<Event>> {
        Ok(self.step())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(tickers: &[&str]) -> FeedConfig {
        FeedConfig {
            tickers: tickers.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_one_price_update_per_ticker() {
        let mut producer = MockMarketProducer::with_seed(&config(&["aapl", "TSLA"]), 7);
        let events = producer.produce().await.unwrap();

        let prices: Vec<&str> = events
            .iter()
            .filter(|e| matches!(e, Event::PriceUpdate { .. }))
            .filter_map(|e| e.ticker())
            .collect();
        assert_eq!(prices, vec!["AAPL", "TSLA"]);
    }

    #[tokio::test]
    async fn test_random_walk_stays_bounded() {
        let mut producer = MockMarketProducer::with_seed(&config(&["AAPL"]), 42);
        for _ in 0..50 {
            producer.produce().await.unwrap();
        }
        let state = &producer.states["AAPL"];
        let ratio = (state.current_price / state.base_price).to_f64().unwrap();
        // 50틱, 최대 급변 5% 기준 느슨한 범위
        assert!(ratio > 0.2 && ratio < 5.0);
        assert!(state.history.len() <= MOMENTUM_WINDOW);
    }

    #[tokio::test]
    async fn test_signals_always_emitted_with_probability_one() {
        let mut cfg = config(&["NVDA", "META"]);
        cfg.signal_probability = 1.0;
        let mut producer = MockMarketProducer::with_seed(&cfg, 1);

        let events = producer.produce().await.unwrap();
        let signals: Vec<&TradingSignal> = events
            .iter()
            .filter_map(|e| match e {
                Event::NewSignal { signal } => Some(signal),
                _ => None,
            })
            .collect();
        assert_eq!(signals.len(), 2);
        assert!(signals.iter().all(|s| (0.5..=0.95).contains(&s.confidence)));
    }

    #[tokio::test]
    async fn test_alerts_on_large_moves() {
        let mut cfg = config(&["SPY"]);
        // 평상시 변동(±0.5%)도 임계값을 넘도록 설정
        cfg.alert_move_threshold_pct = 0.0;
        cfg.signal_probability = 0.0;
        let mut producer = MockMarketProducer::with_seed(&cfg, 3);

        let events = producer.produce().await.unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            Event::NewAlert { alert } if alert.alert_type == AlertType::PriceThreshold
        )));
    }
}
