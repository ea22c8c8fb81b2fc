//! 피드 스케줄러.
//!
//! 고정 주기로 프로듀서와 장 운영 시계를 실행하고, 생성된 이벤트를
//! 저장소에 기록한 뒤 엔진의 수집 채널로 전달합니다.
//! 프로듀서 실패나 패닉은 해당 주기만 건너뛰며 루프는 계속됩니다.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use metrics::counter;
use signal_core::{Event, PriceQuote};
use signal_data::MemoryStore;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clock::MarketClock;
use crate::error::{FeedError, FeedResult};
use crate::producer::EventProducer;

/// 스케줄러 실행 통계.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedStats {
    /// 실행한 주기 수
    pub cycles: u64,
    /// 실패(건너뛴) 주기 수
    pub failed: u64,
    /// 전달한 이벤트 수
    pub events: u64,
}

impl FeedStats {
    /// 통계 요약 로그 출력.
    pub fn log_summary(&self, producer: &str) {
        info!(
            producer = producer,
            cycles = self.cycles,
            failed = self.failed,
            events = self.events,
            "Feed scheduler stopped"
        );
    }
}

/// 주기 실행기.
pub struct FeedScheduler<P> {
    producer: P,
    clock: MarketClock,
    store: MemoryStore,
    sink: mpsc::Sender<Event>,
    period: Duration,
    stats: FeedStats,
}

impl<P: EventProducer> FeedScheduler<P> {
    pub fn new(producer: P, store: MemoryStore, sink: mpsc::Sender<Event>, period: Duration) -> Self {
        Self {
            producer,
            clock: MarketClock::new(),
            store,
            sink,
            period,
            stats: FeedStats::default(),
        }
    }

    pub fn stats(&self) -> &FeedStats {
        &self.stats
    }

    /// 취소되거나 수집 채널이 닫힐 때까지 실행합니다.
    pub async fn run(mut self, cancel: CancellationToken) -> FeedStats {
        info!(
            producer = self.producer.name(),
            period_ms = self.period.as_millis() as u64,
            "Feed scheduler started"
        );

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Feed scheduler cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    match self.run_cycle().await {
                        Ok(_) => {}
                        Err(FeedError::ChannelClosed) => {
                            warn!("Ingest channel closed, stopping feed scheduler");
                            break;
                        }
                        Err(e) => {
                            error!(producer = self.producer.name(), error = %e, "Feed cycle skipped");
                        }
                    }
                }
            }
        }

        self.stats.log_summary(self.producer.name());
        self.stats
    }

    /// 한 주기를 실행하고 전달한 이벤트 수를 반환합니다.
    pub async fn run_cycle(&mut self) -> FeedResult<usize> {
        self.stats.cycles += 1;

        let produced = AssertUnwindSafe(self.producer.produce()).catch_unwind().await;
        let mut events = match produced {
            Ok(Ok(events)) => events,
            Ok(Err(e)) => {
                self.record_failure();
                return Err(e);
            }
            Err(panic) => {
                self.record_failure();
                return Err(FeedError::Producer(format!(
                    "producer panicked: {}",
                    panic_message(panic.as_ref())
                )));
            }
        };

        if let Some(status_event) = self.clock.observe(Utc::now()) {
            events.insert(0, status_event);
        }

        for event in &events {
            self.persist(event);
        }

        let count = events.len();
        for event in events {
            self.sink.send(event).await.map_err(|_| FeedError::ChannelClosed)?;
        }

        self.stats.events += count as u64;
        counter!("feed_events_total").increment(count as u64);
        Ok(count)
    }

    fn record_failure(&mut self) {
        self.stats.failed += 1;
        counter!("feed_cycles_failed_total", "producer" => self.producer.name().to_string())
            .increment(1);
    }

    fn persist(&self, event: &Event) {
        match event {
            Event::PriceUpdate {
                ticker,
                price,
                change,
                change_percent,
                volume,
                timestamp,
            } => self.store.upsert_price(PriceQuote {
                ticker: ticker.clone(),
                price: *price,
                change: *change,
                change_percent: *change_percent,
                volume: *volume,
                timestamp: *timestamp,
            }),
            Event::NewSignal { signal } => self.store.insert_signal(signal.clone()),
            Event::NewAlert { alert } => self.store.insert_alert(alert.clone()),
            Event::MarketStatusChanged { status, .. } => self.store.set_market_status(*status),
            Event::SystemHeartbeat { .. } => {}
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use signal_core::{SignalAction, TradingSignal};

    struct StaticProducer(Vec<Event>);

    #[async_trait]
    impl EventProducer for StaticProducer {
        fn name(&self) -> &str {
            "static"
        }

        async fn produce(&mut self) -> FeedResult<Vec<Event>> {
            Ok(self.0.clone())
        }
    }

    struct FailingProducer;

    #[async_trait]
    impl EventProducer for FailingProducer {
        fn name(&self) -> &str {
            "failing"
        }

        async fn produce(&mut self) -> FeedResult<Vec<Event>> {
            Err(FeedError::Producer("upstream unavailable".to_string()))
        }
    }

    /// 홀수 번째 호출에서 패닉하는 프로듀서.
    struct FlakyProducer {
        calls: u32,
    }

    #[async_trait]
    impl EventProducer for FlakyProducer {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn produce(&mut self) -> FeedResult<Vec<Event>> {
            self.calls += 1;
            if self.calls % 2 == 1 {
                panic!("indicator overflow");
            }
            Ok(vec![signal_event()])
        }
    }

    fn signal_event() -> Event {
        Event::NewSignal {
            signal: TradingSignal::new("AAPL", SignalAction::Buy, dec!(190)),
        }
    }

    #[tokio::test]
    async fn test_cycle_persists_and_forwards() {
        let store = MemoryStore::with_defaults();
        let (tx, mut rx) = mpsc::channel(16);
        let mut scheduler = FeedScheduler::new(
            StaticProducer(vec![signal_event()]),
            store.clone(),
            tx,
            Duration::from_millis(10),
        );

        // 첫 주기는 장 상태 이벤트를 함께 전달
        assert_eq!(scheduler.run_cycle().await.unwrap(), 2);
        assert!(matches!(rx.recv().await, Some(Event::MarketStatusChanged { .. })));
        assert!(matches!(rx.recv().await, Some(Event::NewSignal { .. })));

        assert_eq!(scheduler.run_cycle().await.unwrap(), 1);
        assert_eq!(store.stats().signals, 2);
    }

    #[tokio::test]
    async fn test_producer_error_skips_cycle() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut scheduler = FeedScheduler::new(
            FailingProducer,
            MemoryStore::with_defaults(),
            tx,
            Duration::from_millis(10),
        );

        assert!(matches!(scheduler.run_cycle().await, Err(FeedError::Producer(_))));
        assert_eq!(scheduler.stats().failed, 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_producer_panic_is_contained() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut scheduler = FeedScheduler::new(
            FlakyProducer { calls: 0 },
            MemoryStore::with_defaults(),
            tx,
            Duration::from_millis(10),
        );

        let err = scheduler.run_cycle().await.unwrap_err();
        assert!(err.to_string().contains("indicator overflow"));

        // 다음 주기는 정상 동작
        assert!(scheduler.run_cycle().await.is_ok());
        assert!(rx.recv().await.is_some());
        assert_eq!(scheduler.stats().failed, 1);
        assert_eq!(scheduler.stats().cycles, 2);
    }

    #[tokio::test]
    async fn test_run_stops_when_channel_closes() {
        let (tx, rx) = mpsc::channel(16);
        drop(rx);
        let scheduler = FeedScheduler::new(
            StaticProducer(vec![signal_event()]),
            MemoryStore::with_defaults(),
            tx,
            Duration::from_millis(5),
        );

        let stats = tokio::time::timeout(Duration::from_secs(2), scheduler.run(CancellationToken::new()))
            .await
            .unwrap();
        assert_eq!(stats.cycles, 1);
        assert_eq!(stats.events, 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel_and_survives_failures() {
        let (tx, _rx) = mpsc::channel(16);
        let scheduler = FeedScheduler::new(
            FailingProducer,
            MemoryStore::with_defaults(),
            tx,
            Duration::from_millis(5),
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(scheduler.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(40)).await;
        cancel.cancel();

        let stats = handle.await.unwrap();
        assert!(stats.failed >= 2);
        assert_eq!(stats.failed, stats.cycles);
    }
}
