//! 토픽 라우팅.
//!
//! 토픽은 저장되는 엔티티가 아니라 이벤트 내용에서 파생되는 문자열 키입니다.
//! 존재하지 않는 토픽 구독도 허용되며, 일치하는 이벤트가 나타날 때까지 아무것도 받지 않습니다.
//!
//! | 이벤트 | 토픽 |
//! |--------|------|
//! | `PriceUpdate` | `market_updates`, `ticker:<TICKER>` |
//! | `NewSignal` | `signals`, `ticker:<TICKER>` |
//! | `NewAlert` | `alerts`, `ticker:<TICKER>` |
//! | `MarketStatusChanged` | `market_updates` |
//! | `SystemHeartbeat` | 없음 (모든 연결에 무조건 전달) |
//!
//! `*` 구독자는 분류와 무관하게 모든 이벤트를 받습니다.

use std::collections::BTreeSet;

use signal_core::{normalize_ticker, Event};

/// 매매 신호 토픽
pub const SIGNALS: &str = "signals";
/// 리스크 알림 토픽
pub const ALERTS: &str = "alerts";
/// 시세/장 상태 토픽
pub const MARKET_UPDATES: &str = "market_updates";
/// 전체 이벤트 와일드카드
pub const WILDCARD: &str = "*";
/// 종목별 토픽 접두사
pub const TICKER_PREFIX: &str = "ticker:";
/// 채널 이름 최대 길이 (바이트)
pub const MAX_TOPIC_LEN: usize = 128;
/// 연결당 최대 구독 수
pub const MAX_SUBSCRIPTIONS_PER_CONNECTION: usize = 64;

/// 이벤트가 속한 토픽 집합.
pub type TopicSet = BTreeSet<String>;

/// 종목 토픽 이름 (`ticker:AAPL`).
pub fn ticker_topic(ticker: &str) -> String {
    format!("{}{}", TICKER_PREFIX, normalize_ticker(ticker))
}

/// 클라이언트가 보낸 채널 이름을 정규화합니다.
///
/// 종목 토픽의 티커 부분만 대문자로 바꾸고 나머지는 공백만 제거합니다.
pub fn normalize_topic(channel: &str) -> String {
    let channel = channel.trim();
    match channel.strip_prefix(TICKER_PREFIX) {
        Some(ticker) => ticker_topic(ticker),
        None => channel.to_string(),
    }
}

/// 이벤트를 토픽 집합으로 분류합니다.
pub fn classify(event: &Event) -> TopicSet {
    let mut topics = TopicSet::new();
    match event {
        Event::PriceUpdate { ticker, .. } => {
            topics.insert(MARKET_UPDATES.to_string());
            topics.insert(ticker_topic(ticker));
        }
        Event::NewSignal { signal } => {
            topics.insert(SIGNALS.to_string());
            topics.insert(ticker_topic(&signal.ticker));
        }
        Event::NewAlert { alert } => {
            topics.insert(ALERTS.to_string());
            topics.insert(ticker_topic(&alert.ticker));
        }
        Event::MarketStatusChanged { .. } => {
            topics.insert(MARKET_UPDATES.to_string());
        }
        Event::SystemHeartbeat { .. } => {}
    }
    topics
}

/// 구독과 무관하게 모든 연결에 전달되는 이벤트인지 확인합니다.
pub fn is_unconditional(event: &Event) -> bool {
    matches!(event, Event::SystemHeartbeat { .. })
}

/// 환영 메시지에 안내할 채널 목록.
pub fn available_channels() -> Vec<String> {
    vec![
        SIGNALS.to_string(),
        ALERTS.to_string(),
        MARKET_UPDATES.to_string(),
        format!("{}<TICKER>", TICKER_PREFIX),
        WILDCARD.to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use signal_core::{AlertSeverity, AlertType, MarketStatus, SignalAction, TradingAlert, TradingSignal};

    fn set(items: &[&str]) -> TopicSet {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_classify_rules() {
        let price = Event::PriceUpdate {
            ticker: "aapl".to_string(),
            price: dec!(190),
            change: dec!(1),
            change_percent: dec!(0.5),
            volume: 100,
            timestamp: Utc::now(),
        };
        assert_eq!(classify(&price), set(&["market_updates", "ticker:AAPL"]));

        let signal = Event::NewSignal {
            signal: TradingSignal::new("TSLA", SignalAction::Sell, dec!(240)),
        };
        assert_eq!(classify(&signal), set(&["signals", "ticker:TSLA"]));

        let alert = Event::NewAlert {
            alert: TradingAlert::new("NVDA", AlertType::VolumeSpike, AlertSeverity::High, "spike"),
        };
        assert_eq!(classify(&alert), set(&["alerts", "ticker:NVDA"]));

        let status = Event::MarketStatusChanged {
            status: MarketStatus::Open,
            timestamp: Utc::now(),
        };
        assert_eq!(classify(&status), set(&["market_updates"]));

        let heartbeat = Event::heartbeat(0, 0);
        assert!(classify(&heartbeat).is_empty());
        assert!(is_unconditional(&heartbeat));
        assert!(!is_unconditional(&status));
    }

    #[test]
    fn test_normalize_topic() {
        assert_eq!(normalize_topic("ticker:aapl"), "ticker:AAPL");
        assert_eq!(normalize_topic("  ticker: msft "), "ticker:MSFT");
        assert_eq!(normalize_topic(" signals "), "signals");
        assert_eq!(normalize_topic("*"), "*");
        assert_eq!(normalize_topic("no_such_topic"), "no_such_topic");
    }

    #[test]
    fn test_available_channels() {
        let channels = available_channels();
        assert!(channels.contains(&"signals".to_string()));
        assert!(channels.contains(&"ticker:<TICKER>".to_string()));
        assert!(channels.contains(&"*".to_string()));
    }
}
