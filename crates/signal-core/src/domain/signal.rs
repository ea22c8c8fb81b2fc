//! 매매 시그널.
//!
//! 프로듀서가 생성하는 매매 신호 타입을 정의합니다:
//! - `SignalAction` - 신호 방향 (매수/매도/관망)
//! - `TradingSignal` - 매매 신호 엔티티
//!
//! 배포 엔진은 `ticker` 필드만 라우팅에 사용하며 나머지 필드는 그대로 직렬화합니다.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::normalize_ticker;

/// 신호 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalAction {
    /// 매수
    Buy,
    /// 매도
    Sell,
    /// 관망
    Hold,
}

impl std::fmt::Display for SignalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalAction::Buy => write!(f, "BUY"),
            SignalAction::Sell => write!(f, "SELL"),
            SignalAction::Hold => write!(f, "HOLD"),
        }
    }
}

/// 프로듀서가 생성한 매매 신호.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingSignal {
    /// 고유 신호 ID
    pub id: Uuid,
    /// 종목 티커 (대문자)
    pub ticker: String,
    /// 신호 방향
    pub action: SignalAction,
    /// 신뢰도 (0.0 ~ 1.0)
    pub confidence: f64,
    /// 신호 발생 시점 가격
    pub price: Decimal,
    /// 목표가
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_price: Option<Decimal>,
    /// 손절가
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<Decimal>,
    /// 신호 근거 설명
    pub reasoning: String,
    /// 신호를 만든 소스 (지표/모델 이름)
    pub source: String,
    /// 추가 메타데이터
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// 생성 시각
    pub created_at: DateTime<Utc>,
}

impl TradingSignal {
    /// 새 신호를 생성합니다.
    pub fn new(ticker: &str, action: SignalAction, price: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            ticker: normalize_ticker(ticker),
            action,
            confidence: 0.5,
            price,
            target_price: None,
            stop_loss: None,
            reasoning: String::new(),
            source: String::new(),
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    /// 신뢰도를 설정합니다.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// 목표가와 손절가를 설정합니다.
    pub fn with_levels(mut self, target_price: Option<Decimal>, stop_loss: Option<Decimal>) -> Self {
        self.target_price = target_price;
        self.stop_loss = stop_loss;
        self
    }

    /// 근거와 소스를 설정합니다.
    pub fn with_reasoning(mut self, source: impl Into<String>, reasoning: impl Into<String>) -> Self {
        self.source = source.into();
        self.reasoning = reasoning.into();
        self
    }

    /// 메타데이터를 추가합니다.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// 강한 신호인지 확인합니다 (신뢰도 >= 0.7).
    pub fn is_strong(&self) -> bool {
        self.confidence >= 0.7
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_signal_creation() {
        let signal = TradingSignal::new("aapl", SignalAction::Buy, dec!(189.5))
            .with_confidence(1.4)
            .with_reasoning("momentum", "5-tick momentum breakout")
            .with_metadata("window", serde_json::json!(5));

        assert_eq!(signal.ticker, "AAPL");
        assert_eq!(signal.confidence, 1.0);
        assert!(signal.is_strong());
        assert_eq!(signal.metadata.get("window"), Some(&serde_json::json!(5)));
    }

    #[test]
    fn test_signal_serialization() {
        let signal = TradingSignal::new("TSLA", SignalAction::Sell, dec!(240))
            .with_levels(Some(dec!(220)), Some(dec!(250)));
        let json = serde_json::to_value(&signal).unwrap();

        assert_eq!(json["action"], "SELL");
        assert_eq!(json["ticker"], "TSLA");
        assert!(json.get("targetPrice").is_some());
        assert!(json.get("createdAt").is_some());
    }
}
