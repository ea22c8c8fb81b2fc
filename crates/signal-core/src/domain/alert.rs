//! 리스크 알림.
//!
//! 가격 급변, 거래량 급증 같은 상황에서 프로듀서가 발행하는 알림 타입입니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::normalize_ticker;

/// 알림 유형.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    /// 가격 임계값 돌파
    PriceThreshold,
    /// 거래량 급증
    VolumeSpike,
    /// 기술적 지표 조건
    TechnicalIndicator,
    /// 고신뢰도 신호 발생
    SignalConfidence,
    /// 리스크 경고
    RiskWarning,
}

/// 알림 심각도. 선언 순서대로 정렬됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::str::FromStr for AlertSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(format!("Unknown alert severity: {}", s)),
        }
    }
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        write!(f, "{}", name)
    }
}

/// 발행된 알림.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingAlert {
    /// 고유 알림 ID
    pub id: Uuid,
    /// 종목 티커 (대문자)
    pub ticker: String,
    /// 알림 유형
    pub alert_type: AlertType,
    /// 심각도
    pub severity: AlertSeverity,
    /// 사용자에게 보여줄 메시지
    pub message: String,
    /// 활성 여부
    pub is_active: bool,
    /// 추가 메타데이터
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// 생성 시각
    pub created_at: DateTime<Utc>,
}

impl TradingAlert {
    /// 새 알림을 생성합니다.
    pub fn new(
        ticker: &str,
        alert_type: AlertType,
        severity: AlertSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            ticker: normalize_ticker(ticker),
            alert_type,
            severity,
            message: message.into(),
            is_active: true,
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    /// 메타데이터를 추가합니다.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(AlertSeverity::Critical > AlertSeverity::High);
        assert!(AlertSeverity::Medium > AlertSeverity::Low);
        assert_eq!("HIGH".parse::<AlertSeverity>().unwrap(), AlertSeverity::High);
        assert!("urgent".parse::<AlertSeverity>().is_err());
    }

    #[test]
    fn test_alert_serialization() {
        let alert = TradingAlert::new("nvda", AlertType::VolumeSpike, AlertSeverity::High, "Volume 4.2x average");
        let json = serde_json::to_value(&alert).unwrap();

        assert_eq!(json["ticker"], "NVDA");
        assert_eq!(json["alertType"], "volume_spike");
        assert_eq!(json["severity"], "high");
        assert_eq!(json["isActive"], true);
    }
}
