//! 알림 전달 정책.
//!
//! - 최소 심각도 미만의 알림은 건너뜁니다.
//! - 방해 금지 시간대에는 `critical` 알림만 전달합니다.
//! - 방해 금지 시간대는 자정을 넘길 수 있습니다 (예: 22시 ~ 7시).

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use signal_core::{AlertSeverity, NotificationConfig, TradingAlert};

use crate::types::{NotificationError, NotificationResult};

/// 방해 금지 시간대 (로컬 시각 기준, 시작 포함 / 종료 제외).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietHours {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl QuietHours {
    /// 주어진 시(0-23)가 방해 금지 시간대에 속하는지 확인합니다.
    pub fn contains(&self, hour: u32) -> bool {
        if self.start_hour == self.end_hour {
            return false;
        }
        if self.start_hour < self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

/// 정책 판정 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// 전달
    Deliver,
    /// 최소 심각도 미만
    BelowSeverity,
    /// 방해 금지 시간대
    QuietHours,
}

/// 알림 전달 정책.
#[derive(Debug, Clone)]
pub struct NotificationPolicy {
    min_severity: AlertSeverity,
    quiet_hours: Option<QuietHours>,
    timezone: Tz,
}

impl NotificationPolicy {
    pub fn new(min_severity: AlertSeverity, quiet_hours: Option<QuietHours>, timezone: Tz) -> Self {
        Self {
            min_severity,
            quiet_hours,
            timezone,
        }
    }

    /// 설정으로부터 정책을 생성합니다.
    pub fn from_config(config: &NotificationConfig) -> NotificationResult<Self> {
        let timezone: Tz = config
            .timezone
            .parse()
            .map_err(|e| NotificationError::Config(format!("timezone {}: {}", config.timezone, e)))?;

        let quiet_hours = match (config.quiet_hours_start, config.quiet_hours_end) {
            (Some(start_hour), Some(end_hour)) => Some(QuietHours {
                start_hour,
                end_hour,
            }),
            _ => None,
        };

        Ok(Self::new(config.min_severity, quiet_hours, timezone))
    }

    /// 알림을 지금 전달할지 판정합니다.
    pub fn evaluate(&self, alert: &TradingAlert, at: DateTime<Utc>) -> Decision {
        if alert.severity < self.min_severity {
            return Decision::BelowSeverity;
        }
        if alert.severity != AlertSeverity::Critical && self.is_quiet(at) {
            return Decision::QuietHours;
        }
        Decision::Deliver
    }

    /// 주어진 시각이 방해 금지 시간대인지 확인합니다.
    pub fn is_quiet(&self, at: DateTime<Utc>) -> bool {
        match self.quiet_hours {
            Some(quiet) => quiet.contains(at.with_timezone(&self.timezone).hour()),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use signal_core::AlertType;

    fn alert(severity: AlertSeverity) -> TradingAlert {
        TradingAlert::new("AAPL", AlertType::PriceThreshold, severity, "move")
    }

    fn utc_hour(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, hour, 15, 0).single().unwrap()
    }

    #[test]
    fn test_quiet_hours_wrap_midnight() {
        let quiet = QuietHours {
            start_hour: 22,
            end_hour: 7,
        };
        assert!(quiet.contains(22));
        assert!(quiet.contains(23));
        assert!(quiet.contains(0));
        assert!(quiet.contains(6));
        assert!(!quiet.contains(7));
        assert!(!quiet.contains(12));
    }

    #[test]
    fn test_quiet_hours_same_day_and_empty() {
        let quiet = QuietHours {
            start_hour: 12,
            end_hour: 14,
        };
        assert!(quiet.contains(13));
        assert!(!quiet.contains(14));

        let empty = QuietHours {
            start_hour: 5,
            end_hour: 5,
        };
        assert!(!empty.contains(5));
    }

    #[test]
    fn test_evaluate() {
        let policy = NotificationPolicy::new(
            AlertSeverity::Medium,
            Some(QuietHours {
                start_hour: 22,
                end_hour: 7,
            }),
            Tz::UTC,
        );

        assert_eq!(policy.evaluate(&alert(AlertSeverity::Low), utc_hour(12)), Decision::BelowSeverity);
        assert_eq!(policy.evaluate(&alert(AlertSeverity::High), utc_hour(12)), Decision::Deliver);
        assert_eq!(policy.evaluate(&alert(AlertSeverity::High), utc_hour(23)), Decision::QuietHours);
        assert_eq!(policy.evaluate(&alert(AlertSeverity::Critical), utc_hour(23)), Decision::Deliver);
    }

    #[test]
    fn test_from_config() {
        let config = NotificationConfig {
            timezone: "Asia/Seoul".to_string(),
            quiet_hours_start: None,
            ..Default::default()
        };
        let policy = NotificationPolicy::from_config(&config).unwrap();
        assert!(!policy.is_quiet(utc_hour(15)));

        let bad = NotificationConfig {
            timezone: "Mars/Olympus".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            NotificationPolicy::from_config(&bad),
            Err(NotificationError::Config(_))
        ));
    }
}
