//! 설정 관리.
//!
//! 기본값 → TOML 파일(선택) → `SIGNAL__` 접두사 환경 변수 순서로 덮어씁니다.
//!
//! ```text
//! SIGNAL__SERVER__PORT=9000
//! SIGNAL__STREAM__LIVENESS_INTERVAL_SECS=10
//! SIGNAL__FEED__TICKERS=AAPL,TSLA
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::domain::AlertSeverity;
use crate::error::{SignalError, SignalResult};

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// 서버 설정
    pub server: ServerConfig,
    /// 스트림 엔진 설정
    pub stream: StreamConfig,
    /// 이벤트 피드 설정
    pub feed: FeedConfig,
    /// 저장소 설정
    pub storage: StorageConfig,
    /// 로깅 설정
    pub logging: LoggingConfig,
    /// 알림 설정
    pub notifications: NotificationConfig,
}

/// 서버 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 바인딩할 호스트
    pub host: String,
    /// 리스닝할 포트
    pub port: u16,
    /// WebSocket 엔드포인트 경로
    pub ws_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ws_path: "/ws/trading".to_string(),
        }
    }
}

impl ServerConfig {
    /// `host:port` 형식의 바인딩 주소.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 스트림 엔진 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamConfig {
    /// 연결별 송신 큐 크기
    pub outbound_queue_capacity: usize,
    /// 생존 확인 주기 (초)
    pub liveness_interval_secs: u64,
    /// 시스템 하트비트 주기 (초)
    pub heartbeat_interval_secs: u64,
    /// 이벤트 수집 채널 버퍼 크기
    pub ingest_buffer: usize,
    /// 종료 시 송신 대기 시간 (밀리초)
    pub shutdown_grace_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: 256,
            liveness_interval_secs: 30,
            heartbeat_interval_secs: 30,
            ingest_buffer: 1024,
            shutdown_grace_ms: 2000,
        }
    }
}

impl StreamConfig {
    pub fn liveness_interval(&self) -> Duration {
        Duration::from_secs(self.liveness_interval_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// 모의 시세 피드 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FeedConfig {
    /// 피드 활성화 여부
    pub enabled: bool,
    /// 발행 주기 (밀리초)
    pub tick_interval_ms: u64,
    /// 시세를 생성할 종목
    pub tickers: Vec<String>,
    /// 주기당 신호 발생 확률
    pub signal_probability: f64,
    /// 가격 알림 임계 변동률 (%)
    pub alert_move_threshold_pct: f64,
    /// 거래량 급증 판단 배수
    pub volume_spike_ratio: f64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval_ms: 1000,
            tickers: ["AAPL", "MSFT", "GOOGL", "AMZN", "TSLA", "NVDA", "META", "SPY"]
                .iter()
                .map(|t| t.to_string())
                .collect(),
            signal_probability: 0.05,
            alert_move_threshold_pct: 2.0,
            volume_spike_ratio: 3.0,
        }
    }
}

impl FeedConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// 허용되는 최대 보존 기간 (1년).
pub const MAX_RETENTION_HOURS: i64 = 24 * 365;

/// 저장소 보존 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 보관할 최대 신호 수
    pub max_signals: usize,
    /// 보관할 최대 알림 수
    pub max_alerts: usize,
    /// 보존 기간 (시간, 1..=`MAX_RETENTION_HOURS`)
    pub retention_hours: i64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_signals: 1000,
            max_alerts: 500,
            retention_hours: 24,
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// 알림 소비자 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// 알림 활성화 여부
    pub enabled: bool,
    /// 전달할 최소 심각도
    pub min_severity: AlertSeverity,
    /// 방해 금지 시작 시각 (0-23)
    pub quiet_hours_start: Option<u32>,
    /// 방해 금지 종료 시각 (0-23)
    pub quiet_hours_end: Option<u32>,
    /// 방해 금지 시간대 기준 타임존
    pub timezone: String,
    /// 웹훅 URL (비어 있으면 로그로만 전달)
    pub webhook_url: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_severity: AlertSeverity::High,
            quiet_hours_start: Some(22),
            quiet_hours_end: Some(7),
            timezone: "America/New_York".to_string(),
            webhook_url: String::new(),
        }
    }
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// 파일이 없으면 기본값과 환경 변수만 사용합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> SignalResult<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("SIGNAL")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("feed.tickers")
                    .try_parsing(true),
            );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> SignalResult<Self> {
        Self::load("config/default.toml")
    }

    /// 설정 값의 유효성을 검사합니다.
    pub fn validate(&self) -> SignalResult<()> {
        if !self.server.ws_path.starts_with('/') {
            return Err(SignalError::Config(format!(
                "server.ws_path must start with '/': {}",
                self.server.ws_path
            )));
        }
        if self.stream.outbound_queue_capacity == 0 || self.stream.ingest_buffer == 0 {
            return Err(SignalError::Config(
                "stream queue capacities must be greater than zero".to_string(),
            ));
        }
        if self.stream.liveness_interval_secs == 0 || self.stream.heartbeat_interval_secs == 0 {
            return Err(SignalError::Config(
                "stream intervals must be greater than zero".to_string(),
            ));
        }
        if self.feed.enabled && (self.feed.tickers.is_empty() || self.feed.tick_interval_ms == 0) {
            return Err(SignalError::Config(
                "feed requires at least one ticker and a non-zero interval".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.feed.signal_probability) {
            return Err(SignalError::Config(format!(
                "feed.signal_probability must be within 0.0..=1.0: {}",
                self.feed.signal_probability
            )));
        }
        if !self.feed.alert_move_threshold_pct.is_finite() || self.feed.alert_move_threshold_pct <= 0.0 {
            return Err(SignalError::Config(format!(
                "feed.alert_move_threshold_pct must be a positive number: {}",
                self.feed.alert_move_threshold_pct
            )));
        }
        if !self.feed.volume_spike_ratio.is_finite() || self.feed.volume_spike_ratio < 1.0 {
            return Err(SignalError::Config(format!(
                "feed.volume_spike_ratio must be at least 1.0: {}",
                self.feed.volume_spike_ratio
            )));
        }
        if !(1..=MAX_RETENTION_HOURS).contains(&self.storage.retention_hours) {
            return Err(SignalError::Config(format!(
                "storage.retention_hours must be within 1..={}: {}",
                MAX_RETENTION_HOURS, self.storage.retention_hours
            )));
        }
        for hour in [self.notifications.quiet_hours_start, self.notifications.quiet_hours_end]
            .into_iter()
            .flatten()
        {
            if hour > 23 {
                return Err(SignalError::Config(format!("quiet hour out of range: {}", hour)));
            }
        }
        Ok(())
    }
}
