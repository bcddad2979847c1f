//! 설정 관리 -- sigwatch.toml 파싱 및 런타임 설정
//!
//! [`SigwatchConfig`]는 모든 컴포넌트의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`SIGWATCH_SNIFFER_INTERFACE=eth0` 형식)
//! 3. 설정 파일 (`sigwatch.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), sigwatch_core::error::SigwatchError> {
//! use sigwatch_core::config::SigwatchConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = SigwatchConfig::load("sigwatch.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = SigwatchConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, SigwatchError};

/// 큐 용량 상한
pub const MAX_QUEUE_CAPACITY: usize = 1_000_000;

/// 워커 수 상한
pub const MAX_WORKERS: usize = 256;

/// sigwatch 통합 설정
///
/// `sigwatch.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 컴포넌트는 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SigwatchConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 스니퍼 설정
    #[serde(default)]
    pub sniffer: SnifferConfig,
    /// 재전송 중복 제거 설정
    #[serde(default)]
    pub dedup: DedupConfig,
    /// 펀널 설정
    #[serde(default)]
    pub funnel: FunnelConfig,
    /// 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl SigwatchConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SigwatchError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, SigwatchError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SigwatchError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                SigwatchError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, SigwatchError> {
        toml::from_str(toml_str).map_err(|e| {
            SigwatchError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `SIGWATCH_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "SIGWATCH_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "SIGWATCH_GENERAL_LOG_FORMAT");

        // Sniffer
        override_string(&mut self.sniffer.interface, "SIGWATCH_SNIFFER_INTERFACE");
        override_u64(
            &mut self.sniffer.read_timeout_ms,
            "SIGWATCH_SNIFFER_READ_TIMEOUT_MS",
        );
        override_string(&mut self.sniffer.rule_path, "SIGWATCH_SNIFFER_RULE_PATH");
        override_string(
            &mut self.sniffer.alert_log_path,
            "SIGWATCH_SNIFFER_ALERT_LOG_PATH",
        );

        // Dedup
        override_u64(&mut self.dedup.window_secs, "SIGWATCH_DEDUP_WINDOW_SECS");
        override_usize(&mut self.dedup.max_entries, "SIGWATCH_DEDUP_MAX_ENTRIES");

        // Funnel
        override_bool(&mut self.funnel.enabled, "SIGWATCH_FUNNEL_ENABLED");
        override_csv(
            &mut self.funnel.tracked_sources,
            "SIGWATCH_FUNNEL_TRACKED_SOURCES",
        );
        override_u64(
            &mut self.funnel.poll_interval_ms,
            "SIGWATCH_FUNNEL_POLL_INTERVAL_MS",
        );
        override_usize(
            &mut self.funnel.queue_capacity,
            "SIGWATCH_FUNNEL_QUEUE_CAPACITY",
        );
        override_usize(&mut self.funnel.workers, "SIGWATCH_FUNNEL_WORKERS");
        override_bool(&mut self.funnel.learn_rules, "SIGWATCH_FUNNEL_LEARN_RULES");

        // Metrics
        override_bool(&mut self.metrics.enabled, "SIGWATCH_METRICS_ENABLED");
        override_string(
            &mut self.metrics.listen_addr,
            "SIGWATCH_METRICS_LISTEN_ADDR",
        );
        override_u16(&mut self.metrics.port, "SIGWATCH_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), SigwatchError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.sniffer.interface.trim().is_empty() {
            return Err(invalid("sniffer.interface", "must not be empty"));
        }
        if self.sniffer.read_timeout_ms == 0 {
            return Err(invalid("sniffer.read_timeout_ms", "must be greater than 0"));
        }
        if self.sniffer.rule_path.trim().is_empty() {
            return Err(invalid("sniffer.rule_path", "must not be empty"));
        }
        if self.sniffer.alert_log_path.trim().is_empty() {
            return Err(invalid("sniffer.alert_log_path", "must not be empty"));
        }

        if self.dedup.window_secs == 0 {
            return Err(invalid("dedup.window_secs", "must be greater than 0"));
        }
        if self.dedup.max_entries == 0 {
            return Err(invalid("dedup.max_entries", "must be greater than 0"));
        }

        // 펀널 비활성화 시에도 tracked_sources 형식은 검증합니다.
        self.funnel.parsed_tracked_sources()?;
        if self.funnel.poll_interval_ms == 0 {
            return Err(invalid("funnel.poll_interval_ms", "must be greater than 0"));
        }
        if self.funnel.queue_capacity == 0 || self.funnel.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(invalid(
                "funnel.queue_capacity",
                format!("must be between 1 and {MAX_QUEUE_CAPACITY}"),
            ));
        }
        if self.funnel.workers == 0 || self.funnel.workers > MAX_WORKERS {
            return Err(invalid(
                "funnel.workers",
                format!("must be between 1 and {MAX_WORKERS}"),
            ));
        }

        if self.metrics.enabled {
            if self.metrics.listen_addr.parse::<IpAddr>().is_err() {
                return Err(invalid(
                    "metrics.listen_addr",
                    format!("'{}' is not a valid IP address", self.metrics.listen_addr),
                ));
            }
            if self.metrics.port == 0 {
                return Err(invalid("metrics.port", "must be greater than 0"));
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> SigwatchError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 스니퍼 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnifferConfig {
    /// 캡처할 네트워크 인터페이스
    pub interface: String,
    /// 캡처 호출당 읽기 타임아웃 (밀리초). 정지 지연의 상한입니다.
    pub read_timeout_ms: u64,
    /// 룰 파일 경로
    pub rule_path: String,
    /// 알림 로그 파일 경로
    pub alert_log_path: String,
}

impl Default for SnifferConfig {
    fn default() -> Self {
        Self {
            interface: "eth0".to_owned(),
            read_timeout_ms: 500,
            rule_path: "/etc/sigwatch/default.rules".to_owned(),
            alert_log_path: "/var/log/sigwatch/alerts.log".to_owned(),
        }
    }
}

/// TCP 재전송 중복 제거 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// 플로우 키 유지 기간 (초)
    pub window_secs: u64,
    /// 추적할 최대 플로우 키 수
    pub max_entries: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            window_secs: 300,
            max_entries: 1_000_000,
        }
    }
}

/// 펀널(라우터 + 워커 풀) 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FunnelConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 미매칭 프레임을 펀널로 보낼 출발지 IP 목록
    pub tracked_sources: Vec<String>,
    /// 대기 집합 드레인 주기 (밀리초)
    pub poll_interval_ms: u64,
    /// 워커 큐 용량
    pub queue_capacity: usize,
    /// 워커 수
    pub workers: usize,
    /// 펀널로 들어온 프레임마다 정확 일치 룰을 룰 파일에 추가할지 여부
    pub learn_rules: bool,
}

impl FunnelConfig {
    /// `tracked_sources`를 IPv4 주소 목록으로 파싱합니다.
    pub fn parsed_tracked_sources(&self) -> Result<Vec<Ipv4Addr>, SigwatchError> {
        self.tracked_sources
            .iter()
            .map(|s| {
                s.trim().parse::<Ipv4Addr>().map_err(|_| {
                    invalid(
                        "funnel.tracked_sources",
                        format!("'{s}' is not a valid IPv4 address"),
                    )
                })
            })
            .collect()
    }
}

impl Default for FunnelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tracked_sources: vec!["192.168.2.12".to_owned()],
            poll_interval_ms: 1000,
            queue_capacity: 1024,
            workers: 4,
            learn_rules: false,
        }
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 수신 주소
    pub listen_addr: String,
    /// 수신 포트
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
