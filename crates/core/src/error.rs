//! 에러 타입 -- 도메인별 에러 정의
//!
//! 각 도메인 크레이트는 자체 에러 enum을 정의하고
//! `From<...> for SigwatchError` 변환을 제공하여 `?`로 전파합니다.

/// sigwatch 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum SigwatchError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인(생명주기, 채널) 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 탐지(룰 로딩, 매칭) 에러
    #[error("detection error: {0}")]
    Detection(#[from] DetectionError),

    /// 패킷 캡처 에러 (인터페이스 없음, 권한 부족)
    #[error("capture error: {0}")]
    Capture(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 컴포넌트 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 현재 상태에서 허용되지 않는 전이
    #[error("invalid state transition: {from} -> {to}")]
    InvalidState { from: String, to: String },

    /// 백그라운드 태스크/스레드 join 실패
    #[error("task join failed: {0}")]
    Join(String),
}

/// 탐지 엔진 에러
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    /// 룰 파일 로딩 실패 (중복 ID 포함)
    #[error("rule load failed: {0}")]
    RuleLoad(String),

    /// 알림 기록 실패
    #[error("alert sink error: {0}")]
    Alert(String),
}
