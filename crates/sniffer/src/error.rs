//! 스니퍼 에러 타입
//!
//! - [`ExtractionError`]: 프레임 단위 에러. 해당 프레임만 건너뜁니다.
//! - [`CaptureError`]: 캡처 채널 에러. 시작 시점에 발생하면 치명적입니다.
//! - [`AlertError`]: 알림 로그 파일 에러.
//!
//! 모두 `From<...> for SigwatchError` 변환을 제공합니다.

use sigwatch_core::error::{DetectionError, SigwatchError};

/// 시그니처 추출 실패
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    /// 이더넷 타입이 IPv4가 아님
    #[error("not an IPv4 frame (ethertype 0x{ethertype:04x})")]
    NotIpv4 {
        /// 프레임의 이더넷 타입
        ethertype: u16,
    },

    /// 헤더가 잘려 있음
    #[error("truncated {layer} header")]
    Truncated {
        /// 잘린 계층 (ethernet, ipv4, tcp, udp)
        layer: &'static str,
    },
}

/// 캡처 채널 에러
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// 인터페이스를 찾을 수 없음
    #[error("interface '{name}' not found")]
    InterfaceNotFound {
        /// 요청한 인터페이스 이름
        name: String,
    },

    /// 캡처 권한 없음 (root 또는 CAP_NET_RAW 필요)
    #[error("permission denied opening capture on '{interface}' (requires root or CAP_NET_RAW)")]
    PermissionDenied {
        /// 인터페이스 이름
        interface: String,
    },

    /// 이더넷 채널이 아닌 채널 타입
    #[error("unsupported channel type on '{interface}'")]
    UnsupportedChannel {
        /// 인터페이스 이름
        interface: String,
    },

    /// 채널 열기 또는 읽기 실패
    #[error("capture io error on '{interface}': {source}")]
    Io {
        /// 인터페이스 이름
        interface: String,
        /// 원인
        #[source]
        source: std::io::Error,
    },
}

/// 알림 로그 에러
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    /// 알림 로그 파일 열기 실패
    #[error("failed to open alert log {path}: {source}")]
    Open {
        /// 알림 로그 경로
        path: String,
        /// 원인
        #[source]
        source: std::io::Error,
    },

    /// 기록 또는 플러시 실패
    #[error("failed to write alert: {0}")]
    Write(#[from] std::io::Error),
}

impl From<ExtractionError> for SigwatchError {
    fn from(err: ExtractionError) -> Self {
        SigwatchError::Capture(err.to_string())
    }
}

impl From<CaptureError> for SigwatchError {
    fn from(err: CaptureError) -> Self {
        SigwatchError::Capture(err.to_string())
    }
}

impl From<AlertError> for SigwatchError {
    fn from(err: AlertError) -> Self {
        SigwatchError::Detection(DetectionError::Alert(err.to_string()))
    }
}
