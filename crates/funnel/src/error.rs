//! 펀널 에러 타입

use sigwatch_core::error::{ConfigError, PipelineError, SigwatchError};

/// 펀널 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum FunnelError {
    /// 잘못된 설정 값
    #[error("invalid funnel config: {field}: {reason}")]
    InvalidConfig {
        /// 필드 이름
        field: String,
        /// 사유
        reason: String,
    },

    /// 큐가 닫혀 항목을 보낼 수 없음
    #[error("funnel queue closed")]
    QueueClosed,
}

/// 이상 탐지 협력자 호출 실패
///
/// 워커 경계에서 포착되어 기록되며 워커는 계속 동작합니다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    /// 처리할 수 없는 프레임
    #[error("frame rejected: {reason}")]
    Rejected {
        /// 사유
        reason: String,
    },

    /// 협력자 내부 실패
    #[error("collaborator failed: {0}")]
    Failed(String),
}

impl From<FunnelError> for SigwatchError {
    fn from(err: FunnelError) -> Self {
        match err {
            FunnelError::InvalidConfig { field, reason } => {
                SigwatchError::Config(ConfigError::InvalidValue { field, reason })
            }
            FunnelError::QueueClosed => {
                SigwatchError::Pipeline(PipelineError::ChannelSend("funnel queue closed".to_owned()))
            }
        }
    }
}
