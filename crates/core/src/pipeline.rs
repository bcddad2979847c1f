//! 파이프라인 trait -- 컴포넌트 생명주기 정의
//!
//! 스니퍼와 펀널은 모두 [`Pipeline`]을 구현하여 데몬에서 동일한
//! 방식(start/stop/health_check)으로 관리됩니다.
//!
//! # 생명주기
//! ```text
//! Idle → start() → Running → stop() → Stopping → (루프 종료) → Stopped
//! ```
//! `Stopped`는 종료 상태이며 다시 시작할 수 없습니다.

use std::fmt;
use std::future::Future;

use serde::Serialize;

use crate::error::{PipelineError, SigwatchError};

/// 컴포넌트 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ComponentState {
    /// 생성됨, 아직 시작하지 않음
    Idle,
    /// 실행 중
    Running,
    /// 정지 요청됨 (협력적 플래그 설정, 루프 종료 대기)
    Stopping,
    /// 정지됨 (종료 상태)
    Stopped,
}

impl ComponentState {
    /// 다음 상태로의 전이가 허용되는지 확인하고, 허용되면 새 상태를 반환합니다.
    pub fn transition(self, to: ComponentState) -> Result<ComponentState, PipelineError> {
        let allowed = matches!(
            (self, to),
            (Self::Idle, Self::Running)
                | (Self::Running, Self::Stopping)
                | (Self::Stopping, Self::Stopped)
        );
        if allowed {
            Ok(to)
        } else {
            Err(PipelineError::InvalidState {
                from: self.to_string(),
                to: to.to_string(),
            })
        }
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// 컴포넌트 건강 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 동작하지만 성능 저하
    Degraded(String),
    /// 비정상
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 상태인지 확인합니다.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 비정상 상태인지 확인합니다.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// 데몬이 관리하는 실행 단위
///
/// 각 구현체는 자신의 루프(스레드 또는 태스크)를 직접 소유합니다.
/// 취소는 협력적이며, `stop()`은 루프가 현재 블로킹 호출을 마치고
/// 정지 플래그를 관찰할 때까지 기다립니다.
pub trait Pipeline: Send {
    /// 컴포넌트를 시작합니다. `Idle` 상태에서만 호출 가능합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), SigwatchError>> + Send;

    /// 컴포넌트를 정지하고 루프 종료를 기다립니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), SigwatchError>> + Send;

    /// 현재 건강 상태를 확인합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;

    /// 현재 생명주기 상태를 반환합니다.
    fn state(&self) -> ComponentState;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_are_allowed() {
        let s = ComponentState::Idle;
        let s = s.transition(ComponentState::Running).unwrap();
        let s = s.transition(ComponentState::Stopping).unwrap();
        let s = s.transition(ComponentState::Stopped).unwrap();
        assert_eq!(s, ComponentState::Stopped);
    }

    #[test]
    fn stopped_is_terminal() {
        let err = ComponentState::Stopped
            .transition(ComponentState::Running)
            .unwrap_err();
        assert!(err.to_string().contains("stopped -> running"));
    }

    #[test]
    fn cannot_skip_stopping() {
        assert!(
            ComponentState::Running
                .transition(ComponentState::Stopped)
                .is_err()
        );
        assert!(
            ComponentState::Idle
                .transition(ComponentState::Stopping)
                .is_err()
        );
    }

    #[test]
    fn health_status_predicates() {
        assert!(HealthStatus::Healthy.is_healthy());
        assert!(!HealthStatus::Degraded("x".to_owned()).is_healthy());
        assert!(HealthStatus::Unhealthy("x".to_owned()).is_unhealthy());
        assert_eq!(
            HealthStatus::Degraded("queue full".to_owned()).to_string(),
            "degraded: queue full"
        );
    }
}
