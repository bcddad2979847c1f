//! sigwatch 펀널
//!
//! 룰에 매칭되지 않은 추적 대상 프레임을 대기 집합에서 주기적으로 꺼내
//! 제한된 FIFO 큐에 넣고, 워커 풀이 이상 탐지 협력자를 호출합니다.
//!
//! # 모듈 구성
//!
//! - [`funnel`]: 라우터/워커 태스크와 [`Pipeline`](sigwatch_core::Pipeline) 구현
//! - [`collaborator`]: 협력자 trait, 기본 구현, 룰 학습기
//! - [`error`]: 도메인 에러 타입

pub mod collaborator;
pub mod error;
pub mod funnel;

// --- 주요 타입 re-export ---

pub use collaborator::{AnomalyCollaborator, LoggingCollaborator, RuleLearner};
pub use error::{CollaboratorError, FunnelError};
pub use funnel::{Funnel, FunnelBuilder, FunnelItem, FunnelStats, FunnelStatsSnapshot};
