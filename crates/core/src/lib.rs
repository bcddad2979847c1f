//! sigwatch 공통 크레이트
//!
//! 시그니처 기반 네트워크 침입 탐지 코어의 모든 크레이트가 공유하는
//! 도메인 타입, 에러, 설정, 생명주기 trait, 메트릭 상수를 정의합니다.
//!
//! # 모듈 구성
//! - [`config`]: `sigwatch.toml` 파싱 및 환경변수 오버라이드
//! - [`error`]: 최상위 에러 타입과 도메인별 에러
//! - [`pipeline`]: 컴포넌트 생명주기 trait ([`Pipeline`]) 및 상태 머신
//! - [`types`]: 패킷 시그니처, 원시 프레임, 대기 집합
//! - [`metrics`]: 메트릭 이름 상수

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, DetectionError, PipelineError, SigwatchError};

// 설정
pub use config::SigwatchConfig;

// 파이프라인 trait
pub use pipeline::{ComponentState, HealthStatus, Pipeline};

// 도메인 타입
pub use types::{PacketProtocol, PacketSignature, PayloadMarker, PendingSet, RawFrame};
