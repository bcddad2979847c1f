//! sigwatch 스니퍼
//!
//! 링크 계층에서 프레임을 읽어 시그니처를 추출하고, 활성 룰 집합과
//! 매칭하여 알림을 기록합니다. 매칭되지 않은 추적 대상 프레임은
//! 펀널 대기 집합으로 넘깁니다.
//!
//! # 모듈 구성
//!
//! - [`capture`]: 프레임 소스 ([`ChannelFrameSource`], [`ReplayFrameSource`])
//! - [`extractor`]: 이더넷/IPv4/전송 계층 단일 파싱
//! - [`dedup`]: TCP 재전송 중복 제거
//! - [`alert`]: 알림 로그 기록기
//! - [`sniffer`]: 캡처 스레드와 [`Pipeline`](sigwatch_core::Pipeline) 구현
//! - [`error`]: 도메인 에러 타입

pub mod alert;
pub mod capture;
pub mod dedup;
pub mod error;
pub mod extractor;
pub mod sniffer;

// --- 주요 타입 re-export ---

pub use alert::AlertSink;
pub use capture::{ChannelFrameSource, FrameSource, ReplayFrameSource};
pub use dedup::Deduplicator;
pub use error::{AlertError, CaptureError, ExtractionError};
pub use extractor::{FlowKey, FrameInfo, extract, flow_key, inspect};
pub use sniffer::{FrameOutcome, Sniffer, SnifferBuilder, SnifferStats, SnifferStatsSnapshot};
