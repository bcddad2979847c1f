//! sigwatch 시그니처 룰 엔진
//!
//! 룰 텍스트를 타입이 있는 [`Rule`]로 컴파일하고, 패킷 시그니처를
//! 방향/부정/구간 의미론에 따라 매칭합니다.
//!
//! # 모듈 구성
//!
//! - [`parser`]: 앵커된 정규식 기반 룰 문법 파서
//! - [`compiler`]: 줄 단위 컴파일, ID 부여, 파일 로딩 ([`RuleSet`])
//! - [`matcher`]: 할당 없는 매칭 ([`matches`], [`first_match`])
//! - [`store`]: 활성 집합의 원자적 교체 ([`RuleStore`], [`ReloadHandle`])
//! - [`types`]: 룰 데이터 구조
//! - [`error`]: 도메인 에러 타입
//!
//! # 룰 예시
//!
//! ```text
//! 1: TCP 10.0.0.1:80 -> any:any (*)
//! UDP any:[1000-2000] <> !192.168.1.1:53 *
//! ```

pub mod compiler;
pub mod error;
pub mod matcher;
pub mod parser;
pub mod store;
pub mod types;

// --- 주요 타입 re-export ---

pub use compiler::{MAX_RULE_FILE_SIZE, MAX_RULE_ID, MAX_RULES_COUNT, RuleSet, compile, compile_file};
pub use error::RuleError;
pub use matcher::{first_match, matches};
pub use parser::{ParsedRule, RuleParser};
pub use store::{ReloadHandle, RuleStore};
pub use types::{
    Direction, IpSpec, PayloadSpec, PortMatch, PortSpec, ProtocolSpec, Rule, render_rule,
};
