//! 룰 에러 타입
//!
//! [`RuleError`]는 룰 파싱, 컴파일, 파일 로딩에서 발생하는 에러를 표현합니다.
//! `From<RuleError> for SigwatchError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use sigwatch_core::error::{DetectionError, SigwatchError};

/// 룰 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// 한 줄이 문법 또는 의미 검증에 실패함
    ///
    /// 컴파일러는 이 에러를 세기만 하고 로딩을 계속합니다.
    #[error("rule parse error at line {line}: {reason}")]
    Parse {
        /// 1부터 시작하는 줄 번호
        line: usize,
        /// 실패 사유
        reason: String,
    },

    /// 같은 ID가 두 번 등장함 (로딩 전체 실패)
    #[error("duplicate rule id '{id}' at line {line}")]
    DuplicateId {
        /// 충돌한 룰 ID
        id: String,
        /// 두 번째로 등장한 줄 번호
        line: usize,
    },

    /// 룰 파일을 읽을 수 없거나 크기/개수 제한을 초과함
    #[error("rule load error: {path}: {reason}")]
    RuleLoad {
        /// 룰 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 룰 추가에 쓸 수 있는 ID가 남지 않음
    #[error("no free rule id left (max {max})")]
    IdExhausted {
        /// 문법상 최대 ID
        max: u32,
    },

    /// 문법 정규식 컴파일 실패
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl From<RuleError> for SigwatchError {
    fn from(err: RuleError) -> Self {
        SigwatchError::Detection(DetectionError::RuleLoad(err.to_string()))
    }
}
