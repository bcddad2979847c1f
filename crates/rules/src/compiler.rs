//! 룰 컴파일러 -- 룰 텍스트를 [`RuleSet`]으로 변환합니다.
//!
//! 줄 단위 파싱 실패는 경고 로그를 남기고 건너뛰며 개수만 셉니다.
//! 반면 ID 중복은 로딩 전체를 실패시키며 부분 결과를 만들지 않습니다.

use std::collections::HashSet;
use std::path::Path;

use tracing::{info, warn};

use crate::error::RuleError;
use crate::parser::RuleParser;
use crate::types::Rule;

/// 룰 파일 최대 크기
pub const MAX_RULE_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB

/// 한 집합에 허용되는 최대 룰 수
pub const MAX_RULES_COUNT: usize = 10_000;

/// 문법이 허용하는 가장 큰 룰 ID (5자리)
pub const MAX_RULE_ID: u32 = 99_999;

/// 컴파일된 룰 집합
///
/// 입력 줄 순서를 보존하며, 모든 ID는 유일합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<Rule>,
    load_error_count: usize,
}

impl RuleSet {
    /// 빈 룰 집합을 생성합니다.
    pub fn empty() -> Self {
        Self::default()
    }

    /// 룰 목록 (입력 순서)
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// 룰 순회
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// 룰 수
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// 비어있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 파싱에 실패해 버려진 줄 수
    pub fn load_error_count(&self) -> usize {
        self.load_error_count
    }

    /// ID로 룰을 찾습니다.
    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// 다음에 부여할 수 있는 숫자 ID를 반환합니다.
    ///
    /// 가장 큰 숫자 ID + 1이 [`MAX_RULE_ID`]를 넘으면 비어 있는 가장 작은 ID를
    /// 재사용합니다. 남은 ID가 없으면 `None`입니다.
    pub fn next_free_id(&self) -> Option<String> {
        let used: HashSet<u32> = self
            .rules
            .iter()
            .filter_map(|r| r.id.parse::<u32>().ok())
            .collect();
        let max = used.iter().copied().max().unwrap_or(0);
        if max < MAX_RULE_ID {
            return Some((max + 1).to_string());
        }
        (1..=MAX_RULE_ID)
            .find(|id| !used.contains(id))
            .map(|id| id.to_string())
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

/// 룰 텍스트 줄들을 컴파일합니다.
///
/// - 빈 줄과 `#`으로 시작하는 줄은 에러로 세지 않고 건너뜁니다.
/// - ID가 없는 룰에는 `(지금까지 컴파일된 룰 수) + 1`을 부여합니다.
///
/// # Errors
/// - 최종 ID가 이미 컴파일된 룰과 겹치면 [`RuleError::DuplicateId`]
pub fn compile<I, S>(lines: I) -> Result<RuleSet, RuleError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let parser = RuleParser::new()?;
    let mut rules: Vec<Rule> = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut load_error_count = 0;

    for (idx, line) in lines.into_iter().enumerate() {
        let line_no = idx + 1;
        let text = line.as_ref().trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }

        let parsed = match parser.parse_line(line_no, text) {
            Ok(parsed) => parsed,
            Err(e) => {
                load_error_count += 1;
                warn!(line = line_no, error = %e, "skipping invalid rule line");
                continue;
            }
        };

        let id = parsed
            .id
            .clone()
            .unwrap_or_else(|| (rules.len() + 1).to_string());
        if !seen_ids.insert(id.clone()) {
            return Err(RuleError::DuplicateId { id, line: line_no });
        }
        rules.push(parsed.into_rule(id));
    }

    Ok(RuleSet {
        rules,
        load_error_count,
    })
}

/// 룰 파일을 읽어 컴파일합니다.
///
/// # Errors
/// - 파일을 읽을 수 없거나 [`MAX_RULE_FILE_SIZE`]를 초과하면 [`RuleError::RuleLoad`]
/// - 컴파일된 룰 수가 [`MAX_RULES_COUNT`]를 초과하면 [`RuleError::RuleLoad`]
/// - ID 중복 시 [`RuleError::DuplicateId`]
pub async fn compile_file(path: impl AsRef<Path>) -> Result<RuleSet, RuleError> {
    let path = path.as_ref();
    let load_err = |reason: String| RuleError::RuleLoad {
        path: path.display().to_string(),
        reason,
    };

    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| load_err(format!("failed to read file metadata: {e}")))?;
    if metadata.len() > MAX_RULE_FILE_SIZE {
        return Err(load_err(format!(
            "file too large: {} bytes (max: {MAX_RULE_FILE_SIZE})",
            metadata.len()
        )));
    }

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| load_err(format!("failed to read file: {e}")))?;

    compile_source(path, &content)
}

/// 메모리에 있는 룰 파일 내용을 파일 로딩과 같은 제한으로 컴파일합니다.
///
/// 룰 추가 시 파일에 쓰기 전에 결과를 미리 검증하는 데 사용합니다.
pub(crate) fn compile_source(path: &Path, content: &str) -> Result<RuleSet, RuleError> {
    let load_err = |reason: String| RuleError::RuleLoad {
        path: path.display().to_string(),
        reason,
    };

    if content.len() as u64 > MAX_RULE_FILE_SIZE {
        return Err(load_err(format!(
            "file too large: {} bytes (max: {MAX_RULE_FILE_SIZE})",
            content.len()
        )));
    }

    let rule_set = compile(content.lines())?;
    if rule_set.len() > MAX_RULES_COUNT {
        return Err(load_err(format!(
            "too many rules: {} (max {MAX_RULES_COUNT})",
            rule_set.len()
        )));
    }

    info!(
        path = %path.display(),
        accepted = rule_set.len(),
        rejected = rule_set.load_error_count(),
        "compiled rule file"
    );

    Ok(rule_set)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn skips_comments_and_blank_lines() {
        let set = compile(["# header", "", "   ", "TCP any:any -> any:23 (*)"]).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.load_error_count(), 0);
    }

    #[test]
    fn counts_invalid_lines_and_continues() {
        let set = compile([
            "TCP any:any -> any:23 (*)",
            "this is not a rule",
            "TCP any:99999 -> any:any (*)",
            "UDP any:any -> any:69 (*)",
        ])
        .unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.load_error_count(), 2);
    }

    #[test]
    fn auto_ids_follow_compiled_count() {
        let set = compile([
            "TCP any:any -> any:23 (*)",
            "garbage",
            "UDP any:any -> any:69 (*)",
        ])
        .unwrap();
        let ids: Vec<&str> = set.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(set.rules()[1].message, "ruleID 2");
    }

    #[test]
    fn preserves_input_order() {
        let set = compile([
            "9: TCP any:any -> any:1 (*)",
            "3: TCP any:any -> any:2 (*)",
            "5: TCP any:any -> any:3 (*)",
        ])
        .unwrap();
        let ids: Vec<&str> = set.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["9", "3", "5"]);
    }

    #[test]
    fn duplicate_explicit_ids_fail_whole_load() {
        let err = compile([
            "1: TCP any:any -> any:23 (*)",
            "1: UDP any:any -> any:69 (*)",
        ])
        .unwrap_err();
        assert!(matches!(err, RuleError::DuplicateId { ref id, line: 2 } if id == "1"));
    }

    #[test]
    fn explicit_id_colliding_with_auto_id_fails() {
        // 첫 줄은 자동으로 "1"을 받음
        let err = compile([
            "TCP any:any -> any:23 (*)",
            "1: UDP any:any -> any:69 (*)",
        ])
        .unwrap_err();
        assert!(matches!(err, RuleError::DuplicateId { .. }));
    }

    #[test]
    fn empty_input_yields_empty_set() {
        let set = compile(Vec::<String>::new()).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn next_free_id_skips_past_max() {
        let set = compile([
            "4: TCP any:any -> any:1 (*)",
            "2: TCP any:any -> any:2 (*)",
        ])
        .unwrap();
        assert_eq!(set.next_free_id().as_deref(), Some("5"));
        assert_eq!(RuleSet::empty().next_free_id().as_deref(), Some("1"));
    }

    #[test]
    fn next_free_id_reuses_lowest_gap_past_five_digits() {
        let set = compile([
            "99999: TCP any:any -> any:1 (*)",
            "1: TCP any:any -> any:2 (*)",
            "3: TCP any:any -> any:3 (*)",
        ])
        .unwrap();
        assert_eq!(set.next_free_id().as_deref(), Some("2"));
    }

    #[test]
    fn next_free_id_none_when_every_id_is_taken() {
        let set = compile((1..=MAX_RULE_ID).map(|id| format!("{id}: TCP any:any -> any:1 (*)")))
            .unwrap();
        assert_eq!(set.next_free_id(), None);
    }

    #[test]
    fn compile_source_applies_rule_count_limit() {
        let content: String = (0..=MAX_RULES_COUNT)
            .map(|port| format!("TCP any:any -> any:{port} (*)\n"))
            .collect();
        let err = compile_source(Path::new("mem.rules"), &content).unwrap_err();
        assert!(err.to_string().contains("too many rules"));
    }

    #[tokio::test]
    async fn compile_file_reads_rules() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# test rules").unwrap();
        writeln!(file, "1: TCP 10.0.0.1:80 -> any:any (*)").unwrap();
        writeln!(file, "broken").unwrap();

        let set = compile_file(file.path()).await.unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.load_error_count(), 1);
        assert!(set.get("1").is_some());
    }

    #[tokio::test]
    async fn compile_file_missing_is_rule_load_error() {
        let err = compile_file("/nonexistent/sigwatch/rules.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, RuleError::RuleLoad { .. }));
    }

    #[tokio::test]
    async fn compile_file_rejects_too_many_rules() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for port in 0..=MAX_RULES_COUNT {
            writeln!(file, "TCP any:any -> any:{port} (*)").unwrap();
        }
        let err = compile_file(file.path()).await.unwrap_err();
        assert!(err.to_string().contains("too many rules"));
    }
}
