//! 룰 저장소 -- 활성 [`RuleSet`]을 소유하고 원자적으로 교체합니다.
//!
//! 읽기 쪽(스니퍼 스레드)은 읽기 잠금 아래에서 `Arc` 스냅샷을 복제한 뒤
//! 잠금 밖에서 매칭하므로, 한 번의 매칭 패스는 항상 이전 집합 또는
//! 새 집합 중 하나만 봅니다.
//!
//! 쓰기 쪽(리로드, 룰 추가)은 새 집합을 옆에서 완전히 컴파일한 뒤에만
//! 교체합니다. 실패 시 활성 집합은 그대로 유지됩니다. 룰 추가는 기존 내용에
//! 새 줄을 붙인 결과가 컴파일될 때만 파일에 기록합니다.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use sigwatch_core::metrics as m;
use sigwatch_core::types::PacketSignature;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::compiler::{MAX_RULE_ID, RuleSet, compile_file, compile_source};
use crate::error::RuleError;
use crate::parser::RuleParser;
use crate::types::Rule;

/// 활성 룰 집합 저장소
#[derive(Debug)]
pub struct RuleStore {
    active: RwLock<Arc<RuleSet>>,
    /// 파일 쓰기와 리로드를 직렬화
    write_lock: tokio::sync::Mutex<()>,
}

impl RuleStore {
    /// 초기 룰 집합으로 저장소를 생성합니다.
    pub fn new(initial: RuleSet) -> Self {
        metrics::gauge!(m::RULES_LOADED).set(initial.len() as f64);
        Self {
            active: RwLock::new(Arc::new(initial)),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// 파일을 컴파일하여 저장소를 생성합니다.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, RuleError> {
        let set = compile_file(path).await?;
        record_parse_errors(&set);
        Ok(Self::new(set))
    }

    /// 현재 활성 집합의 스냅샷을 반환합니다.
    pub fn snapshot(&self) -> Arc<RuleSet> {
        Arc::clone(&self.active.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// 활성 집합을 교체하고 새 집합을 반환합니다.
    pub fn swap(&self, next: RuleSet) -> Arc<RuleSet> {
        let next = Arc::new(next);
        metrics::gauge!(m::RULES_LOADED).set(next.len() as f64);
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&next);
        next
    }

    /// 룰 파일을 다시 컴파일하여 활성 집합을 교체합니다.
    ///
    /// # Errors
    /// 컴파일 실패 시 에러를 반환하며 활성 집합은 변경되지 않습니다.
    pub async fn reload(&self, path: impl AsRef<Path>) -> Result<Arc<RuleSet>, RuleError> {
        let _guard = self.write_lock.lock().await;
        self.reload_locked(path.as_ref()).await
    }

    async fn reload_locked(&self, path: &Path) -> Result<Arc<RuleSet>, RuleError> {
        match compile_file(path).await {
            Ok(set) => Ok(self.install(path, set)),
            Err(e) => {
                metrics::counter!(
                    m::RULES_RELOADS_TOTAL,
                    m::LABEL_RESULT => "failure"
                )
                .increment(1);
                warn!(
                    path = %path.display(),
                    error = %e,
                    "rule reload failed, keeping active rule set"
                );
                Err(e)
            }
        }
    }

    fn install(&self, path: &Path, set: RuleSet) -> Arc<RuleSet> {
        record_parse_errors(&set);
        let previous = self.snapshot().len();
        let next = self.swap(set);
        metrics::counter!(
            m::RULES_RELOADS_TOTAL,
            m::LABEL_RESULT => "success"
        )
        .increment(1);
        info!(
            path = %path.display(),
            previous,
            current = next.len(),
            rejected = next.load_error_count(),
            "rule set reloaded"
        );
        next
    }

    /// 룰 한 줄을 파일 끝에 추가하고 리로드합니다.
    ///
    /// 줄이 문법에 맞지 않거나 명시된 ID가 이미 활성 집합에 있으면
    /// 파일을 건드리지 않고 에러를 반환합니다. ID가 없는 줄에는
    /// [`RuleSet::next_free_id`]를 붙여 기록합니다.
    pub async fn append_rule(
        &self,
        path: impl AsRef<Path>,
        line: &str,
    ) -> Result<Arc<RuleSet>, RuleError> {
        let path = path.as_ref();
        let line = line.trim();
        let parsed = RuleParser::new()?.parse_line(1, line)?;

        let _guard = self.write_lock.lock().await;
        let active = self.snapshot();
        let (id, line) = match parsed.id {
            Some(id) if active.get(&id).is_some() => {
                return Err(RuleError::DuplicateId { id, line: 1 });
            }
            Some(id) => (id, line.to_owned()),
            // 파일 안 명시 ID와 자동 ID가 겹치지 않도록 ID를 붙여서 기록
            None => {
                let id = free_id(&active)?;
                let line = format!("{id}: {line}");
                (id, line)
            }
        };
        self.append_locked(path, &id, &line).await
    }

    /// 시그니처와 정확히 일치하는 룰을 생성해 추가하고 리로드합니다.
    ///
    /// 새 ID는 [`RuleSet::next_free_id`]로 정합니다.
    pub async fn append_signature(
        &self,
        path: impl AsRef<Path>,
        sig: &PacketSignature,
    ) -> Result<Rule, RuleError> {
        let _guard = self.write_lock.lock().await;
        let rule = Rule::from_signature(free_id(&self.snapshot())?, sig);
        self.append_locked(path.as_ref(), &rule.id, &rule.to_string())
            .await?;
        Ok(rule)
    }

    async fn append_locked(
        &self,
        path: &Path,
        id: &str,
        line: &str,
    ) -> Result<Arc<RuleSet>, RuleError> {
        let load_err = |reason: String| RuleError::RuleLoad {
            path: path.display().to_string(),
            reason,
        };

        let existing = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(load_err(format!("failed to read file: {e}"))),
        };
        // 마지막 줄에 개행이 없으면 새 룰과 한 줄로 합쳐짐
        let separator = if existing.is_empty() || existing.ends_with('\n') {
            ""
        } else {
            "\n"
        };
        let addition = format!("{separator}{line}\n");

        let candidate = compile_source(path, &format!("{existing}{addition}"))?;
        if candidate.get(id).is_none() {
            return Err(load_err(format!("appended rule '{id}' did not compile")));
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| load_err(format!("failed to open file: {e}")))?;
        let written = async {
            file.write_all(addition.as_bytes()).await?;
            file.flush().await
        }
        .await;
        if let Err(e) = written {
            // 부분 기록 되돌리기
            if let Err(rollback) = file.set_len(existing.len() as u64).await {
                warn!(
                    path = %path.display(),
                    error = %rollback,
                    "failed to roll back partial rule append"
                );
            }
            return Err(load_err(format!("failed to append rule: {e}")));
        }

        info!(path = %path.display(), rule = line, "rule appended");
        Ok(self.install(path, candidate))
    }
}

fn free_id(active: &RuleSet) -> Result<String, RuleError> {
    active
        .next_free_id()
        .ok_or(RuleError::IdExhausted { max: MAX_RULE_ID })
}

fn record_parse_errors(set: &RuleSet) {
    if set.load_error_count() > 0 {
        metrics::counter!(m::RULES_PARSE_ERRORS_TOTAL)
            .increment(set.load_error_count() as u64);
    }
}

/// 리로드 핸들
///
/// 저장소와 룰 파일 경로를 묶어, 리로드가 필요한 쪽(시그널 처리기,
/// 이상 탐지 협력자 등)에 명시적으로 전달합니다.
#[derive(Debug, Clone)]
pub struct ReloadHandle {
    store: Arc<RuleStore>,
    path: PathBuf,
}

impl ReloadHandle {
    /// 새 핸들을 생성합니다.
    pub fn new(store: Arc<RuleStore>, path: impl Into<PathBuf>) -> Self {
        Self {
            store,
            path: path.into(),
        }
    }

    /// 룰 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 현재 활성 집합의 스냅샷
    pub fn snapshot(&self) -> Arc<RuleSet> {
        self.store.snapshot()
    }

    /// 룰 파일을 다시 로드합니다.
    pub async fn reload(&self) -> Result<Arc<RuleSet>, RuleError> {
        self.store.reload(&self.path).await
    }

    /// 룰 한 줄을 추가하고 리로드합니다.
    pub async fn append_rule(&self, line: &str) -> Result<Arc<RuleSet>, RuleError> {
        self.store.append_rule(&self.path, line).await
    }

    /// 시그니처와 정확히 일치하는 룰을 생성해 추가합니다.
    pub async fn add_rule_for(&self, sig: &PacketSignature) -> Result<Rule, RuleError> {
        self.store.append_signature(&self.path, sig).await
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::net::Ipv4Addr;

    use sigwatch_core::types::PacketProtocol;

    use super::*;
    use crate::compiler::compile;
    use crate::matcher::first_match;

    fn rule_file(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file
    }

    #[tokio::test]
    async fn open_and_snapshot() {
        let file = rule_file(&["1: TCP any:any -> any:23 (*)"]);
        let store = RuleStore::open(file.path()).await.unwrap();
        assert_eq!(store.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn reload_swaps_set() {
        let file = rule_file(&["1: TCP any:any -> any:23 (*)"]);
        let store = RuleStore::open(file.path()).await.unwrap();
        let before = store.snapshot();

        std::fs::write(
            file.path(),
            "1: TCP any:any -> any:23 (*)\n2: UDP any:any -> any:69 (*)\n",
        )
        .unwrap();
        let after = store.reload(file.path()).await.unwrap();

        assert_eq!(after.len(), 2);
        assert_eq!(store.snapshot().len(), 2);
        // 이전 스냅샷은 그대로 유지
        assert_eq!(before.len(), 1);
    }

    #[tokio::test]
    async fn failed_reload_keeps_active_set() {
        let file = rule_file(&["1: TCP any:any -> any:23 (*)"]);
        let store = RuleStore::open(file.path()).await.unwrap();

        std::fs::write(
            file.path(),
            "1: TCP any:any -> any:80 (*)\n1: UDP any:any -> any:69 (*)\n",
        )
        .unwrap();
        let err = store.reload(file.path()).await.unwrap_err();

        assert!(matches!(err, RuleError::DuplicateId { .. }));
        let active = store.snapshot();
        assert_eq!(active.len(), 1);
        assert_eq!(active.rules()[0].dst_port, crate::types::PortSpec::Exact(23));
    }

    #[tokio::test]
    async fn reload_of_missing_file_keeps_active_set() {
        let store = RuleStore::new(compile(["TCP any:any -> any:23 (*)"]).unwrap());
        assert!(store.reload("/nonexistent/rules").await.is_err());
        assert_eq!(store.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn append_rule_rejects_invalid_line_without_touching_file() {
        let file = rule_file(&["1: TCP any:any -> any:23 (*)"]);
        let store = RuleStore::open(file.path()).await.unwrap();
        let before = std::fs::read_to_string(file.path()).unwrap();

        let err = store.append_rule(file.path(), "not a rule").await.unwrap_err();
        assert!(matches!(err, RuleError::Parse { .. }));
        assert_eq!(std::fs::read_to_string(file.path()).unwrap(), before);
    }

    #[tokio::test]
    async fn append_rule_rejects_existing_id() {
        let file = rule_file(&["1: TCP any:any -> any:23 (*)"]);
        let store = RuleStore::open(file.path()).await.unwrap();

        let err = store
            .append_rule(file.path(), "1: UDP any:any -> any:69 (*)")
            .await
            .unwrap_err();
        assert!(matches!(err, RuleError::DuplicateId { .. }));
        assert_eq!(store.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn append_rule_without_id_gets_auto_id() {
        let file = rule_file(&["TCP any:any -> any:23 (*)"]);
        let store = RuleStore::open(file.path()).await.unwrap();

        let set = store
            .append_rule(file.path(), "UDP any:any -> any:69 (*)")
            .await
            .unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.get("2").is_some());
    }

    #[tokio::test]
    async fn reload_handle_adds_rule_for_signature() {
        let file = rule_file(&["1: TCP any:any -> any:23 (*)"]);
        let store = Arc::new(RuleStore::open(file.path()).await.unwrap());
        let handle = ReloadHandle::new(Arc::clone(&store), file.path());

        let sig = PacketSignature::new(
            PacketProtocol::Udp,
            (Ipv4Addr::new(192, 168, 2, 12), 5353),
            (Ipv4Addr::new(10, 0, 0, 1), 53),
        );
        assert!(first_match(&sig, &store.snapshot()).is_none());

        let rule = handle.add_rule_for(&sig).await.unwrap();
        assert_eq!(rule.id, "2");

        let active = store.snapshot();
        assert_eq!(active.len(), 2);
        assert_eq!(first_match(&sig, &active).map(|r| r.id.as_str()), Some("2"));

        let content = std::fs::read_to_string(file.path()).unwrap();
        assert!(content.ends_with("2: UDP 192.168.2.12:5353 -> 10.0.0.1:53 (*)\n"));
    }

    fn udp_sig() -> PacketSignature {
        PacketSignature::new(
            PacketProtocol::Udp,
            (Ipv4Addr::new(1, 1, 1, 1), 5),
            (Ipv4Addr::new(2, 2, 2, 2), 6),
        )
    }

    #[tokio::test]
    async fn append_after_last_line_without_newline_keeps_both_rules() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "1: TCP any:any -> any:23 (*)").unwrap();
        let store = RuleStore::open(file.path()).await.unwrap();

        let rule = store.append_signature(file.path(), &udp_sig()).await.unwrap();
        assert_eq!(rule.id, "2");

        let active = store.snapshot();
        assert_eq!(active.len(), 2);
        assert_eq!(active.load_error_count(), 0);
        assert_eq!(
            std::fs::read_to_string(file.path()).unwrap(),
            "1: TCP any:any -> any:23 (*)\n2: UDP 1.1.1.1:5 -> 2.2.2.2:6 (*)\n"
        );
    }

    #[tokio::test]
    async fn append_past_five_digit_id_reuses_free_id() {
        let file = rule_file(&["99999: TCP any:any -> any:23 (*)"]);
        let store = Arc::new(RuleStore::open(file.path()).await.unwrap());
        let handle = ReloadHandle::new(Arc::clone(&store), file.path());

        let rule = handle.add_rule_for(&udp_sig()).await.unwrap();
        assert_eq!(rule.id, "1");

        let active = store.snapshot();
        assert_eq!(active.len(), 2);
        assert_eq!(active.load_error_count(), 0);
        assert_eq!(first_match(&udp_sig(), &active).map(|r| r.id.as_str()), Some("1"));
    }

    #[tokio::test]
    async fn append_that_would_break_the_file_leaves_it_untouched() {
        let file = rule_file(&["1: TCP any:any -> any:23 (*)"]);
        let store = RuleStore::open(file.path()).await.unwrap();

        // 디스크 상의 파일이 활성 집합 이후에 깨진 경우
        std::fs::write(
            file.path(),
            "1: TCP any:any -> any:23 (*)\n5: TCP any:any -> any:24 (*)\n5: TCP any:any -> any:25 (*)\n",
        )
        .unwrap();
        let before = std::fs::read_to_string(file.path()).unwrap();

        let err = store
            .append_rule(file.path(), "UDP any:any -> any:69 (*)")
            .await
            .unwrap_err();
        assert!(matches!(err, RuleError::DuplicateId { .. }));
        assert_eq!(std::fs::read_to_string(file.path()).unwrap(), before);
        assert_eq!(store.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn append_over_rule_count_limit_leaves_file_untouched() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let content: String = (1..=crate::compiler::MAX_RULES_COUNT)
            .map(|port| format!("TCP any:any -> any:{port} (*)\n"))
            .collect();
        std::fs::write(file.path(), &content).unwrap();
        let store = RuleStore::open(file.path()).await.unwrap();

        let err = store.append_signature(file.path(), &udp_sig()).await.unwrap_err();
        assert!(err.to_string().contains("too many rules"));
        assert_eq!(std::fs::read_to_string(file.path()).unwrap(), content);
        assert!(store.reload(file.path()).await.is_ok());
    }

    #[test]
    fn concurrent_readers_see_whole_sets() {
        let store = Arc::new(RuleStore::new(
            compile(["TCP any:any -> any:1 (*)"]).unwrap(),
        ));
        let big = compile((1..=50).map(|p| format!("TCP any:any -> any:{p} (*)"))).unwrap();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        let len = store.snapshot().len();
                        assert!(len == 1 || len == 50, "torn set observed: {len}");
                    }
                })
            })
            .collect();

        for _ in 0..100 {
            store.swap(big.clone());
            store.swap(compile(["TCP any:any -> any:1 (*)"]).unwrap());
        }

        for reader in readers {
            reader.join().unwrap();
        }
    }
}
