//! 이상 탐지 협력자
//!
//! 펀널 워커는 대기 집합에서 꺼낸 프레임마다 [`AnomalyCollaborator::handle`]을
//! 한 번씩 호출합니다. 협력자가 공격으로 판정한 프레임은 [`RuleLearner`]를 통해
//! 정확 일치 룰로 룰 파일에 추가할 수 있습니다. `RuleLearner`를 협력자로 직접
//! 쓰면 펀널로 들어온 프레임 전부를 공격으로 보고 학습합니다.

use std::future::Future;

use sigwatch_core::types::RawFrame;
use sigwatch_rules::{ReloadHandle, Rule, first_match};
use sigwatch_sniffer::extract;

use crate::error::CollaboratorError;

/// 이상 탐지 협력자
///
/// 구현체는 여러 워커에서 동시에 호출되므로 `Send + Sync`여야 합니다.
/// 반환한 에러와 호출 중 발생한 패닉은 워커가 포착합니다.
pub trait AnomalyCollaborator: Send + Sync + 'static {
    /// 협력자 이름 (로그용)
    fn name(&self) -> &str;

    /// 프레임 하나를 처리합니다.
    fn handle(&self, frame: RawFrame)
    -> impl Future<Output = Result<(), CollaboratorError>> + Send;
}

/// 프레임 메타데이터를 로그로 남기는 기본 협력자
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingCollaborator;

impl AnomalyCollaborator for LoggingCollaborator {
    fn name(&self) -> &str {
        "logging"
    }

    async fn handle(&self, frame: RawFrame) -> Result<(), CollaboratorError> {
        match extract(&frame.data) {
            Ok(sig) => tracing::info!(
                signature = %sig,
                len = frame.len(),
                captured_at = ?frame.captured_at,
                "funneled frame"
            ),
            Err(e) => tracing::info!(
                error = %e,
                len = frame.len(),
                "funneled frame without signature"
            ),
        }
        Ok(())
    }
}

/// 공격 판정 프레임으로부터 룰을 생성해 룰 파일에 추가합니다.
#[derive(Debug, Clone)]
pub struct RuleLearner {
    handle: ReloadHandle,
}

impl RuleLearner {
    /// 리로드 핸들로 생성합니다.
    pub fn new(handle: ReloadHandle) -> Self {
        Self { handle }
    }

    /// 프레임의 시그니처에 정확히 일치하는 `->` 룰을 추가하고 반환합니다.
    ///
    /// 추가 후 룰 파일을 다시 로드하므로 이후 같은 트래픽은 알림으로 기록됩니다.
    /// 이미 활성 룰에 매칭되는 시그니처면 파일을 건드리지 않고 그 룰을 반환합니다.
    pub async fn learn(&self, frame: &RawFrame) -> Result<Rule, CollaboratorError> {
        let sig = extract(&frame.data).map_err(|e| CollaboratorError::Rejected {
            reason: e.to_string(),
        })?;
        // 학습 전에 대기 집합에 쌓인 같은 흐름의 프레임
        if let Some(existing) = first_match(&sig, &self.handle.snapshot()) {
            tracing::debug!(rule_id = %existing.id, "frame already covered by a rule");
            return Ok(existing.clone());
        }
        let rule = self
            .handle
            .add_rule_for(&sig)
            .await
            .map_err(|e| CollaboratorError::Failed(e.to_string()))?;

        tracing::info!(
            rule_id = %rule.id,
            rule = %rule,
            path = %self.handle.path().display(),
            "learned rule from flagged frame"
        );
        Ok(rule)
    }
}

impl AnomalyCollaborator for RuleLearner {
    fn name(&self) -> &str {
        "rule-learner"
    }

    async fn handle(&self, frame: RawFrame) -> Result<(), CollaboratorError> {
        self.learn(&frame).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    use sigwatch_core::types::{PacketProtocol, PacketSignature};
    use sigwatch_rules::{RuleStore, first_match};
    use sigwatch_sniffer::extractor::synth::{non_ipv4_frame, udp_frame};

    #[tokio::test]
    async fn logging_collaborator_accepts_any_frame() {
        let collab = LoggingCollaborator;
        assert_eq!(collab.name(), "logging");
        collab
            .handle(RawFrame::new(non_ipv4_frame(0x0806)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn learner_appends_exact_rule_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("learned.rules");
        std::fs::write(&path, "1: TCP any:any -> any:23 (*)\n").unwrap();

        let store = Arc::new(RuleStore::open(&path).await.unwrap());
        let learner = RuleLearner::new(ReloadHandle::new(Arc::clone(&store), &path));

        let src = Ipv4Addr::new(192, 168, 2, 12);
        let dst = Ipv4Addr::new(10, 0, 0, 1);
        let frame = RawFrame::new(udp_frame((src, 4444), (dst, 5555), b"x"));

        let rule = learner.learn(&frame).await.unwrap();
        assert_eq!(rule.id, "2");

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.ends_with("2: UDP 192.168.2.12:4444 -> 10.0.0.1:5555 (*)\n"));

        let sig = PacketSignature::new(PacketProtocol::Udp, (src, 4444), (dst, 5555));
        let snapshot = store.snapshot();
        assert_eq!(first_match(&sig, &snapshot).map(|r| r.id.as_str()), Some("2"));
    }

    #[tokio::test]
    async fn learner_as_collaborator_learns_each_flow_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("learned.rules");
        std::fs::write(&path, "1: TCP any:any -> any:23 (*)\n").unwrap();

        let store = Arc::new(RuleStore::open(&path).await.unwrap());
        let learner = RuleLearner::new(ReloadHandle::new(Arc::clone(&store), &path));
        assert_eq!(learner.name(), "rule-learner");

        let src = Ipv4Addr::new(192, 168, 2, 12);
        let dst = Ipv4Addr::new(10, 0, 0, 1);
        for _ in 0..3 {
            learner
                .handle(RawFrame::new(udp_frame((src, 4444), (dst, 5555), b"x")))
                .await
                .unwrap();
        }

        assert_eq!(store.snapshot().len(), 2);
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("UDP 192.168.2.12:4444").count(), 1);
    }

    #[tokio::test]
    async fn learner_rejects_unparsable_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("learned.rules");
        std::fs::write(&path, "").unwrap();

        let store = Arc::new(RuleStore::open(&path).await.unwrap());
        let learner = RuleLearner::new(ReloadHandle::new(store, &path));

        let err = learner
            .learn(&RawFrame::new(non_ipv4_frame(0x86dd)))
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Rejected { .. }));
    }
}
