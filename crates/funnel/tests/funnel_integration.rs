//! 스니퍼 → 대기 집합 → 펀널 → 협력자 전체 흐름 통합 테스트

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sigwatch_core::pipeline::Pipeline;
use sigwatch_core::types::RawFrame;
use sigwatch_funnel::{AnomalyCollaborator, CollaboratorError, FunnelBuilder, RuleLearner};
use sigwatch_rules::{ReloadHandle, RuleStore};
use sigwatch_sniffer::extractor::synth::{tcp_frame, udp_frame};
use sigwatch_sniffer::{AlertSink, ReplayFrameSource, SnifferBuilder, extract};

const TRACKED: Ipv4Addr = Ipv4Addr::new(192, 168, 2, 12);
const SERVER: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);

/// UDP 프레임을 공격으로 판정하고 룰을 학습하는 협력자
struct FlagUdp {
    learner: RuleLearner,
    learned: Mutex<Vec<String>>,
}

impl AnomalyCollaborator for FlagUdp {
    fn name(&self) -> &str {
        "flag-udp"
    }

    async fn handle(&self, frame: RawFrame) -> Result<(), CollaboratorError> {
        let sig = extract(&frame.data).map_err(|e| CollaboratorError::Rejected {
            reason: e.to_string(),
        })?;
        if sig.protocol == sigwatch_core::types::PacketProtocol::Udp {
            let rule = self.learner.learn(&frame).await?;
            self.learned
                .lock()
                .expect("learned lock")
                .push(rule.to_string());
        }
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn funneled_attack_becomes_rule() {
    let dir = tempfile::tempdir().expect("temp dir");
    let rule_path = dir.path().join("sigwatch.rules");
    std::fs::write(&rule_path, "1: TCP any:any -> any:23 (*)\n").expect("write rules");

    let store = Arc::new(RuleStore::open(&rule_path).await.expect("open rules"));
    let handle = ReloadHandle::new(Arc::clone(&store), &rule_path);
    let collab = Arc::new(FlagUdp {
        learner: RuleLearner::new(handle),
        learned: Mutex::new(Vec::new()),
    });

    let mut funnel = FunnelBuilder::new(SharedFlagUdp(Arc::clone(&collab)))
        .poll_interval(Duration::from_millis(10))
        .queue_capacity(8)
        .workers(2)
        .build()
        .expect("funnel");

    let sink = Arc::new(AlertSink::open(dir.path().join("alerts.log")).expect("sink"));
    let mut sniffer = SnifferBuilder::new()
        .rule_store(Arc::clone(&store))
        .alert_sink(sink)
        .frame_source(Box::new(ReplayFrameSource::new(vec![
            udp_frame((TRACKED, 4444), (SERVER, 5555), b"payload"),
            tcp_frame((TRACKED, 1111), (SERVER, 443), 1, 1),
        ])))
        .funnel(funnel.pending(), [TRACKED])
        .build()
        .expect("sniffer");

    funnel.start().await.expect("funnel start");
    sniffer.start().await.expect("sniffer start");

    let stats = funnel.stats();
    for _ in 0..400 {
        if stats.snapshot().frames_consumed() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    sniffer.stop().await.expect("sniffer stop");
    funnel.stop().await.expect("funnel stop");

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.frames_routed, 2);
    assert_eq!(snapshot.frames_processed, 2);

    let learned = collab.learned.lock().expect("learned lock").clone();
    assert_eq!(learned, vec!["2: UDP 192.168.2.12:4444 -> 10.0.0.1:5555 (*)".to_owned()]);
    assert_eq!(store.snapshot().len(), 2);
}

struct SharedFlagUdp(Arc<FlagUdp>);

impl AnomalyCollaborator for SharedFlagUdp {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn handle(&self, frame: RawFrame) -> Result<(), CollaboratorError> {
        self.0.handle(frame).await
    }
}
