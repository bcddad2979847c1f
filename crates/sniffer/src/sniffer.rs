//! 스니퍼 -- 캡처 루프를 소유하는 전용 OS 스레드
//!
//! # 프레임 처리 순서
//! ```text
//! FrameSource → inspect (IPv4 아니면 드롭) → 재전송 중복 제거 (TCP)
//!   → RuleSet 스냅샷 first_match
//!       ├─ 매칭: AlertSink::record
//!       └─ 미매칭: 추적 대상 출발지면 PendingSet에 추가, 아니면 폐기
//! ```
//!
//! 정지는 협력적입니다. 루프는 캡처 호출 사이에 `AtomicBool`을 확인하므로
//! 정지 지연은 캡처 읽기 타임아웃으로 제한됩니다.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use sigwatch_core::config::SigwatchConfig;
use sigwatch_core::error::{PipelineError, SigwatchError};
use sigwatch_core::metrics as m;
use sigwatch_core::pipeline::{ComponentState, HealthStatus, Pipeline};
use sigwatch_core::types::{PendingSet, RawFrame};
use sigwatch_rules::{RuleStore, first_match};

use crate::alert::AlertSink;
use crate::capture::{ChannelFrameSource, FrameSource};
use crate::dedup::Deduplicator;
use crate::error::{CaptureError, ExtractionError};
use crate::extractor::inspect;

/// 스니퍼 카운터
#[derive(Debug, Default)]
pub struct SnifferStats {
    frames_captured: AtomicU64,
    non_ipv4_dropped: AtomicU64,
    extraction_errors: AtomicU64,
    duplicates_dropped: AtomicU64,
    rules_matched: AtomicU64,
    frames_funneled: AtomicU64,
    alert_errors: AtomicU64,
}

/// [`SnifferStats`]의 특정 시점 사본
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnifferStatsSnapshot {
    /// 캡처된 프레임 수
    pub frames_captured: u64,
    /// IPv4가 아니어서 드롭된 프레임 수
    pub non_ipv4_dropped: u64,
    /// 헤더가 잘려 추출에 실패한 프레임 수
    pub extraction_errors: u64,
    /// 재전송으로 드롭된 프레임 수
    pub duplicates_dropped: u64,
    /// 룰에 매칭된 프레임 수
    pub rules_matched: u64,
    /// 펀널로 보낸 프레임 수
    pub frames_funneled: u64,
    /// 알림 기록 실패 수
    pub alert_errors: u64,
}

impl SnifferStats {
    /// 현재 값을 복사합니다.
    pub fn snapshot(&self) -> SnifferStatsSnapshot {
        SnifferStatsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            non_ipv4_dropped: self.non_ipv4_dropped.load(Ordering::Relaxed),
            extraction_errors: self.extraction_errors.load(Ordering::Relaxed),
            duplicates_dropped: self.duplicates_dropped.load(Ordering::Relaxed),
            rules_matched: self.rules_matched.load(Ordering::Relaxed),
            frames_funneled: self.frames_funneled.load(Ordering::Relaxed),
            alert_errors: self.alert_errors.load(Ordering::Relaxed),
        }
    }
}

/// 한 프레임의 처리 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// IPv4가 아님
    NotIpv4,
    /// 헤더 파싱 실패
    Malformed,
    /// TCP 재전송
    Duplicate,
    /// 룰 매칭, 알림 기록 (룰 ID)
    Alerted(String),
    /// 미매칭, 펀널 대기 집합에 추가
    Funneled,
    /// 미매칭, 폐기
    Discarded,
}

/// 펀널 연결: 대기 집합과 추적 대상 출발지
#[derive(Debug, Clone)]
struct FunnelTap {
    pending: PendingSet,
    tracked: HashSet<Ipv4Addr>,
}

/// 스니퍼 스레드가 소유하는 처리 상태
struct FrameProcessor {
    rules: Arc<RuleStore>,
    alerts: Arc<AlertSink>,
    dedup: Deduplicator,
    funnel: Option<FunnelTap>,
    stats: Arc<SnifferStats>,
}

impl FrameProcessor {
    fn process(&mut self, frame: RawFrame) -> FrameOutcome {
        self.stats.frames_captured.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::SNIFFER_FRAMES_TOTAL).increment(1);

        let info = match inspect(&frame.data) {
            Ok(info) => info,
            Err(ExtractionError::NotIpv4 { ethertype }) => {
                tracing::trace!(ethertype, "non-IPv4 frame dropped");
                self.stats.non_ipv4_dropped.fetch_add(1, Ordering::Relaxed);
                return FrameOutcome::NotIpv4;
            }
            Err(e) => {
                tracing::debug!(error = %e, len = frame.len(), "frame extraction failed");
                self.stats.extraction_errors.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(m::SNIFFER_EXTRACTION_ERRORS_TOTAL).increment(1);
                return FrameOutcome::Malformed;
            }
        };

        if let Some(key) = info.flow_key() {
            if self.dedup.is_duplicate(key) {
                self.stats.duplicates_dropped.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(m::SNIFFER_DUPLICATES_DROPPED_TOTAL).increment(1);
                return FrameOutcome::Duplicate;
            }
        }

        let sig = info.signature;
        let rules = self.rules.snapshot();
        if let Some(rule) = first_match(&sig, &rules) {
            self.stats.rules_matched.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(
                m::SNIFFER_RULE_MATCHES_TOTAL,
                m::LABEL_PROTOCOL => sig.protocol.to_string()
            )
            .increment(1);

            if let Err(e) = self.alerts.record(rule, info.summary()) {
                self.stats.alert_errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!(error = %e, rule_id = %rule.id, "failed to record alert");
            } else {
                tracing::debug!(rule_id = %rule.id, signature = %sig, "rule matched");
            }
            return FrameOutcome::Alerted(rule.id.clone());
        }

        match &self.funnel {
            Some(tap) if tap.tracked.contains(&sig.src_ip) => {
                tap.pending.push(frame);
                self.stats.frames_funneled.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(m::SNIFFER_FRAMES_FUNNELED_TOTAL).increment(1);
                FrameOutcome::Funneled
            }
            _ => FrameOutcome::Discarded,
        }
    }
}

/// 캡처 루프
fn run_capture_loop(
    mut source: Box<dyn FrameSource>,
    mut processor: FrameProcessor,
    stop: Arc<AtomicBool>,
) -> Result<(), CaptureError> {
    tracing::info!("capture loop started");
    while !stop.load(Ordering::Acquire) {
        match source.next_frame() {
            Ok(Some(frame)) => {
                processor.process(frame);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, "capture failed, stopping capture loop");
                return Err(e);
            }
        }
    }
    tracing::info!("capture loop stopped");
    Ok(())
}

/// 스니퍼
///
/// # 사용 예시
/// ```ignore
/// let mut sniffer = SnifferBuilder::new()
///     .config(&config)
///     .rule_store(store)
///     .alert_sink(sink)
///     .funnel(pending, tracked)
///     .build()?;
/// sniffer.start().await?;
/// ```
pub struct Sniffer {
    state: ComponentState,
    interface: String,
    read_timeout: Duration,
    /// `FrameSource`는 `Send`만 보장하므로 `Sync`를 위해 뮤텍스로 감쌈
    source: Mutex<Option<Box<dyn FrameSource>>>,
    processor: Option<FrameProcessor>,
    stats: Arc<SnifferStats>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<(), CaptureError>>>,
}

impl Sniffer {
    /// 카운터를 공유하는 핸들을 반환합니다.
    pub fn stats(&self) -> Arc<SnifferStats> {
        Arc::clone(&self.stats)
    }

    /// 캡처 인터페이스 이름을 반환합니다.
    pub fn interface(&self) -> &str {
        &self.interface
    }
}

impl Pipeline for Sniffer {
    async fn start(&mut self) -> Result<(), SigwatchError> {
        let next = self.state.transition(ComponentState::Running)?;

        let preset = self
            .source
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let source = match preset {
            Some(source) => source,
            None => Box::new(ChannelFrameSource::open(
                &self.interface,
                self.read_timeout,
            )?),
        };
        let processor = self.processor.take().ok_or_else(|| {
            PipelineError::InitFailed("sniffer processor already consumed".to_owned())
        })?;

        let stop = Arc::clone(&self.stop);
        let handle = std::thread::Builder::new()
            .name("sigwatch-sniffer".to_owned())
            .spawn(move || run_capture_loop(source, processor, stop))
            .map_err(|e| PipelineError::InitFailed(format!("failed to spawn sniffer thread: {e}")))?;

        self.handle = Some(handle);
        self.state = next;
        tracing::info!(interface = %self.interface, "sniffer started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), SigwatchError> {
        self.state = self.state.transition(ComponentState::Stopping)?;
        tracing::info!("stopping sniffer");
        self.stop.store(true, Ordering::Release);

        if let Some(handle) = self.handle.take() {
            let joined = tokio::task::spawn_blocking(move || handle.join())
                .await
                .map_err(|e| PipelineError::Join(e.to_string()))?;
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "capture loop had exited with error"),
                Err(_) => tracing::error!("sniffer thread panicked"),
            }
        }

        self.state = self.state.transition(ComponentState::Stopped)?;
        let stats = self.stats.snapshot();
        tracing::info!(
            frames = stats.frames_captured,
            matched = stats.rules_matched,
            duplicates = stats.duplicates_dropped,
            funneled = stats.frames_funneled,
            "sniffer stopped"
        );
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            ComponentState::Running => {
                if self.handle.as_ref().is_some_and(JoinHandle::is_finished) {
                    return HealthStatus::Unhealthy("capture loop exited".to_owned());
                }
                let alert_errors = self.stats.alert_errors.load(Ordering::Relaxed);
                if alert_errors > 0 {
                    HealthStatus::Degraded(format!("alert write failures: {alert_errors}"))
                } else {
                    HealthStatus::Healthy
                }
            }
            ComponentState::Idle => HealthStatus::Unhealthy("not started".to_owned()),
            ComponentState::Stopping => HealthStatus::Degraded("stopping".to_owned()),
            ComponentState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }

    fn state(&self) -> ComponentState {
        self.state
    }
}

/// 스니퍼 빌더
pub struct SnifferBuilder {
    interface: String,
    read_timeout: Duration,
    dedup_window: Duration,
    dedup_max_entries: usize,
    rule_store: Option<Arc<RuleStore>>,
    alert_sink: Option<Arc<AlertSink>>,
    source: Option<Box<dyn FrameSource>>,
    funnel: Option<FunnelTap>,
}

impl SnifferBuilder {
    /// 기본값으로 빌더를 생성합니다.
    pub fn new() -> Self {
        let defaults = SigwatchConfig::default();
        Self {
            interface: defaults.sniffer.interface,
            read_timeout: Duration::from_millis(defaults.sniffer.read_timeout_ms),
            dedup_window: Duration::from_secs(defaults.dedup.window_secs),
            dedup_max_entries: defaults.dedup.max_entries,
            rule_store: None,
            alert_sink: None,
            source: None,
            funnel: None,
        }
    }

    /// 설정의 `[sniffer]`, `[dedup]` 섹션을 적용합니다.
    pub fn config(mut self, config: &SigwatchConfig) -> Self {
        self.interface = config.sniffer.interface.clone();
        self.read_timeout = Duration::from_millis(config.sniffer.read_timeout_ms);
        self.dedup_window = Duration::from_secs(config.dedup.window_secs);
        self.dedup_max_entries = config.dedup.max_entries;
        self
    }

    /// 캡처 인터페이스를 지정합니다.
    pub fn interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = interface.into();
        self
    }

    /// 중복 제거 윈도우와 테이블 상한을 지정합니다.
    pub fn dedup(mut self, window: Duration, max_entries: usize) -> Self {
        self.dedup_window = window;
        self.dedup_max_entries = max_entries;
        self
    }

    /// 룰 저장소를 지정합니다 (필수).
    pub fn rule_store(mut self, store: Arc<RuleStore>) -> Self {
        self.rule_store = Some(store);
        self
    }

    /// 알림 기록기를 지정합니다 (필수).
    pub fn alert_sink(mut self, sink: Arc<AlertSink>) -> Self {
        self.alert_sink = Some(sink);
        self
    }

    /// 프레임 소스를 지정합니다.
    ///
    /// 지정하지 않으면 `start()` 시점에 인터페이스에서 라이브 채널을 엽니다.
    pub fn frame_source(mut self, source: Box<dyn FrameSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// 미매칭 프레임을 펀널로 보냅니다.
    pub fn funnel(mut self, pending: PendingSet, tracked: impl IntoIterator<Item = Ipv4Addr>) -> Self {
        self.funnel = Some(FunnelTap {
            pending,
            tracked: tracked.into_iter().collect(),
        });
        self
    }

    /// 스니퍼를 빌드합니다.
    pub fn build(self) -> Result<Sniffer, SigwatchError> {
        let rules = self
            .rule_store
            .ok_or_else(|| PipelineError::InitFailed("rule store is required".to_owned()))?;
        let alerts = self
            .alert_sink
            .ok_or_else(|| PipelineError::InitFailed("alert sink is required".to_owned()))?;

        if self.interface.is_empty() {
            return Err(PipelineError::InitFailed("interface must not be empty".to_owned()).into());
        }
        if self.read_timeout.is_zero() {
            return Err(PipelineError::InitFailed("read timeout must be greater than 0".to_owned()).into());
        }
        if self.dedup_window.is_zero() || self.dedup_max_entries == 0 {
            return Err(PipelineError::InitFailed(
                "dedup window and max entries must be greater than 0".to_owned(),
            )
            .into());
        }

        let stats = Arc::new(SnifferStats::default());
        let processor = FrameProcessor {
            rules,
            alerts,
            dedup: Deduplicator::new(self.dedup_window, self.dedup_max_entries),
            funnel: self.funnel,
            stats: Arc::clone(&stats),
        };

        Ok(Sniffer {
            state: ComponentState::Idle,
            interface: self.interface,
            read_timeout: self.read_timeout,
            source: Mutex::new(self.source),
            processor: Some(processor),
            stats,
            stop: Arc::new(AtomicBool::new(false)),
            handle: None,
        })
    }
}

impl Default for SnifferBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ReplayFrameSource;
    use crate::extractor::synth::*;
    use sigwatch_rules::compile;

    const ATTACKER: Ipv4Addr = Ipv4Addr::new(192, 168, 2, 12);
    const HOST: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);

    struct Fixture {
        processor: FrameProcessor,
        pending: PendingSet,
        _dir: tempfile::TempDir,
        alert_path: std::path::PathBuf,
    }

    fn fixture(rules: &[&str]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let alert_path = dir.path().join("alerts.log");
        let set = compile(rules.iter().copied()).unwrap();
        let pending = PendingSet::new();
        let processor = FrameProcessor {
            rules: Arc::new(RuleStore::new(set)),
            alerts: Arc::new(AlertSink::open(&alert_path).unwrap()),
            dedup: Deduplicator::new(Duration::from_secs(60), 1024),
            funnel: Some(FunnelTap {
                pending: pending.clone(),
                tracked: [ATTACKER].into_iter().collect(),
            }),
            stats: Arc::new(SnifferStats::default()),
        };
        Fixture {
            processor,
            pending,
            _dir: dir,
            alert_path,
        }
    }

    #[test]
    fn matched_frame_is_alerted() {
        let mut fx = fixture(&["7: TCP any:any -> any:23 (*)"]);
        let frame = RawFrame::new(tcp_frame((HOST, 40000), (ATTACKER, 23), 1, 1));

        assert_eq!(fx.processor.process(frame), FrameOutcome::Alerted("7".to_owned()));
        let log = std::fs::read_to_string(&fx.alert_path).unwrap();
        assert_eq!(log, "ruleID 7 ~> Ether / IP / TCP 10.0.0.1:40000 > 192.168.2.12:23\n");
    }

    #[test]
    fn retransmission_never_reaches_matcher() {
        let mut fx = fixture(&["TCP any:any -> any:23 (*)"]);
        let bytes = tcp_frame((HOST, 40000), (ATTACKER, 23), 42, 7);

        assert!(matches!(
            fx.processor.process(RawFrame::new(bytes.clone())),
            FrameOutcome::Alerted(_)
        ));
        assert_eq!(fx.processor.process(RawFrame::new(bytes)), FrameOutcome::Duplicate);

        let stats = fx.processor.stats.snapshot();
        assert_eq!(stats.rules_matched, 1);
        assert_eq!(stats.duplicates_dropped, 1);
        let log = std::fs::read_to_string(&fx.alert_path).unwrap();
        assert_eq!(log.lines().count(), 1);
    }

    #[test]
    fn udp_is_never_deduplicated() {
        let mut fx = fixture(&["UDP any:any -> any:69 (*)"]);
        let bytes = udp_frame((HOST, 5000), (ATTACKER, 69), b"rrq");
        for _ in 0..3 {
            assert!(matches!(
                fx.processor.process(RawFrame::new(bytes.clone())),
                FrameOutcome::Alerted(_)
            ));
        }
    }

    #[test]
    fn unmatched_tracked_source_is_funneled() {
        let mut fx = fixture(&["TCP any:any -> any:23 (*)"]);
        let frame = RawFrame::new(tcp_frame((ATTACKER, 5555), (HOST, 80), 1, 1));

        assert_eq!(fx.processor.process(frame), FrameOutcome::Funneled);
        assert_eq!(fx.pending.len(), 1);
    }

    #[test]
    fn unmatched_untracked_source_is_discarded() {
        let mut fx = fixture(&["TCP any:any -> any:23 (*)"]);
        let frame = RawFrame::new(tcp_frame((HOST, 5555), (ATTACKER, 80), 1, 1));

        assert_eq!(fx.processor.process(frame), FrameOutcome::Discarded);
        assert!(fx.pending.is_empty());
    }

    #[test]
    fn non_ipv4_and_truncated_frames_are_counted() {
        let mut fx = fixture(&[]);
        assert_eq!(
            fx.processor.process(RawFrame::new(non_ipv4_frame(0x86dd))),
            FrameOutcome::NotIpv4
        );
        assert_eq!(
            fx.processor.process(RawFrame::new(vec![0u8; 20])),
            FrameOutcome::Malformed
        );

        let stats = fx.processor.stats.snapshot();
        assert_eq!(stats.frames_captured, 2);
        assert_eq!(stats.non_ipv4_dropped, 1);
        assert_eq!(stats.extraction_errors, 1);
    }

    #[test]
    fn build_requires_rule_store_and_alert_sink() {
        assert!(SnifferBuilder::new().build().is_err());
    }

    #[tokio::test]
    async fn replay_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(AlertSink::open(dir.path().join("alerts.log")).unwrap());
        let store = Arc::new(RuleStore::new(
            compile(["ICMP 192.168.2.12:any -> any:any (*)"]).unwrap(),
        ));
        let source = ReplayFrameSource::new(vec![icmp_frame(ATTACKER, HOST), icmp_frame(HOST, ATTACKER)]);

        let mut sniffer = SnifferBuilder::new()
            .rule_store(store)
            .alert_sink(sink)
            .frame_source(Box::new(source))
            .build()
            .unwrap();

        assert_eq!(sniffer.state(), ComponentState::Idle);
        assert!(sniffer.health_check().await.is_unhealthy());

        sniffer.start().await.unwrap();
        assert_eq!(sniffer.state(), ComponentState::Running);

        let stats = sniffer.stats();
        for _ in 0..200 {
            if stats.snapshot().frames_captured == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(sniffer.health_check().await.is_healthy());

        sniffer.stop().await.unwrap();
        assert_eq!(sniffer.state(), ComponentState::Stopped);
        assert_eq!(stats.snapshot().rules_matched, 1);

        // 종료 상태에서 재시작 불가
        assert!(sniffer.start().await.is_err());
    }
}
