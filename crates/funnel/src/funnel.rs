//! 펀널 -- 대기 집합 라우터와 협력자 워커 풀
//!
//! # 내부 아키텍처
//! ```text
//! Sniffer ──push──> PendingSet ──(poll_interval마다 drain)──> Router
//!                                                              |
//!                                              bounded mpsc (FIFO, 백프레셔)
//!                                                              |
//!                                     Worker 0..N ──> AnomalyCollaborator::handle
//! ```
//!
//! # 종료 절차
//! 1. 라우터가 대기 집합을 마지막으로 한 번 더 비워 큐에 넣습니다.
//! 2. 실제 항목 뒤에 워커 수만큼 [`FunnelItem::Shutdown`]을 넣습니다.
//! 3. 각 워커는 센티널 하나를 소비하면 종료합니다.
//!
//! 큐는 FIFO이므로 센티널 이전에 들어간 항목은 모두 정확히 한 번 처리됩니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use sigwatch_core::config::{FunnelConfig, MAX_QUEUE_CAPACITY, MAX_WORKERS};
use sigwatch_core::error::{PipelineError, SigwatchError};
use sigwatch_core::metrics as m;
use sigwatch_core::pipeline::{ComponentState, HealthStatus, Pipeline};
use sigwatch_core::types::{PendingSet, RawFrame};

use crate::collaborator::AnomalyCollaborator;
use crate::error::FunnelError;

/// 큐 항목
#[derive(Debug)]
pub enum FunnelItem {
    /// 처리할 프레임
    Frame {
        /// 추적용 ID
        id: Uuid,
        /// 원시 프레임
        frame: RawFrame,
    },
    /// 워커 종료 센티널
    Shutdown,
}

/// 펀널 카운터
#[derive(Debug, Default)]
pub struct FunnelStats {
    frames_routed: AtomicU64,
    frames_processed: AtomicU64,
    collaborator_failures: AtomicU64,
    collaborator_panics: AtomicU64,
}

/// [`FunnelStats`]의 특정 시점 사본
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FunnelStatsSnapshot {
    /// 큐로 보낸 프레임 수
    pub frames_routed: u64,
    /// 협력자가 성공적으로 처리한 프레임 수
    pub frames_processed: u64,
    /// 협력자가 에러를 반환한 수
    pub collaborator_failures: u64,
    /// 협력자 호출 중 패닉 수
    pub collaborator_panics: u64,
}

impl FunnelStatsSnapshot {
    /// 워커가 소비한 전체 프레임 수 (성공 + 실패 + 패닉)
    pub fn frames_consumed(&self) -> u64 {
        self.frames_processed + self.collaborator_failures + self.collaborator_panics
    }
}

impl FunnelStats {
    /// 현재 값을 복사합니다.
    pub fn snapshot(&self) -> FunnelStatsSnapshot {
        FunnelStatsSnapshot {
            frames_routed: self.frames_routed.load(Ordering::Relaxed),
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            collaborator_failures: self.collaborator_failures.load(Ordering::Relaxed),
            collaborator_panics: self.collaborator_panics.load(Ordering::Relaxed),
        }
    }
}

/// 대기 집합을 비워 큐에 넣습니다. 큐가 가득 차면 빈 자리가 날 때까지 기다립니다.
async fn route_pending(
    pending: &PendingSet,
    tx: &mpsc::Sender<FunnelItem>,
    stats: &FunnelStats,
) -> Result<usize, FunnelError> {
    let frames = pending.drain();
    metrics::gauge!(m::FUNNEL_PENDING_SIZE).set(frames.len() as f64);
    let count = frames.len();

    for frame in frames {
        let id = Uuid::new_v4();
        tx.send(FunnelItem::Frame { id, frame })
            .await
            .map_err(|_| FunnelError::QueueClosed)?;
        stats.frames_routed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::FUNNEL_FRAMES_ROUTED_TOTAL).increment(1);
    }

    if count > 0 {
        debug!(count, "routed pending frames");
    }
    Ok(count)
}

async fn run_router(
    pending: PendingSet,
    tx: mpsc::Sender<FunnelItem>,
    poll_interval: Duration,
    workers: usize,
    mut shutdown: watch::Receiver<bool>,
    stats: Arc<FunnelStats>,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = route_pending(&pending, &tx, &stats).await {
                    error!(error = %e, "router stopped");
                    return;
                }
            }
            _ = shutdown.changed() => break,
        }
    }

    // 마지막 드레인 후 워커 수만큼 센티널
    match route_pending(&pending, &tx, &stats).await {
        Ok(count) => info!(count, "final drain routed"),
        Err(e) => {
            error!(error = %e, "final drain failed");
            return;
        }
    }
    for _ in 0..workers {
        if tx.send(FunnelItem::Shutdown).await.is_err() {
            warn!("queue closed before all shutdown sentinels were sent");
            return;
        }
    }
}

async fn run_worker<C: AnomalyCollaborator>(
    index: usize,
    rx: Arc<Mutex<mpsc::Receiver<FunnelItem>>>,
    collaborator: Arc<C>,
    stats: Arc<FunnelStats>,
) {
    debug!(worker = index, "funnel worker started");
    loop {
        let item = rx.lock().await.recv().await;
        let (id, frame) = match item {
            Some(FunnelItem::Frame { id, frame }) => (id, frame),
            Some(FunnelItem::Shutdown) | None => break,
        };

        let collab = Arc::clone(&collaborator);
        // 별도 태스크에서 호출하여 패닉을 JoinError로 포착
        let outcome = tokio::spawn(async move { collab.handle(frame).await }).await;
        match outcome {
            Ok(Ok(())) => {
                stats.frames_processed.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(m::FUNNEL_FRAMES_PROCESSED_TOTAL, m::LABEL_RESULT => "success")
                    .increment(1);
            }
            Ok(Err(e)) => {
                stats.collaborator_failures.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(m::FUNNEL_FRAMES_PROCESSED_TOTAL, m::LABEL_RESULT => "failure")
                    .increment(1);
                warn!(
                    worker = index,
                    frame_id = %id,
                    collaborator = collaborator.name(),
                    error = %e,
                    "collaborator returned error"
                );
            }
            Err(e) => {
                stats.collaborator_panics.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(m::FUNNEL_FRAMES_PROCESSED_TOTAL, m::LABEL_RESULT => "panic")
                    .increment(1);
                error!(
                    worker = index,
                    frame_id = %id,
                    collaborator = collaborator.name(),
                    error = %e,
                    "collaborator panicked"
                );
            }
        }
    }
    debug!(worker = index, "funnel worker stopped");
}

/// 펀널
///
/// core의 [`Pipeline`] trait을 구현하여 데몬에서 스니퍼와 같은 생명주기로 관리됩니다.
///
/// # 사용 예시
/// ```ignore
/// let mut funnel = FunnelBuilder::new(LoggingCollaborator)
///     .config(&config.funnel)
///     .build()?;
/// let pending = funnel.pending();  // 스니퍼에 전달
/// funnel.start().await?;
/// ```
pub struct Funnel<C: AnomalyCollaborator> {
    state: ComponentState,
    pending: PendingSet,
    collaborator: Arc<C>,
    poll_interval: Duration,
    queue_capacity: usize,
    workers: usize,
    stats: Arc<FunnelStats>,
    shutdown_tx: Option<watch::Sender<bool>>,
    router: Option<JoinHandle<()>>,
    worker_handles: Vec<JoinHandle<()>>,
}

impl<C: AnomalyCollaborator> Funnel<C> {
    /// 스니퍼와 공유할 대기 집합을 반환합니다.
    pub fn pending(&self) -> PendingSet {
        self.pending.clone()
    }

    /// 카운터를 공유하는 핸들을 반환합니다.
    pub fn stats(&self) -> Arc<FunnelStats> {
        Arc::clone(&self.stats)
    }

    /// 워커 수를 반환합니다.
    pub fn worker_count(&self) -> usize {
        self.workers
    }
}

impl<C: AnomalyCollaborator> Pipeline for Funnel<C> {
    async fn start(&mut self) -> Result<(), SigwatchError> {
        self.state = self.state.transition(ComponentState::Running)?;

        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        self.worker_handles = (0..self.workers)
            .map(|index| {
                tokio::spawn(run_worker(
                    index,
                    Arc::clone(&rx),
                    Arc::clone(&self.collaborator),
                    Arc::clone(&self.stats),
                ))
            })
            .collect();

        self.router = Some(tokio::spawn(run_router(
            self.pending.clone(),
            tx,
            self.poll_interval,
            self.workers,
            shutdown_rx,
            Arc::clone(&self.stats),
        )));
        self.shutdown_tx = Some(shutdown_tx);

        info!(
            workers = self.workers,
            queue_capacity = self.queue_capacity,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            collaborator = self.collaborator.name(),
            "funnel started"
        );
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), SigwatchError> {
        self.state = self.state.transition(ComponentState::Stopping)?;
        info!("stopping funnel");

        if let Some(tx) = self.shutdown_tx.take() {
            // 라우터가 이미 종료되었으면 수신측이 없음
            let _ = tx.send(true);
        }

        let mut join_error = None;
        if let Some(router) = self.router.take() {
            if let Err(e) = router.await {
                error!(error = %e, "funnel router task failed");
                join_error = Some(e.to_string());
            }
        }
        for handle in self.worker_handles.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "funnel worker task failed");
                join_error.get_or_insert(e.to_string());
            }
        }

        self.state = self.state.transition(ComponentState::Stopped)?;
        let stats = self.stats.snapshot();
        info!(
            routed = stats.frames_routed,
            processed = stats.frames_processed,
            failures = stats.collaborator_failures,
            panics = stats.collaborator_panics,
            "funnel stopped"
        );

        match join_error {
            Some(reason) => Err(PipelineError::Join(reason).into()),
            None => Ok(()),
        }
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            ComponentState::Running => {
                if self.router.as_ref().is_some_and(JoinHandle::is_finished) {
                    return HealthStatus::Unhealthy("funnel router exited".to_owned());
                }
                let exited = self
                    .worker_handles
                    .iter()
                    .filter(|h| h.is_finished())
                    .count();
                if exited > 0 {
                    return HealthStatus::Degraded(format!(
                        "{exited} of {} funnel workers exited",
                        self.workers
                    ));
                }
                let backlog = self.pending.len();
                if backlog > self.queue_capacity {
                    HealthStatus::Degraded(format!("pending backlog: {backlog} frames"))
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

/// 펀널 빌더
pub struct FunnelBuilder<C: AnomalyCollaborator> {
    collaborator: C,
    pending: Option<PendingSet>,
    poll_interval: Duration,
    queue_capacity: usize,
    workers: usize,
}

impl<C: AnomalyCollaborator> FunnelBuilder<C> {
    /// 협력자로 빌더를 생성합니다. 나머지는 `[funnel]` 기본값입니다.
    pub fn new(collaborator: C) -> Self {
        let defaults = FunnelConfig::default();
        Self {
            collaborator,
            pending: None,
            poll_interval: Duration::from_millis(defaults.poll_interval_ms),
            queue_capacity: defaults.queue_capacity,
            workers: defaults.workers,
        }
    }

    /// `[funnel]` 설정을 적용합니다.
    pub fn config(mut self, config: &FunnelConfig) -> Self {
        self.poll_interval = Duration::from_millis(config.poll_interval_ms);
        self.queue_capacity = config.queue_capacity;
        self.workers = config.workers;
        self
    }

    /// 외부에서 만든 대기 집합을 사용합니다.
    pub fn pending(mut self, pending: PendingSet) -> Self {
        self.pending = Some(pending);
        self
    }

    /// 드레인 주기를 지정합니다.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// 큐 용량을 지정합니다.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// 워커 수를 지정합니다.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// 펀널을 빌드합니다.
    pub fn build(self) -> Result<Funnel<C>, FunnelError> {
        let invalid = |field: &str, reason: String| FunnelError::InvalidConfig {
            field: field.to_owned(),
            reason,
        };
        if self.poll_interval.is_zero() {
            return Err(invalid("poll_interval", "must be greater than 0".to_owned()));
        }
        if self.queue_capacity == 0 || self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(invalid(
                "queue_capacity",
                format!("must be between 1 and {MAX_QUEUE_CAPACITY}"),
            ));
        }
        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(invalid(
                "workers",
                format!("must be between 1 and {MAX_WORKERS}"),
            ));
        }

        Ok(Funnel {
            state: ComponentState::Idle,
            pending: self.pending.unwrap_or_default(),
            collaborator: Arc::new(self.collaborator),
            poll_interval: self.poll_interval,
            queue_capacity: self.queue_capacity,
            workers: self.workers,
            stats: Arc::new(FunnelStats::default()),
            shutdown_tx: None,
            router: None,
            worker_handles: Vec::new(),
        })
    }
}
