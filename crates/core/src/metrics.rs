//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 크레이트는 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `sigwatch_`
//! - 컴포넌트명: `sniffer_`, `rules_`, `funnel_`
//! - 접미어: `_total` (counter), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! metrics::counter!(sigwatch_core::metrics::SNIFFER_FRAMES_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 프로토콜 레이블 키 (TCP, UDP, ICMP, IP)
pub const LABEL_PROTOCOL: &str = "protocol";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

// ─── Sniffer 메트릭 ────────────────────────────────────────────────

/// Sniffer: 캡처된 전체 프레임 수 (counter)
pub const SNIFFER_FRAMES_TOTAL: &str = "sigwatch_sniffer_frames_total";

/// Sniffer: 재전송으로 판정되어 드롭된 TCP 프레임 수 (counter)
pub const SNIFFER_DUPLICATES_DROPPED_TOTAL: &str = "sigwatch_sniffer_duplicates_dropped_total";

/// Sniffer: 시그니처 추출 실패 수 (counter)
pub const SNIFFER_EXTRACTION_ERRORS_TOTAL: &str = "sigwatch_sniffer_extraction_errors_total";

/// Sniffer: 룰에 매칭된 프레임 수 (counter, label: protocol)
pub const SNIFFER_RULE_MATCHES_TOTAL: &str = "sigwatch_sniffer_rule_matches_total";

/// Sniffer: 펀널 대기 집합으로 보낸 프레임 수 (counter)
pub const SNIFFER_FRAMES_FUNNELED_TOTAL: &str = "sigwatch_sniffer_frames_funneled_total";

/// Sniffer: 중복 제거 테이블 크기 (gauge)
pub const SNIFFER_DEDUP_TABLE_SIZE: &str = "sigwatch_sniffer_dedup_table_size";

/// Sniffer: 테이블이 가득 차 윈도우 만료 전에 내보낸 키 수 (counter)
pub const SNIFFER_DEDUP_EVICTIONS_TOTAL: &str = "sigwatch_sniffer_dedup_evictions_total";

// ─── Rules 메트릭 ──────────────────────────────────────────────────

/// Rules: 활성 룰 수 (gauge)
pub const RULES_LOADED: &str = "sigwatch_rules_loaded";

/// Rules: 리로드 시도 수 (counter, label: result)
pub const RULES_RELOADS_TOTAL: &str = "sigwatch_rules_reloads_total";

/// Rules: 파싱 실패한 룰 라인 수 (counter)
pub const RULES_PARSE_ERRORS_TOTAL: &str = "sigwatch_rules_parse_errors_total";

// ─── Funnel 메트릭 ─────────────────────────────────────────────────

/// Funnel: 큐로 라우팅된 프레임 수 (counter)
pub const FUNNEL_FRAMES_ROUTED_TOTAL: &str = "sigwatch_funnel_frames_routed_total";

/// Funnel: 협력자 호출 결과 수 (counter, label: result)
pub const FUNNEL_FRAMES_PROCESSED_TOTAL: &str = "sigwatch_funnel_frames_processed_total";

/// Funnel: 대기 집합 크기 (gauge)
pub const FUNNEL_PENDING_SIZE: &str = "sigwatch_funnel_pending_size";

// ─── Daemon 메트릭 ─────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "sigwatch_daemon_uptime_seconds";

/// 모든 메트릭의 설명을 등록합니다.
///
/// 레코더 설치 직후 한 번 호출합니다. 레코더가 없어도 패닉하지 않습니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    // Sniffer
    describe_counter!(
        SNIFFER_FRAMES_TOTAL,
        "Total number of frames read from the capture interface"
    );
    describe_counter!(
        SNIFFER_DUPLICATES_DROPPED_TOTAL,
        "TCP frames dropped as retransmissions by the deduplicator"
    );
    describe_counter!(
        SNIFFER_EXTRACTION_ERRORS_TOTAL,
        "Frames skipped because a signature could not be extracted"
    );
    describe_counter!(
        SNIFFER_RULE_MATCHES_TOTAL,
        "Frames that matched a signature rule (label: protocol)"
    );
    describe_counter!(
        SNIFFER_FRAMES_FUNNELED_TOTAL,
        "Unmatched frames from tracked sources handed to the funnel"
    );
    describe_gauge!(
        SNIFFER_DEDUP_TABLE_SIZE,
        "Number of TCP flow keys currently tracked for deduplication"
    );
    describe_counter!(
        SNIFFER_DEDUP_EVICTIONS_TOTAL,
        "Flow keys evicted oldest-first because the dedup table was full"
    );

    // Rules
    describe_gauge!(RULES_LOADED, "Number of rules in the active rule set");
    describe_counter!(
        RULES_RELOADS_TOTAL,
        "Rule set reload attempts (label: result)"
    );
    describe_counter!(
        RULES_PARSE_ERRORS_TOTAL,
        "Rule lines rejected by the grammar"
    );

    // Funnel
    describe_counter!(
        FUNNEL_FRAMES_ROUTED_TOTAL,
        "Frames moved from the pending set into the worker queue"
    );
    describe_counter!(
        FUNNEL_FRAMES_PROCESSED_TOTAL,
        "Frames handed to the anomaly collaborator (label: result)"
    );
    describe_gauge!(
        FUNNEL_PENDING_SIZE,
        "Frames waiting in the pending set at the last drain"
    );

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "Daemon uptime in seconds");
}
