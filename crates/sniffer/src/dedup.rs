//! TCP 재전송 중복 제거
//!
//! [`FlowKey`]별 최초 관측 시각을 기록하고, 윈도우 안에서 같은 키가
//! 다시 보이면 중복으로 판정합니다.
//! 키는 기록 순서대로 큐에 쌓이므로 만료된 키는 항상 큐 앞쪽에 있습니다.
//! 기록할 때마다 앞쪽의 만료된 키를 정리하고, 그래도 `max_entries`를 넘으면
//! 가장 오래된 키부터 내보냅니다.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use sigwatch_core::metrics as m;

use crate::extractor::FlowKey;

/// 재전송 중복 판정기
///
/// 스니퍼 스레드 하나가 소유하므로 내부 잠금이 없습니다.
#[derive(Debug)]
pub struct Deduplicator {
    seen: HashMap<FlowKey, Instant>,
    /// 기록 순서. 만료 후 다시 기록된 키의 이전 항목이 남아 있을 수 있음
    order: VecDeque<(FlowKey, Instant)>,
    window: Duration,
    max_entries: usize,
}

impl Deduplicator {
    /// 새 판정기를 생성합니다.
    pub fn new(window: Duration, max_entries: usize) -> Self {
        Self {
            seen: HashMap::new(),
            order: VecDeque::new(),
            window,
            max_entries,
        }
    }

    /// 키가 윈도우 안에서 이미 관측되었는지 확인하고, 아니면 기록합니다.
    pub fn is_duplicate(&mut self, key: FlowKey) -> bool {
        self.check_at(key, Instant::now())
    }

    /// 지정한 시각 기준으로 판정합니다.
    pub fn check_at(&mut self, key: FlowKey, now: Instant) -> bool {
        let window = self.window;
        if self
            .seen
            .get(&key)
            .is_some_and(|first_seen| now.saturating_duration_since(*first_seen) < window)
        {
            return true;
        }

        self.seen.insert(key, now);
        self.order.push_back((key, now));
        self.enforce_limits(now);
        false
    }

    /// 현재 추적 중인 키 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// 비어있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn enforce_limits(&mut self, now: Instant) {
        let mut evicted_fresh = 0usize;
        while let Some(&(key, recorded)) = self.order.front() {
            let expired = now.saturating_duration_since(recorded) >= self.window;
            if !expired && self.seen.len() <= self.max_entries {
                break;
            }
            self.order.pop_front();
            // 이후에 다시 기록된 키라면 지도 쪽 항목은 더 새로움
            if self.seen.get(&key) == Some(&recorded) {
                self.seen.remove(&key);
                if !expired {
                    evicted_fresh += 1;
                }
            }
        }

        if evicted_fresh > 0 {
            tracing::debug!(
                evicted = evicted_fresh,
                max = self.max_entries,
                "dedup table full, evicted oldest keys"
            );
            metrics::counter!(m::SNIFFER_DEDUP_EVICTIONS_TOTAL).increment(evicted_fresh as u64);
        }
        metrics::gauge!(m::SNIFFER_DEDUP_TABLE_SIZE).set(self.seen.len() as f64);
    }
}
