//! Bounded FIFO ledger of expected-but-unconfirmed filament movement.
//!
//! Telemetry deltas enter as chunks; sensor pulses drain them oldest first.
//! The cached outstanding total always equals the sum of the remaining chunk
//! amounts and never goes negative.

use std::collections::VecDeque;

use flowguard_traits::Millis;

use crate::util::elapsed_ms;

/// Maximum number of chunks held; the oldest is evicted when full.
pub const FLOW_QUEUE_CAPACITY: usize = 16;

/// Chunks at or below this remainder are considered consumed.
const CHUNK_EPSILON_MM: f32 = 0.0001;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowChunk {
    pub timestamp_ms: Millis,
    pub remaining_mm: f32,
}

#[derive(Debug, Clone)]
pub struct FlowDeficitTracker {
    chunks: VecDeque<FlowChunk>,
    outstanding_mm: f32,
    deficit_since_ms: Option<Millis>,
}

impl Default for FlowDeficitTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowDeficitTracker {
    pub fn new() -> Self {
        Self {
            chunks: VecDeque::with_capacity(FLOW_QUEUE_CAPACITY),
            outstanding_mm: 0.0,
            deficit_since_ms: None,
        }
    }

    /// Record `amount_mm` of commanded movement at `now`.
    pub fn add_expected(&mut self, amount_mm: f32, now: Millis, prune_window_ms: Millis) {
        if !(amount_mm > 0.0) || !amount_mm.is_finite() {
            return;
        }
        self.prune(now, prune_window_ms);
        if self.chunks.len() >= FLOW_QUEUE_CAPACITY {
            self.evict_oldest();
        }
        self.chunks.push_back(FlowChunk {
            timestamp_ms: now,
            remaining_mm: amount_mm,
        });
        self.outstanding_mm += amount_mm;
    }

    /// Consume confirmed movement, oldest chunk first.
    pub fn add_actual(&mut self, amount_mm: f32) {
        if !(amount_mm > 0.0) || !amount_mm.is_finite() {
            return;
        }
        let mut left = amount_mm;
        while left > 0.0 {
            let Some(front) = self.chunks.front_mut() else {
                break;
            };
            let take = front.remaining_mm.min(left);
            front.remaining_mm -= take;
            left -= take;
            self.outstanding_mm -= take;
            if front.remaining_mm <= CHUNK_EPSILON_MM {
                self.evict_oldest();
            }
        }
        self.settle();
    }

    /// Current deficit after dropping chunks older than `prune_window_ms`.
    pub fn outstanding(&mut self, now: Millis, prune_window_ms: Millis) -> f32 {
        self.prune(now, prune_window_ms);
        self.outstanding_mm.max(0.0)
    }

    /// Deficit as of the last mutation, without pruning.
    pub fn outstanding_cached(&self) -> f32 {
        self.outstanding_mm.max(0.0)
    }

    /// Hysteresis latch: true once `outstanding_mm >= threshold_mm` has held
    /// continuously for `hold_ms`. Any sample below the threshold restarts the
    /// hold. A non-positive threshold or zero hold disables the latch.
    pub fn deficit_satisfied(
        &mut self,
        outstanding_mm: f32,
        now: Millis,
        threshold_mm: f32,
        hold_ms: Millis,
    ) -> bool {
        if !(threshold_mm > 0.0) || hold_ms == 0 {
            self.deficit_since_ms = None;
            return false;
        }
        if outstanding_mm >= threshold_mm {
            let since = *self.deficit_since_ms.get_or_insert(now);
            elapsed_ms(now, since) >= hold_ms
        } else {
            self.deficit_since_ms = None;
            false
        }
    }

    pub fn reset(&mut self) {
        self.chunks.clear();
        self.outstanding_mm = 0.0;
        self.deficit_since_ms = None;
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Chunks oldest first.
    pub fn chunks(&self) -> impl Iterator<Item = &FlowChunk> {
        self.chunks.iter()
    }

    fn prune(&mut self, now: Millis, window_ms: Millis) {
        if window_ms == 0 {
            return;
        }
        while let Some(front) = self.chunks.front() {
            if elapsed_ms(now, front.timestamp_ms) <= window_ms {
                break;
            }
            self.evict_oldest();
        }
        self.settle();
    }

    fn evict_oldest(&mut self) {
        if let Some(old) = self.chunks.pop_front() {
            self.outstanding_mm -= old.remaining_mm;
        }
    }

    fn settle(&mut self) {
        // Float drift must not leave a phantom deficit once the queue drains.
        if self.chunks.is_empty() || self.outstanding_mm < 0.0 {
            self.outstanding_mm = 0.0;
        }
    }
}
