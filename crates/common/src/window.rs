use std::collections::VecDeque;

use crate::Candle;

/// Bounded rolling window of closed candles for one pair.
///
/// Oldest candles are evicted once `capacity` is reached. Candles whose
/// timestamp is not strictly after the newest stored candle are refused, so
/// the window stays ascending and duplicate-free.
#[derive(Debug, Clone)]
pub struct CandleWindow {
    buf: VecDeque<Candle>,
    capacity: usize,
}

impl CandleWindow {
    pub const DEFAULT_CAPACITY: usize = 500;

    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a candle. Returns `false` when it was refused as stale or a
    /// duplicate.
    pub fn push(&mut self, candle: Candle) -> bool {
        if let Some(last) = self.buf.back() {
            if candle.timestamp <= last.timestamp {
                return false;
            }
        }
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(candle);
        true
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last(&self) -> Option<&Candle> {
        self.buf.back()
    }

    /// Contiguous oldest-first copy for indicator computation.
    pub fn to_vec(&self) -> Vec<Candle> {
        self.buf.iter().copied().collect()
    }
}

impl Default for CandleWindow {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
