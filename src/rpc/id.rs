use chrono::Utc;
use std::sync::{Mutex, PoisonError};

/// 2010-11-04T01:42:54.657Z
const EPOCH_MS: i64 = 1_288_834_974_657;

const WORKER_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;
const MAX_WORKER: u64 = (1 << WORKER_BITS) - 1;

/// Snowflake-style 64-bit ids: milliseconds | worker | sequence.
///
/// Ids from one generator are strictly increasing. When the clock steps back
/// or a millisecond's sequence runs out, the generator keeps counting on the
/// last millisecond it handed out instead of waiting.
#[derive(Debug)]
pub struct IdGenerator {
    worker: u64,
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    last_ms: i64,
    sequence: u64,
}

impl IdGenerator {
    pub fn new(worker: u64) -> Self {
        Self {
            worker: worker & MAX_WORKER,
            state: Mutex::new(State::default()),
        }
    }

    pub fn next_id(&self) -> u64 { self.next_at(Utc::now().timestamp_millis()) }

    fn next_at(&self, now_ms: i64) -> u64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ms = now_ms.max(state.last_ms);

        if ms == state.last_ms {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                ms += 1;
            }
        } else {
            state.sequence = 0;
        }
        state.last_ms = ms;

        let elapsed = (ms - EPOCH_MS).max(0) as u64;
        (elapsed << (WORKER_BITS + SEQUENCE_BITS)) | (self.worker << SEQUENCE_BITS) | state.sequence
    }
}

impl Default for IdGenerator {
    fn default() -> Self { Self::new(0) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_strictly_increasing() {
        let ids = IdGenerator::default();
        let mut last = 0;
        for _ in 0..20_000 {
            let id = ids.next_id();
            assert!(id > last);
            last = id;
        }
    }

    #[test]
    fn test_clock_regression_and_sequence_overflow() {
        let ids = IdGenerator::new(3);
        let now = EPOCH_MS + 1_000_000;

        let first = ids.next_at(now);
        let regressed = ids.next_at(now - 50);
        assert!(regressed > first);

        let mut last = regressed;
        for _ in 0..(SEQUENCE_MASK + 10) {
            let id = ids.next_at(now);
            assert!(id > last);
            last = id;
        }
    }

    #[test]
    fn test_worker_bits() {
        let id = IdGenerator::new(5).next_at(EPOCH_MS + 1);
        assert_eq!((id >> SEQUENCE_BITS) & MAX_WORKER, 5);
    }

    #[test]
    fn test_unique_across_threads() {
        let ids = Arc::new(IdGenerator::default());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = Arc::clone(&ids);
                thread::spawn(move || (0..5_000).map(|_| ids.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id));
            }
        }
    }
}
