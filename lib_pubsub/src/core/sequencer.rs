use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out request sequence numbers: strictly increasing, starting at 1.
#[derive(Debug, Default)]
pub struct SequenceAllocator {
    last: AtomicU64,
}

impl SequenceAllocator {
    /// A fresh allocator whose first number is 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// The next sequence number. Safe to call from any number of tasks.
    pub fn next(&self) -> u64 {
        self.last.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn starts_above_zero_and_increases() {
        let seq = SequenceAllocator::new();
        assert_eq!(seq.next(), 1);
        assert_eq!(seq.next(), 2);
        assert_eq!(seq.next(), 3);
    }

    #[test]
    fn concurrent_callers_never_share_a_number() {
        let seq = Arc::new(SequenceAllocator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let seq = Arc::clone(&seq);
                std::thread::spawn(move || {
                    let taken: Vec<u64> = (0..1000).map(|_| seq.next()).collect();
                    assert!(taken.windows(2).all(|w| w[0] < w[1]));
                    taken
                })
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            for n in handle.join().unwrap() {
                assert!(all.insert(n), "sequence {} handed out twice", n);
            }
        }
        assert_eq!(all.len(), 8000);
        assert_eq!(seq.next(), 8001);
    }
}
