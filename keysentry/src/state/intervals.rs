// keysentry/src/state/intervals.rs
//
// Inter-key intervals over an ordered event sequence.
//
// An out-of-order pair (or a non-finite timestamp) cannot occur after normalization, but
// sequences handed in directly may still contain one. Such an interval is
// excluded from every statistic and counted, never coerced to zero.

use tracing::warn;

use crate::events::KeyEvent;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntervalSet {
    pub valid:    Vec<f64>,
    pub excluded: usize,
}

impl IntervalSet {
    pub fn compute(events: &[KeyEvent]) -> Self {
        let mut out = Self::default();
        for w in events.windows(2) {
            let (prev, next) = (w[0].timestamp, w[1].timestamp);
            // Order is checked on the timestamps, not the delta: two far-apart
            // finite timestamps may overflow to +inf and still be ordered.
            if prev.is_finite() && next.is_finite() && next >= prev {
                out.valid.push(next - prev);
            } else {
                warn!(
                    "Non-monotonic timestamp detected: {} -> {}. Excluding interval.",
                    w[0].timestamp, w[1].timestamp
                );
                out.excluded += 1;
            }
        }
        out
    }

    pub fn len(&self) -> usize { self.valid.len() }
    pub fn is_empty(&self) -> bool { self.valid.is_empty() }
}
