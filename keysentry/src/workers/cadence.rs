// keysentry/src/workers/cadence.rs
//
// Typing cadence — share of abnormally fast and abnormally slow intervals.
//
// Sustained IKIs under FAST_TYPING_THRESHOLD are beyond human typing and
// point at injected text; IKIs over LONG_GAP_THRESHOLD are pauses long
// enough to look something up elsewhere. An empty interval list is a
// defined (0, 0) result, not a failure.

use crate::config::Config;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CadenceReport {
    pub fast_count:        usize,
    pub long_gap_count:    usize,
    pub fast_fraction:     f64,
    pub long_gap_fraction: f64,
}

pub fn analyze(intervals: &[f64], config: &Config) -> CadenceReport {
    if intervals.is_empty() {
        return CadenceReport::default();
    }

    let fast_count = intervals
        .iter()
        .filter(|&&iki| iki >= 0.0 && iki < config.fast_typing_threshold_ms)
        .count();
    let long_gap_count = intervals
        .iter()
        .filter(|&&iki| iki > config.long_gap_threshold_ms)
        .count();

    let n = intervals.len() as f64;
    CadenceReport {
        fast_count,
        long_gap_count,
        fast_fraction:     fast_count as f64 / n,
        long_gap_fraction: long_gap_count as f64 / n,
    }
}
