// keysentry/src/engine/fusion.rs
//
// Weighted, capped score fusion into one bounded suspicion percentage.
//
//   rapid_paste          = min(MAX_PASTE,       matches  × paste_weight)
//   multiple_rapid_paste = min(MAX_MULTI_PASTE, links    × multi_paste_weight)
//   fast_typing          = min(MAX_FAST,        fast%    × fast_weight × fast_scale)
//   long_gaps            = min(MAX_GAP,         gap%     × gap_weight  × gap_scale)
//
// Total = sum, rounded to 2 decimals, clamped to [0, 100]. Each cap stops a
// single factor from dominating; the clamp holds for any config, including
// adversarial weights. Bursts are reported but carry no weight.
//
// Every raw counter lands in the result details, so a score can be
// re-derived from its breakdown alone.

use crate::config::Config;
use crate::events::{Details, ScoreContribution, SuspicionResult};
use crate::state::intervals::IntervalSet;
use crate::state::sequence::EventSequence;
use crate::workers::cadence::CadenceReport;
use crate::workers::paste::PasteReport;

/// Minimum-data gate. Returns the "not evaluated" result for short batches.
pub fn gate(seq: &EventSequence, config: &Config) -> Option<SuspicionResult> {
    if seq.len() >= config.min_keylogs_for_analysis {
        return None;
    }
    Some(SuspicionResult {
        suspicion_percentage: 0.0,
        details: Details {
            total_key_presses: seq.received,
            analyzed_events:   seq.len(),
            skipped_events:    seq.skipped,
            ..Details::default()
        },
        error: Some(format!(
            "Not enough key logs ({}) for detailed analysis (minimum {}).",
            seq.len(),
            config.min_keylogs_for_analysis
        )),
    })
}

pub fn fuse(
    seq:       &EventSequence,
    intervals: &IntervalSet,
    paste:     &PasteReport,
    cadence:   &CadenceReport,
    config:    &Config,
) -> SuspicionResult {
    let contribution = ScoreContribution {
        rapid_paste: capped(
            paste.matches.len() as f64 * config.paste_weight,
            config.max_paste_score,
        ),
        multiple_rapid_paste: capped(
            paste.links as f64 * config.multi_paste_weight,
            config.max_multi_paste_score,
        ),
        fast_typing: capped(
            cadence.fast_fraction * config.fast_weight * config.fast_scale_factor,
            config.max_fast_score,
        ),
        long_gaps: capped(
            cadence.long_gap_fraction * config.gap_weight * config.gap_scale_factor,
            config.max_gap_score,
        ),
    };

    SuspicionResult {
        suspicion_percentage: bounded(contribution.total()),
        details: Details {
            total_key_presses:              seq.received,
            analyzed_events:                seq.len(),
            skipped_events:                 seq.skipped,
            analyzed_intervals:             intervals.len(),
            excluded_intervals:             intervals.excluded,
            rapid_paste_ctrl_v_count:       paste.matches.len(),
            rapid_paste_ctrl_v_timestamps:  paste.matches.iter().map(|m| m.trigger_ts).collect(),
            multiple_rapid_paste_sequences: paste.links,
            rapid_paste_groups:             paste.groups.clone(),
            paste_burst_count:              paste.bursts.len(),
            paste_burst_timestamps:         paste.bursts.iter().map(|b| b.end_ts).collect(),
            fast_typing_fraction:           cadence.fast_fraction,
            long_gap_fraction:              cadence.long_gap_fraction,
            score_contribution:             contribution,
        },
        error: None,
    }
}

fn capped(raw: f64, cap: f64) -> f64 {
    if raw.is_nan() { 0.0 } else { raw.min(cap) }
}

fn bounded(total: f64) -> f64 {
    if total.is_nan() {
        return 0.0;
    }
    ((total * 100.0).round() / 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{BurstCandidate, KeyEvent, PasteMatch};

    fn seq(n: usize) -> EventSequence {
        EventSequence {
            events:   (0..n).map(|i| KeyEvent::new("a", i as f64 * 100.0)).collect(),
            received: n,
            skipped:  0,
        }
    }

    fn pastes(n: usize, links: usize) -> PasteReport {
        PasteReport {
            matches: (0..n)
                .map(|i| PasteMatch { modifier_ts: i as f64 * 10.0, trigger_ts: i as f64 * 10.0 + 5.0 })
                .collect(),
            links,
            ..PasteReport::default()
        }
    }

    fn cadence(fast: f64, gap: f64) -> CadenceReport {
        CadenceReport { fast_fraction: fast, long_gap_fraction: gap, ..CadenceReport::default() }
    }

    #[test]
    fn gate_blocks_short_batches_only() {
        let config = Config::default();
        let gated = gate(&seq(9), &config).unwrap();
        assert_eq!(gated.suspicion_percentage, 0.0);
        assert!(!gated.is_evaluated());
        assert_eq!(gated.details.analyzed_events, 9);
        assert!(gate(&seq(10), &config).is_none());
    }

    #[test]
    fn single_paste_scores_its_weight() {
        let config = Config::default();
        let r = fuse(&seq(10), &IntervalSet::default(), &pastes(1, 0), &cadence(0.0, 0.0), &config);
        assert_eq!(r.details.score_contribution.rapid_paste, 40.0);
        assert_eq!(r.suspicion_percentage, 40.0);
    }

    #[test]
    fn each_factor_is_capped() {
        let config = Config::default();
        let r = fuse(&seq(10), &IntervalSet::default(), &pastes(5, 4), &cadence(1.0, 1.0), &config);
        let c = r.details.score_contribution;
        assert_eq!(c.rapid_paste, 50.0);
        assert_eq!(c.multiple_rapid_paste, 30.0);
        assert_eq!(c.fast_typing, 40.0);
        assert_eq!(c.long_gaps, 15.0); // 1.0 × 10 × 1.5 stays under its cap of 20
        assert_eq!(r.suspicion_percentage, 100.0);
    }

    #[test]
    fn scaled_fractions() {
        let config = Config::default();
        let r = fuse(&seq(10), &IntervalSet::default(), &pastes(0, 0), &cadence(0.5, 0.2), &config);
        assert_eq!(r.details.score_contribution.fast_typing, 25.0);
        assert_eq!(r.details.score_contribution.long_gaps, 3.0);
        assert_eq!(r.suspicion_percentage, 28.0);
    }

    #[test]
    fn adversarial_weights_stay_bounded() {
        let huge = Config {
            paste_weight: 1e300,
            max_paste_score: f64::INFINITY,
            fast_weight: -1e300,
            max_fast_score: 1e300,
            ..Config::default()
        };
        let r = fuse(&seq(10), &IntervalSet::default(), &pastes(3, 0), &cadence(1.0, 0.0), &huge);
        assert!((0.0..=100.0).contains(&r.suspicion_percentage));

        let nan = Config { fast_weight: f64::INFINITY, ..Config::default() };
        let r = fuse(&seq(10), &IntervalSet::default(), &pastes(0, 0), &cadence(0.0, 0.0), &nan);
        assert_eq!(r.details.score_contribution.fast_typing, 0.0);
        assert_eq!(r.suspicion_percentage, 0.0);

        let negative = Config { gap_weight: -1000.0, max_gap_score: 0.0, ..Config::default() };
        let r = fuse(&seq(10), &IntervalSet::default(), &pastes(0, 0), &cadence(0.0, 1.0), &negative);
        assert_eq!(r.suspicion_percentage, 0.0);
    }

    #[test]
    fn breakdown_carries_raw_counters() {
        let config = Config::default();
        let mut p = pastes(2, 1);
        p.bursts.push(BurstCandidate { start_ts: 0.0, end_ts: 120.0 });
        let intervals = IntervalSet { valid: vec![10.0; 8], excluded: 1 };
        let r = fuse(&seq(10), &intervals, &p, &cadence(1.0, 0.0), &config);
        let d = &r.details;
        assert_eq!(d.analyzed_intervals, 8);
        assert_eq!(d.excluded_intervals, 1);
        assert_eq!(d.rapid_paste_ctrl_v_timestamps, vec![5.0, 15.0]);
        assert_eq!(d.multiple_rapid_paste_sequences, 1);
        assert_eq!(d.paste_burst_timestamps, vec![120.0]);
        assert_eq!(r.suspicion_percentage, d.score_contribution.total().min(100.0));
    }
}
