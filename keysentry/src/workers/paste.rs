// keysentry/src/workers/paste.rs
//
// Paste detection — explicit shortcut pastes, implicit bursts, chaining.
//
// Three signals from one pass over the ordered events:
//   1. Shortcut paste: a modifier key (Control / Meta) followed by the
//      trigger key ("v") within RAPID_PASTE_THRESHOLD. Modelled as a
//      two-state machine so "any other key disarms" is explicit.
//   2. Burst: BURST_MIN_KEYS consecutive keys whose every internal IKI is
//      in [0, BURST_MAX_IKI]. Clipboard injection and scripted typing show
//      up this way even when the capture hook does not report modifiers.
//   3. Chaining: successive shortcut pastes closer than
//      CONSECUTIVE_PASTE_THRESHOLD. Every link counts on its own.
//
// O(n): the burst window is a ring buffer with a running count of
// violating pairs, so nothing is re-scanned per event.

use std::collections::VecDeque;

use tracing::debug;

use crate::config::Config;
use crate::events::{BurstCandidate, KeyEvent, PasteGroup, PasteMatch};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PasteReport {
    pub matches: Vec<PasteMatch>,
    pub bursts:  Vec<BurstCandidate>,
    /// Adjacent match pairs within the consecutive-paste gap.
    pub links:   usize,
    /// Chains of two or more linked matches.
    pub groups:  Vec<PasteGroup>,
}

pub fn analyze(events: &[KeyEvent], config: &Config) -> PasteReport {
    let mut shortcut = ShortcutMachine::new(config);
    let mut window   = BurstWindow::new(config.burst_min_keys, config.burst_max_iki_ms);
    let mut report   = PasteReport::default();

    for event in events {
        if let Some(m) = shortcut.step(event) {
            debug!(
                "Potential paste shortcut at {} (diff: {}ms)",
                m.trigger_ts,
                m.trigger_ts - m.modifier_ts
            );
            report.matches.push(m);
        }
        if let Some(b) = window.push(event.timestamp) {
            debug!("Potential paste burst {} -> {}", b.start_ts, b.end_ts);
            report.bursts.push(b);
        }
    }

    let (links, groups) = chain_matches(&report.matches, config.consecutive_paste_threshold_ms);
    report.links  = links;
    report.groups = groups;
    report
}

// ── Shortcut state machine ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShortcutState {
    Idle,
    Armed { modifier_ts: f64 },
}

pub struct ShortcutMachine<'a> {
    config: &'a Config,
    state:  ShortcutState,
}

impl<'a> ShortcutMachine<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config, state: ShortcutState::Idle }
    }

    pub fn state(&self) -> ShortcutState { self.state }

    /// Feed one event; returns a match when it completes a rapid paste.
    ///
    /// A trigger press outside the window leaves the machine armed: only a
    /// fresh modifier press or an unrelated key changes the state.
    pub fn step(&mut self, event: &KeyEvent) -> Option<PasteMatch> {
        if self.config.is_paste_modifier(&event.key) {
            self.state = ShortcutState::Armed { modifier_ts: event.timestamp };
            return None;
        }

        if !self.config.is_paste_trigger(&event.key) {
            self.state = ShortcutState::Idle;
            return None;
        }

        match self.state {
            ShortcutState::Armed { modifier_ts } => {
                let diff = event.timestamp - modifier_ts;
                if diff > 0.0 && diff <= self.config.rapid_paste_threshold_ms {
                    self.state = ShortcutState::Idle;
                    Some(PasteMatch { modifier_ts, trigger_ts: event.timestamp })
                } else {
                    None
                }
            }
            ShortcutState::Idle => None,
        }
    }
}

// ── Burst window ──────────────────────────────────────────────────────────────

pub struct BurstWindow {
    size:       usize,
    max_iki:    f64,
    ts:         VecDeque<f64>,
    violations: usize, // internal pairs outside [0, max_iki]
}

impl BurstWindow {
    pub fn new(size: usize, max_iki: f64) -> Self {
        Self { size, max_iki, ts: VecDeque::with_capacity(size + 1), violations: 0 }
    }

    fn violates(&self, prev: f64, next: f64) -> bool {
        let iki = next - prev;
        !(iki >= 0.0 && iki <= self.max_iki)
    }

    /// Advance by one event; returns a candidate when the full window is a burst.
    pub fn push(&mut self, timestamp: f64) -> Option<BurstCandidate> {
        if self.size == 0 {
            return None;
        }

        if let Some(&last) = self.ts.back() {
            if self.violates(last, timestamp) {
                self.violations += 1;
            }
        }
        self.ts.push_back(timestamp);

        if self.ts.len() > self.size {
            if let (Some(old), Some(&next)) = (self.ts.pop_front(), self.ts.front()) {
                if self.violates(old, next) {
                    self.violations -= 1;
                }
            }
        }

        if self.ts.len() == self.size && self.violations == 0 {
            let start_ts = *self.ts.front()?;
            return Some(BurstCandidate { start_ts, end_ts: timestamp });
        }
        None
    }
}

// ── Chaining ──────────────────────────────────────────────────────────────────

/// Count links between successive matches within `max_gap_ms` and collect
/// the resulting chains (groups of at least two matches).
pub fn chain_matches(matches: &[PasteMatch], max_gap_ms: f64) -> (usize, Vec<PasteGroup>) {
    let mut links  = 0usize;
    let mut groups = Vec::new();
    let mut current: Option<PasteGroup> = None;

    for m in matches {
        match current.as_mut() {
            Some(g) if m.trigger_ts - g.end_ts <= max_gap_ms => {
                g.end_ts = m.trigger_ts;
                g.matches += 1;
                links += 1;
            }
            _ => {
                if let Some(g) = current.take() {
                    if g.matches >= 2 { groups.push(g); }
                }
                current = Some(PasteGroup { start_ts: m.trigger_ts, end_ts: m.trigger_ts, matches: 1 });
            }
        }
    }
    if let Some(g) = current {
        if g.matches >= 2 { groups.push(g); }
    }

    (links, groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(key: &str, ts: f64) -> KeyEvent { KeyEvent::new(key, ts) }

    #[test]
    fn shortcut_paste_within_threshold() {
        let config = Config::default();
        let report = analyze(&[ev("control", 1000.0), ev("v", 1100.0)], &config);
        assert_eq!(report.matches, vec![PasteMatch { modifier_ts: 1000.0, trigger_ts: 1100.0 }]);
    }

    #[test]
    fn trigger_without_modifier_does_not_match() {
        let config = Config::default();
        let report = analyze(&[ev("a", 0.0), ev("v", 50.0)], &config);
        assert!(report.matches.is_empty());
    }

    #[test]
    fn other_key_disarms_modifier() {
        let config = Config::default();
        let mut m = ShortcutMachine::new(&config);
        assert!(m.step(&ev("control", 0.0)).is_none());
        assert_eq!(m.state(), ShortcutState::Armed { modifier_ts: 0.0 });
        assert!(m.step(&ev("x", 10.0)).is_none());
        assert_eq!(m.state(), ShortcutState::Idle);
        assert!(m.step(&ev("v", 20.0)).is_none());
    }

    #[test]
    fn one_modifier_press_matches_only_once() {
        let config = Config::default();
        let report = analyze(&[ev("control", 0.0), ev("v", 50.0), ev("v", 100.0)], &config);
        assert_eq!(report.matches.len(), 1);
    }

    #[test]
    fn slow_or_simultaneous_trigger_keeps_machine_armed() {
        let config = Config::default();
        let mut m = ShortcutMachine::new(&config);
        m.step(&ev("control", 0.0));
        assert!(m.step(&ev("v", 0.0)).is_none()); // diff 0 is not a paste
        assert!(m.step(&ev("v", 400.0)).is_none()); // beyond 300ms
        assert_eq!(m.state(), ShortcutState::Armed { modifier_ts: 0.0 });
    }

    #[test]
    fn meta_key_and_uppercase_names_count() {
        let config = Config::default();
        let report = analyze(
            &[KeyEvent::new("Meta", 0.0), KeyEvent::new("V", 120.0)],
            &config,
        );
        assert_eq!(report.matches.len(), 1);
    }

    #[test]
    fn every_match_respects_threshold() {
        let config = Config::default();
        let events: Vec<KeyEvent> = (0..200)
            .map(|i| ev(if i % 3 == 0 { "control" } else { "v" }, (i * 97 % 1000) as f64 + i as f64 * 10.0))
            .collect();
        for m in analyze(&events, &config).matches {
            let diff = m.trigger_ts - m.modifier_ts;
            assert!(diff > 0.0 && diff <= config.rapid_paste_threshold_ms);
        }
    }

    #[test]
    fn burst_window_flags_each_full_fast_window() {
        let config = Config::default(); // 5 keys, 70ms
        let events: Vec<KeyEvent> = (0..7).map(|i| ev("a", i as f64 * 30.0)).collect();
        let report = analyze(&events, &config);
        let ends: Vec<f64> = report.bursts.iter().map(|b| b.end_ts).collect();
        assert_eq!(ends, vec![120.0, 150.0, 180.0]);
        assert_eq!(report.bursts[0].start_ts, 0.0);
    }

    #[test]
    fn slow_pair_breaks_burst_until_it_leaves_window() {
        let mut w = BurstWindow::new(3, 70.0);
        assert!(w.push(0.0).is_none());
        assert!(w.push(10.0).is_none());
        assert!(w.push(20.0).is_some());
        assert!(w.push(500.0).is_none()); // 480ms gap inside window
        assert!(w.push(510.0).is_none()); // gap still inside
        assert!(w.push(520.0).is_some()); // gap has left
    }

    #[test]
    fn negative_iki_is_never_part_of_a_burst() {
        let mut w = BurstWindow::new(2, 70.0);
        assert!(w.push(100.0).is_none());
        assert!(w.push(90.0).is_none());
        assert!(w.push(120.0).is_some());
    }

    #[test]
    fn chaining_counts_links_and_groups() {
        let m = |t: f64| PasteMatch { modifier_ts: t - 50.0, trigger_ts: t };
        let (links, groups) = chain_matches(&[m(1100.0), m(1200.0), m(1900.0), m(5000.0), m(5500.0)], 1000.0);
        assert_eq!(links, 3);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0], PasteGroup { start_ts: 1100.0, end_ts: 1900.0, matches: 3 });
        assert_eq!(groups[1].matches, 2);
    }

    #[test]
    fn isolated_matches_form_no_group() {
        let m = |t: f64| PasteMatch { modifier_ts: t - 50.0, trigger_ts: t };
        let (links, groups) = chain_matches(&[m(0.0), m(5000.0)], 1000.0);
        assert_eq!(links, 0);
        assert!(groups.is_empty());
    }
}
