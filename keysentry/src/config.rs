// keysentry/src/config.rs
//
// Static thresholds and weights for the suspicion engine.
//
// Every field has a default; a JSON config file only needs the fields it
// overrides. The config is immutable once an Analyzer is built from it and
// is threaded explicitly into every detector, so concurrent analyses share
// it without locking.
//
// Default score budget (caps sum to 140, total is clamped to 100):
//   rapid_paste          weight 40  cap 50  — per detected modifier+trigger paste
//   multiple_rapid_paste weight 25  cap 30  — per chained link between pastes
//   fast_typing          weight 25  cap 40  — fast-IKI fraction × 2.0
//   long_gaps            weight 10  cap 20  — long-gap fraction × 1.5

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // ── Timing thresholds (milliseconds) ─────────────────────────────────────
    pub fast_typing_threshold_ms:       f64,
    pub long_gap_threshold_ms:          f64,
    pub rapid_paste_threshold_ms:       f64,
    pub consecutive_paste_threshold_ms: f64,
    pub burst_max_iki_ms:               f64,

    // ── Sizes ────────────────────────────────────────────────────────────────
    pub min_keylogs_for_analysis: usize,
    pub burst_min_keys:           usize,

    // ── Weights ──────────────────────────────────────────────────────────────
    pub paste_weight:       f64,
    pub multi_paste_weight: f64,
    pub fast_weight:        f64,
    pub gap_weight:         f64,

    // ── Per-factor caps ──────────────────────────────────────────────────────
    pub max_paste_score:       f64,
    pub max_multi_paste_score: f64,
    pub max_fast_score:        f64,
    pub max_gap_score:         f64,

    pub fast_scale_factor: f64,
    pub gap_scale_factor:  f64,

    // ── Paste shortcut keys (compared lowercase) ─────────────────────────────
    pub paste_modifier_keys: Vec<String>,
    pub paste_trigger_key:   String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fast_typing_threshold_ms:       50.0,
            long_gap_threshold_ms:          15_000.0,
            rapid_paste_threshold_ms:       300.0,
            consecutive_paste_threshold_ms: 1_000.0,
            burst_max_iki_ms:               70.0,
            min_keylogs_for_analysis:       10,
            burst_min_keys:                 5,
            paste_weight:                   40.0,
            multi_paste_weight:             25.0,
            fast_weight:                    25.0,
            gap_weight:                     10.0,
            max_paste_score:                50.0,
            max_multi_paste_score:          30.0,
            max_fast_score:                 40.0,
            max_gap_score:                  20.0,
            fast_scale_factor:              2.0,
            gap_scale_factor:               1.5,
            paste_modifier_keys:            vec!["control".into(), "meta".into()],
            paste_trigger_key:              "v".into(),
        }
    }
}

impl Config {
    /// Load a (partial) JSON config and validate it.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the detectors meaningless.
    ///
    /// Weights and caps are only required to be finite: negative or huge
    /// values are allowed and the aggregator still clamps the total.
    pub fn validate(&self) -> Result<()> {
        let thresholds = [
            ("fast_typing_threshold_ms",       self.fast_typing_threshold_ms),
            ("long_gap_threshold_ms",          self.long_gap_threshold_ms),
            ("rapid_paste_threshold_ms",       self.rapid_paste_threshold_ms),
            ("consecutive_paste_threshold_ms", self.consecutive_paste_threshold_ms),
            ("burst_max_iki_ms",               self.burst_max_iki_ms),
        ];
        for (field, v) in thresholds {
            if !v.is_finite() || v < 0.0 {
                return Err(invalid(field, format!("must be a finite, non-negative number (got {v})")));
            }
        }

        let scoring = [
            ("paste_weight",          self.paste_weight),
            ("multi_paste_weight",    self.multi_paste_weight),
            ("fast_weight",           self.fast_weight),
            ("gap_weight",            self.gap_weight),
            ("max_paste_score",       self.max_paste_score),
            ("max_multi_paste_score", self.max_multi_paste_score),
            ("max_fast_score",        self.max_fast_score),
            ("max_gap_score",         self.max_gap_score),
            ("fast_scale_factor",     self.fast_scale_factor),
            ("gap_scale_factor",      self.gap_scale_factor),
        ];
        for (field, v) in scoring {
            if !v.is_finite() {
                return Err(invalid(field, format!("must be finite (got {v})")));
            }
        }

        if self.burst_min_keys < 2 {
            return Err(invalid("burst_min_keys", "a burst needs at least 2 keys".into()));
        }
        if self.paste_trigger_key.trim().is_empty() {
            return Err(invalid("paste_trigger_key", "must not be empty".into()));
        }
        if self.paste_modifier_keys.iter().any(|k| k.trim().is_empty()) {
            return Err(invalid("paste_modifier_keys", "must not contain empty key names".into()));
        }
        Ok(())
    }

    pub fn is_paste_modifier(&self, key: &str) -> bool {
        self.paste_modifier_keys.iter().any(|m| m.eq_ignore_ascii_case(key))
    }

    pub fn is_paste_trigger(&self, key: &str) -> bool {
        self.paste_trigger_key.eq_ignore_ascii_case(key)
    }
}

fn invalid(field: &'static str, reason: String) -> Error {
    Error::InvalidConfig { field, reason }
}
