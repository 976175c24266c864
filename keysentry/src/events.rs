// keysentry/src/events.rs
//
// Shared domain types flowing through KeySentry: raw captured key events,
// normalized events, the derived paste/burst evidence, and the result
// handed back to the dispatch layer.
//
// The result serializes with the field names the activity store already
// uses for key-log analysis responses (`suspicious_percentage`, `details`,
// `error`), so persisted records stay compatible.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

// ── Input events ──────────────────────────────────────────────────────────────

/// Key event as captured by the browser/editor hook, before normalization.
/// The timestamp is kept as raw JSON: capture pipelines send numbers,
/// numeric strings and RFC 3339 strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawKeyEvent {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

impl RawKeyEvent {
    pub fn new(key: &str, timestamp_ms: f64) -> Self {
        Self {
            key:       Some(key.to_string()),
            timestamp: Some(serde_json::json!(timestamp_ms)),
        }
    }
}

/// Normalized key event: lowercase key name, timestamp in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub key:       String,
    pub timestamp: f64,
}

impl KeyEvent {
    pub fn new(key: &str, timestamp: f64) -> Self {
        Self { key: key.to_lowercase(), timestamp }
    }
}

// ── Activity documents ────────────────────────────────────────────────────────
// One document per submission/session, as exported from the activity store:
//   { "_id": "67e1…" | {"$oid": "67e1…"}, "keyLogs": [ {key, timestamp}, … ] }

pub const KEY_LOGS_FIELD: &str = "keyLogs";

/// Document id, accepting both plain strings and Mongo extended JSON.
pub fn document_id(doc: &Value) -> Option<String> {
    match doc.get("_id")? {
        Value::String(s) => Some(s.clone()),
        Value::Object(o) => o.get("$oid").and_then(Value::as_str).map(str::to_string),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Extract the key-log batch from an activity document.
/// Fails when the document or any record in it is not event-like.
pub fn key_logs(doc: &Value) -> Result<Vec<RawKeyEvent>> {
    let obj = doc
        .as_object()
        .ok_or_else(|| Error::InvalidInput("document is not a JSON object".into()))?;
    let logs = obj
        .get(KEY_LOGS_FIELD)
        .ok_or_else(|| Error::InvalidInput(format!("missing `{KEY_LOGS_FIELD}` field")))?;
    let items = logs
        .as_array()
        .ok_or_else(|| Error::InvalidInput(format!("`{KEY_LOGS_FIELD}` is not an array")))?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            if !item.is_object() {
                return Err(Error::InvalidInput(format!("key log #{i} is not an object")));
            }
            RawKeyEvent::deserialize(item)
                .map_err(|e| Error::InvalidInput(format!("key log #{i}: {e}")))
        })
        .collect()
}

// ── Derived evidence ──────────────────────────────────────────────────────────

/// Modifier press followed by the paste trigger within the rapid-paste window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PasteMatch {
    pub modifier_ts: f64,
    pub trigger_ts:  f64,
}

/// Window of consecutive keys whose every internal IKI is within the burst limit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BurstCandidate {
    pub start_ts: f64,
    pub end_ts:   f64,
}

/// Chain of paste matches, each within the consecutive-paste gap of the previous.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PasteGroup {
    pub start_ts: f64,
    pub end_ts:   f64,
    pub matches:  usize,
}

// ── Scoring factors ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Factor {
    RapidPaste,         // modifier+trigger paste shortcut
    MultipleRapidPaste, // chained pastes within the consecutive gap
    FastTyping,         // fraction of IKIs below the fast threshold
    LongGaps,           // fraction of IKIs above the long-gap threshold
}

impl Factor {
    pub const ALL: [Factor; 4] = [
        Factor::RapidPaste,
        Factor::MultipleRapidPaste,
        Factor::FastTyping,
        Factor::LongGaps,
    ];
}

impl std::fmt::Display for Factor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RapidPaste => write!(f, "rapid_paste"),
            Self::MultipleRapidPaste => write!(f, "multiple_rapid_paste"),
            Self::FastTyping => write!(f, "fast_typing"),
            Self::LongGaps => write!(f, "long_gaps"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreContribution {
    pub rapid_paste:          f64,
    pub multiple_rapid_paste: f64,
    pub fast_typing:          f64,
    pub long_gaps:            f64,
}

impl ScoreContribution {
    pub fn get(&self, factor: Factor) -> f64 {
        match factor {
            Factor::RapidPaste => self.rapid_paste,
            Factor::MultipleRapidPaste => self.multiple_rapid_paste,
            Factor::FastTyping => self.fast_typing,
            Factor::LongGaps => self.long_gaps,
        }
    }

    pub fn total(&self) -> f64 {
        Factor::ALL.iter().map(|f| self.get(*f)).sum()
    }
}

// ── Result ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Details {
    pub total_key_presses:  usize, // records received
    pub analyzed_events:    usize, // records with a usable timestamp
    pub skipped_events:     usize, // dropped for an unparseable timestamp
    pub analyzed_intervals: usize,
    pub excluded_intervals: usize, // negative / non-finite deltas
    pub rapid_paste_ctrl_v_count:       usize,
    pub rapid_paste_ctrl_v_timestamps:  Vec<f64>,
    pub multiple_rapid_paste_sequences: usize, // chained links, not groups
    pub rapid_paste_groups:             Vec<PasteGroup>,
    pub paste_burst_count:      usize,
    pub paste_burst_timestamps: Vec<f64>, // burst end times
    pub fast_typing_fraction:   f64,
    pub long_gap_fraction:      f64,
    pub score_contribution:     ScoreContribution,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuspicionResult {
    #[serde(rename = "suspicious_percentage")]
    pub suspicion_percentage: f64,
    pub details: Details,
    /// Informational, non-fatal note (e.g. too few key logs to evaluate).
    pub error: Option<String>,
}

impl SuspicionResult {
    /// False when the batch was gated out: a zero score then means
    /// "not evaluated", never "confirmed clean".
    pub fn is_evaluated(&self) -> bool {
        self.error.is_none()
    }
}
