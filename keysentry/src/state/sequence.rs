// keysentry/src/state/sequence.rs
//
// Event normalization: raw captured key logs → time-ordered EventSequence.
//
//   - timestamps are converted to f64 milliseconds (numbers, numeric strings,
//     RFC 3339 date-times)
//   - records whose timestamp cannot be converted are dropped and counted
//   - the survivors are stably sorted ascending, so simultaneous events keep
//     their capture order and the output is deterministic
//
// The caller's slice is never touched; the sequence owns a fresh copy.

use chrono::DateTime;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::events::{KeyEvent, RawKeyEvent};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventSequence {
    pub events:   Vec<KeyEvent>,
    pub received: usize,
    pub skipped:  usize,
}

impl EventSequence {
    pub fn normalize(raw: &[RawKeyEvent]) -> Self {
        let mut events = Vec::with_capacity(raw.len());
        let mut skipped = 0usize;

        for (i, log) in raw.iter().enumerate() {
            match log.timestamp.as_ref().and_then(parse_timestamp) {
                Some(ts) => events.push(KeyEvent::new(log.key.as_deref().unwrap_or(""), ts)),
                None => {
                    debug!("Skipping key log #{} with unusable timestamp: {:?}", i, log.timestamp);
                    skipped += 1;
                }
            }
        }

        if skipped > 0 {
            warn!("Dropped {} of {} key logs with invalid timestamps", skipped, raw.len());
        }

        // Vec::sort_by is stable: ties keep capture order.
        events.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        Self { events, received: raw.len(), skipped }
    }

    pub fn len(&self) -> usize { self.events.len() }
    pub fn is_empty(&self) -> bool { self.events.is_empty() }

    /// SHA256[:8] over the normalized (key, timestamp) pairs.
    pub fn fingerprint(&self) -> String {
        let mut h = Sha256::new();
        for e in &self.events {
            h.update(e.key.as_bytes());
            h.update(b"|");
            h.update(e.timestamp.to_le_bytes());
            h.update(b";");
        }
        hex::encode(&h.finalize()[..8])
    }
}

/// Convert a raw JSON timestamp to milliseconds. Non-finite values are unusable.
pub fn parse_timestamp(v: &Value) -> Option<f64> {
    let ms = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<f64>() {
                Ok(ms) => ms,
                Err(_) => {
                    let dt = DateTime::parse_from_rfc3339(s).ok()?;
                    dt.timestamp_micros() as f64 / 1000.0
                }
            }
        }
        _ => return None,
    };
    ms.is_finite().then_some(ms)
}
