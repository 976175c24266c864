// keysentry/src/engine/mod.rs
//
// Engine entry points.
//
//   raw key logs ─► EventSequence::normalize ─► IntervalSet::compute
//                          │                          │
//                          ▼                          ▼
//                   workers::paste             workers::cadence
//                          └────────► fusion ◄────────┘
//
// Synchronous and pure: no I/O, no shared mutable state. An Analyzer only
// holds its validated Config, so one instance can serve every task.

pub mod dispatcher;
pub mod fusion;

use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::error::Result;
use crate::events::{self, RawKeyEvent, SuspicionResult};
use crate::state::intervals::IntervalSet;
use crate::state::sequence::EventSequence;
use crate::workers;

/// Score one key-log batch. Never fails: malformed records are skipped and
/// counted, short batches come back gated with an informational note.
pub fn analyze(events: &[RawKeyEvent], config: &Config) -> SuspicionResult {
    analyze_sequence(&EventSequence::normalize(events), config)
}

/// Score an already-built sequence. Sequences that did not come through
/// the normalizer may hold out-of-order pairs; those intervals are excluded.
pub fn analyze_sequence(seq: &EventSequence, config: &Config) -> SuspicionResult {
    if let Some(gated) = fusion::gate(seq, config) {
        debug!("Gated batch of {} events", seq.len());
        return gated;
    }

    let intervals = IntervalSet::compute(&seq.events);
    let paste     = workers::paste::analyze(&seq.events, config);
    let cadence   = workers::cadence::analyze(&intervals.valid, config);

    let result = fusion::fuse(seq, &intervals, &paste, &cadence, config);
    debug!("Score breakdown: {:?}", result.details.score_contribution);
    result
}

#[derive(Debug, Clone)]
pub struct Analyzer {
    config: Config,
}

impl Analyzer {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config { &self.config }

    pub fn analyze(&self, events: &[RawKeyEvent]) -> SuspicionResult {
        analyze(events, &self.config)
    }

    pub fn analyze_sequence(&self, seq: &EventSequence) -> SuspicionResult {
        analyze_sequence(seq, &self.config)
    }

    /// Score an activity document (`{ "_id": …, "keyLogs": [ … ] }`).
    /// Fails only when the document does not hold a sequence of event records.
    pub fn analyze_document(&self, doc: &Value) -> Result<SuspicionResult> {
        let logs = events::key_logs(doc)?;
        Ok(self.analyze(&logs))
    }
}

impl Default for Analyzer {
    fn default() -> Self { Self { config: Config::default() } }
}
