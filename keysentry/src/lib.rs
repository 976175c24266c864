// keysentry/src/lib.rs
//
// KeySentry — keystroke timing suspicion engine.
//
// Scores one batch of captured key events for signs of pasted or injected
// input: shortcut pastes, chained pastes, bursts of machine-speed keys and
// long look-up pauses. The result is a bounded 0–100 percentage with a full
// breakdown, for the dispatch layer to persist next to the submission.
//
//   let result = keysentry::analyze(&key_logs, &Config::default());
//
// The engine is pure and stateless; `Analyzer` bundles a validated Config
// for sharing across tasks. `engine::dispatcher` and `eval` are the file
// and evaluation surfaces used by the `keysentry` binary.

pub mod config;
pub mod engine;
pub mod error;
pub mod eval;
pub mod events;
pub mod state;
pub mod workers;

pub use config::Config;
pub use engine::{analyze, analyze_sequence, Analyzer};
pub use error::{Error, Result};
pub use events::{
    BurstCandidate, Details, Factor, KeyEvent, PasteGroup, PasteMatch, RawKeyEvent,
    ScoreContribution, SuspicionResult,
};
pub use state::intervals::IntervalSet;
pub use state::sequence::EventSequence;
