// keysentry/src/eval/mod.rs
//
// Labeled dataset evaluation.
//
// Runs the engine over a labeled JSONL dataset of activity documents and
// reports how well the static heuristics separate the classes:
//   1. global and per-factor precision / recall / F1 / FPR at a threshold
//   2. a 10-bin histogram of suspicion percentages
//   3. exact ROC AUC from per-document (score, label) pairs
// Rendering lives in report.rs.
//
// Nothing is learned or tuned here; the config is whatever was passed in.
//
// Dataset format (one JSON object per line):
//   { "_id": …, "keyLogs": [ … ], "groundTruth": "pasted_solution" | null }
// A non-null `groundTruth` marks the positive class.
//
// Run:
//   keysentry --mode eval --path labeled.jsonl --review-threshold 40

pub mod report;

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use serde_json::Value;
use tracing::{info, warn};

use crate::engine::Analyzer;
use crate::events::{self, Factor};

pub const LABEL_FIELD: &str = "groundTruth";

// ── Performance counters ──────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Metrics {
    pub tp:  u64,
    pub fp:  u64,
    pub tn:  u64,
    pub fn_: u64,
}

impl Metrics {
    pub fn record(&mut self, predicted: bool, actual: bool) {
        match (predicted, actual) {
            (true,  true)  => self.tp  += 1,
            (true,  false) => self.fp  += 1,
            (false, true)  => self.fn_ += 1,
            (false, false) => self.tn  += 1,
        }
    }

    pub fn precision(&self) -> f64 {
        let denom = self.tp + self.fp;
        if denom == 0 { 1.0 } else { self.tp as f64 / denom as f64 }
    }

    pub fn recall(&self) -> f64 {
        let denom = self.tp + self.fn_;
        if denom == 0 { 0.0 } else { self.tp as f64 / denom as f64 }
    }

    pub fn f1(&self) -> f64 {
        let p = self.precision();
        let r = self.recall();
        if p + r == 0.0 { 0.0 } else { 2.0 * p * r / (p + r) }
    }

    pub fn fpr(&self) -> f64 {
        let denom = self.fp + self.tn;
        if denom == 0 { 0.0 } else { self.fp as f64 / denom as f64 }
    }
}

// ── Aggregate evaluation result ───────────────────────────────────────────────

#[derive(Debug)]
pub struct EvalResult {
    pub n_documents:     usize,
    pub n_positive:      usize,
    pub n_negative:      usize,
    pub n_gated:         usize, // below the minimum-data gate, counted as not flagged
    pub n_rejected:      usize, // structurally invalid, excluded from metrics
    pub threshold:       f64,
    pub global:          Metrics,
    pub per_factor:      HashMap<Factor, Metrics>,
    pub score_histogram: Vec<(f64, usize)>, // (bin lower bound, count)
    pub scored:          Vec<(f64, bool)>,  // (suspicion %, is positive)
}

// ── Evaluator ─────────────────────────────────────────────────────────────────

pub struct Evaluator {
    analyzer:  Analyzer,
    threshold: f64,
}

impl Evaluator {
    pub fn new(analyzer: Analyzer, threshold: f64) -> Self {
        Self { analyzer, threshold }
    }

    pub async fn run_dataset(&self, path: &Path) -> Result<EvalResult> {
        let content = tokio::fs::read_to_string(path).await?;
        let mut docs: Vec<Value> = Vec::new();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() { continue; }
            match serde_json::from_str::<Value>(line) {
                Ok(doc) => docs.push(doc),
                Err(e) => warn!("Eval dataset parse error: {}", e),
            }
        }

        info!("Loaded {} documents from {}", docs.len(), path.display());
        Ok(self.evaluate(&docs))
    }

    pub fn evaluate(&self, docs: &[Value]) -> EvalResult {
        let mut global     = Metrics::default();
        let mut per_factor: HashMap<Factor, Metrics> = HashMap::new();
        let mut score_bins = vec![0usize; 10];
        let mut scored     = Vec::with_capacity(docs.len());
        let (mut n_positive, mut n_gated, mut n_rejected) = (0usize, 0usize, 0usize);

        for doc in docs {
            let result = match self.analyzer.analyze_document(doc) {
                Ok(r) => r,
                Err(e) => {
                    warn!("Skipping document {}: {}", events::document_id(doc).unwrap_or_default(), e);
                    n_rejected += 1;
                    continue;
                }
            };

            let is_positive = is_positive(doc);
            if is_positive { n_positive += 1; }

            let pct = result.suspicion_percentage;
            global.record(result.is_evaluated() && pct >= self.threshold, is_positive);

            if result.is_evaluated() {
                for factor in Factor::ALL {
                    let fired = result.details.score_contribution.get(factor) > 0.0;
                    per_factor.entry(factor).or_default().record(fired, is_positive);
                }
            } else {
                n_gated += 1;
            }

            let bin = ((pct / 10.0) as usize).min(9);
            score_bins[bin] += 1;
            scored.push((pct, is_positive));
        }

        let n_documents = scored.len();
        EvalResult {
            n_documents,
            n_positive,
            n_negative: n_documents - n_positive,
            n_gated,
            n_rejected,
            threshold: self.threshold,
            global,
            per_factor,
            score_histogram: score_bins.iter().enumerate()
                .map(|(i, &c)| (i as f64 * 10.0, c))
                .collect(),
            scored,
        }
    }
}

/// Non-null string label (or `true`) marks the positive class.
pub fn is_positive(doc: &Value) -> bool {
    match doc.get(LABEL_FIELD) {
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Bool(b)) => *b,
        _ => false,
    }
}
