// keysentry/src/engine/dispatcher.rs
//
// Persists analysis records to output JSONL files.
//   analysis_results.jsonl   — every analyzed document (status "success")
//   review_queue.jsonl       — results at or above the review threshold
//   rejected_documents.jsonl — documents refused as invalid input (status "error")
// Point an importer at these files to load them into the activity store.
//
// A document re-submitted with more key logs is queued for review again
// only when its score went up.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::events::SuspicionResult;
use crate::state::sequence::EventSequence;

pub const RESULTS_FILE:  &str = "analysis_results.jsonl";
pub const REVIEW_FILE:   &str = "review_queue.jsonl";
pub const REJECTED_FILE: &str = "rejected_documents.jsonl";

pub const EVENT_TYPE_KEY: &str = "key";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub document_id:       Option<String>,
    pub event_type:        String,
    pub status:            RecordStatus,
    pub response:          serde_json::Value,
    pub batch_fingerprint: Option<String>,
    pub created_at:        DateTime<Utc>,
}

impl AnalysisRecord {
    pub fn to_jsonl(&self) -> serde_json::Result<String> {
        serde_json::to_string(self).map(|s| s + "\n")
    }
}

/// Outcome of one dispatch: the persisted record and whether it also went
/// to the review queue.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub record: AnalysisRecord,
    pub queued: bool,
}

pub struct Dispatcher {
    out:              PathBuf,
    review_threshold: f64,
    queued:           DashMap<String, f64>, // document_id → last queued percentage
}

impl Dispatcher {
    pub fn new(output_dir: impl Into<PathBuf>, review_threshold: f64) -> Result<Self> {
        let out: PathBuf = output_dir.into();
        std::fs::create_dir_all(&out)
            .with_context(|| format!("creating output directory {}", out.display()))?;
        Ok(Self { out, review_threshold, queued: DashMap::new() })
    }

    pub fn output_dir(&self) -> &Path { &self.out }

    pub async fn dispatch(
        &self,
        document_id: Option<&str>,
        seq:         &EventSequence,
        result:      &SuspicionResult,
    ) -> Result<Dispatched> {
        let record = AnalysisRecord {
            document_id:       document_id.map(str::to_string),
            event_type:        EVENT_TYPE_KEY.to_string(),
            status:            RecordStatus::Success,
            response:          serde_json::to_value(result)?,
            batch_fingerprint: Some(seq.fingerprint()),
            created_at:        Utc::now(),
        };

        let line = record.to_jsonl()?;
        self.write(RESULTS_FILE, &line).await?;

        let queued = result.is_evaluated()
            && result.suspicion_percentage >= self.review_threshold
            && self.should_queue(document_id, result.suspicion_percentage);
        if queued {
            self.write(REVIEW_FILE, &line).await?;
            info!(
                "REVIEW document={} suspicion={:.2}%",
                document_id.unwrap_or("N/A"),
                result.suspicion_percentage
            );
        }

        Ok(Dispatched { record, queued })
    }

    pub async fn reject(&self, document_id: Option<&str>, reason: &str) -> Result<AnalysisRecord> {
        let record = AnalysisRecord {
            document_id:       document_id.map(str::to_string),
            event_type:        EVENT_TYPE_KEY.to_string(),
            status:            RecordStatus::Error,
            response:          serde_json::json!({ "error": reason }),
            batch_fingerprint: None,
            created_at:        Utc::now(),
        };
        self.write(REJECTED_FILE, &record.to_jsonl()?).await?;
        Ok(record)
    }

    /// Compare and record under the entry's shard lock, so concurrent
    /// results for one document cannot both pass.
    fn should_queue(&self, document_id: Option<&str>, pct: f64) -> bool {
        let Some(id) = document_id else { return true };
        match self.queued.entry(id.to_string()) {
            Entry::Occupied(mut e) => {
                if *e.get() >= pct { return false; }
                e.insert(pct);
                true
            }
            Entry::Vacant(e) => {
                e.insert(pct);
                true
            }
        }
    }

    async fn write(&self, file: &str, content: &str) -> Result<()> {
        let mut f = OpenOptions::new().create(true).append(true)
            .open(self.out.join(file)).await?;
        f.write_all(content.as_bytes()).await?;
        f.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Details, KeyEvent};

    fn result(pct: f64) -> SuspicionResult {
        SuspicionResult { suspicion_percentage: pct, details: Details::default(), error: None }
    }

    fn seq() -> EventSequence {
        EventSequence { events: vec![KeyEvent::new("a", 1.0)], received: 1, skipped: 0 }
    }

    fn lines(dir: &Path, file: &str) -> Vec<String> {
        std::fs::read_to_string(dir.join(file))
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn writes_every_result_and_queues_high_scores() {
        let dir = tempfile::tempdir().unwrap();
        let d = Dispatcher::new(dir.path(), 50.0).unwrap();

        let low  = d.dispatch(Some("low"), &seq(), &result(10.0)).await.unwrap();
        let high = d.dispatch(Some("high"), &seq(), &result(80.0)).await.unwrap();
        assert!(!low.queued);
        assert!(high.queued);

        let rec = high.record;
        assert_eq!(rec.status, RecordStatus::Success);
        assert_eq!(rec.event_type, "key");
        assert_eq!(rec.batch_fingerprint.as_deref(), Some(seq().fingerprint().as_str()));
        assert_eq!(lines(dir.path(), RESULTS_FILE).len(), 2);

        let review = lines(dir.path(), REVIEW_FILE);
        assert_eq!(review.len(), 1);
        let v: serde_json::Value = serde_json::from_str(&review[0]).unwrap();
        assert_eq!(v["document_id"], "high");
        assert_eq!(v["response"]["suspicious_percentage"], 80.0);
    }

    #[tokio::test]
    async fn requeues_only_on_higher_score() {
        let dir = tempfile::tempdir().unwrap();
        let d = Dispatcher::new(dir.path(), 50.0).unwrap();

        assert!(d.dispatch(Some("doc"), &seq(), &result(60.0)).await.unwrap().queued);
        assert!(!d.dispatch(Some("doc"), &seq(), &result(60.0)).await.unwrap().queued);
        assert!(d.dispatch(Some("doc"), &seq(), &result(75.0)).await.unwrap().queued);

        assert_eq!(lines(dir.path(), RESULTS_FILE).len(), 3);
        assert_eq!(lines(dir.path(), REVIEW_FILE).len(), 2);
    }

    #[tokio::test]
    async fn gated_results_are_never_queued() {
        let dir = tempfile::tempdir().unwrap();
        let d = Dispatcher::new(dir.path(), 0.0).unwrap();
        let gated = SuspicionResult { error: Some("Not enough key logs".into()), ..result(0.0) };
        d.dispatch(Some("short"), &seq(), &gated).await.unwrap();
        assert!(lines(dir.path(), REVIEW_FILE).is_empty());
    }

    #[tokio::test]
    async fn rejected_documents_get_error_status() {
        let dir = tempfile::tempdir().unwrap();
        let d = Dispatcher::new(dir.path(), 50.0).unwrap();
        let rec = d.reject(Some("bad"), "invalid input: missing `keyLogs` field").await.unwrap();
        assert_eq!(rec.status, RecordStatus::Error);
        let rejected = lines(dir.path(), REJECTED_FILE);
        assert_eq!(rejected.len(), 1);
        assert!(rejected[0].contains("\"status\":\"error\""));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_results_for_one_document_queue_once() {
        let dir = tempfile::tempdir().unwrap();
        let d = std::sync::Arc::new(Dispatcher::new(dir.path(), 50.0).unwrap());

        let race = |a: f64, b: f64| {
            let d = d.clone();
            async move {
                d.queued.clear();
                let barrier = std::sync::Arc::new(tokio::sync::Barrier::new(2));
                let spawn = |pct: f64| {
                    let (d, barrier) = (d.clone(), barrier.clone());
                    tokio::spawn(async move {
                        barrier.wait().await;
                        d.should_queue(Some("doc"), pct)
                    })
                };
                let (ta, tb) = (spawn(a), spawn(b));
                (ta.await.unwrap(), tb.await.unwrap())
            }
        };

        for _ in 0..200 {
            // equal scores: exactly one wins
            let (a, b) = race(70.0, 70.0).await;
            assert!(a ^ b);

            // the higher score always lands and is what stays recorded
            let (hi, _) = race(80.0, 60.0).await;
            assert!(hi);
            assert_eq!(*d.queued.get("doc").unwrap(), 80.0);
        }
    }

    #[tokio::test]
    async fn records_are_complete_lines_on_disk_when_dispatch_returns() {
        let dir = tempfile::tempdir().unwrap();
        let d = Dispatcher::new(dir.path(), 50.0).unwrap();
        for i in 0..20 {
            let id = format!("doc-{i}");
            d.dispatch(Some(&id), &seq(), &result(90.0)).await.unwrap();
            let review = lines(dir.path(), REVIEW_FILE);
            assert_eq!(review.len(), i + 1);
            assert!(review.iter().all(|l| serde_json::from_str::<serde_json::Value>(l).is_ok()));
        }
    }

    #[test]
    fn jsonl_record_is_one_terminated_line() {
        let rec = AnalysisRecord {
            document_id:       None,
            event_type:        EVENT_TYPE_KEY.to_string(),
            status:            RecordStatus::Success,
            response:          serde_json::json!({}),
            batch_fingerprint: None,
            created_at:        Utc::now(),
        };
        let line = rec.to_jsonl().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }
}
