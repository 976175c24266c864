// keysentry/src/main.rs
//
// KeySentry — keystroke timing suspicion engine for academic-integrity monitoring
//
// Four operational modes:
//   analyze — score one activity document (file, or `-` for stdin) and print JSON
//   tail    — tail a JSONL feed of activity documents, score and dispatch each
//   batch   — score a static JSONL file once, dispatch, print a summary
//   eval    — labeled dataset evaluation (precision / recall / AUC)
//
// Usage:
//   keysentry --mode analyze --path activity.json
//   keysentry --mode tail  --path /var/log/activity/keylogs.jsonl --output /var/lib/keysentry
//   keysentry --mode batch --path export.jsonl --config thresholds.json
//   keysentry --mode eval  --path labeled.jsonl --review-threshold 40

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use keysentry::engine::dispatcher::Dispatcher;
use keysentry::eval::{report, Evaluator};
use keysentry::{events, Analyzer, Config, EventSequence, SuspicionResult};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name    = "keysentry",
    about   = "Keystroke timing suspicion engine for academic-integrity monitoring",
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    #[arg(long, value_enum, default_value = "analyze")]
    mode: Mode,

    #[arg(long, default_value = "-",
          help = "Activity document (analyze) or JSONL feed (tail/batch/eval); `-` reads stdin")]
    path: PathBuf,

    #[arg(long, help = "JSON file overriding engine thresholds and weights")]
    config: Option<PathBuf>,

    #[arg(long, default_value = "/tmp/keysentry_output",
          help = "Analysis record output directory")]
    output: PathBuf,

    #[arg(long, default_value = "50.0",
          help = "Suspicion percentage at which a document is queued for review")]
    review_threshold: f64,

    #[arg(long, help = "Print the eval summary as JSON instead of markdown")]
    json: bool,
}

#[derive(Clone, ValueEnum)]
enum Mode {
    Analyze, // one document → stdout
    Tail,    // follow a live JSONL feed
    Batch,   // process a static JSONL file once
    Eval,    // labeled dataset evaluation
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

struct Pipeline {
    analyzer:   Arc<Analyzer>,
    dispatcher: Arc<Dispatcher>,
    processed:  AtomicU64,
    flagged:    AtomicU64,
    rejected:   AtomicU64,
}

impl Pipeline {
    fn new(analyzer: Analyzer, output: PathBuf, threshold: f64) -> Result<Self> {
        Ok(Self {
            analyzer:   Arc::new(analyzer),
            dispatcher: Arc::new(Dispatcher::new(output, threshold)?),
            processed:  AtomicU64::new(0),
            flagged:    AtomicU64::new(0),
            rejected:   AtomicU64::new(0),
        })
    }

    async fn process(&self, doc: Value) {
        let doc_id = events::document_id(&doc);
        let label  = doc_id.as_deref().unwrap_or("N/A");

        let logs = match events::key_logs(&doc) {
            Ok(logs) => logs,
            Err(e) => {
                warn!("Rejected document {}: {}", label, e);
                self.rejected.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = self.dispatcher.reject(doc_id.as_deref(), &e.to_string()).await {
                    error!("Dispatch failed: {}", e);
                }
                return;
            }
        };

        let seq    = EventSequence::normalize(&logs);
        let result = self.analyzer.analyze_sequence(&seq);
        self.processed.fetch_add(1, Ordering::Relaxed);
        info!("Analysis complete for doc ID {}. Suspicion: {}%", label, result.suspicion_percentage);

        match self.dispatcher.dispatch(doc_id.as_deref(), &seq, &result).await {
            Ok(dispatched) => {
                if dispatched.queued {
                    self.flagged.fetch_add(1, Ordering::Relaxed);
                    print_alert(label, &result);
                }
            }
            Err(e) => error!("Dispatch failed: {}", e),
        }
    }

    fn print_summary(&self) {
        println!(
            "\n\x1b[1m── summary  processed={}  flagged={}  rejected={}  output={} ──\x1b[0m",
            self.processed.load(Ordering::Relaxed),
            self.flagged.load(Ordering::Relaxed),
            self.rejected.load(Ordering::Relaxed),
            self.dispatcher.output_dir().display(),
        );
    }
}

// ── Terminal output ───────────────────────────────────────────────────────────

fn print_alert(doc_id: &str, result: &SuspicionResult) {
    let pct   = result.suspicion_percentage;
    let color = if pct >= 75.0 { "\x1b[91;1m" } else if pct >= 50.0 { "\x1b[93;1m" } else { "\x1b[96m" };
    let reset = "\x1b[0m";
    let d     = &result.details;
    let c     = &d.score_contribution;

    println!("\n{}REVIEW {:.2}%{}", color, pct, reset);
    println!("  Document : {}{}{}", color, doc_id, reset);
    println!("  Pastes   : {} ({} chained)  bursts={}", d.rapid_paste_ctrl_v_count,
             d.multiple_rapid_paste_sequences, d.paste_burst_count);
    println!("  Cadence  : fast={:.2}  long_gap={:.2}", d.fast_typing_fraction, d.long_gap_fraction);
    println!("  Scores   : paste={:.1} multi={:.1} fast={:.1} gaps={:.1}",
             c.rapid_paste, c.multiple_rapid_paste, c.fast_typing, c.long_gaps);
}

// ── Event sources ─────────────────────────────────────────────────────────────

async fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        tokio::io::stdin().read_to_string(&mut buf).await?;
        Ok(buf)
    } else {
        tokio::fs::read_to_string(path).await
            .with_context(|| format!("reading {}", path.display()))
    }
}

fn parse_line(line: &str) -> Option<Value> {
    let line = line.trim();
    if line.is_empty() { return None; }
    match serde_json::from_str::<Value>(line) {
        Ok(doc) => Some(doc),
        Err(e)  => { warn!("Parse error: {}", e); None }
    }
}

async fn tail_jsonl(path: PathBuf, tx: mpsc::Sender<Value>, seek_end: bool) -> Result<()> {
    let file   = tokio::fs::File::open(&path).await
        .with_context(|| format!("opening {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();

    if seek_end {
        while lines.next_line().await?.is_some() {}  // consume existing
    }

    info!("Tailing {}", path.display());
    loop {
        match lines.next_line().await? {
            Some(line) => {
                if let Some(doc) = parse_line(&line) {
                    if tx.send(doc).await.is_err() { break; }
                }
            }
            None => tokio::time::sleep(tokio::time::Duration::from_millis(50)).await,
        }
    }
    Ok(())
}

async fn batch_jsonl(path: PathBuf, tx: mpsc::Sender<Value>) -> Result<()> {
    let content = read_input(&path).await?;
    for line in content.lines() {
        if let Some(doc) = parse_line(line) {
            if tx.send(doc).await.is_err() { break; }
        }
    }
    Ok(())
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env()
            .add_directive("keysentry=info".parse()?))
        .with_writer(std::io::stderr)
        .compact().init();

    let cli    = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };
    let analyzer = Analyzer::new(config)?;
    info!("Analyzer initialized with config: {:?}", analyzer.config());

    match cli.mode {
        Mode::Analyze => {
            let raw    = read_input(&cli.path).await?;
            let doc: Value = serde_json::from_str(&raw).context("document is not valid JSON")?;
            let result = analyzer.analyze_document(&doc)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Mode::Eval => {
            let evaluator = Evaluator::new(analyzer, cli.review_threshold);
            let result    = evaluator.run_dataset(&cli.path).await?;
            if cli.json {
                println!("{}", report::to_json(&result));
            } else {
                report::print_markdown(&result);
            }
        }

        Mode::Tail | Mode::Batch => {
            let pipeline = Arc::new(Pipeline::new(analyzer, cli.output.clone(), cli.review_threshold)?);
            let (tx, mut rx) = mpsc::channel::<Value>(1024);

            let path   = cli.path.clone();
            let source = match cli.mode {
                Mode::Tail => {
                    println!("  Mode: \x1b[96mTAIL\x1b[0m  |  {}", path.display());
                    println!("  Output: \x1b[90m{}\x1b[0m\n", cli.output.display());
                    tokio::spawn(async move { tail_jsonl(path, tx, true).await })
                }
                _ => {
                    println!("  Mode: \x1b[93mBATCH\x1b[0m  |  {}", path.display());
                    println!("  Output: \x1b[90m{}\x1b[0m\n", cli.output.display());
                    tokio::spawn(async move { batch_jsonl(path, tx).await })
                }
            };

            // One task per document; the engine is stateless so tasks share the analyzer.
            let mut tasks = Vec::new();
            while let Some(doc) = rx.recv().await {
                let p = Arc::clone(&pipeline);
                tasks.retain(|t: &tokio::task::JoinHandle<()>| !t.is_finished());
                tasks.push(tokio::spawn(async move { p.process(doc).await }));
            }
            for t in tasks {
                if let Err(e) = t.await { error!("Worker task failed: {}", e); }
            }
            source.await??;
            pipeline.print_summary();
        }
    }

    Ok(())
}
