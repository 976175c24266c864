// keysentry/src/eval/report.rs
//
// ROC AUC and markdown/JSON report output for the eval framework.

use std::fmt::Write;

use super::EvalResult;

/// Exact ROC AUC via the rank-sum (Mann–Whitney U) statistic over the
/// per-document scores. Tied scores get their average rank. Returns 0.5
/// when either class is empty.
pub fn auc_roc(result: &EvalResult) -> f64 {
    let mut scored = result.scored.clone();
    let n_pos = scored.iter().filter(|(_, p)| *p).count();
    let n_neg = scored.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return 0.5;
    }

    scored.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut pos_rank_sum = 0.0f64;
    let mut i = 0;
    while i < scored.len() {
        let mut j = i;
        while j + 1 < scored.len() && scored[j + 1].0 == scored[i].0 {
            j += 1;
        }
        // ranks are 1-based: i+1 ..= j+1
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        let pos_in_tie = scored[i..=j].iter().filter(|(_, p)| *p).count();
        pos_rank_sum += avg_rank * pos_in_tie as f64;
        i = j + 1;
    }

    let n_pos = n_pos as f64;
    let u = pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0;
    u / (n_pos * n_neg as f64)
}

/// Print the markdown report to stdout.
pub fn print_markdown(result: &EvalResult) {
    print!("{}", render_markdown(result));
}

/// One summary table (counts, metrics, AUC), then per-factor performance
/// and the score histogram.
pub fn render_markdown(result: &EvalResult) -> String {
    let mut out = String::new();
    let g = &result.global;

    let _ = writeln!(out, "# KeySentry Evaluation Report\n");
    let _ = writeln!(out, "| Metric       | Value   |");
    let _ = writeln!(out, "|--------------|---------|");
    let _ = writeln!(out, "| Documents    | {}      |", result.n_documents);
    let _ = writeln!(out, "| Positive     | {}      |", result.n_positive);
    let _ = writeln!(out, "| Negative     | {}      |", result.n_negative);
    let _ = writeln!(out, "| Gated        | {}      |", result.n_gated);
    let _ = writeln!(out, "| Rejected     | {}      |", result.n_rejected);
    let _ = writeln!(out, "| Threshold    | {:.2}   |", result.threshold);
    let _ = writeln!(out, "| Precision    | {:.4}   |", g.precision());
    let _ = writeln!(out, "| Recall       | {:.4}   |", g.recall());
    let _ = writeln!(out, "| F1           | {:.4}   |", g.f1());
    let _ = writeln!(out, "| FPR          | {:.4}   |", g.fpr());
    let _ = writeln!(out, "| AUC-ROC      | {:.4}   |", auc_roc(result));

    let _ = writeln!(out, "\n## Per-Factor Performance\n");
    let _ = writeln!(out, "| Factor | P | R | F1 | FPR |");
    let _ = writeln!(out, "|--------|---|---|----|-----|");
    let mut factors: Vec<_> = result.per_factor.iter().collect();
    factors.sort_by(|a, b| b.1.f1().total_cmp(&a.1.f1()).then(a.0.cmp(b.0)));
    for (factor, m) in factors {
        let _ = writeln!(out, "| {:20} | {:.3} | {:.3} | {:.3} | {:.4} |",
            factor, m.precision(), m.recall(), m.f1(), m.fpr());
    }

    let _ = writeln!(out, "\n## Score Distribution\n");
    let total = result.scored.len().max(1) as f64;
    for (lower, count) in &result.score_histogram {
        let bar = "#".repeat((*count as f64 / total * 80.0) as usize);
        let _ = writeln!(out, "{:5.1}–{:5.1} | {:5} | {}", lower, lower + 10.0, count, bar);
    }
    out
}

/// Serialize the evaluation result to JSON for downstream consumption.
pub fn to_json(result: &EvalResult) -> String {
    let per_factor: serde_json::Map<String, serde_json::Value> = result
        .per_factor
        .iter()
        .map(|(factor, m)| {
            (
                factor.to_string(),
                serde_json::json!({
                    "precision": m.precision(),
                    "recall":    m.recall(),
                    "f1":        m.f1(),
                    "fpr":       m.fpr(),
                }),
            )
        })
        .collect();

    serde_json::json!({
        "n_documents": result.n_documents,
        "n_positive":  result.n_positive,
        "n_negative":  result.n_negative,
        "n_gated":     result.n_gated,
        "n_rejected":  result.n_rejected,
        "threshold":   result.threshold,
        "precision":   result.global.precision(),
        "recall":      result.global.recall(),
        "f1":          result.global.f1(),
        "fpr":         result.global.fpr(),
        "auc_roc":     auc_roc(result),
        "per_factor":  per_factor,
    })
    .to_string()
}
