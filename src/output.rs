use crate::models::{ComparisonRecord, EvaluationResult, FinalResults, HybridResult, Statistics};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    Plain,
    Json,
}

/// Print a comparison run in the specified format
pub fn print_results(results: &FinalResults, format: OutputFormat) {
    match format {
        OutputFormat::Plain => print!("{}", render_results(results)),
        OutputFormat::Json => print_json(results),
    }
}

/// Print a single analyzed answer
pub fn print_record(record: &ComparisonRecord, format: OutputFormat) {
    match format {
        OutputFormat::Plain => print!("{}", render_record(record)),
        OutputFormat::Json => print_json(record),
    }
}

pub fn print_evaluation(evaluation: &EvaluationResult, format: OutputFormat) {
    match format {
        OutputFormat::Plain => print!("{}", render_evaluation(evaluation)),
        OutputFormat::Json => print_json(evaluation),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing results to JSON: {}", e),
    }
}

fn render_results(results: &FinalResults) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Comparison Summary ===");
    let _ = writeln!(out, "Total messages tested: {}", results.total_messages);
    let _ = writeln!(out, "Total queries tested: {}", results.total_queries);
    let _ = writeln!(
        out,
        "Best performing method: {}",
        results.best_method.as_deref().unwrap_or("No valid responses")
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "📊 STATISTICS");
    let _ = writeln!(out, "-------------");
    for summary in &results.summaries {
        let _ = writeln!(
            out,
            "{} - {} ({} responses, {} failures)",
            summary.model, summary.method, summary.responses, summary.failures
        );
        out.push_str(&render_statistics(&summary.statistics));
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "📝 DETAILED RESULTS");
    let _ = writeln!(out, "-------------------");
    for (i, record) in results.records.iter().enumerate() {
        let _ = writeln!(out, "Result #{}", i + 1);
        out.push_str(&render_record(record));
        let _ = writeln!(out);
    }

    out
}

fn render_statistics(stats: &Statistics) -> String {
    let mut out = String::new();
    if stats.mean.is_empty() {
        let _ = writeln!(out, "No statistics available.");
        return out;
    }

    let _ = writeln!(
        out,
        "{:<20} {:<8} {:<8} {:<8}",
        "Metric", "Mean", "Median", "Mode"
    );
    let _ = writeln!(out, "{}", "-".repeat(47));

    for (metric, mean) in &stats.mean {
        let median = stats.median.get(metric).unwrap_or(&0.0);
        let mode = stats.mode.get(metric).unwrap_or(&0.0);
        let _ = writeln!(
            out,
            "{:<20} {:<8.3} {:<8.3} {:<8.3}",
            metric, mean, median, mode
        );
    }
    out
}

fn render_record(record: &ComparisonRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Message: {} ({})",
        record.message_id, record.message_type
    );
    let _ = writeln!(out, "Category: {} / {}", record.category, record.query_name);
    let _ = writeln!(out, "Query: {}", record.query);
    let _ = writeln!(out, "Model: {}  Method: {}", record.model, record.method);

    match (&record.response, &record.error) {
        (Some(response), _) => {
            let _ = writeln!(out, "Response: {}", response);
        }
        (None, Some(error)) => {
            let _ = writeln!(out, "Error: {}", error);
        }
        (None, None) => {
            let _ = writeln!(out, "Response: <none>");
        }
    }

    if let Some(hybrid) = &record.hybrid {
        out.push_str(&render_hybrid(hybrid));
    }
    if let Some(evaluation) = &record.evaluation {
        out.push_str(&render_evaluation(evaluation));
    }
    out
}

fn render_hybrid(hybrid: &HybridResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Selected method: {}", hybrid.selected_method);
    let _ = writeln!(out, "{:<12} {:<8} {:<10}", "Method", "Weight", "Confidence");
    for (method, weight) in &hybrid.method_weights {
        let confidence = hybrid.confidence_scores.get(method).unwrap_or(&0.0);
        let _ = writeln!(out, "{:<12} {:<8.3} {:<10.3}", method, weight, confidence);
    }
    for (method, error) in &hybrid.failures {
        let _ = writeln!(out, "{:<12} failed: {}", method, error);
    }
    out
}

fn render_evaluation(evaluation: &EvaluationResult) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Evaluation ({:?}): overall {:.3}",
        evaluation.status, evaluation.overall
    );
    for (metric, score) in &evaluation.scores {
        let _ = writeln!(out, "  • {}: {:.3}", metric, score);
    }
    let _ = writeln!(
        out,
        "  sentences: {}, words: {}, avg sentence length: {:.1}",
        evaluation.metrics.sentence_count,
        evaluation.metrics.word_count,
        evaluation.metrics.avg_sentence_length
    );
    if evaluation.improvement_areas.is_empty() {
        let _ = writeln!(out, "Improvement areas: None");
    } else {
        let _ = writeln!(
            out,
            "Improvement areas: {}",
            evaluation.improvement_areas.join(", ")
        );
    }
    out
}
