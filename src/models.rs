use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::schema::MessageType;

/// Flat view of one ISO 20022 document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedMessage {
    pub message_type: MessageType,
    /// Field name to extracted text value
    pub fields: BTreeMap<String, String>,
    /// Statement entries (camt.053 only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transactions: Vec<StatementEntry>,
}

/// One `Ntry` of a bank statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementEntry {
    pub amount: String,
    pub currency: String,
    pub credit_debit: String,
    pub status: String,
    pub booking_date: String,
}

impl ParsedMessage {
    pub fn new(message_type: MessageType) -> Self {
        Self {
            message_type,
            fields: BTreeMap::new(),
            transactions: Vec::new(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Field value or "N/A" for prompt rendering
    pub fn get_or_na(&self, field: &str) -> &str {
        self.get(field).unwrap_or("N/A")
    }

    pub fn insert(&mut self, field: &str, value: impl Into<String>) {
        self.fields.insert(field.to_string(), value.into());
    }

    pub fn message_id(&self) -> &str {
        self.get_or_na("message_id")
    }

    /// Fields in schema order, skipping the ones that were not present
    pub fn ordered_fields(&self) -> Vec<(&'static str, &str)> {
        self.message_type
            .schema()
            .fields
            .iter()
            .filter_map(|field| self.get(field).map(|value| (*field, value)))
            .collect()
    }

    /// Monetary values carried by the message (header amounts and statement entries)
    pub fn amounts(&self) -> Vec<f64> {
        let schema = self.message_type.schema();
        schema
            .amount_fields
            .iter()
            .filter_map(|field| self.get(field))
            .chain(self.transactions.iter().map(|entry| entry.amount.as_str()))
            .filter_map(|value| value.trim().replace(',', "").parse::<f64>().ok())
            .collect()
    }

    /// Currency codes carried by the message, deduplicated
    pub fn currencies(&self) -> Vec<String> {
        let schema = self.message_type.schema();
        let mut codes: Vec<String> = schema
            .currency_fields
            .iter()
            .filter_map(|field| self.get(field))
            .chain(self.transactions.iter().map(|entry| entry.currency.as_str()))
            .map(|code| code.trim().to_uppercase())
            .filter(|code| !code.is_empty())
            .collect();
        codes.sort();
        codes.dedup();
        codes
    }

    /// Render the fields as `name: value` lines for prompts
    pub fn render_fields(&self) -> String {
        self.ordered_fields()
            .into_iter()
            .map(|(field, value)| format!("{field}: {value}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Output of one strategy for one query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyResponse {
    pub strategy_name: String,
    pub response_text: String,
    pub confidence_score: f64,
}

/// Combined output of the hybrid strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridResult {
    pub response_text: String,
    pub selected_method: String,
    /// Final blended weights, summing to 1
    pub method_weights: BTreeMap<String, f64>,
    pub confidence_scores: BTreeMap<String, f64>,
    pub weighted_scores: BTreeMap<String, f64>,
    /// Text produced by every strategy that succeeded
    pub responses: BTreeMap<String, String>,
    /// Strategies that failed and were left out of the blend
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failures: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationStatus {
    Success,
    /// Empty or whitespace-only response
    Empty,
}

/// Text statistics gathered while scoring
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextMetrics {
    pub sentence_count: usize,
    pub word_count: usize,
    pub avg_sentence_length: f64,
}

/// Heuristic evaluation of one response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub status: EvaluationStatus,
    pub message_type: MessageType,
    /// Metric name to score in [0, 1]
    pub scores: BTreeMap<String, f64>,
    /// Weighted average of `scores`
    pub overall: f64,
    pub metrics: TextMetrics,
    pub improvement_areas: Vec<String>,
}

/// One (message, query, model, method) cell of a comparison run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonRecord {
    pub message_id: String,
    pub message_type: MessageType,
    pub category: String,
    pub query_name: String,
    pub query: String,
    pub model: String,
    pub method: String,
    pub response: Option<String>,
    pub error: Option<String>,
    pub evaluation: Option<EvaluationResult>,
    /// Blend details when `method` is hybrid
    pub hybrid: Option<HybridResult>,
}

/// Statistics calculated across multiple results
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Statistics {
    /// Mean scores for each metric
    pub mean: BTreeMap<String, f64>,
    /// Median scores for each metric
    pub median: BTreeMap<String, f64>,
    /// Mode scores for each metric (most frequent score)
    pub mode: BTreeMap<String, f64>,
}

/// Aggregate for one model and method
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodSummary {
    pub model: String,
    pub method: String,
    pub responses: usize,
    pub failures: usize,
    pub statistics: Statistics,
}

/// Final results of a comparison run
#[derive(Debug, Serialize, Deserialize)]
pub struct FinalResults {
    pub total_messages: usize,
    pub total_queries: usize,
    /// "model - method" with the best mean overall score
    pub best_method: Option<String>,
    pub summaries: Vec<MethodSummary>,
    pub records: Vec<ComparisonRecord>,
}
