//! Prompt-construction strategies.
//!
//! Each strategy turns a parsed message and an optional question into a
//! prompt and hands it to a [`LanguageModel`]. Strategies differ only in how
//! the prompt is assembled.

use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::error::RagResult;
use crate::llm::LanguageModel;
use crate::models::ParsedMessage;
use crate::schema::{MessageType, status_description};

pub const SIMPLE: &str = "simple";
pub const CONTEXT: &str = "context";
pub const RERANKER: &str = "reranker";
/// Name of the blended method; not a registry entry
pub const HYBRID: &str = "hybrid";

const DEFAULT_TOP_K: usize = 3;

#[async_trait]
pub trait RagStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn build_prompt(&self, message: &ParsedMessage, query: Option<&str>) -> String;

    /// Build the prompt and make a single LLM call
    async fn produce(
        &self,
        message: &ParsedMessage,
        query: Option<&str>,
        model: &str,
        llm: &dyn LanguageModel,
    ) -> RagResult<String> {
        let prompt = self.build_prompt(message, query);
        llm.complete(&prompt, model).await
    }
}

/// Treat blank queries as "summarize"
fn effective_query(query: Option<&str>) -> Option<&str> {
    query.map(str::trim).filter(|q| !q.is_empty())
}

/// Direct field substitution into a per-type summary template
pub struct SimpleRag;

impl SimpleRag {
    fn summary(message: &ParsedMessage) -> String {
        let f = |field: &str| message.get_or_na(field).to_string();
        match message.message_type {
            MessageType::Pacs008 => format!(
                "Payment of {} {} was made on {} from {} to {}.",
                f("amount"),
                f("currency"),
                f("created_at"),
                f("debtor_name"),
                f("creditor_name")
            ),
            MessageType::Pacs002 => format!(
                "Status report for message {}: {} at {}.",
                f("original_message_id"),
                f("group_status"),
                f("created_at")
            ),
            MessageType::Camt053 => format!(
                "Statement {} with balance {} {} at {}.",
                f("statement_id"),
                f("balance_amount"),
                f("balance_currency"),
                f("created_at")
            ),
            MessageType::Pain001 => format!(
                "Payment initiation from {} to {} for {} {} on {}.",
                f("debtor_name"),
                f("creditor_name"),
                f("amount"),
                f("currency"),
                f("created_at")
            ),
        }
    }
}

impl RagStrategy for SimpleRag {
    fn name(&self) -> &'static str {
        SIMPLE
    }

    fn build_prompt(&self, message: &ParsedMessage, query: Option<&str>) -> String {
        let schema = message.message_type.schema();
        let key_fields = schema.key_elements.join(", ");
        let data = message.render_fields();

        match effective_query(query) {
            Some(query) => format!(
                "Analyze this ISO 20022 financial message to answer: {query}\n\n\
                 Message Type: {} ({})\n\
                 Key Fields: {key_fields}\n\
                 Message Data:\n{data}\n\n\
                 Provide a clear, business-friendly response focusing on the specific query.",
                schema.description, schema.name
            ),
            None => format!(
                "Generate a summary for this ISO 20022 financial message:\n\n\
                 Message Type: {} ({})\n\
                 Key Fields: {key_fields}\n\
                 Summary: {}\n\
                 Message Data:\n{data}\n\n\
                 Provide a clear, business-friendly summary.",
                schema.description,
                schema.name,
                Self::summary(message)
            ),
        }
    }
}

/// Business key points and compliance checks for one message
pub struct MessageContext {
    pub description: &'static str,
    pub key_points: Vec<(&'static str, String)>,
    pub compliance: &'static [&'static str],
    pub regulatory: &'static str,
}

/// Static regulatory and business context keyed by message type
pub fn message_context(message: &ParsedMessage) -> MessageContext {
    let f = |field: &str| message.get_or_na(field);
    let date = ("date", format!("Date: {}", f("created_at")));

    match message.message_type {
        MessageType::Pacs008 => MessageContext {
            description: "Customer credit transfer",
            key_points: vec![
                (
                    "transaction_details",
                    format!("Transfer amount: {} {}", f("amount"), f("currency")),
                ),
                (
                    "party_information",
                    format!(
                        "From: {} (Bank: {}) To: {} (Bank: {})",
                        f("debtor_name"),
                        f("debtor_bank"),
                        f("creditor_name"),
                        f("creditor_bank")
                    ),
                ),
                (
                    "banking_details",
                    format!(
                        "Banks: {} -> {}, charges: {}",
                        f("debtor_bank"),
                        f("creditor_bank"),
                        f("charge_bearer")
                    ),
                ),
                date,
            ],
            compliance: &[
                "Verify sender and receiver details",
                "Check for valid bank identifiers",
                "Ensure positive amount in valid currency",
            ],
            regulatory: "Interbank credit transfers are subject to AML and sanctions screening of both parties and to the travel rule for originator and beneficiary data.",
        },
        MessageType::Pacs002 => MessageContext {
            description: "Payment status report",
            key_points: vec![
                (
                    "status",
                    format!(
                        "Status: {} ({})",
                        f("group_status"),
                        status_description(f("group_status")).unwrap_or("unknown code")
                    ),
                ),
                (
                    "reference",
                    format!(
                        "Original message: {} ({})",
                        f("original_message_id"),
                        f("original_message_type")
                    ),
                ),
                date,
            ],
            compliance: &[
                "Valid status code",
                "Reference to original message",
                "Proper status reason if rejected",
            ],
            regulatory: "Status reports must reference the original instruction so that rejections and returns can be reconciled and audited.",
        },
        MessageType::Camt053 => {
            let mut key_points = vec![
                ("balance", format!("Balance: {} {}", f("balance_amount"), f("balance_currency"))),
                ("account", format!("Account: {}", f("account_id"))),
                ("metadata", format!("Statement ID: {}", f("statement_id"))),
                date,
            ];
            for (index, entry) in message.transactions.iter().enumerate() {
                key_points.push((
                    "transaction",
                    format!(
                        "Transaction {}: {} {} ({}, {}) booked {}",
                        index + 1,
                        entry.amount,
                        entry.currency,
                        entry.credit_debit,
                        entry.status,
                        entry.booking_date
                    ),
                ));
            }
            MessageContext {
                description: "Bank statement",
                key_points,
                compliance: &[
                    "Valid account identifier",
                    "Balance calculation accuracy",
                    "Transaction details completeness",
                ],
                regulatory: "Statements feed reconciliation and audit reporting; balances must match booked entries.",
            }
        }
        MessageType::Pain001 => MessageContext {
            description: "Payment initiation",
            key_points: vec![
                (
                    "transaction_details",
                    format!("Amount: {} {}", f("amount"), f("currency")),
                ),
                ("party_information", format!("Initiator: {}", f("initiator_name"))),
                (
                    "debtor_details",
                    format!("From: {} ({})", f("debtor_name"), f("debtor_account")),
                ),
                (
                    "creditor_details",
                    format!("To: {} ({})", f("creditor_name"), f("creditor_account")),
                ),
                (
                    "execution",
                    format!(
                        "Method: {}, requested execution: {}",
                        f("payment_method"),
                        f("execution_date")
                    ),
                ),
                date,
            ],
            compliance: &[
                "Valid account numbers",
                "Authorized initiator",
                "Sufficient funds check",
            ],
            regulatory: "Customer-initiated payments require authorization controls and validation of debtor and creditor accounts before execution.",
        },
    }
}

/// Prompt enriched with the static business and regulatory context
pub struct ContextEnrichedRag;

impl RagStrategy for ContextEnrichedRag {
    fn name(&self) -> &'static str {
        CONTEXT
    }

    fn build_prompt(&self, message: &ParsedMessage, query: Option<&str>) -> String {
        let context = message_context(message);
        let key_points = bullet_list(context.key_points.iter().map(|(_, point)| point.as_str()));
        let compliance = bullet_list(context.compliance.iter().copied());

        match effective_query(query) {
            Some(query) => format!(
                "Question about this {} message: {query}\n\n\
                 Key Information:\n{key_points}\n\n\
                 Compliance Checks:\n{compliance}\n\n\
                 Regulatory Context: {}\n\n\
                 Please provide a clear, concise response focusing on the question.\n\
                 Keep the language business-friendly and avoid technical jargon.\n\
                 Limit the response to 2-3 sentences unless more detail is specifically requested.",
                context.description, context.regulatory
            ),
            None => format!(
                "Summarize this {} message:\n\n\
                 Key Information:\n{key_points}\n\n\
                 Compliance Checks:\n{compliance}\n\n\
                 Please provide a clear, concise summary in 2-3 sentences.\n\
                 Focus on the key business information and impact.\n\
                 Use business-friendly language and avoid technical details unless crucial.",
                context.description
            ),
        }
    }
}

fn bullet_list<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items
        .map(|item| format!("• {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A labeled piece of the enriched context
#[derive(Debug, Clone, PartialEq)]
pub struct ContextChunk {
    pub label: &'static str,
    pub content: String,
}

/// A chunk with its keyword-overlap score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: ContextChunk,
    pub score: usize,
}

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "this", "that", "what", "are", "with", "how", "which", "who", "why",
    "does", "was", "were", "its", "into", "from", "any", "all", "about", "there", "apply",
];

/// Lower-cased distinct terms of at least three characters
fn terms(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|term| term.chars().count() >= 3 && !STOP_WORDS.contains(&term.as_str()))
        .collect()
}

/// Split the enriched context into labeled chunks, most important first
pub fn context_chunks(message: &ParsedMessage) -> Vec<ContextChunk> {
    let context = message_context(message);
    let mut chunks: Vec<ContextChunk> = context
        .key_points
        .into_iter()
        .map(|(label, content)| ContextChunk { label, content })
        .collect();

    chunks.push(ContextChunk {
        label: "metadata",
        content: format!("Message ID: {}", message.message_id()),
    });
    chunks.extend(context.compliance.iter().map(|check| ContextChunk {
        label: "compliance",
        content: check.to_string(),
    }));
    chunks.push(ContextChunk {
        label: "regulatory",
        content: context.regulatory.to_string(),
    });

    chunks
}

/// Score chunks by keyword overlap with the query and sort descending.
///
/// The sort is stable: chunks with equal scores keep their original order.
pub fn rerank(chunks: Vec<ContextChunk>, query: Option<&str>) -> Vec<ScoredChunk> {
    let query_terms = effective_query(query).map(terms).unwrap_or_default();

    let mut scored: Vec<ScoredChunk> = chunks
        .into_iter()
        .map(|chunk| {
            let chunk_terms = terms(&format!("{} {}", chunk.label.replace('_', " "), chunk.content));
            let score = query_terms.intersection(&chunk_terms).count();
            ScoredChunk { chunk, score }
        })
        .collect();

    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored
}

/// Keeps only the chunks that best overlap the query
pub struct RerankerRag {
    top_k: usize,
}

impl RerankerRag {
    pub fn new(top_k: usize) -> Self {
        Self { top_k: top_k.max(1) }
    }

    pub fn select(&self, message: &ParsedMessage, query: Option<&str>) -> Vec<ScoredChunk> {
        let mut ranked = rerank(context_chunks(message), query);
        ranked.truncate(self.top_k);
        ranked
    }
}

impl Default for RerankerRag {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_K)
    }
}

impl RagStrategy for RerankerRag {
    fn name(&self) -> &'static str {
        RERANKER
    }

    fn build_prompt(&self, message: &ParsedMessage, query: Option<&str>) -> String {
        let selected = self
            .select(message, query)
            .into_iter()
            .enumerate()
            .map(|(rank, scored)| {
                let tier = match rank {
                    0 => "Primary",
                    1 => "Secondary",
                    _ => "Additional",
                };
                format!("{tier} ({}): {}", scored.chunk.label, scored.chunk.content)
            })
            .collect::<Vec<_>>()
            .join("\n");

        match effective_query(query) {
            Some(query) => format!(
                "Analyze this ISO 20022 financial message to answer: {query}\n\n\
                 Most relevant information:\n{selected}\n\n\
                 Message Type: {}\n\n\
                 Provide a clear, business-friendly response focusing on the specific query.",
                message.message_type
            ),
            None => format!(
                "Generate a summary using the most relevant information:\n\n\
                 {selected}\n\n\
                 Message Type: {}\n\n\
                 Create a concise business summary focusing on the key details.\n\
                 Keep the response clear and direct.",
                message.message_type
            ),
        }
    }
}

/// Named strategy implementations, in registration order
pub struct StrategyRegistry {
    strategies: Vec<Box<dyn RagStrategy>>,
}

impl StrategyRegistry {
    pub fn empty() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Simple, context-enriched and reranker strategies
    pub fn standard() -> Self {
        Self::with_top_k(DEFAULT_TOP_K)
    }

    pub fn with_top_k(top_k: usize) -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(SimpleRag));
        registry.register(Box::new(ContextEnrichedRag));
        registry.register(Box::new(RerankerRag::new(top_k)));
        registry
    }

    /// Add a strategy, replacing any existing one with the same name
    pub fn register(&mut self, strategy: Box<dyn RagStrategy>) {
        match self
            .strategies
            .iter()
            .position(|existing| existing.name() == strategy.name())
        {
            Some(index) => self.strategies[index] = strategy,
            None => self.strategies.push(strategy),
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn RagStrategy> {
        self.strategies
            .iter()
            .find(|strategy| strategy.name() == name)
            .map(|strategy| strategy.as_ref())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|strategy| strategy.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn RagStrategy> {
        self.strategies.iter().map(|strategy| strategy.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RagError;
    use crate::llm::testing::ScriptedModel;
    use crate::models::StatementEntry;

    fn pacs008() -> ParsedMessage {
        let mut message = ParsedMessage::new(MessageType::Pacs008);
        message.insert("message_id", "MSG123");
        message.insert("created_at", "2025-07-16T10:30:00");
        message.insert("amount", "12345.67");
        message.insert("currency", "USD");
        message.insert("debtor_name", "John Doe");
        message.insert("creditor_name", "Jane Smith");
        message.insert("debtor_bank", "BOFAUS3N");
        message.insert("creditor_bank", "CHASUS33");
        message
    }

    #[test]
    fn test_simple_prompt_substitutes_fields() {
        let prompt = SimpleRag.build_prompt(&pacs008(), None);
        assert!(prompt.contains("Payment of 12345.67 USD was made on 2025-07-16T10:30:00 from John Doe to Jane Smith."));
        assert!(prompt.contains("Customer credit transfer message"));
        assert!(prompt.contains("Key Fields: MsgId, CreDtTm"));
    }

    #[test]
    fn test_simple_prompt_with_query() {
        let prompt = SimpleRag.build_prompt(&pacs008(), Some("Who pays the charges?"));
        assert!(prompt.starts_with("Analyze this ISO 20022 financial message to answer: Who pays the charges?"));
        assert!(prompt.contains("debtor_bank: BOFAUS3N"));
    }

    #[test]
    fn test_blank_query_means_summary() {
        let with_blank = SimpleRag.build_prompt(&pacs008(), Some("   "));
        let without = SimpleRag.build_prompt(&pacs008(), None);
        assert_eq!(with_blank, without);
    }

    #[test]
    fn test_context_prompt_includes_compliance_block() {
        let prompt = ContextEnrichedRag.build_prompt(&pacs008(), Some("Is this compliant?"));
        assert!(prompt.contains("Question about this Customer credit transfer message"));
        assert!(prompt.contains("• Transfer amount: 12345.67 USD"));
        assert!(prompt.contains("Compliance Checks:\n• Verify sender and receiver details"));
        assert!(prompt.contains("Regulatory Context:"));
    }

    #[test]
    fn test_context_missing_fields_render_na() {
        let mut message = ParsedMessage::new(MessageType::Pacs002);
        message.insert("group_status", "RJCT");
        let prompt = ContextEnrichedRag.build_prompt(&message, None);
        assert!(prompt.contains("Status: RJCT (Rejected)"));
        assert!(prompt.contains("Original message: N/A (N/A)"));
    }

    #[test]
    fn test_rerank_orders_by_overlap_descending() {
        let chunks = vec![
            ContextChunk { label: "a", content: "balance of the account".to_string() },
            ContextChunk { label: "b", content: "sanctions screening and compliance".to_string() },
            ContextChunk { label: "c", content: "compliance".to_string() },
        ];
        let ranked = rerank(chunks, Some("compliance sanctions screening"));
        let labels: Vec<_> = ranked.iter().map(|s| s.chunk.label).collect();
        assert_eq!(labels, vec!["b", "c", "a"]);
        assert_eq!(ranked[0].score, 3);
        assert_eq!(ranked[1].score, 1);
        assert_eq!(ranked[2].score, 0);
    }

    #[test]
    fn test_rerank_is_stable_on_ties() {
        let chunks: Vec<ContextChunk> = ["first", "second", "third", "fourth"]
            .into_iter()
            .map(|label| ContextChunk {
                label,
                content: "payment amount".to_string(),
            })
            .chain(std::iter::once(ContextChunk {
                label: "other",
                content: "unrelated".to_string(),
            }))
            .collect();

        let ranked = rerank(chunks, Some("payment"));
        let labels: Vec<_> = ranked.iter().map(|s| s.chunk.label).collect();
        assert_eq!(labels, vec!["first", "second", "third", "fourth", "other"]);
        assert!(ranked[..4].iter().all(|s| s.score == 1));
    }

    #[test]
    fn test_rerank_without_query_keeps_original_order() {
        let chunks = context_chunks(&pacs008());
        let expected: Vec<_> = chunks.iter().map(|c| c.label).collect();
        let ranked = rerank(chunks, None);
        assert!(ranked.iter().all(|s| s.score == 0));
        let labels: Vec<_> = ranked.iter().map(|s| s.chunk.label).collect();
        assert_eq!(labels, expected);
    }

    #[test]
    fn test_reranker_keeps_top_k() {
        let reranker = RerankerRag::new(2);
        let selected = reranker.select(&pacs008(), Some("Which compliance checks apply?"));
        assert_eq!(selected.len(), 2);
        assert!(selected.iter().all(|s| s.chunk.label == "compliance"));

        let prompt = reranker.build_prompt(&pacs008(), Some("Which compliance checks apply?"));
        assert!(prompt.contains("Primary (compliance)"));
        assert!(prompt.contains("Secondary (compliance)"));
        assert!(!prompt.contains("Additional"));
    }

    #[test]
    fn test_camt053_chunks_include_transactions() {
        let mut message = ParsedMessage::new(MessageType::Camt053);
        message.insert("balance_amount", "500.00");
        message.insert("balance_currency", "EUR");
        message.transactions.push(StatementEntry {
            amount: "20.00".to_string(),
            currency: "EUR".to_string(),
            credit_debit: "DBIT".to_string(),
            status: "BOOK".to_string(),
            booking_date: "2025-01-02".to_string(),
        });
        let chunks = context_chunks(&message);
        assert_eq!(chunks[0].content, "Balance: 500.00 EUR");
        assert!(chunks.iter().any(|c| c.content.starts_with("Transaction 1: 20.00 EUR (DBIT, BOOK)")));
    }

    #[test]
    fn test_registry_lookup_and_replace() {
        let mut registry = StrategyRegistry::standard();
        assert_eq!(registry.names(), vec![SIMPLE, CONTEXT, RERANKER]);
        assert!(registry.get(HYBRID).is_none());

        registry.register(Box::new(RerankerRag::new(1)));
        assert_eq!(registry.names().len(), 3);
        let reranker = registry.get(RERANKER).unwrap();
        let prompt = reranker.build_prompt(&pacs008(), None);
        assert!(prompt.contains("Primary"));
        assert!(!prompt.contains("Secondary"));
    }

    #[tokio::test]
    async fn test_produce_calls_model_once_with_prompt() {
        let model = ScriptedModel::new("A payment of 12345.67 USD.");
        let text = SimpleRag
            .produce(&pacs008(), Some("Summarize"), "gpt-4", &model)
            .await
            .unwrap();

        assert_eq!(text, "A payment of 12345.67 USD.");
        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, "gpt-4");
        assert!(calls[0].0.contains("Summarize"));
    }

    #[tokio::test]
    async fn test_produce_propagates_api_error() {
        let model = ScriptedModel::new("unused").fail_when("Compliance Checks:");
        let err = ContextEnrichedRag
            .produce(&pacs008(), None, "gpt-4", &model)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Api { .. }));
        assert_eq!(model.calls().len(), 1);
    }
}
