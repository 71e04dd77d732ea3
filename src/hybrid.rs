//! Adaptive blend of the individual strategies.
//!
//! Every registered strategy answers the same question; the combiner scores
//! each answer with a domain heuristic, folds that into query- and
//! type-dependent weights and returns the best weighted answer.

use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::config::HybridConfig;
use crate::error::{RagError, RagResult};
use crate::llm::LanguageModel;
use crate::models::{HybridResult, ParsedMessage, StrategyResponse};
use crate::schema::MessageType;
use crate::strategies::{CONTEXT, RERANKER, SIMPLE, StrategyRegistry};

const QUERY_MULTIPLIER: f64 = 1.5;
const PACS008_SIMPLE_MULTIPLIER: f64 = 1.2;

const CURRENCY_MARKERS: [&str; 5] = ["USD", "EUR", "GBP", "JPY", "CHF"];
const PARTY_MARKERS: [&str; 5] = ["sender", "receiver", "debtor", "creditor", "bank"];
const STATUS_MARKERS: [&str; 3] = ["ACCP", "ACSC", "RJCT"];

type Weights = Vec<(&'static str, f64)>;

/// Domain-coverage confidence of a response, in [0, 1]
pub fn confidence(text: &str, message_type: MessageType) -> f64 {
    let lower = text.to_lowercase();
    let upper = text.to_uppercase();

    let has_amounts = text.chars().any(|c| c.is_ascii_digit());
    let has_currency = CURRENCY_MARKERS.iter().any(|code| text.contains(code));
    let has_parties = PARTY_MARKERS.iter().any(|term| lower.contains(term));

    let checks: Vec<bool> = match message_type {
        MessageType::Pacs008 => vec![
            lower.contains("transfer"),
            lower.contains("payment"),
            has_amounts,
            has_currency,
        ],
        MessageType::Pacs002 => vec![
            lower.contains("status"),
            lower.contains("original"),
            STATUS_MARKERS.iter().any(|code| upper.contains(code)),
        ],
        MessageType::Camt053 => vec![
            lower.contains("statement"),
            lower.contains("balance"),
            has_amounts,
            has_currency,
        ],
        MessageType::Pain001 => vec![
            lower.contains("initiation"),
            lower.contains("payment"),
            has_amounts,
            has_parties,
        ],
    };

    let base = fraction(&[
        has_amounts,
        has_currency,
        has_parties,
        text.split_whitespace().count() > 10,
        text.contains('.'),
    ]);

    base * 0.6 + fraction(&checks) * 0.4
}

fn fraction(checks: &[bool]) -> f64 {
    if checks.is_empty() {
        return 0.0;
    }
    checks.iter().filter(|passed| **passed).count() as f64 / checks.len() as f64
}

/// Scale weights to sum to one; returns false (and leaves them) when the sum is zero
fn normalize(weights: &mut Weights) -> bool {
    let total: f64 = weights.iter().map(|(_, w)| w).sum();
    if total <= 0.0 || !total.is_finite() {
        return false;
    }
    for (_, weight) in weights.iter_mut() {
        *weight /= total;
    }
    true
}

fn to_map(weights: &[(&'static str, f64)]) -> BTreeMap<String, f64> {
    weights
        .iter()
        .map(|(name, value)| (name.to_string(), *value))
        .collect()
}

pub struct HybridCombiner {
    config: HybridConfig,
    registry: StrategyRegistry,
}

impl HybridCombiner {
    pub fn new(config: HybridConfig) -> Self {
        let registry = StrategyRegistry::with_top_k(config.top_k);
        Self::with_registry(config, registry)
    }

    pub fn with_registry(config: HybridConfig, registry: StrategyRegistry) -> Self {
        Self { config, registry }
    }

    /// Configured base weight; strategies outside the standard three get the mean share
    fn base_weight(&self, name: &str) -> f64 {
        match name {
            SIMPLE => self.config.simple,
            CONTEXT => self.config.context,
            RERANKER => self.config.reranker,
            _ => (self.config.simple + self.config.context + self.config.reranker) / 3.0,
        }
    }

    /// Base weights with the query and message-type multipliers applied, normalized
    pub fn adjust_weights(&self, message_type: MessageType, query: Option<&str>) -> Weights {
        let query = query.map(str::to_lowercase).unwrap_or_default();

        let mut weights: Weights = self
            .registry
            .names()
            .into_iter()
            .map(|name| {
                let mut weight = self.base_weight(name);
                if name == CONTEXT && query.contains("compliance") {
                    weight *= QUERY_MULTIPLIER;
                }
                if name == RERANKER && query.contains("technical") {
                    weight *= QUERY_MULTIPLIER;
                }
                if name == SIMPLE && message_type == MessageType::Pacs008 {
                    weight *= PACS008_SIMPLE_MULTIPLIER;
                }
                (name, weight)
            })
            .collect();

        normalize(&mut weights);
        weights
    }

    /// Dampen weights of low-confidence strategies and renormalize
    fn blend(&self, weights: &Weights, confidences: &BTreeMap<&'static str, f64>) -> Weights {
        let threshold = self.config.confidence_threshold;

        let mut blended: Weights = weights
            .iter()
            .map(|(name, weight)| {
                let confidence = confidences.get(name).copied().unwrap_or(0.0);
                if confidence < threshold {
                    (*name, weight * confidence / threshold)
                } else {
                    (*name, *weight)
                }
            })
            .collect();

        if !normalize(&mut blended) {
            debug!("All hybrid weights collapsed to zero, keeping adjusted weights");
            return weights.clone();
        }
        blended
    }

    /// Run one named strategy and score its answer
    pub async fn run_strategy(
        &self,
        name: &str,
        message: &ParsedMessage,
        query: Option<&str>,
        model: &str,
        llm: &dyn LanguageModel,
    ) -> RagResult<StrategyResponse> {
        let strategy = self
            .registry
            .get(name)
            .ok_or_else(|| RagError::config(format!("unknown strategy: {name}")))?;

        let response_text = strategy.produce(message, query, model, llm).await?;
        let confidence_score = confidence(&response_text, message.message_type);
        debug!(strategy = name, confidence = confidence_score, "strategy answered");

        Ok(StrategyResponse {
            strategy_name: strategy.name().to_string(),
            response_text,
            confidence_score,
        })
    }

    /// Run every strategy and select the best weighted answer.
    ///
    /// A failing strategy is left out and the weights are renormalized over
    /// the survivors. The first error is returned only when every strategy fails.
    pub async fn combine(
        &self,
        message: &ParsedMessage,
        query: Option<&str>,
        model: &str,
        llm: &dyn LanguageModel,
    ) -> RagResult<HybridResult> {
        let adjusted = self.adjust_weights(message.message_type, query);
        debug!("Adjusted hybrid weights: {:?}", adjusted);

        let mut responses: BTreeMap<&'static str, StrategyResponse> = BTreeMap::new();
        let mut failures = BTreeMap::new();
        let mut first_error = None;

        for strategy in self.registry.iter() {
            match self
                .run_strategy(strategy.name(), message, query, model, llm)
                .await
            {
                Ok(response) => {
                    debug!("{} produced {} chars", response.strategy_name, response.response_text.len());
                    responses.insert(strategy.name(), response);
                }
                Err(e) => {
                    warn!("Strategy {} failed for model {}: {}", strategy.name(), model, e);
                    failures.insert(strategy.name().to_string(), e.to_string());
                    first_error.get_or_insert(e);
                }
            }
        }

        if responses.is_empty() {
            return Err(first_error
                .unwrap_or_else(|| RagError::config("no strategies registered for hybrid")));
        }

        let mut survivors: Weights = adjusted
            .into_iter()
            .filter(|(name, _)| responses.contains_key(name))
            .collect();
        if !normalize(&mut survivors) {
            let share = 1.0 / survivors.len() as f64;
            for (_, weight) in survivors.iter_mut() {
                *weight = share;
            }
        }

        let confidences: BTreeMap<&'static str, f64> = responses
            .iter()
            .map(|(name, response)| (*name, response.confidence_score))
            .collect();

        let final_weights = self.blend(&survivors, &confidences);

        let weighted: Weights = final_weights
            .iter()
            .map(|(name, weight)| (*name, weight * confidences.get(name).copied().unwrap_or(0.0)))
            .collect();

        // Strict comparison keeps the earliest registered strategy on ties
        let mut selected = weighted[0];
        for candidate in &weighted[1..] {
            if candidate.1 > selected.1 {
                selected = *candidate;
            }
        }
        debug!("Hybrid selected {} (score {:.3})", selected.0, selected.1);

        let response_text = responses
            .get(selected.0)
            .map(|response| response.response_text.clone())
            .unwrap_or_default();

        Ok(HybridResult {
            response_text,
            selected_method: selected.0.to_string(),
            method_weights: to_map(&final_weights),
            confidence_scores: confidences
                .iter()
                .map(|(name, value)| (name.to_string(), *value))
                .collect(),
            weighted_scores: to_map(&weighted),
            responses: responses
                .into_iter()
                .map(|(name, response)| (name.to_string(), response.response_text))
                .collect(),
            failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;

    const RICH_PACS008: &str = "The payment transfer of 12345.67 USD from debtor John Doe at bank BOFAUS3N to creditor Jane Smith was settled.";

    fn pacs008() -> ParsedMessage {
        let mut message = ParsedMessage::new(MessageType::Pacs008);
        message.insert("message_id", "MSG123");
        message.insert("amount", "12345.67");
        message.insert("currency", "USD");
        message.insert("debtor_name", "John Doe");
        message.insert("creditor_name", "Jane Smith");
        message
    }

    fn weight(weights: &Weights, name: &str) -> f64 {
        weights.iter().find(|(n, _)| *n == name).map(|(_, w)| *w).unwrap()
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn test_weights_sum_to_one_for_all_combinations() {
        let configs = [
            HybridConfig::default(),
            HybridConfig {
                simple: 1.0,
                context: 0.0,
                reranker: 2.5,
                ..HybridConfig::default()
            },
            HybridConfig {
                simple: 0.01,
                context: 0.01,
                reranker: 0.01,
                ..HybridConfig::default()
            },
        ];
        let queries = [
            None,
            Some("Summarize"),
            Some("Check compliance aspects"),
            Some("Explain the technical structure"),
            Some("Technical and COMPLIANCE review"),
        ];

        for config in configs {
            let combiner = HybridCombiner::new(config);
            for message_type in MessageType::ALL {
                for query in queries {
                    let weights = combiner.adjust_weights(message_type, query);
                    assert_eq!(weights.len(), 3);
                    assert!(weights.iter().all(|(_, w)| *w >= 0.0));
                    assert_close(weights.iter().map(|(_, w)| w).sum(), 1.0);
                }
            }
        }
    }

    #[test]
    fn test_compliance_query_raises_context_weight() {
        let combiner = HybridCombiner::new(HybridConfig::default());
        let with = combiner.adjust_weights(MessageType::Pacs008, Some("Check compliance aspects"));
        let without = combiner.adjust_weights(MessageType::Pacs008, Some("Check aspects"));
        assert!(weight(&with, CONTEXT) > weight(&without, CONTEXT));
        assert_close(weight(&with, CONTEXT), 0.6 / 1.26);
    }

    #[test]
    fn test_technical_query_raises_reranker_weight() {
        let combiner = HybridCombiner::new(HybridConfig::default());
        let weights = combiner.adjust_weights(MessageType::Camt053, Some("Technical details"));
        assert_close(weight(&weights, RERANKER), 0.45 / 1.15);
    }

    #[test]
    fn test_no_multiplier_is_identity() {
        let combiner = HybridCombiner::new(HybridConfig::default());
        let weights = combiner.adjust_weights(MessageType::Pain001, Some("Summarize"));
        assert_close(weight(&weights, SIMPLE), 0.3);
        assert_close(weight(&weights, CONTEXT), 0.4);
        assert_close(weight(&weights, RERANKER), 0.3);
    }

    #[test]
    fn test_confidence_heuristic() {
        assert_close(confidence(RICH_PACS008, MessageType::Pacs008), 1.0);
        assert_close(confidence("", MessageType::Pacs008), 0.0);
        assert_close(confidence("OK", MessageType::Camt053), 0.0);

        // base: parties, sentence = 2/5; type: status, original, RJCT = 3/3
        let status = "The bank status for the original message is rjct.";
        assert_close(confidence(status, MessageType::Pacs002), 0.6 * 0.4 + 0.4);
    }

    #[test]
    fn test_blend_dampens_low_confidence() {
        let combiner = HybridCombiner::new(HybridConfig::default());
        let weights = vec![(SIMPLE, 0.5), (CONTEXT, 0.5)];
        let confidences = BTreeMap::from([(SIMPLE, 0.75), (CONTEXT, 0.375)]);
        let blended = combiner.blend(&weights, &confidences);
        assert_close(weight(&blended, SIMPLE), 2.0 / 3.0);
        assert_close(weight(&blended, CONTEXT), 1.0 / 3.0);

        let zero = BTreeMap::from([(SIMPLE, 0.0), (CONTEXT, 0.0)]);
        assert_eq!(combiner.blend(&weights, &zero), weights);
    }

    #[tokio::test]
    async fn test_combine_selects_confident_answer() {
        let model = ScriptedModel::new("OK").reply_when("Key Fields:", RICH_PACS008);
        let combiner = HybridCombiner::new(HybridConfig::default());

        let result = combiner
            .combine(&pacs008(), Some("Summarize the payment"), "gpt-4", &model)
            .await
            .unwrap();

        assert_eq!(result.selected_method, SIMPLE);
        assert_eq!(result.response_text, RICH_PACS008);
        assert_eq!(result.responses.len(), 3);
        assert!(result.failures.is_empty());
        assert_close(result.method_weights.values().sum(), 1.0);
        assert_close(result.method_weights[SIMPLE], 1.0);
        assert_close(result.confidence_scores[CONTEXT], 0.0);
        assert_eq!(model.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_combine_ties_resolve_to_registry_order() {
        let model = ScriptedModel::new(RICH_PACS008);
        let combiner = HybridCombiner::new(HybridConfig {
            simple: 1.0,
            context: 1.2,
            reranker: 1.0,
            ..HybridConfig::default()
        });

        // pacs.008 lifts simple to 1.2, level with context
        let result = combiner
            .combine(&pacs008(), None, "gpt-4", &model)
            .await
            .unwrap();
        assert_eq!(result.selected_method, SIMPLE);
    }

    #[tokio::test]
    async fn test_combine_skips_failed_strategy() {
        let model = ScriptedModel::new(RICH_PACS008).fail_when("Compliance Checks:");
        let combiner = HybridCombiner::new(HybridConfig::default());

        let result = combiner
            .combine(&pacs008(), Some("Check compliance aspects"), "gpt-4", &model)
            .await
            .unwrap();

        assert!(result.failures.contains_key(CONTEXT));
        assert!(!result.method_weights.contains_key(CONTEXT));
        assert_eq!(result.method_weights.len(), 2);
        assert_close(result.method_weights.values().sum(), 1.0);
        assert_ne!(result.selected_method, CONTEXT);
    }

    #[tokio::test]
    async fn test_combine_propagates_when_all_fail() {
        let model = ScriptedModel::new("unused")
            .fail_when("Key Fields:")
            .fail_when("Compliance Checks:")
            .fail_when("relevant information");
        let combiner = HybridCombiner::new(HybridConfig::default());

        let err = combiner
            .combine(&pacs008(), Some("Summarize"), "gpt-4", &model)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Api { status: Some(500), .. }));
    }

    #[tokio::test]
    async fn test_run_strategy_unknown_name() {
        let model = ScriptedModel::new("OK");
        let combiner = HybridCombiner::new(HybridConfig::default());
        let err = combiner
            .run_strategy("graph", &pacs008(), None, "gpt-4", &model)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Config { .. }));
        assert!(model.calls().is_empty());
    }
}
