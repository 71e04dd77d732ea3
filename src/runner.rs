use crate::config::Config;
use crate::error::RagResult;
use crate::evaluation::{Evaluator, OVERALL, metric_names};
use crate::generator::MessageGenerator;
use crate::hybrid::HybridCombiner;
use crate::llm::LanguageModel;
use crate::models::{
    ComparisonRecord, EvaluationResult, FinalResults, HybridResult, MethodSummary, ParsedMessage,
};
use crate::parser::parse_message;
use crate::scenarios::relevant_scenarios;
use crate::strategies::HYBRID;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info, warn};

const CUSTOM_CATEGORY: &str = "Custom";

/// One question to ask about a message
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedQuery {
    pub category: String,
    pub name: String,
    pub query: String,
    pub description: String,
}

/// Main runner that orchestrates the comparison across models and methods
pub struct Runner {
    config: Config,
    evaluator: Evaluator,
    combiner: HybridCombiner,
    llm: Box<dyn LanguageModel>,
}

impl Runner {
    /// Create a new runner with the given configuration and LLM backend
    pub fn new(config: Config, llm: Box<dyn LanguageModel>) -> Result<Self> {
        let evaluator = Evaluator::new().context("Failed to build evaluator")?;
        let combiner = HybridCombiner::new(config.hybrid.clone());
        Ok(Self {
            config,
            evaluator,
            combiner,
            llm,
        })
    }

    /// Run every configured (message, query, model, method) combination
    pub async fn run_comparison(&self) -> Result<FinalResults> {
        let messages = self.load_messages()?;
        info!("Loaded {} messages", messages.len());

        let mut records = Vec::new();
        let mut total_queries = 0;

        for (message_index, message) in messages.iter().enumerate() {
            let queries = self.queries_for(message);
            total_queries += queries.len();
            info!(
                "Testing {} message {} ({}/{})",
                message.message_type,
                message.message_id(),
                message_index + 1,
                messages.len()
            );

            for planned in &queries {
                debug!(
                    "Category: {}, query: {} {}",
                    planned.category, planned.name, planned.description
                );
                for model in &self.config.run.models {
                    for method in &self.config.run.methods {
                        let record = self.analyze(message, planned, model, method).await;
                        records.push(record);
                    }
                }
            }
        }

        let summaries = self.summarize(&records);
        let best_method = best_method(&summaries);
        if let Some(best) = &best_method {
            info!("Best performing method: {}", best);
        }

        let final_results = FinalResults {
            total_messages: messages.len(),
            total_queries,
            best_method,
            summaries,
            records,
        };

        self.store_results_if_configured(&final_results)?;

        Ok(final_results)
    }

    /// Generate the configured synthetic messages and load the listed XML files
    pub fn load_messages(&self) -> Result<Vec<ParsedMessage>> {
        let run = &self.config.run;
        let mut generator = match run.seed {
            Some(seed) => MessageGenerator::with_seed(seed),
            None => MessageGenerator::new(),
        };

        let mut messages = Vec::new();
        for message_type in &run.message_types {
            for _ in 0..run.messages_per_type {
                let generated = generator.generate(*message_type);
                let parsed = parse_message(&generated.xml).with_context(|| {
                    format!("Failed to parse generated {} message", message_type)
                })?;
                messages.push(parsed);
            }
        }

        for path in &run.message_files {
            messages.push(load_message_file(path)?);
        }

        Ok(messages)
    }

    /// Configured queries, or the built-in scenarios relevant to the message type
    pub fn queries_for(&self, message: &ParsedMessage) -> Vec<PlannedQuery> {
        if !self.config.run.queries.is_empty() {
            return self
                .config
                .run
                .queries
                .iter()
                .enumerate()
                .map(|(index, query)| PlannedQuery {
                    category: CUSTOM_CATEGORY.to_string(),
                    name: format!("Query {}", index + 1),
                    query: query.clone(),
                    description: String::new(),
                })
                .collect();
        }

        relevant_scenarios(message.message_type)
            .into_iter()
            .flat_map(|scenario| {
                scenario.queries.iter().map(|q| PlannedQuery {
                    category: scenario.category.to_string(),
                    name: q.name.to_string(),
                    query: q.query.to_string(),
                    description: q.description.to_string(),
                })
            })
            .collect()
    }

    /// Run one method for one query and evaluate the answer; failures are recorded, not raised
    pub async fn analyze(
        &self,
        message: &ParsedMessage,
        planned: &PlannedQuery,
        model: &str,
        method: &str,
    ) -> ComparisonRecord {
        debug!("  → {} / {} on {}", model, method, planned.name);

        let mut record = ComparisonRecord {
            message_id: message.message_id().to_string(),
            message_type: message.message_type,
            category: planned.category.clone(),
            query_name: planned.name.clone(),
            query: planned.query.clone(),
            model: model.to_string(),
            method: method.to_string(),
            response: None,
            error: None,
            evaluation: None,
            hybrid: None,
        };

        match self
            .run_method(message, Some(&planned.query), model, method)
            .await
        {
            Ok((text, hybrid)) => {
                record.evaluation = Some(self.evaluator.evaluate_against(&text, message));
                record.response = Some(text);
                record.hybrid = hybrid;
            }
            Err(e) => {
                warn!(kind = e.kind(), "{} {} failed on {}: {}", model, method, planned.name, e);
                record.error = Some(e.to_string());
            }
        }

        record
    }

    /// Produce an answer with a single strategy or the hybrid blend
    pub async fn run_method(
        &self,
        message: &ParsedMessage,
        query: Option<&str>,
        model: &str,
        method: &str,
    ) -> RagResult<(String, Option<HybridResult>)> {
        if method == HYBRID {
            let result = self
                .combiner
                .combine(message, query, model, self.llm.as_ref())
                .await?;
            return Ok((result.response_text.clone(), Some(result)));
        }

        let response = self
            .combiner
            .run_strategy(method, message, query, model, self.llm.as_ref())
            .await?;
        Ok((response.response_text, None))
    }

    /// Per (model, method) statistics in configuration order
    fn summarize(&self, records: &[ComparisonRecord]) -> Vec<MethodSummary> {
        let categories = metric_names();
        let mut summaries = Vec::new();

        for model in &self.config.run.models {
            for method in &self.config.run.methods {
                let cell: Vec<&ComparisonRecord> = records
                    .iter()
                    .filter(|r| &r.model == model && &r.method == method)
                    .collect();
                let evaluations: Vec<&EvaluationResult> =
                    cell.iter().filter_map(|r| r.evaluation.as_ref()).collect();

                summaries.push(MethodSummary {
                    model: model.clone(),
                    method: method.clone(),
                    responses: evaluations.len(),
                    failures: cell.iter().filter(|r| r.error.is_some()).count(),
                    statistics: self.evaluator.calculate_statistics(&evaluations, &categories),
                });
            }
        }

        summaries
    }

    /// Store results if storage path is configured
    fn store_results_if_configured(&self, final_results: &FinalResults) -> Result<()> {
        if let Some(storage_path) = &self.config.run.storage_path {
            info!("Storing results to {}", storage_path);
            self.store_results(final_results, storage_path)?;
        }
        Ok(())
    }

    /// Store results to a JSON file
    fn store_results(&self, final_results: &FinalResults, path: &str) -> Result<()> {
        let json_content = serde_json::to_string_pretty(final_results)
            .context("Failed to serialize results to JSON")?;
        ensure_directory_exists(path)?;
        std::fs::write(path, json_content)
            .with_context(|| format!("Failed to write results to: {}", path))?;
        info!("Results stored to: {}", path);
        Ok(())
    }
}

/// "model - method" of the summary with the highest mean overall score
fn best_method(summaries: &[MethodSummary]) -> Option<String> {
    let mut best: Option<(&MethodSummary, f64)> = None;
    for summary in summaries.iter().filter(|s| s.responses > 0) {
        let score = summary.statistics.mean.get(OVERALL).copied().unwrap_or(0.0);
        if best.is_none_or(|(_, best_score)| score > best_score) {
            best = Some((summary, score));
        }
    }
    best.map(|(summary, _)| format!("{} - {}", summary.model, summary.method))
}

pub fn load_message_file(path: &Path) -> Result<ParsedMessage> {
    let xml = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read message file: {}", path.display()))?;
    parse_message(&xml).with_context(|| format!("Failed to parse message file: {}", path.display()))
}

/// Ensure the directory for the results file exists
fn ensure_directory_exists(path: &str) -> Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}
