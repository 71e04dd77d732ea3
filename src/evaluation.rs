use regex::Regex;
use std::collections::BTreeMap;

use crate::models::{EvaluationResult, EvaluationStatus, ParsedMessage, Statistics, TextMetrics};
use crate::schema::{MessageType, is_currency_code};

pub const TECHNICAL_DENSITY: &str = "technical_density";
pub const BUSINESS_DENSITY: &str = "business_density";
pub const COMPLIANCE_DENSITY: &str = "compliance_density";
pub const NUMERIC_ACCURACY: &str = "numeric_accuracy";
pub const CURRENCY_ACCURACY: &str = "currency_accuracy";
pub const READABILITY: &str = "readability";
/// Weighted average of all metrics
pub const OVERALL: &str = "overall";

/// Metric name, weight in the overall score, threshold below which it is flagged
const METRICS: [(&str, f64, f64, &str); 6] = [
    (TECHNICAL_DENSITY, 0.2, 0.3, "Increase technical detail"),
    (BUSINESS_DENSITY, 0.2, 0.3, "Add more business context"),
    (COMPLIANCE_DENSITY, 0.15, 0.2, "Include compliance aspects"),
    (NUMERIC_ACCURACY, 0.15, 0.5, "Improve numeric accuracy"),
    (CURRENCY_ACCURACY, 0.1, 0.5, "Enhance currency handling"),
    (READABILITY, 0.2, 0.6, "Improve readability"),
];

const EMPTY_RESPONSE: &str = "Empty or invalid response";

/// Tolerance when matching a monetary value found in text
const AMOUNT_EPSILON: f64 = 0.005;

fn technical_terms(message_type: MessageType) -> &'static [&'static str] {
    match message_type {
        MessageType::Pacs008 => &[
            "credit transfer",
            "settlement",
            "clearing",
            "interbank",
            "FIToFICustomerCreditTransfer",
        ],
        MessageType::Pacs002 => &[
            "status",
            "reason",
            "rejection",
            "acceptance",
            "FIToFIPaymentStatusReport",
        ],
        MessageType::Camt053 => &[
            "statement",
            "balance",
            "entry",
            "transaction",
            "BankToCustomerStatement",
        ],
        MessageType::Pain001 => &[
            "initiation",
            "debtor",
            "creditor",
            "CustomerCreditTransferInitiation",
        ],
    }
}

fn business_terms(message_type: MessageType) -> &'static [&'static str] {
    match message_type {
        MessageType::Pacs008 => &["payment", "transfer", "sender", "receiver", "amount"],
        MessageType::Pacs002 => &["confirmation", "processing", "status", "result", "response"],
        MessageType::Camt053 => &["account", "balance", "transaction", "statement", "period"],
        MessageType::Pain001 => &["payment", "instruction", "transfer", "request", "initiation"],
    }
}

fn compliance_terms(message_type: MessageType) -> &'static [&'static str] {
    match message_type {
        MessageType::Pacs008 => &["AML", "sanctions", "compliance", "regulatory", "verification"],
        MessageType::Pacs002 => &["validation", "compliance", "check", "verification", "control"],
        MessageType::Camt053 => &["reconciliation", "audit", "compliance", "reporting", "verification"],
        MessageType::Pain001 => &["authorization", "validation", "compliance", "verification", "control"],
    }
}

/// Case-insensitive whole-word alternation of `terms`
fn term_pattern(terms: &[&str]) -> Result<Regex, regex::Error> {
    let alternatives = terms
        .iter()
        .map(|term| regex::escape(term))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternatives})\b"))
}

struct TermPatterns {
    technical: Regex,
    business: Regex,
    compliance: Regex,
}

/// Rule-based scorer for free-text answers about ISO 20022 messages
pub struct Evaluator {
    terms: BTreeMap<MessageType, TermPatterns>,
    number: Regex,
    amount: Regex,
    date: Regex,
    reference: Regex,
    currency_code: Regex,
    iso_code: Regex,
    formatted_amount: Regex,
    currency_symbol: Regex,
    sentence_end: Regex,
}

impl Evaluator {
    pub fn new() -> Result<Self, regex::Error> {
        let mut terms = BTreeMap::new();
        for message_type in MessageType::ALL {
            terms.insert(
                message_type,
                TermPatterns {
                    technical: term_pattern(technical_terms(message_type))?,
                    business: term_pattern(business_terms(message_type))?,
                    compliance: term_pattern(compliance_terms(message_type))?,
                },
            );
        }

        Ok(Self {
            terms,
            number: Regex::new(r"\d[\d,]*(?:\.\d+)?")?,
            amount: Regex::new(r"(?:EUR|USD|GBP|JPY|CHF)\s*[\d,.]+|\d+(?:,\d{3})*(?:\.\d{2})?")?,
            date: Regex::new(
                r"\d{4}-\d{2}-\d{2}|\d{2}/\d{2}/\d{4}|\d{2}\s+(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)\s+\d{4}",
            )?,
            reference: Regex::new(r"(?:REF|Reference|ID):\s*[A-Z0-9-]+")?,
            currency_code: Regex::new(r"(?:EUR|USD|GBP|JPY|CHF)")?,
            iso_code: Regex::new(r"\b[A-Z]{3}\b")?,
            formatted_amount: Regex::new(r"\d+(?:,\d{3})*(?:\.\d{2})?")?,
            currency_symbol: Regex::new(r"[€$£¥]")?,
            sentence_end: Regex::new(r"[.!?]+(?:\s+|$)")?,
        })
    }

    /// Score a response using only the message type
    pub fn evaluate_response(&self, text: &str, message_type: MessageType) -> EvaluationResult {
        self.evaluate(text, message_type, None)
    }

    /// Score a response, checking amounts and currencies against the source message
    pub fn evaluate_against(&self, text: &str, reference: &ParsedMessage) -> EvaluationResult {
        self.evaluate(text, reference.message_type, Some(reference))
    }

    fn evaluate(
        &self,
        text: &str,
        message_type: MessageType,
        reference: Option<&ParsedMessage>,
    ) -> EvaluationResult {
        if text.trim().is_empty() {
            return EvaluationResult {
                status: EvaluationStatus::Empty,
                message_type,
                scores: METRICS
                    .iter()
                    .map(|(name, ..)| (name.to_string(), 0.0))
                    .collect(),
                overall: 0.0,
                metrics: TextMetrics::default(),
                improvement_areas: vec![EMPTY_RESPONSE.to_string()],
            };
        }

        let words = word_count(text);
        let sentences = self.sentence_count(text);
        let mut scores = BTreeMap::new();

        if let Some(patterns) = self.terms.get(&message_type) {
            scores.insert(TECHNICAL_DENSITY.to_string(), density(&patterns.technical, text, words));
            scores.insert(BUSINESS_DENSITY.to_string(), density(&patterns.business, text, words));
            scores.insert(COMPLIANCE_DENSITY.to_string(), density(&patterns.compliance, text, words));
        }
        scores.insert(NUMERIC_ACCURACY.to_string(), self.numeric_accuracy(text, reference));
        scores.insert(CURRENCY_ACCURACY.to_string(), self.currency_accuracy(text, reference));
        scores.insert(READABILITY.to_string(), readability(text, words, sentences));

        let mut overall = 0.0;
        let mut improvement_areas = Vec::new();
        for (name, weight, threshold, advice) in METRICS {
            let score = scores.get(name).copied().unwrap_or(0.0);
            overall += score * weight;
            if score < threshold {
                improvement_areas.push(advice.to_string());
            }
        }

        EvaluationResult {
            status: EvaluationStatus::Success,
            message_type,
            scores,
            overall: overall.clamp(0.0, 1.0),
            metrics: TextMetrics {
                sentence_count: sentences,
                word_count: words,
                avg_sentence_length: words as f64 / sentences.max(1) as f64,
            },
            improvement_areas,
        }
    }

    fn sentence_count(&self, text: &str) -> usize {
        let count = self
            .sentence_end
            .split(text)
            .filter(|sentence| sentence.chars().any(char::is_alphanumeric))
            .count();
        count.max(1)
    }

    fn numeric_accuracy(&self, text: &str, reference: Option<&ParsedMessage>) -> f64 {
        let expected = reference.map(ParsedMessage::amounts).unwrap_or_default();
        if expected.is_empty() {
            return presence(&[
                self.amount.is_match(text),
                self.date.is_match(text),
                self.reference.is_match(text),
            ]);
        }

        let found: Vec<f64> = self
            .number
            .find_iter(text)
            .filter_map(|m| m.as_str().replace(',', "").parse::<f64>().ok())
            .collect();

        let matched = expected
            .iter()
            .filter(|value| found.iter().any(|n| (n - *value).abs() < AMOUNT_EPSILON))
            .count();

        matched as f64 / expected.len() as f64
    }

    fn currency_accuracy(&self, text: &str, reference: Option<&ParsedMessage>) -> f64 {
        let expected = reference.map(ParsedMessage::currencies).unwrap_or_default();
        if expected.is_empty() {
            return presence(&[
                self.currency_code.is_match(text),
                self.formatted_amount.is_match(text),
                self.currency_symbol.is_match(text),
            ]);
        }

        let mut found: Vec<&str> = self
            .iso_code
            .find_iter(text)
            .map(|m| m.as_str())
            .filter(|code| is_currency_code(code) || expected.iter().any(|e| e == code))
            .collect();
        found.sort_unstable();
        found.dedup();

        if found.is_empty() {
            return 0.0;
        }

        let matching = found
            .iter()
            .filter(|code| expected.iter().any(|e| e == *code))
            .count();
        let expected_present = if matching > 0 { 0.5 } else { 0.0 };

        expected_present + 0.5 * matching as f64 / found.len() as f64
    }

    /// Calculate statistics for multiple evaluation results
    pub fn calculate_statistics(
        &self,
        results: &[&EvaluationResult],
        categories: &[String],
    ) -> Statistics {
        let mut mean = BTreeMap::new();
        let mut median = BTreeMap::new();
        let mut mode = BTreeMap::new();

        for category in categories {
            let scores = self.collect_category_scores(results, category);

            if scores.is_empty() {
                self.insert_zero_stats(category, &mut mean, &mut median, &mut mode);
                continue;
            }

            mean.insert(category.clone(), self.calculate_mean(&scores));
            median.insert(category.clone(), self.calculate_median(&scores));
            mode.insert(category.clone(), self.calculate_mode(&scores));
        }

        Statistics { mean, median, mode }
    }

    /// Collect scores for a specific category; `overall` reads the weighted score
    fn collect_category_scores(&self, results: &[&EvaluationResult], category: &str) -> Vec<f64> {
        results
            .iter()
            .filter_map(|r| {
                if category == OVERALL {
                    Some(r.overall)
                } else {
                    r.scores.get(category).copied()
                }
            })
            .collect()
    }

    fn insert_zero_stats(
        &self,
        category: &str,
        mean: &mut BTreeMap<String, f64>,
        median: &mut BTreeMap<String, f64>,
        mode: &mut BTreeMap<String, f64>,
    ) {
        mean.insert(category.to_string(), 0.0);
        median.insert(category.to_string(), 0.0);
        mode.insert(category.to_string(), 0.0);
    }

    fn calculate_mean(&self, scores: &[f64]) -> f64 {
        let sum: f64 = scores.iter().sum();
        sum / scores.len() as f64
    }

    fn calculate_median(&self, scores: &[f64]) -> f64 {
        let mut sorted_scores = scores.to_vec();
        sorted_scores.sort_by(|a, b| a.total_cmp(b));

        let mid = sorted_scores.len() / 2;
        if sorted_scores.len() % 2 == 0 {
            (sorted_scores[mid - 1] + sorted_scores[mid]) / 2.0
        } else {
            sorted_scores[mid]
        }
    }

    /// Most frequent score rounded to one decimal; ties go to the higher score
    fn calculate_mode(&self, scores: &[f64]) -> f64 {
        let mut frequency: BTreeMap<i64, usize> = BTreeMap::new();

        for &score in scores {
            *frequency.entry((score * 10.0).round() as i64).or_insert(0) += 1;
        }

        match frequency.iter().max_by_key(|&(_, count)| count) {
            Some((&tenths, _)) => tenths as f64 / 10.0,
            None => 0.0,
        }
    }
}

/// Metric names reported per method, `overall` first
pub fn metric_names() -> Vec<String> {
    std::iter::once(OVERALL)
        .chain(METRICS.iter().map(|(name, ..)| *name))
        .map(str::to_string)
        .collect()
}

fn word_count(text: &str) -> usize {
    text.split_whitespace()
        .filter(|word| word.chars().any(char::is_alphanumeric))
        .count()
}

/// Words covered by term matches over total words, capped at 1
fn density(pattern: &Regex, text: &str, words: usize) -> f64 {
    if words == 0 {
        return 0.0;
    }
    let covered: usize = pattern
        .find_iter(text)
        .map(|m| m.as_str().split_whitespace().count())
        .sum();
    (covered as f64 / words as f64).min(1.0)
}

fn presence(checks: &[bool]) -> f64 {
    checks.iter().filter(|hit| **hit).count() as f64 / checks.len() as f64
}

/// Vowel-group syllable estimate with a silent trailing `e`
fn syllables(word: &str) -> usize {
    let letters: Vec<char> = word
        .chars()
        .filter(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if letters.is_empty() {
        return 1;
    }

    let is_vowel = |c: &char| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
    let mut count = 0;
    let mut previous_vowel = false;
    for c in &letters {
        let vowel = is_vowel(c);
        if vowel && !previous_vowel {
            count += 1;
        }
        previous_vowel = vowel;
    }

    let silent_e = letters.len() > 2
        && letters.ends_with(&['e'])
        && !letters.ends_with(&['l', 'e'])
        && !is_vowel(&letters[letters.len() - 2]);
    if silent_e && count > 1 {
        count -= 1;
    }
    count.max(1)
}

/// Flesch reading ease mapped to [0, 1]
fn readability(text: &str, words: usize, sentences: usize) -> f64 {
    if words == 0 {
        return 0.0;
    }
    let total_syllables: usize = text
        .split_whitespace()
        .filter(|word| word.chars().any(char::is_alphanumeric))
        .map(syllables)
        .sum();

    let words_per_sentence = words as f64 / sentences.max(1) as f64;
    let syllables_per_word = total_syllables as f64 / words as f64;
    let ease = 206.835 - 1.015 * words_per_sentence - 84.6 * syllables_per_word;

    (ease / 100.0).clamp(0.0, 1.0)
}
