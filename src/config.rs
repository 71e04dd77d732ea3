use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::RagError;
use crate::schema::MessageType;
use crate::strategies::{HYBRID, StrategyRegistry};

/// Connection settings for one LLM provider
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Base URL of the provider API
    pub api_endpoint: String,
    /// Environment variable name containing the API key
    pub env_var_api_key: String,
    /// Temperature for response generation (0.0 to 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Maximum tokens for response generation
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Rate limit for API requests per second
    #[serde(default = "default_rate_limit")]
    pub rate_limit_rps: f64,
    /// HTTP timeout for a single request
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_temperature() -> f64 {
    0.3
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_rate_limit() -> f64 {
    10.0
}

fn default_timeout_secs() -> u64 {
    120
}

impl ProviderConfig {
    fn with_endpoint(api_endpoint: &str, env_var_api_key: &str) -> Self {
        Self {
            api_endpoint: api_endpoint.to_string(),
            env_var_api_key: env_var_api_key.to_string(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            rate_limit_rps: default_rate_limit(),
            request_timeout_secs: default_timeout_secs(),
        }
    }

    pub fn openai() -> Self {
        Self::with_endpoint("https://api.openai.com/v1", "OPENAI_API_KEY")
    }

    pub fn gemini() -> Self {
        Self::with_endpoint(
            "https://generativelanguage.googleapis.com/v1beta",
            "GEMINI_API_KEY",
        )
    }
}

/// Base weights and blending parameters of the hybrid strategy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HybridConfig {
    #[serde(default = "default_simple_weight")]
    pub simple: f64,
    #[serde(default = "default_context_weight")]
    pub context: f64,
    #[serde(default = "default_reranker_weight")]
    pub reranker: f64,
    /// Strategies scoring below this confidence lose weight proportionally
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Number of context chunks the reranker keeps
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_simple_weight() -> f64 {
    0.3
}

fn default_context_weight() -> f64 {
    0.4
}

fn default_reranker_weight() -> f64 {
    0.3
}

fn default_confidence_threshold() -> f64 {
    0.75
}

fn default_top_k() -> usize {
    3
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            simple: default_simple_weight(),
            context: default_context_weight(),
            reranker: default_reranker_weight(),
            confidence_threshold: default_confidence_threshold(),
            top_k: default_top_k(),
        }
    }
}

impl HybridConfig {
    pub fn validate(&self) -> Result<(), RagError> {
        let weights = [self.simple, self.context, self.reranker];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(RagError::config("hybrid weights must be finite and non-negative"));
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err(RagError::config("hybrid weights must not all be zero"));
        }
        if !(self.confidence_threshold > 0.0 && self.confidence_threshold <= 1.0) {
            return Err(RagError::config("confidence_threshold must be in (0, 1]"));
        }
        if self.top_k == 0 {
            return Err(RagError::config("top_k must be at least 1"));
        }
        Ok(())
    }
}

/// What a comparison run iterates over
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunConfig {
    /// Model names; `gpt*` goes to OpenAI, `gemini*` to Gemini
    #[serde(default = "default_models")]
    pub models: Vec<String>,
    #[serde(default = "default_message_types")]
    pub message_types: Vec<MessageType>,
    /// Synthetic messages generated per message type
    #[serde(default = "default_messages_per_type")]
    pub messages_per_type: usize,
    #[serde(default = "default_methods")]
    pub methods: Vec<String>,
    /// Explicit queries; when empty the built-in scenario catalog is used
    #[serde(default)]
    pub queries: Vec<String>,
    /// XML files to evaluate in addition to the generated messages
    #[serde(default)]
    pub message_files: Vec<PathBuf>,
    /// Seed for the message generator
    #[serde(default)]
    pub seed: Option<u64>,
    /// Optional local path to store the report as JSON
    #[serde(default)]
    pub storage_path: Option<String>,
}

fn default_models() -> Vec<String> {
    vec!["gpt-4".to_string(), "gemini-1.5-pro".to_string()]
}

fn default_message_types() -> Vec<MessageType> {
    MessageType::ALL.to_vec()
}

fn default_messages_per_type() -> usize {
    1
}

fn default_methods() -> Vec<String> {
    StrategyRegistry::standard()
        .names()
        .into_iter()
        .chain(std::iter::once(HYBRID))
        .map(str::to_string)
        .collect()
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            models: default_models(),
            message_types: default_message_types(),
            messages_per_type: default_messages_per_type(),
            methods: default_methods(),
            queries: Vec::new(),
            message_files: Vec::new(),
            seed: None,
            storage_path: None,
        }
    }
}

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "ProviderConfig::openai")]
    pub openai: ProviderConfig,
    #[serde(default = "ProviderConfig::gemini")]
    pub gemini: ProviderConfig,
    #[serde(default)]
    pub hybrid: HybridConfig,
    #[serde(default)]
    pub run: RunConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai: ProviderConfig::openai(),
            gemini: ProviderConfig::gemini(),
            hybrid: HybridConfig::default(),
            run: RunConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid configuration: {}", path.display()))?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RagError> {
        self.hybrid.validate()?;

        let registry = StrategyRegistry::standard();
        for method in &self.run.methods {
            if method != HYBRID && registry.get(method).is_none() {
                return Err(RagError::config(format!("unknown method: {method}")));
            }
        }
        for provider in [&self.openai, &self.gemini] {
            if provider.rate_limit_rps.is_nan() {
                return Err(RagError::config("rate_limit_rps must be a number"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_parsing() {
        let toml_content = r#"
[openai]
api_endpoint = "https://api.openai.com/v1"
env_var_api_key = "OPENAI_API_KEY"
temperature = 0.5
max_tokens = 200
rate_limit_rps = 5.0

[gemini]
api_endpoint = "http://localhost:9999/v1beta"
env_var_api_key = "MY_GEMINI_KEY"

[hybrid]
simple = 0.2
context = 0.5
reranker = 0.3
confidence_threshold = 0.6

[run]
models = ["gpt-4"]
message_types = ["pacs.008", "camt.053"]
messages_per_type = 2
methods = ["simple", "hybrid"]
queries = ["Check compliance aspects"]
storage_path = "/tmp/responses.json"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", toml_content).unwrap();

        let config = Config::from_file(temp_file.path()).unwrap();
        assert_eq!(config.openai.temperature, 0.5);
        assert_eq!(config.openai.max_tokens, 200);
        assert_eq!(config.openai.rate_limit_rps, 5.0);
        assert_eq!(config.gemini.env_var_api_key, "MY_GEMINI_KEY");
        assert_eq!(config.hybrid.context, 0.5);
        assert_eq!(config.hybrid.confidence_threshold, 0.6);
        assert_eq!(config.hybrid.top_k, 3);
        assert_eq!(config.run.models, vec!["gpt-4".to_string()]);
        assert_eq!(
            config.run.message_types,
            vec![MessageType::Pacs008, MessageType::Camt053]
        );
        assert_eq!(config.run.messages_per_type, 2);
        assert_eq!(config.run.methods.len(), 2);
        assert_eq!(config.run.storage_path.as_deref(), Some("/tmp/responses.json"));
    }

    #[test]
    fn test_config_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "").unwrap();

        let config = Config::from_file(temp_file.path()).unwrap();
        assert_eq!(config.openai.api_endpoint, "https://api.openai.com/v1");
        assert_eq!(config.openai.env_var_api_key, "OPENAI_API_KEY");
        assert_eq!(config.gemini.env_var_api_key, "GEMINI_API_KEY");
        assert_eq!(config.openai.temperature, 0.3);
        assert_eq!(config.openai.max_tokens, 1000);
        assert_eq!(config.gemini.rate_limit_rps, 10.0);
        assert_eq!(config.hybrid.simple, 0.3);
        assert_eq!(config.hybrid.context, 0.4);
        assert_eq!(config.hybrid.reranker, 0.3);
        assert_eq!(config.run.message_types.len(), 4);
        assert_eq!(
            config.run.methods,
            vec!["simple", "context", "reranker", "hybrid"]
        );
        assert!(config.run.queries.is_empty());
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let mut hybrid = HybridConfig::default();
        hybrid.context = -0.1;
        assert!(matches!(hybrid.validate(), Err(RagError::Config { .. })));

        let zero = HybridConfig {
            simple: 0.0,
            context: 0.0,
            reranker: 0.0,
            ..HybridConfig::default()
        };
        assert!(zero.validate().is_err());

        let threshold = HybridConfig {
            confidence_threshold: 0.0,
            ..HybridConfig::default()
        };
        assert!(threshold.validate().is_err());
    }

    #[test]
    fn test_unknown_method_rejected() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "[run]\nmethods = [\"graph\"]\n").unwrap();

        let err = Config::from_file(temp_file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("unknown method: graph"));
    }

    #[test]
    fn test_unknown_message_type_rejected() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "[run]\nmessage_types = [\"setr.004\"]\n").unwrap();

        assert!(Config::from_file(temp_file.path()).is_err());
    }
}
