use thiserror::Error;

use crate::llm::Provider;

/// Errors raised while parsing messages, calling providers or reading configuration.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("failed to parse ISO 20022 message: {message}")]
    Parse { message: String },

    #[error("{provider} API error{}: {payload}", status_suffix(.status))]
    Api {
        provider: Provider,
        status: Option<u16>,
        /// Raw error body or error description returned by the provider
        payload: String,
    },

    #[error("configuration error: {message}")]
    Config { message: String },
}

impl RagError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn api(provider: Provider, status: Option<u16>, payload: impl Into<String>) -> Self {
        Self::Api {
            provider,
            status,
            payload: payload.into(),
        }
    }

    /// Short tag used when errors are recorded in reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse",
            Self::Api { .. } => "api",
            Self::Config { .. } => "config",
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {code})"),
        None => String::new(),
    }
}

pub type RagResult<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display_includes_status_and_payload() {
        let err = RagError::api(Provider::Gemini, Some(403), "API not enabled");
        let text = err.to_string();
        assert!(text.contains("Gemini"));
        assert!(text.contains("HTTP 403"));
        assert!(text.contains("API not enabled"));
        assert_eq!(err.kind(), "api");
    }

    #[test]
    fn test_api_error_display_without_status() {
        let err = RagError::api(Provider::OpenAi, None, "connection reset");
        assert_eq!(err.to_string(), "OpenAI API error: connection reset");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(RagError::parse("bad xml").kind(), "parse");
        assert_eq!(RagError::config("missing key").kind(), "config");
    }
}
