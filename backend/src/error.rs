use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignalError {
    #[error("Provider error: {provider} - {message}")]
    ProviderFailed { provider: String, message: String },

    #[error("Timeout: {provider}")]
    Timeout { provider: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("All providers failed for {0}")]
    Exhausted(String),

    #[error("No data available: {0}")]
    NoData(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SignalError {
    pub fn provider(provider: &str, message: impl Into<String>) -> Self {
        SignalError::ProviderFailed {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SignalError>;
