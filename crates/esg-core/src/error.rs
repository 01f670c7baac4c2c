use thiserror::Error;

#[derive(Error, Debug)]
pub enum EsgError {
    #[error("Invalid identifier '{input}': {reason}")]
    InvalidIdentifier { input: String, reason: String },

    #[error("Provider failure for {identifier}: {reason}")]
    ProviderFailure { identifier: String, reason: String },

    #[error("Systemic configuration error: {0}")]
    SystemicConfiguration(String),

    #[error("Invalid weights: {0}")]
    InvalidWeights(String),

    #[error("Cache error: {0}")]
    Cache(String),
}

impl EsgError {
    pub fn invalid_identifier(input: impl Into<String>, reason: impl Into<String>) -> Self {
        EsgError::InvalidIdentifier {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error should abort a whole batch rather than a single ticker.
    pub fn is_systemic(&self) -> bool {
        matches!(self, EsgError::SystemicConfiguration(_))
    }
}

pub type EsgResult<T> = Result<T, EsgError>;

/// Upstream provider errors. Never cross the Source Fetcher boundary:
/// they are converted into a `Failure` outcome there.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Rate limited by provider")]
    RateLimited,

    #[error("Symbol not found: {0}")]
    NotFound(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}
