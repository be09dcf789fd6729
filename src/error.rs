use thiserror::Error;

/// Main error type for repograph operations
#[derive(Error, Debug)]
pub enum RepographError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Repository \"{owner}/{repo}\" not found. Make sure the repository exists and is public.")]
    NotFound { owner: String, repo: String },

    #[error("GitHub API rate limit exceeded.{}", rate_limit_hint(.reset_in_minutes))]
    RateLimited { reset_in_minutes: Option<i64> },

    #[error("GitHub is experiencing issues. Please try again in a few minutes.")]
    UpstreamUnavailable,

    #[error("GitHub API returned an error (HTTP {0}).")]
    UpstreamStatus(u16),

    #[error("Network error while contacting GitHub: {0}")]
    Network(String),

    #[error("Unexpected response from GitHub: {0}")]
    UnexpectedResponse(String),

    #[error("Repository has {found} files, exceeding the {limit} file limit. Try a smaller repository.")]
    FileLimit { found: usize, limit: usize },

    #[error("Too many concurrent imports (limit {limit}). Please wait for existing imports to finish.")]
    ConcurrencyLimit { limit: usize },

    #[error("You have reached the maximum of {limit} graphs. Please delete some before importing new ones.")]
    QuotaExceeded { limit: usize },

    #[error("Import timed out ({seconds} second limit).")]
    Timeout { seconds: u64 },

    #[error("Graph not found: {0}")]
    GraphNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification used when reporting failures to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    RateLimited,
    Transient,
    /// The host rejected the request; repeating it unchanged will not help
    Upstream,
    ResourceLimit,
    Timeout,
    Internal,
}

impl RepographError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::NotFound { .. } | Self::GraphNotFound(_) => ErrorKind::NotFound,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::UpstreamUnavailable | Self::Network(_) => ErrorKind::Transient,
            Self::UpstreamStatus(_) | Self::UnexpectedResponse(_) => ErrorKind::Upstream,
            Self::FileLimit { .. } | Self::ConcurrencyLimit { .. } | Self::QuotaExceeded { .. } => {
                ErrorKind::ResourceLimit
            }
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Config(_) | Self::Io(_) | Self::Serialization(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Whether the caller may reasonably try the same request again later
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::RateLimited | ErrorKind::Transient)
    }
}

fn rate_limit_hint(reset_in_minutes: &Option<i64>) -> String {
    match reset_in_minutes {
        Some(minutes) => format!(" Rate limit resets in ~{} minute(s).", minutes),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, RepographError>;
