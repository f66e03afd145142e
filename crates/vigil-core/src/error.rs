use thiserror::Error;

/// Result type alias for vigil operations
pub type Result<T> = std::result::Result<T, VigilError>;

/// Errors that can occur across the feed synchronization pipeline
#[derive(Error, Debug)]
pub enum VigilError {
    /// Fetching one source feed failed (network, timeout, non-2xx).
    /// Always isolated to the source; never fails a collection batch.
    #[error("source '{name}' fetch failed: {reason}")]
    SourceFetch {
        /// Name of the failing source
        name: String,
        /// What went wrong
        reason: String,
    },

    /// A source declares a format we accept in configuration but do not parse
    #[error("source '{name}' has unsupported format '{format}'")]
    UnsupportedFormat {
        /// Name of the source
        name: String,
        /// The declared format
        format: String,
    },

    /// A persisted blob could not be read or parsed
    #[error("store read failed: {0}")]
    StoreRead(String),

    /// The backing store rejected a write
    #[error("store write failed: {0}")]
    StoreWrite(String),

    /// A chunk declared by the chunk index is absent from the store
    #[error("missing chunk {index} of {total}")]
    MissingChunk {
        /// Zero-based index of the missing chunk
        index: usize,
        /// Total chunks the index declared
        total: usize,
    },

    /// Rate limit exceeded (HTTP 429)
    #[error("rate limit exceeded, retry after {retry_after:?} seconds")]
    RateLimited {
        /// Seconds to wait before retrying, if the API said
        retry_after: Option<u64>,
    },

    /// The downstream API returned an error response
    #[error("API error ({code}): {message}")]
    Api {
        /// HTTP status code
        code: u16,
        /// Error message from the API
        message: String,
    },

    /// HTTP request failed before a response was received
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Configuration is invalid (bad credentials, malformed source entries)
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON parsing/serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error from a disk-backed store
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl VigilError {
    /// Returns true if the error should be retried with backoff.
    ///
    /// Only rate limiting qualifies; every other downstream failure
    /// surfaces immediately rather than being blindly retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Returns the HTTP status code if this maps to an API response
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::RateLimited { .. } => Some(429),
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if the error aborts a whole cycle rather than a
    /// single source or list
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::StoreWrite(_) | Self::MissingChunk { .. } | Self::Config(_)
        )
    }
}
