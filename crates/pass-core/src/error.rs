//! Error types for pass-core

use thiserror::Error;

/// Result type alias using pass-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in pass-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Ciphertext failed authentication or could not be opened
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// The key rotation a payload was sealed with is not in the key ring
    #[error("Share key rotation {rotation} not found for share {share_id}")]
    KeyNotFound { share_id: String, rotation: u32 },

    /// Share target type the client does not understand
    #[error("Unsupported share type: {0}")]
    UnsupportedShareType(u8),

    /// The API answered with an error status
    #[error("API error {code}: {message}")]
    Api { code: u16, message: String },

    /// The API could not be reached
    #[error("Network error: {0}")]
    Network(String),

    /// Key/value storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Share or item not found locally
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether retrying the same call later may succeed.
    ///
    /// The core never retries by itself; this only helps callers pick a policy.
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Api { code, .. } => *code == 429 || *code >= 500,
            _ => false,
        }
    }

    /// The API reported that the share no longer exists or is not accessible.
    pub const fn is_share_gone(&self) -> bool {
        matches!(self, Self::Api { code: 404 | 410, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(Error::Network("reset".to_string()).is_transient());
        assert!(Error::Api {
            code: 503,
            message: "down".to_string()
        }
        .is_transient());
        assert!(!Error::Api {
            code: 422,
            message: "bad".to_string()
        }
        .is_transient());
        assert!(!Error::Decryption("tag".to_string()).is_transient());
    }

    #[test]
    fn share_gone_only_for_missing_share_codes() {
        assert!(Error::Api {
            code: 404,
            message: String::new()
        }
        .is_share_gone());
        assert!(!Error::Network(String::new()).is_share_gone());
    }
}
