use thiserror::Error;

/// A platform-specific manifest offered by a manifest list.
///
/// Carried by [`PullError::ManifestListFound`] so the caller can show the
/// user which `@digest` to pull instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformCandidate {
    /// Manifest digest (e.g. "sha256:abc...")
    pub digest: String,
    /// Platform attributes in document order (architecture, os, variant, ...)
    pub platform: Vec<(String, String)>,
}

impl PlatformCandidate {
    /// Render as `key: value, key: value, digest: <digest>`.
    pub fn describe(&self) -> String {
        let mut line = String::new();
        for (key, value) in &self.platform {
            line.push_str(&format!("{key}: {value}, "));
        }
        line.push_str(&format!("digest: {}", self.digest));
        line
    }
}

/// docker-pull error types
#[derive(Error, Debug)]
pub enum PullError {
    /// Token endpoint unreachable or answered without a token
    #[error("Auth error: {realm} - {message}")]
    AuthError { realm: String, message: String },

    /// Both the schema 2 manifest and the manifest list were refused
    #[error(
        "Cannot fetch manifest for {repository} [HTTP {status}]: {body}; \
         manifest list [HTTP {list_status}]: {list_body}"
    )]
    ManifestError {
        repository: String,
        status: u16,
        body: String,
        list_status: u16,
        list_body: String,
    },

    /// The tag resolves to a multi-platform manifest list
    #[error(
        "{repository} resolves to a manifest list with {} platforms; \
         use the @digest format to pull one of them",
        candidates.len()
    )]
    ManifestListFound {
        repository: String,
        candidates: Vec<PlatformCandidate>,
    },

    /// Blob refused by the registry and by the fallback URL
    #[error("Cannot download layer {digest} [HTTP {status}]: {body}")]
    BlobFetchError {
        digest: String,
        status: u16,
        body: String,
    },

    /// Transport failure (connection refused, TLS, body read)
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<serde_json::Error> for PullError {
    fn from(err: serde_json::Error) -> Self {
        PullError::SerializationError(err.to_string())
    }
}

impl From<reqwest::Error> for PullError {
    fn from(err: reqwest::Error) -> Self {
        PullError::HttpError(err.to_string())
    }
}

/// Result type alias for docker-pull operations
pub type Result<T> = std::result::Result<T, PullError>;
