use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Docker Hub token service, used when a registry does not challenge.
pub const DEFAULT_AUTH_REALM: &str = "https://auth.docker.io/token";

/// Docker Hub service name matching [`DEFAULT_AUTH_REALM`].
pub const DEFAULT_AUTH_SERVICE: &str = "registry.docker.io";

/// Piece size for blob downloads.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Number of increments the download progress is reported in.
pub const DEFAULT_PROGRESS_STEPS: u64 = 50;

/// URL scheme used to reach registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryScheme {
    Https,
    /// Plain HTTP, for local registries.
    Http,
}

impl Default for RegistryScheme {
    fn default() -> Self {
        Self::Https
    }
}

impl std::fmt::Display for RegistryScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Https => write!(f, "https"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// Pull configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullConfig {
    /// Scheme for registry requests
    pub scheme: RegistryScheme,

    /// Token endpoint used when the registry probe returns no challenge
    pub default_auth_realm: String,

    /// Service name paired with `default_auth_realm`
    pub default_auth_service: String,

    /// Directory receiving the working directory and the final archive
    pub output_dir: PathBuf,

    /// Skip TLS certificate verification
    pub accept_invalid_certs: bool,

    /// Size of the pieces a blob download is written and counted in
    pub chunk_size: usize,

    /// Progress increments per layer download
    pub progress_steps: u64,
}

impl Default for PullConfig {
    fn default() -> Self {
        Self {
            scheme: RegistryScheme::Https,
            default_auth_realm: DEFAULT_AUTH_REALM.to_string(),
            default_auth_service: DEFAULT_AUTH_SERVICE.to_string(),
            output_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            // Certificate checks are off unless DOCKER_PULL_VERIFY_TLS is set.
            accept_invalid_certs: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress_steps: DEFAULT_PROGRESS_STEPS,
        }
    }
}

impl PullConfig {
    /// Build a configuration from the process environment.
    ///
    /// Recognized variables:
    /// - `DOCKER_PULL_PLAIN_HTTP=1` talks plain HTTP to registries
    /// - `DOCKER_PULL_AUTH_REALM` / `DOCKER_PULL_AUTH_SERVICE` replace the Docker Hub defaults
    /// - `DOCKER_PULL_OUTPUT_DIR` sets where the archive is written
    /// - `DOCKER_PULL_VERIFY_TLS=1` turns certificate verification back on
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if lookup("DOCKER_PULL_PLAIN_HTTP").map_or(false, |v| is_truthy(&v)) {
            config.scheme = RegistryScheme::Http;
        }
        if let Some(realm) = lookup("DOCKER_PULL_AUTH_REALM").filter(|v| !v.is_empty()) {
            config.default_auth_realm = realm;
        }
        if let Some(service) = lookup("DOCKER_PULL_AUTH_SERVICE") {
            config.default_auth_service = service;
        }
        if let Some(dir) = lookup("DOCKER_PULL_OUTPUT_DIR").filter(|v| !v.is_empty()) {
            config.output_dir = PathBuf::from(dir);
        }
        if lookup("DOCKER_PULL_VERIFY_TLS").map_or(false, |v| is_truthy(&v)) {
            config.accept_invalid_certs = false;
        }

        config
    }

    /// Base URL of the registry API for `host`, without trailing slash.
    pub fn registry_base(&self, host: &str) -> String {
        format!("{}://{}/v2", self.scheme, host)
    }
}

fn is_truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("yes")
}
