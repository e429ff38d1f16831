//! docker-pull Core - Shared Types
//!
//! Error taxonomy and configuration shared by the pull runtime and the CLI.

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{PullConfig, RegistryScheme};
pub use error::{PlatformCandidate, PullError, Result};

/// docker-pull version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
