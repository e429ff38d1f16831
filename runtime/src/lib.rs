//! docker-pull Runtime - Registry pull engine.
//!
//! This module provides the pull implementation: reference parsing, token
//! negotiation, manifest resolution, layer assembly and legacy image
//! archive packaging.

pub mod oci;

// Re-export common types
pub use oci::{ImagePuller, ImageReference, PullObserver, PulledImage, SilentObserver};

/// docker-pull Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
