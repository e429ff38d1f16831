//! Docker Registry HTTP API v2 pull support.
//!
//! This module turns an image reference into a legacy image tarball
//! loadable with `docker load`. It supports:
//!
//! - Reference parsing (registry, namespace, image, tag or digest)
//! - Bearer token negotiation from the registry's auth challenge
//! - Manifest resolution with fallback to manifest lists
//! - Sequential layer download with synthetic parent-chained layer ids
//!
//! # Flow
//!
//! ```text
//! ImageReference ──► AuthNegotiator ──► ManifestResolver ──► LayerAssembler ──► archive
//!    (parse)          (GET /v2/,          (schema 2, then      (per layer:         (manifest.json,
//!                      token realm)        manifest list)       token, blob, gunzip) repositories, tar)
//! ```

pub mod archive;
pub mod auth;
pub mod layers;
pub mod manifest;
pub mod progress;
mod pull;
pub mod reference;

pub use auth::{AuthChallenge, AuthContext, AuthNegotiator, BearerToken};
pub use layers::{synthetic_layer_id, LayerAssembler, SyntheticLayerRecord};
pub use manifest::{LayerDescriptor, Manifest, ManifestResolver, MANIFEST_LIST_V2, MANIFEST_V2};
pub use progress::{short_digest, PullObserver, SilentObserver};
pub use pull::{ImagePuller, PulledImage};
pub use reference::{ImageReference, ReferenceTarget};
