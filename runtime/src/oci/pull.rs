//! High-level pull orchestrator.
//!
//! Runs one pull end to end: probe the registry for its token service,
//! resolve the manifest, assemble the layers in order and package the
//! legacy image archive. Every run downloads everything again.
//!
//! A failed run leaves its working directory behind; only a successful
//! run removes it.

use std::path::PathBuf;

use docker_pull_core::config::PullConfig;
use docker_pull_core::error::{PullError, Result};

use super::archive::{build_manifest_json, build_repositories_json, config_file_name, package_archive};
use super::auth::{build_http_client, AuthNegotiator};
use super::layers::{LayerAssembler, SyntheticLayerRecord};
use super::manifest::ManifestResolver;
use super::progress::PullObserver;
use super::reference::ImageReference;

/// Outcome of a successful pull.
#[derive(Debug, Clone)]
pub struct PulledImage {
    /// Path of the written image archive
    pub archive: PathBuf,
    /// Tag recorded in `manifest.json`
    pub repo_tag: String,
    /// Layer records, bottom layer first
    pub layers: Vec<SyntheticLayerRecord>,
}

impl PulledImage {
    /// Synthetic id of the top layer, which the `repositories` tag points at.
    pub fn top_layer_id(&self) -> Option<&str> {
        self.layers.last().map(|l| l.id.as_str())
    }
}

/// Pulls images into legacy `docker load` archives.
pub struct ImagePuller {
    config: PullConfig,
    http: reqwest::Client,
}

impl ImagePuller {
    /// Create a new image puller.
    pub fn new(config: PullConfig) -> Result<Self> {
        let http = build_http_client(&config)?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &PullConfig {
        &self.config
    }

    /// Parse `image` and pull it.
    pub async fn pull(&self, image: &str, observer: &mut dyn PullObserver) -> Result<PulledImage> {
        let reference = ImageReference::parse(image);
        self.pull_reference(&reference, observer).await
    }

    /// Pull an already parsed reference.
    pub async fn pull_reference(
        &self,
        reference: &ImageReference,
        observer: &mut dyn PullObserver,
    ) -> Result<PulledImage> {
        let repository = reference.repository();
        let base = self.config.registry_base(&reference.registry);

        tracing::info!(reference = %reference, "Pulling image from registry");

        let negotiator = AuthNegotiator::discover(
            self.http.clone(),
            &self.config,
            &reference.registry,
            repository.clone(),
        )
        .await?;

        let manifest = ManifestResolver::new(self.http.clone(), base.clone())
            .resolve(reference, &negotiator, observer)
            .await?;
        if manifest.layers.is_empty() {
            return Err(PullError::SerializationError(format!(
                "Manifest for {} lists no layers",
                reference
            )));
        }

        let working_dir = self.config.output_dir.join(reference.working_dir_name());
        std::fs::create_dir(&working_dir)?;
        observer.working_dir_created(&working_dir);

        let assembler = LayerAssembler::new(
            self.http.clone(),
            format!("{}/{}/blobs", base, repository),
            &negotiator,
            self.config.chunk_size,
            self.config.progress_steps,
        );

        let config_blob = assembler.fetch_config(manifest.config_digest()).await?;
        std::fs::write(
            working_dir.join(config_file_name(manifest.config_digest())),
            &config_blob,
        )?;

        let layers = assembler
            .assemble(&working_dir, &manifest, &config_blob, observer)
            .await?;

        let repo_tag = reference.repo_tag();
        let layer_paths: Vec<String> = layers.iter().map(|l| l.archive_path()).collect();
        let manifest_json = build_manifest_json(manifest.config_digest(), &repo_tag, &layer_paths);
        std::fs::write(
            working_dir.join("manifest.json"),
            serde_json::to_vec(&manifest_json)?,
        )?;

        let top_layer_id = layers.last().map(|l| l.id.as_str()).unwrap_or_default();
        let repositories = build_repositories_json(
            &reference.repositories_key(),
            reference.tag_or_digest(),
            top_layer_id,
        );
        std::fs::write(
            working_dir.join("repositories"),
            serde_json::to_vec(&repositories)?,
        )?;

        let archive = self.config.output_dir.join(reference.archive_name());
        observer.archiving(&archive);
        package_archive(&working_dir, &archive)?;

        tracing::info!(
            reference = %reference,
            archive = %archive.display(),
            layers = layers.len(),
            "Image pulled successfully"
        );

        Ok(PulledImage {
            archive,
            repo_tag,
            layers,
        })
    }
}
