//! Layer download and legacy layer directory assembly.
//!
//! Each manifest layer becomes a directory named by a synthetic id chained
//! from its parent, holding `VERSION`, the decompressed `layer.tar` and a
//! `json` config record.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use docker_pull_core::error::{PullError, Result};
use flate2::read::MultiGzDecoder;
use reqwest::header::HeaderMap;
use reqwest::{Response, StatusCode};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use super::auth::AuthNegotiator;
use super::manifest::{LayerDescriptor, Manifest, MANIFEST_V2};
use super::progress::{ProgressTicker, PullObserver};

/// Content of every layer's `VERSION` file.
pub const LAYER_VERSION: &str = "1.0";

/// Compressed download, removed once `layer.tar` is written.
const LAYER_GZIP_FILE: &str = "layer_gzip.tar";

const LAYER_TAR_FILE: &str = "layer.tar";

/// Synthetic id of a layer: `sha256(parent_id + "\n" + digest + "\n")`, hex.
///
/// `parent_id` is empty for the bottom layer.
pub fn synthetic_layer_id(parent_id: &str, digest: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parent_id.as_bytes());
    hasher.update(b"\n");
    hasher.update(digest.as_bytes());
    hasher.update(b"\n");
    hex::encode(hasher.finalize())
}

/// Config record of every layer below the top one.
pub fn placeholder_config() -> Value {
    json!({
        "created": "1970-01-01T00:00:00Z",
        "container_config": {
            "Hostname": "",
            "Domainname": "",
            "User": "",
            "AttachStdin": false,
            "AttachStdout": false,
            "AttachStderr": false,
            "Tty": false,
            "OpenStdin": false,
            "StdinOnce": false,
            "Env": null,
            "Cmd": null,
            "Image": "",
            "Volumes": null,
            "WorkingDir": "",
            "Entrypoint": null,
            "OnBuild": null,
            "Labels": null
        }
    })
}

/// Drop `history` and the rootfs section from an image config.
///
/// Registries disagree on the capitalization of `rootfs`, so the key is
/// matched case-insensitively.
pub fn strip_image_config(config: Value) -> Result<Value> {
    match config {
        Value::Object(mut map) => {
            map.retain(|key, _| key != "history" && !key.eq_ignore_ascii_case("rootfs"));
            Ok(Value::Object(map))
        }
        other => Err(PullError::SerializationError(format!(
            "Image config is not a JSON object: {}",
            other
        ))),
    }
}

/// Add `id` and, for all but the bottom layer, `parent` to a config record.
pub fn layer_json(base: Value, id: &str, parent_id: Option<&str>) -> Result<Value> {
    let Value::Object(mut map) = base else {
        return Err(PullError::SerializationError(
            "Layer config is not a JSON object".to_string(),
        ));
    };
    map.insert("id".to_string(), Value::String(id.to_string()));
    if let Some(parent) = parent_id.filter(|p| !p.is_empty()) {
        map.insert("parent".to_string(), Value::String(parent.to_string()));
    }
    Ok(Value::Object(map))
}

/// Decompress a gzip layer into a plain tar. Returns the bytes written.
pub fn decompress_layer(gzip_path: &Path, tar_path: &Path) -> Result<u64> {
    let input = File::open(gzip_path)?;
    let mut decoder = MultiGzDecoder::new(input);
    let mut output = BufWriter::new(File::create(tar_path)?);
    let written = std::io::copy(&mut decoder, &mut output)?;
    output.flush()?;

    tracing::debug!(
        source = %gzip_path.display(),
        target = %tar_path.display(),
        bytes = written,
        "Decompressed layer"
    );
    Ok(written)
}

/// One layer directory of the legacy layout.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticLayerRecord {
    /// Synthetic id, also the directory name
    pub id: String,
    pub parent_id: Option<String>,
    /// Path of `layer.tar`
    pub layer_tar_path: PathBuf,
    /// Content written to the `json` file
    pub config: Value,
}

impl SyntheticLayerRecord {
    /// Path of the layer inside the archive (`<id>/layer.tar`).
    pub fn archive_path(&self) -> String {
        format!("{}/{}", self.id, LAYER_TAR_FILE)
    }
}

/// Writes a blob in fixed `chunk_size` pieces, ticking progress per piece.
struct ChunkedSink<W: Write> {
    writer: W,
    chunk_size: usize,
    ticker: ProgressTicker,
    written: u64,
}

impl<W: Write> ChunkedSink<W> {
    fn new(writer: W, chunk_size: usize, ticker: ProgressTicker) -> Self {
        Self {
            writer,
            chunk_size: chunk_size.max(1),
            ticker,
            written: 0,
        }
    }

    /// Write `data`; `on_tick` receives the running total at each increment.
    fn feed(&mut self, data: &[u8], mut on_tick: impl FnMut(u64)) -> Result<()> {
        for piece in data.chunks(self.chunk_size) {
            self.writer.write_all(piece)?;
            self.written += piece.len() as u64;
            if self.ticker.advance(piece.len() as u64) {
                on_tick(self.written);
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Result<u64> {
        self.writer.flush()?;
        Ok(self.written)
    }
}

/// Downloads layers one after another and writes their directories.
pub struct LayerAssembler<'a> {
    http: reqwest::Client,
    blobs_url: String,
    negotiator: &'a AuthNegotiator,
    chunk_size: usize,
    progress_steps: u64,
}

impl<'a> LayerAssembler<'a> {
    /// `blobs_url` is `{registry_base}/{repository}/blobs`.
    pub fn new(
        http: reqwest::Client,
        blobs_url: impl Into<String>,
        negotiator: &'a AuthNegotiator,
        chunk_size: usize,
        progress_steps: u64,
    ) -> Self {
        Self {
            http,
            blobs_url: blobs_url.into(),
            negotiator,
            chunk_size: chunk_size.max(1),
            progress_steps,
        }
    }

    /// Fetch the image config blob.
    pub async fn fetch_config(&self, digest: &str) -> Result<Vec<u8>> {
        let headers = self.negotiator.authorize(MANIFEST_V2).await?;
        let resp = self.get(&self.blob_url(digest), &headers).await?;
        if resp.status() != StatusCode::OK {
            return Err(blob_error(digest, resp).await);
        }
        Ok(resp.bytes().await?.to_vec())
    }

    /// Build every layer directory under `working_dir`, bottom layer first.
    ///
    /// `config_blob` is the raw image config; it becomes the `json` record of
    /// the top layer. The last returned record is the top layer.
    pub async fn assemble(
        &self,
        working_dir: &Path,
        manifest: &Manifest,
        config_blob: &[u8],
        observer: &mut dyn PullObserver,
    ) -> Result<Vec<SyntheticLayerRecord>> {
        let mut records = Vec::with_capacity(manifest.layers.len());
        let mut parent_id = String::new();

        for (index, layer) in manifest.layers.iter().enumerate() {
            let is_top = index + 1 == manifest.layers.len();
            let base = if is_top {
                strip_image_config(serde_json::from_slice(config_blob)?)?
            } else {
                placeholder_config()
            };

            let record = self
                .assemble_layer(working_dir, layer, &parent_id, base, observer)
                .await?;
            parent_id = record.id.clone();
            records.push(record);
        }

        Ok(records)
    }

    async fn assemble_layer(
        &self,
        working_dir: &Path,
        layer: &LayerDescriptor,
        parent_id: &str,
        base: Value,
        observer: &mut dyn PullObserver,
    ) -> Result<SyntheticLayerRecord> {
        let id = synthetic_layer_id(parent_id, &layer.digest);
        let layer_dir = working_dir.join(&id);
        std::fs::create_dir(&layer_dir)?;
        std::fs::write(layer_dir.join("VERSION"), LAYER_VERSION)?;

        tracing::debug!(digest = %layer.digest, id = %id, "Pulling layer");
        observer.layer_started(&layer.digest);

        let gzip_path = layer_dir.join(LAYER_GZIP_FILE);
        let size = self.download(layer, &gzip_path, observer).await?;

        observer.layer_extracting(&layer.digest);
        let layer_tar_path = layer_dir.join(LAYER_TAR_FILE);
        decompress_layer(&gzip_path, &layer_tar_path)?;
        std::fs::remove_file(&gzip_path)?;

        let parent = (!parent_id.is_empty()).then(|| parent_id.to_string());
        let config = layer_json(base, &id, parent.as_deref())?;
        std::fs::write(layer_dir.join("json"), serde_json::to_vec(&config)?)?;

        observer.layer_complete(&layer.digest, size);
        tracing::info!(digest = %layer.digest, id = %id, size, "Layer pulled");

        Ok(SyntheticLayerRecord {
            id,
            parent_id: parent,
            layer_tar_path,
            config,
        })
    }

    /// Stream a layer blob to `dest`. Returns the number of bytes written.
    async fn download(
        &self,
        layer: &LayerDescriptor,
        dest: &Path,
        observer: &mut dyn PullObserver,
    ) -> Result<u64> {
        let mut resp = self.open_blob(layer).await?;
        let total = resp.content_length().unwrap_or(layer.size);

        let writer = BufWriter::with_capacity(self.chunk_size, File::create(dest)?);
        let mut sink = ChunkedSink::new(
            writer,
            self.chunk_size,
            ProgressTicker::new(total, self.progress_steps),
        );
        observer.download_progress(&layer.digest, 0, total);

        while let Some(chunk) = resp.chunk().await? {
            sink.feed(&chunk, |downloaded| {
                observer.download_progress(&layer.digest, downloaded, total)
            })?;
        }

        sink.finish()
    }

    /// GET the blob from the registry, then from the first fallback URL.
    async fn open_blob(&self, layer: &LayerDescriptor) -> Result<Response> {
        // Fresh token per layer.
        let headers = self.negotiator.authorize(MANIFEST_V2).await?;

        let resp = self.get(&self.blob_url(&layer.digest), &headers).await?;
        if resp.status() == StatusCode::OK {
            return Ok(resp);
        }

        let Some(fallback) = layer.urls.first() else {
            return Err(blob_error(&layer.digest, resp).await);
        };

        tracing::debug!(
            digest = %layer.digest,
            status = resp.status().as_u16(),
            url = %fallback,
            "Blob not served by registry, trying layer URL"
        );
        let resp = self.get(fallback, &headers).await?;
        if resp.status() == StatusCode::OK {
            Ok(resp)
        } else {
            Err(blob_error(&layer.digest, resp).await)
        }
    }

    fn blob_url(&self, digest: &str) -> String {
        format!("{}/{}", self.blobs_url, digest)
    }

    async fn get(&self, url: &str, headers: &HeaderMap) -> Result<Response> {
        Ok(self.http.get(url).headers(headers.clone()).send().await?)
    }
}

async fn blob_error(digest: &str, resp: Response) -> PullError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    PullError::BlobFetchError {
        digest: digest.to_string(),
        status,
        body,
    }
}
