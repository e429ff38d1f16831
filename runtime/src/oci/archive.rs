//! Legacy image tarball packaging.
//!
//! Writes the top-level `manifest.json` and `repositories` index and tars the
//! working directory into a file `docker load` accepts:
//!
//! ```text
//! <archive>.tar
//! ├── <config-hex>.json
//! ├── manifest.json
//! ├── repositories
//! └── <layer-id>/
//!     ├── VERSION
//!     ├── json
//!     └── layer.tar
//! ```

use std::fs::File;
use std::path::Path;

use docker_pull_core::error::Result;
use serde_json::{json, Value};

/// Name of the config file at the archive root: the digest's hex part plus `.json`.
pub fn config_file_name(config_digest: &str) -> String {
    let hex = config_digest
        .split_once(':')
        .map_or(config_digest, |(_, hex)| hex);
    format!("{}.json", hex)
}

/// `[{"Config": ..., "RepoTags": [...], "Layers": [...]}]`
pub fn build_manifest_json<S: AsRef<str>>(
    config_digest: &str,
    repo_tag: &str,
    layer_paths: &[S],
) -> Value {
    let layers: Vec<&str> = layer_paths.iter().map(AsRef::as_ref).collect();
    json!([{
        "Config": config_file_name(config_digest),
        "RepoTags": [repo_tag],
        "Layers": layers,
    }])
}

/// `{"<repository>": {"<tag>": "<top layer id>"}}`
pub fn build_repositories_json(repository_key: &str, tag: &str, final_layer_id: &str) -> Value {
    json!({ repository_key: { tag: final_layer_id } })
}

/// Tar the contents of `working_dir` into `output_path`, then remove `working_dir`.
///
/// Entries are rooted at the archive root, not under the directory's name.
pub fn package_archive(working_dir: &Path, output_path: &Path) -> Result<()> {
    let file = File::create(output_path)?;
    let mut builder = tar::Builder::new(file);
    builder.append_dir_all(".", working_dir)?;
    builder.into_inner()?.sync_all()?;

    std::fs::remove_dir_all(working_dir)?;

    tracing::info!(
        archive = %output_path.display(),
        "Image archive written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_config_file_name() {
        assert_eq!(config_file_name("sha256:abc123"), "abc123.json");
        assert_eq!(config_file_name("abc123"), "abc123.json");
    }

    #[test]
    fn test_build_manifest_json() {
        let manifest = build_manifest_json(
            "sha256:cfg",
            "library/nginx:stable",
            &["id0/layer.tar", "id1/layer.tar", "id2/layer.tar"],
        );
        let entries = manifest.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["Config"], "cfg.json");
        assert_eq!(entries[0]["RepoTags"], json!(["library/nginx:stable"]));
        assert_eq!(
            entries[0]["Layers"],
            json!(["id0/layer.tar", "id1/layer.tar", "id2/layer.tar"])
        );
    }

    #[test]
    fn test_build_manifest_json_key_order() {
        let manifest = build_manifest_json("sha256:cfg", "nginx:latest", &Vec::<String>::new());
        let keys: Vec<&String> = manifest[0].as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["Config", "RepoTags", "Layers"]);
    }

    #[test]
    fn test_build_repositories_json() {
        let repositories = build_repositories_json("nginx", "latest", "deadbeef");
        assert_eq!(repositories, json!({"nginx": {"latest": "deadbeef"}}));
    }

    #[test]
    fn test_package_archive_roots_entries() {
        let out = TempDir::new().unwrap();
        let working_dir = out.path().join("tmp_nginx_latest");
        fs::create_dir(&working_dir).unwrap();
        fs::write(working_dir.join("manifest.json"), "[]").unwrap();
        fs::create_dir(working_dir.join("abc")).unwrap();
        fs::write(working_dir.join("abc").join("VERSION"), "1.0").unwrap();

        let archive_path = out.path().join("library_nginx.tar");
        package_archive(&working_dir, &archive_path).unwrap();

        assert!(!working_dir.exists());

        let extract = TempDir::new().unwrap();
        tar::Archive::new(File::open(&archive_path).unwrap())
            .unpack(extract.path())
            .unwrap();
        assert_eq!(
            fs::read_to_string(extract.path().join("manifest.json")).unwrap(),
            "[]"
        );
        assert_eq!(
            fs::read_to_string(extract.path().join("abc").join("VERSION")).unwrap(),
            "1.0"
        );
        assert!(!extract.path().join("tmp_nginx_latest").exists());
    }

    #[test]
    fn test_package_archive_invalid_output() {
        let src = TempDir::new().unwrap();
        let result = package_archive(src.path(), Path::new("/nonexistent/dir/test.tar"));
        assert!(result.is_err());
        assert!(src.path().exists());
    }
}
