//! `docker-pull <image>` command.

use std::io::Write;

use clap::Args;
use docker_pull_core::{PullConfig, PullError};
use docker_pull_runtime::{ImagePuller, PulledImage};

use crate::progress::ConsoleProgress;

#[derive(Args)]
pub struct PullArgs {
    /// Image reference: [registry/][repository/]image[:tag|@digest]
    pub image: String,
}

pub async fn execute(args: PullArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = PullConfig::from_env();
    tracing::debug!(?config, "Loaded pull configuration");
    run(&args.image, config, std::io::stdout()).await
}

/// Pull `image`, rendering progress and the outcome to `out`.
pub async fn run<W: Write>(
    image: &str,
    config: PullConfig,
    out: W,
) -> Result<(), Box<dyn std::error::Error>> {
    let puller = ImagePuller::new(config)?;
    let mut progress = ConsoleProgress::new(image, out);
    let result = puller.pull(image, &mut progress).await;
    report(image, result, progress.into_inner())
}

/// Print the final line of a pull, or the candidates of a manifest list.
fn report<W: Write>(
    image: &str,
    result: docker_pull_core::Result<PulledImage>,
    mut out: W,
) -> Result<(), Box<dyn std::error::Error>> {
    match result {
        Ok(pulled) => {
            writeln!(out, "\rDocker image pulled: {}", pulled.archive.display())?;
            Ok(())
        }
        Err(PullError::ManifestListFound { candidates, .. }) => {
            writeln!(
                out,
                "[+] Manifests found for this tag (use the @digest format to pull the corresponding image):"
            )?;
            for candidate in &candidates {
                writeln!(out, "{}", candidate.describe())?;
            }
            Err(format!("{} resolves to a manifest list", image).into())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docker_pull_core::PlatformCandidate;
    use std::path::PathBuf;

    fn candidate(arch: &str, digest: &str) -> PlatformCandidate {
        PlatformCandidate {
            digest: digest.to_string(),
            platform: vec![
                ("architecture".to_string(), arch.to_string()),
                ("os".to_string(), "linux".to_string()),
            ],
        }
    }

    #[test]
    fn test_report_success() {
        let mut out = Vec::new();
        let pulled = PulledImage {
            archive: PathBuf::from("/tmp/library_nginx.tar"),
            repo_tag: "nginx:latest".to_string(),
            layers: vec![],
        };
        report("nginx", Ok(pulled), &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "\rDocker image pulled: /tmp/library_nginx.tar\n"
        );
    }

    #[test]
    fn test_report_manifest_list_candidates() {
        let mut out = Vec::new();
        let err = PullError::ManifestListFound {
            repository: "library/nginx".to_string(),
            candidates: vec![
                candidate("amd64", "sha256:aaa"),
                candidate("arm64", "sha256:bbb"),
            ],
        };

        let result = report("nginx", Err(err), &mut out);
        assert!(result.is_err());

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "[+] Manifests found for this tag (use the @digest format to pull the corresponding image):",
                "architecture: amd64, os: linux, digest: sha256:aaa",
                "architecture: arm64, os: linux, digest: sha256:bbb",
            ]
        );
    }

    #[test]
    fn test_report_other_errors_print_nothing() {
        let mut out = Vec::new();
        let err = PullError::AuthError {
            realm: "https://auth.example.com/token".to_string(),
            message: "no token".to_string(),
        };
        assert!(report("nginx", Err(err), &mut out).is_err());
        assert!(out.is_empty());
    }
}
