//! Docker-style console rendering of pull progress.

use std::io::Write;
use std::path::Path;

use docker_pull_core::config::DEFAULT_PROGRESS_STEPS;
use docker_pull_runtime::oci::short_digest;
use docker_pull_runtime::PullObserver;

use crate::output::format_bytes;

/// Render a bar `traits` long (`=` ending in `>`), padded to `width`.
pub fn render_bar(traits: u64, width: u64) -> String {
    let traits = traits.min(width) as usize;
    let width = width as usize;
    let mut bar = String::with_capacity(width);
    if traits > 0 {
        bar.push_str(&"=".repeat(traits - 1));
        bar.push('>');
    }
    bar.push_str(&" ".repeat(width - traits));
    bar
}

/// Number of bar segments for `downloaded` out of `total` bytes.
pub fn traits_for(downloaded: u64, total: u64, width: u64) -> u64 {
    if total == 0 {
        return width;
    }
    (downloaded.saturating_mul(width) / total).min(width)
}

/// Writes pull progress to a terminal, overwriting the current line.
pub struct ConsoleProgress<W: Write> {
    image: String,
    out: W,
    width: u64,
}

impl<W: Write> ConsoleProgress<W> {
    pub fn new(image: impl Into<String>, out: W) -> Self {
        Self {
            image: image.into(),
            out,
            width: DEFAULT_PROGRESS_STEPS,
        }
    }

    /// Give back the writer, e.g. to print the final summary.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, text: &str) {
        // Best effort.
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
    }
}

impl<W: Write> PullObserver for ConsoleProgress<W> {
    fn working_dir_created(&mut self, path: &Path) {
        self.emit(&format!("Creating image structure in: {}\n", path.display()));
    }

    fn manifest_rejected(&mut self, status: u16, body: &str) {
        self.emit(&format!(
            "[-] Cannot fetch manifest for {} [HTTP {}]\n{}\n",
            self.image, status, body
        ));
    }

    fn layer_started(&mut self, digest: &str) {
        self.emit(&format!("{}: Downloading...", short_digest(digest)));
    }

    fn download_progress(&mut self, digest: &str, downloaded: u64, total: u64) {
        let traits = traits_for(downloaded, total, self.width);
        self.emit(&format!(
            "\r{}: Downloading [{}]",
            short_digest(digest),
            render_bar(traits, self.width)
        ));
    }

    fn layer_extracting(&mut self, digest: &str) {
        self.emit(&format!(
            "\r{}: Extracting...{}",
            short_digest(digest),
            " ".repeat(self.width as usize)
        ));
    }

    fn layer_complete(&mut self, digest: &str, size: u64) {
        self.emit(&format!(
            "\r{}: Pull complete [{}]\n",
            short_digest(digest),
            format_bytes(size)
        ));
    }

    fn archiving(&mut self, _archive: &Path) {
        self.emit("Creating archive...");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "sha256:0123456789abcdef0123456789abcdef";

    fn rendered(progress: ConsoleProgress<Vec<u8>>) -> String {
        String::from_utf8(progress.into_inner()).unwrap()
    }

    #[test]
    fn test_render_bar_empty() {
        assert_eq!(render_bar(0, 10), " ".repeat(10));
    }

    #[test]
    fn test_render_bar_partial() {
        assert_eq!(render_bar(3, 10), "==>       ");
    }

    #[test]
    fn test_render_bar_full_and_overflow() {
        assert_eq!(render_bar(10, 10), "=========>");
        assert_eq!(render_bar(12, 10), "=========>");
    }

    #[test]
    fn test_traits_for() {
        assert_eq!(traits_for(0, 1000, 50), 0);
        assert_eq!(traits_for(500, 1000, 50), 25);
        assert_eq!(traits_for(1000, 1000, 50), 50);
        assert_eq!(traits_for(2000, 1000, 50), 50);
        assert_eq!(traits_for(0, 0, 50), 50);
    }

    #[test]
    fn test_layer_lines() {
        let mut progress = ConsoleProgress::new("nginx", Vec::new());
        progress.layer_started(DIGEST);
        progress.download_progress(DIGEST, 0, 100);
        progress.layer_extracting(DIGEST);
        progress.layer_complete(DIGEST, 2048);
        let out = rendered(progress);

        assert!(out.starts_with("0123456789ab: Downloading..."));
        assert!(out.contains(&format!("\r0123456789ab: Downloading [{}]", " ".repeat(50))));
        assert!(out.contains("\r0123456789ab: Extracting..."));
        assert!(out.ends_with("\r0123456789ab: Pull complete [2.0 KB]\n"));
    }

    #[test]
    fn test_manifest_rejected_line() {
        let mut progress = ConsoleProgress::new("library/nginx:stable", Vec::new());
        progress.manifest_rejected(404, "{\"errors\":[]}");
        assert_eq!(
            rendered(progress),
            "[-] Cannot fetch manifest for library/nginx:stable [HTTP 404]\n{\"errors\":[]}\n"
        );
    }

    #[test]
    fn test_working_dir_and_archive_lines() {
        let mut progress = ConsoleProgress::new("nginx", Vec::new());
        progress.working_dir_created(Path::new("/tmp/tmp_nginx_latest"));
        progress.archiving(Path::new("/tmp/library_nginx.tar"));
        assert_eq!(
            rendered(progress),
            "Creating image structure in: /tmp/tmp_nginx_latest\nCreating archive..."
        );
    }
}
