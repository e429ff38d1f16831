//! Pull progress reporting.
//!
//! The pull engine reports what it is doing through [`PullObserver`];
//! rendering (console bar, logs, nothing) is up to the implementor.

use std::path::Path;

/// Receives pull events. Every method defaults to doing nothing.
pub trait PullObserver {
    /// The scratch directory holding the image layout was created.
    fn working_dir_created(&mut self, _path: &Path) {}

    /// The schema 2 manifest request failed; a manifest list is tried next.
    fn manifest_rejected(&mut self, _status: u16, _body: &str) {}

    /// A layer download is starting.
    fn layer_started(&mut self, _digest: &str) {}

    /// `downloaded` of `total` bytes of the layer have been written.
    ///
    /// Called once at zero, then each time another progress increment is crossed.
    fn download_progress(&mut self, _digest: &str, _downloaded: u64, _total: u64) {}

    /// The layer is being decompressed.
    fn layer_extracting(&mut self, _digest: &str) {}

    /// The layer is in place; `size` is its compressed size.
    fn layer_complete(&mut self, _digest: &str, _size: u64) {}

    /// The final archive is being written.
    fn archiving(&mut self, _archive: &Path) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentObserver;

impl PullObserver for SilentObserver {}

/// Splits a download into `steps` equal increments.
#[derive(Debug, Clone)]
pub(crate) struct ProgressTicker {
    unit: u64,
    pending: u64,
}

impl ProgressTicker {
    pub(crate) fn new(total: u64, steps: u64) -> Self {
        Self {
            unit: total / steps.max(1),
            pending: 0,
        }
    }

    /// Account `bytes` more; true when a new increment was crossed.
    pub(crate) fn advance(&mut self, bytes: u64) -> bool {
        self.pending += bytes;
        if self.pending > self.unit {
            self.pending = 0;
            true
        } else {
            false
        }
    }
}

/// First twelve hex characters of a digest, as shown by docker.
pub fn short_digest(digest: &str) -> &str {
    let hex = digest.split_once(':').map_or(digest, |(_, hex)| hex);
    hex.get(..12).unwrap_or(hex)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticker_fires_per_increment() {
        let mut ticker = ProgressTicker::new(5000, 50);
        let ticks = (0..50).filter(|_| ticker.advance(101)).count();
        assert_eq!(ticks, 50);
    }

    #[test]
    fn test_ticker_waits_for_full_unit() {
        let mut ticker = ProgressTicker::new(1000, 10);
        assert!(!ticker.advance(60));
        assert!(!ticker.advance(40));
        assert!(ticker.advance(1));
        assert!(!ticker.advance(1));
    }

    #[test]
    fn test_ticker_zero_steps() {
        let mut ticker = ProgressTicker::new(100, 0);
        assert!(ticker.advance(101));
    }

    #[test]
    fn test_short_digest() {
        assert_eq!(
            short_digest("sha256:0123456789abcdef0123456789abcdef"),
            "0123456789ab"
        );
        assert_eq!(short_digest("sha256:abc"), "abc");
        assert_eq!(short_digest("deadbeefdeadbeef"), "deadbeefdead");
    }

    #[test]
    fn test_silent_observer_accepts_events() {
        let mut observer = SilentObserver;
        let observer: &mut dyn PullObserver = &mut observer;
        observer.layer_started("sha256:abc");
        observer.download_progress("sha256:abc", 10, 100);
        observer.layer_complete("sha256:abc", 100);
    }
}
