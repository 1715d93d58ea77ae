//! File stability detection
//!
//! A file announced by the watcher may still be written by its producer. The checker
//! polls the file size and declares the file stable once two consecutive samples are
//! equal and non-zero. A vanished file resets the comparison.

use std::path::Path;
use std::time::{Duration, Instant};
use tracing::debug;

/// Outcome of a stability check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    /// Size settled at `bytes`
    Stable { bytes: u64 },
    /// Timeout elapsed before the size settled (or the file never reappeared)
    Unstable,
}

impl Stability {
    pub fn is_stable(&self) -> bool {
        matches!(self, Stability::Stable { .. })
    }
}

/// Size-polling stability checker
#[derive(Debug, Clone, Copy)]
pub struct StabilityChecker {
    timeout: Duration,
    poll_interval: Duration,
}

impl StabilityChecker {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Block until the file is stable or the timeout elapses
    pub fn wait_for_stable(&self, path: &Path) -> Stability {
        let start = Instant::now();
        let mut last_size: Option<u64> = None;

        while start.elapsed() < self.timeout {
            match std::fs::metadata(path) {
                Ok(metadata) => {
                    let size = metadata.len();
                    if size > 0 && last_size == Some(size) {
                        debug!(
                            path = %path.display(),
                            bytes = size,
                            elapsed_ms = start.elapsed().as_millis() as u64,
                            "File stable"
                        );
                        return Stability::Stable { bytes: size };
                    }
                    last_size = Some(size);
                }
                Err(_) => {
                    last_size = None;
                }
            }
            std::thread::sleep(self.poll_interval);
        }

        debug!(path = %path.display(), "File never stabilized");
        Stability::Unstable
    }
}

impl Default for StabilityChecker {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_millis(200))
    }
}
