//! File-size stabilization for files still being written into the inbox.

use std::path::Path;
use std::thread;
use std::time::Duration;

/// Outcome of watching a file's size settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    /// Two consecutive samples saw the same size.
    Stable,
    /// The size never repeated within the sample budget.
    Unstable,
    /// The file disappeared while being watched.
    Vanished,
}

/// Sample the file size up to `samples` times, `interval` apart, until two
/// consecutive samples agree.
pub fn wait_for_stable(path: &Path, samples: usize, interval: Duration) -> Stability {
    let mut last_size: Option<u64> = None;
    for _ in 0..samples {
        let size = match std::fs::metadata(path) {
            Ok(metadata) => metadata.len(),
            Err(_) => return Stability::Vanished,
        };
        if last_size == Some(size) {
            return Stability::Stable;
        }
        last_size = Some(size);
        thread::sleep(interval);
    }
    Stability::Unstable
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn settled_file_stabilizes_quickly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settled.pdf");
        std::fs::write(&path, b"final content").unwrap();

        let start = Instant::now();
        let outcome = wait_for_stable(&path, 10, Duration::from_millis(10));

        assert_eq!(outcome, Stability::Stable);
        // Two samples suffice; nowhere near the 10-sample ceiling.
        assert!(start.elapsed() < Duration::from_millis(60));
    }

    #[test]
    fn missing_file_is_vanished() {
        let outcome = wait_for_stable(
            Path::new("/nonexistent/inbox/ghost.pdf"),
            3,
            Duration::from_millis(1),
        );
        assert_eq!(outcome, Stability::Vanished);
    }

    #[test]
    fn single_sample_can_never_stabilize() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one-look.pdf");
        std::fs::write(&path, b"content").unwrap();

        let outcome = wait_for_stable(&path, 1, Duration::from_millis(1));
        assert_eq!(outcome, Stability::Unstable);
    }
}
