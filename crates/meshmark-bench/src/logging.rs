//! Run-scoped logging setup
//!
//! The logger lives exactly as long as the run: the returned guard installs
//! the subscriber for the current thread and tears it down when dropped, so
//! no process-wide logging singleton outlives the run.

use crate::Result;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install a logger writing to the console and to `path`
///
/// The log file is truncated, so each run starts from an empty file.
pub fn init_run_logger(path: &Path, verbose: bool) -> Result<DefaultGuard> {
    let file = File::create(path)?;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let subscriber = tracing_subscriber::registry()
        .with(fmt::layer())
        .with(fmt::layer().with_writer(Arc::new(file)).with_ansi(false))
        .with(filter);

    Ok(tracing::subscriber::set_default(subscriber))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_is_truncated_and_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("network.log");
        std::fs::write(&path, "stale contents from a previous run").unwrap();

        {
            let _guard = init_run_logger(&path, false).unwrap();
            tracing::info!("fresh run marker");
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("fresh run marker"));
        assert!(!contents.contains("stale contents"));
    }

    #[test]
    fn test_info_filter_drops_debug_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("network.log");

        {
            let _guard = init_run_logger(&path, false).unwrap();
            tracing::debug!("invisible detail");
            tracing::info!("visible line");
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("visible line"));
        assert!(!contents.contains("invisible detail"));
    }
}
