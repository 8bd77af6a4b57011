//! Prometheus metrics for blobcopy.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`
//! and defines metric name constants.  blobcopy is a one-shot command, so
//! instead of serving `/metrics` it writes the exposition text to a file
//! for a node-exporter textfile collector to pick up.

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::path::Path;
use std::sync::OnceLock;

// -- Metric name constants ----------------------------------------------------

/// Copy invocations (counter). Labels: shape, outcome.
pub const COPY_REQUESTS_TOTAL: &str = "blobcopy_copy_requests_total";

/// Time spent waiting for the transfer engine to accept a copy (histogram).
pub const ACCEPT_WAIT_SECONDS: &str = "blobcopy_accept_wait_seconds";

/// Start-copy jobs run by the transfer queue (counter). Labels: result.
pub const TRANSFER_JOBS_TOTAL: &str = "blobcopy_transfer_jobs_total";

/// Jobs waiting in the transfer queue (gauge).
pub const TRANSFER_QUEUE_DEPTH: &str = "blobcopy_transfer_queue_depth";

// -- Global recorder installation ---------------------------------------------

/// Singleton handle to the Prometheus recorder.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder.  Returns the existing
/// handle when already installed.
pub fn init_metrics() -> anyhow::Result<&'static PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle))
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(
        COPY_REQUESTS_TOTAL,
        "Copy invocations by input shape and outcome"
    );
    describe_histogram!(
        ACCEPT_WAIT_SECONDS,
        "Seconds waited for the transfer engine to accept a copy"
    );
    describe_counter!(TRANSFER_JOBS_TOTAL, "Start-copy jobs run by result");
    describe_gauge!(TRANSFER_QUEUE_DEPTH, "Jobs waiting in the transfer queue");
}

/// Render the current metrics in Prometheus exposition format, if a
/// recorder is installed.
pub fn render() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

/// Write the exposition text to `path`.  The file is replaced atomically
/// so a collector never reads a partial file.
pub fn write_textfile<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    let body = render().ok_or_else(|| anyhow::anyhow!("Prometheus recorder not initialized"))?;
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, body)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use metrics::counter;

    #[test]
    fn test_textfile_contains_recorded_counter() {
        init_metrics().unwrap();
        describe_metrics();
        // Idempotent.
        init_metrics().unwrap();

        counter!(COPY_REQUESTS_TOTAL, "shape" => "names", "outcome" => "copied").increment(1);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blobcopy.prom");
        write_textfile(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains(COPY_REQUESTS_TOTAL));
        assert!(text.contains("shape=\"names\""));
        assert!(!dir.path().join("blobcopy.prom.tmp").exists());
    }

    #[test]
    fn test_metric_names_are_prefixed() {
        for name in [
            COPY_REQUESTS_TOTAL,
            ACCEPT_WAIT_SECONDS,
            TRANSFER_JOBS_TOTAL,
            TRANSFER_QUEUE_DEPTH,
        ] {
            assert!(name.starts_with("blobcopy_"));
        }
    }
}
