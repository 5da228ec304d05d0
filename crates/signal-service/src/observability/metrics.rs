//! Metrics definitions for the signaling router.
//!
//! All metrics follow Prometheus naming conventions:
//! - `signal_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `action`: 8 client actions plus `unknown`
//! - `method`: 10 remote methods
//! - `mode`: `sync`, `async`, `stream`
//! - `status`: `success`, `timeout`, `error`, or a `SignalError` type label
//! - `reason`: `message`, `closed`, `failed`

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus recorder and return the handle for serving
/// `/metrics`.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Relay calls gate client actions with a ~1s deadline
        .set_buckets_for_metric(
            Matcher::Prefix("signal_rpc".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500,
            ],
        )
        .map_err(|e| format!("Failed to set RPC latency buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("signal_action".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set action duration buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

/// Record a client action.
///
/// Metrics: `signal_actions_total{action, status}`,
/// `signal_action_duration_seconds{action}`
pub fn record_action(action: &'static str, status: &'static str, duration: Duration) {
    counter!("signal_actions_total", "action" => action, "status" => status).increment(1);
    histogram!("signal_action_duration_seconds", "action" => action)
        .record(duration.as_secs_f64());
}

/// Record a remote call.
///
/// Metrics: `signal_rpc_calls_total{method, mode, status}`,
/// `signal_rpc_duration_seconds{method, mode}`
pub fn record_rpc_call(
    method: &'static str,
    mode: &'static str,
    status: &'static str,
    duration: Duration,
) {
    counter!(
        "signal_rpc_calls_total",
        "method" => method,
        "mode" => mode,
        "status" => status
    )
    .increment(1);
    histogram!("signal_rpc_duration_seconds", "method" => method, "mode" => mode)
        .record(duration.as_secs_f64());
}

/// Metric: `signal_rooms_active`
pub fn set_rooms_active(count: usize) {
    // usize to f64 conversion is safe for realistic room counts
    #[allow(clippy::cast_precision_loss)]
    gauge!("signal_rooms_active").set(count as f64);
}

/// Metric: `signal_peers_active`
pub fn set_peers_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("signal_peers_active").set(count as f64);
}

/// A publish stream is now monitored.
///
/// Metric: `signal_publish_streams_active`
pub fn publish_stream_opened() {
    gauge!("signal_publish_streams_active").increment(1.0);
}

/// A monitored publish stream ended.
///
/// Metrics: `signal_publish_streams_active`,
/// `signal_publish_streams_closed_total{reason}`
pub fn publish_stream_closed(reason: &'static str) {
    gauge!("signal_publish_streams_active").decrement(1.0);
    counter!("signal_publish_streams_closed_total", "reason" => reason).increment(1);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    // Without an installed recorder these go to the no-op recorder.
    #[test]
    fn test_recording_without_recorder() {
        record_action("join", "success", Duration::from_millis(3));
        record_rpc_call("on_join", "sync", "timeout", Duration::from_secs(1));
        set_rooms_active(0);
        set_peers_active(10);
        publish_stream_opened();
        publish_stream_closed("closed");
    }

    #[test]
    fn test_rpc_calls_are_counted_by_labels() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_rpc_call("subscribe", "sync", "success", Duration::from_millis(5));
            record_rpc_call("subscribe", "sync", "success", Duration::from_millis(7));
            record_rpc_call("subscribe", "sync", "timeout", Duration::from_secs(1));
        });

        let counters: Vec<_> = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .filter(|(key, _, _, _)| key.key().name() == "signal_rpc_calls_total")
            .collect();

        assert_eq!(counters.len(), 2, "one series per status");
        let total: u64 = counters
            .iter()
            .map(|(_, _, _, value)| match value {
                DebugValue::Counter(n) => *n,
                _ => 0,
            })
            .sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn test_publish_stream_gauge_tracks_open_streams() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            publish_stream_opened();
            publish_stream_opened();
            publish_stream_closed("closed");
        });

        let gauge = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .find(|(key, _, _, _)| key.key().name() == "signal_publish_streams_active")
            .map(|(_, _, _, value)| value)
            .unwrap();

        assert_eq!(gauge, DebugValue::Gauge(1.0_f64.into()));
    }
}
