use photomesh::{Outcome, Report, RequestState, NOT_READY_MESSAGE};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Request counters shared by the handlers
#[derive(Debug, Default)]
pub struct ServiceMetrics {
    pub requests: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub rejected: AtomicU64,
    pub not_ready: AtomicU64,
    pub processing_ms: AtomicU64,
}

impl ServiceMetrics {
    /// Count one finished generation request
    pub fn record(&self, report: &Report) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        match &report.outcome {
            Outcome::Rejected(_) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Responded(response) if response.success => {
                self.succeeded.fetch_add(1, Ordering::Relaxed);
                self.processing_ms.fetch_add(
                    response.processing_time_ms.unwrap_or_default(),
                    Ordering::Relaxed,
                );
            }
            Outcome::Responded(response) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                if report.final_state() == RequestState::Errored
                    && response.error.as_deref() == Some(NOT_READY_MESSAGE)
                    && !report.visited(RequestState::Decoded)
                {
                    self.not_ready.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Count a body that never made it to the pipeline
    pub fn record_malformed(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a request lost inside the inference queue
    pub fn record_queue_failure(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get Prometheus-compatible metrics as a string
    pub fn to_prometheus(&self) -> String {
        format!(
            "# HELP photomesh_requests_total Generation requests received\n\
             # TYPE photomesh_requests_total counter\n\
             photomesh_requests_total {}\n\
             \n\
             # HELP photomesh_succeeded_total Generation requests that produced a mesh\n\
             # TYPE photomesh_succeeded_total counter\n\
             photomesh_succeeded_total {}\n\
             \n\
             # HELP photomesh_failed_total Generation requests answered with success=false\n\
             # TYPE photomesh_failed_total counter\n\
             photomesh_failed_total {}\n\
             \n\
             # HELP photomesh_rejected_total Requests refused at the transport level\n\
             # TYPE photomesh_rejected_total counter\n\
             photomesh_rejected_total {}\n\
             \n\
             # HELP photomesh_not_ready_total Requests that arrived before the model was loaded\n\
             # TYPE photomesh_not_ready_total counter\n\
             photomesh_not_ready_total {}\n\
             \n\
             # HELP photomesh_processing_milliseconds_total Time spent on successful generations\n\
             # TYPE photomesh_processing_milliseconds_total counter\n\
             photomesh_processing_milliseconds_total {}\n",
            self.requests.load(Ordering::Relaxed),
            self.succeeded.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            self.rejected.load(Ordering::Relaxed),
            self.not_ready.load(Ordering::Relaxed),
            self.processing_ms.load(Ordering::Relaxed),
        )
    }

    /// Print metrics to console
    pub fn print_stats(&self) {
        tracing::info!(
            "Requests: {} | Succeeded: {} | Failed: {} | Rejected: {} | Not ready: {} | Processing: {}ms",
            self.requests.load(Ordering::Relaxed),
            self.succeeded.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            self.rejected.load(Ordering::Relaxed),
            self.not_ready.load(Ordering::Relaxed),
            self.processing_ms.load(Ordering::Relaxed),
        );
    }
}

/// Prometheus gauge for submissions waiting on the inference queue
pub fn queue_gauge(pending: usize) -> String {
    format!(
        "\n# HELP photomesh_queue_pending Generation requests waiting for the inference worker\n\
         # TYPE photomesh_queue_pending gauge\n\
         photomesh_queue_pending {pending}\n"
    )
}

/// Start metrics reporting task
pub async fn start_metrics_reporter(metrics: Arc<ServiceMetrics>, period: Duration) {
    let mut interval = tokio::time::interval(period);

    loop {
        interval.tick().await;
        metrics.print_stats();
    }
}
