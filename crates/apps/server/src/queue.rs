//! Inference request queue.
//!
//! Handlers submit validated-looking requests to a bounded MPSC channel. A
//! single worker task takes them one at a time and runs the pipeline on the
//! blocking thread pool, so the shared model only ever serves one request
//! while the async runtime stays responsive.

use photomesh::{generate, GenerateRequest, Report, ServiceContext};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Inference queue closed")]
    Closed,

    #[error("Inference task panicked: {0}")]
    WorkerPanicked(String),
}

/// One unit of work plus the channel its report goes back on.
struct InferenceJob {
    request: GenerateRequest,
    reply: oneshot::Sender<Result<Report, QueueError>>,
}

/// Cloneable handle that route handlers use to submit inference work.
#[derive(Clone)]
pub struct InferenceQueue {
    tx: mpsc::Sender<InferenceJob>,
    pending: Arc<AtomicUsize>,
}

impl InferenceQueue {
    /// Create the queue and spawn the background worker.
    pub fn spawn(context: Arc<ServiceContext>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel::<InferenceJob>(capacity.max(1));
        let pending = Arc::new(AtomicUsize::new(0));

        tokio::spawn(inference_worker(rx, context));

        Self { tx, pending }
    }

    /// Run `request` through the pipeline. Waits while the queue is full.
    pub async fn submit(&self, request: GenerateRequest) -> Result<Report, QueueError> {
        let (reply, result) = oneshot::channel();
        let _pending = PendingGuard::enter(&self.pending);
        if self.tx.send(InferenceJob { request, reply }).await.is_err() {
            return Err(QueueError::Closed);
        }
        result.await.map_err(|_| QueueError::Closed)?
    }

    /// Submissions still waiting for their report (queued or running).
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

/// Counts one waiting submitter; released however `submit` ends,
/// including when its future is dropped mid-await.
struct PendingGuard(Arc<AtomicUsize>);

impl PendingGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Long-lived task that pulls jobs off the channel one at a time.
async fn inference_worker(
    mut rx: mpsc::Receiver<InferenceJob>,
    context: Arc<ServiceContext>,
) {
    while let Some(InferenceJob { request, reply }) = rx.recv().await {
        let context = context.clone();
        let join_result = tokio::task::spawn_blocking(move || generate(&context, &request)).await;

        let result = join_result.map_err(|e| {
            tracing::error!("Inference task panicked: {e}");
            QueueError::WorkerPanicked(e.to_string())
        });

        // Caller may have disconnected; nothing to do then.
        let _ = reply.send(result);
    }
    tracing::debug!("Inference queue drained, worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use photomesh::{PipelineConfig, NOT_READY_MESSAGE};

    #[tokio::test]
    async fn test_submit_returns_report() {
        let context = Arc::new(ServiceContext::new(PipelineConfig::default()));
        let queue = InferenceQueue::spawn(context, 2);

        let report = queue.submit(GenerateRequest::new("AAAA")).await.unwrap();
        let response = report.outcome.response().unwrap();
        assert_eq!(response.error.as_deref(), Some(NOT_READY_MESSAGE));
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_submissions_all_complete() {
        let context = Arc::new(ServiceContext::new(PipelineConfig::default()));
        let queue = InferenceQueue::spawn(context, 1);

        let submissions: Vec<_> = (0..4)
            .map(|i| {
                let queue = queue.clone();
                tokio::spawn(async move {
                    let request = GenerateRequest::new("AAAA").with_mc_resolution(64 + i);
                    queue.submit(request).await
                })
            })
            .collect();
        for handle in submissions {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn test_dropped_submission_releases_pending() {
        // Receiver held but never drained, so the single slot stays full
        let (tx, _rx) = mpsc::channel::<InferenceJob>(1);
        let queue = InferenceQueue {
            tx,
            pending: Arc::new(AtomicUsize::new(0)),
        };

        let occupant = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.submit(GenerateRequest::new("AAAA")).await })
        };
        while queue.pending() == 0 {
            tokio::task::yield_now().await;
        }

        let blocked = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            queue.submit(GenerateRequest::new("AAAA")),
        )
        .await;
        assert!(blocked.is_err());
        assert_eq!(queue.pending(), 1);

        occupant.abort();
        let _ = occupant.await;
        assert_eq!(queue.pending(), 0);
    }
}
