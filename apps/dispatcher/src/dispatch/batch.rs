//! Batch Scheduler: pools, paces and sequences many single dispatches.
//!
//! Invariants:
//! - Labels are dispatched one at a time in ascending index order; the next label
//!   starts only after the previous outcome is recorded.
//! - The first failure (validation or dispatch) ends the run. Nothing after it is sent.
//! - After each fully successful pool, if pools remain, the scheduler sleeps for the
//!   configured delay.
//! - Outcomes are owned by the scheduler and appended exactly once per label.

use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::dispatch::error::{BatchFailure, DispatchError};
use crate::dispatch::models::{
    is_pdf_sentinel, BatchSummary, DispatchOutcome, LabelRequest, Pacing, RawLabel,
};
use crate::dispatch::single::check_gateway_url;
use crate::dispatch::Dispatcher;

/// Progress snapshot reported after every outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub batch_id: Uuid,
    pub completed: usize,
    pub total: usize,
    pub pool: usize,
    pub pool_count: usize,
}

/// Callbacks fired by the scheduler. All methods default to no-ops.
pub trait BatchObserver: Send + Sync {
    fn on_outcome(&self, _outcome: &DispatchOutcome) {}
    fn on_progress(&self, _progress: Progress) {}
    fn on_pool_complete(&self, _batch_id: Uuid, _pool: usize, _pool_count: usize) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl BatchObserver for NoopObserver {}

/// Observer that reports through `tracing`.
pub struct TracingObserver;

impl BatchObserver for TracingObserver {
    fn on_progress(&self, p: Progress) {
        tracing::debug!(
            "Batch {}: {}/{} labels (pool {}/{})",
            p.batch_id,
            p.completed,
            p.total,
            p.pool,
            p.pool_count
        );
    }

    fn on_pool_complete(&self, batch_id: Uuid, pool: usize, pool_count: usize) {
        info!("Batch {batch_id}: pool {pool}/{pool_count} complete");
    }
}

/// Message attached to a summary produced by the PDF short-circuit.
pub const TRUNCATION_MESSAGE: &str =
    "Only the first label was processed (PDF mode); remaining labels were ignored";

/// One batch run. Owns the outcome list for the duration of the run.
pub struct BatchScheduler<'a> {
    dispatcher: &'a Dispatcher,
    gateway_url: &'a str,
    pacing: Pacing,
    observer: &'a dyn BatchObserver,
    batch_id: Uuid,
    outcomes: Vec<DispatchOutcome>,
}

impl<'a> BatchScheduler<'a> {
    pub fn new(
        dispatcher: &'a Dispatcher,
        gateway_url: &'a str,
        pacing: Pacing,
        observer: &'a dyn BatchObserver,
    ) -> Self {
        Self {
            dispatcher,
            gateway_url,
            pacing: Pacing::new(pacing.pool_size, pacing.delay_secs),
            observer,
            batch_id: Uuid::new_v4(),
            outcomes: Vec::new(),
        }
    }

    pub async fn run(mut self, labels: &[RawLabel]) -> Result<BatchSummary, DispatchError> {
        let total = labels.len();
        if total == 0 {
            return Err(DispatchError::Validation(
                "Label list is missing or empty".to_string(),
            ));
        }
        check_gateway_url(self.gateway_url)?;

        if labels[0].address.as_deref().is_some_and(is_pdf_sentinel) {
            return self.run_pdf_only(&labels[0], total).await;
        }

        let pool_size = self.pacing.pool_size;
        let pool_count = self.pacing.pool_count(total);
        let delay = Duration::from_secs(self.pacing.delay_secs);

        info!(
            "Batch {}: {total} labels in {pool_count} pool(s) of up to {pool_size}, {}s between pools",
            self.batch_id, self.pacing.delay_secs
        );

        for (pool_idx, pool) in labels.chunks(pool_size).enumerate() {
            let pool_number = pool_idx + 1;

            for (offset, raw) in pool.iter().enumerate() {
                let index = pool_idx * pool_size + offset;
                let result = match LabelRequest::validate(raw, index) {
                    Ok(label) => self.dispatcher.dispatch_single(&label, self.gateway_url).await,
                    Err(e) => Err(e),
                };
                let outcome = DispatchOutcome::from_result(index, result);
                let failure = (!outcome.success).then(|| outcome.clone());

                self.record(outcome);
                self.observer.on_progress(Progress {
                    batch_id: self.batch_id,
                    completed: index + 1,
                    total,
                    pool: pool_number,
                    pool_count,
                });

                if let Some(failure) = failure {
                    return Err(self.abort(failure, total));
                }
            }

            self.observer
                .on_pool_complete(self.batch_id, pool_number, pool_count);

            if pool_number < pool_count {
                info!(
                    "Batch {}: pausing {}s before pool {}",
                    self.batch_id,
                    self.pacing.delay_secs,
                    pool_number + 1
                );
                tokio::time::sleep(delay).await;
            }
        }

        info!("Batch {}: all {total} labels dispatched", self.batch_id);
        Ok(BatchSummary::from_outcomes(self.batch_id, total, self.outcomes))
    }

    /// Sentinel first entry: render it alone and discard the rest.
    async fn run_pdf_only(
        mut self,
        first: &RawLabel,
        total: usize,
    ) -> Result<BatchSummary, DispatchError> {
        if total > 1 {
            warn!(
                "Batch {}: first label targets PDF, ignoring the other {} label(s)",
                self.batch_id,
                total - 1
            );
        }

        let result = match LabelRequest::validate(first, 0) {
            Ok(label) => self.dispatcher.dispatch_single(&label, self.gateway_url).await,
            Err(e) => Err(e),
        };
        let outcome = DispatchOutcome::from_result(0, result);
        let failure = (!outcome.success).then(|| outcome.clone());

        self.record(outcome);
        self.observer.on_progress(Progress {
            batch_id: self.batch_id,
            completed: 1,
            total,
            pool: 1,
            pool_count: 1,
        });

        if let Some(failure) = failure {
            return Err(self.abort(failure, total));
        }

        let mut summary = BatchSummary::from_outcomes(self.batch_id, total, self.outcomes);
        summary.truncated = total > 1;
        summary.message = Some(TRUNCATION_MESSAGE.to_string());
        Ok(summary)
    }

    fn record(&mut self, outcome: DispatchOutcome) {
        if let Some(err) = &outcome.error {
            warn!(
                "Batch {}: label {} failed ({:?}): {}",
                self.batch_id,
                outcome.index + 1,
                err.kind,
                err.message
            );
        }
        self.observer.on_outcome(&outcome);
        self.outcomes.push(outcome);
    }

    /// Builds the run-terminating error around the outcome that stopped the run.
    fn abort(self, first_failure: DispatchOutcome, total: usize) -> DispatchError {
        let processed = self.outcomes.len();

        let message = first_failure
            .error
            .as_ref()
            .map(|e| e.message.clone())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("Failed to send label {}", first_failure.index + 1));

        DispatchError::Batch(Box::new(BatchFailure {
            message,
            first_failure,
            outcomes: self.outcomes,
            total,
            processed,
        }))
    }
}

impl Dispatcher {
    /// Dispatches many labels with pooling, pacing and stop-on-first-failure.
    pub async fn dispatch_batch(
        &self,
        labels: &[RawLabel],
        pacing: Pacing,
        gateway_url: &str,
        observer: &dyn BatchObserver,
    ) -> Result<BatchSummary, DispatchError> {
        BatchScheduler::new(self, gateway_url, pacing, observer)
            .run(labels)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;
    use tokio::time::Instant;

    use super::*;
    use crate::dispatch::error::{ErrorKind, HttpFailure};
    use crate::dispatch::transport::mock::{pdf_reply, reply, MockTransport};
    use crate::dispatch::DispatchSettings;

    const GATEWAY: &str = "https://gateway.example.com/api/print";

    #[derive(Default)]
    struct Recorder {
        progress: Mutex<Vec<Progress>>,
        pools: Mutex<Vec<(usize, usize)>>,
        outcomes: Mutex<Vec<usize>>,
    }

    impl BatchObserver for Recorder {
        fn on_outcome(&self, outcome: &DispatchOutcome) {
            self.outcomes.lock().unwrap().push(outcome.index);
        }
        fn on_progress(&self, progress: Progress) {
            self.progress.lock().unwrap().push(progress);
        }
        fn on_pool_complete(&self, _batch_id: Uuid, pool: usize, pool_count: usize) {
            self.pools.lock().unwrap().push((pool, pool_count));
        }
    }

    fn labels(n: usize) -> Vec<RawLabel> {
        (0..n)
            .map(|i| RawLabel {
                address: Some("192.168.1.100".into()),
                port: Some(json!(9100)),
                payload: Some(format!("^XA^FDlabel-{i}^FS^XZ")),
            })
            .collect()
    }

    /// Gateway that fails the label whose markup contains `marker`.
    fn failing_on(marker: &'static str) -> MockTransport {
        MockTransport::new(move |req| {
            if String::from_utf8_lossy(&req.body).contains(marker) {
                Ok(reply(200, r#"{"status":"error","message":"paper out"}"#))
            } else {
                Ok(reply(200, r#"{"status":"success"}"#))
            }
        })
    }

    fn dispatcher(transport: Arc<MockTransport>) -> Dispatcher {
        Dispatcher::new(transport, DispatchSettings::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_success_sequential_with_pacing() {
        let transport = Arc::new(MockTransport::accepting());
        let d = dispatcher(transport.clone());
        let recorder = Recorder::default();

        let started = Instant::now();
        let summary = d
            .dispatch_batch(&labels(25), Pacing::new(10, 2), GATEWAY, &recorder)
            .await
            .unwrap();

        assert_eq!(
            (summary.total, summary.success_count, summary.error_count),
            (25, 25, 0)
        );
        assert!(!summary.truncated);
        // 3 pools -> 2 pauses of 2s
        assert_eq!(started.elapsed(), Duration::from_secs(4));

        let expected: Vec<String> = (0..25).map(|i| format!("^XA^FDlabel-{i}^FS^XZ")).collect();
        assert_eq!(transport.sent_zpl(), expected);

        let indices: Vec<usize> = summary.outcomes.iter().map(|o| o.index).collect();
        assert_eq!(indices, (0..25).collect::<Vec<_>>());
        assert_eq!(*recorder.pools.lock().unwrap(), vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_pool_has_no_delay() {
        let transport = Arc::new(MockTransport::accepting());
        let d = dispatcher(transport.clone());
        let recorder = Recorder::default();

        let started = Instant::now();
        let summary = d
            .dispatch_batch(&labels(10), Pacing::new(10, 5), GATEWAY, &recorder)
            .await
            .unwrap();

        assert_eq!(summary.success_count, 10);
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(*recorder.pools.lock().unwrap(), vec![(1, 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_reports_every_outcome() {
        let transport = Arc::new(MockTransport::accepting());
        let recorder = Recorder::default();
        dispatcher(transport)
            .dispatch_batch(&labels(5), Pacing::new(2, 0), GATEWAY, &recorder)
            .await
            .unwrap();

        let progress = recorder.progress.lock().unwrap().clone();
        let shape: Vec<(usize, usize, usize, usize)> = progress
            .iter()
            .map(|p| (p.completed, p.total, p.pool, p.pool_count))
            .collect();
        assert_eq!(
            shape,
            vec![
                (1, 5, 1, 3),
                (2, 5, 1, 3),
                (3, 5, 2, 3),
                (4, 5, 2, 3),
                (5, 5, 3, 3)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_on_first_failure_mid_pool() {
        let transport = Arc::new(failing_on("label-12^"));
        let recorder = Recorder::default();

        let started = Instant::now();
        let err = dispatcher(transport.clone())
            .dispatch_batch(&labels(30), Pacing::new(10, 1), GATEWAY, &recorder)
            .await
            .unwrap_err();

        let DispatchError::Batch(failure) = err else {
            panic!("expected batch failure");
        };
        assert_eq!(failure.total, 30);
        assert_eq!(failure.processed, 13);
        assert_eq!(failure.first_failure.index, 12);
        assert_eq!(failure.message, "paper out");
        assert_eq!(
            failure.first_failure.error.as_ref().unwrap().kind,
            ErrorKind::LogicalServer
        );
        assert_eq!(failure.outcomes.len(), 13);
        assert_eq!(failure.outcomes.last(), Some(&failure.first_failure));

        // Nothing past index 12 reached the gateway.
        assert_eq!(transport.calls().len(), 13);
        // Only pool 1 completed; one pause before pool 2, none after the failure.
        assert_eq!(*recorder.pools.lock().unwrap(), vec![(1, 3)]);
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_failure_halts_without_network_call() {
        let transport = Arc::new(MockTransport::accepting());
        let mut input = labels(6);
        input[3].port = Some(json!("70000"));

        let err = dispatcher(transport.clone())
            .dispatch_batch(&input, Pacing::new(2, 0), GATEWAY, &NoopObserver)
            .await
            .unwrap_err();

        let DispatchError::Batch(failure) = err else {
            panic!("expected batch failure");
        };
        assert_eq!(failure.processed, 4);
        assert_eq!(failure.first_failure.index, 3);
        assert_eq!(
            failure.first_failure.error.as_ref().unwrap().kind,
            ErrorKind::Validation
        );
        assert_eq!(transport.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_transport_failure_is_aggregated() {
        let transport = Arc::new(MockTransport::new(|_| {
            Err(DispatchError::Transport(HttpFailure::new("connection refused")))
        }));
        let err = dispatcher(transport.clone())
            .dispatch_batch(&labels(3), Pacing::default(), GATEWAY, &NoopObserver)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Batch);
        assert_eq!(err.to_string(), "connection refused");
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_insecure_gateway_rejected_before_any_dispatch() {
        let transport = Arc::new(MockTransport::accepting());
        let recorder = Recorder::default();
        let err = dispatcher(transport.clone())
            .dispatch_batch(
                &labels(4),
                Pacing::default(),
                "http://gateway.example.com/api/print",
                &recorder,
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(transport.calls().is_empty());
        assert!(recorder.outcomes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch_is_validation_error() {
        let transport = Arc::new(MockTransport::accepting());
        let err = dispatcher(transport)
            .dispatch_batch(&[], Pacing::default(), GATEWAY, &NoopObserver)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_pdf_first_entry_truncates_batch() {
        let transport = Arc::new(MockTransport::new(|_| Ok(pdf_reply())));
        let mut input = labels(5);
        input[0].address = Some("pdf".into());
        input[0].port = None;

        let recorder = Recorder::default();
        let summary = dispatcher(transport.clone())
            .dispatch_batch(&input, Pacing::new(2, 1), GATEWAY, &recorder)
            .await
            .unwrap();

        assert_eq!(summary.total, 5);
        assert_eq!(summary.success_count, 1);
        assert_eq!(summary.error_count, 0);
        assert_eq!(summary.outcomes.len(), 1);
        assert!(summary.truncated);
        assert_eq!(summary.message.as_deref(), Some(TRUNCATION_MESSAGE));

        // Progress agrees with the summary on the original total.
        let progress = recorder.progress.lock().unwrap().clone();
        assert_eq!(progress.len(), 1);
        assert_eq!((progress[0].completed, progress[0].total), (1, 5));
        assert_eq!((progress[0].pool, progress[0].pool_count), (1, 1));

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].accept, "application/pdf");
    }

    #[tokio::test]
    async fn test_pdf_first_entry_failure_is_reported() {
        let transport = Arc::new(MockTransport::new(|_| Ok(reply(500, ""))));
        let mut input = labels(3);
        input[0].address = Some("PDF".into());

        let err = dispatcher(transport)
            .dispatch_batch(&input, Pacing::default(), GATEWAY, &NoopObserver)
            .await
            .unwrap_err();

        let DispatchError::Batch(failure) = err else {
            panic!("expected batch failure");
        };
        assert_eq!((failure.total, failure.processed), (3, 1));
        assert_eq!(
            failure.first_failure.error.as_ref().unwrap().kind,
            ErrorKind::Rendering
        );
    }

    #[tokio::test]
    async fn test_pdf_entry_later_in_batch_is_rendered_in_place() {
        let transport = Arc::new(MockTransport::new(|req| {
            if req.accept == "application/pdf" {
                Ok(pdf_reply())
            } else {
                Ok(reply(200, r#"{"status":"success"}"#))
            }
        }));
        let mut input = labels(3);
        input[1].address = Some("PDF".into());
        input[1].port = None;

        let summary = dispatcher(transport.clone())
            .dispatch_batch(&input, Pacing::default(), GATEWAY, &NoopObserver)
            .await
            .unwrap();

        assert_eq!(summary.success_count, 3);
        assert!(!summary.truncated);
        assert_eq!(transport.calls()[1].accept, "application/pdf");
    }
}
