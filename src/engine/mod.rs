//! Security logging engine
//!
//! [`SecurityLogger`] is an explicitly constructed service instance that
//! carries its own buffer and store handle; request handlers receive it by
//! reference rather than through a global. Logging is fire-and-forget: the
//! caller returns as soon as the event is validated, classified, and
//! buffered, while the durable write, watchlist update, and pattern
//! correlation run on a bounded background pipeline.
//!
//! The pipeline drains sequentially, which gives per-instance
//! read-after-write ordering for the burst query. Correlation with other
//! instances happens purely through the shared store and is eventually
//! consistent: a burst detected here may lag events recorded moments
//! earlier elsewhere.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::alerting::AlertQueue;
use crate::buffer::EventBuffer;
use crate::classify::RiskClassifier;
use crate::compliance::ComplianceReporter;
use crate::config::Config;
use crate::correlation::PatternCorrelator;
use crate::intel::ThreatIntelRegistry;
use crate::models::{EventSubmission, SecurityEvent};
use crate::persistence::EventStore;
use crate::query::SecurityQuery;

/// Errors surfaced to callers at the ingestion boundary.
///
/// A malformed submission is the only condition that is fatal to the
/// caller; everything downstream recovers locally.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum IngestError {
    #[error("event is missing an origin address")]
    MissingOriginAddress,
}

enum PipelineJob {
    Record(SecurityEvent),
    Flush(oneshot::Sender<()>),
}

/// The security event logging and correlation service.
pub struct SecurityLogger {
    buffer: Arc<EventBuffer>,
    store: Arc<dyn EventStore>,
    classifier: RiskClassifier,
    instance_id: String,
    tx: mpsc::Sender<PipelineJob>,
    worker: JoinHandle<()>,
}

impl SecurityLogger {
    /// Construct the engine and spawn its pipeline task.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(config: &Config, store: Arc<dyn EventStore>, alerts: Option<AlertQueue>) -> Self {
        let buffer = Arc::new(EventBuffer::with_capacity(config.engine.buffer_capacity));
        let instance_id = config.engine.resolve_instance_id();

        let correlator = PatternCorrelator::with_config(
            store.clone(),
            instance_id.clone(),
            config.correlation.burst_window_seconds,
            config.correlation.burst_threshold,
            config.correlation.cross_instance_window_seconds,
        );
        let intel = ThreatIntelRegistry::new(store.clone());

        let (tx, rx) = mpsc::channel(config.engine.queue_depth.max(1));
        let worker = tokio::spawn(Self::run_pipeline(
            rx,
            store.clone(),
            buffer.clone(),
            correlator,
            intel,
            alerts,
        ));

        SecurityLogger {
            buffer,
            store,
            classifier: RiskClassifier::new(),
            instance_id,
            tx,
            worker,
        }
    }

    /// Record a security event.
    ///
    /// Returns as soon as the event is buffered; the durable write and
    /// correlation never delay the caller. A full pipeline queue drops the
    /// durable write with a warning, costing durability for that event
    /// only. The only error is a missing origin address.
    pub fn log(&self, submission: EventSubmission) -> Result<(), IngestError> {
        if submission.origin_address.trim().is_empty() {
            return Err(IngestError::MissingOriginAddress);
        }

        let event = self.build_event(submission);
        self.buffer.push(event.clone());

        if let Err(e) = self.tx.try_send(PipelineJob::Record(event)) {
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    log::warn!("Logging pipeline full, dropping durable write");
                }
                mpsc::error::TrySendError::Closed(_) => {
                    log::warn!("Logging pipeline closed, event kept in buffer only");
                }
            }
        }

        Ok(())
    }

    /// Wait until every job enqueued before this call has been processed.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(PipelineJob::Flush(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Drain in-flight work and stop the pipeline task.
    pub async fn shutdown(self) {
        self.flush().await;
        let SecurityLogger { tx, worker, .. } = self;
        drop(tx);
        if let Err(e) = worker.await {
            log::warn!("Logging pipeline task failed: {}", e);
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn buffer(&self) -> Arc<EventBuffer> {
        self.buffer.clone()
    }

    /// Read surface over this engine's buffer and store.
    pub fn query_api(&self) -> SecurityQuery {
        SecurityQuery::new(self.buffer.clone(), self.store.clone())
    }

    /// Compliance reporter over this engine's store.
    pub fn reporter(&self) -> ComplianceReporter {
        ComplianceReporter::new(self.store.clone())
    }

    fn build_event(&self, submission: EventSubmission) -> SecurityEvent {
        let (severity, risk_score) = self.classifier.classify(&submission);
        let created_at = Utc::now();

        let correlation_id = submission.correlation_id.or_else(|| {
            submission
                .actor_id
                .as_ref()
                .map(|actor| format!("{}-{}", actor, created_at.timestamp_millis()))
        });

        SecurityEvent {
            event_type: submission.event_type,
            severity,
            origin_address: submission.origin_address,
            client_signature: submission.client_signature,
            actor_id: submission.actor_id,
            session_id: submission.session_id,
            path: submission.path,
            method: submission.method,
            response_status: submission.response_status,
            details: submission.details,
            risk_score,
            threat_indicators: Default::default(),
            correlation_id,
            compliance_flags: submission.compliance_flags,
            server_instance: self.instance_id.clone(),
            created_at,
        }
    }

    async fn run_pipeline(
        mut rx: mpsc::Receiver<PipelineJob>,
        store: Arc<dyn EventStore>,
        buffer: Arc<EventBuffer>,
        correlator: PatternCorrelator,
        intel: ThreatIntelRegistry,
        alerts: Option<AlertQueue>,
    ) {
        log::info!("Logging pipeline started");

        while let Some(job) = rx.recv().await {
            match job {
                PipelineJob::Record(event) => {
                    let appended = Self::record(&store, &intel, &event);
                    if let Some(ref queue) = alerts {
                        queue.queue_alert(event.clone());
                    }

                    // Cross-instance correlation needs the event durably
                    // visible; a failed write skips correlation for it.
                    if !appended {
                        continue;
                    }

                    for pattern in correlator.check(&event) {
                        buffer.push(pattern.clone());
                        if let Some(ref queue) = alerts {
                            queue.queue_alert(pattern.clone());
                        }
                        // Synthetic events re-enter the record path once and
                        // are never themselves correlated.
                        Self::record(&store, &intel, &pattern);
                    }
                }
                PipelineJob::Flush(ack) => {
                    let _ = ack.send(());
                }
            }
        }

        log::info!("Logging pipeline stopped");
    }

    /// Append to the durable log and apply watchlist triggers.
    ///
    /// Returns whether the append succeeded; both failure modes are logged
    /// locally and never surface to the caller's request path.
    fn record(
        store: &Arc<dyn EventStore>,
        intel: &ThreatIntelRegistry,
        event: &SecurityEvent,
    ) -> bool {
        let appended = match store.append(event) {
            Ok(_) => true,
            Err(e) => {
                log::warn!("Durable write failed, event kept in buffer only: {}", e);
                false
            }
        };
        intel.observe(event);
        appended
    }
}
