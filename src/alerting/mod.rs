//! Out-of-band webhook alerting
//!
//! Provides asynchronous alert dispatching for recorded events. The engine
//! queues events without blocking; a dispatcher task posts a structured
//! alert to each configured webhook for events at or above the configured
//! severity. Delivery failures are logged and never reach the ingestion
//! path.

use crate::config::{AlertConfig, WebhookConfig};
use crate::models::SecurityEvent;
use reqwest::Client;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors that can occur during alert dispatch
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Alert channel closed")]
    ChannelClosed,
}

/// Async alert dispatcher
///
/// Runs as a tokio task, receiving events from the alert channel and
/// posting them to every configured webhook.
pub struct AlertDispatcher {
    config: AlertConfig,
    client: Client,
}

impl AlertDispatcher {
    pub fn new(config: AlertConfig) -> Self {
        AlertDispatcher {
            config,
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Create the channel connecting the engine to the dispatcher.
    pub fn create_channel() -> (mpsc::Sender<SecurityEvent>, mpsc::Receiver<SecurityEvent>) {
        mpsc::channel(100)
    }

    /// Run the alert dispatch loop until the channel closes.
    pub async fn run(self, mut rx: mpsc::Receiver<SecurityEvent>) {
        log::info!("Alert dispatcher started");

        while let Some(event) = rx.recv().await {
            if !self.config.enabled {
                continue;
            }

            if event.severity < self.config.min_severity {
                log::debug!(
                    "Skipping alert for {} event (severity {} < min {})",
                    event.event_type,
                    event.severity,
                    self.config.min_severity
                );
                continue;
            }

            log::info!(
                "Dispatching alert: {} from {} (severity {}, risk {})",
                event.event_type,
                event.origin_address,
                event.severity,
                event.risk_score
            );

            for webhook in &self.config.webhooks {
                if let Err(e) = self.send_webhook(webhook, &event).await {
                    log::error!("Webhook {} failed: {}", webhook.name, e);
                }
            }
        }

        log::info!("Alert dispatcher stopped");
    }

    /// Post a structured alert to a single webhook endpoint.
    async fn send_webhook(
        &self,
        config: &WebhookConfig,
        event: &SecurityEvent,
    ) -> Result<(), AlertError> {
        let payload = serde_json::json!({
            "alert": "security_event",
            "event_type": event.event_type,
            "severity": event.severity,
            "risk_score": event.risk_score,
            "origin_address": event.origin_address,
            "threat_indicators": event.threat_indicators,
            "correlation_id": event.correlation_id,
            "server_instance": event.server_instance,
            "created_at": event.created_at.to_rfc3339(),
        });

        let method = config.method.as_deref().unwrap_or("POST");
        let mut request = match method.to_uppercase().as_str() {
            "PUT" => self.client.put(&config.url),
            _ => self.client.post(&config.url),
        };

        if let Some(ref headers) = config.headers {
            for (key, value) in headers {
                request = request.header(key, value);
            }
        }

        let response = request.json(&payload).send().await?;

        if !response.status().is_success() {
            log::warn!(
                "Webhook {} returned non-success status: {}",
                config.name,
                response.status()
            );
        }

        Ok(())
    }
}

/// Non-blocking handle for queueing alerts from the logging pipeline.
#[derive(Clone)]
pub struct AlertQueue {
    tx: mpsc::Sender<SecurityEvent>,
}

impl AlertQueue {
    pub fn new(tx: mpsc::Sender<SecurityEvent>) -> Self {
        AlertQueue { tx }
    }

    /// Queue an event for dispatch (non-blocking)
    ///
    /// Uses try_send to avoid blocking the pipeline. If the queue is full,
    /// the alert is dropped and a warning logged.
    pub fn queue_alert(&self, event: SecurityEvent) {
        if let Err(e) = self.tx.try_send(event) {
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    log::warn!("Alert queue full, dropping alert");
                }
                mpsc::error::TrySendError::Closed(_) => {
                    log::warn!("Alert queue closed");
                }
            }
        }
    }

    /// Queue an alert (async version)
    pub async fn queue_alert_async(&self, event: SecurityEvent) -> Result<(), AlertError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| AlertError::ChannelClosed)
    }

    /// Check if the queue is closed
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventDetails, EventType, Severity};
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn create_test_event(severity: Severity) -> SecurityEvent {
        SecurityEvent {
            event_type: EventType::SuspiciousPattern,
            severity,
            origin_address: "203.0.113.5".to_string(),
            client_signature: None,
            actor_id: None,
            session_id: None,
            path: None,
            method: None,
            response_status: None,
            details: EventDetails::default(),
            risk_score: 90,
            threat_indicators: BTreeSet::new(),
            correlation_id: None,
            compliance_flags: BTreeSet::new(),
            server_instance: "instance-a".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_alert_queue_creation() {
        let (tx, _rx) = AlertDispatcher::create_channel();
        let queue = AlertQueue::new(tx);

        assert!(!queue.is_closed());
    }

    #[tokio::test]
    async fn test_alert_queue_send() {
        let (tx, mut rx) = AlertDispatcher::create_channel();
        let queue = AlertQueue::new(tx);

        queue.queue_alert(create_test_event(Severity::Critical));

        let received = rx.recv().await;
        assert!(received.is_some());
        assert_eq!(received.unwrap().event_type, EventType::SuspiciousPattern);
    }

    #[tokio::test]
    async fn test_alert_queue_async_send() {
        let (tx, mut rx) = AlertDispatcher::create_channel();
        let queue = AlertQueue::new(tx);

        queue
            .queue_alert_async(create_test_event(Severity::Critical))
            .await
            .unwrap();

        assert!(rx.recv().await.is_some());
    }

    #[test]
    fn test_severity_filtering() {
        let config = AlertConfig {
            enabled: true,
            min_severity: Severity::Critical,
            webhooks: vec![],
        };

        let event = create_test_event(Severity::High);
        assert!(event.severity < config.min_severity);
    }
}
