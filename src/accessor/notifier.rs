//! HTTP notification delivery.
//!
//! # Responsibilities
//! - Buffer notifications in a bounded queue
//! - Deliver them from a fixed pool of worker tasks
//!
//! # Design Decisions
//! - Enqueue never waits: a full queue is reported to the caller
//! - Delivery failures are logged and dropped; there is no retry

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Mutex};

use crate::differ::Notification;
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("notification queue is full")]
    QueueFull,

    #[error("notifier is stopped")]
    Closed,

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

struct Pending {
    module: String,
    api_id: u32,
    notification: Notification,
}

/// Queue plus worker pool posting to `<url>/notification/<api_id>`.
pub struct Notifier {
    base_url: String,
    workers: usize,
    client: reqwest::Client,
    sender: mpsc::Sender<Pending>,
    receiver: Arc<Mutex<mpsc::Receiver<Pending>>>,
}

impl Notifier {
    pub fn new(url: &str, queue_size: usize, workers: usize, timeout: Duration) -> Result<Self, NotifierError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let (sender, receiver) = mpsc::channel(queue_size.max(1));
        Ok(Self {
            base_url: with_scheme(url),
            workers: workers.max(1),
            client,
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Spawn the workers. Each exits when `shutdown` fires.
    pub fn start(&self, shutdown: &crate::lifecycle::Shutdown) {
        tracing::info!(url = %self.base_url, workers = self.workers, "Notifier starting");
        for worker_id in 0..self.workers {
            tokio::spawn(worker(
                worker_id,
                self.base_url.clone(),
                self.client.clone(),
                self.receiver.clone(),
                shutdown.subscribe(),
            ));
        }
    }

    pub fn notify(&self, module: &str, api_id: u32, notification: Notification) -> Result<(), NotifierError> {
        self.sender
            .try_send(Pending {
                module: module.to_string(),
                api_id,
                notification,
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => NotifierError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => NotifierError::Closed,
            })
    }
}

async fn worker(
    worker_id: usize,
    base_url: String,
    client: reqwest::Client,
    queue: Arc<Mutex<mpsc::Receiver<Pending>>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        let pending = tokio::select! {
            pending = async { queue.lock().await.recv().await } => match pending {
                Some(pending) => pending,
                None => break,
            },
            _ = shutdown.recv() => break,
        };

        let url = format!("{}/notification/{}", base_url, pending.api_id);
        tracing::debug!(worker_id, api_id = pending.api_id, module = %pending.module, "Sending notification");

        let outcome = match client.post(&url).json(&pending.notification).send().await {
            Ok(response) if response.status().is_success() => "sent",
            Ok(response) => {
                tracing::error!(url = %url, status = %response.status(), "Notification rejected");
                "rejected"
            }
            Err(e) => {
                tracing::error!(url = %url, error = %e, "Notification failed");
                "failed"
            }
        };
        metrics::record_notification(&pending.module, outcome);
    }
    tracing::debug!(worker_id, "Notifier worker stopped");
}

fn with_scheme(url: &str) -> String {
    let url = url.trim_end_matches('/');
    if url.contains("://") {
        url.to_string()
    } else {
        format!("http://{url}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::ApiType;
    use crate::differ::{ApiDiffs, ApiInfoWithType, SpecDiffsNotification};

    fn notification() -> Notification {
        Notification::SpecDiffsNotification(SpecDiffsNotification {
            diffs: ApiDiffs {
                api_info: ApiInfoWithType {
                    id: 1,
                    name: "a".into(),
                    port: 80,
                    destination_namespace: String::new(),
                    has_provided_spec: false,
                    has_reconstructed_spec: true,
                    trace_source_id: uuid::Uuid::nil(),
                    api_type: ApiType::External,
                },
                diffs: Vec::new(),
            },
        })
    }

    #[test]
    fn test_scheme_is_added() {
        assert_eq!(with_scheme("backend:8080/api/"), "http://backend:8080/api");
        assert_eq!(with_scheme("https://backend"), "https://backend");
    }

    #[tokio::test]
    async fn test_full_queue_is_reported() {
        let notifier = Notifier::new("localhost:1", 1, 1, Duration::from_secs(1)).unwrap();
        notifier.notify("spec_differ", 1, notification()).unwrap();

        let err = notifier.notify("spec_differ", 1, notification()).unwrap_err();
        assert!(matches!(err, NotifierError::QueueFull));
    }
}
