use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::domain::{
    repositories::notifications::EmailSender,
    value_objects::notifications::{DeliveryFailure, EmailMessage},
};

const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Sends emails off the request path. Each message gets one retry; what still
/// fails is logged and returned from the task, never surfaced to the caller.
#[derive(Clone)]
pub struct NotificationDispatcher {
    sender: Arc<dyn EmailSender + Send + Sync>,
    retry_delay: Duration,
}

impl NotificationDispatcher {
    pub fn new(sender: Arc<dyn EmailSender + Send + Sync>) -> Self {
        Self {
            sender,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn dispatch(&self, messages: Vec<EmailMessage>) -> JoinHandle<Vec<DeliveryFailure>> {
        let sender = Arc::clone(&self.sender);
        let retry_delay = self.retry_delay;

        tokio::spawn(async move {
            let mut failures = Vec::new();
            for message in messages {
                if let Err(first) = sender.send(message.clone()).await {
                    warn!(
                        to = %message.to,
                        subject = %message.subject,
                        error = %first,
                        "notifications: delivery failed, retrying"
                    );
                    tokio::time::sleep(retry_delay).await;

                    if let Err(second) = sender.send(message.clone()).await {
                        error!(
                            to = %message.to,
                            subject = %message.subject,
                            error = %second,
                            "notifications: delivery failed after retry"
                        );
                        failures.push(DeliveryFailure {
                            to: message.to,
                            subject: message.subject,
                            error: second.to_string(),
                        });
                    }
                }
            }
            failures
        })
    }
}
