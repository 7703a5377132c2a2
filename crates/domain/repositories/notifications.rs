use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::domain::value_objects::notifications::EmailMessage;

#[async_trait]
#[automock]
pub trait EmailSender {
    async fn send(&self, message: EmailMessage) -> Result<()>;
}
