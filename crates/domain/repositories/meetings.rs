use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::domain::value_objects::meetings::{MeetingLink, MeetingRequest};

#[async_trait]
#[automock]
pub trait MeetingLinkProvider {
    async fn create_meeting(&self, request: MeetingRequest) -> Result<MeetingLink>;
}
