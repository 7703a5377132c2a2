use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Email that could not be delivered after its retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub to: String,
    pub subject: String,
    pub error: String,
}
