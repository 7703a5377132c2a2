pub mod dispatcher;
pub mod email_client;
pub mod templates;
