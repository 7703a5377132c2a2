pub mod token_cache;
pub mod zoom_client;
