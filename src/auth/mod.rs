pub mod cache;
pub mod client_secrets;
pub mod credential;
pub mod oauth;
pub mod secret_store;
pub mod store;
