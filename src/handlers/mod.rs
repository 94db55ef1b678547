pub mod auth;
pub mod shop;
pub mod webhooks;
