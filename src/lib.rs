pub mod config;
pub mod error;
pub mod event;
pub mod registry;
pub mod relay;
pub mod session;
pub mod store;
pub mod telegram;

/// Platform-assigned stable user identifier.
pub type UserId = i64;
