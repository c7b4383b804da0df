//! Scan Sentry — chat-driven file reputation scanning service.

pub mod config;
pub mod error;
pub mod filter;
pub mod format;
pub mod handler;
pub mod health;
pub mod scan;
pub mod session;
pub mod store;
pub mod transport;
