//! # Calbridge API Library
//!
//! OAuth token lifecycle management and webhook security validation for
//! calendar and meeting providers, including handlers, the encrypted token
//! store, the refresh coordinator, and server configuration.

pub mod adapters;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repositories;
pub mod server;
pub mod telemetry;
pub mod token_refresh;
pub mod token_store;
pub mod webhook;
pub use migration;
