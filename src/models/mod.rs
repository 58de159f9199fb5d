//! # Data Models
//!
//! This module contains all the data models used throughout the Calbridge API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod integration;
pub mod provider;
pub mod security_event;

pub use integration::Entity as Integration;
pub use provider::{IntegrationStatus, Provider};
pub use security_event::Entity as SecurityEvent;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "calbridge".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
