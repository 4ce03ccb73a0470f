//! # Data Models
//!
//! This module contains the SeaORM entities used throughout the Wellness
//! Reports service.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod email_log;
pub mod integration_token;
pub mod report;

pub use email_log::Entity as EmailLog;
pub use integration_token::Entity as IntegrationToken;
pub use report::Entity as Report;

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
            service: "wellness-reports".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
