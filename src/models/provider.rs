//! Provider enumeration
//!
//! Canonical set of external calendar/meeting providers an integration can
//! point at. Stored as a text column; parsed at the API boundary so handlers
//! and the adapter registry never deal in raw strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// External OAuth provider for an integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Microsoft,
    Zoom,
    Caldav,
}

impl Provider {
    /// All known providers, in stable order.
    pub const ALL: [Provider; 4] = [
        Provider::Google,
        Provider::Microsoft,
        Provider::Zoom,
        Provider::Caldav,
    ];

    /// Stable lowercase identifier used in the database and URL paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Microsoft => "microsoft",
            Provider::Zoom => "zoom",
            Provider::Caldav => "caldav",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown provider or status identifier.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown identifier '{value}'")]
pub struct UnknownIdentifier {
    pub value: String,
}

impl FromStr for Provider {
    type Err = UnknownIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(Provider::Google),
            "microsoft" => Ok(Provider::Microsoft),
            "zoom" => Ok(Provider::Zoom),
            "caldav" => Ok(Provider::Caldav),
            other => Err(UnknownIdentifier {
                value: other.to_string(),
            }),
        }
    }
}

/// Lifecycle status of an integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationStatus {
    /// Tokens present and usable (possibly close to expiry).
    Connected,
    /// Refresh failed terminally; the user must reconnect.
    Expired,
    /// Revoked locally; token columns are cleared.
    Disconnected,
}

impl IntegrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationStatus::Connected => "connected",
            IntegrationStatus::Expired => "expired",
            IntegrationStatus::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for IntegrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntegrationStatus {
    type Err = UnknownIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connected" => Ok(IntegrationStatus::Connected),
            "expired" => Ok(IntegrationStatus::Expired),
            "disconnected" => Ok(IntegrationStatus::Disconnected),
            other => Err(UnknownIdentifier {
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_roundtrips_through_str() {
        for provider in Provider::ALL {
            assert_eq!(provider.as_str().parse::<Provider>().unwrap(), provider);
        }
    }

    #[test]
    fn unknown_provider_is_rejected() {
        assert!("slack".parse::<Provider>().is_err());
        assert!("".parse::<Provider>().is_err());
        // Parsing is case sensitive; identifiers are stored lowercase.
        assert!("Google".parse::<Provider>().is_err());
    }

    #[test]
    fn status_roundtrips_through_str() {
        for status in [
            IntegrationStatus::Connected,
            IntegrationStatus::Expired,
            IntegrationStatus::Disconnected,
        ] {
            assert_eq!(
                status.as_str().parse::<IntegrationStatus>().unwrap(),
                status
            );
        }
    }
}
