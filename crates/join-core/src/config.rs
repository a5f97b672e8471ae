//! Join engine configuration
//!
//! Loaded from TOML or built in code. Every field has a default, so a
//! partial file only overrides what it names.

use serde::{Deserialize, Serialize};

use crate::errors::{JoinError, Result};
use crate::types::{Direction, SDP_CONTENT_TYPE};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinConfig {
    /// Direction used when a join request does not name one
    pub default_direction: Direction,

    /// Content type given to generated descriptions that carry none
    pub media_content_type: String,

    /// When set, a bridged join whose negotiation fails also rejects the
    /// inbound request with this status
    pub negotiation_failure_status: Option<u16>,

    /// Capacity of the notification broadcast channel
    pub notification_capacity: usize,

    /// Tear down the second leg's media bridge before a direct join
    pub disengage_before_direct: bool,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            default_direction: Direction::Duplex,
            media_content_type: SDP_CONTENT_TYPE.to_string(),
            negotiation_failure_status: None,
            notification_capacity: 128,
            disengage_before_direct: true,
        }
    }
}

impl JoinConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_direction(mut self, direction: Direction) -> Self {
        self.default_direction = direction;
        self
    }

    pub fn with_media_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.media_content_type = content_type.into();
        self
    }

    pub fn with_negotiation_failure_status(mut self, status: u16) -> Self {
        self.negotiation_failure_status = Some(status);
        self
    }

    pub fn with_notification_capacity(mut self, capacity: usize) -> Self {
        self.notification_capacity = capacity;
        self
    }

    pub fn with_disengage_before_direct(mut self, enabled: bool) -> Self {
        self.disengage_before_direct = enabled;
        self
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: JoinConfig = toml::from_str(s)
            .map_err(|e| JoinError::Config(format!("Invalid join config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.notification_capacity == 0 {
            return Err(JoinError::Config(
                "notification_capacity must be greater than zero".to_string(),
            ));
        }
        if let Some(status) = self.negotiation_failure_status {
            if !(300..700).contains(&status) {
                return Err(JoinError::Config(format!(
                    "negotiation_failure_status {} is not an error status",
                    status
                )));
            }
        }
        if self.media_content_type.is_empty() {
            return Err(JoinError::Config("media_content_type is empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = JoinConfig::from_toml_str(
            r#"
            default_direction = "send"
            negotiation_failure_status = 488
            "#,
        )
        .unwrap();

        assert_eq!(config.default_direction, Direction::Send);
        assert_eq!(config.negotiation_failure_status, Some(488));
        assert_eq!(config.media_content_type, "application/sdp");
        assert_eq!(config.notification_capacity, 128);
        assert!(config.disengage_before_direct);
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(JoinConfig::from_toml_str("").unwrap(), JoinConfig::default());
    }

    #[test]
    fn test_validation() {
        assert!(JoinConfig::new().with_notification_capacity(0).validate().is_err());
        assert!(JoinConfig::new().with_negotiation_failure_status(200).validate().is_err());
        assert!(JoinConfig::new().with_negotiation_failure_status(488).validate().is_ok());
        assert!(matches!(
            JoinConfig::from_toml_str("default_direction = \"sideways\""),
            Err(JoinError::Config(_))
        ));
    }
}
