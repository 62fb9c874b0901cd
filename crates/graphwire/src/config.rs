//! Server configuration.

use graphwire_core::SerializerConfig;
use serde::{Deserialize, Serialize};

use crate::GraphwireError;

/// Configuration for a [`PackServer`](crate::PackServer).
///
/// Every field has a default, so a JSON document only needs the fields it
/// changes:
///
/// ```
/// # use graphwire::ServerConfig;
/// let config = ServerConfig::from_json_str(r#"{ "bind_addr": "0.0.0.0:3030" }"#).unwrap();
/// assert_eq!(config.name, "graphwire server");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the TCP listener binds to.
    pub bind_addr: String,

    /// Name sent to every peer during the handshake.
    pub name: String,

    /// Serializer settings for every connection.
    pub serializer: SerializerConfig,
}

impl ServerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, GraphwireError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3030".to_string(),
            name: "graphwire server".to_string(),
            serializer: SerializerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphwire_core::MissingIndexPolicy;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ServerConfig::from_json_str(
            r#"{ "name": "lobby", "serializer": { "max_container_len": 1000 } }"#,
        )
        .unwrap();
        assert_eq!(config.name, "lobby");
        assert_eq!(config.bind_addr, "127.0.0.1:3030");
        assert_eq!(config.serializer.max_container_len, 1000);
        assert!(config.serializer.smart_pointers);
        assert_eq!(
            config.serializer.missing_index_policy,
            MissingIndexPolicy::FallBackToValue
        );
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            ServerConfig::from_json_str("{ bind_addr"),
            Err(GraphwireError::Config(_))
        ));
    }
}
