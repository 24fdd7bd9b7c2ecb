//! Adapter configuration.
//!
//! Configuration is plain data and is handed to [`Adapter`](crate::adapter::Adapter)
//! explicitly. It deserializes from JSON and accepts the parameter aliases commonly used
//! by application config files:
//!
//! | Field | Aliases |
//! |---|---|
//! | `dbname` | `database`, `db`, `schema` |
//! | `username` | `user` |
//! | `password` | `passwd`, `pw` |
//!
//! ```ignore
//! let config = AdapterConfig::from_json_str(r#"{
//!     "dsn": "mongodb://localhost:27017",
//!     "database": "music",
//!     "driver_options": { "connect": true }
//! }"#)?;
//! ```

use serde::{Deserialize, Serialize};

use crate::{
    driver::ConnectionParams,
    error::{DocumentStoreError, DocumentStoreResult},
};

/// Options interpreted by the adapter itself rather than by the driver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverOptions {
    /// Connect as soon as the adapter is opened instead of on first use.
    pub connect: bool,
}

/// Connection settings for an [`Adapter`](crate::adapter::Adapter).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Driver-specific connection string.
    pub dsn: String,
    /// Target database.
    #[serde(default, alias = "database", alias = "db", alias = "schema")]
    pub dbname: Option<String>,
    #[serde(default, alias = "user", skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(
        default,
        alias = "passwd",
        alias = "pw",
        skip_serializing_if = "Option::is_none"
    )]
    pub password: Option<String>,
    #[serde(default)]
    pub driver_options: DriverOptions,
}

impl AdapterConfig {
    pub fn new(dsn: impl Into<String>, dbname: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            dbname: Some(dbname.into()),
            ..Self::default()
        }
    }

    /// Parses a JSON configuration object.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the JSON is malformed or lacks `dsn`.
    pub fn from_json_str(json: &str) -> DocumentStoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Enables eager connection on [`Adapter::open`](crate::adapter::Adapter::open).
    pub fn with_eager_connect(mut self, connect: bool) -> Self {
        self.driver_options.connect = connect;
        self
    }

    /// Builds the parameters handed to the driver.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidInput`] when the DSN or database name is empty.
    pub fn connection_params(&self) -> DocumentStoreResult<ConnectionParams> {
        if self.dsn.trim().is_empty() {
            return Err(DocumentStoreError::InvalidInput(
                "connection string must not be empty".to_string(),
            ));
        }
        let database = match self.dbname.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => {
                return Err(DocumentStoreError::InvalidInput(
                    "database name must be configured".to_string(),
                ));
            }
        };

        Ok(ConnectionParams {
            dsn: self.dsn.clone(),
            database: database.to_string(),
            username: self.username.clone(),
            password: self.password.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases() {
        let config = AdapterConfig::from_json_str(
            r#"{ "dsn": "memory://", "schema": "music", "user": "u", "pw": "p" }"#,
        )
        .unwrap();

        assert_eq!(config.dbname.as_deref(), Some("music"));
        assert_eq!(config.username.as_deref(), Some("u"));
        assert_eq!(config.password.as_deref(), Some("p"));
        assert!(!config.driver_options.connect);
    }

    #[test]
    fn test_driver_options() {
        let config = AdapterConfig::from_json_str(
            r#"{ "dsn": "memory://", "db": "music", "driver_options": { "connect": true } }"#,
        )
        .unwrap();

        assert!(config.driver_options.connect);
    }

    #[test]
    fn test_missing_dsn_is_rejected() {
        assert!(matches!(
            AdapterConfig::from_json_str(r#"{ "database": "music" }"#),
            Err(DocumentStoreError::Serialization(_))
        ));
    }

    #[test]
    fn test_connection_params() {
        let params = AdapterConfig::new("memory://", "music")
            .with_credentials("u", "p")
            .connection_params()
            .unwrap();

        assert_eq!(params.database, "music");
        assert_eq!(params.username.as_deref(), Some("u"));

        assert!(matches!(
            AdapterConfig { dsn: "memory://".into(), ..Default::default() }.connection_params(),
            Err(DocumentStoreError::InvalidInput(_))
        ));
    }
}
