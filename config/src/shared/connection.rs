use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::shared::ValidationError;

/// Session options applied to every source connection.
///
/// Keeps timestamp rendering and encoding identical across Postgres installations.
pub struct DefaultPgConnectionOptions;

impl DefaultPgConnectionOptions {
    /// Returns the options as key-value pairs suitable for sqlx.
    pub fn to_key_value_pairs() -> Vec<(String, String)> {
        vec![
            ("datestyle".to_string(), "ISO".to_string()),
            ("intervalstyle".to_string(), "postgres".to_string()),
            ("extra_float_digits".to_string(), "3".to_string()),
            ("client_encoding".to_string(), "UTF8".to_string()),
            ("timezone".to_string(), "UTC".to_string()),
        ]
    }
}

/// Configuration for connecting to the source Postgres database.
///
/// This intentionally does not implement [`serde::Serialize`] to avoid accidentally
/// leaking the password into serialized forms.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PgConnectionConfig {
    /// Hostname or IP address of the Postgres server.
    pub host: String,
    /// Port number on which the Postgres server is listening.
    pub port: u16,
    /// Name of the database holding the `content` schema.
    pub name: String,
    /// Username for authenticating with the Postgres server.
    pub username: String,
    /// Password for the specified user. Redacted in debug output.
    pub password: Option<SecretString>,
    /// TLS configuration for secure connections.
    #[serde(default)]
    pub tls: TlsConfig,
}

impl PgConnectionConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.trim().is_empty() {
            return Err(ValidationError::EmptyField("source.host".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyField("source.name".to_string()));
        }

        self.tls.validate()
    }
}

/// TLS settings for secure Postgres connections.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TlsConfig {
    /// PEM-encoded trusted root certificates.
    #[serde(default)]
    pub trusted_root_certs: String,
    /// Whether TLS is enabled for the connection.
    #[serde(default)]
    pub enabled: bool,
}

impl TlsConfig {
    /// Validates the [`TlsConfig`].
    ///
    /// Returns [`ValidationError::MissingTrustedRootCerts`] if TLS is enabled but no
    /// certificates are provided.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.enabled && self.trusted_root_certs.is_empty() {
            return Err(ValidationError::MissingTrustedRootCerts);
        }

        Ok(())
    }
}

/// Converts a connection config into driver specific connect options.
pub trait IntoConnectOptions<Output> {
    /// Creates connection options for the server without selecting a database.
    ///
    /// Useful for administrative operations like creating a throwaway test database.
    fn without_db(&self) -> Output;

    /// Creates connection options for the configured database.
    fn with_db(&self) -> Output;
}

impl IntoConnectOptions<PgConnectOptions> for PgConnectionConfig {
    fn without_db(&self) -> PgConnectOptions {
        let ssl_mode = if self.tls.enabled {
            PgSslMode::VerifyFull
        } else {
            PgSslMode::Prefer
        };
        let mut options = PgConnectOptions::new_without_pgpass()
            .host(&self.host)
            .username(&self.username)
            .port(self.port)
            .ssl_mode(ssl_mode)
            .options(DefaultPgConnectionOptions::to_key_value_pairs());

        if self.tls.enabled {
            options =
                options.ssl_root_cert_from_pem(self.tls.trusted_root_certs.clone().into_bytes());
        }

        if let Some(password) = &self.password {
            options = options.password(password.expose_secret());
        }

        options
    }

    fn with_db(&self) -> PgConnectOptions {
        let options: PgConnectOptions = self.without_db();
        options.database(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(tls: TlsConfig) -> PgConnectionConfig {
        PgConnectionConfig {
            host: "localhost".to_string(),
            port: 5432,
            name: "movies_database".to_string(),
            username: "app".to_string(),
            password: Some(SecretString::from("123qwe")),
            tls,
        }
    }

    #[test]
    fn test_key_value_pairs() {
        let pairs = DefaultPgConnectionOptions::to_key_value_pairs();

        assert_eq!(pairs.len(), 5);
        assert!(pairs.contains(&("datestyle".to_string(), "ISO".to_string())));
        assert!(pairs.contains(&("timezone".to_string(), "UTC".to_string())));
    }

    #[test]
    fn test_tls_enabled_without_certs_is_rejected() {
        let config = config(TlsConfig {
            trusted_root_certs: String::new(),
            enabled: true,
        });

        assert!(matches!(
            config.validate(),
            Err(ValidationError::MissingTrustedRootCerts)
        ));
    }

    #[test]
    fn test_with_db_selects_database() {
        let options: PgConnectOptions = config(TlsConfig::default()).with_db();

        assert_eq!(options.get_database(), Some("movies_database"));
        assert_eq!(options.get_host(), "localhost");
        assert_eq!(options.get_port(), 5432);
    }
}
