//! Pool configuration types

mod source;

pub use source::ConfigSource;

use std::fmt;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::{Error, Result};

/// Network location of the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or IP address
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Database (schema) selected after connecting
    pub database: String,
}

impl Endpoint {
    /// Create an endpoint for `host:port/database`.
    pub fn new(host: impl Into<String>, port: u16, database: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            database: database.into(),
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new("127.0.0.1", 3306, "")
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)?;
        if !self.database.is_empty() {
            write!(f, "/{}", self.database)?;
        }
        Ok(())
    }
}

/// Login presented by the connector. The password is never printed.
#[derive(Debug)]
pub struct Credentials {
    /// Login name
    pub username: String,
    /// Login password
    pub password: SecretString,
}

impl Credentials {
    /// Create credentials from a username and password.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::new("", "")
    }
}

/// Resolved pool settings, consumed once by [`Pool::connect`](crate::Pool::connect).
#[derive(Debug)]
pub struct PoolConfig {
    /// Where connections are opened
    pub endpoint: Endpoint,
    /// Login used for every connection
    pub credentials: Credentials,
    /// Connections opened at construction; the reaper never goes below this
    pub initial_size: usize,
    /// Upper bound on simultaneously open connections
    pub max_size: usize,
    /// Idle time after which a surplus connection is closed; also the reaper period
    pub max_idle: Duration,
    /// How long `acquire` waits for an idle connection
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            credentials: Credentials::default(),
            initial_size: 1,
            max_size: 10,
            max_idle: Duration::from_secs(60),
            acquire_timeout: Duration::from_millis(100),
        }
    }
}

impl PoolConfig {
    /// Validate pool configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.host.trim().is_empty() {
            return Err(Error::configuration("host must not be empty"));
        }
        if self.endpoint.port == 0 {
            return Err(Error::configuration("port must be greater than 0"));
        }
        if self.initial_size == 0 {
            return Err(Error::configuration("initial_size must be greater than 0"));
        }
        if self.initial_size > self.max_size {
            return Err(Error::configuration(format!(
                "initial_size ({}) must not exceed max_size ({})",
                self.initial_size, self.max_size
            )));
        }
        if self.max_idle.is_zero() {
            return Err(Error::configuration("max_idle must be greater than zero"));
        }
        if self.acquire_timeout.is_zero() {
            return Err(Error::configuration(
                "acquire_timeout must be greater than zero",
            ));
        }
        Ok(())
    }
}
