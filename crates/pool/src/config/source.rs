//! Key-value configuration source (`key=value`, one per line)
//!
//! ```text
//! ip=127.0.0.1
//! port=3306
//! username=root
//! password=secret
//! dbname=chat
//! initSize=10
//! maxSize=1024
//! maxIdleTime=60
//! connectionTimeOut=100
//! ```
//!
//! `maxIdleTime` is in seconds, `connectionTimeOut` in milliseconds.
//! Unknown keys are ignored and lines without `=` are skipped.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use super::PoolConfig;
use crate::error::{Error, Result};

/// Where a [`PoolConfig`] comes from.
#[derive(Debug)]
pub enum ConfigSource {
    /// Key-value file on disk
    File(PathBuf),
    /// Key-value text held in memory
    Inline(String),
    /// Already resolved settings
    Resolved(PoolConfig),
}

impl ConfigSource {
    /// Resolve the source into a validated [`PoolConfig`].
    pub async fn load(self) -> Result<PoolConfig> {
        match self {
            Self::File(path) => PoolConfig::load(path).await,
            Self::Inline(text) => PoolConfig::parse(&text),
            Self::Resolved(config) => {
                config.validate()?;
                Ok(config)
            }
        }
    }
}

impl From<PoolConfig> for ConfigSource {
    fn from(config: PoolConfig) -> Self {
        Self::Resolved(config)
    }
}

impl PoolConfig {
    /// Read and parse a key-value configuration file.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
            Error::configuration_with(
                format!("cannot read configuration file '{}'", path.display()),
                e,
            )
        })?;
        Self::parse(&text)
    }

    /// Parse key-value text, starting from [`PoolConfig::default`] and
    /// validating the result.
    pub fn parse(text: &str) -> Result<Self> {
        let mut config = Self::default();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                tracing::debug!(line, "skipping configuration line without '='");
                continue;
            };
            let (key, value) = (key.trim(), value.trim());

            match key {
                "ip" => config.endpoint.host = value.to_owned(),
                "port" => config.endpoint.port = number(key, value)?,
                "dbname" => config.endpoint.database = value.to_owned(),
                "username" => config.credentials.username = value.to_owned(),
                "password" => config.credentials.password = SecretString::from(value.to_owned()),
                "initSize" => config.initial_size = number(key, value)?,
                "maxSize" => config.max_size = number(key, value)?,
                "maxIdleTime" => config.max_idle = Duration::from_secs(number(key, value)?),
                "connectionTimeOut" => {
                    config.acquire_timeout = Duration::from_millis(number(key, value)?);
                }
                _ => tracing::debug!(key, "ignoring unrecognized configuration key"),
            }
        }

        config.validate()?;
        Ok(config)
    }
}

fn number<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .map_err(|e| Error::configuration_with(format!("invalid value for `{key}`: {value:?}"), e))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use secrecy::ExposeSecret;

    use super::*;

    const SAMPLE: &str = "\
# backend
ip=10.1.2.3
port=3307
username=root
password=p@ss=word
dbname=chat
initSize=2
maxSize=5
maxIdleTime=1
connectionTimeOut=100
";

    #[test]
    fn parses_all_recognized_keys() {
        let config = PoolConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.endpoint.host, "10.1.2.3");
        assert_eq!(config.endpoint.port, 3307);
        assert_eq!(config.endpoint.database, "chat");
        assert_eq!(config.credentials.username, "root");
        assert_eq!(config.credentials.password.expose_secret(), "p@ss=word");
        assert_eq!(config.initial_size, 2);
        assert_eq!(config.max_size, 5);
        assert_eq!(config.max_idle, Duration::from_secs(1));
        assert_eq!(config.acquire_timeout, Duration::from_millis(100));
    }

    #[test]
    fn tolerates_crlf_unknown_keys_and_garbage_lines() {
        let text = "ip=db\r\nnonsense line\r\ncolor=blue\r\n\r\ninitSize=3\r\nmaxSize=3\r\n";
        let config = PoolConfig::parse(text).unwrap();
        assert_eq!(config.endpoint.host, "db");
        assert_eq!(config.initial_size, 3);
        assert_eq!(config.max_size, 3);
    }

    #[test]
    fn later_assignment_wins() {
        let config = PoolConfig::parse("maxSize=4\nmaxSize=8\n").unwrap();
        assert_eq!(config.max_size, 8);
    }

    #[test]
    fn non_numeric_size_names_the_key() {
        let err = PoolConfig::parse("maxSize=lots\n").unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(err.to_string().contains("maxSize"), "{err}");
    }

    #[test]
    fn parsed_values_are_validated() {
        let err = PoolConfig::parse("initSize=8\nmaxSize=2\n").unwrap_err();
        assert!(err.to_string().contains("initial_size"), "{err}");
    }

    #[tokio::test]
    async fn missing_file_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = PoolConfig::load(dir.path().join("mysql.ini"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { source: Some(_), .. }));
    }

    #[tokio::test]
    async fn loads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mysql.ini");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = ConfigSource::File(path).load().await.unwrap();
        assert_eq!(config.max_size, 5);
    }

    #[tokio::test]
    async fn resolved_source_is_still_validated() {
        let source = ConfigSource::from(PoolConfig {
            max_size: 0,
            ..Default::default()
        });
        assert!(source.load().await.is_err());
    }

    proptest! {
        #[test]
        fn parser_never_panics(text in "[a-zA-Z=#;\\r\\n 0-9.]{0,200}") {
            let _ = PoolConfig::parse(&text);
        }

        #[test]
        fn sizes_round_trip_through_text(initial in 1usize..64, extra in 0usize..64) {
            let max = initial + extra;
            let config = PoolConfig::parse(&format!("initSize={initial}\nmaxSize={max}\n")).unwrap();
            prop_assert_eq!(config.initial_size, initial);
            prop_assert_eq!(config.max_size, max);
        }
    }
}
