//! Configuration loading
//!
//! The configuration lives in a TOML file with a `[base]` table describing the
//! outbound SMTP account and the polling cadence, and an `[accounts]` table
//! with one sub-table per IMAP account to watch.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::scheduler::MAX_INTERVAL;

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "PEAKER_CONFIG";

/// Config file used when [`CONFIG_ENV`] is not set
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Mailbox watched when an account lists none
pub const DEFAULT_MAILBOX: &str = "INBOX";

/// Documented config written on first run
pub const DEFAULT_CONFIG: &str = include_str!("../default_config.toml");

/// Host, port and credentials of a mail server account
#[derive(Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Server hostname
    pub host: String,
    /// Server port
    pub port: u16,
    /// Email address, also used as the login name
    pub email: String,
    /// Login password
    pub password: String,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An IMAP account to watch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountConfig {
    /// Name taken from the `[accounts.<name>]` key
    pub name: String,
    /// IMAP server
    pub server: ServerConfig,
    /// Mailboxes to check, never empty
    pub mailboxes: Vec<String>,
    /// Effective template identifier
    pub template: String,
}

/// Loaded configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Outbound SMTP account
    pub outbound: ServerConfig,
    /// Default template identifier
    pub template: String,
    /// Watched accounts, in file order
    pub accounts: Vec<AccountConfig>,
    /// Start polling immediately instead of on the next interval boundary
    pub dev: bool,
    /// Polling interval
    pub interval: Duration,
    /// Address the notifications are sent to
    pub recipient: String,
}

/// Errors returned while loading the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No config existed, so the default one was written
    #[error(
        "created a new config file '{}'. Please edit it and start the program again",
        .path.display()
    )]
    Created {
        /// Where the default config was written
        path: PathBuf,
    },

    /// No config existed and the default one could not be written
    #[error(
        "can't write the config file to '{}'. Create it manually and start the program again: {source}",
        .path.display()
    )]
    WriteDefault {
        /// Where the default config should have been written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The config file exists but could not be read
    #[error("can't read the config file '{}': {source}", .path.display())]
    Read {
        /// Path to the config file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML or has mistyped values
    #[error("can't parse the config file '{}': {source}", .path.display())]
    Parse {
        /// Path to the config file
        path: PathBuf,
        /// Underlying TOML error
        #[source]
        source: toml::de::Error,
    },

    /// Config text is not valid TOML or has mistyped values
    #[error("can't parse the config: {0}")]
    Syntax(#[source] toml::de::Error),

    /// A required key is absent
    #[error("the config file has no entry for the key '{0}'")]
    MissingKey(String),

    /// A key holds a value outside its allowed range
    #[error("invalid value for the key '{key}': {reason}")]
    InvalidValue {
        /// Dotted key path
        key: String,
        /// What is wrong with the value
        reason: String,
    },
}

#[derive(Deserialize)]
struct RawConfig {
    base: Option<RawBase>,
    accounts: Option<toml::Table>,
}

#[derive(Deserialize)]
struct RawBase {
    template: Option<String>,
    dev: Option<bool>,
    interval: Option<i64>,
    recipient: Option<String>,
    server: Option<String>,
    port: Option<i64>,
    email: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize)]
struct RawAccount {
    server: Option<String>,
    port: Option<i64>,
    email: Option<String>,
    password: Option<String>,
    mailboxes: Option<Vec<String>>,
    template: Option<String>,
}

/// Pick the config path from the value of [`CONFIG_ENV`], if any.
pub fn resolve_path(env_value: Option<OsString>) -> PathBuf {
    env_value
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// The config path for this process.
pub fn config_path() -> PathBuf {
    resolve_path(std::env::var_os(CONFIG_ENV))
}

/// Load the configuration from [`config_path`].
pub async fn load() -> Result<Config, ConfigError> {
    load_from(config_path()).await
}

/// Load the configuration from `path`.
///
/// When the file does not exist the documented default config is written
/// there and [`ConfigError::Created`] is returned, so the operator can fill
/// it in before the next start.
pub async fn load_from(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    debug!("Reading config file {}", path.display());

    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            return Err(write_default(path).await);
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    from_toml_str(&contents).map_err(|error| match error {
        ConfigError::Syntax(source) => ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })
}

async fn write_default(path: &Path) -> ConfigError {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o640);

    let result = async {
        let mut file = options.open(path).await?;
        file.write_all(DEFAULT_CONFIG.as_bytes()).await?;
        file.flush().await
    }
    .await;

    match result {
        Ok(()) => {
            info!("Wrote default config file {}", path.display());
            ConfigError::Created {
                path: path.to_path_buf(),
            }
        }
        Err(source) => ConfigError::WriteDefault {
            path: path.to_path_buf(),
            source,
        },
    }
}

/// Parse and validate configuration text.
pub fn from_toml_str(contents: &str) -> Result<Config, ConfigError> {
    let raw: RawConfig = toml::from_str(contents).map_err(ConfigError::Syntax)?;

    let base = raw.base.ok_or_else(|| missing("base"))?;
    let accounts = raw.accounts.ok_or_else(|| missing("accounts"))?;
    let template = base.template.ok_or_else(|| missing("base.template"))?;
    let interval = base.interval.ok_or_else(|| missing("base.interval"))?;

    let outbound = server_config(
        "base",
        base.server,
        base.port,
        base.email,
        base.password,
    )?;
    for (key, value) in [
        ("base.server", &outbound.host),
        ("base.email", &outbound.email),
        ("base.password", &outbound.password),
    ] {
        if value.is_empty() {
            return Err(invalid(key, "must not be empty"));
        }
    }

    let max_interval = MAX_INTERVAL.as_secs();
    let interval = u64::try_from(interval)
        .ok()
        .filter(|secs| (1..=max_interval).contains(secs))
        .ok_or_else(|| {
            invalid(
                "base.interval",
                format!("must be between 1 and {} seconds", max_interval),
            )
        })?;

    let accounts = accounts
        .into_iter()
        .map(|(key, value)| account_config(&key, value, &template))
        .collect::<Result<Vec<_>, _>>()?;

    let recipient = base
        .recipient
        .filter(|recipient| !recipient.is_empty())
        .unwrap_or_else(|| outbound.email.clone());

    Ok(Config {
        outbound,
        template,
        accounts,
        dev: base.dev.unwrap_or(false),
        interval: Duration::from_secs(interval),
        recipient,
    })
}

fn account_config(
    key: &str,
    value: toml::Value,
    default_template: &str,
) -> Result<AccountConfig, ConfigError> {
    let prefix = format!("accounts.{}", key);
    let raw: RawAccount = value
        .try_into()
        .map_err(|e: toml::de::Error| invalid(&prefix, e.to_string()))?;

    let server = server_config(&prefix, raw.server, raw.port, raw.email, raw.password)?;

    let mailboxes = match raw.mailboxes {
        Some(mailboxes) if !mailboxes.is_empty() => mailboxes,
        _ => vec![DEFAULT_MAILBOX.to_string()],
    };

    Ok(AccountConfig {
        name: key.rsplit('.').next().unwrap_or(key).to_string(),
        server,
        mailboxes,
        template: raw
            .template
            .unwrap_or_else(|| default_template.to_string()),
    })
}

fn server_config(
    prefix: &str,
    server: Option<String>,
    port: Option<i64>,
    email: Option<String>,
    password: Option<String>,
) -> Result<ServerConfig, ConfigError> {
    let host = server.ok_or_else(|| missing(format!("{}.server", prefix)))?;
    let port = port.ok_or_else(|| missing(format!("{}.port", prefix)))?;
    let email = email.ok_or_else(|| missing(format!("{}.email", prefix)))?;
    let password = password.ok_or_else(|| missing(format!("{}.password", prefix)))?;

    let port = u16::try_from(port)
        .ok()
        .filter(|port| *port != 0)
        .ok_or_else(|| invalid(&format!("{}.port", prefix), "must be between 1 and 65535"))?;

    Ok(ServerConfig {
        host,
        port,
        email,
        password,
    })
}

fn missing(key: impl Into<String>) -> ConfigError {
    ConfigError::MissingKey(key.into())
}

fn invalid(key: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.into(),
    }
}
