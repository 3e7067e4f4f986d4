//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, path::PathBuf, str::FromStr};

use clap::{Args, Parser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_DB_ACQUIRE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;
const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u32 = 100;
const DEFAULT_IDEMPOTENCY_TTL_HOURS: u64 = 24;
const DEFAULT_IDEMPOTENCY_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Command-line arguments for the reports binary.
#[derive(Debug, Parser)]
#[command(name = "nutrichain-reports", version, about = "NutriChain reporting API server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "NUTRICHAIN_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Override the log format (json|compact).
    #[arg(long = "log-format", value_name = "FORMAT")]
    pub log_format: Option<String>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub rate_limit: RateLimitSettings,
    pub idempotency: IdempotencySettings,
}

#[derive(Debug)]
pub struct ServerSettings {
    pub addr: SocketAddr,
}

#[derive(Debug)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug)]
pub struct AuthSettings {
    pub token_secret: String,
}

#[derive(Debug)]
pub struct RateLimitSettings {
    pub window_secs: u64,
    pub max_requests: u32,
}

#[derive(Debug)]
pub struct IdempotencySettings {
    pub ttl_hours: u64,
    pub max_body_bytes: usize,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read configuration: {0}")]
    Read(#[from] config::ConfigError),
    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl LoadError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// Parse CLI arguments and load the layered settings.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let cli = CliArgs::parse();
    let settings = load(&cli)?;
    Ok((cli, settings))
}

/// Load settings: defaults file, then optional explicit file, then
/// `NUTRICHAIN__*` environment variables, then CLI overrides.
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder =
        Config::builder().add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false));

    if let Some(path) = &cli.config_file {
        builder = builder.add_source(File::from(path.clone()));
    }

    let raw: RawSettings = builder
        .add_source(Environment::with_prefix("NUTRICHAIN").separator("__"))
        .build()?
        .try_deserialize()?;

    build_settings(raw, &cli.overrides)
}

fn build_settings(raw: RawSettings, overrides: &ServeOverrides) -> Result<Settings, LoadError> {
    let raw_server = raw.server.unwrap_or_default();
    let host = overrides
        .server_host
        .clone()
        .or(raw_server.host)
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = overrides
        .server_port
        .or(raw_server.port)
        .unwrap_or(DEFAULT_PORT);
    let addr = format!("{host}:{port}")
        .parse::<SocketAddr>()
        .map_err(|err| LoadError::invalid(format!("server address `{host}:{port}`: {err}")))?;

    let raw_logging = raw.logging.unwrap_or_default();
    let level_text = overrides
        .log_level
        .clone()
        .or(raw_logging.level)
        .unwrap_or_else(|| "info".to_string());
    let level = LevelFilter::from_str(&level_text)
        .map_err(|_| LoadError::invalid(format!("log level `{level_text}`")))?;
    let format_text = overrides
        .log_format
        .clone()
        .or(raw_logging.format)
        .unwrap_or_else(|| "compact".to_string());
    let format = match format_text.as_str() {
        "json" => LogFormat::Json,
        "compact" => LogFormat::Compact,
        other => return Err(LoadError::invalid(format!("log format `{other}`"))),
    };

    let raw_database = raw.database.unwrap_or_default();
    let url = overrides
        .database_url
        .clone()
        .or(raw_database.url)
        .ok_or_else(|| LoadError::invalid("database.url is required"))?;

    let token_secret = raw
        .auth
        .unwrap_or_default()
        .token_secret
        .filter(|secret| !secret.is_empty())
        .ok_or_else(|| LoadError::invalid("auth.token_secret is required"))?;

    let raw_rate = raw.rate_limit.unwrap_or_default();
    let raw_idem = raw.idempotency.unwrap_or_default();
    let ttl_hours = raw_idem.ttl_hours.unwrap_or(DEFAULT_IDEMPOTENCY_TTL_HOURS);
    if ttl_hours == 0 {
        return Err(LoadError::invalid("idempotency.ttl_hours must be positive"));
    }

    Ok(Settings {
        server: ServerSettings { addr },
        logging: LoggingSettings { level, format },
        database: DatabaseSettings {
            url,
            max_connections: raw_database
                .max_connections
                .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS),
            acquire_timeout_secs: raw_database
                .acquire_timeout_secs
                .unwrap_or(DEFAULT_DB_ACQUIRE_TIMEOUT_SECS),
        },
        auth: AuthSettings { token_secret },
        rate_limit: RateLimitSettings {
            window_secs: raw_rate.window_secs.unwrap_or(DEFAULT_RATE_LIMIT_WINDOW_SECS),
            max_requests: raw_rate
                .max_requests
                .unwrap_or(DEFAULT_RATE_LIMIT_MAX_REQUESTS),
        },
        idempotency: IdempotencySettings {
            ttl_hours,
            max_body_bytes: raw_idem
                .max_body_bytes
                .unwrap_or(DEFAULT_IDEMPOTENCY_MAX_BODY_BYTES),
        },
    })
}

#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    server: Option<RawServerSettings>,
    logging: Option<RawLoggingSettings>,
    database: Option<RawDatabaseSettings>,
    auth: Option<RawAuthSettings>,
    rate_limit: Option<RawRateLimitSettings>,
    idempotency: Option<RawIdempotencySettings>,
}

#[derive(Debug, Default, Deserialize)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLoggingSettings {
    level: Option<String>,
    format: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
    acquire_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAuthSettings {
    token_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRateLimitSettings {
    window_secs: Option<u64>,
    max_requests: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RawIdempotencySettings {
    ttl_hours: Option<u64>,
    max_body_bytes: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_with_required() -> RawSettings {
        RawSettings {
            database: Some(RawDatabaseSettings {
                url: Some("postgres://localhost/reports".to_string()),
                ..Default::default()
            }),
            auth: Some(RawAuthSettings {
                token_secret: Some("s3cret".to_string()),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_fill_optional_sections() {
        let settings =
            build_settings(raw_with_required(), &ServeOverrides::default()).expect("settings");
        assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
        assert_eq!(settings.idempotency.ttl_hours, 24);
        assert_eq!(settings.rate_limit.max_requests, 100);
        assert!(matches!(settings.logging.format, LogFormat::Compact));
    }

    #[test]
    fn missing_database_url_is_rejected() {
        let mut raw = raw_with_required();
        raw.database = None;
        assert!(build_settings(raw, &ServeOverrides::default()).is_err());
    }

    #[test]
    fn empty_token_secret_is_rejected() {
        let mut raw = raw_with_required();
        raw.auth = Some(RawAuthSettings {
            token_secret: Some(String::new()),
        });
        assert!(build_settings(raw, &ServeOverrides::default()).is_err());
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let mut raw = raw_with_required();
        raw.idempotency = Some(RawIdempotencySettings {
            ttl_hours: Some(0),
            max_body_bytes: None,
        });
        assert!(build_settings(raw, &ServeOverrides::default()).is_err());
    }

    #[test]
    fn cli_overrides_win() {
        let overrides = ServeOverrides {
            server_port: Some(4000),
            log_format: Some("json".to_string()),
            ..Default::default()
        };
        let settings = build_settings(raw_with_required(), &overrides).expect("settings");
        assert_eq!(settings.server.addr.port(), 4000);
        assert!(matches!(settings.logging.format, LogFormat::Json));
    }
}
