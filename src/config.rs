use std::{path::PathBuf, time::Duration};

use url::Url;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";
pub const DEFAULT_TEMP_DIR: &str = "temp";
pub const DEFAULT_YTDLP_BIN: &str = "yt-dlp";
pub const DEFAULT_AUDIO_QUALITY_KBPS: u32 = 192;
pub const DEFAULT_SOCKET_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_PLAYER_CLIENTS: &str = "default,web_safari,mweb,tv";
pub const DEFAULT_STALE_JOB_SECONDS: u64 = 2 * 60 * 60;
pub const DEFAULT_RAPIDAPI_ENDPOINT: &str = "https://yt-search-and-download-mp3.p.rapidapi.com/mp3";
pub const DEFAULT_REMOTE_TIMEOUT_SECONDS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
    #[error("invalid origin in ALLOWED_ORIGINS: {0}. Use values like https://example.com")]
    InvalidOrigin(String),
    #[error("cookies file not found at {0:?}")]
    CookiesNotFound(PathBuf),
    #[error("cookies file {path:?} is not readable: {source}")]
    CookiesUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteDelivery {
    Json,
    Redirect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalConfig {
    pub temp_dir: PathBuf,
    pub cookies_path: PathBuf,
    pub ytdlp_bin: String,
    pub audio_quality_kbps: u32,
    pub socket_timeout: Duration,
    pub player_clients: Vec<String>,
    pub stale_after: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub endpoint: String,
    pub host: String,
    pub key: String,
    pub delivery: RemoteDelivery,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    Local(LocalConfig),
    Remote(RemoteConfig),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: String,
    pub allowed_origins: AllowedOrigins,
    pub backend: BackendConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).and_then(|value| non_empty(&value).map(String::from));

        let backend = match read("CONVERTER_BACKEND")
            .map(|value| value.to_ascii_lowercase())
            .as_deref()
        {
            None | Some("local") => BackendConfig::Local(local_config(&read)?),
            Some("remote") => BackendConfig::Remote(remote_config(&read)?),
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "CONVERTER_BACKEND",
                    value: other.to_string(),
                });
            }
        };

        Ok(Self {
            bind_addr: resolve_bind_addr(&read)?,
            allowed_origins: parse_allowed_origins(read("ALLOWED_ORIGINS").as_deref())?,
            backend,
        })
    }
}

fn local_config(read: &impl Fn(&str) -> Option<String>) -> Result<LocalConfig, ConfigError> {
    let cookies_path = read("COOKIES_PATH")
        .map(PathBuf::from)
        .ok_or(ConfigError::Missing("COOKIES_PATH"))?;

    let player_clients = read("YTDLP_PLAYER_CLIENTS")
        .unwrap_or_else(|| DEFAULT_PLAYER_CLIENTS.to_string())
        .split(',')
        .map(str::trim)
        .filter(|client| !client.is_empty())
        .map(ToString::to_string)
        .collect();

    Ok(LocalConfig {
        temp_dir: read("TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMP_DIR)),
        cookies_path,
        ytdlp_bin: read("YTDLP_BIN").unwrap_or_else(|| DEFAULT_YTDLP_BIN.to_string()),
        audio_quality_kbps: parse_or(
            read,
            "AUDIO_QUALITY_KBPS",
            DEFAULT_AUDIO_QUALITY_KBPS,
        )?,
        socket_timeout: Duration::from_secs(parse_or(
            read,
            "SOCKET_TIMEOUT_SECONDS",
            DEFAULT_SOCKET_TIMEOUT_SECONDS,
        )?),
        player_clients,
        stale_after: Duration::from_secs(parse_or(
            read,
            "STALE_JOB_SECONDS",
            DEFAULT_STALE_JOB_SECONDS,
        )?),
    })
}

fn remote_config(read: &impl Fn(&str) -> Option<String>) -> Result<RemoteConfig, ConfigError> {
    let delivery = match read("REMOTE_DELIVERY")
        .map(|value| value.to_ascii_lowercase())
        .as_deref()
    {
        None | Some("json") => RemoteDelivery::Json,
        Some("redirect") => RemoteDelivery::Redirect,
        Some(other) => {
            return Err(ConfigError::Invalid {
                name: "REMOTE_DELIVERY",
                value: other.to_string(),
            });
        }
    };

    Ok(RemoteConfig {
        endpoint: read("RAPIDAPI_ENDPOINT")
            .unwrap_or_else(|| DEFAULT_RAPIDAPI_ENDPOINT.to_string()),
        host: read("RAPIDAPI_HOST").ok_or(ConfigError::Missing("RAPIDAPI_HOST"))?,
        key: read("RAPIDAPI_KEY").ok_or(ConfigError::Missing("RAPIDAPI_KEY"))?,
        delivery,
        timeout: Duration::from_secs(parse_or(
            read,
            "REMOTE_TIMEOUT_SECONDS",
            DEFAULT_REMOTE_TIMEOUT_SECONDS,
        )?),
    })
}

fn parse_or<T: std::str::FromStr>(
    read: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match read(name) {
        Some(value) => value
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

fn resolve_bind_addr(read: &impl Fn(&str) -> Option<String>) -> Result<String, ConfigError> {
    if let Some(configured) = read("APP_ADDR") {
        return Ok(configured);
    }

    if let Some(port) = read("PORT") {
        let port = port.parse::<u16>().map_err(|_| ConfigError::Invalid {
            name: "PORT",
            value: port,
        })?;
        return Ok(format!("0.0.0.0:{port}"));
    }

    Ok(DEFAULT_BIND_ADDR.to_string())
}

fn parse_allowed_origins(raw: Option<&str>) -> Result<AllowedOrigins, ConfigError> {
    let configured = raw
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    if configured.is_empty() || configured.contains(&"*") {
        return Ok(AllowedOrigins::Any);
    }

    let mut origins = configured
        .into_iter()
        .map(|origin| {
            normalize_origin(origin).ok_or_else(|| ConfigError::InvalidOrigin(origin.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    origins.sort();
    origins.dedup();

    Ok(AllowedOrigins::List(origins))
}

/// Reduces an origin to `scheme://host[:port]`, dropping default ports.
pub fn normalize_origin(value: &str) -> Option<String> {
    let parsed = Url::parse(value).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let scheme = parsed.scheme();
    let default_port = match scheme {
        "http" => 80,
        "https" => 443,
        _ => return None,
    };

    if parsed.path() != "/" || parsed.query().is_some() || parsed.fragment().is_some() {
        return None;
    }

    match parsed.port() {
        Some(port) if port != default_port => Some(format!("{scheme}://{host}:{port}")),
        _ => Some(format!("{scheme}://{host}")),
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
