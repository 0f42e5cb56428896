//! Configuration schema, file-based loader and environment overrides.
//!
//! File format is `KEY = VALUE` lines (not TOML): this mirrors
//! original_source/src/config.cpp exactly, which predates this crate and
//! is still what operators hand-edit in the field.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, error};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigInvalid(pub String);

impl fmt::Display for ConfigInvalid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ConfigInvalid {}

pub type Result<T> = std::result::Result<T, ConfigInvalid>;

fn line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[[:space:]]*([A-Za-z_][A-Za-z0-9_]*)[[:space:]]*=[[:space:]]*(.+?)[[:space:]]*$")
            .expect("static config line regex is valid")
    })
}

/// Reads `KEY = VALUE` lines from `path`, invoking `callback(key, value)`
/// for each one that matches. A missing file is not an error: it just
/// means no overrides are applied, and the caller's defaults stand.
fn parse_lines(path: &Path, mut callback: impl FnMut(&str, &str)) {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            error!(path = %path.display(), %err, "could not load configuration file, using default configuration");
            return;
        }
    };

    for line in contents.lines() {
        if let Some(captures) = line_pattern().captures(line) {
            let key = &captures[1];
            let value = &captures[2];
            debug!(key, value, "found configuration in file");
            callback(key, value);
        }
    }
}

fn parse_port(key: &str, value: &str) -> Result<u16> {
    let parsed: i32 =
        value.parse().map_err(|_| ConfigInvalid(format!("{key} is not a valid integer: {value:?}")))?;
    if !(1..=65535).contains(&parsed) {
        return Err(ConfigInvalid(format!("{key} should be between 1 and 65535")));
    }
    Ok(parsed as u16)
}

fn parse_string(key: &str, value: &str) -> Result<String> {
    if value.is_empty() {
        return Err(ConfigInvalid(format!("{key} cannot be empty")));
    }
    Ok(value.to_string())
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value {
        "TRUE" => Ok(true),
        "FALSE" => Ok(false),
        _ => Err(ConfigInvalid(format!("{key} can take TRUE or FALSE only"))),
    }
}

fn parse_int<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| ConfigInvalid(format!("{key} is not a valid integer: {value:?}")))
}

fn env_override(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub thread_pool_size: u16,
    pub single_core: bool,
    pub key: String,
    pub value: String,
    pub filter_file: PathBuf,
    pub filter_refresh_minutes: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 1813,
            thread_pool_size: 1,
            single_core: true,
            key: "FRAMED_IP_ADDRESS".to_string(),
            value: "USER_NAME".to_string(),
            filter_file: PathBuf::from("/etc/radius-cacher/filter.txt"),
            filter_refresh_minutes: 720,
        }
    }
}

impl ServerConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = path {
            let mut error = None;
            parse_lines(path, |key, value| {
                if error.is_some() {
                    return;
                }
                let outcome = match key {
                    "PORT" => parse_port(key, value).map(|v| config.port = v),
                    "THREAD_POOL_SIZE" => parse_port(key, value).map(|v| config.thread_pool_size = v),
                    "SINGLE_CORE" => parse_bool(key, value).map(|v| config.single_core = v),
                    "KEY" => parse_string(key, value).map(|v| config.key = v),
                    "VALUE" => parse_string(key, value).map(|v| config.value = v),
                    "FILTER_FILE" => parse_string(key, value).map(|v| config.filter_file = PathBuf::from(v)),
                    "FILTER_REFRESH_MINUTES" => {
                        parse_port(key, value).map(|v| config.filter_refresh_minutes = v)
                    }
                    _ => Ok(()),
                };
                if let Err(err) = outcome {
                    error = Some(err);
                }
            });
            if let Some(err) = error {
                return Err(err);
            }
        }

        if let Some(env) = env_override("RADIUS_PORT") {
            config.port = parse_port("PORT", &env)?;
        }
        if let Some(env) = env_override("RADIUS_THREAD_POOL_SIZE") {
            config.thread_pool_size = parse_port("THREAD_POOL_SIZE", &env)?;
        }
        if let Some(env) = env_override("RADIUS_SINGLE_CORE") {
            config.single_core = parse_bool("SINGLE_CORE", &env)?;
        }
        if let Some(env) = env_override("RADIUS_KEY") {
            config.key = parse_string("KEY", &env)?;
        }
        if let Some(env) = env_override("RADIUS_VALUE") {
            config.value = parse_string("VALUE", &env)?;
        }
        if let Some(env) = env_override("RADIUS_FILTER_FILE") {
            config.filter_file = PathBuf::from(parse_string("FILTER_FILE", &env)?);
        }
        if let Some(env) = env_override("RADIUS_FILTER_REFRESH_MINUTES") {
            config.filter_refresh_minutes = parse_port("FILTER_REFRESH_MINUTES", &env)?;
        }

        tracing::info!(
            port = config.port,
            thread_pool_size = config.thread_pool_size,
            single_core = config.single_core,
            key = %config.key,
            value = %config.value,
            filter_file = %config.filter_file.display(),
            filter_refresh_minutes = config.filter_refresh_minutes,
            "configuring server"
        );

        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub host: String,
    pub port: u16,
    pub ttl: u32,
    pub no_reply: bool,
    pub use_binary: bool,
    pub tcp_keep_alive: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 11211,
            ttl: 5400,
            no_reply: true,
            use_binary: true,
            tcp_keep_alive: true,
        }
    }
}

impl CacheConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = path {
            let mut error = None;
            parse_lines(path, |key, value| {
                if error.is_some() {
                    return;
                }
                let outcome = match key {
                    "HOST" => parse_string(key, value).map(|v| config.host = v),
                    "PORT" => parse_port(key, value).map(|v| config.port = v),
                    "TTL" => parse_int(key, value).map(|v| config.ttl = v),
                    "NO_REPLY" => parse_bool(key, value).map(|v| config.no_reply = v),
                    "USE_BINARY" => parse_bool(key, value).map(|v| config.use_binary = v),
                    "TCP_KEEP_ALIVE" => parse_bool(key, value).map(|v| config.tcp_keep_alive = v),
                    _ => Ok(()),
                };
                if let Err(err) = outcome {
                    error = Some(err);
                }
            });
            if let Some(err) = error {
                return Err(err);
            }
        }

        if let Some(env) = env_override("RADIUS_CACHE_HOST") {
            config.host = parse_string("HOST", &env)?;
        }
        if let Some(env) = env_override("RADIUS_CACHE_PORT") {
            config.port = parse_port("PORT", &env)?;
        }
        if let Some(env) = env_override("RADIUS_CACHE_TTL") {
            config.ttl = parse_int("TTL", &env)?;
        }
        if let Some(env) = env_override("RADIUS_CACHE_NO_REPLY") {
            config.no_reply = parse_bool("NO_REPLY", &env)?;
        }
        if let Some(env) = env_override("RADIUS_CACHE_USE_BINARY") {
            config.use_binary = parse_bool("USE_BINARY", &env)?;
        }
        if let Some(env) = env_override("RADIUS_CACHE_TCP_KEEP_ALIVE") {
            config.tcp_keep_alive = parse_bool("TCP_KEEP_ALIVE", &env)?;
        }

        if config.use_binary {
            debug!("USE_BINARY=TRUE requested but this crate only implements the memcached text protocol; continuing with it");
        }

        tracing::info!(
            host = %config.host,
            port = config.port,
            ttl = config.ttl,
            no_reply = config.no_reply,
            use_binary = config.use_binary,
            tcp_keep_alive = config.tcp_keep_alive,
            "configuring cache"
        );

        Ok(config)
    }
}

/// Ordered least-to-most verbose; gates which `tracing` records are
/// emitted via the level each variant maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    None,
    Fatal,
    Error,
    Warn,
    Log,
    Info,
    Debug,
}

impl Verbosity {
    /// The `tracing` level that should be the maximum emitted, or `None`
    /// if nothing should be emitted at all.
    pub fn level_filter(self) -> Option<tracing::Level> {
        match self {
            Verbosity::None => None,
            Verbosity::Fatal | Verbosity::Error => Some(tracing::Level::ERROR),
            Verbosity::Warn => Some(tracing::Level::WARN),
            Verbosity::Log | Verbosity::Info => Some(tracing::Level::INFO),
            Verbosity::Debug => Some(tracing::Level::DEBUG),
        }
    }
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Warn
    }
}

impl FromStr for Verbosity {
    type Err = ConfigInvalid;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "NONE" => Ok(Verbosity::None),
            "FATAL" => Ok(Verbosity::Fatal),
            "ERROR" => Ok(Verbosity::Error),
            "WARN" => Ok(Verbosity::Warn),
            "LOG" => Ok(Verbosity::Log),
            "INFO" => Ok(Verbosity::Info),
            "DEBUG" => Ok(Verbosity::Debug),
            other => Err(ConfigInvalid(format!(
                "unrecognized verbosity {other:?}, expected one of NONE|FATAL|ERROR|WARN|LOG|INFO|DEBUG"
            ))),
        }
    }
}
