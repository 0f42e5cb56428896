//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::config::Verbosity;

/// Projects RADIUS accounting events into a memcached-style cache.
#[derive(Debug, Parser)]
#[command(name = "radius-cacher", version, about)]
pub struct Cli {
    /// Path to the server config file.
    #[arg(short = 's', long = "server-config", value_name = "SERVER_CONFIG_PATH")]
    pub server_config: Option<PathBuf>,

    /// Path to the cache config file.
    #[arg(short = 'm', long = "cache-config", value_name = "CACHE_CONFIG_PATH")]
    pub cache_config: Option<PathBuf>,

    /// One of NONE|FATAL|ERROR|WARN|LOG|INFO|DEBUG.
    #[arg(short = 'v', long = "verbosity", value_name = "LEVEL", default_value = "WARN")]
    pub verbosity: Verbosity,
}

impl clap::ValueEnum for Verbosity {
    fn value_variants<'a>() -> &'a [Self] {
        &[
            Verbosity::None,
            Verbosity::Fatal,
            Verbosity::Error,
            Verbosity::Warn,
            Verbosity::Log,
            Verbosity::Info,
            Verbosity::Debug,
        ]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        let name = match self {
            Verbosity::None => "NONE",
            Verbosity::Fatal => "FATAL",
            Verbosity::Error => "ERROR",
            Verbosity::Warn => "WARN",
            Verbosity::Log => "LOG",
            Verbosity::Info => "INFO",
            Verbosity::Debug => "DEBUG",
        };
        Some(clap::builder::PossibleValue::new(name))
    }
}

impl std::fmt::Display for Verbosity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.to_possible_value().expect("no skipped variants").get_name().fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_flags() {
        let cli = Cli::parse_from(["radius-cacher", "-s", "/tmp/server.conf", "-v", "DEBUG"]);
        assert_eq!(cli.server_config, Some(PathBuf::from("/tmp/server.conf")));
        assert_eq!(cli.verbosity, Verbosity::Debug);
        assert_eq!(cli.cache_config, None);
    }

    #[test]
    fn defaults_to_warn_verbosity() {
        let cli = Cli::parse_from(["radius-cacher"]);
        assert_eq!(cli.verbosity, Verbosity::Warn);
    }

    #[test]
    fn rejects_unknown_flag() {
        assert!(Cli::try_parse_from(["radius-cacher", "--bogus"]).is_err());
    }
}
