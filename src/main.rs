use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use tracing::error;

use radius_cacher::cache::MemcacheSink;
use radius_cacher::cli::Cli;
use radius_cacher::config::{CacheConfig, ServerConfig};
use radius_cacher::parser::Parser as RadiusParser;
use radius_cacher::server::Server;

fn init_logging(verbosity: radius_cacher::config::Verbosity) {
    let Some(level) = verbosity.level_filter() else {
        return;
    };
    tracing_subscriber::fmt().with_max_level(level).init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbosity);

    let server_config = match ServerConfig::load(cli.server_config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "invalid server configuration, terminating");
            return ExitCode::from(255);
        }
    };
    let cache_config = match CacheConfig::load(cli.cache_config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "invalid cache configuration, terminating");
            return ExitCode::from(255);
        }
    };

    let filter_refresh = Duration::from_secs(server_config.filter_refresh_minutes as u64 * 60);
    let parser = Arc::new(RadiusParser::new(server_config.filter_file.clone(), filter_refresh));
    let cache_ttl = Duration::from_secs(cache_config.ttl as u64);

    let reuse_port = !server_config.single_core && server_config.thread_pool_size > 1;
    if server_config.single_core && server_config.thread_pool_size > 1 {
        tracing::warn!(
            thread_pool_size = server_config.thread_pool_size,
            "single_core is set, ignoring configured thread_pool_size"
        );
    }

    let worker_count = if reuse_port { server_config.thread_pool_size } else { 1 };
    let mut workers = Vec::with_capacity(worker_count as usize);

    for _ in 0..worker_count {
        let socket = match Server::<MemcacheSink>::bind(server_config.port, reuse_port) {
            Ok(socket) => socket,
            Err(err) => {
                error!(%err, port = server_config.port, "could not bind udp socket, terminating");
                return ExitCode::from(255);
            }
        };

        let parser = Arc::clone(&parser);
        let cache = MemcacheSink::new(cache_config.clone());
        let server = Server::new(socket, parser, cache, cache_ttl);

        workers.push(thread::spawn(move || {
            if let Err(err) = server.run_forever() {
                error!(%err, "server loop terminated");
            }
        }));
    }

    for worker in workers {
        let _ = worker.join();
    }

    ExitCode::SUCCESS
}
