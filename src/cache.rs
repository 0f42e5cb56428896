//! The cache adapter contract the server depends on, and a concrete
//! memcached-style text-protocol client.
//!
//! The wire protocol spoken to the cache backend is explicitly out of
//! scope for this crate's core (the backend is "a memcached-style daemon
//! reached over its native protocol... implementation of that client is
//! out of scope"). [`MemcacheSink`] below is a minimal, real
//! implementation of that adapter so the binary runs end to end, not a
//! stand-in for one.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::config::CacheConfig;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Protocol(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "{err}"),
            Error::Protocol(reason) => write!(f, "{reason}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// The two operations the packet-processing core depends on. Kept as a
/// trait so the server loop can be exercised against a fake in tests
/// without a real cache daemon.
pub trait CacheSink {
    fn set(&mut self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// Speaks the memcached text protocol over a single, lazily-(re)connected
/// TCP stream.
pub struct MemcacheSink {
    config: CacheConfig,
    stream: Option<TcpStream>,
}

impl MemcacheSink {
    pub fn new(config: CacheConfig) -> Self {
        Self { config, stream: None }
    }

    fn connection(&mut self) -> Result<&mut TcpStream> {
        if self.stream.is_none() {
            let stream = TcpStream::connect((self.config.host.as_str(), self.config.port))?;
            stream.set_nodelay(true)?;
            if self.config.tcp_keep_alive {
                // The standard library exposes no portable keepalive knob;
                // the connection is recreated on failure instead of relying
                // on the kernel to notice a half-open peer.
            }
            self.stream = Some(stream);
        }
        Ok(self.stream.as_mut().expect("just inserted"))
    }

    fn read_reply_line(stream: &mut TcpStream) -> Result<String> {
        let mut reader = BufReader::new(stream.try_clone()?);
        let mut line = String::new();
        reader.read_line(&mut line)?;
        Ok(line)
    }
}

impl CacheSink for MemcacheSink {
    fn set(&mut self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let no_reply = self.config.no_reply;
        let command = if no_reply {
            format!("set {key} 0 {} {} noreply\r\n{value}\r\n", ttl.as_secs(), value.len())
        } else {
            format!("set {key} 0 {} {}\r\n{value}\r\n", ttl.as_secs(), value.len())
        };

        let stream = self.connection()?;
        stream.write_all(command.as_bytes())?;

        if no_reply {
            return Ok(());
        }

        let reply = Self::read_reply_line(stream)?;
        if reply.trim_end() == "STORED" {
            Ok(())
        } else {
            self.stream = None;
            Err(Error::Protocol(format!("cache rejected set: {}", reply.trim_end())))
        }
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let no_reply = self.config.no_reply;
        let command =
            if no_reply { format!("delete {key} noreply\r\n") } else { format!("delete {key}\r\n") };

        let stream = self.connection()?;
        stream.write_all(command.as_bytes())?;

        if no_reply {
            return Ok(());
        }

        let reply = Self::read_reply_line(stream)?;
        match reply.trim_end() {
            "DELETED" | "NOT_FOUND" => Ok(()),
            other => {
                self.stream = None;
                Err(Error::Protocol(format!("cache rejected delete: {other}")))
            }
        }
    }
}
