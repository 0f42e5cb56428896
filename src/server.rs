//! The UDP receive loop: reads datagrams, classifies them, and projects
//! the resulting [`Action`] onto a [`CacheSink`].

use std::net::UdpSocket;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::action::Action;
use crate::cache::CacheSink;
use crate::parser::Parser;

/// Largest datagram this crate will read in one call to `recv_from`.
/// RADIUS packets are capped at 4096 bytes on the wire (§4.3); the extra
/// headroom avoids silently truncating a legal maximum-size packet.
const RECEIVE_BUFFER_SIZE: usize = 8192;

pub struct Server<C: CacheSink> {
    socket: UdpSocket,
    parser: Arc<Parser>,
    cache: C,
    cache_ttl: Duration,
    buffer: [u8; RECEIVE_BUFFER_SIZE],
}

impl<C: CacheSink> Server<C> {
    pub fn new(socket: UdpSocket, parser: Arc<Parser>, cache: C, cache_ttl: Duration) -> Self {
        Self { socket, parser, cache, cache_ttl, buffer: [0u8; RECEIVE_BUFFER_SIZE] }
    }

    /// Binds a UDP socket at `port` on every interface. On Linux, when
    /// `reuse_port` is set, `SO_REUSEPORT` is applied first so several
    /// `Server`s (one per core) can share the same port.
    pub fn bind(port: u16, reuse_port: bool) -> std::io::Result<UdpSocket> {
        #[cfg(target_os = "linux")]
        {
            if reuse_port {
                return Self::bind_reuse_port(port);
            }
        }
        #[cfg(not(target_os = "linux"))]
        {
            if reuse_port {
                warn!("SO_REUSEPORT multi-core mode is only available on linux, ignoring");
            }
        }
        UdpSocket::bind(("0.0.0.0", port))
    }

    #[cfg(target_os = "linux")]
    fn bind_reuse_port(port: u16) -> std::io::Result<UdpSocket> {
        use std::mem;
        use std::net::Ipv4Addr;
        use std::os::unix::io::FromRawFd;

        // Safety: libc::socket either returns a valid owned fd or -1. The
        // error path below checks for -1 before the fd is used for
        // anything, and the fd is only ever handed to `UdpSocket` (which
        // takes ownership) once every setsockopt/bind call has succeeded.
        unsafe {
            let fd = libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0);
            if fd < 0 {
                return Err(std::io::Error::last_os_error());
            }

            let enable: libc::c_int = 1;
            let result = libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_REUSEPORT,
                &enable as *const _ as *const libc::c_void,
                mem::size_of_val(&enable) as libc::socklen_t,
            );
            if result < 0 {
                let err = std::io::Error::last_os_error();
                libc::close(fd);
                return Err(err);
            }

            let sockaddr = libc::sockaddr_in {
                sin_family: libc::AF_INET as libc::sa_family_t,
                sin_port: port.to_be(),
                sin_addr: libc::in_addr { s_addr: u32::from_ne_bytes(Ipv4Addr::UNSPECIFIED.octets()) },
                sin_zero: [0; 8],
            };

            let bind_result = libc::bind(
                fd,
                &sockaddr as *const _ as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            );
            if bind_result < 0 {
                let err = std::io::Error::last_os_error();
                libc::close(fd);
                return Err(err);
            }

            Ok(UdpSocket::from_raw_fd(fd))
        }
    }

    /// Receives datagrams forever, classifying and applying each one.
    /// Per-packet socket errors are logged and do not stop the loop; a
    /// hard socket failure (e.g. the interface disappearing) propagates
    /// to the caller.
    pub fn run_forever(mut self) -> std::io::Result<()> {
        loop {
            let bytes_received = match self.socket.recv_from(&mut self.buffer) {
                Ok((bytes_received, _remote)) => bytes_received,
                Err(err) => {
                    warn!(%err, "recv_from failed");
                    continue;
                }
            };

            let action = self.parser.parse(bytes_received, &self.buffer);
            self.apply(action);
        }
    }

    fn apply(&mut self, action: Action) {
        match action {
            Action::DoNothing => {}
            Action::Store { key, value } => {
                info!(%key, %value, "storing");
                if let Err(err) = self.cache.set(&key, &value, self.cache_ttl) {
                    warn!(%err, %key, "cache set failed");
                }
            }
            Action::Remove { key, value } => {
                info!(%key, %value, "removing");
                if let Err(err) = self.cache.remove(&key) {
                    warn!(%err, %key, "cache remove failed");
                }
            }
            Action::Filter { key, value } => {
                info!(key = key.as_deref().unwrap_or(""), %value, "suppressed by filter");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Result as CacheResult;
    use std::time::Duration as StdDuration;

    #[derive(Default)]
    struct RecordingCache {
        set_calls: Vec<(String, String)>,
        remove_calls: Vec<String>,
    }

    impl CacheSink for RecordingCache {
        fn set(&mut self, key: &str, value: &str, _ttl: StdDuration) -> CacheResult<()> {
            self.set_calls.push((key.to_string(), value.to_string()));
            Ok(())
        }

        fn remove(&mut self, key: &str) -> CacheResult<()> {
            self.remove_calls.push(key.to_string());
            Ok(())
        }
    }

    fn dummy_server(cache: RecordingCache) -> Server<RecordingCache> {
        let socket = UdpSocket::bind(("127.0.0.1", 0)).unwrap();
        let parser = Arc::new(Parser::new("/nonexistent/filter.txt", StdDuration::ZERO));
        Server::new(socket, parser, cache, StdDuration::from_secs(5400))
    }

    #[test]
    fn apply_store_calls_cache_set() {
        let mut server = dummy_server(RecordingCache::default());
        server.apply(Action::Store { key: "192.168.0.1".to_string(), value: "42".to_string() });
        assert_eq!(server.cache.set_calls, vec![("192.168.0.1".to_string(), "42".to_string())]);
    }

    #[test]
    fn apply_remove_calls_cache_remove() {
        let mut server = dummy_server(RecordingCache::default());
        server.apply(Action::Remove { key: "192.168.0.1".to_string(), value: "42".to_string() });
        assert_eq!(server.cache.remove_calls, vec!["192.168.0.1".to_string()]);
    }

    #[test]
    fn apply_do_nothing_touches_nothing() {
        let mut server = dummy_server(RecordingCache::default());
        server.apply(Action::DoNothing);
        assert!(server.cache.set_calls.is_empty());
        assert!(server.cache.remove_calls.is_empty());
    }

    #[test]
    fn apply_filter_does_not_touch_cache() {
        let mut server = dummy_server(RecordingCache::default());
        server.apply(Action::Filter { key: None, value: "1234567890123456".to_string() });
        assert!(server.cache.set_calls.is_empty());
        assert!(server.cache.remove_calls.is_empty());
    }
}
