//! Socket-level connections to a host.
use connector::Connection;
use connstring::{Host, PortId, DEFAULT_PORT};

use bufstream::BufStream;

use std::io::{Error, ErrorKind, Read, Result, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Encapsulates the functionality for how to connect to the server.
#[derive(Clone, Debug)]
pub struct StreamConnector {
    /// Whether to disable Nagle's algorithm on TCP streams.
    pub nodelay: bool,
}

impl Default for StreamConnector {
    fn default() -> Self {
        StreamConnector { nodelay: true }
    }
}

impl StreamConnector {
    /// Opens a stream to `host`. TCP hosts try each resolved address in turn,
    /// each within `timeout`; socket paths connect directly.
    pub fn connect(&self, host: &Host, timeout: Duration) -> Result<Stream> {
        let port = match host.port {
            PortId::Number(port) => port,
            PortId::Service(ref name) => resolve_service(name)?,
            #[cfg(unix)]
            PortId::UnixSocket(ref path) => return UnixStream::connect(path).map(Stream::Unix),
        };

        let mut last_err = None;
        for addr in (&host.host_name[..], port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_nodelay(self.nodelay)?;
                    return Ok(Stream::Tcp(stream));
                }
                Err(err) => last_err = Some(err),
            }
        }

        Err(last_err.unwrap_or_else(|| {
            Error::new(ErrorKind::AddrNotAvailable, format!("{} did not resolve", host))
        }))
    }
}

// Only the database's own registered service name is known without a
// services database.
fn resolve_service(name: &str) -> Result<u16> {
    match name {
        "mongodb" => Ok(DEFAULT_PORT),
        _ => Err(Error::new(ErrorKind::InvalidInput, format!("unknown service '{}'", name))),
    }
}

pub enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match *self {
            Stream::Tcp(ref mut s) => s.read(buf),
            #[cfg(unix)]
            Stream::Unix(ref mut s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        match *self {
            Stream::Tcp(ref mut s) => s.write(buf),
            #[cfg(unix)]
            Stream::Unix(ref mut s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> Result<()> {
        match *self {
            Stream::Tcp(ref mut s) => s.flush(),
            #[cfg(unix)]
            Stream::Unix(ref mut s) => s.flush(),
        }
    }
}

impl Stream {
    pub fn shutdown(&self) -> Result<()> {
        match *self {
            Stream::Tcp(ref stream) => stream.shutdown(Shutdown::Both),
            #[cfg(unix)]
            Stream::Unix(ref stream) => stream.shutdown(Shutdown::Both),
        }
    }
}

/// A buffered stream to a single host, usable as a pooled `Connection`.
pub struct StreamConnection {
    host: Host,
    // Always Some(stream) until the connection is closed.
    socket: Mutex<Option<BufStream<Stream>>>,
    closed: AtomicBool,
}

impl StreamConnection {
    pub fn new(host: Host, stream: Stream) -> StreamConnection {
        StreamConnection {
            host: host,
            socket: Mutex::new(Some(BufStream::new(stream))),
            closed: AtomicBool::new(false),
        }
    }

    /// Opens a connection to `host` through `connector`.
    pub fn open(connector: &StreamConnector, host: &Host, timeout: Duration) -> Result<StreamConnection> {
        connector.connect(host, timeout).map(|stream| StreamConnection::new(host.clone(), stream))
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    /// Runs `f` with exclusive use of the socket. An I/O error from `f`
    /// leaves the stream in an unknown state, so it closes the connection.
    pub fn with_socket<F, R>(&self, f: F) -> Result<R>
        where F: FnOnce(&mut BufStream<Stream>) -> Result<R>
    {
        let mut locked = self.socket
            .lock()
            .map_err(|_| Error::new(ErrorKind::Other, "socket lock poisoned"))?;

        let result = match *locked {
            Some(ref mut socket) => f(socket),
            None => return Err(Error::new(ErrorKind::NotConnected, format!("connection to {} is closed", self.host))),
        };

        if result.is_err() {
            self.closed.store(true, Ordering::SeqCst);
            if let Some(socket) = locked.take() {
                let _ = socket.get_ref().shutdown();
            }
        }

        result
    }
}

impl Connection for StreamConnection {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Ok(mut locked) = self.socket.lock() {
            if let Some(socket) = locked.take() {
                let _ = socket.get_ref().shutdown();
            }
        }
    }
}
