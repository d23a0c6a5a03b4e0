//! Connection establishment with a bounded wait.
//!
//! The transport and command layers are supplied by the caller through the
//! `Transport` trait. The `Connector` adds the timeout: an attempt that has
//! not produced a connection within the allotted time is abandoned, and a
//! connection that arrives after the caller gave up is closed.
use error::{Error, Result};
use connstring::Host;

use bson::Document;

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

/// The default connect timeout, in microseconds.
static DEFAULT_CONNECT_TIMEOUT_US: AtomicU64 = AtomicU64::new(6_000_000);

/// Returns the process-wide connect timeout used by calls that do not pass one.
pub fn default_connect_timeout() -> Duration {
    Duration::from_micros(DEFAULT_CONNECT_TIMEOUT_US.load(Ordering::SeqCst))
}

/// Sets the process-wide connect timeout. Calls already in flight keep the
/// value they read when they started.
pub fn set_default_connect_timeout(timeout: Duration) {
    let micros = timeout.as_secs()
        .saturating_mul(1_000_000)
        .saturating_add(u64::from(timeout.subsec_micros()));
    DEFAULT_CONNECT_TIMEOUT_US.store(micros, Ordering::SeqCst);
}

/// An open channel to a server.
///
/// Connections are shared: the pool hands out `Arc`s and may concurrently
/// replace a connection it finds closed.
pub trait Connection: Send + Sync {
    /// Returns true once the connection can no longer carry requests.
    fn is_closed(&self) -> bool;
    /// Closes the connection. Closing twice is a no-op.
    fn close(&self);
}

/// Opens connections and runs administrative commands over them.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection + 'static;

    /// Opens a connection to `host`. Implementations should honour `timeout`
    /// where they can, failing with `io::ErrorKind::TimedOut`; the
    /// `Connector` enforces it regardless.
    fn open(&self, host: &Host, timeout: Duration) -> io::Result<Self::Connection>;

    /// Runs `command` against the `admin` database over `conn` and returns
    /// the reply. Connection-level failures are reported as
    /// `Error::IoError`, which the probe turns into `Error::ConnectError`
    /// for the host; anything else as `Error::OperationError`.
    fn run_admin_command(&self, conn: &Self::Connection, command: Document) -> Result<Document>;
}

/// Opens connections through a transport within a timeout.
pub struct Connector<T: Transport> {
    transport: Arc<T>,
}

impl<T: Transport> Clone for Connector<T> {
    fn clone(&self) -> Self {
        Connector { transport: self.transport.clone() }
    }
}

impl<T: Transport> Connector<T> {
    pub fn new(transport: Arc<T>) -> Connector<T> {
        Connector { transport: transport }
    }

    /// Connects to `host` within the process-wide default timeout.
    pub fn connect(&self, host: &Host) -> Result<T::Connection> {
        self.connect_with_timeout(host, default_connect_timeout())
    }

    /// Connects to `host`, giving up with `ConnectTimeout` if no connection
    /// is established within `timeout`.
    pub fn connect_with_timeout(&self, host: &Host, timeout: Duration) -> Result<T::Connection> {
        let (tx, rx) = mpsc::channel();
        let transport = self.transport.clone();
        let target = host.clone();

        thread::Builder::new()
            .name(format!("connect-{}", host))
            .spawn(move || {
                let result = transport.open(&target, timeout);
                if let Err(mpsc::SendError(Ok(conn))) = tx.send(result) {
                    debug!(host = %target, "closing connection established after timeout");
                    conn.close();
                }
            })
            .map_err(|err| Error::ConnectError(host.clone(), err))?;

        match rx.recv_timeout(timeout) {
            Ok(Ok(conn)) => {
                debug!(host = %host, "connected");
                Ok(conn)
            }
            Ok(Err(err)) => Err(Error::with_connect_failure(host.clone(), timeout, err)),
            Err(RecvTimeoutError::Timeout) => {
                warn!(host = %host, ?timeout, "connect timed out");
                Err(Error::ConnectTimeout(host.clone(), timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(Error::ConnectError(
                host.clone(),
                io::Error::new(io::ErrorKind::Other, "connect attempt aborted"),
            )),
        }
    }
}
