//! Error types for host parsing, connection establishment and replica set discovery.
use bson;
use connstring::Host;

use std::{error, fmt, io, sync};
use std::time::Duration;

/// A type for results generated by this crate.
pub type Result<T> = ::std::result::Result<T, Error>;

/// The error type for replica set connection management.
#[derive(Debug)]
pub enum Error {
    /// A host address or connection string was malformed.
    ParseError(String),
    /// A configuration value was invalid.
    ArgumentError(String),
    /// No connection to the host was established within the allotted time.
    ConnectTimeout(Host, Duration),
    /// The host actively refused the connection.
    ConnectionRefused(Host, io::Error),
    /// Any other failure while opening a connection to the host.
    ConnectError(Host, io::Error),
    /// The host answered the probe but does not belong to any replica set.
    NotAReplicaMember(Host, bson::Document),
    /// The host answered the probe as a member of a different replica set.
    MembershipMismatch {
        host: Host,
        expected: String,
        found: String,
        reply: bson::Document,
    },
    /// Every candidate host failed; carries the failure of each, in the order tried.
    AllMembersUnreachable(Vec<(Host, Error)>),
    /// The probe succeeded but no member currently claims to be primary.
    NoPrimaryAvailable(String),
    /// The replica set was closed and can no longer hand out connections.
    ReplicaSetClosed(String),
    /// A probe reply was missing required fields or held values of the wrong type.
    ResponseError(String),
    /// A command failed for a reason other than the connection.
    OperationError(String),
    /// A connection-level I/O failure after establishment.
    IoError(io::Error),
    /// A pool lock was poisoned by a panicking thread.
    LockError,
}

impl Error {
    /// Returns true if this error came from the transport rather than from
    /// a server reply, the local configuration or a closed replica set.
    pub fn is_network_error(&self) -> bool {
        match *self {
            Error::ConnectTimeout(..) |
            Error::ConnectionRefused(..) |
            Error::ConnectError(..) |
            Error::IoError(_) => true,
            Error::AllMembersUnreachable(ref failures) => {
                failures.iter().all(|&(_, ref err)| err.is_network_error())
            }
            _ => false,
        }
    }

    // Maps an I/O error raised while opening a connection to `host` within
    // `timeout`.
    pub(crate) fn with_connect_failure(host: Host, timeout: Duration, err: io::Error) -> Error {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => Error::ConnectionRefused(host, err),
            io::ErrorKind::TimedOut => Error::ConnectTimeout(host, timeout),
            _ => Error::ConnectError(host, err),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

impl From<bson::ordered::ValueAccessError> for Error {
    fn from(err: bson::ordered::ValueAccessError) -> Error {
        Error::ResponseError(format!("malformed isMaster reply: {}", err))
    }
}

impl<T> From<sync::PoisonError<T>> for Error {
    fn from(_: sync::PoisonError<T>) -> Error {
        Error::LockError
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::ParseError(ref inner) => write!(fmt, "parse error: {}", inner),
            Error::ArgumentError(ref inner) => fmt.write_str(inner),
            Error::ConnectTimeout(ref host, timeout) => {
                write!(fmt, "timed out after {:?} connecting to {}", timeout, host)
            }
            Error::ConnectionRefused(ref host, ref inner) => {
                write!(fmt, "connection to {} refused: {}", host, inner)
            }
            Error::ConnectError(ref host, ref inner) => {
                write!(fmt, "failed to connect to {}: {}", host, inner)
            }
            Error::NotAReplicaMember(ref host, ref reply) => {
                write!(fmt, "{} is not a member of any replica set: {}", host, reply)
            }
            Error::MembershipMismatch { ref host, ref expected, ref found, ref reply } => {
                write!(
                    fmt,
                    "{} is a member of replica set {}, not {}: {}",
                    host,
                    found,
                    expected,
                    reply
                )
            }
            Error::AllMembersUnreachable(ref failures) => {
                fmt.write_str("no replica set member could be reached")?;
                for &(ref host, ref err) in failures {
                    write!(fmt, "\n  {}: {}", host, err)?;
                }
                Ok(())
            }
            Error::NoPrimaryAvailable(ref name) => write!(fmt, "replica set {} has no primary", name),
            Error::ReplicaSetClosed(ref name) => write!(fmt, "replica set {} is closed", name),
            Error::ResponseError(ref inner) => fmt.write_str(inner),
            Error::OperationError(ref inner) => fmt.write_str(inner),
            Error::IoError(ref inner) => write!(fmt, "{}", inner),
            Error::LockError => fmt.write_str("Connection pool lock poisoned."),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::ConnectionRefused(_, ref inner) |
            Error::ConnectError(_, ref inner) |
            Error::IoError(ref inner) => Some(inner),
            _ => None,
        }
    }
}
