//! Host addresses and `mongodb://` connection strings.
use error::Error::{ArgumentError, ParseError};
use error::Result;

use std::collections::BTreeMap;
use std::fmt;
#[cfg(unix)]
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 27017;
pub const URI_SCHEME: &'static str = "mongodb://";

/// How to reach a server on its host.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PortId {
    /// A TCP port number.
    Number(u16),
    /// A named service, resolved by the transport.
    Service(String),
    /// A unix domain socket path. Socket paths may contain characters that
    /// `parse_host` rejects, so a formatted socket host does not necessarily
    /// parse back to itself.
    #[cfg(unix)]
    UnixSocket(PathBuf),
}

/// Encapsulates the hostname and port of a host.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Host {
    pub host_name: String,
    pub port: PortId,
}

impl Host {
    /// Creates a host reachable over TCP on the given port.
    pub fn new<T: Into<String>>(host_name: T, port: u16) -> Host {
        Host {
            host_name: host_name.into(),
            port: PortId::Number(port),
        }
    }

    /// Creates a host on the default port.
    pub fn with_default_port<T: Into<String>>(host_name: T) -> Host {
        Host::new(host_name, DEFAULT_PORT)
    }

    /// Creates a host reachable through a named service. The name must
    /// start with a letter and hold only letters, digits and `-`, so that
    /// the formatted host parses back to itself.
    pub fn with_service<T: Into<String>>(host_name: T, service: &str) -> Result<Host> {
        match parse_port(service) {
            Some(port @ PortId::Service(_)) => Ok(Host {
                host_name: host_name.into(),
                port: port,
            }),
            _ => Err(ArgumentError(format!("invalid service name '{}'", service))),
        }
    }

    /// Creates a host reachable through a unix domain socket.
    #[cfg(unix)]
    pub fn with_unix_socket<T: Into<String>, P: Into<PathBuf>>(host_name: T, path: P) -> Host {
        Host {
            host_name: host_name.into(),
            port: PortId::UnixSocket(path.into()),
        }
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            PortId::Number(port) => write!(fmt, "{}", port),
            PortId::Service(ref name) => fmt.write_str(name),
            #[cfg(unix)]
            PortId::UnixSocket(ref path) => write!(fmt, "{}", path.display()),
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}:{}", self.host_name, self.port)
    }
}

impl FromStr for Host {
    type Err = ::error::Error;

    fn from_str(s: &str) -> Result<Host> {
        parse_host(s)
    }
}

/// Parses a host of the form `host` or `host:port`.
///
/// The host name may contain letters, digits, `-` and `.`. A port made of
/// digits is a port number; a port starting with a letter and made of
/// letters, digits and `-` is a service name. Surrounding whitespace is
/// ignored and the host defaults to port 27017.
pub fn parse_host(entity: &str) -> Result<Host> {
    let entity = entity.trim();

    let (host_name, port) = match entity.find(':') {
        Some(idx) => (&entity[..idx], Some(&entity[idx + 1..])),
        None => (entity, None),
    };

    if host_name.is_empty() {
        return Err(ParseError(format!("missing host name in '{}'", entity)));
    }

    if !host_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.') {
        return Err(ParseError(format!("invalid host name in '{}'", entity)));
    }

    let port = match port {
        None => PortId::Number(DEFAULT_PORT),
        Some(port) => parse_port(port).ok_or_else(|| {
            ParseError(format!("invalid port in '{}'", entity))
        })?,
    };

    Ok(Host {
        host_name: host_name.to_owned(),
        port: port,
    })
}

fn parse_port(port: &str) -> Option<PortId> {
    let first = port.chars().next()?;

    if port.chars().all(|c| c.is_ascii_digit()) {
        port.parse::<u16>().ok().map(PortId::Number)
    } else if first.is_ascii_alphabetic() &&
               port.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        Some(PortId::Service(port.to_owned()))
    } else {
        None
    }
}

/// Encapsulates the options of a MongoDB connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub options: BTreeMap<String, String>,
}

impl ConnectionOptions {
    // Helper method to retrieve an option from the map.
    pub fn get(&self, key: &str) -> Option<&String> {
        self.options.get(key)
    }
}

/// Encapsulates information for connection to a replica set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub hosts: Vec<Host>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub options: Option<ConnectionOptions>,
}

impl ConnectionString {
    /// The value of the `replicaSet` option, if given.
    pub fn replica_set(&self) -> Option<&str> {
        self.option("replicaSet")
    }

    /// The value of the `connectTimeoutMS` option, if given.
    pub fn connect_timeout(&self) -> Result<Option<Duration>> {
        match self.option("connectTimeoutMS") {
            None => Ok(None),
            Some(ms) => match ms.parse::<u64>() {
                Ok(ms) => Ok(Some(Duration::from_millis(ms))),
                Err(_) => Err(ArgumentError(format!(
                    "connectTimeoutMS must be a non-negative integer, got '{}'.",
                    ms
                ))),
            },
        }
    }

    fn option(&self, key: &str) -> Option<&str> {
        self.options.as_ref().and_then(|opts| opts.get(key)).map(|s| &s[..])
    }
}

/// Parses a MongoDB connection string URI as defined by
/// [the manual](http://docs.mongodb.org/manual/reference/connection-string/).
pub fn parse(address: &str) -> Result<ConnectionString> {
    if !address.starts_with(URI_SCHEME) {
        return Err(ParseError("MongoDB connection string must start with 'mongodb://'.".to_owned()));
    }

    // Remove scheme
    let addr = &address[URI_SCHEME.len()..];

    let (host_str, path_str) = partition(addr, "/");

    if path_str.is_empty() && host_str.contains('?') {
        return Err(ParseError("A '/' is required between the host list and any options.".to_owned()));
    }

    // Split on authentication and hosts
    let (user, password, hosts) = if host_str.contains('@') {
        let (user_info, host_string) = rpartition(host_str, "@");
        let (u, p) = parse_user_info(user_info)?;
        (Some(u.to_owned()), Some(p.to_owned()), split_hosts(host_string)?)
    } else {
        (None, None, split_hosts(host_str)?)
    };

    // Split on database name and options
    let (database, opts) = partition(path_str, "?");
    let database = if database.is_empty() {
        None
    } else {
        Some(database.to_owned())
    };

    let options = if opts.is_empty() {
        None
    } else {
        Some(split_options(opts)?)
    };

    Ok(ConnectionString {
        hosts: hosts,
        user: user,
        password: password,
        database: database,
        options: options,
    })
}

// Parse user information of the form user:password
fn parse_user_info(user_info: &str) -> Result<(&str, &str)> {
    let (user, password) = rpartition(user_info, ":");
    if user_info.contains('@') || user.contains(':') {
        return Err(ParseError("':' or '@' characters in a username or password must be escaped according to RFC 2396.".to_owned()));
    }
    if user.is_empty() {
        return Err(ParseError("The empty string is not a valid username.".to_owned()));
    }
    Ok((user, password))
}

// Splits and parses comma-separated hosts.
fn split_hosts(host_str: &str) -> Result<Vec<Host>> {
    let mut hosts = Vec::new();
    for entity in host_str.split(',') {
        if entity.is_empty() {
            return Err(ParseError("Empty host, or extra comma in host list.".to_owned()));
        }
        hosts.push(parse_host(entity)?);
    }
    Ok(hosts)
}

// Determines the option delimiter and collects key=value pairs.
fn split_options(opts: &str) -> Result<ConnectionOptions> {
    let delim = match (opts.find('&'), opts.find(';')) {
        (Some(_), Some(_)) => {
            return Err(ParseError("Cannot mix '&' and ';' for option separators.".to_owned()));
        }
        (Some(_), None) => '&',
        _ => ';',
    };

    let mut options = BTreeMap::new();
    for opt in opts.split(delim) {
        if !opt.contains('=') {
            return Err(ParseError("MongoDB URI options are key=value pairs.".to_owned()));
        }
        let (key, val) = partition(opt, "=");
        options.insert(key.to_owned(), val.to_owned());
    }

    Ok(ConnectionOptions { options: options })
}

// Partitions a string around the left-most occurrence of the separator, if it exists.
fn partition<'a>(string: &'a str, sep: &str) -> (&'a str, &'a str) {
    match string.find(sep) {
        Some(idx) => (&string[..idx], &string[idx + sep.len()..]),
        None => (string, ""),
    }
}

// Partitions a string around the right-most occurrence of the separator, if it exists.
fn rpartition<'a>(string: &'a str, sep: &str) -> (&'a str, &'a str) {
    match string.rfind(sep) {
        Some(idx) => (&string[..idx], &string[idx + sep.len()..]),
        None => (string, ""),
    }
}
