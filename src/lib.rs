//! Replica set connection management for MongoDB.
//!
//! This crate discovers which member of a named replica set is primary,
//! keeps one shared connection per member, replaces connections that have
//! died and fails reads over to secondaries. The wire protocol is left to
//! the caller, who supplies it through the `Transport` trait: a way to open
//! a connection to a host and a way to run an administrative command over
//! it.
//!
//! ```no_run
//! use mongodb_replset::{ReplicaSet, Result, Transport};
//! use std::sync::Arc;
//!
//! fn run<T: Transport>(transport: Arc<T>) -> Result<()> {
//!     let seeds = vec!["db1:27017".parse()?, "db2:27017".parse()?];
//!     let rs = ReplicaSet::open(transport, "rs0", seeds)?;
//!
//!     let _writes = rs.primary()?;
//!     let _reads = rs.secondary_ok()?;
//!
//!     rs.close()
//! }
//! ```

#[macro_use(bson, doc)]
extern crate bson;
extern crate bufstream;
extern crate rand;
#[macro_use]
extern crate tracing;

pub mod connector;
pub mod connstring;
pub mod error;
pub mod pool;
pub mod stream;
pub mod topology;

pub use connector::{default_connect_timeout, set_default_connect_timeout, Connection, Connector, Transport};
pub use connstring::{parse_host, Host, PortId, DEFAULT_PORT};
pub use error::{Error, Result};
pub use pool::ConnectionPool;
pub use topology::ReplicaSet;
pub use topology::monitor::ProbeResult;

/// Formats a host as `host:port`.
pub fn format_host(host: &Host) -> String {
    host.to_string()
}
