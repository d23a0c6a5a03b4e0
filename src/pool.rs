//! Shared connections to the members of a replica set, one per host.
use connector::{Connection, Connector, Transport};
use connstring::Host;
use error::Error::ReplicaSetClosed;
use error::Result;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Maps each known member host to its connection, if one has been opened.
///
/// All lookups that decide whether to connect, and all mutations, happen
/// under a single lock, so concurrent callers asking for the same
/// unconnected host open exactly one connection between them.
pub struct ConnectionPool<T: Transport> {
    // The replica set name, used in errors once the pool is closed.
    name: String,
    // None once the pool has been closed.
    inner: Arc<Mutex<Option<BTreeMap<Host, Option<Arc<T::Connection>>>>>>,
    connector: Connector<T>,
    timeout: Duration,
}

impl<T: Transport> Clone for ConnectionPool<T> {
    fn clone(&self) -> Self {
        ConnectionPool {
            name: self.name.clone(),
            inner: self.inner.clone(),
            connector: self.connector.clone(),
            timeout: self.timeout,
        }
    }
}

impl<T: Transport> fmt::Debug for ConnectionPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("name", &self.name)
            .field("hosts", &self.hosts().unwrap_or_default())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl<T: Transport> ConnectionPool<T> {
    /// Returns a pool that knows each seed host but holds no connections.
    pub fn new<I>(name: &str, seeds: I, connector: Connector<T>, timeout: Duration) -> ConnectionPool<T>
        where I: IntoIterator<Item = Host>
    {
        let members = seeds.into_iter().map(|host| (host, None)).collect();

        ConnectionPool {
            name: name.to_owned(),
            inner: Arc::new(Mutex::new(Some(members))),
            connector: connector,
            timeout: timeout,
        }
    }

    /// The timeout used when opening new connections.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns a snapshot of the known hosts, in order.
    pub fn hosts(&self) -> Result<Vec<Host>> {
        let locked = self.inner.lock()?;
        match *locked {
            Some(ref members) => Ok(members.keys().cloned().collect()),
            None => Err(ReplicaSetClosed(self.name.clone())),
        }
    }

    /// Returns the stored connection for `host` without connecting.
    pub fn connection(&self, host: &Host) -> Result<Option<Arc<T::Connection>>> {
        let locked = self.inner.lock()?;
        match *locked {
            Some(ref members) => Ok(members.get(host).and_then(|conn| conn.clone())),
            None => Err(ReplicaSetClosed(self.name.clone())),
        }
    }

    /// Returns a live connection to `host`.
    ///
    /// An open `candidate` is returned as is. Otherwise the stored connection
    /// is reused if it is still open, and a new one is opened and stored if
    /// it is missing or closed. A host that is not yet known is added.
    pub fn get_or_create(&self, host: &Host, candidate: Option<Arc<T::Connection>>) -> Result<Arc<T::Connection>> {
        if let Some(conn) = candidate {
            if !conn.is_closed() {
                return Ok(conn);
            }
        }

        let mut locked = self.inner.lock()?;
        let members = match *locked {
            Some(ref mut members) => members,
            None => return Err(ReplicaSetClosed(self.name.clone())),
        };

        if let Some(&Some(ref conn)) = members.get(host) {
            if !conn.is_closed() {
                return Ok(conn.clone());
            }
            debug!(host = %host, "replacing closed connection");
        }

        let conn = Arc::new(self.connector.connect_with_timeout(host, self.timeout)?);
        members.insert(host.clone(), Some(conn.clone()));
        Ok(conn)
    }

    /// Makes the known hosts exactly `desired`: connections to hosts that
    /// are no longer wanted are closed and dropped, and new hosts are added
    /// without a connection.
    pub fn reconcile<'a, I>(&self, desired: I) -> Result<()>
        where I: IntoIterator<Item = &'a Host>
    {
        let desired: BTreeSet<&Host> = desired.into_iter().collect();

        let mut locked = self.inner.lock()?;
        let members = match *locked {
            Some(ref mut members) => members,
            None => return Err(ReplicaSetClosed(self.name.clone())),
        };

        let dropped: Vec<Host> = members.keys()
            .filter(|host| !desired.contains(host))
            .cloned()
            .collect();

        for host in dropped {
            if let Some(Some(conn)) = members.remove(&host) {
                conn.close();
            }
            debug!(host = %host, set = %self.name, "dropped host no longer in replica set");
        }

        for host in desired {
            if !members.contains_key(host) {
                members.insert(host.clone(), None);
            }
        }

        Ok(())
    }

    /// Closes every stored connection. The pool refuses further use.
    pub fn close_all(&self) -> Result<()> {
        let mut locked = self.inner.lock()?;
        if let Some(members) = locked.take() {
            for (_, conn) in members {
                if let Some(conn) = conn {
                    conn.close();
                }
            }
        }
        Ok(())
    }

    /// Returns true once `close_all` has run.
    pub fn is_closed(&self) -> bool {
        match self.inner.lock() {
            Ok(locked) => locked.is_none(),
            Err(_) => true,
        }
    }
}
