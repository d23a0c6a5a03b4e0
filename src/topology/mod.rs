//! Replica set membership and server selection.
//!
//! A `ReplicaSet` keeps no state besides its connection pool. Each
//! selection refreshes membership by probing the first reachable known
//! host, reconciles the pool with the reported members and then picks a
//! connection: the stated primary for `primary`, or any member for
//! `secondary_ok`, preferring secondaries.
pub mod monitor;

use connector::{self, Connector, Transport};
use connstring::{self, Host};
use error::Error::{AllMembersUnreachable, ArgumentError, LockError, NoPrimaryAvailable, ReplicaSetClosed};
use error::Result;
use pool::ConnectionPool;

use std::sync::Arc;
use std::time::Duration;

use self::monitor::ProbeResult;

/// A named replica set and the pooled connections to its members.
pub struct ReplicaSet<T: Transport> {
    name: String,
    transport: Arc<T>,
    pool: ConnectionPool<T>,
}

impl<T: Transport> Clone for ReplicaSet<T> {
    fn clone(&self) -> Self {
        ReplicaSet {
            name: self.name.clone(),
            transport: self.transport.clone(),
            pool: self.pool.clone(),
        }
    }
}

impl<T: Transport> ReplicaSet<T> {
    /// Opens the replica set `name` from the given seeds, using the
    /// process-wide default connect timeout.
    pub fn open(transport: Arc<T>, name: &str, seeds: Vec<Host>) -> Result<ReplicaSet<T>> {
        ReplicaSet::open_with_timeout(transport, name, seeds, connector::default_connect_timeout())
    }

    /// Opens the replica set `name` from the given seeds. Fails unless at
    /// least one seed is reachable and reports itself a member of `name`.
    pub fn open_with_timeout(transport: Arc<T>, name: &str, seeds: Vec<Host>,
                             timeout: Duration) -> Result<ReplicaSet<T>> {
        if seeds.is_empty() {
            return Err(ArgumentError("A replica set needs at least one seed host.".to_owned()));
        }

        let connector = Connector::new(transport.clone());
        let rs = ReplicaSet {
            name: name.to_owned(),
            transport: transport,
            pool: ConnectionPool::new(name, seeds, connector, timeout),
        };

        match rs.update_members() {
            Ok(info) => {
                info!(set = name, host = %info.responding_host, "opened replica set");
                Ok(rs)
            }
            Err(err) => {
                // Seeds that connected but failed the probe keep nothing open.
                rs.pool.close_all()?;
                Err(err)
            }
        }
    }

    /// Opens a replica set described by a connection string such as
    /// `mongodb://a,b:27018/?replicaSet=rs0&connectTimeoutMS=2500`.
    pub fn with_uri(transport: Arc<T>, uri: &str) -> Result<ReplicaSet<T>> {
        let config = connstring::parse(uri)?;

        let name = match config.replica_set() {
            Some(name) => name.to_owned(),
            None => return Err(ArgumentError("The connection string must name a replicaSet.".to_owned())),
        };

        let timeout = match config.connect_timeout()? {
            Some(timeout) => timeout,
            None => connector::default_connect_timeout(),
        };

        ReplicaSet::open_with_timeout(transport, &name, config.hosts, timeout)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeout(&self) -> Duration {
        self.pool.timeout()
    }

    /// The members as of the last successful probe.
    pub fn members(&self) -> Result<Vec<Host>> {
        self.pool.hosts()
    }

    /// Probes the known hosts in order until one answers as a member, then
    /// makes the pool match the members it reports.
    pub fn update_members(&self) -> Result<ProbeResult> {
        let hosts = self.pool.hosts()?;

        let info = until_success(&hosts, |host| {
            let conn = self.pool.get_or_create(host, None)?;
            monitor::probe(&*self.transport, &conn, host, &self.name)
        })?;

        self.pool.reconcile(&info.member_hosts)?;
        Ok(info)
    }

    /// Returns a connection to the current primary.
    pub fn primary(&self) -> Result<Arc<T::Connection>> {
        let info = self.update_members()?;
        match info.stated_primary() {
            Some(host) => self.pool.get_or_create(host, None),
            None => Err(NoPrimaryAvailable(self.name.clone())),
        }
    }

    /// Returns a connection to some member, trying secondaries in random
    /// order before the primary.
    ///
    /// The chosen host was a member when the set was last probed; its role
    /// is not checked again when connecting.
    pub fn secondary_ok(&self) -> Result<Arc<T::Connection>> {
        let info = self.update_members()?;
        until_success(&info.read_candidates(), |host| self.pool.get_or_create(host, None))
    }

    /// Closes every pooled connection. Later selections fail with
    /// `ReplicaSetClosed`.
    pub fn close(&self) -> Result<()> {
        self.pool.close_all()?;
        info!(set = %self.name, "closed replica set");
        Ok(())
    }
}

// Applies `f` to each host in order and returns the first success. Failures
// are collected and only reported, together, if every host fails. A closed
// pool or a poisoned lock ends the search at once.
fn until_success<F, R>(hosts: &[Host], mut f: F) -> Result<R>
    where F: FnMut(&Host) -> Result<R>
{
    let mut failures = Vec::new();

    for host in hosts {
        match f(host) {
            Ok(result) => return Ok(result),
            Err(err @ ReplicaSetClosed(_)) | Err(err @ LockError) => return Err(err),
            Err(err) => {
                warn!(host = %host, error = %err, "skipping replica set member");
                failures.push((host.clone(), err));
            }
        }
    }

    Err(AllMembersUnreachable(failures))
}

