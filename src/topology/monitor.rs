//! Replica set discovery through the isMaster command.
use connector::Transport;
use connstring::{self, Host};
use error::Error::{ConnectError, IoError, MembershipMismatch, NotAReplicaMember, OperationError, ResponseError};
use error::Result;

use bson::{Bson, Document};
use bson::ordered::ValueAccessError;
use rand::seq::SliceRandom;
use rand::thread_rng;

/// The fields of an isMaster reply that drive replica set discovery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IsMasterResult {
    pub is_master: bool,
    pub hosts: Vec<Host>,
    pub set_name: Option<String>,
    pub primary: Option<Host>,
}

impl IsMasterResult {
    /// Parses an isMaster response document from the server.
    ///
    /// `ismaster` and `hosts` are required. The `hosts` list is taken as
    /// reported; the server already leaves out arbiters and hidden members.
    pub fn new(doc: &Document) -> Result<IsMasterResult> {
        check_ok(doc)?;

        let is_master = match doc.get("ismaster") {
            Some(&Bson::Boolean(b)) => b,
            _ => return Err(ResponseError(format!("isMaster reply is missing `ismaster`: {}", doc))),
        };

        let hosts = match doc.get("hosts") {
            Some(&Bson::Array(ref arr)) => {
                let mut hosts = Vec::with_capacity(arr.len());
                for entry in arr {
                    match *entry {
                        Bson::String(ref s) => hosts.push(connstring::parse_host(s)?),
                        ref other => {
                            return Err(ResponseError(format!("isMaster reply lists a non-string host: {}", other)));
                        }
                    }
                }
                hosts
            }
            _ => return Err(ResponseError(format!("isMaster reply is missing `hosts`: {}", doc))),
        };

        let set_name = match doc.get("setName") {
            Some(&Bson::String(ref s)) => Some(s.to_owned()),
            _ => None,
        };

        let primary = match doc.get("primary") {
            Some(&Bson::String(ref s)) => Some(connstring::parse_host(s)?),
            _ => None,
        };

        Ok(IsMasterResult {
            is_master: is_master,
            hosts: hosts,
            set_name: set_name,
            primary: primary,
        })
    }
}

// Fails with the server's `errmsg` when the reply is not ok. A missing `ok`
// counts as ok.
fn check_ok(doc: &Document) -> Result<()> {
    let ok = match doc.get("ok") {
        None => true,
        Some(&Bson::I32(v)) => v != 0,
        Some(&Bson::I64(v)) => v != 0,
        Some(&Bson::FloatingPoint(v)) => v != 0.0,
        Some(&Bson::Boolean(b)) => b,
        Some(other) => return Err(ResponseError(format!("isMaster reply has a malformed `ok`: {}", other))),
    };

    if ok {
        return Ok(());
    }

    let message = match doc.get("errmsg") {
        Some(&Bson::String(ref s)) => s.to_owned(),
        _ => "isMaster returned a not-ok response.".to_owned(),
    };
    Err(OperationError(message))
}

/// What one member reported about the replica set.
#[derive(Clone, Debug, PartialEq)]
pub struct ProbeResult {
    /// The host that answered.
    pub responding_host: Host,
    pub set_name: String,
    /// Whether the responding host is the primary.
    pub is_primary: bool,
    /// The members the responding host knows of.
    pub member_hosts: Vec<Host>,
    /// The primary according to the responding host, if it knows one.
    pub primary_host: Option<Host>,
    /// The full reply.
    pub reply: Document,
}

impl ProbeResult {
    /// Validates an isMaster reply from `host` against the expected set name.
    pub fn new(host: &Host, set_name: &str, reply: Document) -> Result<ProbeResult> {
        check_ok(&reply)?;

        // Membership is decided before the remaining fields are required;
        // a standalone server sends neither `setName` nor `hosts`.
        let found = match reply.get_str("setName") {
            Ok(found) => Some(found.to_owned()),
            Err(ValueAccessError::NotPresent) => None,
            Err(err) => return Err(err.into()),
        };

        let found = match found {
            Some(found) => found,
            None => return Err(NotAReplicaMember(host.clone(), reply)),
        };

        if found != set_name {
            return Err(MembershipMismatch {
                host: host.clone(),
                expected: set_name.to_owned(),
                found: found,
                reply: reply,
            });
        }

        let ismaster = IsMasterResult::new(&reply)?;
        let primary_host = if ismaster.is_master {
            Some(host.clone())
        } else {
            ismaster.primary
        };

        Ok(ProbeResult {
            responding_host: host.clone(),
            set_name: found,
            is_primary: ismaster.is_master,
            member_hosts: ismaster.hosts,
            primary_host: primary_host,
            reply: reply,
        })
    }

    /// The host the responder believes is primary.
    pub fn stated_primary(&self) -> Option<&Host> {
        self.primary_host.as_ref()
    }

    /// Every host a read may be sent to.
    pub fn possible_hosts(&self) -> &[Host] {
        &self.member_hosts
    }

    /// The possible hosts in random order with the stated primary moved to
    /// the end. The primary is included even when the responder does not
    /// list it.
    pub fn read_candidates(&self) -> Vec<Host> {
        let mut hosts = self.member_hosts.clone();
        hosts.shuffle(&mut thread_rng());

        if let Some(primary) = self.stated_primary() {
            hosts.retain(|host| host != primary);
            hosts.push(primary.clone());
        }

        hosts
    }
}

/// Runs isMaster against the `admin` database over `conn` and checks that
/// `host` belongs to the replica set named `set_name`.
pub fn probe<T: Transport>(transport: &T, conn: &T::Connection, host: &Host, set_name: &str) -> Result<ProbeResult> {
    let reply = match transport.run_admin_command(conn, doc! { "isMaster": 1 }) {
        Ok(reply) => reply,
        Err(IoError(err)) => return Err(ConnectError(host.clone(), err)),
        Err(err) => return Err(err),
    };
    let result = ProbeResult::new(host, set_name, reply)?;

    debug!(
        host = %host,
        set = set_name,
        is_primary = result.is_primary,
        members = result.member_hosts.len(),
        "probed replica set member"
    );

    Ok(result)
}
