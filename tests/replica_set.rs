use mock::{host, member_reply, MockTransport};
use mongodb_replset::{Connection, Error, Host, ReplicaSet};

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn hosts(names: &[&str]) -> Vec<Host> {
    names.iter().map(|s| host(s)).collect()
}

fn open(transport: &Arc<MockTransport>, seeds: &[&str]) -> ReplicaSet<MockTransport> {
    ReplicaSet::open_with_timeout(transport.clone(), "rs0", hosts(seeds), Duration::from_secs(1)).unwrap()
}

// A three member set with `primary` as primary, answering from every member.
fn healthy_set(transport: &MockTransport, primary: &str) {
    for member in &["a", "b", "c"] {
        let is_primary = *member == primary;
        let stated = if is_primary { None } else { Some(primary) };
        transport.reply(&host(member), member_reply("rs0", is_primary, &["a", "b", "c"], stated));
    }
}

#[test]
fn primary_found() {
    let transport = Arc::new(MockTransport::new());
    transport.reply(&host("a"), member_reply("rs0", false, &["a", "b", "c"], Some("b")));

    let rs = open(&transport, &["a"]);
    assert_eq!(hosts(&["a", "b", "c"]), rs.members().unwrap());

    let conn = rs.primary().unwrap();
    assert_eq!(host("b"), conn.host);
}

#[test]
fn primary_answering_probe() {
    let transport = Arc::new(MockTransport::new());
    healthy_set(&transport, "a");

    let rs = open(&transport, &["a"]);
    let conn = rs.primary().unwrap();

    assert_eq!(host("a"), conn.host);
    // The probe connection is the one handed back.
    assert_eq!(1, transport.opened(&host("a")));
}

#[test]
fn no_primary() {
    let transport = Arc::new(MockTransport::new());
    transport.reply(&host("a"), member_reply("rs0", false, &["a", "b"], None));

    let rs = open(&transport, &["a"]);

    match rs.primary() {
        Err(ref err @ Error::NoPrimaryAvailable(_)) => {
            assert!(!err.is_network_error());
            assert_eq!("replica set rs0 has no primary", err.to_string());
        }
        Err(err) => panic!("expected NoPrimaryAvailable, got {}", err),
        Ok(_) => panic!("found a primary in a set without one"),
    }

    // Reads still work.
    let conn = rs.secondary_ok().unwrap();
    assert!(conn.host == host("a") || conn.host == host("b"));
}

#[test]
fn all_seeds_unreachable() {
    let transport = Arc::new(MockTransport::new());
    transport.unreachable(&host("a"));
    transport.unreachable(&host("b"));

    let result = ReplicaSet::open_with_timeout(transport.clone(), "rs0", hosts(&["a", "b"]), Duration::from_secs(1));

    match result {
        Err(Error::AllMembersUnreachable(ref failures)) => {
            assert_eq!(2, failures.len());
            assert_eq!(host("a"), failures[0].0);
            assert_eq!(host("b"), failures[1].0);
            for &(_, ref err) in failures {
                match *err {
                    Error::ConnectionRefused(..) => (),
                    ref other => panic!("expected ConnectionRefused, got {}", other),
                }
            }
        }
        Err(err) => panic!("expected AllMembersUnreachable, got {}", err),
        Ok(_) => panic!("opened a replica set with no reachable seed"),
    }
}

#[test]
fn update_members_after_members_die() {
    let transport = Arc::new(MockTransport::new());
    transport.reply(&host("a"), member_reply("rs0", true, &["a", "b"], None));

    let rs = open(&transport, &["a"]);
    let conn = rs.primary().unwrap();

    conn.kill();
    transport.unreachable(&host("a"));
    transport.unreachable(&host("b"));

    match rs.update_members() {
        Err(ref err @ Error::AllMembersUnreachable(_)) => {
            assert!(err.is_network_error());
            if let Error::AllMembersUnreachable(ref failures) = *err {
                let failed: Vec<Host> = failures.iter().map(|f| f.0.clone()).collect();
                assert_eq!(hosts(&["a", "b"]), failed);
            }
        }
        Err(err) => panic!("expected AllMembersUnreachable, got {}", err),
        Ok(_) => panic!("probed an unreachable set"),
    }

    // The failed refresh leaves the known members alone.
    assert_eq!(hosts(&["a", "b"]), rs.members().unwrap());
}

#[test]
fn membership_mismatch_is_skipped() {
    let transport = Arc::new(MockTransport::new());
    transport.reply(&host("a"), member_reply("other", true, &["a"], None));
    transport.reply(&host("b"), member_reply("rs0", true, &["b", "c"], None));

    let rs = open(&transport, &["a", "b"]);
    let info = rs.update_members().unwrap();

    assert_eq!(host("b"), info.responding_host);
    assert_eq!(hosts(&["b", "c"]), rs.members().unwrap());
    // The mismatched seed was dropped and its connection closed.
    assert!(transport.all_closed(&host("a")));
}

#[test]
fn membership_mismatch_everywhere() {
    let transport = Arc::new(MockTransport::new());
    transport.reply(&host("a"), member_reply("other", true, &["a"], None));

    let result = ReplicaSet::open_with_timeout(transport.clone(), "rs0", hosts(&["a"]), Duration::from_secs(1));

    match result {
        Err(Error::AllMembersUnreachable(ref failures)) => {
            match failures[0].1 {
                Error::MembershipMismatch { ref expected, ref found, .. } => {
                    assert_eq!("rs0", expected);
                    assert_eq!("other", found);
                }
                ref other => panic!("expected MembershipMismatch, got {}", other),
            }
        }
        Err(err) => panic!("expected AllMembersUnreachable, got {}", err),
        Ok(_) => panic!("opened a replica set through a foreign member"),
    }

    // Nothing stays open after a failed open.
    assert!(transport.all_closed(&host("a")));
}

#[test]
fn reconciles_with_reported_members() {
    let transport = Arc::new(MockTransport::new());
    transport.reply(&host("a"), member_reply("rs0", true, &["a", "b", "d"], None));

    let rs = open(&transport, &["a", "b", "c"]);
    assert_eq!(hosts(&["a", "b", "d"]), rs.members().unwrap());
}

#[test]
fn primary_connection_is_reused() {
    let transport = Arc::new(MockTransport::new());
    healthy_set(&transport, "b");

    let rs = open(&transport, &["a"]);

    let first = rs.primary().unwrap();
    let second = rs.primary().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(1, transport.opened(&host("b")));

    first.kill();
    let third = rs.primary().unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    assert!(!third.is_closed());
    assert_eq!(2, transport.opened(&host("b")));
}

#[test]
fn secondary_ok_prefers_secondaries() {
    let transport = Arc::new(MockTransport::new());
    healthy_set(&transport, "a");

    let rs = open(&transport, &["a"]);

    for _ in 0..20 {
        let conn = rs.secondary_ok().unwrap();
        assert!(conn.host == host("b") || conn.host == host("c"));
    }
}

#[test]
fn secondary_ok_falls_back_to_primary() {
    let transport = Arc::new(MockTransport::new());
    healthy_set(&transport, "a");
    transport.unreachable(&host("b"));
    transport.unreachable(&host("c"));

    let rs = open(&transport, &["a"]);
    assert_eq!(host("a"), rs.secondary_ok().unwrap().host);
}

#[test]
fn secondary_ok_with_no_reachable_member() {
    let transport = Arc::new(MockTransport::new());
    // The seed answers but is not itself a member any more.
    transport.reply(&host("a"), member_reply("rs0", false, &["b", "c"], None));
    transport.unreachable(&host("b"));
    transport.unreachable(&host("c"));

    let rs = open(&transport, &["a"]);

    match rs.secondary_ok() {
        Err(Error::AllMembersUnreachable(ref failures)) => {
            let mut failed: Vec<Host> = failures.iter().map(|f| f.0.clone()).collect();
            failed.sort();
            assert_eq!(hosts(&["b", "c"]), failed);
        }
        Err(err) => panic!("expected AllMembersUnreachable, got {}", err),
        Ok(_) => panic!("connected to an unreachable member"),
    }
}

#[test]
fn close() {
    let transport = Arc::new(MockTransport::new());
    healthy_set(&transport, "a");

    let rs = open(&transport, &["a"]);
    let conn = rs.secondary_ok().unwrap();
    rs.close().unwrap();

    assert!(conn.is_closed());
    for member in &["a", "b", "c"] {
        assert!(transport.all_closed(&host(member)));
    }

    for result in vec!(rs.primary().map(|_| ()), rs.secondary_ok().map(|_| ()), rs.update_members().map(|_| ())) {
        match result {
            Err(ref err @ Error::ReplicaSetClosed(_)) => assert!(!err.is_network_error()),
            other => panic!("expected ReplicaSetClosed, got {:?}", other),
        }
    }
}

#[test]
fn open_uses_default_timeout() {
    let transport = Arc::new(MockTransport::new());
    healthy_set(&transport, "a");

    let rs = ReplicaSet::open(transport.clone(), "rs0", hosts(&["a"])).unwrap();
    assert_eq!("rs0", rs.name());
    assert!(rs.timeout() > Duration::from_secs(0));
}

#[test]
fn open_without_seeds() {
    let transport = Arc::new(MockTransport::new());

    match ReplicaSet::open(transport, "rs0", Vec::new()) {
        Err(Error::ArgumentError(_)) => (),
        Err(err) => panic!("expected ArgumentError, got {}", err),
        Ok(_) => panic!("opened a replica set without seeds"),
    }
}

#[test]
fn open_from_uri() {
    let transport = Arc::new(MockTransport::new());
    healthy_set(&transport, "b");

    let rs = ReplicaSet::with_uri(transport.clone(), "mongodb://a,b/?replicaSet=rs0&connectTimeoutMS=1500").unwrap();

    assert_eq!("rs0", rs.name());
    assert_eq!(Duration::from_millis(1500), rs.timeout());
    assert_eq!(host("b"), rs.primary().unwrap().host);
}

#[test]
fn open_from_uri_without_set_name() {
    let transport = Arc::new(MockTransport::new());

    match ReplicaSet::with_uri(transport, "mongodb://a,b/") {
        Err(Error::ArgumentError(_)) => (),
        Err(err) => panic!("expected ArgumentError, got {}", err),
        Ok(_) => panic!("opened a replica set without a name"),
    }
}

#[test]
fn concurrent_selection() {
    let transport = Arc::new(MockTransport::new());
    healthy_set(&transport, "c");
    transport.delay(&host("c"), Duration::from_millis(50));

    let rs = open(&transport, &["a"]);

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads).map(|i| {
        let rs = rs.clone();
        let barrier = barrier.clone();
        thread::spawn(move || {
            barrier.wait();
            if i % 2 == 0 {
                rs.primary().unwrap().host.clone()
            } else {
                rs.update_members().unwrap().responding_host
            }
        })
    }).collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let host_seen = handle.join().unwrap();
        if i % 2 == 0 {
            assert_eq!(host("c"), host_seen);
        }
    }

    assert_eq!(1, transport.opened(&host("c")));
    assert_eq!(hosts(&["a", "b", "c"]), rs.members().unwrap());
}
