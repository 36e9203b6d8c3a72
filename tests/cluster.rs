//! End-to-end cluster tests over loopback TCP
//!
//! Each test spins up an in-process council on ephemeral ports, drives the
//! proposer through the real listener/fan-out path, and asserts on the
//! observable consensus state.

use std::sync::Arc;

use council_paxos::{
    Member, MemberId, Message, PeerEntry, PeerTable, Profile, ProfileKind, ProposeOutcome,
    WireCodec, propose, server,
};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;

/// Initialize tracing for tests. Call at the start of each test.
/// Uses RUST_LOG env var for filtering (defaults to "debug" for this crate).
fn init_tracing() -> impl Sized {
    use tracing::Dispatch;
    use tracing_subscriber::{EnvFilter, fmt};

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("council_paxos=debug")),
        )
        .with_test_writer()
        .finish();

    let dispatch = Dispatch::new(subscriber);
    tracing::dispatcher::set_default(&dispatch)
}

fn reliable() -> Profile {
    Profile::with_seed(ProfileKind::Reliable, 0)
}

/// Bind one listener per profile on an ephemeral port, build the table, and
/// start serving every member.
async fn start_cluster(profiles: Vec<Profile>) -> Vec<Arc<Member>> {
    let mut listeners = Vec::new();
    let mut entries = Vec::new();
    for i in 0..profiles.len() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        entries.push(PeerEntry {
            id: MemberId::new(u16::try_from(i).unwrap() + 1),
            host: "127.0.0.1".into(),
            port: listener.local_addr().unwrap().port(),
        });
        listeners.push(listener);
    }
    let table = PeerTable::new(entries);

    let members: Vec<Arc<Member>> = profiles
        .into_iter()
        .enumerate()
        .map(|(i, profile)| {
            let id = MemberId::new(u16::try_from(i).unwrap() + 1);
            Arc::new(Member::new(id, table.clone(), profile).unwrap())
        })
        .collect();

    for (member, listener) in members.iter().zip(listeners) {
        tokio::spawn(server::serve(Arc::clone(member), listener));
    }
    members
}

/// One raw request/reply exchange against a member's listener.
async fn exchange(member: &Member, msg: Message) -> Option<Message> {
    let stream = TcpStream::connect(member.self_entry().endpoint())
        .await
        .unwrap();
    let mut framed = Framed::new(stream, WireCodec::new());
    framed.send(msg).await.unwrap();
    framed.next().await.transpose().unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn single_proposer_reaches_consensus() {
    let _guard = init_tracing();
    let members = start_cluster(vec![reliable(); 9]).await;

    let outcome = propose(&members[3], "M5").await;
    assert_eq!(
        outcome,
        ProposeOutcome::Decided {
            n: "1.4".parse().unwrap(),
            value: "M5".into(),
        }
    );

    // The decide broadcast was acknowledged before propose returned, so
    // every learner has already applied it.
    for member in &members {
        assert_eq!(member.decided_value(), Some("M5".into()), "{}", member.id());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_proposers_agree_on_at_most_one_value() {
    let _guard = init_tracing();
    let members = start_cluster(vec![reliable(); 9]).await;

    let (a, b) = tokio::join!(propose(&members[0], "M1"), propose(&members[7], "M8"));

    let decided: Vec<String> = members.iter().filter_map(|m| m.decided_value()).collect();
    let mut distinct = decided.clone();
    distinct.sort();
    distinct.dedup();
    assert!(
        distinct.len() <= 1,
        "cluster split on values {distinct:?}"
    );

    // A proposer that reports Decided must agree with every learner.
    for outcome in [a, b] {
        if let ProposeOutcome::Decided { value, .. } = outcome {
            assert!(decided.iter().all(|v| *v == value));
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn previously_accepted_value_is_carried_forward() {
    let _guard = init_tracing();
    let members = start_cluster(vec![reliable(); 9]).await;

    // Seed M3's acceptor with an accepted pair through the real wire path.
    let reply = exchange(
        &members[2],
        Message::AcceptRequest {
            from: MemberId::new(2),
            n: "1.3".parse().unwrap(),
            value: "M3".into(),
        },
    )
    .await;
    assert!(matches!(reply, Some(Message::Accepted { .. })));

    // M5 proposes M9, but its prepare phase must surface the seeded pair.
    let outcome = propose(&members[4], "M9").await;
    assert_eq!(
        outcome,
        ProposeOutcome::Decided {
            n: "1.5".parse().unwrap(),
            value: "M3".into(),
        }
    );
    for member in &members {
        assert_eq!(member.decided_value(), Some("M3".into()), "{}", member.id());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn minority_cannot_reach_consensus() {
    let _guard = init_tracing();

    // Nine-member table, but only four members are alive. The other five
    // listeners stay bound and never accept, so their inbound traffic
    // silently times out - the proposer observes only absent replies.
    let mut listeners = Vec::new();
    let mut silent = Vec::new();
    let mut entries = Vec::new();
    for i in 1..=9u16 {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        entries.push(PeerEntry {
            id: MemberId::new(i),
            host: "127.0.0.1".into(),
            port: listener.local_addr().unwrap().port(),
        });
        if i <= 4 {
            listeners.push(listener);
        } else {
            silent.push(listener);
        }
    }
    let table = PeerTable::new(entries);
    let members: Vec<Arc<Member>> = (1..=4u16)
        .map(|i| Arc::new(Member::new(MemberId::new(i), table.clone(), reliable()).unwrap()))
        .collect();
    for (member, listener) in members.iter().zip(listeners) {
        tokio::spawn(server::serve(Arc::clone(member), listener));
    }

    let outcome = propose(&members[0], "M1").await;
    assert_eq!(outcome, ProposeOutcome::PreparePhaseFailed { promises: 3 });
    for member in &members {
        assert_eq!(member.decided_value(), None, "{}", member.id());
    }
    drop(silent);
}

#[tokio::test(flavor = "multi_thread")]
async fn repeated_decides_are_acknowledged_but_inert() {
    let _guard = init_tracing();
    let members = start_cluster(vec![reliable(); 9]).await;

    let decide = Message::Decide {
        from: MemberId::new(4),
        value: "M7".into(),
    };
    for _ in 0..3 {
        let reply = exchange(&members[0], decide.clone()).await;
        assert!(matches!(reply, Some(Message::Ack { .. })));
    }
    assert_eq!(members[0].decided_value(), Some("M7".into()));

    // A conflicting later decide is acknowledged without effect.
    let reply = exchange(
        &members[0],
        Message::Decide {
            from: MemberId::new(8),
            value: "M8".into(),
        },
    )
    .await;
    assert!(matches!(reply, Some(Message::Ack { .. })));
    assert_eq!(members[0].decided_value(), Some("M7".into()));

    // Nobody else learned anything from targeted decides.
    for member in &members[1..] {
        assert_eq!(member.decided_value(), None);
    }
}
