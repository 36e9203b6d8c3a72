//! Concurrent request/reply fan-out to all peers
//!
//! One connection per message: connect, send the frame, read at most one
//! reply. Every transient fault - connect failure, simulated drop, read
//! timeout, malformed reply - collapses to an absent reply, so callers only
//! ever count replies by type.

use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use futures::SinkExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, instrument};

use crate::config::PeerEntry;
use crate::member::Member;
use crate::messages::{Message, WireCodec};
use crate::profile::Profile;

/// Wall-clock bound on one whole fan-out round.
pub const RPC_TIMEOUT: Duration = Duration::from_millis(2000);
/// Bound on establishing a single connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(800);

/// Send `msg` to every peer except self in parallel and collect the replies
/// that arrive before the deadline.
///
/// Reply order is completion order - callers must count by type, never match
/// replies to destinations positionally.
pub async fn broadcast(member: &Member, msg: &Message) -> Vec<Message> {
    let calls: FuturesUnordered<_> = member
        .peers()
        .iter()
        .filter(|peer| peer.id != member.id())
        .cloned()
        .map(|peer| {
            let msg = msg.clone();
            let profile = member.profile().clone();
            async move {
                timeout(RPC_TIMEOUT, call(&peer, &profile, msg))
                    .await
                    .ok()
                    .flatten()
            }
        })
        .collect();

    calls
        .filter_map(|reply| async move { reply })
        .collect()
        .await
}

/// One request/reply exchange with one peer. `None` covers every way a reply
/// can fail to materialize.
#[instrument(skip_all, fields(peer = %peer.id))]
async fn call(peer: &PeerEntry, profile: &Profile, msg: Message) -> Option<Message> {
    let stream = match timeout(CONNECT_TIMEOUT, TcpStream::connect(peer.endpoint())).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(error)) => {
            debug!(%error, "peer unreachable");
            return None;
        }
        Err(_) => {
            debug!("connect timed out");
            return None;
        }
    };

    // Sender-side fault injection: a dropped send is never retried.
    if profile.should_drop() {
        debug!("dropping outbound message");
        return None;
    }
    profile.delay().await;

    let mut framed = Framed::new(stream, WireCodec::new());
    if let Err(error) = framed.send(msg).await {
        debug!(%error, "send failed");
        return None;
    }

    match framed.next().await {
        Some(Ok(reply)) => Some(reply),
        Some(Err(error)) => {
            debug!(%error, "bad reply");
            None
        }
        None => {
            debug!("connection closed without reply");
            None
        }
    }
}
