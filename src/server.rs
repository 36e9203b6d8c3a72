//! Inbound listener
//!
//! Accept loop plus per-connection handlers. Every inbound frame is
//! independent: one read, at most one reply, then the connection closes.
//! Closing the listening socket terminates the loop.

use std::io;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, instrument, warn};

use crate::member::Member;
use crate::messages::WireCodec;
use crate::rpc::RPC_TIMEOUT;

/// Run the accept loop until the listener fails (i.e. is closed).
pub async fn serve(member: Arc<Member>, listener: TcpListener) -> io::Result<()> {
    loop {
        let (stream, remote) = listener.accept().await?;
        let member = Arc::clone(&member);
        tokio::spawn(async move {
            if let Err(error) = handle_connection(&member, stream).await {
                debug!(member = %member.id(), %remote, %error, "connection error");
            }
        });
    }
}

/// Handle one inbound connection: read one frame, consult the fault
/// profile, dispatch, reply.
#[instrument(skip_all, fields(member = %member.id()))]
async fn handle_connection(member: &Member, stream: TcpStream) -> io::Result<()> {
    let mut framed = Framed::new(stream, WireCodec::new());

    // Bounded read: a peer that connects and goes silent must not pin this
    // handler forever.
    let frame = match timeout(RPC_TIMEOUT, framed.next()).await {
        Ok(Some(frame)) => frame,
        // Peer closed without sending, or went silent.
        Ok(None) | Err(_) => return Ok(()),
    };
    let msg = match frame {
        Ok(msg) => msg,
        Err(error) => {
            // Malformed frame: drop the connection, no reply.
            warn!(%error, "dropping malformed frame");
            return Ok(());
        }
    };

    // Receiver-side fault injection, independent of the sender-side draw.
    if member.profile().should_drop() {
        debug!(from = %msg.sender(), "dropping inbound message");
        return Ok(());
    }
    member.profile().delay().await;

    if let Some(reply) = member.on_message(&msg) {
        framed.send(reply).await?;
    }
    Ok(())
}
