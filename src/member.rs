//! A council member: identity, peer table, profile, and the shared
//! acceptor/learner state
//!
//! All three inbound message kinds mutate state through [`Member::on_message`]
//! under one coarse lock, which is what linearizes promises and accepts on
//! this peer. Everything else about the member is read-only after
//! construction.

use std::sync::Mutex;
use std::sync::atomic::{AtomicI32, Ordering};

use tracing::{debug, info};

use crate::config::{ConfigError, PeerEntry, PeerTable};
use crate::core::{
    AcceptOutcome, AcceptorState, LearnerState, MemberId, PrepareOutcome, ProposalNum,
};
use crate::messages::Message;
use crate::profile::Profile;

#[derive(Debug, Default)]
struct RoleState {
    acceptor: AcceptorState,
    learner: LearnerState,
}

#[derive(Debug)]
pub struct Member {
    id: MemberId,
    peers: PeerTable,
    profile: Profile,
    state: Mutex<RoleState>,
    /// Mints proposal counters; the member index makes the minted numbers
    /// globally unique.
    counter: AtomicI32,
}

impl Member {
    /// Create a member. Fails if `id` has no entry in the peer table.
    pub fn new(id: MemberId, peers: PeerTable, profile: Profile) -> Result<Self, ConfigError> {
        if peers.get(id).is_none() {
            return Err(ConfigError::UnknownMember(id));
        }
        Ok(Self {
            id,
            peers,
            profile,
            state: Mutex::new(RoleState::default()),
            counter: AtomicI32::new(0),
        })
    }

    #[must_use]
    pub fn id(&self) -> MemberId {
        self.id
    }

    #[must_use]
    pub fn peers(&self) -> &PeerTable {
        &self.peers
    }

    #[must_use]
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// This member's own row in the peer table.
    #[must_use]
    pub fn self_entry(&self) -> &PeerEntry {
        self.peers
            .get(self.id)
            .expect("member id was validated against the table at construction")
    }

    /// Majority threshold for the whole cluster, self included.
    #[must_use]
    pub fn majority(&self) -> usize {
        crate::core::majority(self.peers.len())
    }

    /// The value this member has learned, if any.
    #[must_use]
    pub fn decided_value(&self) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.learner.decided_value().map(str::to_owned)
    }

    /// Mint the next proposal number owned by this member.
    #[must_use]
    pub fn mint_proposal_num(&self) -> ProposalNum {
        let counter = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        ProposalNum::new(counter, self.id)
    }

    /// Handle one inbound protocol message as acceptor/learner.
    ///
    /// Holds the state lock for the whole transition, so concurrent
    /// connection handlers observe a total order of promises and accepts.
    /// Returns the reply to send, if any.
    pub fn on_message(&self, msg: &Message) -> Option<Message> {
        let mut state = self.state.lock().unwrap();
        match msg {
            Message::Prepare { from, n } => match state.acceptor.prepare(*n) {
                PrepareOutcome::Promised {
                    accepted_n,
                    accepted_v,
                } => {
                    info!(
                        member = %self.id,
                        to = %from,
                        n = %n,
                        prev_accepted_n = %accepted_n,
                        "promise"
                    );
                    Some(Message::Promise {
                        from: self.id,
                        n: *n,
                        accepted_n,
                        accepted_v,
                    })
                }
                PrepareOutcome::Rejected { promised } => {
                    debug!(member = %self.id, to = %from, n = %n, promised = %promised, "reject prepare");
                    Some(self.reject(*n, promised))
                }
            },
            Message::AcceptRequest { from, n, value } => {
                match state.acceptor.accept(*n, value.clone()) {
                    AcceptOutcome::Accepted => {
                        info!(member = %self.id, to = %from, n = %n, value = %value, "accepted");
                        Some(Message::Accepted {
                            from: self.id,
                            n: *n,
                            value: value.clone(),
                        })
                    }
                    AcceptOutcome::Rejected { promised } => {
                        debug!(member = %self.id, to = %from, n = %n, promised = %promised, "reject accept");
                        Some(self.reject(*n, promised))
                    }
                }
            }
            Message::Decide { value, .. } => {
                if state.learner.learn(value.clone()) {
                    info!(member = %self.id, value = %value, "learned consensus");
                    println!("CONSENSUS: {value} has been elected Council President!");
                }
                Some(Message::Ack { from: self.id })
            }
            // Replies arriving as requests are a protocol violation.
            Message::Promise { .. }
            | Message::Accepted { .. }
            | Message::Reject { .. }
            | Message::Ack { .. }
            | Message::Error { .. } => {
                debug!(member = %self.id, from = %msg.sender(), "unexpected message type");
                Some(Message::Error {
                    from: self.id,
                    detail: "unexpected message type".into(),
                })
            }
        }
    }

    fn reject(&self, n: ProposalNum, promised: ProposalNum) -> Message {
        Message::Reject {
            from: self.id,
            n,
            reason: format!("promised={promised}"),
        }
    }
}
