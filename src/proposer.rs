//! The two-phase proposer
//!
//! One `propose` call drives one attempt: prepare, value selection, accept,
//! decide. Phase outcomes are tagged results carried forward explicitly; a
//! failed phase aborts the attempt and never retries on its own.

use tracing::{info, instrument, warn};

use crate::core::{select_value, ProposalNum};
use crate::member::Member;
use crate::messages::Message;
use crate::rpc;

/// Outcome of a single proposal attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProposeOutcome {
    /// A majority accepted; the decide was broadcast.
    Decided { n: ProposalNum, value: String },
    /// Fewer than a majority of promises arrived in time.
    PreparePhaseFailed { promises: usize },
    /// Fewer than a majority of accepts arrived in time.
    AcceptPhaseFailed { accepted: usize },
}

/// Run single-decree consensus as the proposer for `candidate`.
///
/// The chosen value may differ from `candidate`: if any promise reports a
/// previously accepted value, the one with the highest accepted proposal
/// number is carried forward instead.
#[instrument(skip_all, fields(member = %member.id(), candidate = %candidate))]
pub async fn propose(member: &Member, candidate: &str) -> ProposeOutcome {
    let majority = member.majority();
    let n = member.mint_proposal_num();
    info!(n = %n, "proposal started");

    // Phase 1: gather promises and any previously accepted pairs.
    let replies = rpc::broadcast(
        member,
        &Message::Prepare {
            from: member.id(),
            n,
        },
    )
    .await;
    let promises: Vec<(ProposalNum, Option<String>)> = replies
        .into_iter()
        .filter_map(|reply| match reply {
            Message::Promise {
                accepted_n,
                accepted_v,
                ..
            } => Some((accepted_n, accepted_v)),
            _ => None,
        })
        .collect();
    if promises.len() < majority {
        warn!(n = %n, promises = promises.len(), majority, "prepare phase failed");
        return ProposeOutcome::PreparePhaseFailed {
            promises: promises.len(),
        };
    }

    let value = select_value(&promises, candidate);
    if value != candidate {
        info!(n = %n, value = %value, "carrying forward previously accepted value");
    }

    // Phase 2: ask for accepts on the chosen value.
    let replies = rpc::broadcast(
        member,
        &Message::AcceptRequest {
            from: member.id(),
            n,
            value: value.clone(),
        },
    )
    .await;
    let accepted = replies
        .iter()
        .filter(|reply| matches!(reply, Message::Accepted { .. }))
        .count();
    if accepted < majority {
        warn!(n = %n, accepted, majority, "accept phase failed");
        return ProposeOutcome::AcceptPhaseFailed { accepted };
    }

    // Majority formed: announce to the cluster and to our own learner, which
    // runs through the same decide codepath as a remote one.
    info!(n = %n, value = %value, "majority accepted, broadcasting decide");
    let decide = Message::Decide {
        from: member.id(),
        value: value.clone(),
    };
    rpc::broadcast(member, &decide).await;
    member.on_message(&decide);

    ProposeOutcome::Decided { n, value }
}
