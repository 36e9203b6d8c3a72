//! Pure protocol state machines - no I/O, no async
//!
//! Every state transition of the election protocol lives here so that it can
//! be exercised without a runtime. The async shell ([`crate::member`],
//! [`crate::server`], [`crate::proposer`]) only ever mutates protocol state
//! through these types.

use std::fmt;
use std::str::FromStr;

/// A council member identifier such as `M4`.
///
/// The numeric suffix doubles as the tie-break component of proposal numbers,
/// which is what makes proposal numbers globally unique across proposers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemberId(u16);

impl MemberId {
    #[must_use]
    pub fn new(index: u16) -> Self {
        Self(index)
    }

    /// Numeric index of this member (`M3` -> 3).
    #[must_use]
    pub fn index(self) -> u16 {
        self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid member id `{0}`, expected M<index>")]
pub struct InvalidMemberId(String);

impl FromStr for MemberId {
    type Err = InvalidMemberId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix('M')
            .and_then(|idx| idx.parse().ok())
            .map(MemberId)
            .ok_or_else(|| InvalidMemberId(s.to_owned()))
    }
}

/// A totally ordered proposal number, encoded on the wire as
/// `<counter>.<memberIdx>`.
///
/// Ordering is lexicographic: first by counter, then by member index. Counters
/// are minted per-process, so the member-index suffix is what guarantees two
/// proposers never mint the same number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProposalNum {
    counter: i32,
    member_idx: i32,
}

impl ProposalNum {
    /// Sentinel for "no proposal yet".
    pub const MIN: ProposalNum = ProposalNum {
        counter: -1,
        member_idx: -1,
    };

    #[must_use]
    pub fn new(counter: i32, member: MemberId) -> Self {
        Self {
            counter,
            member_idx: i32::from(member.index()),
        }
    }
}

impl Default for ProposalNum {
    fn default() -> Self {
        Self::MIN
    }
}

impl fmt::Display for ProposalNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.counter, self.member_idx)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid proposal number `{0}`, expected <counter>.<memberIdx>")]
pub struct InvalidProposalNum(String);

impl FromStr for ProposalNum {
    type Err = InvalidProposalNum;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (counter, member_idx) = s
            .split_once('.')
            .ok_or_else(|| InvalidProposalNum(s.to_owned()))?;
        let counter = counter
            .parse()
            .map_err(|_| InvalidProposalNum(s.to_owned()))?;
        let member_idx = member_idx
            .parse()
            .map_err(|_| InvalidProposalNum(s.to_owned()))?;
        Ok(Self {
            counter,
            member_idx,
        })
    }
}

/// Result of handling a prepare request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PrepareOutcome {
    /// Promised - reports the acceptor's current accepted pair so the
    /// proposer can apply the carry-forward rule.
    Promised {
        accepted_n: ProposalNum,
        accepted_v: Option<String>,
    },
    /// A proposal numbered at least as high was already promised.
    Rejected { promised: ProposalNum },
}

/// Result of handling an accept request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AcceptOutcome {
    Accepted,
    /// A strictly higher proposal was already promised.
    Rejected { promised: ProposalNum },
}

/// Acceptor state for the single decree. Memory-only by design: a restarted
/// member forgets its promises.
///
/// The accepted value is stored together with its proposal number, so "a value
/// is defined iff a proposal was accepted" holds by construction.
#[derive(Clone, Debug, Default)]
pub struct AcceptorState {
    promised: ProposalNum,
    accepted: Option<(ProposalNum, String)>,
}

impl AcceptorState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn promised(&self) -> ProposalNum {
        self.promised
    }

    /// Highest accepted proposal number, [`ProposalNum::MIN`] if none.
    #[must_use]
    pub fn accepted_n(&self) -> ProposalNum {
        self.accepted.as_ref().map_or(ProposalNum::MIN, |(n, _)| *n)
    }

    #[must_use]
    pub fn accepted_v(&self) -> Option<&str> {
        self.accepted.as_ref().map(|(_, v)| v.as_str())
    }

    /// Handle a prepare request.
    ///
    /// Promises iff `n` is strictly higher than anything promised so far.
    /// An equal-numbered prepare is rejected: the promise was already granted
    /// to that proposer and re-reporting current state is all a reject does.
    pub fn prepare(&mut self, n: ProposalNum) -> PrepareOutcome {
        if n > self.promised {
            self.promised = n;
            PrepareOutcome::Promised {
                accepted_n: self.accepted_n(),
                accepted_v: self.accepted.as_ref().map(|(_, v)| v.clone()),
            }
        } else {
            PrepareOutcome::Rejected {
                promised: self.promised,
            }
        }
    }

    /// Handle an accept request.
    ///
    /// Accepts iff `n` is at least the promised number: an acceptor that
    /// promised `n` must still accept that same `n` when it arrives. Updates
    /// promised and accepted together so `promised >= accepted_n` holds after
    /// every transition.
    pub fn accept(&mut self, n: ProposalNum, value: String) -> AcceptOutcome {
        if n >= self.promised {
            self.promised = n;
            self.accepted = Some((n, value));
            AcceptOutcome::Accepted
        } else {
            AcceptOutcome::Rejected {
                promised: self.promised,
            }
        }
    }
}

/// Learner state: undecided until the first decide, then terminal.
#[derive(Clone, Debug, Default)]
pub struct LearnerState {
    decided: Option<String>,
}

impl LearnerState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn decided_value(&self) -> Option<&str> {
        self.decided.as_deref()
    }

    /// Record a decided value. Returns true only on the first call; later
    /// decides are acknowledged without touching the recorded value.
    pub fn learn(&mut self, value: String) -> bool {
        if self.decided.is_some() {
            return false;
        }
        self.decided = Some(value);
        true
    }
}

/// Value carry-forward rule: adopt the value reported with the highest
/// accepted proposal number among the gathered promises, falling back to the
/// proposer's own candidate when no acceptor has accepted anything yet.
///
/// Proposal numbers are globally unique, so "highest" is unambiguous.
#[must_use]
pub fn select_value(promises: &[(ProposalNum, Option<String>)], candidate: &str) -> String {
    let mut highest = ProposalNum::MIN;
    let mut value = candidate.to_owned();
    for (accepted_n, accepted_v) in promises {
        if let Some(v) = accepted_v
            && *accepted_n > highest
        {
            highest = *accepted_n;
            value = v.clone();
        }
    }
    value
}

/// Majority threshold for a cluster of `n` members: `n / 2 + 1` (5 of 9).
#[must_use]
pub fn majority(n: usize) -> usize {
    n / 2 + 1
}
