//! Single-decree Paxos election engine for a fixed council of nine members
//!
//! Each peer plays all three roles at once over a one-frame-per-connection
//! TCP transport:
//!
//! - **Acceptor**: promises and accepts proposals under a coarse lock
//! - **Learner**: records the first decide and announces it exactly once
//! - **Proposer**: drives prepare/accept rounds against the whole cluster
//!
//! The protocol state machines live in [`core`] with no I/O attached; the
//! async shell around them is [`server`] (inbound), [`rpc`] (outbound fan-out)
//! and [`proposer`]. A per-peer [`profile::Profile`] injects latency and drops
//! on both directions of every hop.
//!
//! # Quick start
//!
//! ```ignore
//! let table = PeerTable::load("network.config")?;
//! let member = Arc::new(Member::new("M4".parse()?, table, Profile::from_name("reliable"))?);
//! let listener = TcpListener::bind(member.self_entry().endpoint()).await?;
//! tokio::spawn(server::serve(member.clone(), listener));
//! let outcome = proposer::propose(&member, "M5").await;
//! ```

#![warn(clippy::pedantic)]

pub mod config;
pub mod core;
pub mod member;
mod messages;
pub mod profile;
pub mod proposer;
pub mod rpc;
pub mod server;

pub use config::{ConfigError, PeerEntry, PeerTable, DEFAULT_CONFIG_PATH};
pub use core::{MemberId, ProposalNum};
pub use member::Member;
pub use messages::{Message, ParseError, WireCodec};
pub use profile::{Profile, ProfileKind};
pub use proposer::{propose, ProposeOutcome};
