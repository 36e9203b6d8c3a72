//! Protocol messages and the line-oriented wire codec
//!
//! Every frame is a single newline-terminated UTF-8 line of six
//! `|`-delimited fields in fixed order:
//!
//! ```text
//! TYPE|from|n|value|acceptedN|acceptedV
//! ```
//!
//! Fields a variant does not use are encoded empty. Proposal numbers are
//! encoded as `<counter>.<memberIdx>`; a promise that carries no accepted pair
//! reports the `-1.-1` sentinel.

use std::io;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::{MemberId, ProposalNum};

/// A protocol message. Every variant carries the sender.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// Phase 1a: claim proposal number `n`.
    Prepare { from: MemberId, n: ProposalNum },
    /// Phase 1b: promise for `n`, reporting the acceptor's accepted pair.
    /// `accepted_n` is [`ProposalNum::MIN`] when nothing was accepted yet.
    Promise {
        from: MemberId,
        n: ProposalNum,
        accepted_n: ProposalNum,
        accepted_v: Option<String>,
    },
    /// Phase 2a: ask acceptors to accept `value` under `n`.
    AcceptRequest {
        from: MemberId,
        n: ProposalNum,
        value: String,
    },
    /// Phase 2b: the acceptor accepted `value` under `n`.
    Accepted {
        from: MemberId,
        n: ProposalNum,
        value: String,
    },
    /// Terminal broadcast: `value` has been chosen.
    Decide { from: MemberId, value: String },
    /// Refusal of a prepare or accept; the reason travels in the value field.
    Reject {
        from: MemberId,
        n: ProposalNum,
        reason: String,
    },
    /// Generic acknowledgement (reply to a decide).
    Ack { from: MemberId },
    /// Reply to a request the acceptor does not understand.
    Error { from: MemberId, detail: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("expected 6 fields, got {0}")]
    FieldCount(usize),
    #[error("unknown message type `{0}`")]
    UnknownType(String),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("bad sender id: {0}")]
    BadFrom(#[from] crate::core::InvalidMemberId),
    #[error("bad proposal number: {0}")]
    BadProposalNum(#[from] crate::core::InvalidProposalNum),
}

impl Message {
    /// The sender carried in every variant's `from` field.
    #[must_use]
    pub fn sender(&self) -> MemberId {
        match self {
            Message::Prepare { from, .. }
            | Message::Promise { from, .. }
            | Message::AcceptRequest { from, .. }
            | Message::Accepted { from, .. }
            | Message::Decide { from, .. }
            | Message::Reject { from, .. }
            | Message::Ack { from }
            | Message::Error { from, .. } => *from,
        }
    }

    /// Serialize to the six-field line form (no trailing newline).
    #[must_use]
    pub fn serialize(&self) -> String {
        let empty = String::new;
        let (tag, from, n, value, accepted_n, accepted_v) = match self {
            Message::Prepare { from, n } => {
                ("PREPARE", from, n.to_string(), empty(), empty(), empty())
            }
            Message::Promise {
                from,
                n,
                accepted_n,
                accepted_v,
            } => (
                "PROMISE",
                from,
                n.to_string(),
                empty(),
                accepted_n.to_string(),
                accepted_v.clone().unwrap_or_default(),
            ),
            Message::AcceptRequest { from, n, value } => (
                "ACCEPT_REQUEST",
                from,
                n.to_string(),
                value.clone(),
                empty(),
                empty(),
            ),
            Message::Accepted { from, n, value } => (
                "ACCEPTED",
                from,
                n.to_string(),
                value.clone(),
                empty(),
                empty(),
            ),
            Message::Decide { from, value } => {
                ("DECIDE", from, empty(), value.clone(), empty(), empty())
            }
            Message::Reject { from, n, reason } => (
                "REJECT",
                from,
                n.to_string(),
                reason.clone(),
                empty(),
                empty(),
            ),
            Message::Ack { from } => ("ACK", from, empty(), empty(), empty(), empty()),
            Message::Error { from, detail } => {
                ("ERROR", from, empty(), detail.clone(), empty(), empty())
            }
        };
        format!("{tag}|{from}|{n}|{value}|{accepted_n}|{accepted_v}")
    }

    /// Parse one line (without the newline).
    ///
    /// Fails when the field count is not exactly six, the type token is
    /// unknown, or a field the variant requires is missing or malformed.
    /// Empty optional fields parse as absent.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let fields: Vec<&str> = line.split('|').collect();
        let &[tag, from, n, value, accepted_n, accepted_v] = fields.as_slice() else {
            return Err(ParseError::FieldCount(fields.len()));
        };

        if from.is_empty() {
            return Err(ParseError::MissingField("from"));
        }
        let from: MemberId = from.parse()?;

        let require_n = || -> Result<ProposalNum, ParseError> {
            if n.is_empty() {
                return Err(ParseError::MissingField("n"));
            }
            Ok(n.parse()?)
        };
        let require_value = || -> Result<String, ParseError> {
            if value.is_empty() {
                return Err(ParseError::MissingField("value"));
            }
            Ok(value.to_owned())
        };

        match tag {
            "PREPARE" => Ok(Message::Prepare {
                from,
                n: require_n()?,
            }),
            "PROMISE" => Ok(Message::Promise {
                from,
                n: require_n()?,
                accepted_n: if accepted_n.is_empty() {
                    ProposalNum::MIN
                } else {
                    accepted_n.parse()?
                },
                accepted_v: (!accepted_v.is_empty()).then(|| accepted_v.to_owned()),
            }),
            "ACCEPT_REQUEST" => Ok(Message::AcceptRequest {
                from,
                n: require_n()?,
                value: require_value()?,
            }),
            "ACCEPTED" => Ok(Message::Accepted {
                from,
                n: require_n()?,
                value: require_value()?,
            }),
            "DECIDE" => Ok(Message::Decide {
                from,
                value: require_value()?,
            }),
            "REJECT" => Ok(Message::Reject {
                from,
                n: require_n()?,
                reason: value.to_owned(),
            }),
            "ACK" => Ok(Message::Ack { from }),
            "ERROR" => Ok(Message::Error {
                from,
                detail: value.to_owned(),
            }),
            other => Err(ParseError::UnknownType(other.to_owned())),
        }
    }
}

/// Frame codec: one [`Message`] per newline-terminated line.
///
/// Parse failures surface as [`io::ErrorKind::InvalidData`]; the listener and
/// the fan-out both treat that as a dead connection.
#[derive(Debug, Default)]
pub struct WireCodec {
    _private: (),
}

/// Upper bound on a single frame. Values are short member tags, so anything
/// past this is garbage rather than a legitimate message.
const MAX_FRAME_LEN: usize = 1024;

impl WireCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Encoder<Message> for WireCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = item.serialize();
        dst.reserve(line.len() + 1);
        dst.put_slice(line.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

impl Decoder for WireCodec {
    type Item = Message;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(pos) = src.iter().position(|&b| b == b'\n') else {
            if src.len() > MAX_FRAME_LEN {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "frame exceeds maximum length",
                ));
            }
            return Ok(None);
        };

        let line = src.split_to(pos);
        src.advance(1);
        let line = std::str::from_utf8(&line)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
            .trim_end_matches('\r');
        let msg = Message::parse(line)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Some(msg))
    }
}
