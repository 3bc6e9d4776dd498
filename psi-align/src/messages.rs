//! Message types exchanged between alignment peers.
//!
//! Messages are plain serde structs; framing and transport are up to the
//! caller. Every message carries the `batch_id` of its run, and each one is
//! checked against the negotiated [`ProtocolContext`] before use: a count
//! or length that disagrees with the context is a protocol violation.

use crate::context::{CurveName, ProtocolContext, PsiVariant, Role};
use crate::error::{PsiError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opening message from the client, carrying its parameters and set size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInit {
    pub batch_id: u64,
    pub psi_variant: PsiVariant,
    pub curve_name: CurveName,
    pub security_parameter: u32,
    pub verify_results: bool,
    pub self_count: usize,
}

/// Server reply with its set size and the role it took.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInit {
    pub batch_id: u64,
    pub self_count: usize,
    pub self_role: Role,
}

/// Bob's singly-blinded points, in his input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BobPoints {
    pub batch_id: u64,
    pub points: Vec<Vec<u8>>,
}

/// Alice's answer: bob's points blinded again with her key (same order),
/// plus either a serialized [`BitFilter`](crate::BitFilter) over her own
/// blinded set (`filter_ecdh`) or that set truncated to `compare_len`
/// bytes (`ecdh`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliceDoublePointsAndFilter {
    pub batch_id: u64,
    pub double_points: Vec<Vec<u8>>,
    #[serde(default)]
    pub filter: Vec<u8>,
    #[serde(default)]
    pub truncated_points: Vec<Vec<u8>>,
}

/// Bob's candidate matches, as comparison values in his input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BobAlignResult {
    pub batch_id: u64,
    pub candidates: Vec<Vec<u8>>,
}

/// Candidates alice could not find in her set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliceCheck {
    pub batch_id: u64,
    pub wrong_count: usize,
    pub false_positive_ids: Vec<Vec<u8>>,
}

/// Discriminant of [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    ClientInit,
    ServerInit,
    BobPoints,
    AliceDoublePointsAndFilter,
    BobAlignResult,
    AliceCheck,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Any protocol message, for transports that carry one stream of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    ClientInit(ClientInit),
    ServerInit(ServerInit),
    BobPoints(BobPoints),
    AliceDoublePointsAndFilter(AliceDoublePointsAndFilter),
    BobAlignResult(BobAlignResult),
    AliceCheck(AliceCheck),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::ClientInit(_) => MessageKind::ClientInit,
            Message::ServerInit(_) => MessageKind::ServerInit,
            Message::BobPoints(_) => MessageKind::BobPoints,
            Message::AliceDoublePointsAndFilter(_) => MessageKind::AliceDoublePointsAndFilter,
            Message::BobAlignResult(_) => MessageKind::BobAlignResult,
            Message::AliceCheck(_) => MessageKind::AliceCheck,
        }
    }
}

macro_rules! impl_message {
    ($($name:ident),+ $(,)?) => {
        $(
            impl From<$name> for Message {
                fn from(message: $name) -> Self {
                    Message::$name(message)
                }
            }

            impl TryFrom<Message> for $name {
                type Error = PsiError;

                fn try_from(message: Message) -> Result<Self> {
                    match message {
                        Message::$name(inner) => Ok(inner),
                        other => Err(PsiError::ProtocolViolation(format!(
                            "expected {}, got {}",
                            MessageKind::$name,
                            other.kind()
                        ))),
                    }
                }
            }
        )+
    };
}

impl_message!(
    ClientInit,
    ServerInit,
    BobPoints,
    AliceDoublePointsAndFilter,
    BobAlignResult,
    AliceCheck,
);

fn check_batch(kind: MessageKind, ctx: &ProtocolContext, batch_id: u64) -> Result<()> {
    if batch_id != ctx.batch_id {
        return Err(PsiError::ProtocolViolation(format!(
            "{kind} belongs to batch {batch_id}, expected {}",
            ctx.batch_id
        )));
    }
    Ok(())
}

fn check_count(kind: MessageKind, what: &str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(PsiError::ProtocolViolation(format!(
            "{kind} carries {actual} {what}, expected {expected}"
        )));
    }
    Ok(())
}

fn check_lengths(kind: MessageKind, values: &[Vec<u8>], expected: usize) -> Result<()> {
    match values.iter().find(|value| value.len() != expected) {
        Some(value) => Err(PsiError::ProtocolViolation(format!(
            "{kind} carries a {}-byte value, expected {expected} bytes",
            value.len()
        ))),
        None => Ok(()),
    }
}

impl ClientInit {
    /// Build the opening message from the client's context.
    pub fn from_context(ctx: &ProtocolContext) -> Self {
        Self {
            batch_id: ctx.batch_id,
            psi_variant: ctx.psi_variant,
            curve_name: ctx.curve,
            security_parameter: ctx.security_parameter,
            verify_results: ctx.verify_results,
            self_count: ctx.self_count,
        }
    }

    /// Checked by the server: both sides must run with the same parameters.
    pub fn validate(&self, ctx: &ProtocolContext) -> Result<()> {
        check_batch(MessageKind::ClientInit, ctx, self.batch_id)?;
        if self.psi_variant != ctx.psi_variant {
            return Err(PsiError::ProtocolViolation(format!(
                "peer runs psi variant {}, expected {}",
                self.psi_variant, ctx.psi_variant
            )));
        }
        if self.curve_name != ctx.curve {
            return Err(PsiError::ProtocolViolation(format!(
                "peer uses curve {}, expected {}",
                self.curve_name, ctx.curve
            )));
        }
        if self.security_parameter != ctx.security_parameter {
            return Err(PsiError::ProtocolViolation(format!(
                "peer security parameter is {}, expected {}",
                self.security_parameter, ctx.security_parameter
            )));
        }
        if self.verify_results != ctx.verify_results {
            return Err(PsiError::ProtocolViolation(
                "peers disagree on whether to verify results".to_string(),
            ));
        }
        Ok(())
    }
}

impl ServerInit {
    pub fn validate(&self, ctx: &ProtocolContext) -> Result<()> {
        check_batch(MessageKind::ServerInit, ctx, self.batch_id)
    }
}

impl BobPoints {
    /// Checked by alice against bob's negotiated count.
    pub fn validate(&self, ctx: &ProtocolContext) -> Result<()> {
        let kind = MessageKind::BobPoints;
        check_batch(kind, ctx, self.batch_id)?;
        check_count(kind, "points", self.points.len(), ctx.peer_count)?;
        check_lengths(kind, &self.points, ctx.point_encoding_len)
    }
}

impl AliceDoublePointsAndFilter {
    /// Checked by bob. The filter payload length is checked when the filter
    /// is rebuilt.
    pub fn validate(&self, ctx: &ProtocolContext) -> Result<()> {
        let kind = MessageKind::AliceDoublePointsAndFilter;
        check_batch(kind, ctx, self.batch_id)?;
        check_count(kind, "doubly-blinded points", self.double_points.len(), ctx.self_count)?;
        check_lengths(kind, &self.double_points, ctx.point_encoding_len)?;
        match ctx.psi_variant {
            PsiVariant::FilterEcdh => {
                if self.filter.is_empty() {
                    return Err(PsiError::ProtocolViolation(format!(
                        "{kind} carries no filter"
                    )));
                }
                check_count(kind, "truncated points", self.truncated_points.len(), 0)
            }
            PsiVariant::Ecdh => {
                if !self.filter.is_empty() {
                    return Err(PsiError::ProtocolViolation(format!(
                        "{kind} carries a filter in the ecdh variant"
                    )));
                }
                check_count(kind, "truncated points", self.truncated_points.len(), ctx.peer_count)?;
                check_lengths(kind, &self.truncated_points, ctx.compare_len)
            }
        }
    }
}

impl BobAlignResult {
    /// Checked by alice: bob cannot match more items than he has.
    pub fn validate(&self, ctx: &ProtocolContext) -> Result<()> {
        let kind = MessageKind::BobAlignResult;
        check_batch(kind, ctx, self.batch_id)?;
        if self.candidates.len() > ctx.peer_count {
            return Err(PsiError::ProtocolViolation(format!(
                "{kind} carries {} candidates, but peer has only {} items",
                self.candidates.len(),
                ctx.peer_count
            )));
        }
        check_lengths(kind, &self.candidates, ctx.point_encoding_len)
    }
}

impl AliceCheck {
    pub fn validate(&self, ctx: &ProtocolContext) -> Result<()> {
        let kind = MessageKind::AliceCheck;
        check_batch(kind, ctx, self.batch_id)?;
        check_count(kind, "wrong ids", self.false_positive_ids.len(), self.wrong_count)?;
        check_lengths(kind, &self.false_positive_ids, ctx.point_encoding_len)
    }
}
