//! Error types for join-core
//!
//! Every failure that can collapse a join is a [`JoinError`]. The type is
//! `Clone` because a failed join stores its error as the operation outcome
//! and, for transport faults during finalization, also returns the same
//! value to whoever delivered the triggering event.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::types::{CallState, LegId};

/// Caller-visible classification of a rejecting final response
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    Busy,
    Timeout,
    Declined,
    Other,
}

impl RejectReason {
    /// Classify a final error status (486/600 busy, 408 timeout, 603 decline)
    pub fn from_status(status: u16) -> Self {
        match status {
            486 | 600 => RejectReason::Busy,
            408 => RejectReason::Timeout,
            603 => RejectReason::Declined,
            _ => RejectReason::Other,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::Busy => "busy",
            RejectReason::Timeout => "timeout",
            RejectReason::Declined => "declined",
            RejectReason::Other => "other",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JoinError {
    #[error("Rejected with status {status} ({reason})")]
    Rejected { status: u16, reason: RejectReason },

    #[error("Media negotiation failed: {0}")]
    Negotiation(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Call leg not found: {0}")]
    LegNotFound(LegId),

    #[error("Call leg {0} is already engaged in a join")]
    LegBusy(LegId),

    #[error("Invalid state transition on {leg}: {from} -> {to}")]
    InvalidTransition {
        leg: LegId,
        from: CallState,
        to: CallState,
    },

    #[error("Negotiation request already outstanding on {0}")]
    NegotiationPending(LegId),

    #[error("Call leg {0} disconnected")]
    LegDisconnected(LegId),

    #[error("Failed to disengage media bridge: {0}")]
    Disengage(String),

    #[error("Join was dropped before it resolved")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl JoinError {
    /// Rejection classified from a final error status
    pub fn rejected(status: u16) -> Self {
        JoinError::Rejected {
            status,
            reason: RejectReason::from_status(status),
        }
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        JoinError::Transport(msg.into())
    }

    pub fn negotiation(msg: impl Into<String>) -> Self {
        JoinError::Negotiation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        JoinError::InvariantViolation(msg.into())
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, JoinError::Rejected { .. })
    }

    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            JoinError::Rejected { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, JoinError>;
