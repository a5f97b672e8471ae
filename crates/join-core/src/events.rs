//! Notifications published by the coordinator

use crate::errors::JoinError;
use crate::types::{JoinId, JoinKind, LegId, PeerRef};

/// Lifecycle notification for subscribers of
/// [`JoinCoordinator::subscribe`](crate::coordinator::JoinCoordinator::subscribe)
#[derive(Debug, Clone, PartialEq)]
pub enum JoinNotification {
    Started {
        join_id: JoinId,
        kind: JoinKind,
        participants: Vec<LegId>,
    },
    Linked {
        join_id: JoinId,
        kind: JoinKind,
        participants: Vec<LegId>,
    },
    Failed {
        join_id: JoinId,
        kind: JoinKind,
        participants: Vec<LegId>,
        error: JoinError,
    },
    /// A link was removed by `unjoin` or by a leg disconnecting
    Unjoined { leg: LegId, peer: PeerRef },
}

impl JoinNotification {
    pub fn join_id(&self) -> Option<JoinId> {
        match self {
            JoinNotification::Started { join_id, .. }
            | JoinNotification::Linked { join_id, .. }
            | JoinNotification::Failed { join_id, .. } => Some(*join_id),
            JoinNotification::Unjoined { .. } => None,
        }
    }
}
