//! Caller-side handle on a join in flight

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot::{self, error::TryRecvError};

use crate::errors::{JoinError, Result};
use crate::types::JoinId;

/// Resolves once, when the join links its legs or fails.
///
/// Awaiting a `Joint` yields the outcome. If the engine is dropped before
/// the join resolves, the outcome is [`JoinError::Cancelled`].
#[derive(Debug)]
pub struct Joint {
    id: JoinId,
    rx: oneshot::Receiver<Result<()>>,
}

impl Joint {
    pub(crate) fn new(id: JoinId, rx: oneshot::Receiver<Result<()>>) -> Self {
        Self { id, rx }
    }

    pub fn id(&self) -> JoinId {
        self.id
    }

    /// Non-blocking check. Returns `None` while the join is in flight; the
    /// outcome can be taken once.
    pub fn try_outcome(&mut self) -> Option<Result<()>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(JoinError::Cancelled)),
        }
    }
}

impl Future for Joint {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(JoinError::Cancelled)))
    }
}
