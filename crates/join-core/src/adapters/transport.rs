//! Signaling transport adapter

use async_trait::async_trait;

use crate::errors::Result;
use crate::types::{AckRequest, HeaderMap, LegId, MediaDescription};

/// Outbound side of the signaling stack.
///
/// Each call only hands the message to the transport. Responses to a
/// request arrive later through
/// [`JoinCoordinator::on_signal_response`](crate::coordinator::JoinCoordinator::on_signal_response).
/// Implementations must not deliver those events from inside the send call.
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    /// Send a dialog-creating or dialog-refreshing request on `leg` toward `target`
    async fn send_request(
        &self,
        leg: &LegId,
        target: &str,
        body: Option<&MediaDescription>,
        headers: &HeaderMap,
    ) -> Result<()>;

    /// Reply to the inbound request that created `leg`
    async fn send_response(
        &self,
        leg: &LegId,
        status: u16,
        body: Option<&MediaDescription>,
        headers: &HeaderMap,
    ) -> Result<()>;

    /// Acknowledge the final response previously received on `ack.leg`
    async fn send_ack(&self, ack: &AckRequest) -> Result<()>;
}
