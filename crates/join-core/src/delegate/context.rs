//! What a choreography step may touch
//!
//! A [`JoinContext`] exposes the call-leg contract (send request/response,
//! build and send acknowledgements, state changes, linking, failing) over
//! the registry and the collaborators owned by the coordinator.

use std::sync::Arc;
use tracing::{debug, warn};

use super::JoinDelegate;
use crate::adapters::{MediaResource, SignalingTransport};
use crate::config::JoinConfig;
use crate::errors::{JoinError, Result};
use crate::leg::LegRegistry;
use crate::negotiation::{NegotiationPort, PortTable};
use crate::types::{
    AckRequest, CallState, Direction, HeaderMap, JoinType, LegId, MediaDescription, PeerLink,
    PeerRef, SignalResponse,
};

/// Receives the terminal outcome of a join, exactly once per join
pub(crate) trait CompletionSink: Send + Sync {
    fn join_resolved(&self, delegate: &JoinDelegate, outcome: &Result<()>);
}

pub(crate) struct JoinContext<'a> {
    pub(crate) legs: &'a LegRegistry,
    pub(crate) ports: &'a PortTable,
    pub(crate) transport: &'a dyn SignalingTransport,
    pub(crate) media: &'a Arc<dyn MediaResource>,
    pub(crate) config: &'a JoinConfig,
    pub(crate) sink: &'a dyn CompletionSink,
}

impl<'a> JoinContext<'a> {
    pub(crate) async fn send_request(
        &self,
        leg: &LegId,
        body: Option<&MediaDescription>,
        headers: &HeaderMap,
    ) -> Result<()> {
        let target = self.legs.with_leg(leg, |l| l.remote_target.clone())?;
        debug!(
            "Sending request on {} to {} ({} bytes of media)",
            leg,
            target,
            body.map_or(0, |b| b.len())
        );
        self.transport.send_request(leg, &target, body, headers).await
    }

    pub(crate) async fn send_response(
        &self,
        leg: &LegId,
        status: u16,
        body: Option<&MediaDescription>,
        headers: &HeaderMap,
    ) -> Result<()> {
        if let Some(body) = body {
            self.legs.with_leg_mut(leg, |l| {
                l.local_description = Some(body.clone());
                Ok(())
            })?;
        }
        debug!("Sending {} response on {}", status, leg);
        self.transport.send_response(leg, status, body, headers).await
    }

    pub(crate) fn record_final_response(&self, response: &SignalResponse) -> Result<()> {
        self.legs.with_leg_mut(&response.leg, |l| {
            l.record_final_response(response);
            Ok(())
        })
    }

    pub(crate) fn build_ack(&self, leg: &LegId, body: Option<MediaDescription>) -> Result<AckRequest> {
        self.legs.with_leg_mut(leg, |l| l.build_ack(body))
    }

    pub(crate) async fn send_ack(&self, ack: &AckRequest) -> Result<()> {
        debug!("Sending ACK on {}", ack.leg);
        self.transport.send_ack(ack).await
    }

    pub(crate) fn set_call_state(&self, leg: &LegId, state: CallState) -> Result<()> {
        self.legs.set_call_state(leg, state).map(|_| ())
    }

    pub(crate) fn call_state(&self, leg: &LegId) -> Result<CallState> {
        self.legs.state(leg)
    }

    pub(crate) fn link_peer(
        &self,
        a: &LegId,
        b: &LegId,
        join_type: JoinType,
        direction: Direction,
    ) -> Result<()> {
        self.legs.link_peer(a, b, join_type, direction)
    }

    pub(crate) fn link_media(&self, leg: &LegId, direction: Direction) -> Result<()> {
        self.legs.link_media(leg, direction)
    }

    pub(crate) fn acquire_port(&self, leg: &LegId) -> Arc<NegotiationPort> {
        self.ports.acquire(leg, self.media)
    }

    pub(crate) fn port(&self, leg: &LegId) -> Result<Arc<NegotiationPort>> {
        self.ports
            .get(leg)
            .ok_or_else(|| JoinError::invariant(format!("No negotiation port bound to {}", leg)))
    }

    pub(crate) fn release_port(&self, leg: &LegId) {
        self.ports.release(leg);
    }

    /// Detach `leg` from the media resource if it is bridged there
    pub(crate) async fn disengage_media(&self, leg: &LegId) -> Result<()> {
        if !self.legs.is_media_bridged(leg) {
            return Ok(());
        }
        debug!("Disengaging {} from the media resource", leg);
        self.media.disengage(leg).await?;
        self.legs.unlink(leg, &PeerRef::MediaResource);
        self.ports.release(leg);
        Ok(())
    }

    /// Force `leg` to FAILED and tear down whatever it was linked to
    pub(crate) async fn fail_leg(&self, leg: &LegId) {
        match self.legs.fail(leg) {
            Ok(removed) => self.release_links(leg, &removed).await,
            Err(e) => warn!("Could not fail leg {}: {}", leg, e),
        }
    }

    /// Undo the media side of links already removed from the registry
    pub(crate) async fn release_links(&self, leg: &LegId, removed: &[PeerLink]) {
        if removed.iter().any(|l| l.peer == PeerRef::MediaResource) {
            if let Err(e) = self.media.disengage(leg).await {
                warn!("Failed to disengage {} from the media resource: {}", leg, e);
            }
        }
        self.ports.release(leg);
    }
}
