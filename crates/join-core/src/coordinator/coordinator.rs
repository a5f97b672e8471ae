use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::JoinTable;
use crate::adapters::{MediaResource, SignalingTransport};
use crate::config::JoinConfig;
use crate::delegate::{
    Choreography, CompletionSink, DirectPeerJoin, JoinContext, JoinDelegate, JoinEvent,
    MediaBridgedJoin,
};
use crate::errors::{JoinError, Result};
use crate::events::JoinNotification;
use crate::joint::Joint;
use crate::leg::{CallLeg, LegRegistry};
use crate::negotiation::PortTable;
use crate::types::{
    AckRequest, CallState, Direction, HeaderMap, JoinId, LegDirection, LegId, MediaDescription,
    NegotiationEvent, PeerLink, PeerRef, SignalResponse,
};

/// Counters over the coordinator's lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinStats {
    pub started: u64,
    pub linked: u64,
    pub failed: u64,
    /// Joins currently in flight
    pub active: usize,
}

/// Entry point for starting joins and for delivering transport and media
/// events.
///
/// Create one per process (or per test) and share it behind an `Arc`.
/// Events for a leg that no join owns are dropped with a debug log.
pub struct JoinCoordinator {
    config: JoinConfig,
    legs: LegRegistry,
    ports: PortTable,
    table: JoinTable,
    transport: Arc<dyn SignalingTransport>,
    media: Arc<dyn MediaResource>,
    notifications: broadcast::Sender<JoinNotification>,
    stats: Mutex<JoinStats>,
}

impl JoinCoordinator {
    pub fn new(
        config: JoinConfig,
        transport: Arc<dyn SignalingTransport>,
        media: Arc<dyn MediaResource>,
    ) -> Result<Self> {
        config.validate()?;
        let (notifications, _) = broadcast::channel(config.notification_capacity);
        Ok(Self {
            config,
            legs: LegRegistry::new(),
            ports: PortTable::new(),
            table: JoinTable::new(),
            transport,
            media,
            notifications,
            stats: Mutex::new(JoinStats::default()),
        })
    }

    fn context(&self) -> JoinContext<'_> {
        JoinContext {
            legs: &self.legs,
            ports: &self.ports,
            transport: self.transport.as_ref(),
            media: &self.media,
            config: &self.config,
            sink: self,
        }
    }

    pub fn config(&self) -> &JoinConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JoinNotification> {
        self.notifications.subscribe()
    }

    fn notify(&self, notification: JoinNotification) {
        // no subscribers is fine
        let _ = self.notifications.send(notification);
    }

    pub fn stats(&self) -> JoinStats {
        let mut stats = self.stats.lock().clone();
        stats.active = self.table.len();
        stats
    }

    // ---- legs ----

    /// Register a leg created by an inbound request carrying `offer`
    pub fn register_incoming(
        &self,
        remote_target: impl Into<String>,
        offer: Option<MediaDescription>,
    ) -> Result<LegId> {
        self.legs.insert(CallLeg::incoming(remote_target, offer))
    }

    /// Register a leg for a call we will place
    pub fn register_outgoing(&self, remote_target: impl Into<String>) -> Result<LegId> {
        self.legs.insert(CallLeg::outgoing(remote_target))
    }

    pub fn register_leg(&self, leg: CallLeg) -> Result<LegId> {
        self.legs.insert(leg)
    }

    /// Forget a leg. Refused while a join owns it or it is still linked.
    pub fn remove_leg(&self, leg: &LegId) -> Result<CallLeg> {
        if self.table.owner_id(leg).is_some() {
            return Err(JoinError::LegBusy(leg.clone()));
        }
        let removed = self.legs.remove(leg)?;
        self.ports.release(leg);
        Ok(removed)
    }

    pub fn leg(&self, leg: &LegId) -> Option<CallLeg> {
        self.legs.get(leg)
    }

    pub fn leg_state(&self, leg: &LegId) -> Result<CallState> {
        self.legs.state(leg)
    }

    pub fn peers(&self, leg: &LegId) -> Vec<PeerLink> {
        self.legs.peers(leg)
    }

    /// The join currently owning `leg`, if any
    pub fn active_join(&self, leg: &LegId) -> Option<JoinId> {
        self.table.owner_id(leg)
    }

    /// An in-flight join. Resolved joins are no longer tracked.
    pub fn join(&self, id: JoinId) -> Option<Arc<JoinDelegate>> {
        self.table.get(id)
    }

    fn check_joinable(&self, leg: &LegId, expected: LegDirection) -> Result<()> {
        let (direction, state) = self.legs.with_leg(leg, |l| (l.direction, l.state()))?;
        if state.is_terminal() {
            return Err(JoinError::LegDisconnected(leg.clone()));
        }
        if direction != expected {
            return Err(JoinError::invariant(format!(
                "Leg {} is {:?}, this join needs an {:?} leg",
                leg, direction, expected
            )));
        }
        Ok(())
    }

    // ---- joins ----

    /// Peer two outgoing legs directly. `first` is signaled first and its
    /// description becomes the offer sent to `second`.
    pub async fn join_direct(
        &self,
        first: &LegId,
        second: &LegId,
        direction: Option<Direction>,
        headers: HeaderMap,
    ) -> Result<Joint> {
        if first == second {
            return Err(JoinError::invariant(format!("Cannot join leg {} to itself", first)));
        }
        self.check_joinable(first, LegDirection::Outgoing)?;
        self.check_joinable(second, LegDirection::Outgoing)?;

        let direction = direction.unwrap_or(self.config.default_direction);
        self.launch(Choreography::DirectPeer(DirectPeerJoin::new(
            first.clone(),
            second.clone(),
            direction,
            headers,
        )))
        .await
    }

    /// Answer an incoming leg through the media resource
    pub async fn join_bridged(
        &self,
        leg: &LegId,
        direction: Option<Direction>,
        headers: HeaderMap,
    ) -> Result<Joint> {
        self.check_joinable(leg, LegDirection::Incoming)?;

        let direction = direction.unwrap_or(self.config.default_direction);
        self.launch(Choreography::MediaBridged(MediaBridgedJoin::new(
            leg.clone(),
            direction,
            headers,
        )))
        .await
    }

    async fn launch(&self, choreography: Choreography) -> Result<Joint> {
        let (delegate, joint) = JoinDelegate::new(choreography);
        self.table.claim(delegate.clone())?;

        self.stats.lock().started += 1;
        info!(
            "Starting {} join {} for {:?}",
            delegate.kind(),
            delegate.id(),
            delegate.participants()
        );
        self.notify(JoinNotification::Started {
            join_id: delegate.id(),
            kind: delegate.kind(),
            participants: delegate.participants().to_vec(),
        });

        delegate.start(&self.context()).await?;
        Ok(joint)
    }

    /// Remove an established link. A media bridge is disengaged first.
    pub async fn unjoin(&self, leg: &LegId, peer: &PeerRef) -> Result<()> {
        if self.table.owner_id(leg).is_some() {
            return Err(JoinError::LegBusy(leg.clone()));
        }
        if !self.legs.is_linked_to(leg, peer) {
            return Err(JoinError::invariant(format!("Leg {} is not linked to {}", leg, peer)));
        }
        if *peer == PeerRef::MediaResource {
            self.media
                .disengage(leg)
                .await
                .map_err(|e| JoinError::Disengage(e.to_string()))?;
        }
        self.legs.unlink(leg, peer);
        info!("Unjoined {} from {}", leg, peer);
        self.notify(JoinNotification::Unjoined {
            leg: leg.clone(),
            peer: peer.clone(),
        });
        Ok(())
    }

    // ---- inbound events ----

    fn route(&self, leg: &LegId) -> Option<Arc<JoinDelegate>> {
        let owner = self.table.owner(leg);
        if owner.is_none() {
            debug!("No join owns {}, event not routed", leg);
        }
        owner
    }

    /// Deliver a provisional or final response received on a leg
    pub async fn on_signal_response(&self, response: SignalResponse) -> Result<()> {
        match self.route(&response.leg) {
            Some(delegate) => {
                delegate
                    .handle(&self.context(), JoinEvent::SignalResponse(response))
                    .await
            }
            None => Ok(()),
        }
    }

    /// Deliver an acknowledgement received on a leg
    pub async fn on_acknowledgement(&self, ack: AckRequest) -> Result<()> {
        match self.route(&ack.leg) {
            Some(delegate) => {
                delegate
                    .handle(&self.context(), JoinEvent::Acknowledgement(ack))
                    .await
            }
            None => Ok(()),
        }
    }

    /// Deliver a negotiation event for the port bound to `leg`
    pub async fn on_negotiation_event(&self, leg: &LegId, event: NegotiationEvent) -> Result<()> {
        let Some(port) = self.ports.get(leg) else {
            warn!("Negotiation event for {} with no bound port: {:?}", leg, event);
            return Ok(());
        };
        if !port.on_event(&event) {
            warn!("Unsolicited negotiation event for {}: {:?}", leg, event);
            return Ok(());
        }
        match self.route(leg) {
            Some(delegate) => {
                delegate
                    .handle(
                        &self.context(),
                        JoinEvent::Negotiation {
                            leg: leg.clone(),
                            event,
                        },
                    )
                    .await
            }
            None => Ok(()),
        }
    }

    /// The leg's dialog ended. Its links are torn down and a join owning it
    /// fails.
    pub async fn on_leg_disconnected(&self, leg: &LegId) -> Result<()> {
        let removed = self.legs.disconnect(leg)?;
        info!("Leg {} disconnected", leg);

        let ctx = self.context();
        ctx.release_links(leg, &removed).await;
        for link in removed {
            self.notify(JoinNotification::Unjoined {
                leg: leg.clone(),
                peer: link.peer,
            });
        }

        match self.table.owner(leg) {
            Some(delegate) => {
                delegate
                    .handle(&ctx, JoinEvent::LegTerminated { leg: leg.clone() })
                    .await
            }
            None => Ok(()),
        }
    }
}

impl CompletionSink for JoinCoordinator {
    fn join_resolved(&self, delegate: &JoinDelegate, outcome: &Result<()>) {
        self.table.release(delegate.id());

        let notification = {
            let mut stats = self.stats.lock();
            match outcome {
                Ok(()) => {
                    stats.linked += 1;
                    info!("Join {} ({}) linked", delegate.id(), delegate.kind());
                    JoinNotification::Linked {
                        join_id: delegate.id(),
                        kind: delegate.kind(),
                        participants: delegate.participants().to_vec(),
                    }
                }
                Err(e) => {
                    stats.failed += 1;
                    warn!("Join {} ({}) failed: {}", delegate.id(), delegate.kind(), e);
                    JoinNotification::Failed {
                        join_id: delegate.id(),
                        kind: delegate.kind(),
                        participants: delegate.participants().to_vec(),
                        error: e.clone(),
                    }
                }
            }
        };
        self.notify(notification);
    }
}

impl std::fmt::Debug for JoinCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinCoordinator")
            .field("config", &self.config)
            .field("legs", &self.legs.len())
            .field("table", &self.table)
            .finish()
    }
}
