//! Join delegates
//!
//! A [`JoinDelegate`] owns exactly one join operation. It consumes the
//! events routed to it for its participant legs, drives a choreography
//! chosen by topology, and resolves once: legs linked, or every
//! participant failed.
//!
//! ## Choreographies
//!
//! - **Direct peer** ([`DirectPeerJoin`]): two outgoing legs exchange media
//!   descriptions directly, bypassing the media resource.
//! - **Media bridged** ([`MediaBridgedJoin`]): an incoming leg's offer is
//!   negotiated through the media resource before it is answered.
//!
//! Both share the engine in this module: one exclusion region per join,
//! failure collapse (fail every participant, then report), and
//! exactly-once completion toward the coordinator.
//!
//! ## Faults
//!
//! A step that fails returns a [`StepError`]. Rejections and negotiation
//! failures are only recorded as the join outcome. Transport faults are
//! recorded *and* returned to whoever delivered the triggering event.

mod bridged;
mod context;
mod direct;

pub(crate) use bridged::MediaBridgedJoin;
pub(crate) use context::{CompletionSink, JoinContext};
pub(crate) use direct::DirectPeerJoin;

use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::errors::{JoinError, Result};
use crate::joint::Joint;
use crate::types::{AckRequest, JoinId, JoinKind, LegId, NegotiationEvent, SignalResponse};

/// An event routed to a join
#[derive(Debug, Clone)]
pub enum JoinEvent {
    SignalResponse(SignalResponse),
    Acknowledgement(AckRequest),
    Negotiation { leg: LegId, event: NegotiationEvent },
    /// A participant disconnected or failed outside the join
    LegTerminated { leg: LegId },
}

impl JoinEvent {
    pub fn leg(&self) -> &LegId {
        match self {
            JoinEvent::SignalResponse(res) => &res.leg,
            JoinEvent::Acknowledgement(ack) => &ack.leg,
            JoinEvent::Negotiation { leg, .. } => leg,
            JoinEvent::LegTerminated { leg } => leg,
        }
    }
}

/// Terminal outcome slot of a join
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Unset,
    Linked,
    Failed(JoinError),
}

impl JoinOutcome {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, JoinOutcome::Unset)
    }
}

/// Progress reported by a choreography step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Pending,
    Linked,
}

/// Failure of a choreography step
#[derive(Debug, Clone)]
pub(crate) struct StepError {
    pub(crate) error: JoinError,
    /// Also return the error to the caller that delivered the event
    pub(crate) raise: bool,
}

impl StepError {
    pub(crate) fn record(error: JoinError) -> Self {
        Self { error, raise: false }
    }

    pub(crate) fn raise(error: JoinError) -> Self {
        Self { error, raise: true }
    }
}

impl From<JoinError> for StepError {
    fn from(error: JoinError) -> Self {
        StepError::record(error)
    }
}

pub(crate) type StepResult = std::result::Result<Step, StepError>;

/// Default policy for a response the current step does not expect:
/// provisional responses are ignored, final ones fail the join.
pub(crate) fn unexpected_response(
    kind: JoinKind,
    response: &SignalResponse,
    phase: &dyn Debug,
) -> StepResult {
    if response.is_provisional() {
        warn!(
            "{} join ignoring {} on {} while {:?}",
            kind, response.status, response.leg, phase
        );
        return Ok(Step::Pending);
    }
    error!(
        "{} join got unexpected final {} on {} while {:?}",
        kind, response.status, response.leg, phase
    );
    Err(StepError::record(JoinError::invariant(format!(
        "Unexpected final response {} on {} while {:?}",
        response.status, response.leg, phase
    ))))
}

/// The closed set of join topologies
pub(crate) enum Choreography {
    DirectPeer(DirectPeerJoin),
    MediaBridged(MediaBridgedJoin),
}

impl Choreography {
    fn kind(&self) -> JoinKind {
        match self {
            Choreography::DirectPeer(_) => JoinKind::DirectPeer,
            Choreography::MediaBridged(_) => JoinKind::MediaBridged,
        }
    }

    fn participants(&self) -> Vec<LegId> {
        match self {
            Choreography::DirectPeer(join) => join.participants(),
            Choreography::MediaBridged(join) => join.participants(),
        }
    }

    async fn start(&mut self, ctx: &JoinContext<'_>) -> StepResult {
        match self {
            Choreography::DirectPeer(join) => join.start(ctx).await,
            Choreography::MediaBridged(join) => join.start(ctx).await,
        }
    }

    async fn on_signal_response(&mut self, ctx: &JoinContext<'_>, res: &SignalResponse) -> StepResult {
        match self {
            Choreography::DirectPeer(join) => join.on_signal_response(ctx, res).await,
            Choreography::MediaBridged(join) => join.on_signal_response(ctx, res).await,
        }
    }

    async fn on_acknowledgement(&mut self, ctx: &JoinContext<'_>, ack: &AckRequest) -> StepResult {
        match self {
            Choreography::DirectPeer(join) => join.on_acknowledgement(ctx, ack).await,
            Choreography::MediaBridged(join) => join.on_acknowledgement(ctx, ack).await,
        }
    }

    async fn on_negotiation_event(
        &mut self,
        ctx: &JoinContext<'_>,
        leg: &LegId,
        event: &NegotiationEvent,
    ) -> StepResult {
        match self {
            Choreography::DirectPeer(join) => join.on_negotiation_event(ctx, leg, event).await,
            Choreography::MediaBridged(join) => join.on_negotiation_event(ctx, leg, event).await,
        }
    }
}

/// State machine driving one join operation
pub struct JoinDelegate {
    id: JoinId,
    kind: JoinKind,
    /// Ordered: the first leg is the initiator
    participants: Vec<LegId>,
    /// Operation-wide exclusion region, held for the whole of each step
    choreography: tokio::sync::Mutex<Choreography>,
    outcome: Mutex<JoinOutcome>,
    completion: Mutex<Option<oneshot::Sender<Result<()>>>>,
}

impl JoinDelegate {
    pub(crate) fn new(choreography: Choreography) -> (Arc<Self>, Joint) {
        let id = JoinId::new();
        let (tx, rx) = oneshot::channel();
        let delegate = Arc::new(Self {
            id,
            kind: choreography.kind(),
            participants: choreography.participants(),
            choreography: tokio::sync::Mutex::new(choreography),
            outcome: Mutex::new(JoinOutcome::Unset),
            completion: Mutex::new(Some(tx)),
        });
        (delegate, Joint::new(id, rx))
    }

    pub fn id(&self) -> JoinId {
        self.id
    }

    pub fn kind(&self) -> JoinKind {
        self.kind
    }

    pub fn participants(&self) -> &[LegId] {
        &self.participants
    }

    pub fn outcome(&self) -> JoinOutcome {
        self.outcome.lock().clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.outcome.lock().is_resolved()
    }

    pub(crate) async fn start(&self, ctx: &JoinContext<'_>) -> Result<()> {
        let mut choreography = self.choreography.lock().await;
        debug!("Join {} ({}) starting", self.id, self.kind);
        let step = choreography.start(ctx).await;
        self.settle(ctx, step).await
    }

    /// Advance the choreography with one routed event. Returns `Err` only
    /// for faults that must be surfaced to the deliverer.
    pub(crate) async fn handle(&self, ctx: &JoinContext<'_>, event: JoinEvent) -> Result<()> {
        let mut choreography = self.choreography.lock().await;
        if self.is_resolved() {
            debug!("Join {} already resolved, dropping event for {}", self.id, event.leg());
            return Ok(());
        }
        debug!("Join {} handling {:?}", self.id, event);

        let step = match &event {
            JoinEvent::SignalResponse(res) => choreography.on_signal_response(ctx, res).await,
            JoinEvent::Acknowledgement(ack) => choreography.on_acknowledgement(ctx, ack).await,
            JoinEvent::Negotiation { leg, event } => {
                choreography.on_negotiation_event(ctx, leg, event).await
            }
            JoinEvent::LegTerminated { leg } => {
                Err(StepError::record(JoinError::LegDisconnected(leg.clone())))
            }
        };
        self.settle(ctx, step).await
    }

    async fn settle(&self, ctx: &JoinContext<'_>, step: StepResult) -> Result<()> {
        match step {
            Ok(Step::Pending) => Ok(()),
            Ok(Step::Linked) => {
                self.done(ctx.sink, Ok(()));
                Ok(())
            }
            Err(StepError { error, raise }) => {
                warn!("Join {} ({}) failed: {}", self.id, self.kind, error);
                for leg in &self.participants {
                    ctx.fail_leg(leg).await;
                }
                self.done(ctx.sink, Err(error.clone()));
                if raise {
                    Err(error)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Resolve the join. Only the first call has any effect.
    pub(crate) fn done(&self, sink: &dyn CompletionSink, result: Result<()>) {
        let Some(tx) = self.completion.lock().take() else {
            if cfg!(debug_assertions) {
                error!(
                    "Invariant violation: join {} resolved twice (ignored {:?})",
                    self.id, result
                );
            }
            return;
        };

        *self.outcome.lock() = match &result {
            Ok(()) => JoinOutcome::Linked,
            Err(e) => JoinOutcome::Failed(e.clone()),
        };
        sink.join_resolved(self, &result);

        if tx.send(result).is_err() {
            debug!("Joint for {} was dropped before completion", self.id);
        }
    }
}

impl std::fmt::Debug for JoinDelegate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinDelegate")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("participants", &self.participants)
            .field("outcome", &*self.outcome.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MediaResource, SignalingTransport};
    use crate::config::JoinConfig;
    use crate::leg::{CallLeg, LegRegistry};
    use crate::negotiation::PortTable;
    use crate::types::{CallState, Direction, HeaderMap, MediaDescription, PeerRef};
    use async_trait::async_trait;

    #[derive(Default)]
    struct RecordingTransport {
        requests: Mutex<Vec<LegId>>,
    }

    #[async_trait]
    impl SignalingTransport for RecordingTransport {
        async fn send_request(
            &self,
            leg: &LegId,
            _target: &str,
            _body: Option<&MediaDescription>,
            _headers: &HeaderMap,
        ) -> Result<()> {
            self.requests.lock().push(leg.clone());
            Ok(())
        }

        async fn send_response(
            &self,
            _leg: &LegId,
            _status: u16,
            _body: Option<&MediaDescription>,
            _headers: &HeaderMap,
        ) -> Result<()> {
            Ok(())
        }

        async fn send_ack(&self, _ack: &AckRequest) -> Result<()> {
            Ok(())
        }
    }

    struct BridgeMedia {
        reachable: bool,
        disengaged: Mutex<Vec<LegId>>,
    }

    #[async_trait]
    impl MediaResource for BridgeMedia {
        async fn generate_offer(&self, _leg: &LegId) -> Result<()> {
            Ok(())
        }

        async fn generate_answer(&self, _leg: &LegId, _remote_offer: &MediaDescription) -> Result<()> {
            Ok(())
        }

        async fn process_answer(&self, _leg: &LegId, _remote_answer: &MediaDescription) -> Result<()> {
            Ok(())
        }

        async fn disengage(&self, leg: &LegId) -> Result<()> {
            if !self.reachable {
                return Err(JoinError::transport("media server unreachable"));
            }
            self.disengaged.lock().push(leg.clone());
            Ok(())
        }
    }

    struct Fixture {
        legs: LegRegistry,
        ports: PortTable,
        transport: RecordingTransport,
        media: Arc<BridgeMedia>,
        config: JoinConfig,
        sink: RecordingSink,
    }

    impl Fixture {
        /// Two outgoing legs, the second currently bridged to the media resource
        fn new(reachable: bool) -> Self {
            let legs = LegRegistry::new();
            for id in ["leg-a", "leg-b"] {
                let leg = CallLeg::outgoing(format!("sip:{}@example.com", id)).with_id(LegId::from(id));
                legs.insert(leg).unwrap();
            }
            legs.link_media(&LegId::from("leg-b"), Direction::Duplex).unwrap();
            Self {
                legs,
                ports: PortTable::new(),
                transport: RecordingTransport::default(),
                media: Arc::new(BridgeMedia {
                    reachable,
                    disengaged: Mutex::new(Vec::new()),
                }),
                config: JoinConfig::default(),
                sink: RecordingSink::default(),
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        resolved: Mutex<Vec<(JoinId, Result<()>)>>,
    }

    impl CompletionSink for RecordingSink {
        fn join_resolved(&self, delegate: &JoinDelegate, outcome: &Result<()>) {
            self.resolved.lock().push((delegate.id(), outcome.clone()));
        }
    }

    fn direct_delegate() -> (Arc<JoinDelegate>, Joint) {
        JoinDelegate::new(Choreography::DirectPeer(DirectPeerJoin::new(
            LegId::from("leg-a"),
            LegId::from("leg-b"),
            Direction::Duplex,
            HeaderMap::new(),
        )))
    }

    #[tokio::test]
    async fn test_done_is_idempotent() {
        let sink = RecordingSink::default();
        let (delegate, joint) = direct_delegate();

        delegate.done(&sink, Err(JoinError::rejected(486)));
        delegate.done(&sink, Ok(()));

        assert_eq!(delegate.outcome(), JoinOutcome::Failed(JoinError::rejected(486)));
        assert_eq!(sink.resolved.lock().len(), 1);
        assert_eq!(joint.await, Err(JoinError::rejected(486)));
    }

    #[test]
    fn test_participant_order() {
        let (delegate, _joint) = direct_delegate();
        assert_eq!(delegate.kind(), JoinKind::DirectPeer);
        assert_eq!(
            delegate.participants(),
            &[LegId::from("leg-a"), LegId::from("leg-b")]
        );
        assert!(!delegate.is_resolved());
    }

    #[tokio::test]
    async fn test_direct_join_disengages_bridged_second_leg() {
        let fx = Fixture::new(true);
        let media: Arc<dyn MediaResource> = fx.media.clone();
        let ctx = JoinContext {
            legs: &fx.legs,
            ports: &fx.ports,
            transport: &fx.transport,
            media: &media,
            config: &fx.config,
            sink: &fx.sink,
        };
        let (delegate, mut joint) = direct_delegate();

        delegate.start(&ctx).await.unwrap();

        assert_eq!(*fx.media.disengaged.lock(), vec![LegId::from("leg-b")]);
        assert!(!fx.legs.is_linked_to(&LegId::from("leg-b"), &PeerRef::MediaResource));
        assert_eq!(*fx.transport.requests.lock(), vec![LegId::from("leg-a")]);
        assert!(joint.try_outcome().is_none());
    }

    #[tokio::test]
    async fn test_disengage_failure_fails_direct_join() {
        let fx = Fixture::new(false);
        let media: Arc<dyn MediaResource> = fx.media.clone();
        let ctx = JoinContext {
            legs: &fx.legs,
            ports: &fx.ports,
            transport: &fx.transport,
            media: &media,
            config: &fx.config,
            sink: &fx.sink,
        };
        let (delegate, joint) = direct_delegate();

        let err = delegate.start(&ctx).await.unwrap_err();

        assert!(matches!(err, JoinError::Disengage(_)));
        assert!(fx.transport.requests.lock().is_empty());
        assert_eq!(fx.legs.state(&LegId::from("leg-a")).unwrap(), CallState::Failed);
        assert_eq!(fx.legs.state(&LegId::from("leg-b")).unwrap(), CallState::Failed);
        assert!(fx.legs.peers(&LegId::from("leg-b")).is_empty());
        assert_eq!(fx.sink.resolved.lock().len(), 1);
        assert_eq!(joint.await, Err(err));
    }
}
