use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::adapters::MediaResource;
use crate::errors::{JoinError, Result};
use crate::types::{LegId, MediaDescription, NegotiationEvent, NegotiationKind};

#[derive(Debug, Default)]
struct PortState {
    /// Outstanding request, at most one
    pending: Option<NegotiationKind>,
    /// Kind of the most recent request, kept after it resolves
    last_request: Option<NegotiationKind>,
    /// Last locally generated description
    local_description: Option<MediaDescription>,
}

/// Offer/answer handle on the media resource for one call leg
pub struct NegotiationPort {
    leg: LegId,
    media: Arc<dyn MediaResource>,
    state: Mutex<PortState>,
}

impl NegotiationPort {
    pub fn new(leg: LegId, media: Arc<dyn MediaResource>) -> Self {
        Self {
            leg,
            media,
            state: Mutex::new(PortState::default()),
        }
    }

    pub fn leg(&self) -> &LegId {
        &self.leg
    }

    pub fn is_pending(&self) -> bool {
        self.state.lock().pending.is_some()
    }

    pub fn pending(&self) -> Option<NegotiationKind> {
        self.state.lock().pending
    }

    pub fn local_description(&self) -> Option<MediaDescription> {
        self.state.lock().local_description.clone()
    }

    /// Ask the media resource for an offer
    pub async fn request_offer(&self) -> Result<()> {
        self.begin(NegotiationKind::Offer)?;
        let result = self.media.generate_offer(&self.leg).await;
        if result.is_err() {
            self.abort();
        }
        result
    }

    /// Ask the media resource to answer `remote_offer`
    pub async fn request_answer(&self, remote_offer: &MediaDescription) -> Result<()> {
        self.begin(NegotiationKind::Answer)?;
        let result = self.media.generate_answer(&self.leg, remote_offer).await;
        if result.is_err() {
            self.abort();
        }
        result
    }

    fn begin(&self, kind: NegotiationKind) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(outstanding) = state.pending {
            warn!(
                "Rejecting {:?} request on {}: {:?} still outstanding",
                kind, self.leg, outstanding
            );
            return Err(JoinError::NegotiationPending(self.leg.clone()));
        }
        state.pending = Some(kind);
        state.last_request = Some(kind);
        debug!("Requested {:?} from media resource for {}", kind, self.leg);
        Ok(())
    }

    fn abort(&self) {
        self.state.lock().pending = None;
    }

    /// Resolve the outstanding request with `event`. Returns false when no
    /// request was outstanding; the event is then left for the caller to
    /// judge and the port is not modified.
    pub fn on_event(&self, event: &NegotiationEvent) -> bool {
        let mut state = self.state.lock();
        if state.pending.take().is_none() {
            return false;
        }
        if let Some(description) = event.description() {
            state.local_description = Some(description.clone());
        }
        true
    }

    /// Finish negotiation with the description carried by the peer's
    /// acknowledgement. An offer we generated must be answered there.
    pub async fn complete(&self, remote: Option<&MediaDescription>) -> Result<()> {
        let last_request = self.state.lock().last_request;
        match (remote, last_request) {
            (Some(answer), _) => self.media.process_answer(&self.leg, answer).await,
            (None, Some(NegotiationKind::Offer)) => Err(JoinError::negotiation(format!(
                "Acknowledgement on {} carried no answer to the generated offer",
                self.leg
            ))),
            (None, _) => Ok(()),
        }
    }
}

impl std::fmt::Debug for NegotiationPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NegotiationPort")
            .field("leg", &self.leg)
            .field("state", &*self.state.lock())
            .finish()
    }
}

/// Ports currently bound to legs
#[derive(Debug, Default)]
pub struct PortTable {
    ports: DashMap<LegId, Arc<NegotiationPort>>,
}

impl PortTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The port bound to `leg`, created on first use
    pub fn acquire(&self, leg: &LegId, media: &Arc<dyn MediaResource>) -> Arc<NegotiationPort> {
        self.ports
            .entry(leg.clone())
            .or_insert_with(|| Arc::new(NegotiationPort::new(leg.clone(), media.clone())))
            .clone()
    }

    pub fn get(&self, leg: &LegId) -> Option<Arc<NegotiationPort>> {
        self.ports.get(leg).map(|p| p.clone())
    }

    pub fn release(&self, leg: &LegId) -> Option<Arc<NegotiationPort>> {
        let released = self.ports.remove(leg).map(|(_, port)| port);
        if released.is_some() {
            debug!("Released negotiation port for {}", leg);
        }
        released
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;

    #[derive(Default)]
    struct CountingMedia {
        calls: SyncMutex<Vec<String>>,
    }

    #[async_trait]
    impl MediaResource for CountingMedia {
        async fn generate_offer(&self, leg: &LegId) -> Result<()> {
            self.calls.lock().push(format!("offer {}", leg));
            Ok(())
        }

        async fn generate_answer(&self, leg: &LegId, _remote_offer: &MediaDescription) -> Result<()> {
            self.calls.lock().push(format!("answer {}", leg));
            Ok(())
        }

        async fn process_answer(&self, leg: &LegId, _remote_answer: &MediaDescription) -> Result<()> {
            self.calls.lock().push(format!("process {}", leg));
            Ok(())
        }

        async fn disengage(&self, leg: &LegId) -> Result<()> {
            self.calls.lock().push(format!("disengage {}", leg));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_second_request_rejected() {
        let media = Arc::new(CountingMedia::default());
        let leg = LegId::from("leg-1");
        let port = NegotiationPort::new(leg.clone(), media.clone());

        port.request_offer().await.unwrap();
        assert!(port.on_event(&NegotiationEvent::OfferGenerated(MediaDescription::sdp("v=0 one"))));
        port.request_offer().await.unwrap();

        let err = port.request_answer(&MediaDescription::sdp("v=0 remote")).await.unwrap_err();
        assert_eq!(err, JoinError::NegotiationPending(leg));
        assert_eq!(port.pending(), Some(NegotiationKind::Offer));
        assert_eq!(port.local_description(), Some(MediaDescription::sdp("v=0 one")));
        assert_eq!(media.calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_unsolicited_event_is_not_applied() {
        let media: Arc<dyn MediaResource> = Arc::new(CountingMedia::default());
        let port = NegotiationPort::new(LegId::from("leg-1"), media);

        assert!(!port.on_event(&NegotiationEvent::AnswerGenerated(MediaDescription::sdp("v=0"))));
        assert_eq!(port.local_description(), None);
    }

    #[tokio::test]
    async fn test_complete_requires_answer_to_offer() {
        let media = Arc::new(CountingMedia::default());
        let port = NegotiationPort::new(LegId::from("leg-1"), media.clone());

        port.request_offer().await.unwrap();
        port.on_event(&NegotiationEvent::OfferGenerated(MediaDescription::sdp("v=0 ms")));

        assert!(matches!(port.complete(None).await, Err(JoinError::Negotiation(_))));
        port.complete(Some(&MediaDescription::sdp("v=0 answer"))).await.unwrap();
        assert_eq!(media.calls.lock().last().unwrap(), "process leg-1");
    }

    #[test]
    fn test_port_table_binding() {
        let media: Arc<dyn MediaResource> = Arc::new(CountingMedia::default());
        let table = PortTable::new();
        let leg = LegId::from("leg-1");

        let first = table.acquire(&leg, &media);
        let second = table.acquire(&leg, &media);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(table.len(), 1);

        assert!(table.release(&leg).is_some());
        assert!(table.get(&leg).is_none());
    }
}
