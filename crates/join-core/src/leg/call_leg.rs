use std::time::Instant;
use tracing::debug;

use crate::errors::{JoinError, Result};
use crate::types::{AckRequest, CallState, LegDirection, LegId, MediaDescription, SignalResponse};

/// Signaling state of a single call leg
#[derive(Debug, Clone)]
pub struct CallLeg {
    pub id: LegId,
    pub direction: LegDirection,
    /// Where requests on this leg are sent
    pub remote_target: String,
    /// Offer carried by the request that created an incoming leg
    pub remote_offer: Option<MediaDescription>,
    pub local_description: Option<MediaDescription>,
    pub remote_description: Option<MediaDescription>,
    pub created_at: Instant,
    state: CallState,
    /// Final success response awaiting acknowledgement
    pending_final: Option<SignalResponse>,
}

impl CallLeg {
    pub fn incoming(remote_target: impl Into<String>, offer: Option<MediaDescription>) -> Self {
        Self::new(LegDirection::Incoming, remote_target.into(), offer)
    }

    pub fn outgoing(remote_target: impl Into<String>) -> Self {
        Self::new(LegDirection::Outgoing, remote_target.into(), None)
    }

    fn new(direction: LegDirection, remote_target: String, remote_offer: Option<MediaDescription>) -> Self {
        Self {
            id: LegId::new(),
            direction,
            remote_target,
            remote_offer,
            local_description: None,
            remote_description: None,
            created_at: Instant::now(),
            state: CallState::Initialized,
            pending_final: None,
        }
    }

    /// Use a caller-supplied identity, e.g. the dialog key of the transport
    pub fn with_id(mut self, id: LegId) -> Self {
        self.id = id;
        self
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    /// Move to `new_state`. Terminal states refuse any change.
    pub fn set_call_state(&mut self, new_state: CallState) -> Result<CallState> {
        let old = self.state;
        if old.is_terminal() && old != new_state {
            return Err(JoinError::InvalidTransition {
                leg: self.id.clone(),
                from: old,
                to: new_state,
            });
        }
        if old != new_state {
            debug!("Leg {} state {} -> {}", self.id, old, new_state);
        }
        self.state = new_state;
        Ok(old)
    }

    /// Force FAILED. Legs already in a terminal state keep it.
    /// Returns whether the state changed.
    pub fn fail(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        debug!("Leg {} state {} -> FAILED", self.id, self.state);
        self.state = CallState::Failed;
        self.pending_final = None;
        true
    }

    /// Mark DISCONNECTED unless the leg already reached a terminal state
    pub fn disconnect(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = CallState::Disconnected;
        self.pending_final = None;
        true
    }

    /// Remember a final success response so it can be acknowledged later
    pub fn record_final_response(&mut self, response: &SignalResponse) {
        if let Some(body) = &response.body {
            self.remote_description = Some(body.clone());
        }
        self.pending_final = Some(response.clone());
    }

    /// Build the acknowledgement for the recorded final response. The
    /// response is consumed: each final response is acknowledged once.
    pub fn build_ack(&mut self, body: Option<MediaDescription>) -> Result<AckRequest> {
        let response = self.pending_final.take().ok_or_else(|| {
            JoinError::invariant(format!("No final response to acknowledge on {}", self.id))
        })?;
        if !response.is_success() {
            return Err(JoinError::invariant(format!(
                "Cannot acknowledge status {} on {} with a media description",
                response.status, self.id
            )));
        }
        if let Some(body) = &body {
            self.local_description = Some(body.clone());
        }
        Ok(AckRequest {
            leg: self.id.clone(),
            body,
            headers: Default::default(),
        })
    }
}
