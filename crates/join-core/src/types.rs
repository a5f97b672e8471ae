//! Core types for join-core
//!
//! Identifiers, call and join states, and the already-parsed signaling and
//! negotiation events that the transport and media collaborators deliver.
//! Headers and media descriptions are opaque here: they are copied and
//! forwarded, never interpreted.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Content type used for SDP media descriptions
pub const SDP_CONTENT_TYPE: &str = "application/sdp";

/// Call leg identifier (stable dialog/session key)
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct LegId(pub String);

impl LegId {
    pub fn new() -> Self {
        Self(format!("leg-{}", Uuid::new_v4()))
    }
}

impl Default for LegId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LegId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for LegId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Join operation identifier. One delegate is one operation.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct JoinId(pub Uuid);

impl JoinId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JoinId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JoinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "join-{}", self.0)
    }
}

/// Signaling progress of a call leg, independent of any join state
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum CallState {
    Initialized,
    /// Final answer pending (early media may flow)
    Answering,
    Answered,
    Connected,
    Disconnected,
    Failed,
}

impl CallState {
    /// DISCONNECTED and FAILED refuse any further transition
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Disconnected | CallState::Failed)
    }

    /// Whether the leg has reached a terminal-success signaling state
    pub fn is_established(&self) -> bool {
        matches!(self, CallState::Answered | CallState::Connected)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallState::Initialized => "INITIALIZED",
            CallState::Answering => "ANSWERING",
            CallState::Answered => "ANSWERED",
            CallState::Connected => "CONNECTED",
            CallState::Disconnected => "DISCONNECTED",
            CallState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Which side created the leg
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum LegDirection {
    /// Created by an inbound request
    Incoming,
    /// Created by a request we sent
    Outgoing,
}

/// How two parties are joined
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    /// Peer media path, the media resource is bypassed
    Direct,
    /// Media path mediated by the media resource
    Bridge,
}

/// Media flow direction of a link, seen from the leg that records it
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Send,
    Recv,
    Duplex,
}

impl Direction {
    /// The same link seen from the other end
    pub fn reverse(self) -> Self {
        match self {
            Direction::Send => Direction::Recv,
            Direction::Recv => Direction::Send,
            Direction::Duplex => Direction::Duplex,
        }
    }
}

impl Default for Direction {
    fn default() -> Self {
        Direction::Duplex
    }
}

/// Join topology, used for logging and notifications
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum JoinKind {
    /// Two outgoing legs peered directly
    DirectPeer,
    /// An incoming leg negotiated through the media resource
    MediaBridged,
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinKind::DirectPeer => f.write_str("direct-peer"),
            JoinKind::MediaBridged => f.write_str("media-bridged"),
        }
    }
}

/// Opaque header map copied onto outbound requests
pub type HeaderMap = HashMap<String, String>;

/// Opaque media description blob with a MIME-style content type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDescription {
    pub content_type: String,
    pub body: Bytes,
}

impl MediaDescription {
    pub fn new(content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    /// Description with the `application/sdp` content type
    pub fn sdp(body: impl Into<Bytes>) -> Self {
        Self::new(SDP_CONTENT_TYPE, body)
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// A response received on a call leg, already parsed by the transport
#[derive(Debug, Clone, PartialEq)]
pub struct SignalResponse {
    pub leg: LegId,
    pub status: u16,
    pub body: Option<MediaDescription>,
    pub headers: HeaderMap,
}

impl SignalResponse {
    pub fn new(leg: LegId, status: u16) -> Self {
        Self {
            leg,
            status,
            body: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn with_body(mut self, body: MediaDescription) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// 1xx
    pub fn is_provisional(&self) -> bool {
        (100..200).contains(&self.status)
    }

    /// 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 3xx-6xx
    pub fn is_error(&self) -> bool {
        self.status >= 300
    }

    pub fn is_final(&self) -> bool {
        self.status >= 200
    }
}

/// Acknowledgement of a final response. Built by a leg when sending, and
/// delivered by the transport when one is received.
#[derive(Debug, Clone, PartialEq)]
pub struct AckRequest {
    pub leg: LegId,
    pub body: Option<MediaDescription>,
    pub headers: HeaderMap,
}

impl AckRequest {
    pub fn new(leg: LegId) -> Self {
        Self {
            leg,
            body: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn with_body(mut self, body: MediaDescription) -> Self {
        self.body = Some(body);
        self
    }
}

/// Which offer/answer request a negotiation event resolves
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum NegotiationKind {
    Offer,
    Answer,
}

/// Event emitted by the media resource for one negotiation port
#[derive(Debug, Clone, PartialEq)]
pub enum NegotiationEvent {
    OfferGenerated(MediaDescription),
    AnswerGenerated(MediaDescription),
    Failed {
        during: NegotiationKind,
        diagnostic: String,
    },
}

impl NegotiationEvent {
    /// The generated description, if the event is a success
    pub fn description(&self) -> Option<&MediaDescription> {
        match self {
            NegotiationEvent::OfferGenerated(d) | NegotiationEvent::AnswerGenerated(d) => Some(d),
            NegotiationEvent::Failed { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.description().is_some()
    }
}

/// The far end of a link recorded on a leg
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum PeerRef {
    Leg(LegId),
    MediaResource,
}

impl fmt::Display for PeerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerRef::Leg(id) => write!(f, "{}", id),
            PeerRef::MediaResource => f.write_str("media-resource"),
        }
    }
}

/// An established link as recorded on one leg
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerLink {
    pub peer: PeerRef,
    pub join_type: JoinType,
    pub direction: Direction,
}
