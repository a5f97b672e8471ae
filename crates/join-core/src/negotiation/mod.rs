//! Negotiation ports
//!
//! A [`NegotiationPort`] is the per-leg handle on the media resource's
//! offer/answer capability. Ports hold no reference to the join that uses
//! them; their events are routed by leg identity.

mod port;

pub use port::{NegotiationPort, PortTable};
