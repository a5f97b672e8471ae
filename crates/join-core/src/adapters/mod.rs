//! Adapters to the collaborators a join drives
//!
//! The signaling transport and the media-processing resource live outside
//! this crate. Both are reached through narrow async traits; their results
//! come back later as events routed by the
//! [`JoinCoordinator`](crate::coordinator::JoinCoordinator).

pub mod media;
pub mod transport;

pub use media::MediaResource;
pub use transport::SignalingTransport;
