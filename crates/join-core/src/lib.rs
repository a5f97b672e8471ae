//! # rvoip-join-core
//!
//! Join orchestration for SIP call legs. A *join* connects independently
//! signaled call legs into one media path, either directly between the
//! remote parties or through a media-processing resource, while hiding the
//! multi-message signaling and offer/answer exchange from the application.
//!
//! ## Architecture
//!
//! - [`leg`]: call legs and the registry holding their peer links
//! - [`negotiation`]: per-leg offer/answer ports on the media resource
//! - [`delegate`]: the join state machines (direct peer, media bridged)
//! - [`coordinator`]: the leg -> join routing table and the public entry point
//! - [`adapters`]: traits for the signaling transport and media resource
//!
//! Transport and media collaborators deliver already-parsed events to the
//! [`JoinCoordinator`], which routes them to the join owning the leg. Each
//! join resolves exactly once through its [`Joint`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rvoip_join_core::{
//!     JoinConfig, JoinCoordinator, MediaDescription, MediaResource, SignalResponse,
//!     SignalingTransport,
//! };
//!
//! # async fn example(
//! #     transport: Arc<dyn SignalingTransport>,
//! #     media: Arc<dyn MediaResource>,
//! # ) -> rvoip_join_core::Result<()> {
//! let coordinator = JoinCoordinator::new(JoinConfig::default(), transport, media)?;
//! let alice = coordinator.register_outgoing("sip:alice@example.com")?;
//! let bob = coordinator.register_outgoing("sip:bob@example.com")?;
//!
//! let joint = coordinator.join_direct(&alice, &bob, None, Default::default()).await?;
//!
//! // ... the transport later delivers responses:
//! coordinator
//!     .on_signal_response(SignalResponse::new(alice.clone(), 200).with_body(MediaDescription::sdp("v=0 ...")))
//!     .await?;
//! coordinator
//!     .on_signal_response(SignalResponse::new(bob.clone(), 200).with_body(MediaDescription::sdp("v=0 ...")))
//!     .await?;
//!
//! joint.await?;
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod config;
pub mod coordinator;
pub mod delegate;
pub mod errors;
pub mod events;
pub mod joint;
pub mod leg;
pub mod logging;
pub mod negotiation;
pub mod types;

pub use adapters::{MediaResource, SignalingTransport};
pub use config::JoinConfig;
pub use coordinator::{JoinCoordinator, JoinStats, JoinTable};
pub use delegate::{JoinDelegate, JoinEvent, JoinOutcome};
pub use errors::{JoinError, RejectReason, Result};
pub use events::JoinNotification;
pub use joint::Joint;
pub use leg::{CallLeg, LegRegistry};
pub use logging::{setup_logging, LogFormat, LoggingConfig};
pub use negotiation::{NegotiationPort, PortTable};
pub use types::*;
