//! Join coordination
//!
//! The [`JoinCoordinator`] owns the legs, the negotiation ports and the
//! [`JoinTable`] that maps each engaged leg to the one join that owns it.
//! Inbound transport and media events enter here and are routed by leg.

mod coordinator;
mod table;

pub use coordinator::{JoinCoordinator, JoinStats};
pub use table::JoinTable;
