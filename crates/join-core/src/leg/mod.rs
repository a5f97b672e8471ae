//! Call legs
//!
//! A [`CallLeg`] holds the signaling state of one remote party. The
//! [`LegRegistry`] owns every leg plus the symmetric peer-link index, so
//! linked legs never hold references to each other.

mod call_leg;
mod registry;

pub use call_leg::CallLeg;
pub use registry::LegRegistry;
