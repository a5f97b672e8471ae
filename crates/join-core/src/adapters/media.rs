//! Media resource adapter

use async_trait::async_trait;

use crate::errors::Result;
use crate::types::{LegId, MediaDescription};

/// Offer/answer capability of the media-processing resource.
///
/// `generate_offer` and `generate_answer` complete asynchronously with one
/// [`NegotiationEvent`](crate::types::NegotiationEvent) for the leg, routed
/// through [`JoinCoordinator::on_negotiation_event`](crate::coordinator::JoinCoordinator::on_negotiation_event).
/// An `Err` from these calls means the request could not be issued at all.
#[async_trait]
pub trait MediaResource: Send + Sync {
    async fn generate_offer(&self, leg: &LegId) -> Result<()>;

    async fn generate_answer(&self, leg: &LegId, remote_offer: &MediaDescription) -> Result<()>;

    /// Apply the remote answer to the offer generated earlier for `leg`
    async fn process_answer(&self, leg: &LegId, remote_answer: &MediaDescription) -> Result<()>;

    /// Detach `leg` from the media resource
    async fn disengage(&self, leg: &LegId) -> Result<()>;
}
