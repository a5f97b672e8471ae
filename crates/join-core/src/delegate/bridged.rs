//! Media-bridged join
//!
//! Answers an incoming leg with a description produced by the media
//! resource, so the application can process the leg's media:
//!
//! 1. leg ANSWERING, hand the leg's received offer to its negotiation port
//!    (or ask for an offer when the request carried none)
//! 2. on the generated description, answer the leg with a 2xx carrying it
//! 3. on the leg's ACK, complete negotiation, mark ANSWERED, link BRIDGE

use tracing::{info, warn};

use super::{unexpected_response, JoinContext, Step, StepError, StepResult};
use crate::errors::{JoinError, Result};
use crate::types::{
    AckRequest, CallState, Direction, HeaderMap, JoinKind, LegId, NegotiationEvent, SignalResponse,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    AwaitingMedia,
    /// 2xx sent, waiting for the leg's ACK
    AwaitingAck,
    Finished,
}

pub(crate) struct MediaBridgedJoin {
    leg: LegId,
    direction: Direction,
    headers: HeaderMap,
    phase: Phase,
}

impl MediaBridgedJoin {
    pub(crate) fn new(leg: LegId, direction: Direction, headers: HeaderMap) -> Self {
        Self {
            leg,
            direction,
            headers,
            phase: Phase::Created,
        }
    }

    pub(crate) fn participants(&self) -> Vec<LegId> {
        vec![self.leg.clone()]
    }

    pub(crate) async fn start(&mut self, ctx: &JoinContext<'_>) -> StepResult {
        let offer = ctx
            .legs
            .with_leg(&self.leg, |l| l.remote_offer.clone())
            .map_err(StepError::raise)?;
        ctx.set_call_state(&self.leg, CallState::Answering)
            .map_err(StepError::raise)?;

        let port = ctx.acquire_port(&self.leg);
        let requested = match &offer {
            Some(offer) => port.request_answer(offer).await,
            None => port.request_offer().await,
        };
        requested.map_err(StepError::raise)?;

        self.phase = Phase::AwaitingMedia;
        info!("Media-bridged join started for {}", self.leg);
        Ok(Step::Pending)
    }

    pub(crate) async fn on_negotiation_event(
        &mut self,
        ctx: &JoinContext<'_>,
        leg: &LegId,
        event: &NegotiationEvent,
    ) -> StepResult {
        if leg != &self.leg || self.phase != Phase::AwaitingMedia {
            warn!("Bridged join ignoring negotiation event on {} while {:?}", leg, self.phase);
            return Ok(Step::Pending);
        }

        match event {
            NegotiationEvent::OfferGenerated(generated)
            | NegotiationEvent::AnswerGenerated(generated) => {
                let mut description = generated.clone();
                if description.content_type.is_empty() {
                    description.content_type = ctx.config.media_content_type.clone();
                }
                ctx.send_response(&self.leg, 200, Some(&description), &self.headers)
                    .await
                    .map_err(StepError::raise)?;
                self.phase = Phase::AwaitingAck;
                Ok(Step::Pending)
            }
            NegotiationEvent::Failed { during, diagnostic } => {
                if let Some(status) = ctx.config.negotiation_failure_status {
                    if let Err(e) = ctx.send_response(&self.leg, status, None, &self.headers).await {
                        warn!("Failed to reject {} after negotiation failure: {}", self.leg, e);
                    }
                }
                Err(StepError::record(JoinError::negotiation(format!(
                    "{:?} generation failed on {}: {}",
                    during, self.leg, diagnostic
                ))))
            }
        }
    }

    pub(crate) async fn on_acknowledgement(
        &mut self,
        ctx: &JoinContext<'_>,
        ack: &AckRequest,
    ) -> StepResult {
        if ack.leg != self.leg || self.phase != Phase::AwaitingAck {
            warn!("Bridged join ignoring acknowledgement on {} while {:?}", ack.leg, self.phase);
            return Ok(Step::Pending);
        }
        self.finish(ctx, ack).await.map_err(StepError::raise)
    }

    async fn finish(&mut self, ctx: &JoinContext<'_>, ack: &AckRequest) -> Result<Step> {
        ctx.set_call_state(&self.leg, CallState::Answered)?;

        let port = ctx.port(&self.leg)?;
        port.complete(ack.body.as_ref()).await?;
        if let Some(body) = &ack.body {
            ctx.legs.with_leg_mut(&self.leg, |l| {
                l.remote_description = Some(body.clone());
                Ok(())
            })?;
        }

        ctx.link_media(&self.leg, self.direction)?;
        ctx.release_port(&self.leg);

        self.phase = Phase::Finished;
        info!("Media-bridged join for {} linked", self.leg);
        Ok(Step::Linked)
    }

    pub(crate) async fn on_signal_response(
        &mut self,
        _ctx: &JoinContext<'_>,
        res: &SignalResponse,
    ) -> StepResult {
        // nothing is requested on the leg, so no response is expected
        unexpected_response(JoinKind::MediaBridged, res, &self.phase)
    }
}
