//! Direct peer join
//!
//! Connects two outgoing legs so their media flows directly between the
//! remote parties:
//!
//! ```text
//! leg1                       engine                        leg2
//!  |<---- request (no media) --|                             |
//!  |----- 1xx ---------------->|  leg1 ANSWERING             |
//!  |----- 2xx (D1) ----------->|---- request (offer D1) ---->|
//!  |                           |<--- 2xx (D2) ---------------|
//!  |<---- ACK (D2) ------------|---- ACK (D1) -------------->|
//!  |                           |  link DIRECT, resolve       |
//! ```

use tracing::{debug, info, warn};

use super::{unexpected_response, JoinContext, Step, StepError, StepResult};
use crate::errors::{JoinError, Result};
use crate::types::{
    AckRequest, CallState, Direction, HeaderMap, JoinKind, JoinType, LegId, MediaDescription,
    NegotiationEvent, SignalResponse,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    /// Request sent on leg 1, waiting for its answer
    AwaitingFirst,
    /// Leg 1's description forwarded to leg 2
    AwaitingSecond,
    Finished,
}

pub(crate) struct DirectPeerJoin {
    first: LegId,
    second: LegId,
    direction: Direction,
    headers: HeaderMap,
    /// Leg 1's description, relayed to leg 2 as its offer
    first_description: Option<MediaDescription>,
    phase: Phase,
}

impl DirectPeerJoin {
    pub(crate) fn new(first: LegId, second: LegId, direction: Direction, headers: HeaderMap) -> Self {
        Self {
            first,
            second,
            direction,
            headers,
            first_description: None,
            phase: Phase::Created,
        }
    }

    pub(crate) fn participants(&self) -> Vec<LegId> {
        vec![self.first.clone(), self.second.clone()]
    }

    pub(crate) async fn start(&mut self, ctx: &JoinContext<'_>) -> StepResult {
        // a leg cannot be bridged and directly peered at the same time
        if ctx.config.disengage_before_direct {
            ctx.disengage_media(&self.second)
                .await
                .map_err(|e| StepError::raise(JoinError::Disengage(e.to_string())))?;
        }

        ctx.send_request(&self.first, None, &self.headers)
            .await
            .map_err(StepError::raise)?;
        self.phase = Phase::AwaitingFirst;
        info!("Direct join {} -> {} started", self.first, self.second);
        Ok(Step::Pending)
    }

    pub(crate) async fn on_signal_response(
        &mut self,
        ctx: &JoinContext<'_>,
        res: &SignalResponse,
    ) -> StepResult {
        let participant = res.leg == self.first || res.leg == self.second;
        if participant && res.is_error() {
            // either leg may reject at any step, including leg 2 answering early
            return Err(StepError::record(JoinError::rejected(res.status)));
        }

        if res.leg == self.first {
            self.on_first_response(ctx, res).await
        } else if res.leg == self.second {
            self.on_second_response(ctx, res).await
        } else {
            warn!("Direct join ignoring response for non-participant {}", res.leg);
            Ok(Step::Pending)
        }
    }

    async fn on_first_response(&mut self, ctx: &JoinContext<'_>, res: &SignalResponse) -> StepResult {
        if self.phase != Phase::AwaitingFirst {
            return unexpected_response(JoinKind::DirectPeer, res, &self.phase);
        }

        if res.is_provisional() {
            ctx.set_call_state(&self.first, CallState::Answering)?;
            return Ok(Step::Pending);
        }

        let description = res.body.clone().ok_or_else(|| {
            JoinError::negotiation(format!(
                "Success response on {} carried no media description",
                self.first
            ))
        })?;
        ctx.record_final_response(res)?;
        ctx.send_request(&self.second, Some(&description), &self.headers)
            .await
            .map_err(StepError::raise)?;

        self.first_description = Some(description);
        self.phase = Phase::AwaitingSecond;
        Ok(Step::Pending)
    }

    async fn on_second_response(&mut self, ctx: &JoinContext<'_>, res: &SignalResponse) -> StepResult {
        if self.phase != Phase::AwaitingSecond {
            return unexpected_response(JoinKind::DirectPeer, res, &self.phase);
        }

        if res.is_provisional() {
            debug!("Direct join: {} progressing ({})", self.second, res.status);
            return Ok(Step::Pending);
        }

        self.finish(ctx, res).await.map_err(StepError::raise)
    }

    /// Acknowledge both legs with each other's description and link them
    async fn finish(&mut self, ctx: &JoinContext<'_>, res: &SignalResponse) -> Result<Step> {
        ctx.record_final_response(res)?;

        let first_ack: AckRequest = ctx.build_ack(&self.first, res.body.clone())?;
        let second_ack: AckRequest = ctx.build_ack(&self.second, self.first_description.take())?;
        ctx.send_ack(&first_ack).await?;
        ctx.send_ack(&second_ack).await?;

        ctx.set_call_state(&self.first, CallState::Answered)?;
        if !ctx.call_state(&self.second)?.is_established() {
            ctx.set_call_state(&self.second, CallState::Answered)?;
        }
        ctx.link_peer(&self.first, &self.second, JoinType::Direct, self.direction)?;

        self.phase = Phase::Finished;
        info!("Direct join {} <-> {} linked", self.first, self.second);
        Ok(Step::Linked)
    }

    pub(crate) async fn on_acknowledgement(
        &mut self,
        _ctx: &JoinContext<'_>,
        ack: &AckRequest,
    ) -> StepResult {
        warn!("Direct join ignoring acknowledgement on {} while {:?}", ack.leg, self.phase);
        Ok(Step::Pending)
    }

    pub(crate) async fn on_negotiation_event(
        &mut self,
        _ctx: &JoinContext<'_>,
        leg: &LegId,
        event: &NegotiationEvent,
    ) -> StepResult {
        warn!("Direct join ignoring negotiation event {:?} on {}", event, leg);
        Ok(Step::Pending)
    }
}
