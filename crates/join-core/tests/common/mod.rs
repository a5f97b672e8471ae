//! Shared fixtures for join-core integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

use rvoip_join_core::{
    setup_logging, AckRequest, HeaderMap, JoinConfig, JoinCoordinator, JoinError, LegId,
    LoggingConfig, MediaDescription, MediaResource, Result, SignalingTransport,
};

/// A message handed to the mock transport
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Request {
        leg: LegId,
        target: String,
        body: Option<MediaDescription>,
        headers: HeaderMap,
    },
    Response {
        leg: LegId,
        status: u16,
        body: Option<MediaDescription>,
    },
    Ack(AckRequest),
}

/// Transport that records everything and fails on demand
#[derive(Default)]
pub struct MockTransport {
    sent: Mutex<Vec<Sent>>,
    fail_ack_on: Mutex<HashSet<LegId>>,
    fail_request_on: Mutex<HashSet<LegId>>,
    fail_responses: Mutex<bool>,
}

impl MockTransport {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    pub fn requests(&self) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|s| matches!(s, Sent::Request { .. }))
            .collect()
    }

    pub fn responses(&self) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|s| matches!(s, Sent::Response { .. }))
            .collect()
    }

    pub fn acks(&self) -> Vec<AckRequest> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Ack(ack) => Some(ack),
                _ => None,
            })
            .collect()
    }

    pub fn ack_for(&self, leg: &LegId) -> Option<AckRequest> {
        self.acks().into_iter().find(|a| &a.leg == leg)
    }

    pub fn fail_ack_on(&self, leg: &LegId) {
        self.fail_ack_on.lock().insert(leg.clone());
    }

    pub fn fail_request_on(&self, leg: &LegId) {
        self.fail_request_on.lock().insert(leg.clone());
    }

    pub fn fail_responses(&self) {
        *self.fail_responses.lock() = true;
    }
}

#[async_trait]
impl SignalingTransport for MockTransport {
    async fn send_request(
        &self,
        leg: &LegId,
        target: &str,
        body: Option<&MediaDescription>,
        headers: &HeaderMap,
    ) -> Result<()> {
        if self.fail_request_on.lock().contains(leg) {
            return Err(JoinError::transport(format!("request on {} refused", leg)));
        }
        self.sent.lock().push(Sent::Request {
            leg: leg.clone(),
            target: target.to_string(),
            body: body.cloned(),
            headers: headers.clone(),
        });
        Ok(())
    }

    async fn send_response(
        &self,
        leg: &LegId,
        status: u16,
        body: Option<&MediaDescription>,
        _headers: &HeaderMap,
    ) -> Result<()> {
        if *self.fail_responses.lock() {
            return Err(JoinError::transport("connection reset"));
        }
        self.sent.lock().push(Sent::Response {
            leg: leg.clone(),
            status,
            body: body.cloned(),
        });
        Ok(())
    }

    async fn send_ack(&self, ack: &AckRequest) -> Result<()> {
        if self.fail_ack_on.lock().contains(&ack.leg) {
            return Err(JoinError::transport(format!("ACK on {} not sent", ack.leg)));
        }
        self.sent.lock().push(Sent::Ack(ack.clone()));
        Ok(())
    }
}

/// A call made on the mock media resource
#[derive(Debug, Clone, PartialEq)]
pub enum MediaCall {
    GenerateOffer(LegId),
    GenerateAnswer(LegId, MediaDescription),
    ProcessAnswer(LegId, MediaDescription),
    Disengage(LegId),
}

/// Media resource that records requests; events are injected by the test
#[derive(Default)]
pub struct MockMedia {
    calls: Mutex<Vec<MediaCall>>,
    fail_process_answer: Mutex<bool>,
    fail_disengage: Mutex<bool>,
}

impl MockMedia {
    pub fn calls(&self) -> Vec<MediaCall> {
        self.calls.lock().clone()
    }

    pub fn fail_process_answer(&self) {
        *self.fail_process_answer.lock() = true;
    }

    pub fn fail_disengage(&self) {
        *self.fail_disengage.lock() = true;
    }
}

#[async_trait]
impl MediaResource for MockMedia {
    async fn generate_offer(&self, leg: &LegId) -> Result<()> {
        self.calls.lock().push(MediaCall::GenerateOffer(leg.clone()));
        Ok(())
    }

    async fn generate_answer(&self, leg: &LegId, remote_offer: &MediaDescription) -> Result<()> {
        self.calls
            .lock()
            .push(MediaCall::GenerateAnswer(leg.clone(), remote_offer.clone()));
        Ok(())
    }

    async fn process_answer(&self, leg: &LegId, remote_answer: &MediaDescription) -> Result<()> {
        if *self.fail_process_answer.lock() {
            return Err(JoinError::negotiation("media server rejected the answer"));
        }
        self.calls
            .lock()
            .push(MediaCall::ProcessAnswer(leg.clone(), remote_answer.clone()));
        Ok(())
    }

    async fn disengage(&self, leg: &LegId) -> Result<()> {
        if *self.fail_disengage.lock() {
            return Err(JoinError::transport("media server unreachable"));
        }
        self.calls.lock().push(MediaCall::Disengage(leg.clone()));
        Ok(())
    }
}

pub struct Harness {
    pub coordinator: Arc<JoinCoordinator>,
    pub transport: Arc<MockTransport>,
    pub media: Arc<MockMedia>,
}

pub fn harness() -> Harness {
    harness_with(JoinConfig::default())
}

pub fn harness_with(config: JoinConfig) -> Harness {
    init_tracing();
    let transport = Arc::new(MockTransport::default());
    let media = Arc::new(MockMedia::default());
    let coordinator = Arc::new(
        JoinCoordinator::new(config, transport.clone(), media.clone()).unwrap(),
    );
    Harness {
        coordinator,
        transport,
        media,
    }
}

pub fn sdp(tag: &str) -> MediaDescription {
    MediaDescription::sdp(format!("v=0\r\no={} 1 1 IN IP4 192.0.2.1\r\n", tag))
}

pub fn init_tracing() {
    // every test calls this; only the first install in a binary succeeds
    let _ = setup_logging(&LoggingConfig::new("debug").for_tests());
}
