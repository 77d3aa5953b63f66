use super::*;
use assert_matches::assert_matches;

use crate::broker::LoopbackHub;
use crate::message::MessageKind;
use crate::teleport::TeleportResult;
use crate::test_utils::{eventually, position_on, settings, FakeActor, RecordingBroker};

struct Plumbing {
    broker: Arc<RecordingBroker>,
    correlator: Arc<Correlator>,
    channel: String,
}

/// A correlator for server "alpha" with "Steve" online, wired to a broker
/// that records instead of delivering.
fn plumbing() -> Plumbing {
    let settings = Arc::new(settings("alpha"));
    let channel = settings.channel();
    let broker = Arc::new(RecordingBroker::default());
    let local = LocalActors::new();
    local.join(FakeActor::stationary("Steve", "alpha"));
    let roster = Arc::new(Roster::new(settings.clone(), broker.clone(), local.clone()));
    let correlator = Arc::new(Correlator::new(settings, broker.clone(), local, roster));
    Plumbing {
        broker,
        correlator,
        channel,
    }
}

fn outbound() -> Message {
    Message::request(
        MessageKind::PositionRequest,
        "Steve",
        "Alex",
        "test",
        Payload::Empty,
    )
}

fn inbound() -> Message {
    Message::request(
        MessageKind::PositionRequest,
        "Alex",
        "Steve",
        "test",
        Payload::Empty,
    )
}

fn encoded(message: &Message) -> Bytes {
    Frame::Envelope(message.clone()).encode().unwrap()
}

fn replies(broker: &RecordingBroker) -> Vec<Message> {
    broker
        .frames()
        .into_iter()
        .filter_map(|frame| match frame {
            Frame::Envelope(message) if message.relay == Relay::Reply => Some(message),
            _ => None,
        })
        .collect()
}

struct ScriptedHandler {
    calls: Mutex<usize>,
    fail: bool,
    payload: Payload,
}

impl ScriptedHandler {
    fn answering(payload: Payload) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(0),
            fail: false,
            payload,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(0),
            fail: true,
            payload: Payload::Empty,
        })
    }

    fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl EnvelopeHandler for ScriptedHandler {
    async fn handle(&self, _target: SharedActor, _message: &Message) -> Result<Payload, SendError> {
        *self.calls.lock() += 1;
        if self.fail {
            return Err(SendError::Timeout(Duration::from_millis(1)));
        }
        Ok(self.payload.clone())
    }
}

#[test_log::test(tokio::test)]
async fn reply_resolves_the_pending_request() {
    let p = plumbing();
    let request = outbound();
    let reply = request
        .clone()
        .into_reply(Payload::Position(position_on("beta")));

    let (answered, _) = tokio::join!(
        p.correlator.send(request),
        p.correlator.on_frame(&p.channel, encoded(&reply))
    );

    let answered = answered.unwrap();
    assert_eq!(answered.id, reply.id);
    assert_eq!(answered.payload, reply.payload);
    assert_eq!(p.correlator.pending_len(), 0);
}

#[test_log::test(tokio::test)]
async fn unmatched_reply_is_dropped() {
    let p = plumbing();
    let reply = outbound().into_reply(Payload::Empty);

    p.correlator.on_frame(&p.channel, encoded(&reply)).await;

    assert_eq!(p.correlator.pending_len(), 0);
    assert!(p.broker.frames().is_empty());
}

#[test_log::test(tokio::test)]
async fn timeout_clears_the_pending_entry() {
    let p = plumbing();

    let err = p
        .correlator
        .send_with_deadline(outbound(), Duration::from_millis(30))
        .await
        .unwrap_err();

    assert_matches!(err, SendError::Timeout(_));
    assert_eq!(p.correlator.pending_len(), 0);
}

#[test_log::test(tokio::test)]
async fn publish_failure_clears_the_pending_entry() {
    let p = plumbing();
    p.broker.fail_publishes();

    let err = p.correlator.send(outbound()).await.unwrap_err();

    assert_matches!(err, SendError::NotSent(_));
    assert_eq!(p.correlator.pending_len(), 0);
}

#[test_log::test(tokio::test)]
async fn replies_resolve_out_of_order() {
    let p = plumbing();
    let first = outbound();
    let second = outbound();
    let first_reply = first
        .clone()
        .into_reply(Payload::TeleportResult(TeleportResult::CompletedLocally));
    let second_reply = second
        .clone()
        .into_reply(Payload::TeleportResult(TeleportResult::Cancelled));

    let (first_answer, second_answer, _) = tokio::join!(
        p.correlator.send(first),
        p.correlator.send(second),
        async {
            p.correlator
                .on_frame(&p.channel, encoded(&second_reply))
                .await;
            p.correlator
                .on_frame(&p.channel, encoded(&first_reply))
                .await;
        }
    );

    assert_eq!(first_answer.unwrap().payload, first_reply.payload);
    assert_eq!(second_answer.unwrap().payload, second_reply.payload);
    assert_eq!(p.correlator.pending_len(), 0);
}

/// Broker that answers every request inside the publish call itself, the
/// tightest race a reply can run against the pending table.
#[derive(Default)]
struct EchoBroker {
    correlator: Mutex<Option<Arc<Correlator>>>,
}

#[async_trait]
impl Broker for EchoBroker {
    async fn publish(&self, channel: &str, frame: Bytes) -> Result<(), TransportError> {
        let Some(correlator) = self.correlator.lock().clone() else {
            return Ok(());
        };
        if let Ok(Frame::Envelope(message)) = Frame::decode(&frame) {
            if message.relay == Relay::Message {
                let reply = Frame::Envelope(message.into_reply(Payload::Empty));
                correlator.on_frame(channel, reply.encode().unwrap()).await;
            }
        }
        Ok(())
    }
}

#[test_log::test(tokio::test)]
async fn reply_delivered_during_publish_is_not_lost() {
    let settings = Arc::new(settings("alpha"));
    let broker = Arc::new(EchoBroker::default());
    let local = LocalActors::new();
    local.join(FakeActor::stationary("Steve", "alpha"));
    let roster = Arc::new(Roster::new(settings.clone(), broker.clone(), local.clone()));
    let correlator = Arc::new(Correlator::new(settings, broker.clone(), local, roster));
    *broker.correlator.lock() = Some(correlator.clone());

    let reply = correlator.send(outbound()).await.unwrap();

    assert_eq!(reply.relay, Relay::Reply);
    assert_eq!(correlator.pending_len(), 0);
}

#[test_log::test(tokio::test)]
async fn envelopes_from_another_cluster_are_ignored() {
    let p = plumbing();
    let handler = ScriptedHandler::answering(Payload::Empty);
    p.correlator.bind_handler(handler.clone());

    let mut request = inbound();
    request.cluster_id = "other".to_string();
    p.correlator.on_frame(&p.channel, encoded(&request)).await;

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(handler.calls(), 0);
    assert!(p.broker.frames().is_empty());
}

#[test_log::test(tokio::test)]
async fn envelopes_for_absent_actors_are_ignored() {
    let p = plumbing();
    let handler = ScriptedHandler::answering(Payload::Empty);
    p.correlator.bind_handler(handler.clone());

    let mut request = inbound();
    request.target = "Nobody".to_string();
    p.correlator.on_frame(&p.channel, encoded(&request)).await;

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(handler.calls(), 0);
    assert!(p.broker.frames().is_empty());
}

#[test_log::test(tokio::test)]
async fn requests_are_answered_with_the_handler_payload() {
    let p = plumbing();
    let handler = ScriptedHandler::answering(Payload::Position(position_on("alpha")));
    p.correlator.bind_handler(handler.clone());

    let request = inbound();
    p.correlator.on_frame(&p.channel, encoded(&request)).await;

    eventually(|| !replies(&p.broker).is_empty()).await;
    let reply = replies(&p.broker).remove(0);
    assert_eq!(reply.id, request.id);
    assert_eq!(reply.sender, "Steve");
    assert_eq!(reply.target, "Alex");
    assert_eq!(reply.payload, Payload::Position(position_on("alpha")));
    assert_eq!(handler.calls(), 1);
}

#[test_log::test(tokio::test)]
async fn handler_failure_answers_empty() {
    let p = plumbing();
    p.correlator.bind_handler(ScriptedHandler::failing());

    p.correlator.on_frame(&p.channel, encoded(&inbound())).await;

    eventually(|| !replies(&p.broker).is_empty()).await;
    assert_eq!(replies(&p.broker)[0].payload, Payload::Empty);
}

#[test_log::test(tokio::test)]
async fn unbound_handler_answers_empty() {
    let p = plumbing();

    p.correlator.on_frame(&p.channel, encoded(&inbound())).await;

    eventually(|| !replies(&p.broker).is_empty()).await;
    assert_eq!(replies(&p.broker)[0].payload, Payload::Empty);
}

#[test_log::test(tokio::test)]
async fn foreign_channel_and_garbage_frames_are_ignored() {
    let p = plumbing();
    let handler = ScriptedHandler::answering(Payload::Empty);
    p.correlator.bind_handler(handler.clone());

    p.correlator
        .on_frame("waygate:other", encoded(&inbound()))
        .await;
    p.correlator
        .on_frame(&p.channel, Bytes::from_static(&[0xFF, 0x00, 0x01]))
        .await;

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(handler.calls(), 0);
    assert!(p.broker.frames().is_empty());
}

#[test_log::test(tokio::test)]
async fn request_reply_round_trip_between_two_nodes() {
    let hub = LoopbackHub::new();

    let alpha_settings = Arc::new(settings("alpha"));
    let alpha_local = LocalActors::new();
    alpha_local.join(FakeActor::stationary("Steve", "alpha"));
    let alpha_roster = Arc::new(Roster::new(
        alpha_settings.clone(),
        Arc::new(hub.broker()),
        alpha_local.clone(),
    ));
    let alpha = Arc::new(Correlator::new(
        alpha_settings,
        Arc::new(hub.broker()),
        alpha_local,
        alpha_roster,
    ));
    hub.attach(alpha.clone());

    let beta_settings = Arc::new(settings("beta"));
    let beta_local = LocalActors::new();
    beta_local.join(FakeActor::stationary("Alex", "beta"));
    let beta_roster = Arc::new(Roster::new(
        beta_settings.clone(),
        Arc::new(hub.broker()),
        beta_local.clone(),
    ));
    let beta = Arc::new(Correlator::new(
        beta_settings,
        Arc::new(hub.broker()),
        beta_local,
        beta_roster,
    ));
    hub.attach(beta.clone());
    beta.bind_handler(ScriptedHandler::answering(Payload::Position(position_on(
        "beta",
    ))));

    let reply = alpha.send(outbound()).await.unwrap();

    assert_eq!(reply.sender, "Alex");
    assert_eq!(reply.target, "Steve");
    assert_eq!(reply.payload, Payload::Position(position_on("beta")));
    assert_eq!(alpha.pending_len(), 0);
    assert_eq!(beta.pending_len(), 0);
}
