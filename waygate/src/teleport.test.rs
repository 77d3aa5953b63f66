use super::*;

use crate::actor::OnlineActor;
use crate::frame::Frame;
use crate::message::{RequestKind, RequestStatus};
use crate::test_utils::{position_on, settings, FakeActor, RecordingBroker, RecordingHooks};

struct Rig {
    broker: Arc<RecordingBroker>,
    local: LocalActors,
    roster: Arc<Roster>,
    hooks: Arc<RecordingHooks>,
    teleporter: Arc<Teleporter>,
}

fn rig_with(settings: Settings) -> Rig {
    let settings = Arc::new(settings);
    let broker = Arc::new(RecordingBroker::default());
    let local = LocalActors::new();
    let roster = Arc::new(Roster::new(settings.clone(), broker.clone(), local.clone()));
    let correlator = Arc::new(Correlator::new(
        settings.clone(),
        broker.clone(),
        local.clone(),
        roster.clone(),
    ));
    let hooks = Arc::new(RecordingHooks::default());
    let warmup = Arc::new(WarmupScheduler::new(
        settings.clone(),
        hooks.clone(),
        hooks.clone(),
    ));
    let teleporter = Arc::new(Teleporter::new(
        settings,
        local.clone(),
        correlator,
        roster.clone(),
        warmup,
        hooks.bundle(),
    ));
    Rig {
        broker,
        local,
        roster,
        hooks,
        teleporter,
    }
}

fn rig() -> Rig {
    rig_with(settings("alpha"))
}

fn join(rig: &Rig, name: &str) -> Arc<FakeActor> {
    let fake = FakeActor::stationary(name, "alpha");
    rig.local.join(fake.clone());
    fake
}

fn invite() -> TeleportRequest {
    TeleportRequest {
        requester_name: "Steve".to_string(),
        requester_position: position_on("alpha"),
        kind: RequestKind::Tpa,
        status: RequestStatus::Pending,
        expires_at: chrono::Utc::now() + chrono::Duration::seconds(60),
    }
}

#[test_log::test(tokio::test)]
async fn local_teleport_moves_the_actor() {
    let rig = rig();
    let fake = join(&rig, "Steve");
    let actor: SharedActor = fake.clone();
    let mut target = position_on("alpha");
    target.x = 10.0;

    let result = rig
        .teleporter
        .teleport(&actor, &target, TeleportKind::Teleport)
        .await
        .unwrap();

    assert_eq!(result, TeleportResult::CompletedLocally);
    assert_eq!(*fake.moves.lock(), vec![target]);
    assert_eq!(rig.hooks.last_positions.lock()[0].1, position_on("alpha"));
    assert!(rig.broker.frames().is_empty());
}

#[test_log::test(tokio::test)]
async fn back_teleports_leave_the_saved_position_alone() {
    let rig = rig();
    let fake = join(&rig, "Steve");
    let actor: SharedActor = fake.clone();
    let mut target = position_on("alpha");
    target.x = 10.0;

    let result = rig
        .teleporter
        .teleport(&actor, &target, TeleportKind::Back)
        .await
        .unwrap();

    assert_eq!(result, TeleportResult::CompletedLocally);
    assert_eq!(*fake.moves.lock(), vec![target]);
    assert!(rig.hooks.last_positions.lock().is_empty());
}

#[test_log::test(tokio::test)]
async fn vetoed_teleport_cancels_before_any_effect() {
    let rig = rig();
    *rig.hooks.veto_teleport.lock() = true;
    let fake = join(&rig, "Steve");
    let actor: SharedActor = fake.clone();

    let result = rig
        .teleporter
        .teleport(&actor, &position_on("alpha"), TeleportKind::Teleport)
        .await
        .unwrap();

    assert_eq!(result, TeleportResult::Cancelled);
    assert!(fake.moves.lock().is_empty());
    assert!(rig.hooks.last_positions.lock().is_empty());
}

#[test_log::test(tokio::test)]
async fn position_save_can_be_left_to_the_host() {
    let mut settings = settings("alpha");
    settings.save_position_on_teleport = false;
    let rig = rig_with(settings);
    let fake = join(&rig, "Steve");
    let actor: SharedActor = fake.clone();

    let result = rig
        .teleporter
        .teleport(&actor, &position_on("alpha"), TeleportKind::Teleport)
        .await
        .unwrap();

    assert_eq!(result, TeleportResult::CompletedLocally);
    assert!(rig.hooks.last_positions.lock().is_empty());
}

#[test_log::test(tokio::test)]
async fn coordinates_past_the_border_never_reach_the_platform() {
    let rig = rig();
    let fake = join(&rig, "Steve");
    let actor: SharedActor = fake.clone();
    let mut target = position_on("alpha");
    target.x = 30_000_000.0;

    let result = rig
        .teleporter
        .teleport(&actor, &target, TeleportKind::Teleport)
        .await
        .unwrap();

    assert_eq!(result, TeleportResult::FailedIllegalCoordinates);
    assert!(fake.moves.lock().is_empty());
}

#[test_log::test(tokio::test)]
async fn platform_move_failures_map_to_results() {
    let rig = rig();
    let fake = join(&rig, "Steve");
    fake.fail_moves_with(MoveError::InvalidWorld);
    let actor: SharedActor = fake.clone();

    let result = rig
        .teleporter
        .teleport(&actor, &position_on("alpha"), TeleportKind::Teleport)
        .await
        .unwrap();

    assert_eq!(result, TeleportResult::FailedInvalidWorld);
}

#[test_log::test(tokio::test)]
async fn cross_server_teleport_hands_the_actor_to_the_transport() {
    let rig = rig();
    rig.roster
        .on_housekeeping(Frame::ServerList {
            names: vec!["beta".into()],
        })
        .await;
    let fake = join(&rig, "Steve");
    let actor: SharedActor = fake.clone();
    let target = position_on("beta");

    let result = rig
        .teleporter
        .teleport(&actor, &target, TeleportKind::Teleport)
        .await
        .unwrap();

    assert_eq!(result, TeleportResult::CompletedCrossServer);
    assert_eq!(rig.hooks.inflight_for(fake.id()), Some(target));
    assert!(fake.moves.lock().is_empty());
    assert!(rig.broker.frames().iter().any(|frame| matches!(
        frame,
        Frame::Transfer { actor, server } if actor == "Steve" && server == "beta"
    )));
}

#[test_log::test(tokio::test)]
async fn transfer_to_an_unknown_server_clears_the_marker() {
    let rig = rig();
    let fake = join(&rig, "Steve");
    let actor: SharedActor = fake.clone();

    let result = rig
        .teleporter
        .teleport(&actor, &position_on("beta"), TeleportKind::Teleport)
        .await
        .unwrap();

    assert_eq!(result, TeleportResult::FailedInvalidServer);
    // The marker was written for the attempt and cleared on refusal.
    assert!(rig.hooks.inflight.lock().contains_key(&fake.id()));
    assert_eq!(rig.hooks.inflight_for(fake.id()), None);
}

#[test_log::test(tokio::test)]
async fn cross_server_teleports_can_be_disabled() {
    let mut settings = settings("alpha");
    settings.cross_server = false;
    let rig = rig_with(settings);
    let fake = join(&rig, "Steve");
    let actor: SharedActor = fake.clone();

    let result = rig
        .teleporter
        .teleport(&actor, &position_on("beta"), TeleportKind::Teleport)
        .await
        .unwrap();

    assert_eq!(result, TeleportResult::FailedInvalidServer);
    assert!(rig.broker.frames().is_empty());
}

#[test_log::test(tokio::test)]
async fn completed_teleport_notifies_and_charges() {
    let mut settings = settings("alpha");
    settings.warmup_seconds = 0;
    let rig = rig_with(settings);
    let fake = join(&rig, "Steve");
    let actor: SharedActor = fake.clone();

    let result = rig
        .teleporter
        .timed_teleport(
            &actor,
            &position_on("alpha"),
            TeleportKind::Teleport,
            Some(EconomyAction::RandomTeleport),
        )
        .await
        .unwrap();

    assert_eq!(result, TeleportResult::CompletedLocally);
    assert_eq!(
        fake.outcome_notices(),
        vec![TeleportResult::CompletedLocally]
    );
    assert!(fake.sounds.lock().contains(&Sound::TeleportComplete));
    assert_eq!(
        *rig.hooks.charges.lock(),
        vec![("Steve".to_string(), EconomyAction::RandomTeleport)]
    );
    assert_eq!(
        *rig.hooks.completed.lock(),
        vec![("Steve".to_string(), TeleportResult::CompletedLocally)]
    );
}

#[test_log::test(tokio::test)]
async fn cancelled_teleport_is_never_charged() {
    let rig = rig();
    *rig.hooks.veto_teleport.lock() = true;
    let fake = join(&rig, "Steve");
    let actor: SharedActor = fake.clone();

    let result = rig
        .teleporter
        .instant_teleport(
            &actor,
            &position_on("alpha"),
            TeleportKind::Back,
            Some(EconomyAction::BackCommand),
        )
        .await
        .unwrap();

    assert_eq!(result, TeleportResult::Cancelled);
    assert!(rig.hooks.charges.lock().is_empty());
    assert!(fake.sounds.lock().contains(&Sound::TeleportCancelled));
    assert_eq!(
        *rig.hooks.completed.lock(),
        vec![("Steve".to_string(), TeleportResult::Cancelled)]
    );
}

#[test_log::test(tokio::test)]
async fn warmup_rejection_skips_the_move() {
    let rig = rig();
    let fake = join(&rig, "Steve");
    fake.set_moving(true);
    let actor: SharedActor = fake.clone();

    let result = rig
        .teleporter
        .timed_teleport(&actor, &position_on("alpha"), TeleportKind::Teleport, None)
        .await
        .unwrap();

    assert_eq!(result, TeleportResult::FailedMoving);
    assert!(fake.moves.lock().is_empty());
    assert_eq!(fake.outcome_notices(), vec![TeleportResult::FailedMoving]);
    assert!(fake.sounds.lock().is_empty());
}

#[test_log::test(tokio::test)]
async fn timed_teleport_counts_down_first() {
    let mut settings = settings("alpha");
    settings.warmup_seconds = 2;
    let rig = rig_with(settings);
    let fake = join(&rig, "Steve");
    let actor: SharedActor = fake.clone();
    let mut target = position_on("alpha");
    target.x = 10.0;

    let result = rig
        .teleporter
        .timed_teleport(&actor, &target, TeleportKind::Teleport, None)
        .await
        .unwrap();

    assert_eq!(result, TeleportResult::CompletedLocally);
    assert_eq!(fake.countdown_notices(), vec![2, 1]);
    assert_eq!(*fake.moves.lock(), vec![target]);
}

#[test_log::test(tokio::test)]
async fn locate_prefers_local_actors() {
    let rig = rig();
    let steve = join(&rig, "Steve");
    let requester: SharedActor = steve.clone();
    let alex = join(&rig, "Alex");
    let mut alex_position = position_on("alpha");
    alex_position.x = 42.0;
    alex.set_position(alex_position.clone());

    let found = rig
        .teleporter
        .locate_actor(&requester, "alex")
        .await
        .unwrap();

    assert_eq!(found, Some(alex_position));
    assert!(rig.broker.frames().is_empty());
}

#[test_log::test(tokio::test)]
async fn locate_unknown_name_is_none() {
    let rig = rig();
    let steve = join(&rig, "Steve");
    let requester: SharedActor = steve.clone();

    let found = rig
        .teleporter
        .locate_actor(&requester, "Nobody")
        .await
        .unwrap();

    assert_eq!(found, None);
    assert!(rig.broker.frames().is_empty());
}

#[test_log::test(tokio::test)]
async fn locate_remote_timeout_resolves_to_none() {
    let rig = rig();
    rig.roster
        .on_housekeeping(Frame::ActorList {
            names: vec!["Zoe".into()],
        })
        .await;
    let steve = join(&rig, "Steve");
    let requester: SharedActor = steve.clone();

    let found = rig
        .teleporter
        .locate_actor(&requester, "zoe")
        .await
        .unwrap();

    assert_eq!(found, None);
    let frames = rig.broker.frames();
    assert!(matches!(
        &frames[0],
        Frame::Envelope(m) if m.kind == MessageKind::PositionRequest && m.target == "Zoe"
    ));
}

#[test_log::test(tokio::test)]
async fn teleport_to_actor_uses_their_position() {
    let rig = rig();
    let steve = join(&rig, "Steve");
    let requester: SharedActor = steve.clone();
    let alex = join(&rig, "Alex");
    let mut alex_position = position_on("alpha");
    alex_position.x = 42.0;
    alex.set_position(alex_position.clone());

    let result = rig
        .teleporter
        .teleport_to_actor(&requester, "Alex", false, None)
        .await
        .unwrap();

    assert_eq!(result, Some(TeleportResult::CompletedLocally));
    assert_eq!(*steve.moves.lock(), vec![alex_position]);
}

#[test_log::test(tokio::test)]
async fn teleport_to_unknown_actor_is_none() {
    let rig = rig();
    let steve = join(&rig, "Steve");
    let requester: SharedActor = steve.clone();

    let result = rig
        .teleporter
        .teleport_to_actor(&requester, "Nobody", false, None)
        .await
        .unwrap();

    assert_eq!(result, None);
}

#[test_log::test(tokio::test)]
async fn teleport_actor_by_name_moves_the_local_target() {
    let rig = rig();
    let steve = join(&rig, "Steve");
    let requester: SharedActor = steve.clone();
    let alex = join(&rig, "Alex");
    let mut target = position_on("alpha");
    target.x = 7.0;

    let result = rig
        .teleporter
        .teleport_actor_by_name(&requester, "alex", &target, false)
        .await
        .unwrap();

    assert_eq!(result, Some(TeleportResult::CompletedLocally));
    assert_eq!(*alex.moves.lock(), vec![target]);
    assert!(steve.moves.lock().is_empty());
    assert_eq!(alex.outcome_notices(), vec![TeleportResult::CompletedLocally]);
}

#[test_log::test(tokio::test)]
async fn answers_position_requests_with_the_target_position() {
    let rig = rig();
    let alex = join(&rig, "Alex");
    let mut alex_position = position_on("alpha");
    alex_position.x = 42.0;
    alex.set_position(alex_position.clone());

    let message = Message::request(
        MessageKind::PositionRequest,
        "Steve",
        "Alex",
        "test",
        Payload::Empty,
    );
    let payload = rig.teleporter.handle(alex.clone(), &message).await.unwrap();

    assert_eq!(payload, Payload::Position(alex_position));
}

#[test_log::test(tokio::test)]
async fn performs_teleports_requested_over_the_wire() {
    let rig = rig();
    let alex = join(&rig, "Alex");
    let mut target = position_on("alpha");
    target.x = 7.0;

    let message = Message::request(
        MessageKind::TeleportToPositionRequest,
        "Steve",
        "Alex",
        "test",
        Payload::Position(target.clone()),
    );
    let payload = rig.teleporter.handle(alex.clone(), &message).await.unwrap();

    assert_eq!(
        payload,
        Payload::TeleportResult(TeleportResult::CompletedLocally)
    );
    assert_eq!(*alex.moves.lock(), vec![target]);
    assert_eq!(alex.outcome_notices(), vec![TeleportResult::CompletedLocally]);
}

#[test_log::test(tokio::test)]
async fn wire_teleport_without_a_position_answers_empty() {
    let rig = rig();
    let alex = join(&rig, "Alex");

    let message = Message::request(
        MessageKind::TeleportToPositionRequest,
        "Steve",
        "Alex",
        "test",
        Payload::Empty,
    );
    let payload = rig.teleporter.handle(alex.clone(), &message).await.unwrap();

    assert_eq!(payload, Payload::Empty);
    assert!(alex.moves.lock().is_empty());
}

#[test_log::test(tokio::test)]
async fn invite_envelopes_hand_off_to_the_host() {
    let rig = rig();
    let alex = join(&rig, "Alex");

    let message = Message::request(
        MessageKind::TeleportRequest,
        "Steve",
        "Alex",
        "test",
        Payload::TeleportRequest(invite()),
    );
    let payload = rig.teleporter.handle(alex.clone(), &message).await.unwrap();

    assert_eq!(payload, Payload::Empty);
    let received = rig.hooks.invites_received.lock();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].0, "Alex");
    assert_eq!(received[0].1.requester_name, "Steve");
}

#[test_log::test(tokio::test)]
async fn invite_answers_hand_off_to_the_response_hook() {
    let rig = rig();
    let steve = join(&rig, "Steve");

    let mut answered = invite();
    answered.status = RequestStatus::Accepted;
    let message = Message::request(
        MessageKind::TeleportRequestResponse,
        "Alex",
        "Steve",
        "test",
        Payload::TeleportRequest(answered),
    );
    let payload = rig.teleporter.handle(steve.clone(), &message).await.unwrap();

    assert_eq!(payload, Payload::Empty);
    let responses = rig.hooks.responses_received.lock();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].0, "Steve");
    assert_eq!(responses[0].1.status, RequestStatus::Accepted);
}

#[test_log::test(tokio::test)]
async fn invites_deliver_locally_without_the_wire() {
    let rig = rig();
    let steve = join(&rig, "Steve");
    let requester: SharedActor = steve.clone();
    join(&rig, "Alex");

    let delivered = rig
        .teleporter
        .send_invite(&requester, "Alex", invite())
        .await
        .unwrap();

    assert!(delivered);
    assert_eq!(rig.hooks.invites_received.lock()[0].0, "Alex");
    assert!(rig.broker.frames().is_empty());
}

#[test_log::test(tokio::test)]
async fn invites_to_unknown_names_are_undeliverable() {
    let rig = rig();
    let steve = join(&rig, "Steve");
    let requester: SharedActor = steve.clone();

    let delivered = rig
        .teleporter
        .send_invite(&requester, "Nobody", invite())
        .await
        .unwrap();

    assert!(!delivered);
    assert!(rig.broker.frames().is_empty());
}

#[test_log::test(tokio::test)]
async fn unacknowledged_remote_invites_are_undeliverable() {
    let rig = rig();
    rig.roster
        .on_housekeeping(Frame::ActorList {
            names: vec!["Zoe".into()],
        })
        .await;
    let steve = join(&rig, "Steve");
    let requester: SharedActor = steve.clone();

    let delivered = rig
        .teleporter
        .send_invite(&requester, "Zoe", invite())
        .await
        .unwrap();

    assert!(!delivered);
    let frames = rig.broker.frames();
    assert!(matches!(
        &frames[0],
        Frame::Envelope(m) if m.kind == MessageKind::TeleportRequest && m.target == "Zoe"
    ));
}
