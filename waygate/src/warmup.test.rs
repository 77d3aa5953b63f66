use super::*;
use std::time::Duration;

use crate::position::World;
use crate::test_utils::{position_on, settings, FakeActor, RecordingHooks};

fn scheduler(settings: Settings, hooks: &Arc<RecordingHooks>) -> WarmupScheduler {
    WarmupScheduler::new(Arc::new(settings), hooks.clone(), hooks.clone())
}

fn fast_settings(seconds: u32) -> Settings {
    let mut settings = settings("alpha");
    settings.warmup_seconds = seconds;
    settings
}

#[test_log::test(tokio::test)]
async fn stationary_actor_clears_after_the_countdown() {
    let hooks = Arc::new(RecordingHooks::default());
    let scheduler = scheduler(fast_settings(5), &hooks);
    let fake = FakeActor::stationary("Steve", "alpha");
    let actor: SharedActor = fake.clone();

    let outcome = scheduler.run(&actor, &position_on("alpha"), None, true).await;

    assert_eq!(outcome, WarmupOutcome::Cleared);
    assert_eq!(fake.countdown_notices(), vec![5, 4, 3, 2, 1]);
    assert_eq!(fake.sounds.lock().len(), 5);
    assert!(!scheduler.is_warming(actor.id()));
}

#[test_log::test(tokio::test)]
async fn zero_warmup_skips_the_countdown() {
    let hooks = Arc::new(RecordingHooks::default());
    let scheduler = scheduler(fast_settings(0), &hooks);
    let fake = FakeActor::stationary("Steve", "alpha");
    let actor: SharedActor = fake.clone();

    let outcome = scheduler.run(&actor, &position_on("alpha"), None, true).await;

    assert_eq!(outcome, WarmupOutcome::Cleared);
    assert!(fake.countdown_notices().is_empty());
    assert!(fake.sounds.lock().is_empty());
}

#[test_log::test(tokio::test)]
async fn untimed_run_skips_the_countdown() {
    let hooks = Arc::new(RecordingHooks::default());
    let scheduler = scheduler(fast_settings(5), &hooks);
    let fake = FakeActor::stationary("Steve", "alpha");
    let actor: SharedActor = fake.clone();

    let outcome = scheduler.run(&actor, &position_on("alpha"), None, false).await;

    assert_eq!(outcome, WarmupOutcome::Cleared);
    assert!(fake.countdown_notices().is_empty());
}

#[test_log::test(tokio::test)]
async fn second_warmup_for_the_same_actor_is_rejected() {
    let hooks = Arc::new(RecordingHooks::default());
    let scheduler = Arc::new(scheduler(fast_settings(5), &hooks));
    let fake = FakeActor::stationary("Steve", "alpha");
    let actor: SharedActor = fake.clone();

    let first = tokio::spawn({
        let scheduler = scheduler.clone();
        let actor = actor.clone();
        async move { scheduler.run(&actor, &position_on("alpha"), None, true).await }
    });
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(scheduler.is_warming(actor.id()));

    let second = scheduler.run(&actor, &position_on("alpha"), None, true).await;

    assert_eq!(
        second,
        WarmupOutcome::Rejected(TeleportResult::FailedAlreadyTeleporting)
    );
    assert_eq!(first.await.unwrap(), WarmupOutcome::Cleared);
    assert!(!scheduler.is_warming(actor.id()));
}

#[test_log::test(tokio::test)]
async fn movement_cancels_the_countdown() {
    let hooks = Arc::new(RecordingHooks::default());
    let scheduler = Arc::new(scheduler(fast_settings(5), &hooks));
    let fake = FakeActor::stationary("Steve", "alpha");
    let actor: SharedActor = fake.clone();

    let run = tokio::spawn({
        let scheduler = scheduler.clone();
        let actor = actor.clone();
        async move { scheduler.run(&actor, &position_on("alpha"), None, true).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut moved = position_on("alpha");
    moved.x += 1.0;
    fake.set_position(moved);

    assert_eq!(
        run.await.unwrap(),
        WarmupOutcome::Rejected(TeleportResult::Cancelled)
    );
    assert!(fake.countdown_notices().len() < 5);
    assert!(!scheduler.is_warming(actor.id()));
}

#[test_log::test(tokio::test)]
async fn world_change_cancels_the_countdown() {
    let hooks = Arc::new(RecordingHooks::default());
    let scheduler = Arc::new(scheduler(fast_settings(5), &hooks));
    let fake = FakeActor::stationary("Steve", "alpha");
    let actor: SharedActor = fake.clone();

    let run = tokio::spawn({
        let scheduler = scheduler.clone();
        let actor = actor.clone();
        async move { scheduler.run(&actor, &position_on("alpha"), None, true).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut elsewhere = position_on("alpha");
    elsewhere.world = World::new("nether", Id::from_u128(2));
    fake.set_position(elsewhere);

    assert_eq!(
        run.await.unwrap(),
        WarmupOutcome::Rejected(TeleportResult::Cancelled)
    );
}

#[test_log::test(tokio::test)]
async fn damage_cancels_the_countdown() {
    let hooks = Arc::new(RecordingHooks::default());
    let scheduler = Arc::new(scheduler(fast_settings(5), &hooks));
    let fake = FakeActor::stationary("Steve", "alpha");
    let actor: SharedActor = fake.clone();

    let run = tokio::spawn({
        let scheduler = scheduler.clone();
        let actor = actor.clone();
        async move { scheduler.run(&actor, &position_on("alpha"), None, true).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    fake.set_health(12.0);

    assert_eq!(
        run.await.unwrap(),
        WarmupOutcome::Rejected(TeleportResult::Cancelled)
    );
    assert!(!scheduler.is_warming(actor.id()));
}

#[test_log::test(tokio::test)]
async fn moving_actor_is_rejected_at_entry() {
    let hooks = Arc::new(RecordingHooks::default());
    let scheduler = scheduler(fast_settings(5), &hooks);
    let fake = FakeActor::stationary("Steve", "alpha");
    fake.set_moving(true);
    let actor: SharedActor = fake.clone();

    let outcome = scheduler.run(&actor, &position_on("alpha"), None, true).await;

    assert_eq!(
        outcome,
        WarmupOutcome::Rejected(TeleportResult::FailedMoving)
    );
    assert!(fake.countdown_notices().is_empty());
    assert!(!scheduler.is_warming(actor.id()));
}

#[test_log::test(tokio::test)]
async fn warmup_start_event_can_cancel() {
    let hooks = Arc::new(RecordingHooks::default());
    *hooks.veto_warmup.lock() = true;
    let scheduler = scheduler(fast_settings(5), &hooks);
    let fake = FakeActor::stationary("Steve", "alpha");
    let actor: SharedActor = fake.clone();

    let outcome = scheduler.run(&actor, &position_on("alpha"), None, true).await;

    assert_eq!(outcome, WarmupOutcome::Rejected(TeleportResult::Cancelled));
    assert!(fake.countdown_notices().is_empty());
    assert!(!scheduler.is_warming(actor.id()));
}

#[test_log::test(tokio::test)]
async fn economy_refusal_rejects_without_charging() {
    let hooks = Arc::new(RecordingHooks::default());
    *hooks.economy_allows.lock() = false;
    let scheduler = scheduler(fast_settings(0), &hooks);
    let actor: SharedActor = FakeActor::stationary("Steve", "alpha");

    let outcome = scheduler
        .run(
            &actor,
            &position_on("alpha"),
            Some(EconomyAction::RandomTeleport),
            true,
        )
        .await;

    assert_eq!(outcome, WarmupOutcome::Rejected(TeleportResult::Cancelled));
    assert!(hooks.charges.lock().is_empty());
}

#[test_log::test(tokio::test)]
async fn economy_runs_after_the_countdown_completes() {
    let hooks = Arc::new(RecordingHooks::default());
    *hooks.economy_allows.lock() = false;
    let scheduler = scheduler(fast_settings(2), &hooks);
    let fake = FakeActor::stationary("Steve", "alpha");
    let actor: SharedActor = fake.clone();

    let outcome = scheduler
        .run(
            &actor,
            &position_on("alpha"),
            Some(EconomyAction::BackCommand),
            true,
        )
        .await;

    assert_eq!(outcome, WarmupOutcome::Rejected(TeleportResult::Cancelled));
    assert_eq!(fake.countdown_notices(), vec![2, 1]);
}

#[test_log::test(tokio::test)]
async fn shutdown_cancels_inflight_warmups() {
    let hooks = Arc::new(RecordingHooks::default());
    let scheduler = Arc::new(scheduler(fast_settings(5), &hooks));
    let actor: SharedActor = FakeActor::stationary("Steve", "alpha");

    let run = tokio::spawn({
        let scheduler = scheduler.clone();
        let actor = actor.clone();
        async move { scheduler.run(&actor, &position_on("alpha"), None, true).await }
    });
    tokio::time::sleep(Duration::from_millis(30)).await;
    scheduler.shutdown();

    assert_eq!(
        run.await.unwrap(),
        WarmupOutcome::Rejected(TeleportResult::Cancelled)
    );
    assert!(!scheduler.is_warming(actor.id()));
}
