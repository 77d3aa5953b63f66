mod actor;
mod broker;
mod config;
mod correlator;
mod frame;
mod hooks;
mod id;
mod message;
mod node;
mod position;
pub mod prelude;
mod roster;
mod teleport;
#[cfg(test)]
mod test_utils;
mod warmup;

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use crate::test_utils::{eventually, position_on, settings, RecordingSink, TestNode};

    use std::sync::Arc;
    use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

    /// Initialize tracing for tests
    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env()
                    .add_directive("waygate=debug".parse().unwrap())
                    .add_directive("test=debug".parse().unwrap()),
            )
            .with_span_events(FmtSpan::FULL)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_target(false)
            .try_init();
    }

    fn two_servers() -> (LoopbackHub, TestNode, TestNode) {
        let hub = LoopbackHub::new();
        let alpha = TestNode::join(&hub, settings("alpha"));
        let beta = TestNode::join(&hub, settings("beta"));
        (hub, alpha, beta)
    }

    #[tokio::test]
    async fn rosters_converge_across_nodes() {
        init_tracing();
        let (_hub, alpha, beta) = two_servers();
        alpha.spawn_actor("Steve");
        beta.spawn_actor("Alex");

        alpha.node.roster().fetch_actor_names().await.unwrap();
        alpha.node.roster().fetch_server_names().await.unwrap();

        assert_eq!(
            alpha.node.roster().known_actors(),
            vec!["Alex".to_string(), "Steve".to_string()]
        );
        assert!(alpha
            .node
            .roster()
            .known_servers()
            .contains(&"beta".to_string()));
    }

    #[tokio::test]
    async fn locate_resolves_actors_on_other_servers() {
        init_tracing();
        let (_hub, alpha, beta) = two_servers();
        let steve = alpha.spawn_actor("Steve");
        let requester: SharedActor = steve.clone();
        let alex = beta.spawn_actor("Alex");
        let mut alex_position = position_on("beta");
        alex_position.x = 99.0;
        alex.set_position(alex_position.clone());

        alpha.node.roster().fetch_actor_names().await.unwrap();
        let found = alpha
            .node
            .teleporter()
            .locate_actor(&requester, "Alex")
            .await
            .unwrap();

        assert_eq!(found, Some(alex_position));
    }

    #[tokio::test]
    async fn cross_server_teleport_hands_off_end_to_end() {
        init_tracing();
        let (hub, alpha, _beta) = two_servers();
        let recorder = Arc::new(RecordingSink::default());
        hub.attach(recorder.clone());
        let steve = alpha.spawn_actor("Steve");
        let requester: SharedActor = steve.clone();
        let mut target = position_on("beta");
        target.x = 100.0;

        let result = alpha
            .node
            .teleporter()
            .teleport(&requester, &target, TeleportKind::Teleport)
            .await
            .unwrap();

        assert_eq!(result, TeleportResult::CompletedCrossServer);
        assert_eq!(alpha.hooks.inflight_for(steve.id()), Some(target));
        assert!(recorder.frames.lock().iter().any(|frame| matches!(
            frame,
            Frame::Transfer { actor, server } if actor == "Steve" && server == "beta"
        )));
    }

    #[tokio::test]
    async fn remote_actors_teleport_on_request() {
        init_tracing();
        let (_hub, alpha, beta) = two_servers();
        let steve = alpha.spawn_actor("Steve");
        let requester: SharedActor = steve.clone();
        let alex = beta.spawn_actor("Alex");
        let mut target = position_on("beta");
        target.x = 7.0;

        alpha.node.roster().fetch_actor_names().await.unwrap();
        let result = alpha
            .node
            .teleporter()
            .teleport_actor_by_name(&requester, "alex", &target, false)
            .await
            .unwrap();

        assert_eq!(result, Some(TeleportResult::CompletedLocally));
        assert_eq!(*alex.moves.lock(), vec![target]);
        assert_eq!(
            alex.outcome_notices(),
            vec![TeleportResult::CompletedLocally]
        );
    }

    #[tokio::test]
    async fn invites_cross_the_cluster() {
        init_tracing();
        let (_hub, alpha, beta) = two_servers();
        let steve = alpha.spawn_actor("Steve");
        let requester: SharedActor = steve.clone();
        beta.spawn_actor("Alex");

        alpha.node.roster().fetch_actor_names().await.unwrap();
        let invite = TeleportRequest {
            requester_name: "Steve".to_string(),
            requester_position: position_on("alpha"),
            kind: RequestKind::Tpa,
            status: RequestStatus::Pending,
            expires_at: chrono::Utc::now() + chrono::Duration::seconds(60),
        };
        let delivered = alpha
            .node
            .teleporter()
            .send_invite(&requester, "Alex", invite)
            .await
            .unwrap();

        assert!(delivered);
        let received = beta.hooks.invites_received.lock();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, "Alex");
        assert_eq!(received[0].1.requester_name, "Steve");
    }

    #[tokio::test]
    async fn invite_answers_cross_the_cluster() {
        init_tracing();
        let (_hub, alpha, beta) = two_servers();
        alpha.spawn_actor("Steve");
        let alex = beta.spawn_actor("Alex");
        let responder: SharedActor = alex.clone();

        beta.node.roster().fetch_actor_names().await.unwrap();
        let answer = TeleportRequest {
            requester_name: "Steve".to_string(),
            requester_position: position_on("alpha"),
            kind: RequestKind::Tpa,
            status: RequestStatus::Accepted,
            expires_at: chrono::Utc::now() + chrono::Duration::seconds(60),
        };
        let delivered = beta
            .node
            .teleporter()
            .send_invite_response(&responder, "Steve", answer)
            .await
            .unwrap();

        assert!(delivered);
        let responses = alpha.hooks.responses_received.lock();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].0, "Steve");
        assert_eq!(responses[0].1.status, RequestStatus::Accepted);
    }

    #[tokio::test]
    async fn background_refresh_fills_the_caches() {
        init_tracing();
        let (_hub, alpha, beta) = two_servers();
        beta.spawn_actor("Alex");

        alpha.node.start();
        eventually(|| {
            alpha
                .node
                .roster()
                .known_servers()
                .contains(&"beta".to_string())
        })
        .await;
        eventually(|| {
            alpha
                .node
                .roster()
                .known_actors()
                .contains(&"Alex".to_string())
        })
        .await;
        alpha.node.shutdown();
    }
}
