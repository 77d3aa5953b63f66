//! Cached view of the cluster, maintained by the housekeeping subchannels.
//!
//! Nodes answer each other's enumeration requests with their own slice of
//! the cluster (local actor names, own server name) and merge every answer
//! they hear, so the caches converge without any node knowing the whole
//! topology. Lookups against the cache are synchronous; the `fetch_*` calls
//! publish a request and wait for the next answer under the lookup deadline.

use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::actor::LocalActors;
use crate::broker::Broker;
use crate::config::Settings;
use crate::correlator::SendError;
use crate::frame::Frame;
use crate::position::ServerName;

/// Background re-request period for the actor and server caches.
const REFRESH_PERIOD: Duration = Duration::from_secs(30);

pub struct Roster {
    settings: Arc<Settings>,
    broker: Arc<dyn Broker>,
    local: LocalActors,
    channel: String,
    actors: RwLock<BTreeSet<String>>,
    servers: RwLock<BTreeSet<String>>,
    /// What the transport says this node is called, when it answers
    /// [`Frame::WhoAmI`]. Informational; routing trusts `Settings::server`.
    reported_server: RwLock<Option<String>>,
    actor_waiters: Mutex<Vec<oneshot::Sender<Vec<String>>>>,
    server_waiters: Mutex<Vec<oneshot::Sender<Vec<String>>>>,
    whoami_waiters: Mutex<Vec<oneshot::Sender<String>>>,
}

impl Roster {
    pub fn new(settings: Arc<Settings>, broker: Arc<dyn Broker>, local: LocalActors) -> Self {
        let channel = settings.channel();
        let mut servers = BTreeSet::new();
        servers.insert(settings.server.to_string());
        Self {
            settings,
            broker,
            local,
            channel,
            actors: RwLock::new(BTreeSet::new()),
            servers: RwLock::new(servers),
            reported_server: RwLock::new(None),
            actor_waiters: Mutex::new(Vec::new()),
            server_waiters: Mutex::new(Vec::new()),
            whoami_waiters: Mutex::new(Vec::new()),
        }
    }

    /// Absorb or answer a housekeeping frame. Enumeration requests are
    /// answered with this node's slice of the cluster; answers from any node
    /// are merged into the caches and handed to whoever is waiting on a
    /// fetch.
    pub async fn on_housekeeping(&self, frame: Frame) {
        match frame {
            Frame::ListActors => {
                self.answer(Frame::ActorList {
                    names: self.local.names(),
                })
                .await;
            }
            Frame::ActorList { names } => {
                let snapshot = {
                    let mut cache = self.actors.write();
                    cache.extend(names);
                    cache.iter().cloned().collect::<Vec<_>>()
                };
                resolve_waiters(&self.actor_waiters, snapshot);
            }
            Frame::ListServers => {
                self.answer(Frame::ServerList {
                    names: vec![self.settings.server.to_string()],
                })
                .await;
            }
            Frame::ServerList { names } => {
                let snapshot = {
                    let mut cache = self.servers.write();
                    cache.extend(names);
                    cache.iter().cloned().collect::<Vec<_>>()
                };
                resolve_waiters(&self.server_waiters, snapshot);
            }
            // Answered by transports that assign names (a proxy); peer nodes
            // cannot know what this node is called, so they stay quiet.
            Frame::WhoAmI => {
                tracing::trace!("Leaving WhoAmI to the transport");
            }
            Frame::LocalServer { name } => {
                *self.reported_server.write() = Some(name.clone());
                resolve_waiters(&self.whoami_waiters, name);
            }
            // Actor hand-over is the transport's job; nothing to do node-side.
            Frame::Transfer { actor, server } => {
                tracing::trace!(%actor, %server, "Observed a transfer request");
            }
            Frame::Envelope(message) => {
                tracing::error!(id = %message.id, "Envelope routed to housekeeping, dropping");
            }
        }
    }

    /// Re-request the cluster view once and wait for the first answer.
    pub async fn fetch_actor_names(&self) -> Result<Vec<String>, SendError> {
        let rx = register_waiter(&self.actor_waiters);
        self.publish(Frame::ListActors).await?;
        self.await_answer(rx).await
    }

    pub async fn fetch_server_names(&self) -> Result<Vec<String>, SendError> {
        let rx = register_waiter(&self.server_waiters);
        self.publish(Frame::ListServers).await?;
        self.await_answer(rx).await
    }

    /// Ask the transport what it calls this node.
    pub async fn fetch_local_server(&self) -> Result<String, SendError> {
        let rx = register_waiter(&self.whoami_waiters);
        self.publish(Frame::WhoAmI).await?;
        self.await_answer(rx).await
    }

    /// Resolve a name against the cached cluster-wide actor list: exact
    /// case-insensitive match first, then the first case-insensitive prefix
    /// match in sorted order.
    pub fn find_online_name(&self, name: &str) -> Option<String> {
        let cache = self.actors.read();
        let lowered = name.to_lowercase();
        cache
            .iter()
            .find(|candidate| candidate.to_lowercase() == lowered)
            .or_else(|| {
                cache
                    .iter()
                    .find(|candidate| candidate.to_lowercase().starts_with(&lowered))
            })
            .cloned()
    }

    pub fn known_actors(&self) -> Vec<String> {
        self.actors.read().iter().cloned().collect()
    }

    pub fn known_servers(&self) -> Vec<String> {
        self.servers.read().iter().cloned().collect()
    }

    pub fn reported_server(&self) -> Option<String> {
        self.reported_server.read().clone()
    }

    /// Ask the transport to hand `actor` to `server`. Returns `false`
    /// without publishing when the destination is not a known server.
    pub async fn request_transfer(
        &self,
        actor: &str,
        server: &ServerName,
    ) -> Result<bool, SendError> {
        let mut known = self.servers.read().contains(server.as_str());
        if !known {
            // The fetch resolves on the first answer heard, which on a
            // self-delivering transport is this node's own. Every answer has
            // been merged by the time it returns, so re-check the cache
            // rather than the fetch snapshot.
            known = match self.fetch_server_names().await {
                Ok(_) => self.servers.read().contains(server.as_str()),
                Err(SendError::Timeout(_)) => false,
                Err(e) => return Err(e),
            };
        }
        if !known {
            tracing::debug!(%server, "Refusing transfer to an unknown server");
            return Ok(false);
        }

        self.publish(Frame::Transfer {
            actor: actor.to_string(),
            server: server.to_string(),
        })
        .await?;
        Ok(true)
    }

    /// Keep the caches warm until cancelled. The first tick fires
    /// immediately, so a fresh node asks for the cluster view at startup.
    pub async fn run_refresh(self: Arc<Self>, cancel: CancellationToken) {
        if let Err(e) = self.publish(Frame::WhoAmI).await {
            tracing::debug!(error = %e, "Could not ask the transport for this node's name");
        }

        let mut interval = tokio::time::interval(REFRESH_PERIOD);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.publish(Frame::ListActors).await {
                        tracing::debug!(error = %e, "Actor roster refresh failed");
                    }
                    if let Err(e) = self.publish(Frame::ListServers).await {
                        tracing::debug!(error = %e, "Server roster refresh failed");
                    }
                }
            }
        }
    }

    async fn publish(&self, frame: Frame) -> Result<(), SendError> {
        let bytes = frame.encode()?;
        self.broker
            .publish(&self.channel, bytes)
            .await
            .map_err(SendError::NotSent)
    }

    async fn answer(&self, frame: Frame) {
        if let Err(e) = self.publish(frame).await {
            tracing::warn!(error = %e, "Failed to answer a housekeeping request");
        }
    }

    async fn await_answer<T>(&self, rx: oneshot::Receiver<T>) -> Result<T, SendError> {
        let deadline = self.settings.lookup_timeout;
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) | Err(_) => Err(SendError::Timeout(deadline)),
        }
    }
}

fn register_waiter<T>(waiters: &Mutex<Vec<oneshot::Sender<T>>>) -> oneshot::Receiver<T> {
    let (tx, rx) = oneshot::channel();
    let mut waiters = waiters.lock();
    waiters.retain(|waiter| !waiter.is_closed());
    waiters.push(tx);
    rx
}

fn resolve_waiters<T: Clone>(waiters: &Mutex<Vec<oneshot::Sender<T>>>, value: T) {
    for waiter in waiters.lock().drain(..) {
        let _ = waiter.send(value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{settings, RecordingBroker};

    fn roster(broker: Arc<RecordingBroker>) -> Roster {
        Roster::new(Arc::new(settings("alpha")), broker, LocalActors::new())
    }

    #[test_log::test(tokio::test)]
    async fn answers_actor_enumeration_with_local_names() {
        let broker = Arc::new(RecordingBroker::default());
        let local = LocalActors::new();
        local.join(crate::test_utils::FakeActor::stationary("Steve", "alpha"));
        let roster = Roster::new(Arc::new(settings("alpha")), broker.clone(), local);

        roster.on_housekeeping(Frame::ListActors).await;

        assert_eq!(
            broker.frames(),
            vec![Frame::ActorList {
                names: vec!["Steve".into()]
            }]
        );
    }

    #[test_log::test(tokio::test)]
    async fn answers_server_enumeration_with_own_name() {
        let broker = Arc::new(RecordingBroker::default());
        let roster = roster(broker.clone());

        roster.on_housekeeping(Frame::ListServers).await;

        assert_eq!(
            broker.frames(),
            vec![Frame::ServerList {
                names: vec!["alpha".into()]
            }]
        );
    }

    #[test_log::test(tokio::test)]
    async fn fetch_resolves_on_the_next_answer() {
        let broker = Arc::new(RecordingBroker::default());
        let roster = roster(broker.clone());

        let (names, _) = tokio::join!(roster.fetch_actor_names(), async {
            roster
                .on_housekeeping(Frame::ActorList {
                    names: vec!["Alex".into(), "Steve".into()],
                })
                .await;
        });

        assert_eq!(names.unwrap(), vec!["Alex".to_string(), "Steve".to_string()]);
        assert_eq!(roster.known_actors().len(), 2);
    }

    #[test_log::test(tokio::test)]
    async fn fetch_times_out_without_an_answer() {
        let broker = Arc::new(RecordingBroker::default());
        let roster = roster(broker.clone());

        let err = roster.fetch_actor_names().await.unwrap_err();
        assert!(matches!(err, SendError::Timeout(_)));
    }

    #[test_log::test(tokio::test)]
    async fn transport_name_answer_resolves_the_whoami_fetch() {
        let broker = Arc::new(RecordingBroker::default());
        let roster = roster(broker.clone());
        assert_eq!(roster.reported_server(), None);

        let (name, _) = tokio::join!(roster.fetch_local_server(), async {
            roster
                .on_housekeeping(Frame::LocalServer {
                    name: "proxy-alpha".into(),
                })
                .await;
        });

        assert_eq!(name.unwrap(), "proxy-alpha");
        assert_eq!(roster.reported_server(), Some("proxy-alpha".to_string()));
        assert_eq!(broker.frames(), vec![Frame::WhoAmI]);
    }

    #[test_log::test(tokio::test)]
    async fn answers_merge_across_servers() {
        let broker = Arc::new(RecordingBroker::default());
        let roster = roster(broker.clone());

        roster
            .on_housekeeping(Frame::ActorList {
                names: vec!["Steve".into()],
            })
            .await;
        roster
            .on_housekeeping(Frame::ActorList {
                names: vec!["Alex".into()],
            })
            .await;

        assert_eq!(
            roster.known_actors(),
            vec!["Alex".to_string(), "Steve".to_string()]
        );
    }

    #[test_log::test(tokio::test)]
    async fn exact_match_wins_over_prefix() {
        let broker = Arc::new(RecordingBroker::default());
        let roster = roster(broker.clone());
        roster
            .on_housekeeping(Frame::ActorList {
                names: vec!["Alexander".into(), "alex".into()],
            })
            .await;

        assert_eq!(roster.find_online_name("Alex"), Some("alex".to_string()));
        assert_eq!(roster.find_online_name("Alexa"), Some("Alexander".to_string()));
        assert_eq!(roster.find_online_name("Zed"), None);
    }

    #[test_log::test(tokio::test)]
    async fn transfer_to_unknown_server_is_refused() {
        let broker = Arc::new(RecordingBroker::default());
        let roster = roster(broker.clone());

        let sent = roster
            .request_transfer("Steve", &"nowhere".into())
            .await
            .unwrap();

        assert!(!sent);
        assert!(
            !broker
                .frames()
                .iter()
                .any(|frame| matches!(frame, Frame::Transfer { .. }))
        );
    }

    #[test_log::test(tokio::test)]
    async fn transfer_to_known_server_publishes() {
        let broker = Arc::new(RecordingBroker::default());
        let roster = roster(broker.clone());
        roster
            .on_housekeeping(Frame::ServerList {
                names: vec!["beta".into()],
            })
            .await;

        let sent = roster
            .request_transfer("Steve", &"beta".into())
            .await
            .unwrap();

        assert!(sent);
        assert_eq!(
            broker.frames().last(),
            Some(&Frame::Transfer {
                actor: "Steve".into(),
                server: "beta".into()
            })
        );
    }
}
