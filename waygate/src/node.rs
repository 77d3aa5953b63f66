//! Per-server assembly of the core.
//!
//! A [`Node`] wires the correlator, roster, warmup scheduler, and teleport
//! orchestrator over one broker and hands the host a single surface: feed
//! inbound frames to [`Node::sink`], keep [`Node::actors`] in step with
//! joins and quits, and drive teleports through [`Node::teleporter`].

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::actor::LocalActors;
use crate::broker::{Broker, FrameSink};
use crate::config::Settings;
use crate::correlator::Correlator;
use crate::hooks::Hooks;
use crate::roster::Roster;
use crate::teleport::Teleporter;
use crate::warmup::WarmupScheduler;

pub struct Node {
    settings: Arc<Settings>,
    local: LocalActors,
    correlator: Arc<Correlator>,
    roster: Arc<Roster>,
    teleporter: Arc<Teleporter>,
    warmup: Arc<WarmupScheduler>,
    cancel: CancellationToken,
}

impl Node {
    pub fn new(settings: Settings, broker: Arc<dyn Broker>, hooks: Hooks) -> Self {
        let settings = Arc::new(settings);
        let local = LocalActors::new();
        let roster = Arc::new(Roster::new(settings.clone(), broker.clone(), local.clone()));
        let correlator = Arc::new(Correlator::new(
            settings.clone(),
            broker,
            local.clone(),
            roster.clone(),
        ));
        let warmup = Arc::new(WarmupScheduler::new(
            settings.clone(),
            hooks.events.clone(),
            hooks.economy.clone(),
        ));
        let teleporter = Arc::new(Teleporter::new(
            settings.clone(),
            local.clone(),
            correlator.clone(),
            roster.clone(),
            warmup.clone(),
            hooks,
        ));
        correlator.bind_handler(teleporter.clone());

        Self {
            settings,
            local,
            correlator,
            roster,
            teleporter,
            warmup,
            cancel: CancellationToken::new(),
        }
    }

    /// The frame receiver to register with the transport's subscription.
    pub fn sink(&self) -> Arc<dyn FrameSink> {
        self.correlator.clone()
    }

    /// Spawn background upkeep. Call once, inside a tokio runtime.
    pub fn start(&self) {
        tokio::spawn(self.roster.clone().run_refresh(self.cancel.child_token()));
    }

    /// Stop background upkeep and cancel in-flight warmups.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.warmup.shutdown();
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn actors(&self) -> &LocalActors {
        &self.local
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn teleporter(&self) -> &Teleporter {
        &self.teleporter
    }
}
