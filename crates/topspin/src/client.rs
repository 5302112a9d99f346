//! The client runtime: one task that runs a participant's whole game.
//!
//! [`ArenaClient::spawn`] starts a task that owns the coordinator, the
//! session context, the arena and the outbox. Its single `tokio::select!`
//! loop services three sources, and every handler runs on it:
//!
//! ```text
//!   FrameScheduler ──frame──▶ ┌──────────────┐ ──LinkOut──▶ link task ──▶ relay
//!   link task ──LinkEvent───▶ │  update loop │
//!   ClientHandle ──command──▶ └──────────────┘ ──ClientView──▶ watch
//! ```
//!
//! After each handled input the loop carries out the coordinator's link
//! commands, flushes the outbox to the link, and republishes the view.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use topspin_arena::{Arena, ArenaConfig, ScoreRecord};
use topspin_protocol::{Codec, EntityId, JsonCodec, ParticipantId, Payload, SessionId, SystemMessage};
use topspin_session::{
    CoordinatorState, LinkCommand, Outbox, RoleChange, SessionConfig, SessionContext,
    SessionCoordinator, SessionEvent,
};
use topspin_tick::{FrameInfo, FrameScheduler};
use topspin_transport::Connector;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::TopspinError;
use crate::link::{Link, LinkEvent, LinkSettings};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Everything one client needs. Deserializes with defaults for missing
/// fields, so a config file only lists what it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Name shown to other participants.
    pub display_name: String,
    pub session: SessionConfig,
    pub arena: ArenaConfig,
    /// Update loop rate.
    pub frame_rate_hz: u32,
    /// How often the link pings the relay to stay under its idle timeout.
    pub heartbeat_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            display_name: "player".to_string(),
            session: SessionConfig::default(),
            arena: ArenaConfig::default(),
            frame_rate_hz: 60,
            heartbeat_interval: Duration::from_secs(2),
        }
    }
}

impl ClientConfig {
    /// Loads a config from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, TopspinError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

// ---------------------------------------------------------------------------
// View
// ---------------------------------------------------------------------------

/// One entity as the local client currently sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityView {
    pub entity: EntityId,
    pub owner: ParticipantId,
    pub position: Vec3,
    pub health: f32,
    pub spinning: bool,
    /// Owned by this client.
    pub local: bool,
}

/// A read-only copy of the client's state, refreshed after every loop
/// iteration.
#[derive(Debug, Clone)]
pub struct ClientView {
    pub state: CoordinatorState,
    pub status: String,
    pub participant: Option<ParticipantId>,
    pub session: Option<SessionId>,
    pub is_authority: bool,
    /// Live entities, ours first.
    pub entities: Vec<EntityView>,
    /// Mirrored scores, ordered by participant id.
    pub scores: Vec<(ParticipantId, ScoreRecord)>,
}

impl ClientView {
    fn empty() -> Self {
        Self {
            state: CoordinatorState::Disconnected,
            status: "Disconnected".to_string(),
            participant: None,
            session: None,
            is_authority: false,
            entities: Vec::new(),
            scores: Vec::new(),
        }
    }

    /// Our own entity, if alive.
    pub fn local_entity(&self) -> Option<&EntityView> {
        self.entities.iter().find(|e| e.local)
    }

    pub fn score_of(&self, participant: ParticipantId) -> Option<ScoreRecord> {
        self.scores
            .iter()
            .find(|(id, _)| *id == participant)
            .map(|(_, record)| *record)
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum ClientCommand {
    Steer(Vec3),
    SetSpinning(bool),
    Leave,
    Shutdown,
}

/// Controls a running client.
pub struct ClientHandle {
    commands: mpsc::UnboundedSender<ClientCommand>,
    view: watch::Receiver<ClientView>,
    task: JoinHandle<()>,
}

impl ClientHandle {
    /// Sets the steering direction of our entity.
    pub fn steer(&self, direction: Vec3) -> Result<(), TopspinError> {
        self.command(ClientCommand::Steer(direction))
    }

    pub fn set_spinning(&self, spinning: bool) -> Result<(), TopspinError> {
        self.command(ClientCommand::SetSpinning(spinning))
    }

    /// Leaves the session and disconnects. The client keeps running but
    /// stays disconnected.
    pub fn leave(&self) -> Result<(), TopspinError> {
        self.command(ClientCommand::Leave)
    }

    /// The latest published view.
    pub fn view(&self) -> ClientView {
        self.view.borrow().clone()
    }

    /// Leaves, disconnects and waits for the client task to finish.
    pub async fn shutdown(self) -> Result<(), TopspinError> {
        self.command(ClientCommand::Shutdown)?;
        self.task.await.map_err(|_| TopspinError::ClientStopped)
    }

    fn command(&self, command: ClientCommand) -> Result<(), TopspinError> {
        self.commands
            .send(command)
            .map_err(|_| TopspinError::ClientStopped)
    }
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

/// Entry point for running a client.
pub struct ArenaClient;

impl ArenaClient {
    /// Starts a client that connects through `connector` and plays until
    /// shut down.
    pub fn spawn<K: Connector>(config: ClientConfig, connector: K) -> ClientHandle {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(ClientView::empty());
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let runtime = Runtime {
            settings: LinkSettings {
                display_name: config.display_name.clone(),
                heartbeat_interval: config.heartbeat_interval,
            },
            connector: Arc::new(connector),
            coordinator: SessionCoordinator::new(config.session.clone()),
            ctx: SessionContext::new(config.session.clone()),
            arena: Arena::new(config.arena.clone()),
            outbox: Outbox::new(),
            scheduler: FrameScheduler::with_rate(config.frame_rate_hz),
            codec: JsonCodec,
            link: None,
            closing: None,
            generation: 0,
            events_tx,
            events_rx,
            commands: commands_rx,
            view: view_tx,
        };
        let task = tokio::spawn(runtime.run());

        ClientHandle {
            commands: commands_tx,
            view: view_rx,
            task,
        }
    }
}

struct Runtime<K: Connector> {
    settings: LinkSettings,
    connector: Arc<K>,
    coordinator: SessionCoordinator,
    ctx: SessionContext,
    arena: Arena,
    outbox: Outbox,
    scheduler: FrameScheduler,
    codec: JsonCodec,
    link: Option<Link>,
    /// A link saying goodbye after `LinkCommand::Disconnect`.
    closing: Option<JoinHandle<()>>,
    /// Bumped for every link opened.
    generation: u64,
    events_tx: mpsc::UnboundedSender<LinkEvent>,
    events_rx: mpsc::UnboundedReceiver<LinkEvent>,
    commands: mpsc::UnboundedReceiver<ClientCommand>,
    view: watch::Sender<ClientView>,
}

impl<K: Connector> Runtime<K> {
    async fn run(mut self) {
        if let Err(e) = self.coordinator.connect(self.scheduler.now()) {
            warn!(error = %e, "cannot start connecting");
        }
        self.settle();

        loop {
            tokio::select! {
                frame = self.scheduler.wait_for_frame() => {
                    self.on_frame(frame);
                    self.scheduler.record_frame_end();
                }
                Some(link_event) = self.events_rx.recv() => {
                    self.on_link_event(link_event);
                }
                command = self.commands.recv() => match command {
                    Some(ClientCommand::Shutdown) | None => break,
                    Some(command) => self.on_command(command),
                },
            }
            self.settle();
        }

        self.disconnect();
        self.settle();
        if let Some(link) = self.link.take() {
            self.closing = Some(link.close("shutdown".into()));
        }
        if let Some(closing) = self.closing.take() {
            let _ = tokio::time::timeout(Duration::from_secs(1), closing).await;
        }
        info!(frames = self.scheduler.frame_count(), "client stopped");
    }

    /// Carries out link commands, flushes the outbox and publishes the
    /// view.
    fn settle(&mut self) {
        self.execute_link_commands();
        self.flush();
        self.publish_view();
    }

    // -- inputs -------------------------------------------------------------

    fn on_frame(&mut self, frame: FrameInfo) {
        trace!(frame = frame.frame, "frame");
        let was_in_session = self.ctx.in_session();
        let change = self.coordinator.tick(&mut self.ctx, frame.now);
        self.after_coordinator(was_in_session, change, frame.now);
        self.arena
            .frame(&self.ctx, frame.dt, frame.now, &mut self.outbox);
    }

    fn on_link_event(&mut self, link_event: LinkEvent) {
        let current = self.link.as_ref().map(Link::generation);
        if current != Some(link_event.generation) {
            debug!(
                generation = link_event.generation,
                event = link_event.event.kind(),
                "dropping event from a replaced link"
            );
            return;
        }
        if matches!(link_event.event, SessionEvent::Disconnected { .. } | SessionEvent::ConnectFailed { .. }) {
            self.link = None;
        }

        let now = self.scheduler.now();
        let event = link_event.event;
        let was_in_session = self.ctx.in_session();
        let change = self.coordinator.handle(&mut self.ctx, &event, now);
        self.after_coordinator(was_in_session, change, now);
        if !self.ctx.in_session() {
            return;
        }

        match event {
            SessionEvent::ParticipantEntered(participant) => {
                self.arena
                    .on_participant_entered(&self.ctx, participant.id, &mut self.outbox, now);
            }
            SessionEvent::ParticipantLeft(participant) => {
                self.arena
                    .on_participant_left(&self.ctx, participant, &mut self.outbox, now);
            }
            SessionEvent::Message { from, message } => {
                self.arena
                    .on_message(&self.ctx, from, &message, &mut self.outbox, now);
            }
            _ => {}
        }
    }

    fn on_command(&mut self, command: ClientCommand) {
        match command {
            ClientCommand::Steer(direction) => self.arena.steer(direction),
            ClientCommand::SetSpinning(spinning) => self.arena.set_spinning(spinning),
            ClientCommand::Leave => self.disconnect(),
            ClientCommand::Shutdown => {}
        }
    }

    fn disconnect(&mut self) {
        let was_in_session = self.ctx.in_session();
        match self.coordinator.leave(&mut self.ctx) {
            Ok(change) => self.after_coordinator(was_in_session, change, self.scheduler.now()),
            Err(e) => debug!(error = %e, "leave ignored"),
        }
    }

    /// Tells the arena what a coordinator step did to the session. A fresh
    /// session reaches the arena before the role it came with.
    fn after_coordinator(&mut self, was_in_session: bool, change: RoleChange, now: Duration) {
        let in_session = self.ctx.in_session();
        if was_in_session && !in_session {
            self.arena.on_session_left();
            return;
        }
        if !was_in_session && in_session {
            self.arena.on_session_joined(&self.ctx, &mut self.outbox, now);
        }
        if in_session {
            self.arena.on_role_change(&self.ctx, change, &mut self.outbox);
        }
    }

    // -- outputs ------------------------------------------------------------

    fn execute_link_commands(&mut self) {
        for command in self.coordinator.take_commands() {
            match command {
                LinkCommand::Connect => self.open_link(),
                LinkCommand::JoinRandom { game_version } => {
                    self.system(SystemMessage::JoinRandom { game_version });
                }
                LinkCommand::CreateSession {
                    game_version,
                    name,
                    max_participants,
                } => {
                    self.system(SystemMessage::CreateSession {
                        game_version,
                        name,
                        max_participants,
                    });
                }
                LinkCommand::LeaveSession => self.system(SystemMessage::LeaveSession),
                LinkCommand::Disconnect { reason } => {
                    if let Some(link) = self.link.take() {
                        self.closing = Some(link.close(reason));
                    }
                }
            }
        }
    }

    fn open_link(&mut self) {
        if let Some(old) = self.link.take() {
            old.abort();
        }
        self.generation += 1;
        debug!(generation = self.generation, "opening link");
        self.link = Some(Link::open(
            Arc::clone(&self.connector),
            self.settings.clone(),
            self.generation,
            self.events_tx.clone(),
        ));
    }

    fn system(&mut self, message: SystemMessage) {
        match &self.link {
            Some(link) if link.system(message) => {}
            _ => debug!("no link for system message"),
        }
    }

    fn flush(&mut self) {
        if self.outbox.is_empty() {
            return;
        }
        let now = self.scheduler.now();
        for outgoing in self.outbox.drain() {
            let data = match self.codec.encode(&outgoing.message) {
                Ok(data) => data,
                Err(e) => {
                    warn!(kind = outgoing.message.kind(), error = %e, "cannot encode game message");
                    continue;
                }
            };
            let payload = Payload::Route {
                to: outgoing.to,
                data,
            };
            let sent = self
                .link
                .as_ref()
                .is_some_and(|link| link.send(outgoing.channel, payload));
            if !sent {
                trace!(kind = outgoing.message.kind(), "no link, message dropped");
            }
        }
        self.arena.after_flush(now);
    }

    fn publish_view(&mut self) {
        let local = self.arena.local_entity().map(|entity| EntityView {
            entity: entity.id(),
            owner: entity.owner(),
            position: entity.position(),
            health: entity.health(),
            spinning: entity.is_spinning(),
            local: true,
        });
        let remote = self.arena.channel().views().map(|view| EntityView {
            entity: view.entity(),
            owner: view.owner(),
            position: view.position(),
            health: view.health(),
            spinning: view.is_spinning(),
            local: false,
        });
        let mut scores: Vec<_> = self
            .arena
            .board()
            .iter()
            .map(|(id, record)| (id, *record))
            .collect();
        scores.sort_by_key(|(id, _)| *id);

        let view = ClientView {
            state: self.coordinator.state(),
            status: self.coordinator.status().to_string(),
            participant: self.ctx.local_id(),
            session: self.ctx.session().map(|s| s.id),
            is_authority: self.ctx.is_authority(),
            entities: local.into_iter().chain(remote).collect(),
            scores,
        };
        self.view.send_replace(view);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_partial_json_uses_defaults() {
        let config: ClientConfig = serde_json::from_str(
            r#"{ "display_name": "bot-1", "session": { "join_timeout": { "secs": 1, "nanos": 0 } } }"#,
        )
        .unwrap();
        assert_eq!(config.display_name, "bot-1");
        assert_eq!(config.session.join_timeout, Duration::from_secs(1));
        assert_eq!(config.session.max_participants, 4);
        assert_eq!(config.frame_rate_hz, 60);
    }

    #[test]
    fn test_client_config_from_missing_file_is_io_error() {
        let result = ClientConfig::from_json_file("/nonexistent/topspin.json");
        assert!(matches!(result, Err(TopspinError::Io(_))));
    }

    #[test]
    fn test_client_view_lookups() {
        let mut view = ClientView::empty();
        view.entities.push(EntityView {
            entity: EntityId(1),
            owner: ParticipantId(2),
            position: Vec3::ZERO,
            health: 100.0,
            spinning: false,
            local: true,
        });
        view.scores.push((
            ParticipantId(2),
            ScoreRecord {
                score: 100,
                kills: 1,
                deaths: 0,
            },
        ));
        assert_eq!(view.local_entity().map(|e| e.owner), Some(ParticipantId(2)));
        assert_eq!(view.score_of(ParticipantId(2)).map(|r| r.kills), Some(1));
        assert!(view.score_of(ParticipantId(3)).is_none());
    }
}
