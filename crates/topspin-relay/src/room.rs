//! Room actor: an isolated Tokio task that owns one session.
//!
//! Each room runs in its own task, communicating with the outside world
//! through an mpsc channel. It holds the roster, knows who the authority
//! is, and fans routed game bytes out to the addressed members. It never
//! looks inside those bytes.

use std::collections::BTreeMap;

use topspin_protocol::{
    Channel, ParticipantId, ParticipantInfo, Payload, Recipient, SessionId, SystemMessage,
};
use tokio::sync::{mpsc, oneshot};

use crate::{RelayError, RoomConfig};

/// A frame the relay should write to one participant's connection. The
/// connection handler stamps the sequence number and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub channel: Channel,
    pub payload: Payload,
}

impl Outbound {
    /// A system message on the reliable ordered channel.
    pub fn system(msg: SystemMessage) -> Self {
        Self {
            channel: Channel::ReliableOrdered,
            payload: Payload::System(msg),
        }
    }
}

/// Channel sender for delivering frames to a participant's connection.
pub type ParticipantSender = mpsc::UnboundedSender<Outbound>;

/// Commands sent to a room actor through its channel.
pub(crate) enum RoomCommand {
    Join {
        participant: ParticipantInfo,
        sender: ParticipantSender,
        reply: oneshot::Sender<Result<RoomInfo, RelayError>>,
    },

    /// Replies with the number of members left.
    Leave {
        participant: ParticipantId,
        reply: oneshot::Sender<Result<usize, RelayError>>,
    },

    /// Forward game bytes (fire-and-forget).
    Route {
        from: ParticipantId,
        to: Recipient,
        channel: Channel,
        data: Vec<u8>,
    },

    GetInfo {
        reply: oneshot::Sender<RoomInfo>,
    },

    Shutdown,
}

/// A snapshot of room metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub session_id: SessionId,
    pub config: RoomConfig,
    pub participant_count: usize,
    /// `None` only for a room nobody has joined yet.
    pub authority: Option<ParticipantId>,
}

impl RoomInfo {
    /// Whether a `JoinRandom` for `game_version` may join this room now.
    pub fn is_open_for(&self, game_version: &str) -> bool {
        self.config.matches(game_version)
            && self.participant_count < self.config.max_participants
    }
}

/// Handle to a running room actor.
///
/// Cheap to clone: it's just an `mpsc::Sender` wrapper. Connection
/// handlers keep one for the room they are in so routing does not go
/// through the manager.
#[derive(Clone)]
pub struct RoomHandle {
    session_id: SessionId,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Adds a participant. On success the room has already queued
    /// `SessionJoined` on `sender` and told the other members.
    pub async fn join(
        &self,
        participant: ParticipantInfo,
        sender: ParticipantSender,
    ) -> Result<RoomInfo, RelayError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RoomCommand::Join {
            participant,
            sender,
            reply: reply_tx,
        })
        .await?;
        reply_rx
            .await
            .map_err(|_| RelayError::Unavailable(self.session_id))?
    }

    /// Removes a participant. Returns how many members remain.
    pub async fn leave(&self, participant: ParticipantId) -> Result<usize, RelayError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RoomCommand::Leave {
            participant,
            reply: reply_tx,
        })
        .await?;
        reply_rx
            .await
            .map_err(|_| RelayError::Unavailable(self.session_id))?
    }

    /// Forwards game bytes from `from` to `to`.
    pub async fn route(
        &self,
        from: ParticipantId,
        to: Recipient,
        channel: Channel,
        data: Vec<u8>,
    ) -> Result<(), RelayError> {
        self.send(RoomCommand::Route {
            from,
            to,
            channel,
            data,
        })
        .await
    }

    pub async fn info(&self) -> Result<RoomInfo, RelayError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RoomCommand::GetInfo { reply: reply_tx }).await?;
        reply_rx
            .await
            .map_err(|_| RelayError::Unavailable(self.session_id))
    }

    pub async fn shutdown(&self) -> Result<(), RelayError> {
        self.send(RoomCommand::Shutdown).await
    }

    async fn send(&self, cmd: RoomCommand) -> Result<(), RelayError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| RelayError::Unavailable(self.session_id))
    }
}

struct Member {
    info: ParticipantInfo,
    sender: ParticipantSender,
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor {
    session_id: SessionId,
    config: RoomConfig,
    /// Ordered by id, so the lowest id is always first.
    members: BTreeMap<ParticipantId, Member>,
    authority: Option<ParticipantId>,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomActor {
    async fn run(mut self) {
        tracing::info!(session = %self.session_id, name = %self.config.name, "room actor started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                RoomCommand::Join {
                    participant,
                    sender,
                    reply,
                } => {
                    let _ = reply.send(self.handle_join(participant, sender));
                }
                RoomCommand::Leave { participant, reply } => {
                    let _ = reply.send(self.handle_leave(participant));
                }
                RoomCommand::Route {
                    from,
                    to,
                    channel,
                    data,
                } => self.handle_route(from, to, channel, data),
                RoomCommand::GetInfo { reply } => {
                    let _ = reply.send(self.info());
                }
                RoomCommand::Shutdown => {
                    tracing::info!(session = %self.session_id, "room shutting down");
                    break;
                }
            }
        }

        tracing::info!(session = %self.session_id, "room actor stopped");
    }

    fn handle_join(
        &mut self,
        participant: ParticipantInfo,
        sender: ParticipantSender,
    ) -> Result<RoomInfo, RelayError> {
        let id = participant.id;
        if self.members.contains_key(&id) {
            return Err(RelayError::AlreadyInSession(id, self.session_id));
        }
        if self.members.len() >= self.config.max_participants {
            return Err(RelayError::SessionFull(self.session_id));
        }

        // The first member (the creator) holds authority.
        let authority = *self.authority.get_or_insert(id);
        self.broadcast(&Outbound::system(SystemMessage::ParticipantEntered {
            participant: participant.clone(),
        }));
        self.members.insert(
            id,
            Member {
                info: participant,
                sender,
            },
        );

        let joined = SystemMessage::SessionJoined {
            session_id: self.session_id,
            name: self.config.name.clone(),
            participants: self.members.values().map(|m| m.info.clone()).collect(),
            authority,
            max_participants: self.config.max_participants,
        };
        self.send_to(id, Outbound::system(joined));

        tracing::info!(
            session = %self.session_id,
            participant = %id,
            %authority,
            members = self.members.len(),
            "participant joined"
        );
        Ok(self.info())
    }

    /// Removes a member. If it held authority, the lowest remaining id
    /// takes over and is announced before the departure itself, so the
    /// new authority already owns the roster when it hears who left.
    fn handle_leave(&mut self, participant: ParticipantId) -> Result<usize, RelayError> {
        if self.members.remove(&participant).is_none() {
            return Err(RelayError::NotInSession(participant));
        }

        if self.authority == Some(participant) {
            self.authority = self.members.keys().next().copied();
            if let Some(next) = self.authority {
                tracing::info!(
                    session = %self.session_id,
                    previous = %participant,
                    authority = %next,
                    "authority reassigned"
                );
                self.broadcast(&Outbound::system(SystemMessage::AuthorityChanged {
                    authority: next,
                }));
            }
        }
        self.broadcast(&Outbound::system(SystemMessage::ParticipantLeft {
            participant_id: participant,
        }));

        tracing::info!(
            session = %self.session_id,
            %participant,
            members = self.members.len(),
            "participant left"
        );
        Ok(self.members.len())
    }

    fn handle_route(&self, from: ParticipantId, to: Recipient, channel: Channel, data: Vec<u8>) {
        if !self.members.contains_key(&from) {
            tracing::warn!(session = %self.session_id, %from, "route from non-member, ignoring");
            return;
        }
        let outbound = Outbound {
            channel,
            payload: Payload::Deliver { from, data },
        };
        match to {
            Recipient::All => self.broadcast(&outbound),
            Recipient::AllExcept(excluded) => {
                for (id, member) in &self.members {
                    if *id != excluded {
                        let _ = member.sender.send(outbound.clone());
                    }
                }
            }
            Recipient::Participant(target) => {
                if !self.send_to(target, outbound) {
                    tracing::debug!(session = %self.session_id, %from, %target, "route to unknown participant");
                }
            }
            Recipient::Authority => match self.authority {
                Some(authority) => {
                    self.send_to(authority, outbound);
                }
                None => tracing::debug!(session = %self.session_id, %from, "no authority to route to"),
            },
        }
    }

    fn broadcast(&self, outbound: &Outbound) {
        for member in self.members.values() {
            let _ = member.sender.send(outbound.clone());
        }
    }

    /// Sends to one member. Returns `false` if it is not in the room. A
    /// closed sender (connection going away) is not an error here.
    fn send_to(&self, participant: ParticipantId, outbound: Outbound) -> bool {
        match self.members.get(&participant) {
            Some(member) => {
                let _ = member.sender.send(outbound);
                true
            }
            None => false,
        }
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            session_id: self.session_id,
            config: self.config.clone(),
            participant_count: self.members.len(),
            authority: self.authority,
        }
    }
}

/// Spawns a new room actor task and returns a handle to it.
///
/// `channel_size` bounds the command queue; senders wait when it is full.
pub(crate) fn spawn_room(
    session_id: SessionId,
    config: RoomConfig,
    channel_size: usize,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(channel_size.max(1));

    let actor = RoomActor {
        session_id,
        config,
        members: BTreeMap::new(),
        authority: None,
        receiver: rx,
    };

    tokio::spawn(actor.run());

    RoomHandle {
        session_id,
        sender: tx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max: usize) -> RoomConfig {
        RoomConfig {
            name: "arena-1".into(),
            game_version: "1.0".into(),
            max_participants: max,
        }
    }

    fn info(id: u32) -> ParticipantInfo {
        ParticipantInfo {
            id: ParticipantId(id),
            display_name: format!("p{id}"),
        }
    }

    fn system(outbound: Outbound) -> SystemMessage {
        match outbound.payload {
            Payload::System(msg) => msg,
            other => panic!("expected system message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_join_first_member_becomes_authority() {
        let room = spawn_room(SessionId(1), config(4), 8);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let info = room.join(self::info(1), tx).await.unwrap();
        assert_eq!(info.authority, Some(ParticipantId(1)));

        match system(rx.recv().await.unwrap()) {
            SystemMessage::SessionJoined {
                authority,
                participants,
                ..
            } => {
                assert_eq!(authority, ParticipantId(1));
                assert_eq!(participants.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_join_full_room_is_refused() {
        let room = spawn_room(SessionId(1), config(1), 8);
        let (tx, _rx) = mpsc::unbounded_channel();
        room.join(info(1), tx.clone()).await.unwrap();
        let result = room.join(info(2), tx).await;
        assert!(matches!(result, Err(RelayError::SessionFull(_))));
    }

    #[tokio::test]
    async fn test_join_twice_is_refused() {
        let room = spawn_room(SessionId(1), config(4), 8);
        let (tx, _rx) = mpsc::unbounded_channel();
        room.join(info(1), tx.clone()).await.unwrap();
        let result = room.join(info(1), tx).await;
        assert!(matches!(result, Err(RelayError::AlreadyInSession(..))));
    }

    #[tokio::test]
    async fn test_leave_authority_announces_successor_first() {
        let room = spawn_room(SessionId(1), config(4), 8);
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx3, mut rx3) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        room.join(info(1), tx1).await.unwrap();
        room.join(info(3), tx3).await.unwrap();
        room.join(info(2), tx2).await.unwrap();
        // SessionJoined, ParticipantEntered(2)
        rx3.recv().await.unwrap();
        rx3.recv().await.unwrap();

        assert_eq!(room.leave(ParticipantId(1)).await.unwrap(), 2);
        assert_eq!(
            system(rx3.recv().await.unwrap()),
            SystemMessage::AuthorityChanged {
                authority: ParticipantId(2)
            }
        );
        assert_eq!(
            system(rx3.recv().await.unwrap()),
            SystemMessage::ParticipantLeft {
                participant_id: ParticipantId(1)
            }
        );
    }

    #[tokio::test]
    async fn test_route_from_non_member_is_dropped() {
        let room = spawn_room(SessionId(1), config(4), 8);
        let (tx, mut rx) = mpsc::unbounded_channel();
        room.join(info(1), tx).await.unwrap();
        rx.recv().await.unwrap();

        room.route(ParticipantId(9), Recipient::All, Channel::Unreliable, vec![1])
            .await
            .unwrap();
        // GetInfo is processed after the route, so the queue is settled.
        room.info().await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
