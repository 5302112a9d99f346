//! Per-connection handler: handshake, then a loop that pumps frames in
//! both directions.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive Handshake → validate version → assign a ParticipantId
//!   2. Send HandshakeAck
//!   3. Loop: client frames → system handling or routing;
//!      room frames → the connection

use std::sync::Arc;

use topspin_protocol::{
    Channel, Codec, Envelope, PROTOCOL_VERSION, ParticipantId, ParticipantInfo, Payload,
    SystemMessage,
};
use topspin_transport::Connection;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::relay::RelayState;
use crate::{Outbound, RelayError, RoomConfig, RoomHandle};

/// Drop guard that takes the participant out of its room when the handler
/// exits, whichever way it exits.
///
/// `Drop` is synchronous, so it spawns a fire-and-forget task for the
/// async lock.
struct MembershipGuard<C: Codec> {
    participant: ParticipantId,
    state: Arc<RelayState<C>>,
}

impl<C: Codec> Drop for MembershipGuard<C> {
    fn drop(&mut self) {
        let participant = self.participant;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let mut rooms = state.rooms.lock().await;
            if rooms.session_of(participant).is_some() {
                if let Err(e) = rooms.leave(participant).await {
                    tracing::debug!(%participant, error = %e, "leave on disconnect failed");
                }
            }
        });
    }
}

/// Per-connection state.
struct Link<'a, Conn: Connection, C: Codec> {
    conn: &'a Conn,
    state: &'a Arc<RelayState<C>>,
    participant: ParticipantInfo,
    outbound: mpsc::UnboundedSender<Outbound>,
    /// The room we are in, cached so routing skips the manager lock.
    room: Option<RoomHandle>,
    seq: u64,
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<Conn, C>(
    conn: Conn,
    state: Arc<RelayState<C>>,
) -> Result<(), RelayError>
where
    Conn: Connection,
    C: Codec,
{
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    let participant = perform_handshake(&conn, &state).await?;
    let participant_id = participant.id;
    tracing::info!(%conn_id, participant = %participant_id, name = %participant.display_name, "participant connected");

    let _guard = MembershipGuard {
        participant: participant_id,
        state: Arc::clone(&state),
    };
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut link = Link {
        conn: &conn,
        state: &state,
        participant,
        outbound: tx,
        room: None,
        seq: 1,
    };

    let idle_timeout = state.config.idle_timeout;
    let mut deadline = Instant::now() + idle_timeout;
    let result = loop {
        tokio::select! {
            received = conn.recv() => {
                let data = match received {
                    Ok(Some(data)) => data,
                    Ok(None) => {
                        tracing::info!(participant = %participant_id, "connection closed cleanly");
                        break Ok(());
                    }
                    Err(e) => {
                        tracing::debug!(participant = %participant_id, error = %e, "recv error");
                        break Err(e.into());
                    }
                };
                deadline = Instant::now() + idle_timeout;
                match link.handle_frame(&data).await {
                    Ok(true) => break Ok(()),
                    Ok(false) => {}
                    Err(e) => break Err(e),
                }
            }
            Some(outbound) = rx.recv() => {
                if let Err(e) = link.write(outbound).await {
                    break Err(e);
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                tracing::info!(participant = %participant_id, "connection timed out");
                break Ok(());
            }
        }
    };

    let _ = conn.close().await;
    // _guard drops here → the participant leaves its room.
    result
}

/// Receives the Handshake, validates it, and sends the HandshakeAck.
async fn perform_handshake<Conn, C>(
    conn: &Conn,
    state: &Arc<RelayState<C>>,
) -> Result<ParticipantInfo, RelayError>
where
    Conn: Connection,
    C: Codec,
{
    let data = match tokio::time::timeout(state.config.handshake_timeout, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(RelayError::Handshake("connection closed before handshake".into()));
        }
        Ok(Err(e)) => return Err(RelayError::Transport(e)),
        Err(_) => return Err(RelayError::Handshake("handshake timed out".into())),
    };

    let envelope: Envelope = state.codec.decode(&data)?;
    let Payload::System(SystemMessage::Handshake {
        version,
        display_name,
    }) = envelope.payload
    else {
        send_error(conn, state, 400, "expected Handshake", 0).await?;
        return Err(RelayError::Handshake("first message must be Handshake".into()));
    };

    if version != PROTOCOL_VERSION {
        send_error(
            conn,
            state,
            400,
            &format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}"),
            0,
        )
        .await?;
        return Err(RelayError::VersionMismatch {
            expected: PROTOCOL_VERSION,
            got: version,
        });
    }

    let participant = ParticipantInfo {
        id: state.next_participant(),
        display_name,
    };
    let ack = Envelope::system(
        0,
        state.elapsed_ms(),
        SystemMessage::HandshakeAck {
            participant_id: participant.id,
            server_time: state.elapsed_ms(),
        },
    );
    conn.send(&state.codec.encode(&ack)?).await?;
    Ok(participant)
}

impl<Conn: Connection, C: Codec> Link<'_, Conn, C> {
    /// Handles one frame from the client. Returns `true` if the connection
    /// should close.
    async fn handle_frame(&mut self, data: &[u8]) -> Result<bool, RelayError> {
        let envelope: Envelope = match self.state.codec.decode(data) {
            Ok(env) => env,
            Err(e) => {
                tracing::debug!(participant = %self.participant.id, error = %e, "failed to decode envelope");
                return Ok(false);
            }
        };

        match envelope.payload {
            Payload::System(msg) => self.handle_system(msg).await,
            Payload::Route { to, data } => {
                let Some(room) = self.room.clone() else {
                    self.error(404, "not in a session").await?;
                    return Ok(false);
                };
                if let Err(e) = room.route(self.participant.id, to, envelope.channel, data).await {
                    tracing::debug!(participant = %self.participant.id, error = %e, "route failed");
                    self.room = None;
                    self.error(410, &e.to_string()).await?;
                }
                Ok(false)
            }
            Payload::Deliver { .. } => {
                tracing::debug!(participant = %self.participant.id, "client sent Deliver, ignoring");
                Ok(false)
            }
        }
    }

    async fn handle_system(&mut self, msg: SystemMessage) -> Result<bool, RelayError> {
        let id = self.participant.id;
        match msg {
            SystemMessage::Heartbeat { client_time } => {
                let ack = SystemMessage::HeartbeatAck {
                    client_time,
                    server_time: self.state.elapsed_ms(),
                };
                self.write(Outbound::system(ack)).await?;
            }

            SystemMessage::JoinRandom { game_version } => {
                let result = {
                    let mut rooms = self.state.rooms.lock().await;
                    rooms
                        .join_random(self.participant.clone(), &game_version, self.outbound.clone())
                        .await
                };
                match result {
                    Ok(Some(handle)) => self.room = Some(handle),
                    // Not found: stay silent, the client times out.
                    Ok(None) => {}
                    Err(e) => {
                        let reason = e.to_string();
                        self.write(Outbound::system(SystemMessage::JoinFailed { reason }))
                            .await?;
                    }
                }
            }

            SystemMessage::CreateSession {
                game_version,
                name,
                max_participants,
            } => {
                let config = RoomConfig {
                    name,
                    game_version,
                    max_participants: max_participants.clamp(1, self.state.config.max_room_size),
                };
                let result = {
                    let mut rooms = self.state.rooms.lock().await;
                    rooms
                        .create(self.participant.clone(), config, self.outbound.clone())
                        .await
                };
                match result {
                    Ok(handle) => self.room = Some(handle),
                    Err(e) => {
                        let reason = e.to_string();
                        self.write(Outbound::system(SystemMessage::CreateFailed { reason }))
                            .await?;
                    }
                }
            }

            SystemMessage::LeaveSession => {
                self.room = None;
                let mut rooms = self.state.rooms.lock().await;
                if let Err(e) = rooms.leave(id).await {
                    tracing::debug!(participant = %id, error = %e, "leave failed");
                }
            }

            SystemMessage::Disconnect { reason } => {
                tracing::info!(participant = %id, %reason, "client disconnected");
                return Ok(true);
            }

            _ => {
                tracing::debug!(participant = %id, "ignoring unexpected system message");
            }
        }
        Ok(false)
    }

    /// Writes one frame to the connection.
    async fn write(&mut self, outbound: Outbound) -> Result<(), RelayError> {
        let envelope = Envelope {
            seq: next_seq(&mut self.seq),
            timestamp: self.state.elapsed_ms(),
            channel: outbound.channel,
            payload: outbound.payload,
        };
        let bytes = self.state.codec.encode(&envelope)?;
        if envelope.channel == Channel::Unreliable {
            self.conn.send_unreliable(&bytes).await?;
        } else {
            self.conn.send(&bytes).await?;
        }
        Ok(())
    }

    async fn error(&mut self, code: u16, message: &str) -> Result<(), RelayError> {
        let msg = SystemMessage::Error {
            code,
            message: message.to_string(),
        };
        self.write(Outbound::system(msg)).await
    }
}

/// Sends a SystemMessage::Error envelope outside the message loop.
async fn send_error<Conn, C>(
    conn: &Conn,
    state: &RelayState<C>,
    code: u16,
    message: &str,
    seq: u64,
) -> Result<(), RelayError>
where
    Conn: Connection,
    C: Codec,
{
    let envelope = Envelope::system(
        seq,
        state.elapsed_ms(),
        SystemMessage::Error {
            code,
            message: message.to_string(),
        },
    );
    conn.send(&state.codec.encode(&envelope)?).await?;
    Ok(())
}

/// Increments and returns the next sequence number.
fn next_seq(seq: &mut u64) -> u64 {
    let current = *seq;
    *seq += 1;
    current
}
