//! The link task: one connection to the relay.
//!
//! The client opens a fresh link for every `LinkCommand::Connect`. A link
//! dials, performs the handshake, then pumps envelopes in both directions
//! and keeps the relay's idle timer fed with heartbeats. Everything it
//! learns goes back to the update loop as a [`LinkEvent`] tagged with the
//! link's generation, so events from a replaced link are easy to drop.

use std::sync::Arc;
use std::time::Duration;

use topspin_protocol::{
    Channel, Codec, Envelope, GameMessage, JsonCodec, PROTOCOL_VERSION, Payload, SystemMessage,
};
use topspin_session::SessionEvent;
use topspin_transport::{Connection, Connector};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

/// Something a link observed, already translated for the coordinator.
#[derive(Debug)]
pub(crate) struct LinkEvent {
    pub(crate) generation: u64,
    pub(crate) event: SessionEvent,
}

/// What the update loop asks a link to do.
#[derive(Debug)]
pub(crate) enum LinkOut {
    Send { channel: Channel, payload: Payload },
    /// Say goodbye and close.
    Close { reason: String },
}

/// Settings a link needs that do not change between links.
#[derive(Debug, Clone)]
pub(crate) struct LinkSettings {
    pub(crate) display_name: String,
    pub(crate) heartbeat_interval: Duration,
}

/// The update loop's end of a running link.
pub(crate) struct Link {
    generation: u64,
    tx: mpsc::UnboundedSender<LinkOut>,
    task: JoinHandle<()>,
}

impl Link {
    /// Spawns the link task.
    pub(crate) fn open<K: Connector>(
        connector: Arc<K>,
        settings: LinkSettings,
        generation: u64,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(connector, settings, generation, events, rx));
        Self {
            generation,
            tx,
            task,
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Queues an envelope payload. Returns `false` if the link is gone.
    pub(crate) fn send(&self, channel: Channel, payload: Payload) -> bool {
        self.tx.send(LinkOut::Send { channel, payload }).is_ok()
    }

    pub(crate) fn system(&self, message: SystemMessage) -> bool {
        self.send(Channel::ReliableOrdered, Payload::System(message))
    }

    /// Asks the link to disconnect cleanly after everything queued so far.
    pub(crate) fn close(self, reason: String) -> JoinHandle<()> {
        if self.tx.send(LinkOut::Close { reason }).is_err() {
            trace!(generation = self.generation, "link already finished");
        }
        self.task
    }

    /// Drops the link immediately.
    pub(crate) fn abort(self) {
        self.task.abort();
    }
}

/// Maps a relay system message to the session event it stands for.
///
/// Returns `None` for messages the session layer does not care about.
pub(crate) fn session_event(message: SystemMessage) -> Option<SessionEvent> {
    match message {
        SystemMessage::SessionJoined {
            session_id,
            name,
            participants,
            authority,
            max_participants,
        } => Some(SessionEvent::SessionJoined {
            session_id,
            name,
            participants,
            authority,
            max_participants,
        }),
        SystemMessage::JoinFailed { reason } => Some(SessionEvent::JoinFailed { reason }),
        SystemMessage::CreateFailed { reason } => Some(SessionEvent::CreateFailed { reason }),
        SystemMessage::ParticipantEntered { participant } => {
            Some(SessionEvent::ParticipantEntered(participant))
        }
        SystemMessage::ParticipantLeft { participant_id } => {
            Some(SessionEvent::ParticipantLeft(participant_id))
        }
        SystemMessage::AuthorityChanged { authority } => {
            Some(SessionEvent::AuthorityChanged(authority))
        }
        SystemMessage::Error { code, message } => Some(SessionEvent::RelayError { code, message }),
        SystemMessage::Disconnect { reason } => Some(SessionEvent::Disconnected { reason }),
        _ => None,
    }
}

struct Pump<Conn: Connection> {
    conn: Conn,
    codec: JsonCodec,
    seq: u64,
    started: Instant,
}

impl<Conn: Connection> Pump<Conn> {
    async fn write(&mut self, channel: Channel, payload: Payload) -> Result<(), String> {
        self.seq += 1;
        let envelope = Envelope {
            seq: self.seq,
            timestamp: self.started.elapsed().as_millis() as u64,
            channel,
            payload,
        };
        let bytes = self.codec.encode(&envelope).map_err(|e| e.to_string())?;
        let sent = if channel == Channel::Unreliable {
            self.conn.send_unreliable(&bytes).await
        } else {
            self.conn.send(&bytes).await
        };
        sent.map_err(|e| e.to_string())
    }

    /// Decodes one incoming frame into a session event.
    fn read(&self, data: &[u8]) -> Option<SessionEvent> {
        let envelope: Envelope = match self.codec.decode(data) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(error = %e, "dropping undecodable envelope");
                return None;
            }
        };
        match envelope.payload {
            Payload::System(SystemMessage::HeartbeatAck {
                client_time,
                server_time,
            }) => {
                let now = self.started.elapsed().as_millis() as u64;
                trace!(rtt_ms = now.saturating_sub(client_time), server_time, "heartbeat ack");
                None
            }
            Payload::System(message) => session_event(message),
            Payload::Deliver { from, data } => match self.codec.decode::<GameMessage>(&data) {
                Ok(message) => Some(SessionEvent::Message { from, message }),
                Err(e) => {
                    debug!(%from, error = %e, "dropping undecodable game message");
                    None
                }
            },
            Payload::Route { .. } => {
                debug!("relay sent a Route frame, ignoring");
                None
            }
        }
    }
}

async fn run<K: Connector>(
    connector: Arc<K>,
    settings: LinkSettings,
    generation: u64,
    events: mpsc::UnboundedSender<LinkEvent>,
    mut rx: mpsc::UnboundedReceiver<LinkOut>,
) {
    let emit = |event: SessionEvent| {
        // The update loop is gone; the link ends with it.
        let _ = events.send(LinkEvent { generation, event });
    };

    let conn = match connector.connect().await {
        Ok(conn) => conn,
        Err(e) => {
            emit(SessionEvent::ConnectFailed {
                reason: e.to_string(),
            });
            return;
        }
    };
    let mut pump = Pump {
        conn,
        codec: JsonCodec,
        seq: 0,
        started: Instant::now(),
    };

    match handshake(&mut pump, &settings.display_name).await {
        Ok(event) => emit(event),
        Err(reason) => {
            let _ = pump.conn.close().await;
            emit(SessionEvent::ConnectFailed { reason });
            return;
        }
    }
    debug!(generation, conn = %pump.conn.id(), "link up");

    let mut heartbeat = tokio::time::interval_at(
        Instant::now() + settings.heartbeat_interval,
        settings.heartbeat_interval,
    );
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let closed = loop {
        tokio::select! {
            received = pump.conn.recv() => match received {
                Ok(Some(data)) => {
                    if let Some(event) = pump.read(&data) {
                        emit(event);
                    }
                }
                Ok(None) => break Some("connection closed by relay".to_string()),
                Err(e) => break Some(e.to_string()),
            },
            out = rx.recv() => match out {
                Some(LinkOut::Send { channel, payload }) => {
                    if let Err(reason) = pump.write(channel, payload).await {
                        break Some(reason);
                    }
                }
                Some(LinkOut::Close { reason }) => {
                    info!(generation, %reason, "disconnecting");
                    let _ = pump
                        .write(Channel::ReliableOrdered, Payload::System(SystemMessage::Disconnect { reason }))
                        .await;
                    break None;
                }
                None => break None,
            },
            _ = heartbeat.tick() => {
                let client_time = pump.started.elapsed().as_millis() as u64;
                let beat = Payload::System(SystemMessage::Heartbeat { client_time });
                if let Err(reason) = pump.write(Channel::ReliableOrdered, beat).await {
                    break Some(reason);
                }
            }
        }
    };

    let _ = pump.conn.close().await;
    if let Some(reason) = closed {
        warn!(generation, %reason, "link lost");
        emit(SessionEvent::Disconnected { reason });
    }
}

/// Sends our Handshake and waits for the relay's answer.
async fn handshake<Conn: Connection>(
    pump: &mut Pump<Conn>,
    display_name: &str,
) -> Result<SessionEvent, String> {
    let hello = SystemMessage::Handshake {
        version: PROTOCOL_VERSION,
        display_name: display_name.to_string(),
    };
    pump.write(Channel::ReliableOrdered, Payload::System(hello)).await?;

    let data = match pump.conn.recv().await {
        Ok(Some(data)) => data,
        Ok(None) => return Err("connection closed during handshake".to_string()),
        Err(e) => return Err(e.to_string()),
    };
    let envelope: Envelope = pump.codec.decode(&data).map_err(|e| e.to_string())?;
    match envelope.payload {
        Payload::System(SystemMessage::HandshakeAck { participant_id, .. }) => {
            Ok(SessionEvent::Connected { participant_id })
        }
        Payload::System(SystemMessage::Error { code, message }) => {
            Err(format!("handshake rejected ({code}): {message}"))
        }
        other => Err(format!("unexpected handshake reply: {other:?}")),
    }
}
