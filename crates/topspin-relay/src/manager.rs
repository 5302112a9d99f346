//! Room manager: creates, tracks, and routes participants to rooms.

use std::collections::HashMap;

use topspin_protocol::{ParticipantId, ParticipantInfo, SessionId};

use crate::room::spawn_room;
use crate::{ParticipantSender, RelayError, RoomConfig, RoomHandle, RoomInfo};

/// Manages all live rooms and tracks which participant is in which room.
///
/// A participant is in at most one room at a time.
pub struct RoomManager {
    rooms: HashMap<SessionId, RoomHandle>,
    participant_rooms: HashMap<ParticipantId, SessionId>,
    next_session: u64,
    channel_size: usize,
}

impl RoomManager {
    pub fn new(channel_size: usize) -> Self {
        Self {
            rooms: HashMap::new(),
            participant_rooms: HashMap::new(),
            next_session: 1,
            channel_size,
        }
    }

    /// Creates a room with `participant` as its first member and
    /// authority.
    pub async fn create(
        &mut self,
        participant: ParticipantInfo,
        config: RoomConfig,
        sender: ParticipantSender,
    ) -> Result<RoomHandle, RelayError> {
        self.ensure_free(participant.id)?;

        let session_id = SessionId(self.next_session);
        self.next_session += 1;
        let handle = spawn_room(session_id, config, self.channel_size);
        tracing::info!(session = %session_id, creator = %participant.id, "room created");

        let id = participant.id;
        if let Err(e) = handle.join(participant, sender).await {
            let _ = handle.shutdown().await;
            return Err(e);
        }
        self.rooms.insert(session_id, handle.clone());
        self.participant_rooms.insert(id, session_id);
        Ok(handle)
    }

    /// Joins the first open room whose version tag matches.
    ///
    /// Returns `Ok(None)` when no room is open; the caller says nothing
    /// back to the client in that case.
    pub async fn join_random(
        &mut self,
        participant: ParticipantInfo,
        game_version: &str,
        sender: ParticipantSender,
    ) -> Result<Option<RoomHandle>, RelayError> {
        self.ensure_free(participant.id)?;

        // Oldest rooms first, so players gather instead of spreading out.
        let mut candidates: Vec<&RoomHandle> = self.rooms.values().collect();
        candidates.sort_by_key(|handle| handle.session_id().0);

        for handle in candidates {
            let Ok(info) = handle.info().await else { continue };
            if !info.is_open_for(game_version) {
                continue;
            }
            // The room can fill between `info` and `join`; keep looking.
            if handle.join(participant.clone(), sender.clone()).await.is_ok() {
                let handle = handle.clone();
                self.participant_rooms
                    .insert(participant.id, handle.session_id());
                return Ok(Some(handle));
            }
        }
        tracing::debug!(participant = %participant.id, %game_version, "no open room");
        Ok(None)
    }

    /// Removes a participant from its room and destroys the room if that
    /// left it empty.
    pub async fn leave(&mut self, participant: ParticipantId) -> Result<SessionId, RelayError> {
        let session_id = self
            .participant_rooms
            .remove(&participant)
            .ok_or(RelayError::NotInSession(participant))?;
        let handle = self
            .rooms
            .get(&session_id)
            .ok_or(RelayError::SessionNotFound(session_id))?;

        let remaining = handle.leave(participant).await?;
        if remaining == 0 {
            self.destroy(session_id).await?;
        }
        Ok(session_id)
    }

    /// Shuts a room down and forgets its members.
    pub async fn destroy(&mut self, session_id: SessionId) -> Result<(), RelayError> {
        let handle = self
            .rooms
            .remove(&session_id)
            .ok_or(RelayError::SessionNotFound(session_id))?;
        let _ = handle.shutdown().await;
        self.participant_rooms.retain(|_, sid| *sid != session_id);
        tracing::info!(session = %session_id, "room destroyed");
        Ok(())
    }

    pub fn session_of(&self, participant: ParticipantId) -> Option<SessionId> {
        self.participant_rooms.get(&participant).copied()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Metadata of every live room. Rooms that fail to answer are skipped.
    pub async fn rooms(&self) -> Vec<RoomInfo> {
        let mut infos = Vec::with_capacity(self.rooms.len());
        for handle in self.rooms.values() {
            if let Ok(info) = handle.info().await {
                infos.push(info);
            }
        }
        infos.sort_by_key(|info| info.session_id.0);
        infos
    }

    fn ensure_free(&self, participant: ParticipantId) -> Result<(), RelayError> {
        match self.participant_rooms.get(&participant) {
            Some(current) => Err(RelayError::AlreadyInSession(participant, *current)),
            None => Ok(()),
        }
    }
}
