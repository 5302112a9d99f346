//! The session context: one object holding "who am I, where am I, who
//! decides".
//!
//! Every gameplay component receives a `&SessionContext` instead of
//! reaching for global state. The [`SessionCoordinator`](crate::SessionCoordinator)
//! is the only writer; everything else reads.

use std::collections::BTreeMap;

use topspin_protocol::{ParticipantId, ParticipantInfo, SessionId};

use crate::SessionConfig;

// ---------------------------------------------------------------------------
// Roster
// ---------------------------------------------------------------------------

/// The participants currently in the session, ordered by id.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    members: BTreeMap<ParticipantId, ParticipantInfo>,
}

impl Roster {
    /// Adds or replaces a participant. Returns `true` if it was new.
    pub fn insert(&mut self, info: ParticipantInfo) -> bool {
        self.members.insert(info.id, info).is_none()
    }

    /// Removes a participant.
    pub fn remove(&mut self, id: ParticipantId) -> Option<ParticipantInfo> {
        self.members.remove(&id)
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        self.members.contains_key(&id)
    }

    pub fn get(&self, id: ParticipantId) -> Option<&ParticipantInfo> {
        self.members.get(&id)
    }

    /// Participant ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        self.members.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParticipantInfo> {
        self.members.values()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn clear(&mut self) {
        self.members.clear();
    }
}

// ---------------------------------------------------------------------------
// RoleChange
// ---------------------------------------------------------------------------

/// How an authority update affected the local participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleChange {
    /// The local participant's role did not change.
    Unchanged,
    /// The local participant is now the authority.
    Promoted,
    /// The local participant was the authority and no longer is.
    Demoted,
}

// ---------------------------------------------------------------------------
// SessionContext
// ---------------------------------------------------------------------------

/// Facts about the joined session.
#[derive(Debug, Clone)]
pub struct JoinedSession {
    pub id: SessionId,
    pub name: String,
    pub max_participants: usize,
}

/// Shared, read-mostly view of the local participant's session.
#[derive(Debug, Clone)]
pub struct SessionContext {
    config: SessionConfig,
    local: Option<ParticipantId>,
    session: Option<JoinedSession>,
    authority: Option<ParticipantId>,
    roster: Roster,
}

impl SessionContext {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            local: None,
            session: None,
            authority: None,
            roster: Roster::default(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The id the relay assigned on handshake, if connected.
    pub fn local_id(&self) -> Option<ParticipantId> {
        self.local
    }

    /// The joined session, if any.
    pub fn session(&self) -> Option<&JoinedSession> {
        self.session.as_ref()
    }

    pub fn in_session(&self) -> bool {
        self.session.is_some()
    }

    /// The participant currently holding authority.
    pub fn authority(&self) -> Option<ParticipantId> {
        self.authority
    }

    /// Whether the local participant holds authority. Always `false`
    /// outside a session.
    pub fn is_authority(&self) -> bool {
        self.session.is_some() && self.local.is_some() && self.local == self.authority
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Whether `id` is the local participant.
    pub fn is_local(&self, id: ParticipantId) -> bool {
        self.local == Some(id)
    }

    // -- writes (coordinator only) ------------------------------------------

    pub(crate) fn set_local(&mut self, id: ParticipantId) {
        self.local = Some(id);
    }

    pub(crate) fn enter_session(
        &mut self,
        session: JoinedSession,
        participants: Vec<ParticipantInfo>,
        authority: ParticipantId,
    ) -> RoleChange {
        self.session = Some(session);
        self.roster.clear();
        for info in participants {
            self.roster.insert(info);
        }
        self.set_authority(authority)
    }

    pub(crate) fn add_participant(&mut self, info: ParticipantInfo) -> bool {
        self.roster.insert(info)
    }

    pub(crate) fn remove_participant(&mut self, id: ParticipantId) -> bool {
        self.roster.remove(id).is_some()
    }

    pub(crate) fn set_authority(&mut self, authority: ParticipantId) -> RoleChange {
        let was = self.is_authority();
        self.authority = Some(authority);
        match (was, self.is_authority()) {
            (false, true) => RoleChange::Promoted,
            (true, false) => RoleChange::Demoted,
            _ => RoleChange::Unchanged,
        }
    }

    /// Forgets the session. Returns `Demoted` if the local participant
    /// held authority.
    pub(crate) fn leave_session(&mut self) -> RoleChange {
        let was = self.is_authority();
        self.session = None;
        self.authority = None;
        self.roster.clear();
        if was {
            RoleChange::Demoted
        } else {
            RoleChange::Unchanged
        }
    }

    /// Forgets the session and the connection identity.
    pub(crate) fn reset(&mut self) -> RoleChange {
        let change = self.leave_session();
        self.local = None;
        change
    }
}
