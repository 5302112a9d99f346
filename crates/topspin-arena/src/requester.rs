//! Client-side spawn requests.
//!
//! A participant without a live entity asks the authority for one, and
//! keeps asking until the entity shows up:
//!
//! ```text
//!  Idle ──request()──→ Waiting ──(own EntitySpawned)──→ Idle
//!                       │  ↑ resend every spawn_request_retry
//!                       │  └─┘
//!                       └──(spawn_request_timeout)──→ Backoff ──(window)──→ Waiting
//! ```
//!
//! Requests, resends included, go to [`Recipient::Authority`] whenever the
//! authority is known. Only while it is unknown are they broadcast; then
//! only the authority acts on them. Duplicates are harmless because the
//! authority's existence check drops them.

use std::time::Duration;

use topspin_protocol::{GameMessage, ParticipantId, Recipient};
use topspin_session::{Outbox, SessionContext};
use topspin_tick::{TimerQueue, TimerToken};
use tracing::{debug, warn};

use crate::{EntityRegistry, SpawnConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestTimer {
    /// Start a request (delayed respawn or the end of a backoff).
    Start,
    Resend,
    GiveUp,
}

/// Where the requester is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequesterState {
    Idle,
    /// A request is scheduled for later.
    Scheduled,
    Waiting,
    /// Gave up; will try again after the retry window.
    Backoff,
}

/// Keeps requesting a spawn for the local participant until one arrives.
pub struct SpawnRequester {
    retry: Duration,
    timeout: Duration,
    window: Duration,
    state: RequesterState,
    timers: TimerQueue<RequestTimer>,
    resend: Option<TimerToken>,
    attempts: u32,
}

impl SpawnRequester {
    pub fn new(config: &SpawnConfig) -> Self {
        Self {
            retry: config.spawn_request_retry,
            timeout: config.spawn_request_timeout,
            window: config.spawn_request_window,
            state: RequesterState::Idle,
            timers: TimerQueue::new(),
            resend: None,
            attempts: 0,
        }
    }

    pub fn state(&self) -> RequesterState {
        self.state
    }

    /// Requests sent in the current round.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Requests a spawn now unless the local participant already has an
    /// entity or a request is in flight.
    pub fn request(
        &mut self,
        ctx: &SessionContext,
        registry: &EntityRegistry,
        outbox: &mut Outbox,
        now: Duration,
    ) {
        if self.state == RequesterState::Waiting {
            return;
        }
        let Some(local) = ctx.local_id().filter(|_| ctx.in_session()) else {
            return;
        };
        if registry.entity_of(local).is_some() {
            return;
        }
        self.timers.clear();
        self.state = RequesterState::Waiting;
        self.attempts = 0;
        self.send(ctx, local, outbox);
        self.resend = Some(self.timers.schedule(now + self.retry, RequestTimer::Resend));
        self.timers.schedule(now + self.timeout, RequestTimer::GiveUp);
    }

    /// Requests a spawn after `delay`, e.g. after a death.
    pub fn request_after(&mut self, delay: Duration, now: Duration) {
        if matches!(self.state, RequesterState::Waiting | RequesterState::Scheduled) {
            return;
        }
        self.timers.clear();
        self.state = RequesterState::Scheduled;
        self.timers.schedule(now + delay, RequestTimer::Start);
    }

    /// Fires due timers. Call once per frame.
    pub fn tick(
        &mut self,
        ctx: &SessionContext,
        registry: &EntityRegistry,
        outbox: &mut Outbox,
        now: Duration,
    ) {
        for (token, timer) in self.timers.drain_due(now) {
            match timer {
                RequestTimer::Start
                    if matches!(self.state, RequesterState::Scheduled | RequesterState::Backoff) =>
                {
                    self.state = RequesterState::Idle;
                    self.request(ctx, registry, outbox, now);
                }
                RequestTimer::Resend if self.resend == Some(token) => {
                    let Some(local) = ctx.local_id() else { continue };
                    if registry.entity_of(local).is_some() {
                        self.satisfied();
                        continue;
                    }
                    self.send(ctx, local, outbox);
                    self.resend =
                        Some(self.timers.schedule(now + self.retry, RequestTimer::Resend));
                }
                RequestTimer::GiveUp if self.state == RequesterState::Waiting => {
                    if let Some(token) = self.resend.take() {
                        self.timers.cancel(token);
                    }
                    warn!(
                        attempts = self.attempts,
                        retry_in_ms = self.window.as_millis() as u64,
                        "spawn request unanswered, backing off"
                    );
                    self.state = RequesterState::Backoff;
                    self.timers.schedule(now + self.window, RequestTimer::Start);
                }
                _ => {}
            }
        }
    }

    /// Notes an `EntitySpawned`. Stops requesting once it is ours.
    pub fn on_entity_spawned(&mut self, ctx: &SessionContext, owner: ParticipantId) {
        if ctx.is_local(owner) && self.state != RequesterState::Idle {
            self.satisfied();
        }
    }

    /// Abandons any pending request.
    pub fn cancel(&mut self) {
        self.timers.clear();
        self.resend = None;
        self.state = RequesterState::Idle;
    }

    fn satisfied(&mut self) {
        debug!(attempts = self.attempts, "spawn request satisfied");
        self.cancel();
    }

    fn send(&mut self, ctx: &SessionContext, local: ParticipantId, outbox: &mut Outbox) {
        self.attempts += 1;
        if ctx.authority().is_some() {
            outbox.reliable(
                Recipient::Authority,
                GameMessage::SpawnRequest { requesting: local },
            );
        } else {
            outbox.reliable(
                Recipient::All,
                GameMessage::SpawnRequestBroadcast { requesting: local },
            );
        }
        debug!(participant = %local, attempt = self.attempts, "spawn requested");
    }
}
