use crate::config::LiveConfig;
use crate::events::{EventBus, EventReceiver, SessionEvent, SessionSnapshot};
use crate::machine::{PhaseKind, SessionState, Transition};
use crate::timer::TimerService;
use qf_engine::mode::SessionMode;
use qf_engine::participant::ParticipantId;
use qf_engine::quiz::{AnswerId, Quiz};
use qf_engine::report::SessionSummary;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

pub type SessionId = String;

/// Per-session tunables, seeded from the process-wide defaults and
/// optionally overridden at creation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    pub speed_floor: f64,
    pub elimination_fraction: f64,
    pub questions_per_match: usize,
    pub presenting_ms: u64,
    pub reveal_hold_ms: u64,
}

impl SessionConfig {
    pub fn from_defaults(defaults: &LiveConfig) -> Self {
        Self {
            speed_floor: defaults.speed_floor,
            elimination_fraction: defaults.elimination_fraction,
            questions_per_match: defaults.questions_per_match,
            presenting_ms: defaults.presenting_ms,
            reveal_hold_ms: defaults.reveal_hold_ms,
        }
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if !(0.0..=1.0).contains(&self.speed_floor) {
            return Err(SessionError::InvalidSessionConfig(format!(
                "speed floor {} outside 0.0-1.0",
                self.speed_floor
            )));
        }
        if self.elimination_fraction <= 0.0 || self.elimination_fraction >= 1.0 {
            return Err(SessionError::InvalidSessionConfig(format!(
                "elimination fraction {} outside (0.0, 1.0)",
                self.elimination_fraction
            )));
        }
        if self.questions_per_match == 0 {
            return Err(SessionError::InvalidSessionConfig(
                "questions per match must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_defaults(&LiveConfig::default())
    }
}

/// Registry of live sessions plus the command surface the transport layer
/// calls into. Commands for one session are serialized by that session's
/// state mutex; the registry lock is only ever held for lookup, insert and
/// eviction, never across session work.
#[derive(Debug)]
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Arc<LiveSession>>>,
    event_bus: EventBus,
    timers: TimerService,
    defaults: LiveConfig,
    /// Handed to timer callbacks so a fired deadline can re-enter the
    /// command surface without keeping the manager alive on its own.
    self_ref: Weak<SessionManager>,
}

#[derive(Debug)]
struct LiveSession {
    state: Mutex<SessionState>,
}

impl SessionManager {
    pub fn new(event_bus: EventBus, defaults: LiveConfig) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            sessions: RwLock::new(HashMap::new()),
            event_bus,
            timers: TimerService::new(),
            defaults,
            self_ref: self_ref.clone(),
        })
    }

    pub fn create_session(
        &self,
        mode: SessionMode,
        quiz: Quiz,
        config: Option<SessionConfig>,
    ) -> Result<SessionId, SessionError> {
        let config = config.unwrap_or_else(|| SessionConfig::from_defaults(&self.defaults));
        let id = Uuid::new_v4().to_string();
        let state = SessionState::new(id.clone(), mode, quiz, config)?;
        let session = Arc::new(LiveSession {
            state: Mutex::new(state),
        });
        self.event_bus.open_channel(id.clone());
        self.event_bus.publish(
            &id,
            SessionEvent::SessionCreated {
                session_id: id.clone(),
                mode,
            },
        );
        {
            let mut guard = self
                .sessions
                .write()
                .map_err(|_| SessionError::StoragePoisoned)?;
            guard.insert(id.clone(), session);
        }
        info!(session = %id, mode = mode.as_str(), "session created");
        Ok(id)
    }

    pub fn join_session(
        &self,
        session_id: &str,
        participant_id: impl Into<ParticipantId>,
        handle: impl Into<String>,
    ) -> Result<(), SessionError> {
        let session = self.get(session_id)?;
        let mut state = session
            .state
            .lock()
            .map_err(|_| SessionError::StoragePoisoned)?;
        let event = state.join(participant_id, handle)?;
        self.event_bus.publish(session_id, event);
        Ok(())
    }

    pub fn start_session(&self, session_id: &str) -> Result<(), SessionError> {
        let session = self.get(session_id)?;
        let mut state = session
            .state
            .lock()
            .map_err(|_| SessionError::StoragePoisoned)?;
        let transition = state.start(Instant::now())?;
        info!(session = %session_id, "session started");
        self.apply(session_id, transition);
        Ok(())
    }

    pub fn submit_answer(
        &self,
        session_id: &str,
        participant_id: &str,
        question_index: usize,
        answer_ids: Vec<AnswerId>,
    ) -> Result<(), SessionError> {
        self.submit_answer_at(
            session_id,
            participant_id,
            question_index,
            answer_ids,
            Instant::now(),
        )
    }

    /// Clock-explicit variant of `submit_answer`, used directly by tests.
    pub fn submit_answer_at(
        &self,
        session_id: &str,
        participant_id: &str,
        question_index: usize,
        answer_ids: Vec<AnswerId>,
        now: Instant,
    ) -> Result<(), SessionError> {
        let session = self.get(session_id)?;
        let mut state = session
            .state
            .lock()
            .map_err(|_| SessionError::StoragePoisoned)?;
        let event = state.submit(participant_id, question_index, answer_ids, now)?;
        self.event_bus.publish(session_id, event);
        Ok(())
    }

    /// Idempotent: cancelling a finished or already-cancelled session is
    /// accepted and changes nothing.
    pub fn cancel_session(&self, session_id: &str, reason: &str) -> Result<(), SessionError> {
        let session = self.get(session_id)?;
        let mut state = session
            .state
            .lock()
            .map_err(|_| SessionError::StoragePoisoned)?;
        let transition = state.cancel(reason, Instant::now());
        if transition.events.is_empty() {
            return Ok(());
        }
        for event in transition.events {
            self.event_bus.publish(session_id, event);
        }
        drop(state);
        self.timers.cancel(session_id);
        self.schedule_eviction(session_id);
        info!(session = %session_id, reason = %reason, "session cancelled");
        Ok(())
    }

    pub fn disconnect_participant(
        &self,
        session_id: &str,
        participant_id: &str,
    ) -> Result<(), SessionError> {
        let session = self.get(session_id)?;
        let mut state = session
            .state
            .lock()
            .map_err(|_| SessionError::StoragePoisoned)?;
        state.disconnect(participant_id)
    }

    /// Timer callback: advance whatever phase the deadline was armed for.
    /// Stale epochs (the session has moved on or was cancelled) are
    /// discarded silently.
    pub fn on_deadline(&self, session_id: &str, epoch: u64) {
        let Ok(session) = self.get(session_id) else {
            debug!(session = %session_id, "deadline for evicted session discarded");
            return;
        };
        let Ok(mut state) = session.state.lock() else {
            return;
        };
        let Some(transition) = state.advance(epoch, Instant::now()) else {
            debug!(session = %session_id, epoch, "stale deadline discarded");
            return;
        };
        self.apply(session_id, transition);
        if state.is_terminal() {
            drop(state);
            self.schedule_eviction(session_id);
        }
    }

    /// Subscribe to a session's event stream. The snapshot and the
    /// receiver are taken under the session lock, so the first live event
    /// a subscriber sees is exactly `snapshot.seq + 1`.
    pub fn subscribe(
        &self,
        session_id: &str,
    ) -> Result<(SessionSnapshot, EventReceiver), SessionError> {
        let session = self.get(session_id)?;
        let state = session
            .state
            .lock()
            .map_err(|_| SessionError::StoragePoisoned)?;
        let (seq, rx) = self
            .event_bus
            .subscribe(session_id)
            .ok_or_else(|| SessionError::SessionNotFound(session_id.to_string()))?;
        Ok((state.snapshot(Instant::now(), seq), rx))
    }

    /// Fresh snapshot plus receiver for a subscriber that lagged out of
    /// the catch-up buffer.
    pub fn resync(
        &self,
        session_id: &str,
    ) -> Result<(SessionSnapshot, EventReceiver), SessionError> {
        self.subscribe(session_id)
    }

    pub fn snapshot(&self, session_id: &str) -> Result<SessionSnapshot, SessionError> {
        let session = self.get(session_id)?;
        let state = session
            .state
            .lock()
            .map_err(|_| SessionError::StoragePoisoned)?;
        Ok(state.snapshot(Instant::now(), self.event_bus.last_seq(session_id)))
    }

    pub fn phase(&self, session_id: &str) -> Result<PhaseKind, SessionError> {
        let session = self.get(session_id)?;
        let state = session
            .state
            .lock()
            .map_err(|_| SessionError::StoragePoisoned)?;
        Ok(state.phase_kind())
    }

    /// Serializable record for the persistence collaborator.
    pub fn summary(&self, session_id: &str) -> Result<SessionSummary, SessionError> {
        let session = self.get(session_id)?;
        let state = session
            .state
            .lock()
            .map_err(|_| SessionError::StoragePoisoned)?;
        Ok(state.summary())
    }

    pub fn active_sessions(&self) -> Vec<SessionId> {
        match self.sessions.read() {
            Ok(guard) => guard.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Backstop eviction sweep for sessions whose retention deadline was
    /// lost (for example across a runtime restart). Normal eviction is
    /// timer-driven.
    pub fn sweep_expired(&self) {
        let retention = Duration::from_secs(self.defaults.retention_secs);
        let now = Instant::now();
        let mut evicted = Vec::new();
        let mut guard = match self.sessions.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.retain(|id, session| {
            let keep = match session.state.lock() {
                Ok(state) => !state.expired(now, retention),
                Err(_) => false,
            };
            if !keep {
                evicted.push(id.clone());
            }
            keep
        });
        drop(guard);
        for id in &evicted {
            self.event_bus.close_channel(id);
            self.timers.cancel(id);
            info!(session = %id, "session evicted");
        }
    }

    pub fn event_bus(&self) -> EventBus {
        self.event_bus.clone()
    }

    pub(crate) fn timers(&self) -> &TimerService {
        &self.timers
    }

    fn get(&self, session_id: &str) -> Result<Arc<LiveSession>, SessionError> {
        self.sessions
            .read()
            .map_err(|_| SessionError::StoragePoisoned)?
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::SessionNotFound(session_id.to_string()))
    }

    /// Publish a transition's events (in order, still under the caller's
    /// session lock) and arm the next deadline if there is one.
    fn apply(&self, session_id: &str, transition: Transition) {
        for event in transition.events {
            self.event_bus.publish(session_id, event);
        }
        if let Some((epoch, delay)) = transition.deadline {
            let weak = self.self_ref.clone();
            let sid = session_id.to_string();
            self.timers.schedule(session_id, delay, move || {
                if let Some(manager) = weak.upgrade() {
                    manager.on_deadline(&sid, epoch);
                }
            });
        }
    }

    fn schedule_eviction(&self, session_id: &str) {
        let retention = Duration::from_secs(self.defaults.retention_secs);
        let weak = self.self_ref.clone();
        let sid = session_id.to_string();
        self.timers.schedule(session_id, retention, move || {
            if let Some(manager) = weak.upgrade() {
                manager.evict(&sid);
            }
        });
    }

    fn evict(&self, session_id: &str) {
        let mut guard = match self.sessions.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.remove(session_id).is_some() {
            drop(guard);
            self.event_bus.close_channel(session_id);
            self.timers.cancel(session_id);
            info!(session = %session_id, "session evicted");
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),
    #[error("Invalid session config: {0}")]
    InvalidSessionConfig(String),
    #[error("Session is not accepting new participants")]
    SessionNotJoinable,
    #[error("Participant already joined: {0}")]
    DuplicateParticipant(ParticipantId),
    #[error("Session already started")]
    AlreadyStarted,
    #[error("Not enough participants: need {required}, have {actual}")]
    InsufficientParticipants { required: usize, actual: usize },
    #[error("Answer window is closed")]
    AnswerWindowClosed,
    #[error("Answer already submitted for this question")]
    DuplicateAnswer,
    #[error("Participant is not active: {0}")]
    ParticipantNotActive(ParticipantId),
    #[error("Submitted for question {got}, current question is {expected}")]
    QuestionMismatch { expected: usize, got: usize },
    #[error("Chosen answers are not valid for this question")]
    InvalidChoice,
    #[error("Session storage poisoned")]
    StoragePoisoned,
}
