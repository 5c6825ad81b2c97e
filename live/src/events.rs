use crate::machine::PhaseKind;
use crate::session::SessionId;
use qf_engine::bracket::NodeRef;
use qf_engine::mode::SessionMode;
use qf_engine::participant::ParticipantId;
use qf_engine::quiz::AnswerId;
use qf_engine::report::RankingEntry;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

pub type EventReceiver = broadcast::Receiver<Arc<EventEnvelope>>;

const DEFAULT_CAPACITY: usize = 256;

/// Fan-out hub: one bounded broadcast ring per session. Every published
/// event carries a per-session sequence number, strictly increasing in
/// publication order. A receiver that falls behind the ring sees
/// `RecvError::Lagged` and must ask the session manager for a fresh
/// snapshot instead of replaying unbounded history.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

#[derive(Debug, Default)]
struct EventBusInner {
    channels: RwLock<HashMap<SessionId, SessionChannel>>,
    capacity: Option<usize>,
}

#[derive(Debug)]
struct SessionChannel {
    tx: broadcast::Sender<Arc<EventEnvelope>>,
    seq: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(EventBusInner {
                channels: RwLock::new(HashMap::new()),
                capacity: Some(capacity),
            }),
        }
    }

    fn capacity(&self) -> usize {
        self.inner.capacity.unwrap_or(DEFAULT_CAPACITY)
    }

    pub fn open_channel(&self, session_id: SessionId) {
        let mut guard = self
            .inner
            .channels
            .write()
            .expect("fan-out channel lock poisoned");
        guard.entry(session_id).or_insert_with(|| {
            let (tx, _) = broadcast::channel(self.capacity());
            SessionChannel {
                tx,
                seq: AtomicU64::new(0),
            }
        });
    }

    pub fn close_channel(&self, session_id: &str) {
        let mut guard = self
            .inner
            .channels
            .write()
            .expect("fan-out channel lock poisoned");
        guard.remove(session_id);
    }

    /// Publish an event, assigning the next sequence number. Sending never
    /// blocks; subscribers consume from the ring at their own pace.
    /// Returns the assigned sequence number.
    pub fn publish(&self, session_id: &str, event: SessionEvent) -> u64 {
        let guard = self
            .inner
            .channels
            .read()
            .expect("fan-out channel lock poisoned");
        let Some(channel) = guard.get(session_id) else {
            return 0;
        };
        let seq = channel.seq.fetch_add(1, Ordering::AcqRel) + 1;
        // send() errs only when no receiver is subscribed; fine either way.
        let _ = channel.tx.send(Arc::new(EventEnvelope { seq, event }));
        seq
    }

    /// Subscribe to a session's live feed. Returns the last sequence number
    /// published before the subscription took effect; the receiver sees
    /// every event after it.
    pub fn subscribe(&self, session_id: &str) -> Option<(u64, EventReceiver)> {
        let guard = self
            .inner
            .channels
            .read()
            .expect("fan-out channel lock poisoned");
        let channel = guard.get(session_id)?;
        let rx = channel.tx.subscribe();
        Some((channel.seq.load(Ordering::Acquire), rx))
    }

    pub fn last_seq(&self, session_id: &str) -> u64 {
        let guard = self
            .inner
            .channels
            .read()
            .expect("fan-out channel lock poisoned");
        guard
            .get(session_id)
            .map(|c| c.seq.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        let guard = self
            .inner
            .channels
            .read()
            .expect("fan-out channel lock poisoned");
        guard.values().map(|c| c.tx.receiver_count()).sum()
    }
}

/// An event plus its position in the session's totally-ordered stream.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    pub seq: u64,
    #[serde(flatten)]
    pub event: SessionEvent,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionCreated {
        session_id: SessionId,
        mode: SessionMode,
    },
    ParticipantJoined {
        participant_id: ParticipantId,
        handle: String,
    },
    QuestionStarted {
        question_index: usize,
        time_limit_secs: u32,
        participants: Vec<ParticipantId>,
    },
    /// Acknowledgement only; the score is withheld until the reveal.
    AnswerAccepted {
        participant_id: ParticipantId,
    },
    QuestionRevealed {
        question_index: usize,
        correct_answer_ids: Vec<AnswerId>,
        scores: Vec<ParticipantScore>,
    },
    LeaderboardUpdate {
        scores: Vec<ParticipantScore>,
    },
    ParticipantEliminated {
        participant_ids: Vec<ParticipantId>,
    },
    MatchResult {
        node: NodeRef,
        winner: ParticipantId,
    },
    SessionCompleted {
        winner: Option<ParticipantId>,
        ranking: Vec<RankingEntry>,
    },
    SessionCancelled {
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ParticipantScore {
    pub participant_id: ParticipantId,
    pub points: u32,
}

/// Synthesized current-state record handed to a subscriber before its
/// live feed, so late joiners never observe a gap.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub phase: PhaseKind,
    pub question_index: Option<usize>,
    pub time_remaining_ms: Option<u64>,
    pub scoreboard: Vec<ParticipantScore>,
    pub seq: u64,
}
