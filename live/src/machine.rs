use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::warn;

use qf_engine::bracket::{Bracket, NodeRef};
use qf_engine::elimination::{eliminate, EliminationPolicy, RoundResult};
use qf_engine::mode::SessionMode;
use qf_engine::participant::{AnswerRecord, Participant, ParticipantId};
use qf_engine::quiz::{AnswerId, Quiz};
use qf_engine::report::{AnswerLogEntry, CompletionReason, RankingEntry, SessionSummary};
use qf_engine::scoring::{self, QuestionOutcome, SpeedCurve};

use crate::events::{ParticipantScore, SessionEvent, SessionSnapshot};
use crate::session::{SessionConfig, SessionError, SessionId};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Lobby,
    Presenting,
    Collecting,
    Revealing,
    Completed,
    Cancelled,
}

/// Lifecycle phase. Transitions are monotonic: a session never returns
/// to an earlier phase, and the terminal phases accept no transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Lobby,
    Presenting {
        question: usize,
        until: Instant,
    },
    Collecting {
        question: usize,
        opened: Instant,
        until: Instant,
    },
    Revealing {
        question: usize,
        until: Instant,
    },
    Completed,
    Cancelled,
}

impl Phase {
    pub fn kind(&self) -> PhaseKind {
        match self {
            Phase::Lobby => PhaseKind::Lobby,
            Phase::Presenting { .. } => PhaseKind::Presenting,
            Phase::Collecting { .. } => PhaseKind::Collecting,
            Phase::Revealing { .. } => PhaseKind::Revealing,
            Phase::Completed => PhaseKind::Completed,
            Phase::Cancelled => PhaseKind::Cancelled,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::Cancelled)
    }

    fn question(&self) -> Option<usize> {
        match self {
            Phase::Presenting { question, .. }
            | Phase::Collecting { question, .. }
            | Phase::Revealing { question, .. } => Some(*question),
            _ => None,
        }
    }

    fn until(&self) -> Option<Instant> {
        match self {
            Phase::Presenting { until, .. }
            | Phase::Collecting { until, .. }
            | Phase::Revealing { until, .. } => Some(*until),
            _ => None,
        }
    }
}

/// Post-reveal strategy, selected once by session mode.
#[derive(Debug)]
enum ModeState {
    Standard,
    BattleRoyale { policy: EliminationPolicy },
    Tournament { bracket: Bracket, current: Option<MatchState> },
}

#[derive(Debug)]
struct MatchState {
    node: NodeRef,
    players: [ParticipantId; 2],
    questions_done: usize,
    points: [u32; 2],
    elapsed_ms: [u64; 2],
    correct: [bool; 2],
}

impl MatchState {
    fn new(node: NodeRef, a: ParticipantId, b: ParticipantId) -> Self {
        Self {
            node,
            players: [a, b],
            questions_done: 0,
            points: [0, 0],
            elapsed_ms: [0, 0],
            correct: [false, false],
        }
    }

    fn slot(&self, participant_id: &str) -> Option<usize> {
        self.players.iter().position(|p| p == participant_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NextStep {
    Question(usize),
    Complete {
        reason: CompletionReason,
        winner: Option<ParticipantId>,
    },
}

/// Result of a state transition: events to fan out (in order) and, if the
/// session keeps running, the deadline for the next timer-driven advance,
/// tagged with the epoch it belongs to.
#[derive(Debug, Default, PartialEq)]
pub struct Transition {
    pub events: Vec<SessionEvent>,
    pub deadline: Option<(u64, Duration)>,
}

/// One live session's entire mutable state. Exclusively owned by the
/// session manager behind a per-session mutex; nothing in here is shared.
#[derive(Debug)]
pub struct SessionState {
    id: SessionId,
    mode: SessionMode,
    mode_state: ModeState,
    quiz: Quiz,
    config: SessionConfig,
    phase: Phase,
    epoch: u64,
    participants: BTreeMap<ParticipantId, Participant>,
    join_order: Vec<ParticipantId>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<Instant>,
    completion: Option<CompletionReason>,
    winner: Option<ParticipantId>,
    answer_log: Vec<AnswerLogEntry>,
    pending: Option<NextStep>,
}

impl SessionState {
    pub fn new(
        id: SessionId,
        mode: SessionMode,
        quiz: Quiz,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        quiz.validate()
            .map_err(|e| SessionError::InvalidSessionConfig(e.to_string()))?;
        config.validate()?;
        let mode_state = match mode {
            SessionMode::Standard => ModeState::Standard,
            SessionMode::BattleRoyale => ModeState::BattleRoyale {
                policy: EliminationPolicy {
                    fraction: config.elimination_fraction,
                },
            },
            // The bracket is built from the final roster at start.
            SessionMode::Tournament => ModeState::Tournament {
                bracket: Bracket::new(&[]),
                current: None,
            },
        };
        Ok(Self {
            id,
            mode,
            mode_state,
            quiz,
            config,
            phase: Phase::Lobby,
            epoch: 0,
            participants: BTreeMap::new(),
            join_order: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            completion: None,
            winner: None,
            answer_log: Vec::new(),
            pending: None,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn phase_kind(&self) -> PhaseKind {
        self.phase.kind()
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Completed or cancelled long enough ago to be evicted.
    pub fn expired(&self, now: Instant, retention: Duration) -> bool {
        match self.finished_at {
            Some(finished) if self.phase.is_terminal() => {
                now.saturating_duration_since(finished) >= retention
            }
            _ => false,
        }
    }

    pub fn join(
        &mut self,
        participant_id: impl Into<ParticipantId>,
        handle: impl Into<String>,
    ) -> Result<SessionEvent, SessionError> {
        if self.phase != Phase::Lobby {
            return Err(SessionError::SessionNotJoinable);
        }
        let participant_id = participant_id.into();
        let handle = handle.into();
        let taken = self.participants.contains_key(&participant_id)
            || self.participants.values().any(|p| p.handle() == handle);
        if taken {
            return Err(SessionError::DuplicateParticipant(participant_id));
        }
        self.participants.insert(
            participant_id.clone(),
            Participant::new(participant_id.clone(), handle.clone()),
        );
        self.join_order.push(participant_id.clone());
        Ok(SessionEvent::ParticipantJoined {
            participant_id,
            handle,
        })
    }

    pub fn start(&mut self, now: Instant) -> Result<Transition, SessionError> {
        if self.phase != Phase::Lobby {
            return Err(SessionError::AlreadyStarted);
        }
        let roster = self.join_order.len();
        let required = self.mode.min_participants();
        if roster < required {
            return Err(SessionError::InsufficientParticipants { required, actual: roster });
        }
        if self.mode == SessionMode::Tournament {
            let bracket = Bracket::new(&self.join_order);
            let needed = bracket.total_matches() * self.config.questions_per_match;
            if self.quiz.len() < needed {
                return Err(SessionError::InvalidSessionConfig(format!(
                    "tournament with {} entrants needs {} questions, quiz has {}",
                    roster,
                    needed,
                    self.quiz.len()
                )));
            }
            let current = bracket
                .next_match()
                .map(|(node, a, b)| MatchState::new(node, a.clone(), b.clone()));
            self.mode_state = ModeState::Tournament { bracket, current };
        }
        self.started_at = Some(Utc::now());
        Ok(self.enter_presenting(0, now))
    }

    pub fn submit(
        &mut self,
        participant_id: &str,
        question_index: usize,
        answer_ids: Vec<AnswerId>,
        now: Instant,
    ) -> Result<SessionEvent, SessionError> {
        let (question, opened, until) = match self.phase {
            Phase::Collecting {
                question,
                opened,
                until,
            } => (question, opened, until),
            _ => return Err(SessionError::AnswerWindowClosed),
        };
        if question_index != question {
            return Err(SessionError::QuestionMismatch {
                expected: question,
                got: question_index,
            });
        }
        let active = self
            .participants
            .get(participant_id)
            .map(|p| p.is_active())
            .unwrap_or(false);
        if !active {
            return Err(SessionError::ParticipantNotActive(participant_id.into()));
        }
        if let ModeState::Tournament { current, .. } = &self.mode_state {
            let in_match = current
                .as_ref()
                .map(|m| m.slot(participant_id).is_some())
                .unwrap_or(false);
            if !in_match {
                return Err(SessionError::ParticipantNotActive(participant_id.into()));
            }
        }
        if now > until {
            return Err(SessionError::AnswerWindowClosed);
        }
        let answer_count = self
            .quiz
            .question(question)
            .map(|q| q.answers.len())
            .unwrap_or(0);
        let mut unique = answer_ids.clone();
        unique.sort_unstable();
        unique.dedup();
        if answer_ids.is_empty()
            || unique.len() != answer_ids.len()
            || answer_ids.iter().any(|&id| id >= answer_count)
        {
            return Err(SessionError::InvalidChoice);
        }
        let participant = self
            .participants
            .get_mut(participant_id)
            .ok_or_else(|| SessionError::ParticipantNotActive(participant_id.into()))?;
        if participant.answer(question).is_some() {
            return Err(SessionError::DuplicateAnswer);
        }
        participant.record_answer(AnswerRecord {
            question_index: question,
            answer_ids,
            elapsed_ms: now.saturating_duration_since(opened).as_millis() as u64,
            points: 0,
        });
        Ok(SessionEvent::AnswerAccepted {
            participant_id: participant_id.into(),
        })
    }

    /// Timer callback entry point. A stale epoch (the session has since
    /// transitioned) or a terminal phase is a silent no-op.
    pub fn advance(&mut self, epoch: u64, now: Instant) -> Option<Transition> {
        if epoch != self.epoch || self.phase.is_terminal() {
            return None;
        }
        match self.phase {
            Phase::Presenting { question, .. } => Some(self.open_collecting(question, now)),
            Phase::Collecting { question, .. } => Some(self.reveal(question, now)),
            Phase::Revealing { .. } => Some(self.apply_pending(now)),
            Phase::Lobby | Phase::Completed | Phase::Cancelled => None,
        }
    }

    pub fn cancel(&mut self, reason: &str, now: Instant) -> Transition {
        if self.phase.is_terminal() {
            return Transition::default();
        }
        self.epoch += 1;
        self.phase = Phase::Cancelled;
        self.finished_at = Some(now);
        self.completion = Some(CompletionReason::Cancelled);
        Transition {
            events: vec![SessionEvent::SessionCancelled {
                reason: reason.to_string(),
            }],
            deadline: None,
        }
    }

    pub fn disconnect(&mut self, participant_id: &str) -> Result<(), SessionError> {
        if self.phase.is_terminal() {
            return Ok(());
        }
        let participant = self
            .participants
            .get_mut(participant_id)
            .ok_or_else(|| SessionError::ParticipantNotActive(participant_id.into()))?;
        participant.mark_disconnected();
        Ok(())
    }

    pub fn snapshot(&self, now: Instant, seq: u64) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            phase: self.phase.kind(),
            question_index: self.phase.question(),
            time_remaining_ms: self
                .phase
                .until()
                .map(|until| until.saturating_duration_since(now).as_millis() as u64),
            scoreboard: self.scoreboard(),
            seq,
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id.clone(),
            mode: self.mode,
            winner: self.winner.clone(),
            ranking: self.ranking(),
            answer_log: self.answer_log.clone(),
            completion: self.completion,
            ts: None,
        }
    }

    pub fn scoreboard(&self) -> Vec<ParticipantScore> {
        let mut entries: Vec<ParticipantScore> = self
            .participants
            .values()
            .map(|p| ParticipantScore {
                participant_id: p.id().into(),
                points: p.score(),
            })
            .collect();
        entries.sort_by(|a, b| {
            scoring::ranking_order(
                (a.participant_id.as_str(), a.points),
                (b.participant_id.as_str(), b.points),
            )
        });
        entries
    }

    fn ranking(&self) -> Vec<RankingEntry> {
        let mut entries: Vec<RankingEntry> = self
            .participants
            .values()
            .map(|p| RankingEntry {
                participant_id: p.id().into(),
                handle: p.handle().into(),
                score: p.score(),
                status: p.status(),
            })
            .collect();
        entries.sort_by(|a, b| {
            scoring::ranking_order(
                (a.participant_id.as_str(), a.score),
                (b.participant_id.as_str(), b.score),
            )
        });
        entries
    }

    /// Participants taking part in the current question: the paired
    /// players for a tournament match, everyone still in the game
    /// otherwise.
    fn round_roster(&self) -> Vec<ParticipantId> {
        if let ModeState::Tournament { current, .. } = &self.mode_state {
            return current
                .as_ref()
                .map(|m| m.players.to_vec())
                .unwrap_or_default();
        }
        self.join_order
            .iter()
            .filter(|id| {
                self.participants
                    .get(*id)
                    .map(|p| p.in_round())
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    fn enter_presenting(&mut self, question: usize, now: Instant) -> Transition {
        self.epoch += 1;
        let hold = Duration::from_millis(self.config.presenting_ms);
        self.phase = Phase::Presenting {
            question,
            until: now + hold,
        };
        let time_limit_secs = self
            .quiz
            .question(question)
            .map(|q| q.time_limit_secs)
            .unwrap_or_default();
        Transition {
            events: vec![SessionEvent::QuestionStarted {
                question_index: question,
                time_limit_secs,
                participants: self.round_roster(),
            }],
            deadline: Some((self.epoch, hold)),
        }
    }

    fn open_collecting(&mut self, question: usize, now: Instant) -> Transition {
        self.epoch += 1;
        let limit = self
            .quiz
            .question(question)
            .map(|q| Duration::from_millis(q.time_limit_ms()))
            .unwrap_or_default();
        self.phase = Phase::Collecting {
            question,
            opened: now,
            until: now + limit,
        };
        Transition {
            events: Vec::new(),
            deadline: Some((self.epoch, limit)),
        }
    }

    /// Score the question for every participant in the round, emit the
    /// reveal and leaderboard, then let the mode strategy pick what comes
    /// next. Unanswered submissions score zero.
    fn reveal(&mut self, question_index: usize, now: Instant) -> Transition {
        self.epoch += 1;
        let Some(question) = self.quiz.question(question_index).cloned() else {
            warn!(session = %self.id, question_index, "reveal for unknown question");
            return Transition::default();
        };
        let curve = SpeedCurve {
            floor: self.config.speed_floor,
        };

        let roster = self.round_roster();
        let mut per_question = Vec::with_capacity(roster.len());
        let mut outcomes = Vec::with_capacity(roster.len());
        for participant_id in &roster {
            let Some(participant) = self.participants.get_mut(participant_id) else {
                continue;
            };
            let record = participant.answer(question_index).cloned();
            let points = scoring::score(&question, record.as_ref(), curve);
            let correct = record
                .as_ref()
                .map(|r| scoring::is_correct(&question, &r.answer_ids))
                .unwrap_or(false);
            if let Some(rec) = participant.answer_mut(question_index) {
                rec.points = points;
                self.answer_log.push(AnswerLogEntry {
                    participant_id: participant_id.clone(),
                    question_index,
                    answer_ids: rec.answer_ids.clone(),
                    elapsed_ms: rec.elapsed_ms,
                    points,
                });
            }
            participant.add_points(points);
            per_question.push(ParticipantScore {
                participant_id: participant_id.clone(),
                points,
            });
            outcomes.push(QuestionOutcome {
                participant_id: participant_id.clone(),
                points,
                correct,
                elapsed_ms: record.as_ref().map(|r| r.elapsed_ms),
            });
        }

        let mut events = vec![
            SessionEvent::QuestionRevealed {
                question_index,
                correct_answer_ids: question.correct_ids(),
                scores: per_question.clone(),
            },
            SessionEvent::LeaderboardUpdate {
                scores: self.scoreboard(),
            },
        ];

        self.pending = Some(self.after_reveal(question_index, &per_question, &outcomes, &mut events));

        let hold = Duration::from_millis(self.config.reveal_hold_ms);
        self.phase = Phase::Revealing {
            question: question_index,
            until: now + hold,
        };
        Transition {
            events,
            deadline: Some((self.epoch, hold)),
        }
    }

    fn after_reveal(
        &mut self,
        question_index: usize,
        per_question: &[ParticipantScore],
        outcomes: &[QuestionOutcome],
        events: &mut Vec<SessionEvent>,
    ) -> NextStep {
        let last_question = question_index + 1 >= self.quiz.len();
        match &mut self.mode_state {
            ModeState::Standard => {
                if last_question {
                    NextStep::Complete {
                        reason: CompletionReason::Finished,
                        winner: self.top_of(None),
                    }
                } else {
                    NextStep::Question(question_index + 1)
                }
            }
            ModeState::BattleRoyale { policy } => {
                let policy = *policy;
                let mut round = RoundResult::new();
                for entry in per_question {
                    round.record(entry.participant_id.clone(), entry.points);
                }
                let result = eliminate(&round, policy);
                for id in &result.eliminated {
                    if let Some(p) = self.participants.get_mut(id) {
                        p.eliminate();
                    }
                }
                if !result.eliminated.is_empty() {
                    events.push(SessionEvent::ParticipantEliminated {
                        participant_ids: result.eliminated.clone(),
                    });
                }
                if result.survivors.len() <= 1 {
                    NextStep::Complete {
                        reason: CompletionReason::LastSurvivor,
                        winner: result.survivors.first().cloned(),
                    }
                } else if last_question {
                    NextStep::Complete {
                        reason: CompletionReason::Finished,
                        winner: self.top_of(Some(&result.survivors)),
                    }
                } else {
                    NextStep::Question(question_index + 1)
                }
            }
            ModeState::Tournament { bracket, current } => tournament_after_reveal(
                &self.id,
                bracket,
                current,
                &mut self.participants,
                self.config.questions_per_match,
                question_index,
                outcomes,
                events,
            ),
        }
    }

    fn apply_pending(&mut self, now: Instant) -> Transition {
        match self.pending.take() {
            Some(NextStep::Question(question)) => self.enter_presenting(question, now),
            Some(NextStep::Complete { reason, winner }) => self.complete(reason, winner, now),
            None => {
                warn!(session = %self.id, "reveal hold expired with nothing pending");
                self.epoch += 1;
                Transition::default()
            }
        }
    }

    fn complete(
        &mut self,
        reason: CompletionReason,
        winner: Option<ParticipantId>,
        now: Instant,
    ) -> Transition {
        self.epoch += 1;
        self.phase = Phase::Completed;
        self.finished_at = Some(now);
        self.completion = Some(reason);
        self.winner = winner.clone();
        Transition {
            events: vec![SessionEvent::SessionCompleted {
                winner,
                ranking: self.ranking(),
            }],
            deadline: None,
        }
    }

    /// Highest cumulative scorer, optionally restricted to the given ids;
    /// ties break toward the lexicographically smaller participant id.
    fn top_of(&self, within: Option<&[ParticipantId]>) -> Option<ParticipantId> {
        let mut best: Option<(&str, u32)> = None;
        for p in self.participants.values() {
            if let Some(ids) = within {
                if !ids.iter().any(|id| id == p.id()) {
                    continue;
                }
            }
            let candidate = (p.id(), p.score());
            best = match best {
                Some(current)
                    if scoring::ranking_order(current, candidate)
                        != std::cmp::Ordering::Greater =>
                {
                    Some(current)
                }
                _ => Some(candidate),
            };
        }
        best.map(|(id, _)| id.to_string())
    }
}

/// Fold a revealed question into the running match, resolve the bracket
/// node once the match has used its allotted questions, and pick what
/// the session does next.
#[allow(clippy::too_many_arguments)]
fn tournament_after_reveal(
    session_id: &str,
    bracket: &mut Bracket,
    current: &mut Option<MatchState>,
    participants: &mut BTreeMap<ParticipantId, Participant>,
    questions_per_match: usize,
    question_index: usize,
    outcomes: &[QuestionOutcome],
    events: &mut Vec<SessionEvent>,
) -> NextStep {
    let Some(m) = current.as_mut() else {
        warn!(session = %session_id, "tournament reveal without a match");
        return NextStep::Complete {
            reason: CompletionReason::BracketResolved,
            winner: bracket.winner().cloned(),
        };
    };
    for outcome in outcomes {
        let Some(slot) = m.slot(&outcome.participant_id) else {
            continue;
        };
        m.points[slot] += outcome.points;
        if outcome.correct {
            m.correct[slot] = true;
            m.elapsed_ms[slot] += outcome.elapsed_ms.unwrap_or(0);
        }
    }
    m.questions_done += 1;
    if m.questions_done < questions_per_match {
        return NextStep::Question(question_index + 1);
    }

    let aggregates: Vec<QuestionOutcome> = (0..2)
        .map(|slot| QuestionOutcome {
            participant_id: m.players[slot].clone(),
            points: m.points[slot],
            correct: m.correct[slot],
            elapsed_ms: m.correct[slot].then_some(m.elapsed_ms[slot]),
        })
        .collect();
    // Two entries in, always one out.
    let winner = match scoring::question_winner(&aggregates) {
        Some(w) => w.participant_id.clone(),
        None => m.players[0].clone(),
    };
    let node = m.node;
    if let Err(e) = bracket.record_winner(node, &winner) {
        warn!(session = %session_id, error = %e, "bracket rejected winner");
    }
    for player in &m.players {
        if *player != winner {
            if let Some(p) = participants.get_mut(player) {
                p.eliminate();
            }
        }
    }
    events.push(SessionEvent::MatchResult {
        node,
        winner: winner.clone(),
    });

    if let Some(root_winner) = bracket.winner().cloned() {
        *current = None;
        return NextStep::Complete {
            reason: CompletionReason::BracketResolved,
            winner: Some(root_winner),
        };
    }
    match bracket.next_match() {
        Some((node, a, b)) => {
            let (a, b) = (a.clone(), b.clone());
            *current = Some(MatchState::new(node, a, b));
            NextStep::Question(question_index + 1)
        }
        None => {
            warn!(session = %session_id, "bracket stalled without next match");
            *current = None;
            NextStep::Complete {
                reason: CompletionReason::BracketResolved,
                winner: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qf_engine::quiz::{Answer, Question, QuestionKind};

    fn quiz(questions: usize) -> Quiz {
        Quiz {
            title: "live quiz".into(),
            description: String::new(),
            questions: (0..questions)
                .map(|i| Question {
                    text: format!("question {i}"),
                    kind: QuestionKind::Single,
                    time_limit_secs: 30,
                    points: 100,
                    answers: (0..4)
                        .map(|a| Answer {
                            text: format!("answer {a}"),
                            correct: a == 1,
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    fn config() -> SessionConfig {
        SessionConfig {
            speed_floor: 0.5,
            elimination_fraction: 0.5,
            questions_per_match: 1,
            presenting_ms: 3_000,
            reveal_hold_ms: 5_000,
        }
    }

    fn session(
        mode: SessionMode,
        questions: usize,
        participants: &[&str],
    ) -> SessionState {
        let mut state =
            SessionState::new("s-1".into(), mode, quiz(questions), config()).expect("state");
        for id in participants {
            state.join(*id, format!("handle-{id}")).expect("join");
        }
        state
    }

    fn deadline_epoch(t: &Transition) -> u64 {
        t.deadline.expect("deadline armed").0
    }

    /// Drive start → Presenting → Collecting; returns the epoch of the
    /// collecting deadline.
    fn open_first_question(state: &mut SessionState, t0: Instant) -> u64 {
        let started = state.start(t0).expect("start");
        let collecting = state
            .advance(deadline_epoch(&started), t0)
            .expect("presenting deadline");
        assert_eq!(state.phase_kind(), PhaseKind::Collecting);
        deadline_epoch(&collecting)
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn standard_session_matches_reference_scenario() {
        let t0 = Instant::now();
        let mut state = session(SessionMode::Standard, 1, &["p1", "p2", "p3"]);
        let collect_epoch = open_first_question(&mut state, t0);

        state.submit("p1", 0, vec![1], t0).expect("instant answer");
        state
            .submit("p2", 0, vec![1], t0 + secs(30))
            .expect("buzzer beater");
        // p3 never answers.

        let reveal = state.advance(collect_epoch, t0 + secs(30)).expect("reveal");
        let leaderboard = reveal
            .events
            .iter()
            .find_map(|e| match e {
                SessionEvent::LeaderboardUpdate { scores } => Some(scores.clone()),
                _ => None,
            })
            .expect("leaderboard event");
        let points: Vec<u32> = leaderboard.iter().map(|s| s.points).collect();
        assert_eq!(points, vec![100, 50, 0]);

        let done = state
            .advance(deadline_epoch(&reveal), t0 + secs(35))
            .expect("reveal hold");
        assert_eq!(state.phase_kind(), PhaseKind::Completed);
        match &done.events[0] {
            SessionEvent::SessionCompleted { winner, ranking } => {
                assert_eq!(winner.as_deref(), Some("p1"));
                assert_eq!(ranking[0].score, 100);
                assert_eq!(ranking[2].score, 0);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(done.deadline.is_none());
    }

    #[test]
    fn submission_guards_cover_the_error_taxonomy() {
        let t0 = Instant::now();
        let mut state = session(SessionMode::Standard, 2, &["p1", "p2"]);
        let collect_epoch = open_first_question(&mut state, t0);

        assert_eq!(
            state.submit("p1", 1, vec![1], t0),
            Err(SessionError::QuestionMismatch { expected: 0, got: 1 })
        );
        assert_eq!(
            state.submit("ghost", 0, vec![1], t0),
            Err(SessionError::ParticipantNotActive("ghost".into()))
        );
        assert_eq!(
            state.submit("p1", 0, vec![], t0),
            Err(SessionError::InvalidChoice)
        );
        assert_eq!(
            state.submit("p1", 0, vec![9], t0),
            Err(SessionError::InvalidChoice)
        );
        assert_eq!(
            state.submit("p1", 0, vec![1, 1], t0),
            Err(SessionError::InvalidChoice)
        );
        // Late by the wall clock even though the deadline has not fired.
        assert_eq!(
            state.submit("p1", 0, vec![1], t0 + secs(31)),
            Err(SessionError::AnswerWindowClosed)
        );

        state.submit("p1", 0, vec![1], t0 + secs(1)).expect("first");
        assert_eq!(
            state.submit("p1", 0, vec![1], t0 + secs(2)),
            Err(SessionError::DuplicateAnswer)
        );

        let reveal = state.advance(collect_epoch, t0 + secs(30)).expect("reveal");
        assert_eq!(
            state.submit("p2", 0, vec![1], t0 + secs(30)),
            Err(SessionError::AnswerWindowClosed)
        );
        // Only the first submission counted; score untouched by rejects.
        let leaderboard = reveal
            .events
            .iter()
            .find_map(|e| match e {
                SessionEvent::LeaderboardUpdate { scores } => Some(scores.clone()),
                _ => None,
            })
            .expect("leaderboard event");
        assert_eq!(leaderboard[0].participant_id, "p1");
        assert!(leaderboard[0].points > 0);
        assert_eq!(leaderboard[1].points, 0);
    }

    #[test]
    fn stale_epochs_and_terminal_phases_are_no_ops() {
        let t0 = Instant::now();
        let mut state = session(SessionMode::Standard, 1, &["p1"]);
        let started = state.start(t0).expect("start");
        let stale = deadline_epoch(&started);
        state.advance(stale, t0).expect("presenting deadline");

        assert!(state.advance(stale, t0).is_none()); // epoch has moved on
        assert!(state.advance(999, t0).is_none());

        let cancel = state.cancel("host left", t0);
        assert_eq!(cancel.events.len(), 1);
        assert_eq!(state.phase_kind(), PhaseKind::Cancelled);
        assert!(state.advance(state.epoch(), t0).is_none());
    }

    #[test]
    fn join_rules_enforced() {
        let t0 = Instant::now();
        let mut state = session(SessionMode::Standard, 1, &["p1"]);
        assert_eq!(
            state.join("p1", "other"),
            Err(SessionError::DuplicateParticipant("p1".into()))
        );
        assert_eq!(
            state.join("p9", "handle-p1"),
            Err(SessionError::DuplicateParticipant("p9".into()))
        );
        state.start(t0).expect("start");
        assert_eq!(
            state.join("late", "late"),
            Err(SessionError::SessionNotJoinable)
        );
        assert_eq!(state.start(t0), Err(SessionError::AlreadyStarted));
    }

    #[test]
    fn mode_minimums_enforced_at_start() {
        let t0 = Instant::now();
        let mut state = session(SessionMode::BattleRoyale, 3, &["p1", "p2"]);
        assert_eq!(
            state.start(t0),
            Err(SessionError::InsufficientParticipants { required: 3, actual: 2 })
        );

        let mut state = session(SessionMode::Tournament, 3, &["p1"]);
        assert_eq!(
            state.start(t0),
            Err(SessionError::InsufficientParticipants { required: 2, actual: 1 })
        );
    }

    #[test]
    fn tournament_rejects_too_short_quiz() {
        let t0 = Instant::now();
        // Four entrants need three matches; a two-question quiz cannot
        // cover them.
        let mut state = session(SessionMode::Tournament, 2, &["p0", "p1", "p2", "p3"]);
        assert!(matches!(
            state.start(t0),
            Err(SessionError::InvalidSessionConfig(_))
        ));
    }

    #[test]
    fn battle_royale_round_eliminates_lowest_half() {
        let t0 = Instant::now();
        let mut state = session(
            SessionMode::BattleRoyale,
            2,
            &["pa", "pb", "pc", "pd", "pe"],
        );
        let collect_epoch = open_first_question(&mut state, t0);

        state.submit("pa", 0, vec![1], t0).expect("pa");
        state.submit("pb", 0, vec![1], t0 + secs(15)).expect("pb");
        state.submit("pc", 0, vec![1], t0 + secs(30)).expect("pc");
        state.submit("pd", 0, vec![0], t0).expect("pd wrong");
        // pe silent.

        let reveal = state.advance(collect_epoch, t0 + secs(30)).expect("reveal");
        let eliminated = reveal
            .events
            .iter()
            .find_map(|e| match e {
                SessionEvent::ParticipantEliminated { participant_ids } => {
                    Some(participant_ids.clone())
                }
                _ => None,
            })
            .expect("elimination event");
        assert_eq!(eliminated.len(), 2);
        assert!(eliminated.contains(&"pd".to_string()));
        assert!(eliminated.contains(&"pe".to_string()));

        let next = state
            .advance(deadline_epoch(&reveal), t0 + secs(35))
            .expect("next question");
        match &next.events[0] {
            SessionEvent::QuestionStarted {
                question_index,
                participants,
                ..
            } => {
                assert_eq!(*question_index, 1);
                assert_eq!(participants.len(), 3);
                assert!(!participants.contains(&"pd".to_string()));
                assert!(!participants.contains(&"pe".to_string()));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn battle_royale_stops_at_last_survivor() {
        let t0 = Instant::now();
        let mut state = session(SessionMode::BattleRoyale, 5, &["pa", "pb", "pc"]);
        let mut epoch = open_first_question(&mut state, t0);

        // Round 1: pc scores lowest and goes (k = 1 of 3).
        state.submit("pa", 0, vec![1], t0).expect("pa");
        state.submit("pb", 0, vec![1], t0 + secs(10)).expect("pb");
        let reveal = state.advance(epoch, t0 + secs(30)).expect("reveal 1");
        let next = state
            .advance(deadline_epoch(&reveal), t0 + secs(35))
            .expect("question 2");
        epoch = deadline_epoch(
            &state
                .advance(deadline_epoch(&next), t0 + secs(38))
                .expect("collecting 2"),
        );

        // Round 2: pb scores lowest of the remaining pair.
        let t1 = t0 + secs(38);
        state.submit("pa", 1, vec![1], t1).expect("pa");
        let reveal = state.advance(epoch, t1 + secs(30)).expect("reveal 2");
        let done = state
            .advance(deadline_epoch(&reveal), t1 + secs(35))
            .expect("completion");
        assert_eq!(state.phase_kind(), PhaseKind::Completed);
        match &done.events[0] {
            SessionEvent::SessionCompleted { winner, .. } => {
                assert_eq!(winner.as_deref(), Some("pa"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn tournament_plays_bracket_to_a_single_winner() {
        let t0 = Instant::now();
        let mut state = session(SessionMode::Tournament, 3, &["p0", "p1", "p2", "p3"]);
        let mut collect_epoch = open_first_question(&mut state, t0);

        // Match 1: p0 vs p1; outsiders are locked out.
        assert_eq!(
            state.submit("p2", 0, vec![1], t0),
            Err(SessionError::ParticipantNotActive("p2".into()))
        );
        state.submit("p0", 0, vec![1], t0 + secs(2)).expect("p0");
        state.submit("p1", 0, vec![1], t0 + secs(9)).expect("p1");
        let reveal = state.advance(collect_epoch, t0 + secs(30)).expect("reveal 1");
        let winners: Vec<ParticipantId> = reveal
            .events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::MatchResult { winner, .. } => Some(winner.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(winners, vec!["p0".to_string()]);

        // Match 2: p2 vs p3; only p3 answers.
        let next = state
            .advance(deadline_epoch(&reveal), t0 + secs(35))
            .expect("question 2");
        match &next.events[0] {
            SessionEvent::QuestionStarted { participants, .. } => {
                assert_eq!(participants, &vec!["p2".to_string(), "p3".to_string()]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        collect_epoch = deadline_epoch(
            &state
                .advance(deadline_epoch(&next), t0 + secs(38))
                .expect("collecting 2"),
        );
        let t1 = t0 + secs(38);
        state.submit("p3", 1, vec![1], t1 + secs(1)).expect("p3");
        let reveal = state.advance(collect_epoch, t1 + secs(30)).expect("reveal 2");

        // Final: p0 vs p3, both correct at the same elapsed — the
        // deterministic id tie-break sends p0 through.
        let next = state
            .advance(deadline_epoch(&reveal), t1 + secs(35))
            .expect("final question");
        collect_epoch = deadline_epoch(
            &state
                .advance(deadline_epoch(&next), t1 + secs(38))
                .expect("collecting 3"),
        );
        let t2 = t1 + secs(38);
        state.submit("p0", 2, vec![1], t2 + secs(4)).expect("p0");
        state.submit("p3", 2, vec![1], t2 + secs(4)).expect("p3");
        let reveal = state.advance(collect_epoch, t2 + secs(30)).expect("reveal 3");
        let done = state
            .advance(deadline_epoch(&reveal), t2 + secs(35))
            .expect("completion");
        assert_eq!(state.phase_kind(), PhaseKind::Completed);
        match &done.events[0] {
            SessionEvent::SessionCompleted { winner, .. } => {
                assert_eq!(winner.as_deref(), Some("p0"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        let summary = state.summary();
        assert_eq!(summary.completion, Some(CompletionReason::BracketResolved));
        assert_eq!(summary.winner.as_deref(), Some("p0"));
    }

    #[test]
    fn cancel_is_idempotent_and_final() {
        let t0 = Instant::now();
        let mut state = session(SessionMode::Standard, 1, &["p1"]);
        let collect_epoch = open_first_question(&mut state, t0);

        let first = state.cancel("host left", t0 + secs(3));
        assert_eq!(
            first.events,
            vec![SessionEvent::SessionCancelled {
                reason: "host left".into()
            }]
        );
        let second = state.cancel("again", t0 + secs(4));
        assert!(second.events.is_empty());

        assert_eq!(
            state.submit("p1", 0, vec![1], t0 + secs(5)),
            Err(SessionError::AnswerWindowClosed)
        );
        // The collecting deadline arrives late: discarded.
        assert!(state.advance(collect_epoch, t0 + secs(30)).is_none());
    }

    #[test]
    fn snapshot_tracks_phase_and_countdown() {
        let t0 = Instant::now();
        let mut state = session(SessionMode::Standard, 1, &["p1"]);
        let snap = state.snapshot(t0, 0);
        assert_eq!(snap.phase, PhaseKind::Lobby);
        assert_eq!(snap.time_remaining_ms, None);

        open_first_question(&mut state, t0);
        let snap = state.snapshot(t0 + secs(10), 7);
        assert_eq!(snap.phase, PhaseKind::Collecting);
        assert_eq!(snap.question_index, Some(0));
        assert_eq!(snap.time_remaining_ms, Some(20_000));
        assert_eq!(snap.seq, 7);
        assert_eq!(snap.scoreboard.len(), 1);
    }

    #[test]
    fn disconnected_participants_score_zero_but_stay_ranked() {
        let t0 = Instant::now();
        let mut state = session(SessionMode::Standard, 1, &["p1", "p2"]);
        let collect_epoch = open_first_question(&mut state, t0);

        state.disconnect("p2").expect("disconnect");
        assert_eq!(
            state.submit("p2", 0, vec![1], t0),
            Err(SessionError::ParticipantNotActive("p2".into()))
        );
        state.submit("p1", 0, vec![1], t0).expect("p1");

        let reveal = state.advance(collect_epoch, t0 + secs(30)).expect("reveal");
        state
            .advance(deadline_epoch(&reveal), t0 + secs(35))
            .expect("completion");
        let summary = state.summary();
        assert_eq!(summary.ranking.len(), 2);
        assert_eq!(summary.ranking[1].participant_id, "p2");
        assert_eq!(summary.ranking[1].score, 0);
    }
}

