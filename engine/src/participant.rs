use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::quiz::AnswerId;

pub type ParticipantId = String;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    Active,
    Eliminated,
    Disconnected,
}

/// One accepted answer submission, recorded at submit time.
/// `points` stays zero until the question is revealed and scored.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_index: usize,
    pub answer_ids: Vec<AnswerId>,
    pub elapsed_ms: u64,
    pub points: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Participant {
    id: ParticipantId,
    handle: String,
    joined_at: DateTime<Utc>,
    score: u32,
    status: ParticipantStatus,
    answers: BTreeMap<usize, AnswerRecord>,
}

impl Participant {
    pub fn new(id: impl Into<ParticipantId>, handle: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            handle: handle.into(),
            joined_at: Utc::now(),
            score: 0,
            status: ParticipantStatus::Active,
            answers: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn joined_at(&self) -> DateTime<Utc> {
        self.joined_at
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn status(&self) -> ParticipantStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == ParticipantStatus::Active
    }

    /// Still part of the running game: answers are only accepted from
    /// active participants, but a disconnected one keeps its seat and
    /// scores zero until it is eliminated or the session ends.
    pub fn in_round(&self) -> bool {
        matches!(
            self.status,
            ParticipantStatus::Active | ParticipantStatus::Disconnected
        )
    }

    pub fn answer(&self, question_index: usize) -> Option<&AnswerRecord> {
        self.answers.get(&question_index)
    }

    pub fn answer_mut(&mut self, question_index: usize) -> Option<&mut AnswerRecord> {
        self.answers.get_mut(&question_index)
    }

    pub fn record_answer(&mut self, record: AnswerRecord) {
        self.answers.insert(record.question_index, record);
    }

    pub fn add_points(&mut self, points: u32) {
        self.score = self.score.saturating_add(points);
    }

    pub fn eliminate(&mut self) {
        self.status = ParticipantStatus::Eliminated;
    }

    pub fn mark_disconnected(&mut self) {
        if self.status == ParticipantStatus::Active {
            self.status = ParticipantStatus::Disconnected;
        }
    }
}
