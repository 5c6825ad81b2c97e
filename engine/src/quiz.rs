use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::errors::QuizConfigError;

pub const MIN_TIME_LIMIT_SECS: u32 = 5;
pub const MAX_TIME_LIMIT_SECS: u32 = 300;
pub const MAX_POINTS: u32 = 10_000;
/// Cap for questions scored per sub-answer (multiple-choice).
pub const MAX_MULTI_POINTS: u32 = 1_000;

/// Index into a question's answer list.
pub type AnswerId = usize;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    Single,
    Multiple,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub correct: bool,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    pub kind: QuestionKind,
    pub time_limit_secs: u32,
    pub points: u32,
    pub answers: Vec<Answer>,
}

impl Question {
    pub fn time_limit_ms(&self) -> u64 {
        u64::from(self.time_limit_secs) * 1_000
    }

    pub fn correct_ids(&self) -> Vec<AnswerId> {
        self.answers
            .iter()
            .enumerate()
            .filter(|(_, a)| a.correct)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn correct_set(&self) -> BTreeSet<AnswerId> {
        self.correct_ids().into_iter().collect()
    }

    fn validate(&self, index: usize) -> Result<(), QuizConfigError> {
        if self.time_limit_secs < MIN_TIME_LIMIT_SECS || self.time_limit_secs > MAX_TIME_LIMIT_SECS
        {
            return Err(QuizConfigError::TimeLimitOutOfBounds {
                index,
                seconds: self.time_limit_secs,
                min: MIN_TIME_LIMIT_SECS,
                max: MAX_TIME_LIMIT_SECS,
            });
        }
        let max = match self.kind {
            QuestionKind::Single => MAX_POINTS,
            QuestionKind::Multiple => MAX_MULTI_POINTS,
        };
        if self.points == 0 || self.points > max {
            return Err(QuizConfigError::PointsOutOfBounds {
                index,
                points: self.points,
                max,
            });
        }
        if self.answers.len() < 2 {
            return Err(QuizConfigError::TooFewAnswers { index });
        }
        let correct = self.answers.iter().filter(|a| a.correct).count();
        match self.kind {
            QuestionKind::Single if correct != 1 => {
                Err(QuizConfigError::SingleChoiceCorrectCount { index })
            }
            QuestionKind::Multiple if correct == 0 => {
                Err(QuizConfigError::NoCorrectAnswer { index })
            }
            _ => Ok(()),
        }
    }
}

/// A fully-authored quiz as supplied by the authoring collaborator.
/// The numeric bounds are re-checked defensively at session creation.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub questions: Vec<Question>,
}

impl Quiz {
    pub fn validate(&self) -> Result<(), QuizConfigError> {
        if self.questions.is_empty() {
            return Err(QuizConfigError::EmptyQuiz);
        }
        for (index, question) in self.questions.iter().enumerate() {
            question.validate(index)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn question(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }
}
