use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::participant::{AnswerRecord, ParticipantId};
use crate::quiz::{AnswerId, Question, QuestionKind};

/// Linear speed-bonus curve: factor 1.0 at elapsed 0, decaying to `floor`
/// at the question's time limit, clamped to `[floor, 1.0]`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedCurve {
    pub floor: f64,
}

impl Default for SpeedCurve {
    fn default() -> Self {
        Self { floor: 0.5 }
    }
}

impl SpeedCurve {
    pub fn factor(&self, elapsed_ms: u64, limit_ms: u64) -> f64 {
        if limit_ms == 0 {
            return self.floor;
        }
        let progress = elapsed_ms as f64 / limit_ms as f64;
        let factor = 1.0 - (1.0 - self.floor) * progress;
        factor.clamp(self.floor, 1.0)
    }
}

pub fn is_correct(question: &Question, chosen: &[AnswerId]) -> bool {
    match question.kind {
        QuestionKind::Single => {
            chosen.len() == 1
                && question
                    .answers
                    .get(chosen[0])
                    .map(|a| a.correct)
                    .unwrap_or(false)
        }
        QuestionKind::Multiple => {
            let chosen: BTreeSet<AnswerId> = chosen.iter().copied().collect();
            !chosen.is_empty() && chosen == question.correct_set()
        }
    }
}

/// Pure scoring rule. Absent or incorrect submissions score zero; a correct
/// one earns `points × speed factor`, rounded to the nearest point.
pub fn score(question: &Question, submission: Option<&AnswerRecord>, curve: SpeedCurve) -> u32 {
    let Some(submission) = submission else {
        return 0;
    };
    if !is_correct(question, &submission.answer_ids) {
        return 0;
    }
    let factor = curve.factor(submission.elapsed_ms, question.time_limit_ms());
    (f64::from(question.points) * factor).round() as u32
}

/// One participant's outcome for a question (or an aggregated match),
/// fed into the tournament tie-break.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionOutcome {
    pub participant_id: ParticipantId,
    pub points: u32,
    pub correct: bool,
    pub elapsed_ms: Option<u64>,
}

impl QuestionOutcome {
    fn tie_break_elapsed(&self) -> u64 {
        // Elapsed time only discriminates between correct answers.
        match (self.correct, self.elapsed_ms) {
            (true, Some(elapsed)) => elapsed,
            _ => u64::MAX,
        }
    }
}

/// Winner of a question: higher score, then earlier correct answer, then
/// lexicographic participant-id order. Fully deterministic for a given
/// input set.
pub fn question_winner(outcomes: &[QuestionOutcome]) -> Option<&QuestionOutcome> {
    outcomes.iter().min_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then_with(|| a.tie_break_elapsed().cmp(&b.tie_break_elapsed()))
            .then_with(|| a.participant_id.cmp(&b.participant_id))
    })
}

/// Ordering used for leaderboards and final rankings: score descending,
/// then participant id ascending.
pub fn ranking_order(a: (&str, u32), b: (&str, u32)) -> Ordering {
    b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::Answer;

    fn question(kind: QuestionKind, correct: &[usize]) -> Question {
        Question {
            text: "q".into(),
            kind,
            time_limit_secs: 30,
            points: 100,
            answers: (0..4)
                .map(|i| Answer {
                    text: format!("a{i}"),
                    correct: correct.contains(&i),
                })
                .collect(),
        }
    }

    fn submission(answer_ids: Vec<usize>, elapsed_ms: u64) -> AnswerRecord {
        AnswerRecord {
            question_index: 0,
            answer_ids,
            elapsed_ms,
            points: 0,
        }
    }

    #[test]
    fn multiple_requires_exact_set() {
        let q = question(QuestionKind::Multiple, &[0, 2]);
        assert!(is_correct(&q, &[0, 2]));
        assert!(is_correct(&q, &[2, 0]));
        assert!(!is_correct(&q, &[0]));
        assert!(!is_correct(&q, &[0, 2, 3]));
        assert!(!is_correct(&q, &[]));
    }

    #[test]
    fn single_requires_exactly_the_correct_id() {
        let q = question(QuestionKind::Single, &[1]);
        assert!(is_correct(&q, &[1]));
        assert!(!is_correct(&q, &[0]));
        assert!(!is_correct(&q, &[1, 2]));
        assert!(!is_correct(&q, &[9]));
    }

    #[test]
    fn speed_factor_decays_linearly_and_clamps() {
        let curve = SpeedCurve { floor: 0.5 };
        assert_eq!(curve.factor(0, 30_000), 1.0);
        assert_eq!(curve.factor(15_000, 30_000), 0.75);
        assert_eq!(curve.factor(30_000, 30_000), 0.5);
        assert_eq!(curve.factor(45_000, 30_000), 0.5);
    }

    #[test]
    fn scores_match_reference_scenario() {
        // 30s question, 100 points, floor 0.5: instant answer scores 100,
        // buzzer-beater scores 50, silence scores 0.
        let q = question(QuestionKind::Single, &[1]);
        let curve = SpeedCurve { floor: 0.5 };
        assert_eq!(score(&q, Some(&submission(vec![1], 0)), curve), 100);
        assert_eq!(score(&q, Some(&submission(vec![1], 30_000)), curve), 50);
        assert_eq!(score(&q, None, curve), 0);
        assert_eq!(score(&q, Some(&submission(vec![0], 0)), curve), 0);
    }

    #[test]
    fn scoring_is_deterministic() {
        let q = question(QuestionKind::Single, &[1]);
        let sub = submission(vec![1], 12_345);
        let curve = SpeedCurve::default();
        let first = score(&q, Some(&sub), curve);
        for _ in 0..10 {
            assert_eq!(score(&q, Some(&sub), curve), first);
        }
    }

    #[test]
    fn winner_prefers_score_then_speed_then_id() {
        let outcome = |id: &str, points, correct, elapsed| QuestionOutcome {
            participant_id: id.into(),
            points,
            correct,
            elapsed_ms: elapsed,
        };

        let by_score = [
            outcome("a", 50, true, Some(1_000)),
            outcome("b", 80, true, Some(20_000)),
        ];
        assert_eq!(question_winner(&by_score).unwrap().participant_id, "b");

        let by_speed = [
            outcome("a", 50, true, Some(9_000)),
            outcome("b", 50, true, Some(3_000)),
        ];
        assert_eq!(question_winner(&by_speed).unwrap().participant_id, "b");

        let by_id = [
            outcome("b", 0, false, None),
            outcome("a", 0, false, None),
        ];
        assert_eq!(question_winner(&by_id).unwrap().participant_id, "a");
    }
}
