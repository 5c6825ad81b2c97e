use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuizConfigError {
    #[error("Quiz has no questions")]
    EmptyQuiz,
    #[error("Question {index}: time limit {seconds}s outside {min}-{max}s")]
    TimeLimitOutOfBounds {
        index: usize,
        seconds: u32,
        min: u32,
        max: u32,
    },
    #[error("Question {index}: point value {points} outside 1-{max}")]
    PointsOutOfBounds { index: usize, points: u32, max: u32 },
    #[error("Question {index}: fewer than two answers")]
    TooFewAnswers { index: usize },
    #[error("Question {index}: single-choice must mark exactly one answer correct")]
    SingleChoiceCorrectCount { index: usize },
    #[error("Question {index}: no answer marked correct")]
    NoCorrectAnswer { index: usize },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BracketError {
    #[error("No such bracket node: round {round}, match {index}")]
    UnknownNode { round: usize, index: usize },
    #[error("Bracket node already resolved: round {round}, match {index}")]
    AlreadyResolved { round: usize, index: usize },
    #[error("Participant {participant_id} is not in this match")]
    NotInMatch { participant_id: String },
}
