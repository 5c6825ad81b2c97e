use crate::config::LiveConfig;
use crate::session::SessionConfig;
use qf_engine::mode::SessionMode;
use qf_engine::quiz::{AnswerId, Quiz};
use serde::Deserialize;

/// Inbound command payloads, as delivered by the transport layer after
/// authentication, authorization and rate limiting have already happened
/// upstream. Structural validity is still checked here and in the
/// session state machine.
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub mode: SessionMode,
    pub quiz: Quiz,
    pub speed_floor: Option<f64>,
    pub elimination_fraction: Option<f64>,
    pub questions_per_match: Option<usize>,
}

impl CreateSessionRequest {
    /// Session config: process defaults overlaid with the request's
    /// overrides.
    pub fn into_parts(self, defaults: &LiveConfig) -> (SessionMode, Quiz, SessionConfig) {
        let mut config = SessionConfig::from_defaults(defaults);
        if let Some(floor) = self.speed_floor {
            config.speed_floor = floor;
        }
        if let Some(fraction) = self.elimination_fraction {
            config.elimination_fraction = fraction;
        }
        if let Some(questions) = self.questions_per_match {
            config.questions_per_match = questions;
        }
        (self.mode, self.quiz, config)
    }
}

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    pub participant_id: String,
    pub handle: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitAnswerRequest {
    pub participant_id: String,
    pub question_index: usize,
    pub answer_ids: Vec<AnswerId>,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    #[serde(default = "default_cancel_reason")]
    pub reason: String,
}

fn default_cancel_reason() -> String {
    "cancelled by admin".to_string()
}
