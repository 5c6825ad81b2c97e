use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Standard,
    Tournament,
    BattleRoyale,
}

impl SessionMode {
    /// Minimum roster size required before `start` is accepted.
    pub fn min_participants(&self) -> usize {
        match self {
            SessionMode::Standard => 1,
            SessionMode::Tournament => 2,
            SessionMode::BattleRoyale => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Standard => "standard",
            SessionMode::Tournament => "tournament",
            SessionMode::BattleRoyale => "battle_royale",
        }
    }
}
