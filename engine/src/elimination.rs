use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::participant::ParticipantId;

/// Battle-royale elimination policy. `fraction` of the round's roster
/// (rounded down) is cut each round, with at least one elimination while
/// more than one participant remains.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct EliminationPolicy {
    pub fraction: f64,
}

impl Default for EliminationPolicy {
    fn default() -> Self {
        Self { fraction: 0.5 }
    }
}

/// Scores for one completed round, keyed by participant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoundResult {
    scores: BTreeMap<ParticipantId, u32>,
}

impl RoundResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, participant_id: impl Into<ParticipantId>, score: u32) {
        self.scores.insert(participant_id.into(), score);
    }

    pub fn scores(&self) -> &BTreeMap<ParticipantId, u32> {
        &self.scores
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Elimination {
    pub eliminated: Vec<ParticipantId>,
    pub survivors: Vec<ParticipantId>,
}

/// Cut the lowest scorers of a round.
///
/// k = max(1, floor(n × fraction)). Everyone tied with the k-th lowest
/// score goes too, so a boundary tie can eliminate more than k. The one
/// exception: if the tie would wipe out the whole field (every remaining
/// participant shares the boundary score) the round eliminates no one.
pub fn eliminate(round: &RoundResult, policy: EliminationPolicy) -> Elimination {
    let mut entries: Vec<(&ParticipantId, u32)> =
        round.scores().iter().map(|(id, &s)| (id, s)).collect();
    entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));

    let n = entries.len();
    if n <= 1 {
        return Elimination {
            eliminated: Vec::new(),
            survivors: entries.into_iter().map(|(id, _)| id.clone()).collect(),
        };
    }

    let k = ((n as f64 * policy.fraction).floor() as usize).max(1);
    let boundary = entries[k - 1].1;
    let cut = entries.iter().take_while(|(_, s)| *s <= boundary).count();

    if cut == n {
        // Whole field tied at the boundary: wash round, nobody goes.
        return Elimination {
            eliminated: Vec::new(),
            survivors: entries.into_iter().map(|(id, _)| id.clone()).collect(),
        };
    }

    let (low, high) = entries.split_at(cut);
    Elimination {
        eliminated: low.iter().map(|(id, _)| (*id).clone()).collect(),
        survivors: high.iter().map(|(id, _)| (*id).clone()).collect(),
    }
}
