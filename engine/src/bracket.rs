use serde::{Deserialize, Serialize};

use crate::errors::BracketError;
use crate::participant::ParticipantId;

/// Address of a bracket node: `round` counts up from the first round,
/// `index` is the node's position within it. The winner of (r, i) feeds
/// slot i % 2 of node (r + 1, i / 2).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    pub round: usize,
    pub index: usize,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct BracketNode {
    slots: [Option<ParticipantId>; 2],
    winner: Option<ParticipantId>,
    bye: bool,
}

impl BracketNode {
    fn pair(a: ParticipantId, b: ParticipantId) -> Self {
        Self {
            slots: [Some(a), Some(b)],
            winner: None,
            bye: false,
        }
    }

    fn bye(occupant: ParticipantId) -> Self {
        Self {
            slots: [Some(occupant.clone()), None],
            winner: Some(occupant),
            bye: true,
        }
    }

    pub fn players(&self) -> Option<(&ParticipantId, &ParticipantId)> {
        match (&self.slots[0], &self.slots[1]) {
            (Some(a), Some(b)) => Some((a, b)),
            _ => None,
        }
    }

    pub fn winner(&self) -> Option<&ParticipantId> {
        self.winner.as_ref()
    }

    pub fn is_bye(&self) -> bool {
        self.bye
    }
}

/// Single-elimination bracket built round by round over the registered
/// roster. Each round pairs the remaining entrants in order; an odd
/// roster leaves exactly one bye node whose occupant advances unplayed.
#[derive(Debug, Clone, Serialize)]
pub struct Bracket {
    rounds: Vec<Vec<BracketNode>>,
    entrants: usize,
}

impl Bracket {
    /// Build the first round from the roster in registration order.
    /// Rosters of fewer than two entrants have nothing to play.
    pub fn new(roster: &[ParticipantId]) -> Self {
        let mut bracket = Self {
            rounds: Vec::new(),
            entrants: roster.len(),
        };
        if roster.len() >= 2 {
            bracket.push_round(roster.to_vec());
        }
        bracket
    }

    /// Number of rounds a full run takes: ceil(log2 n).
    pub fn rounds_for(entrants: usize) -> u32 {
        match entrants {
            0 | 1 => 0,
            n => (n - 1).ilog2() + 1,
        }
    }

    /// Matches actually played over the whole bracket; byes cost nothing,
    /// so eliminating n − 1 entrants takes exactly n − 1 matches.
    pub fn total_matches(&self) -> usize {
        self.entrants.saturating_sub(1)
    }

    pub fn rounds(&self) -> &[Vec<BracketNode>] {
        &self.rounds
    }

    pub fn node(&self, node: NodeRef) -> Option<&BracketNode> {
        self.rounds.get(node.round)?.get(node.index)
    }

    /// The next unresolved pairing, in bracket order. Byes resolve at
    /// round construction and are never returned.
    pub fn next_match(&self) -> Option<(NodeRef, &ParticipantId, &ParticipantId)> {
        let round = self.rounds.len().checked_sub(1)?;
        self.rounds[round]
            .iter()
            .enumerate()
            .find(|(_, n)| n.winner.is_none())
            .and_then(|(index, n)| {
                n.players()
                    .map(|(a, b)| (NodeRef { round, index }, a, b))
            })
    }

    /// Record a match result. When the round is complete its winners are
    /// paired into the next round (or the bracket resolves).
    pub fn record_winner(
        &mut self,
        node: NodeRef,
        winner: &ParticipantId,
    ) -> Result<(), BracketError> {
        let entry = self
            .rounds
            .get_mut(node.round)
            .and_then(|r| r.get_mut(node.index))
            .ok_or(BracketError::UnknownNode {
                round: node.round,
                index: node.index,
            })?;
        if entry.winner.is_some() {
            return Err(BracketError::AlreadyResolved {
                round: node.round,
                index: node.index,
            });
        }
        if !entry.slots.iter().any(|s| s.as_ref() == Some(winner)) {
            return Err(BracketError::NotInMatch {
                participant_id: winner.clone(),
            });
        }
        entry.winner = Some(winner.clone());
        self.seal_round();
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.winner().is_some()
    }

    pub fn winner(&self) -> Option<&ParticipantId> {
        match self.rounds.last() {
            Some(round) if round.len() == 1 => round[0].winner(),
            _ => None,
        }
    }

    fn seal_round(&mut self) {
        let Some(current) = self.rounds.last() else {
            return;
        };
        if current.len() == 1 || current.iter().any(|n| n.winner.is_none()) {
            return;
        }
        let winners: Vec<ParticipantId> = current
            .iter()
            .filter_map(|n| n.winner.clone())
            .collect();
        self.push_round(winners);
    }

    fn push_round(&mut self, mut entrants: Vec<ParticipantId>) {
        let mut nodes = Vec::with_capacity(entrants.len().div_ceil(2));
        let leftover = if entrants.len() % 2 == 1 {
            entrants.pop()
        } else {
            None
        };
        let mut it = entrants.into_iter();
        while let (Some(a), Some(b)) = (it.next(), it.next()) {
            nodes.push(BracketNode::pair(a, b));
        }
        if let Some(occupant) = leftover {
            nodes.push(BracketNode::bye(occupant));
        }
        self.rounds.push(nodes);
    }
}
