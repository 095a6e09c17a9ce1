// Turn-order derivation: participant list + pick pattern -> whose turn it is.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The rule governing turn order across rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PickPattern {
    /// Same participant order every round.
    Sequential,
    /// Order reverses each round (1-2-3, 3-2-1, 1-2-3, ...).
    Snake,
}

impl fmt::Display for PickPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PickPattern::Sequential => write!(f, "SEQUENTIAL"),
            PickPattern::Snake => write!(f, "SNAKE"),
        }
    }
}

/// The derived position of the draft: who acts next, and where in the grid
/// of rounds that turn falls. Never stored; recomputed from the pick count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnCursor {
    /// Round number (1-indexed).
    pub round: u32,
    /// Position within the round (0-indexed).
    pub position_in_round: u32,
    /// The participant whose turn it is.
    pub participant_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequencerError {
    #[error("invalid draft configuration: participant list is empty")]
    InvalidConfiguration,

    #[error("draft already complete: {picks_made} picks made with capacity {capacity}")]
    Overrun { picks_made: usize, capacity: usize },
}

/// Derive the turn cursor from the ordered participant list, the pick
/// pattern, and the count of picks made so far.
///
/// This is a pure function: every client computes the identical "whose turn"
/// answer from the same snapshot, which is what makes polling (rather than a
/// push channel) sufficient for turn coordination.
///
/// `max_picks_per_participant` bounds the draft. Callers are expected to
/// check the window status first; `Overrun` means the caller asked for a
/// cursor in a draft that has no turns left.
pub fn compute_cursor(
    participants: &[&str],
    pattern: PickPattern,
    picks_made: usize,
    max_picks_per_participant: u32,
) -> Result<TurnCursor, SequencerError> {
    if participants.is_empty() {
        return Err(SequencerError::InvalidConfiguration);
    }

    let n = participants.len();
    let capacity = n * max_picks_per_participant as usize;
    if picks_made >= capacity {
        return Err(SequencerError::Overrun {
            picks_made,
            capacity,
        });
    }

    let round = (picks_made / n) as u32 + 1;
    let offset = picks_made % n;
    let position = match pattern {
        PickPattern::Sequential => offset,
        PickPattern::Snake => {
            if round % 2 == 1 {
                offset
            } else {
                n - 1 - offset
            }
        }
    };

    Ok(TurnCursor {
        round,
        position_in_round: position as u32,
        participant_id: participants[position].to_string(),
    })
}
