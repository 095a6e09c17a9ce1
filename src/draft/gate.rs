// Turn eligibility: who may act right now, and why not otherwise.

use thiserror::Error;

use super::clock::WindowStatus;
use super::sequencer::TurnCursor;

/// Why a participant may not act. The variants are distinct because callers
/// react differently: disable the pick control (`NotYourTurn`), show a
/// window banner (`DraftNotOpen`), or hide the control entirely
/// (`QuotaExhausted`). These are expected outcomes, not exceptional errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TurnRejection {
    #[error("the draft window is not open")]
    DraftNotOpen,

    #[error("it is not this participant's turn")]
    NotYourTurn,

    #[error("participant has already made the maximum number of picks")]
    QuotaExhausted,
}

/// Decide whether `participant_id` may act right now.
///
/// Allowed only when the window is open, the cursor points at the
/// participant, and their quota is not exhausted. The quota check runs even
/// when the cursor nominally points at the participant, since an
/// inconsistent snapshot can leave the cursor on a full roster.
///
/// Side-effect free; callers re-evaluate on every snapshot and clock tick,
/// since eligibility can flip purely from the clock closing the window.
pub fn can_act(
    participant_id: &str,
    cursor: &TurnCursor,
    status: WindowStatus,
    picks_by_participant: usize,
    max_picks_per_participant: u32,
) -> Result<(), TurnRejection> {
    if status != WindowStatus::Open {
        return Err(TurnRejection::DraftNotOpen);
    }
    if picks_by_participant >= max_picks_per_participant as usize {
        return Err(TurnRejection::QuotaExhausted);
    }
    if participant_id != cursor.participant_id {
        return Err(TurnRejection::NotYourTurn);
    }
    Ok(())
}
