// Local pick validation: the advisory pre-check a candidate pick passes
// before it is handed to the remote authority.
//
// The resolver never marks a driver as taken locally. A submission is
// optimistic; only the committed pick reappearing in a later snapshot is
// trusted. This is what prevents two clients from both believing they "won"
// the same driver before the authority resolves the race.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::clock::WindowStatus;
use super::gate::{self, TurnRejection};
use super::sequencer::TurnCursor;
use super::snapshot::DraftSnapshot;

/// An optimistic marker for a pick submission that has been handed to the
/// authority but not yet corroborated by a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPick {
    pub participant_id: String,
    pub driver_id: String,
    pub submitted_at: DateTime<Utc>,
}

/// How a pending pick ultimately resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickOutcome {
    /// A later snapshot showed the driver committed to us.
    Committed { driver_id: String },
    /// A later snapshot showed the driver committed to someone else: we lost
    /// the race. The participant remains eligible to pick again.
    Lost { driver_id: String, winner: String },
    /// The authority refused the submission outright (structured rejection
    /// or transport failure on submit). Terminal for that attempt.
    Refused { driver_id: String, reason: String },
}

/// The optimistic submission state attached to the view model. An explicit
/// tagged variant rather than ad hoc booleans, so a stale pending flag
/// cannot survive a snapshot that already resolved it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PendingState {
    #[default]
    Idle,
    Pending(PendingPick),
    Resolved(PickOutcome),
}

impl PendingState {
    pub fn is_pending(&self) -> bool {
        matches!(self, PendingState::Pending(_))
    }
}

/// Why an attempt was rejected locally. Each failure is terminal for that
/// attempt: the caller must re-derive fresh state before retrying.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PickError {
    #[error("out of turn: {0}")]
    OutOfTurn(TurnRejection),

    #[error("the draft window is not accepting picks")]
    WindowClosed,

    #[error("unknown driver: {0}")]
    UnknownDriver(String),

    #[error("driver {0} has already been taken")]
    AlreadyTaken(String),

    #[error("a pick for driver {0} is already pending")]
    AlreadyPending(String),
}

/// Validate a candidate pick against the current snapshot-derived state.
///
/// Preconditions are checked in order, short-circuiting on the first
/// failure: (1) the turn gate must allow the participant to act, (2) the
/// driver must exist and be available, (3) no pick may already be pending
/// for this participant -- the single-flight guard, which holds regardless
/// of which driver the outstanding submission targets.
pub fn attempt_pick(
    participant_id: &str,
    driver_id: &str,
    snapshot: &DraftSnapshot,
    status: WindowStatus,
    cursor: &TurnCursor,
    pending: &PendingState,
    now: DateTime<Utc>,
) -> Result<PendingPick, PickError> {
    gate::can_act(
        participant_id,
        cursor,
        status,
        snapshot.picks_by(participant_id),
        snapshot.max_picks_per_participant,
    )
    .map_err(|rejection| match rejection {
        TurnRejection::DraftNotOpen => PickError::WindowClosed,
        other => PickError::OutOfTurn(other),
    })?;

    let driver = snapshot
        .driver(driver_id)
        .ok_or_else(|| PickError::UnknownDriver(driver_id.to_string()))?;
    if !driver.available || snapshot.pick_for_driver(driver_id).is_some() {
        return Err(PickError::AlreadyTaken(driver_id.to_string()));
    }

    if let PendingState::Pending(outstanding) = pending {
        return Err(PickError::AlreadyPending(outstanding.driver_id.clone()));
    }

    Ok(PendingPick {
        participant_id: participant_id.to_string(),
        driver_id: driver_id.to_string(),
        submitted_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::sequencer::PickPattern;
    use crate::draft::snapshot::{Driver, DraftWindow, Participant, Pick};

    fn snapshot() -> DraftSnapshot {
        DraftSnapshot {
            version: 1,
            window: DraftWindow::default(),
            pattern: PickPattern::Sequential,
            max_picks_per_participant: 2,
            participants: vec![
                Participant {
                    id: "t1".into(),
                    display_name: "Team One".into(),
                    user_id: "u1".into(),
                },
                Participant {
                    id: "t2".into(),
                    display_name: "Team Two".into(),
                    user_id: "u2".into(),
                },
            ],
            drivers: vec![
                Driver {
                    id: "d1".into(),
                    name: "Driver 1".into(),
                    constructor: None,
                    available: true,
                },
                Driver {
                    id: "d2".into(),
                    name: "Driver 2".into(),
                    constructor: None,
                    available: false,
                },
            ],
            picks: vec![Pick {
                participant_id: "t2".into(),
                driver_id: "d2".into(),
                round: 1,
                position_in_round: 0,
                picked_at: Utc::now(),
            }],
        }
    }

    fn cursor_for(participant: &str) -> TurnCursor {
        TurnCursor {
            round: 1,
            position_in_round: 1,
            participant_id: participant.to_string(),
        }
    }

    #[test]
    fn valid_attempt_yields_pending_pick() {
        let snap = snapshot();
        let pending = attempt_pick(
            "t1",
            "d1",
            &snap,
            WindowStatus::Open,
            &cursor_for("t1"),
            &PendingState::Idle,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(pending.participant_id, "t1");
        assert_eq!(pending.driver_id, "d1");
    }

    #[test]
    fn window_closed_short_circuits_first() {
        // Even with an unknown driver and a pending pick, the gate runs first.
        let snap = snapshot();
        let pending = PendingState::Pending(PendingPick {
            participant_id: "t1".into(),
            driver_id: "d9".into(),
            submitted_at: Utc::now(),
        });
        assert_eq!(
            attempt_pick(
                "t1",
                "dx",
                &snap,
                WindowStatus::Closed,
                &cursor_for("t1"),
                &pending,
                Utc::now(),
            ),
            Err(PickError::WindowClosed)
        );
    }

    #[test]
    fn out_of_turn_rejection_carries_gate_reason() {
        let snap = snapshot();
        assert_eq!(
            attempt_pick(
                "t1",
                "d1",
                &snap,
                WindowStatus::Open,
                &cursor_for("t2"),
                &PendingState::Idle,
                Utc::now(),
            ),
            Err(PickError::OutOfTurn(TurnRejection::NotYourTurn))
        );
    }

    #[test]
    fn unknown_driver_rejected() {
        let snap = snapshot();
        assert_eq!(
            attempt_pick(
                "t1",
                "d99",
                &snap,
                WindowStatus::Open,
                &cursor_for("t1"),
                &PendingState::Idle,
                Utc::now(),
            ),
            Err(PickError::UnknownDriver("d99".into()))
        );
    }

    #[test]
    fn taken_driver_rejected() {
        let snap = snapshot();
        assert_eq!(
            attempt_pick(
                "t1",
                "d2",
                &snap,
                WindowStatus::Open,
                &cursor_for("t1"),
                &PendingState::Idle,
                Utc::now(),
            ),
            Err(PickError::AlreadyTaken("d2".into()))
        );
    }

    #[test]
    fn driver_with_committed_pick_rejected_even_if_flag_says_available() {
        // Inconsistent snapshot: availability flag lags the pick list. The
        // pick list wins.
        let mut snap = snapshot();
        snap.drivers[1].available = true;
        assert_eq!(
            attempt_pick(
                "t1",
                "d2",
                &snap,
                WindowStatus::Open,
                &cursor_for("t1"),
                &PendingState::Idle,
                Utc::now(),
            ),
            Err(PickError::AlreadyTaken("d2".into()))
        );
    }

    #[test]
    fn single_flight_guard_rejects_second_attempt() {
        let snap = snapshot();
        let pending = PendingState::Pending(PendingPick {
            participant_id: "t1".into(),
            driver_id: "d7".into(),
            submitted_at: Utc::now(),
        });
        // Guard applies regardless of the target driver.
        assert_eq!(
            attempt_pick(
                "t1",
                "d1",
                &snap,
                WindowStatus::Open,
                &cursor_for("t1"),
                &pending,
                Utc::now(),
            ),
            Err(PickError::AlreadyPending("d7".into()))
        );
    }

    #[test]
    fn resolved_pending_state_does_not_block_new_attempt() {
        let snap = snapshot();
        let resolved = PendingState::Resolved(PickOutcome::Lost {
            driver_id: "d7".into(),
            winner: "t2".into(),
        });
        assert!(attempt_pick(
            "t1",
            "d1",
            &snap,
            WindowStatus::Open,
            &cursor_for("t1"),
            &resolved,
            Utc::now(),
        )
        .is_ok());
    }

    #[test]
    fn quota_exhausted_surfaces_as_out_of_turn() {
        let mut snap = snapshot();
        snap.max_picks_per_participant = 1;
        snap.picks.push(Pick {
            participant_id: "t1".into(),
            driver_id: "d3".into(),
            round: 1,
            position_in_round: 1,
            picked_at: Utc::now(),
        });
        assert_eq!(
            attempt_pick(
                "t1",
                "d1",
                &snap,
                WindowStatus::Open,
                &cursor_for("t1"),
                &PendingState::Idle,
                Utc::now(),
            ),
            Err(PickError::OutOfTurn(TurnRejection::QuotaExhausted))
        );
    }
}
