// Wire model for draft snapshots received from the remote authority.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::sequencer::PickPattern;

/// One drafting entity (a league team).
///
/// Identity is immutable for the lifetime of the draft; only the pick list
/// grows as the draft progresses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// Stable participant identifier.
    pub id: String,
    /// Display name of the team.
    pub display_name: String,
    /// Identifier of the owning user.
    pub user_id: String,
}

/// A unique, non-divisible pickable driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    /// Stable driver identifier.
    pub id: String,
    /// Display name (e.g. "M. Verstappen").
    pub name: String,
    /// Constructor/racing team label, if the authority provides one.
    #[serde(default)]
    pub constructor: Option<String>,
    /// Whether the driver is still available to pick. Once any participant
    /// picks a driver it stays unavailable for the remainder of the draft.
    pub available: bool,
}

/// An immutable committed pick fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pick {
    pub participant_id: String,
    pub driver_id: String,
    /// Round number (1-indexed).
    pub round: u32,
    /// Position within the round (0-indexed).
    pub position_in_round: u32,
    pub picked_at: DateTime<Utc>,
}

/// The time bounds of the draft.
///
/// Either bound may be absent: an open-ended draft is driven purely by pick
/// counts, and the countdown display is suppressed rather than shown as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftWindow {
    #[serde(default)]
    pub opens_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub closes_at: Option<DateTime<Utc>>,
}

/// A full, versioned copy of draft state as observed from the authority at
/// one point in time. Snapshots are totally ordered by `version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftSnapshot {
    /// Monotonic sequence counter assigned by the authority.
    pub version: u64,
    pub window: DraftWindow,
    pub pattern: PickPattern,
    pub max_picks_per_participant: u32,
    /// Participants in draft order. The order of this list, together with
    /// `pattern`, fully determines whose turn it is.
    pub participants: Vec<Participant>,
    pub drivers: Vec<Driver>,
    /// All committed picks in commit order.
    pub picks: Vec<Pick>,
}

impl DraftSnapshot {
    /// Number of picks committed so far.
    pub fn picks_made(&self) -> usize {
        self.picks.len()
    }

    /// Total picks the draft can hold before structural completion.
    pub fn structural_max(&self) -> usize {
        self.participants.len() * self.max_picks_per_participant as usize
    }

    /// Whether every participant has exhausted their quota.
    pub fn is_structurally_complete(&self) -> bool {
        self.structural_max() > 0 && self.picks_made() >= self.structural_max()
    }

    /// Count of picks committed by one participant.
    pub fn picks_by(&self, participant_id: &str) -> usize {
        self.picks
            .iter()
            .filter(|p| p.participant_id == participant_id)
            .count()
    }

    /// Look up a driver by id.
    pub fn driver(&self, driver_id: &str) -> Option<&Driver> {
        self.drivers.iter().find(|d| d.id == driver_id)
    }

    /// The committed pick for a driver, if any participant has claimed it.
    pub fn pick_for_driver(&self, driver_id: &str) -> Option<&Pick> {
        self.picks.iter().find(|p| p.driver_id == driver_id)
    }

    /// Participant ids in draft order, as the sequencer consumes them.
    pub fn participant_order(&self) -> Vec<&str> {
        self.participants.iter().map(|p| p.id.as_str()).collect()
    }
}

/// Lightweight status-only variant of the snapshot, polled at a higher
/// frequency when only clock/turn state is needed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub version: u64,
    pub window: DraftWindow,
    pub picks_made: u32,
    #[serde(default)]
    pub current_participant_id: Option<String>,
}
