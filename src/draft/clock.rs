// Draft window status and countdown derivation.
//
// Everything here is a pure function of wall-clock time and pick counts.
// Status is re-evaluated on every tick and never cached beyond one tick.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::snapshot::DraftWindow;

/// The lifecycle status of the draft window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WindowStatus {
    /// The window has not opened yet.
    #[default]
    Upcoming,
    /// Picks are being accepted.
    Open,
    /// The window has closed with the draft still incomplete. No auto-picks
    /// are made for unfilled slots; the draft simply stops accepting input.
    Closed,
    /// Every participant has exhausted their quota. Completion by
    /// exhaustion pre-empts time-based `Closed`.
    Complete,
}

impl fmt::Display for WindowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowStatus::Upcoming => write!(f, "UPCOMING"),
            WindowStatus::Open => write!(f, "OPEN"),
            WindowStatus::Closed => write!(f, "CLOSED"),
            WindowStatus::Complete => write!(f, "COMPLETE"),
        }
    }
}

/// Derive the window status at `now`.
///
/// Missing `opens_at`/`closes_at` bounds make the draft open-ended: status
/// is then driven purely by pick counts.
pub fn window_status(
    window: &DraftWindow,
    picks_made: usize,
    structural_max: usize,
    now: DateTime<Utc>,
) -> WindowStatus {
    if structural_max > 0 && picks_made >= structural_max {
        return WindowStatus::Complete;
    }

    if let Some(opens_at) = window.opens_at {
        if now < opens_at {
            return WindowStatus::Upcoming;
        }
    }

    if let Some(closes_at) = window.closes_at {
        if now >= closes_at {
            return WindowStatus::Closed;
        }
    }

    WindowStatus::Open
}

/// Time remaining until `target`, floored at zero so a passed deadline never
/// renders as a negative countdown.
pub fn remaining(target: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    let delta = target - now;
    if delta < Duration::zero() {
        Duration::zero()
    } else {
        delta
    }
}

/// The countdown to display for the current status: time-to-open while
/// `Upcoming`, time-to-close while `Open`. `None` when no countdown applies
/// (open-ended window, closed, or complete) -- suppressed, not zero.
pub fn countdown(
    window: &DraftWindow,
    status: WindowStatus,
    now: DateTime<Utc>,
) -> Option<Duration> {
    match status {
        WindowStatus::Upcoming => window.opens_at.map(|t| remaining(t, now)),
        WindowStatus::Open => window.closes_at.map(|t| remaining(t, now)),
        WindowStatus::Closed | WindowStatus::Complete => None,
    }
}
