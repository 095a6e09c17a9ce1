// Snapshot reconciliation: merges periodically polled snapshots into a
// stable, render-ready view.
//
// Poll responses can arrive out of order, duplicated, or not at all. The
// reconciler enforces monotonic version acceptance (a slow response never
// regresses the view), resolves optimistic pending picks against the
// authoritative pick list, and retains the last good view across transport
// failures instead of blanking it.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::clock::{self, WindowStatus};
use super::gate;
use super::resolver::{PendingPick, PendingState, PickOutcome};
use super::sequencer::{self, SequencerError, TurnCursor};
use super::snapshot::{DraftSnapshot, Driver, Pick, StatusSnapshot};

/// Where the view is in its lifecycle. There is no terminal state; the
/// session keeps polling until it is shut down.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ViewPhase {
    /// No poll has been issued yet.
    #[default]
    Empty,
    /// First poll in flight; nothing to render yet.
    Loading,
    /// Rendering an accepted snapshot.
    Live,
    /// Rendering the last accepted snapshot while polls are failing.
    Stale { error: String },
}

/// Per-participant summary carried on the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantSummary {
    pub id: String,
    pub display_name: String,
    pub picks_made: usize,
}

/// The render-ready view model. Rebuilt whole on every accepted snapshot and
/// every clock tick; consumers never see a half-updated view.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DraftView {
    pub phase: ViewPhase,
    /// Version of the snapshot this view reflects. 0 before the first accept.
    pub version: u64,
    pub status: WindowStatus,
    /// Whose turn it is. `None` when the draft is complete, closed, or has
    /// no participants.
    pub cursor: Option<TurnCursor>,
    /// Whether this client's participant is the one allowed to act.
    pub my_turn: bool,
    /// Time remaining for the current status, suppressed for open-ended
    /// windows.
    pub countdown: Option<Duration>,
    pub pending: PendingState,
    pub picks_made: usize,
    pub structural_max: usize,
    pub participants: Vec<ParticipantSummary>,
    pub available_drivers: Vec<Driver>,
    pub picks: Vec<Pick>,
}

/// What `merge` did with an incoming snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Accepted { version: u64 },
    /// The snapshot was not strictly newer than what we already hold.
    Discarded { incoming: u64, accepted: u64 },
}

/// Owns the accepted view and the optimistic pending-pick state for one
/// client session. Sequencer, clock, and gate are stateless derivations;
/// the reconciler is the only holder of mutable draft state on the client.
pub struct Reconciler {
    my_participant_id: String,
    snapshot: Option<DraftSnapshot>,
    pending: PendingState,
    view: DraftView,
    /// Bumped whenever the rendered view actually changes, so the session
    /// only pushes updates the front-end needs to repaint.
    revision: u64,
}

impl Reconciler {
    pub fn new(my_participant_id: impl Into<String>) -> Self {
        Reconciler {
            my_participant_id: my_participant_id.into(),
            snapshot: None,
            pending: PendingState::Idle,
            view: DraftView::default(),
            revision: 0,
        }
    }

    pub fn view(&self) -> &DraftView {
        &self.view
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// The last accepted snapshot, for local pick pre-checks.
    pub fn snapshot(&self) -> Option<&DraftSnapshot> {
        self.snapshot.as_ref()
    }

    /// Mark the first poll as issued: Empty -> Loading.
    pub fn begin_polling(&mut self) {
        if self.view.phase == ViewPhase::Empty {
            let mut view = self.view.clone();
            view.phase = ViewPhase::Loading;
            self.install(view);
        }
    }

    /// Merge a polled snapshot, enforcing monotonic version acceptance.
    pub fn merge(&mut self, incoming: DraftSnapshot, now: DateTime<Utc>) -> MergeOutcome {
        if let Some(accepted) = self.snapshot.as_ref().map(|s| s.version) {
            if incoming.version <= accepted {
                debug!(
                    incoming = incoming.version,
                    accepted,
                    "discarding stale snapshot"
                );
                // A discarded response still proves the authority is
                // reachable, so a stale view goes live again.
                if matches!(self.view.phase, ViewPhase::Stale { .. }) {
                    self.install(self.rebuild(ViewPhase::Live, now));
                }
                return MergeOutcome::Discarded {
                    incoming: incoming.version,
                    accepted,
                };
            }
        }

        self.resolve_pending(&incoming);
        let version = incoming.version;
        self.snapshot = Some(incoming);
        self.install(self.rebuild(ViewPhase::Live, now));
        MergeOutcome::Accepted { version }
    }

    /// Apply a lightweight status poll. Only the window (clock-relevant
    /// state) is refreshed; picks and availability are never touched, so an
    /// out-of-order status response cannot tear the view. Ignored while no
    /// full snapshot has been accepted, and ignored when older than the
    /// accepted snapshot.
    pub fn merge_status(&mut self, status: StatusSnapshot, now: DateTime<Utc>) {
        let Some(snapshot) = self.snapshot.as_mut() else {
            return;
        };
        if status.version < snapshot.version {
            debug!(
                incoming = status.version,
                accepted = snapshot.version,
                "discarding stale status poll"
            );
            return;
        }
        snapshot.window = status.window;
        self.install(self.rebuild(self.live_or_current_phase(), now));
    }

    /// Re-derive time-dependent fields. Called on every clock tick; never
    /// changes the accepted snapshot, so the view can only move forward.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        if self.snapshot.is_some() {
            self.install(self.rebuild(self.live_or_current_phase(), now));
        }
    }

    /// Record a transport failure. The last good view is retained and
    /// flagged stale; before the first accepted snapshot the view simply
    /// stays in `Loading` and the poll loop retries.
    pub fn poll_failed(&mut self, error: &str) {
        if self.snapshot.is_none() {
            warn!(error, "poll failed before first snapshot; still loading");
            return;
        }
        let mut view = self.view.clone();
        view.phase = ViewPhase::Stale {
            error: error.to_string(),
        };
        self.install(view);
    }

    /// Record that an optimistic submission was handed to the authority.
    pub fn submission_sent(&mut self, pending: PendingPick, now: DateTime<Utc>) {
        info!(driver = %pending.driver_id, "pick submitted, awaiting snapshot corroboration");
        self.pending = PendingState::Pending(pending);
        if self.snapshot.is_some() {
            self.install(self.rebuild(self.live_or_current_phase(), now));
        } else {
            let mut view = self.view.clone();
            view.pending = self.pending.clone();
            self.install(view);
        }
    }

    /// Record that the authority refused the submission. Terminal for that
    /// attempt; the participant may pick again.
    pub fn submission_refused(&mut self, driver_id: &str, reason: &str, now: DateTime<Utc>) {
        warn!(driver = driver_id, reason, "pick submission refused");
        self.pending = PendingState::Resolved(PickOutcome::Refused {
            driver_id: driver_id.to_string(),
            reason: reason.to_string(),
        });
        if self.snapshot.is_some() {
            self.install(self.rebuild(self.live_or_current_phase(), now));
        } else {
            let mut view = self.view.clone();
            view.pending = self.pending.clone();
            self.install(view);
        }
    }

    /// Clear a resolved outcome once the front-end has surfaced it.
    pub fn acknowledge_outcome(&mut self, now: DateTime<Utc>) {
        if matches!(self.pending, PendingState::Resolved(_)) {
            self.pending = PendingState::Idle;
            if self.snapshot.is_some() {
                self.install(self.rebuild(self.live_or_current_phase(), now));
            } else {
                let mut view = self.view.clone();
                view.pending = PendingState::Idle;
                self.install(view);
            }
        }
    }

    /// Resolve the pending pick against an incoming snapshot's pick list.
    fn resolve_pending(&mut self, incoming: &DraftSnapshot) {
        let PendingState::Pending(pending) = &self.pending else {
            return;
        };
        if let Some(committed) = incoming.pick_for_driver(&pending.driver_id) {
            if committed.participant_id == self.my_participant_id {
                info!(driver = %pending.driver_id, "pending pick confirmed committed");
                self.pending = PendingState::Resolved(PickOutcome::Committed {
                    driver_id: pending.driver_id.clone(),
                });
            } else {
                info!(
                    driver = %pending.driver_id,
                    winner = %committed.participant_id,
                    "pending pick lost the race"
                );
                self.pending = PendingState::Resolved(PickOutcome::Lost {
                    driver_id: pending.driver_id.clone(),
                    winner: committed.participant_id.clone(),
                });
            }
        }
    }

    /// Keep a `Stale` phase across ticks; everything else renders as `Live`.
    fn live_or_current_phase(&self) -> ViewPhase {
        match &self.view.phase {
            ViewPhase::Stale { error } => ViewPhase::Stale {
                error: error.clone(),
            },
            _ => ViewPhase::Live,
        }
    }

    /// Build a fresh view from the accepted snapshot at `now`.
    fn rebuild(&self, phase: ViewPhase, now: DateTime<Utc>) -> DraftView {
        let snapshot = self
            .snapshot
            .as_ref()
            .expect("rebuild requires an accepted snapshot");

        let picks_made = snapshot.picks_made();
        let structural_max = snapshot.structural_max();
        let status = clock::window_status(&snapshot.window, picks_made, structural_max, now);
        let countdown = clock::countdown(&snapshot.window, status, now);

        let order = snapshot.participant_order();
        let cursor = match sequencer::compute_cursor(
            &order,
            snapshot.pattern,
            picks_made,
            snapshot.max_picks_per_participant,
        ) {
            Ok(cursor) => Some(cursor),
            Err(SequencerError::Overrun { .. }) => None,
            Err(SequencerError::InvalidConfiguration) => {
                warn!("snapshot has no participants; cannot derive a turn cursor");
                None
            }
        };

        let my_turn = cursor.as_ref().is_some_and(|c| {
            gate::can_act(
                &self.my_participant_id,
                c,
                status,
                snapshot.picks_by(&self.my_participant_id),
                snapshot.max_picks_per_participant,
            )
            .is_ok()
        });

        let participants = snapshot
            .participants
            .iter()
            .map(|p| ParticipantSummary {
                id: p.id.clone(),
                display_name: p.display_name.clone(),
                picks_made: snapshot.picks_by(&p.id),
            })
            .collect();

        let available_drivers = snapshot
            .drivers
            .iter()
            .filter(|d| d.available && snapshot.pick_for_driver(&d.id).is_none())
            .cloned()
            .collect();

        DraftView {
            phase,
            version: snapshot.version,
            status,
            cursor,
            my_turn,
            countdown,
            pending: self.pending.clone(),
            picks_made,
            structural_max,
            participants,
            available_drivers,
            picks: snapshot.picks.clone(),
        }
    }

    /// Swap in a rebuilt view, bumping the revision only on real change.
    fn install(&mut self, view: DraftView) {
        if view != self.view {
            self.view = view;
            self.revision += 1;
        }
    }
}
