// Per-client session orchestration.
//
// One tokio task owns all mutable draft state for a session and coordinates
// four event sources with `tokio::select!`: the full snapshot poll, the
// lightweight status poll, the local clock tick, and user commands. Poll
// responses are processed inline on the same task, so accepted-version
// ordering needs no locks. When the loop exits, any in-flight poll future is
// dropped with it and never merged.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::{ApiError, DraftAuthority};
use crate::config::Config;
use crate::draft::reconciler::{DraftView, MergeOutcome, Reconciler};
use crate::draft::resolver::{self, PickError};

/// Commands a front-end sends into the session loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Try to pick a driver. Rejections are reflected in the view (or, for
    /// the double-click guard, silently absorbed).
    AttemptPick { driver_id: String },
    /// Clear a resolved pick outcome once it has been shown to the user.
    AcknowledgeOutcome,
    /// Poll the full snapshot now instead of waiting for the next interval.
    Refresh,
    /// End the session.
    Shutdown,
}

/// A view the front-end should repaint. Emitted only when the rendered view
/// actually changed.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewUpdate {
    pub revision: u64,
    pub view: DraftView,
}

/// Tunable cadence and identity for one session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub my_participant_id: String,
    pub snapshot_interval: Duration,
    pub status_interval: Duration,
    pub tick_interval: Duration,
    /// Consecutive snapshot-poll failures tolerated before the view is
    /// flagged stale.
    pub stale_after_failures: u32,
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        SessionOptions {
            my_participant_id: config.league.my_participant_id.clone(),
            snapshot_interval: Duration::from_secs(config.polling.snapshot_interval_secs),
            status_interval: Duration::from_secs(config.polling.status_interval_secs),
            tick_interval: Duration::from_millis(config.polling.tick_millis),
            stale_after_failures: config.polling.stale_after_failures,
        }
    }
}

/// Run the session event loop until `Shutdown`, the command channel closes,
/// or the view receiver is dropped.
pub async fn run<A: DraftAuthority>(
    authority: A,
    options: SessionOptions,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
    view_tx: mpsc::Sender<ViewUpdate>,
) -> anyhow::Result<()> {
    info!(
        participant = %options.my_participant_id,
        "draft session started"
    );

    let mut reconciler = Reconciler::new(options.my_participant_id.clone());
    reconciler.begin_polling();

    let mut consecutive_failures: u32 = 0;
    let mut last_sent_revision: u64 = 0;

    // The first snapshot tick fires immediately so the session goes live
    // without waiting a full interval. Status and clock ticks have nothing
    // to do before that, so their immediate first ticks are harmless.
    let mut snapshot_timer = tokio::time::interval(options.snapshot_interval);
    let mut status_timer = tokio::time::interval(options.status_interval);
    let mut clock_timer = tokio::time::interval(options.tick_interval);

    loop {
        tokio::select! {
            _ = snapshot_timer.tick() => {
                poll_snapshot(
                    &authority,
                    &mut reconciler,
                    &mut consecutive_failures,
                    options.stale_after_failures,
                )
                .await;
            }

            _ = status_timer.tick() => {
                match authority.fetch_status().await {
                    Ok(status) => reconciler.merge_status(status, Utc::now()),
                    Err(e) => debug!(error = %e, "status poll failed"),
                }
            }

            _ = clock_timer.tick() => {
                reconciler.tick(Utc::now());
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(SessionCommand::AttemptPick { driver_id }) => {
                        handle_attempt_pick(
                            &authority,
                            &mut reconciler,
                            &options.my_participant_id,
                            &driver_id,
                        )
                        .await;
                    }
                    Some(SessionCommand::AcknowledgeOutcome) => {
                        reconciler.acknowledge_outcome(Utc::now());
                    }
                    Some(SessionCommand::Refresh) => {
                        poll_snapshot(
                            &authority,
                            &mut reconciler,
                            &mut consecutive_failures,
                            options.stale_after_failures,
                        )
                        .await;
                    }
                    Some(SessionCommand::Shutdown) => {
                        info!("shutdown command received");
                        break;
                    }
                    None => {
                        info!("command channel closed, ending session");
                        break;
                    }
                }
            }
        }

        if reconciler.revision() != last_sent_revision {
            last_sent_revision = reconciler.revision();
            let update = ViewUpdate {
                revision: last_sent_revision,
                view: reconciler.view().clone(),
            };
            if view_tx.send(update).await.is_err() {
                info!("view receiver dropped, ending session");
                break;
            }
        }
    }

    info!("draft session ended");
    Ok(())
}

/// One full snapshot poll: merge on success, track failures otherwise.
async fn poll_snapshot<A: DraftAuthority>(
    authority: &A,
    reconciler: &mut Reconciler,
    consecutive_failures: &mut u32,
    stale_after: u32,
) {
    match authority.fetch_snapshot().await {
        Ok(snapshot) => {
            *consecutive_failures = 0;
            match reconciler.merge(snapshot, Utc::now()) {
                MergeOutcome::Accepted { version } => {
                    debug!(version, "snapshot accepted");
                }
                MergeOutcome::Discarded { incoming, accepted } => {
                    debug!(incoming, accepted, "snapshot discarded as stale");
                }
            }
        }
        Err(e) => {
            *consecutive_failures += 1;
            if *consecutive_failures >= stale_after {
                warn!(
                    error = %e,
                    failures = *consecutive_failures,
                    "snapshot polling failing, flagging view stale"
                );
                reconciler.poll_failed(&e.to_string());
            } else {
                debug!(
                    error = %e,
                    failures = *consecutive_failures,
                    "snapshot poll failed, will retry"
                );
            }
        }
    }
}

/// Run the local pre-check for a pick attempt and, if it passes, hand the
/// candidate to the authority. The HTTP result is advisory: a structured
/// rejection resolves the attempt as refused, while success leaves the
/// pending marker in place until a snapshot corroborates the commit.
async fn handle_attempt_pick<A: DraftAuthority>(
    authority: &A,
    reconciler: &mut Reconciler,
    my_participant_id: &str,
    driver_id: &str,
) {
    let now = Utc::now();

    let attempt = {
        let view = reconciler.view();
        let (Some(cursor), Some(snapshot)) = (&view.cursor, reconciler.snapshot()) else {
            info!(driver = driver_id, "pick ignored: draft is not accepting picks");
            return;
        };
        resolver::attempt_pick(
            my_participant_id,
            driver_id,
            snapshot,
            view.status,
            cursor,
            &view.pending,
            now,
        )
    };

    let pending = match attempt {
        Ok(pending) => pending,
        Err(PickError::AlreadyPending(outstanding)) => {
            // Double-click guard: silently absorbed, no network call.
            debug!(
                driver = driver_id,
                outstanding = %outstanding,
                "duplicate submit suppressed while a pick is pending"
            );
            return;
        }
        Err(e) => {
            // Expected, non-exceptional outcomes: the view already reflects
            // why (not your turn, window closed, driver taken).
            info!(driver = driver_id, reason = %e, "pick rejected locally");
            return;
        }
    };

    reconciler.submission_sent(pending, now);

    match authority.submit_pick(driver_id).await {
        Ok(receipt) => {
            info!(
                driver = driver_id,
                version = ?receipt.version,
                "pick submitted; awaiting snapshot corroboration"
            );
        }
        Err(ApiError::PickRejected { reason }) => {
            reconciler.submission_refused(driver_id, &reason, Utc::now());
        }
        Err(e) => {
            // Submit transport failures are terminal for the attempt: we
            // cannot tell whether the authority saw it, and holding the
            // single-flight guard forever would wedge the session. The next
            // snapshot is authoritative either way.
            reconciler.submission_refused(driver_id, &e.to_string(), Utc::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SubmitReceipt;
    use crate::draft::reconciler::ViewPhase;
    use crate::draft::resolver::{PendingState, PickOutcome};
    use crate::draft::sequencer::PickPattern;
    use crate::draft::snapshot::{
        DraftSnapshot, DraftWindow, Driver, Participant, Pick, StatusSnapshot,
    };
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays a scripted sequence of snapshot poll results; repeats the
    /// last snapshot once the script runs dry. Counts pick submissions.
    struct ScriptedAuthority {
        script: Mutex<VecDeque<Result<DraftSnapshot, String>>>,
        last: Mutex<Option<DraftSnapshot>>,
        submit_calls: AtomicUsize,
    }

    impl ScriptedAuthority {
        fn new(script: Vec<Result<DraftSnapshot, String>>) -> Self {
            ScriptedAuthority {
                script: Mutex::new(script.into()),
                last: Mutex::new(None),
                submit_calls: AtomicUsize::new(0),
            }
        }

        fn submit_count(&self) -> usize {
            self.submit_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DraftAuthority for ScriptedAuthority {
        async fn fetch_snapshot(&self) -> Result<DraftSnapshot, ApiError> {
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Ok(snapshot)) => {
                    *self.last.lock().unwrap() = Some(snapshot.clone());
                    Ok(snapshot)
                }
                Some(Err(message)) => Err(ApiError::Status {
                    status: 503,
                    message,
                }),
                None => match self.last.lock().unwrap().clone() {
                    Some(snapshot) => Ok(snapshot),
                    None => Err(ApiError::Status {
                        status: 503,
                        message: "script exhausted".into(),
                    }),
                },
            }
        }

        async fn fetch_status(&self) -> Result<StatusSnapshot, ApiError> {
            // The status endpoint is not scripted in these tests.
            Err(ApiError::Status {
                status: 404,
                message: "status endpoint disabled".into(),
            })
        }

        async fn submit_pick(&self, _driver_id: &str) -> Result<SubmitReceipt, ApiError> {
            self.submit_calls.fetch_add(1, Ordering::SeqCst);
            Ok(SubmitReceipt { version: None })
        }
    }

    fn participant(id: &str) -> Participant {
        Participant {
            id: id.into(),
            display_name: format!("Team {id}"),
            user_id: format!("u-{id}"),
        }
    }

    fn driver(id: &str) -> Driver {
        Driver {
            id: id.into(),
            name: format!("Driver {id}"),
            constructor: None,
            available: true,
        }
    }

    /// Open-ended two-participant snapshot where it is t1's turn.
    fn snapshot(version: u64, picks: Vec<Pick>) -> DraftSnapshot {
        DraftSnapshot {
            version,
            window: DraftWindow::default(),
            pattern: PickPattern::Sequential,
            max_picks_per_participant: 2,
            participants: vec![participant("t1"), participant("t2")],
            drivers: vec![driver("d1"), driver("d2"), driver("d3"), driver("d4")],
            picks,
        }
    }

    fn pick(participant: &str, driver: &str) -> Pick {
        Pick {
            participant_id: participant.into(),
            driver_id: driver.into(),
            round: 1,
            position_in_round: 0,
            picked_at: Utc::now(),
        }
    }

    fn options() -> SessionOptions {
        SessionOptions {
            my_participant_id: "t1".into(),
            snapshot_interval: Duration::from_secs(10),
            status_interval: Duration::from_secs(3),
            tick_interval: Duration::from_secs(1),
            stale_after_failures: 2,
        }
    }

    /// Receive view updates until `predicate` matches or the channel closes.
    async fn wait_for_view(
        rx: &mut mpsc::Receiver<ViewUpdate>,
        predicate: impl Fn(&DraftView) -> bool,
    ) -> DraftView {
        while let Some(update) = rx.recv().await {
            if predicate(&update.view) {
                return update.view;
            }
        }
        panic!("view channel closed before the expected view appeared");
    }

    #[tokio::test(start_paused = true)]
    async fn session_goes_live_on_first_snapshot() {
        let authority = ScriptedAuthority::new(vec![Ok(snapshot(1, vec![]))]);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (view_tx, mut view_rx) = mpsc::channel(64);

        let session = tokio::spawn(run(authority, options(), cmd_rx, view_tx));

        let view = wait_for_view(&mut view_rx, |v| v.phase == ViewPhase::Live).await;
        assert_eq!(view.version, 1);
        assert!(view.my_turn);

        cmd_tx.send(SessionCommand::Shutdown).await.unwrap();
        session.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn double_click_issues_a_single_network_call() {
        let authority = std::sync::Arc::new(ScriptedAuthority::new(vec![Ok(snapshot(1, vec![]))]));
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (view_tx, mut view_rx) = mpsc::channel(64);

        let session = tokio::spawn(run(
            ArcAuthority(authority.clone()),
            options(),
            cmd_rx,
            view_tx,
        ));

        wait_for_view(&mut view_rx, |v| v.phase == ViewPhase::Live).await;

        // Rapid double-click: two submits for the same driver back to back.
        cmd_tx
            .send(SessionCommand::AttemptPick {
                driver_id: "d1".into(),
            })
            .await
            .unwrap();
        cmd_tx
            .send(SessionCommand::AttemptPick {
                driver_id: "d1".into(),
            })
            .await
            .unwrap();

        wait_for_view(&mut view_rx, |v| v.pending.is_pending()).await;

        cmd_tx.send(SessionCommand::Shutdown).await.unwrap();
        session.await.unwrap().unwrap();

        assert_eq!(authority.submit_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_poll_failures_flag_the_view_stale() {
        let authority = ScriptedAuthority::new(vec![
            Ok(snapshot(1, vec![])),
            Err("connection reset".into()),
            Err("connection reset".into()),
        ]);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (view_tx, mut view_rx) = mpsc::channel(64);

        let session = tokio::spawn(run(authority, options(), cmd_rx, view_tx));

        let view = wait_for_view(&mut view_rx, |v| {
            matches!(v.phase, ViewPhase::Stale { .. })
        })
        .await;
        // The last good view survives the failures.
        assert_eq!(view.version, 1);

        // Once the script is exhausted the authority answers again (with the
        // same version) and the view goes live.
        wait_for_view(&mut view_rx, |v| v.phase == ViewPhase::Live).await;

        cmd_tx.send(SessionCommand::Shutdown).await.unwrap();
        session.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn lost_race_resolves_pending_and_keeps_us_eligible() {
        let authority = ScriptedAuthority::new(vec![
            Ok(snapshot(1, vec![])),
            Ok(snapshot(2, vec![pick("t2", "d1")])),
        ]);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (view_tx, mut view_rx) = mpsc::channel(64);

        let session = tokio::spawn(run(authority, options(), cmd_rx, view_tx));

        wait_for_view(&mut view_rx, |v| v.phase == ViewPhase::Live).await;
        cmd_tx
            .send(SessionCommand::AttemptPick {
                driver_id: "d1".into(),
            })
            .await
            .unwrap();

        let view = wait_for_view(&mut view_rx, |v| {
            matches!(v.pending, PendingState::Resolved(PickOutcome::Lost { .. }))
        })
        .await;
        assert!(!view.pending.is_pending());
        assert!(view.available_drivers.iter().all(|d| d.id != "d1"));

        cmd_tx.send(SessionCommand::Shutdown).await.unwrap();
        session.await.unwrap().unwrap();
    }

    /// Arc adapter so a test can keep a handle to the scripted authority
    /// while the session owns "the authority".
    struct ArcAuthority(std::sync::Arc<ScriptedAuthority>);

    #[async_trait]
    impl DraftAuthority for ArcAuthority {
        async fn fetch_snapshot(&self) -> Result<DraftSnapshot, ApiError> {
            self.0.fetch_snapshot().await
        }
        async fn fetch_status(&self) -> Result<StatusSnapshot, ApiError> {
            self.0.fetch_status().await
        }
        async fn submit_pick(&self, driver_id: &str) -> Result<SubmitReceipt, ApiError> {
            self.0.submit_pick(driver_id).await
        }
    }
}
