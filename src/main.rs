// Draft client entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to stderr; stdout belongs to the draft feed)
// 2. Load config
// 3. Build the HTTP authority client
// 4. Create mpsc channels and spawn the session task
// 5. Read commands from stdin, print view updates to stdout
// 6. Cleanup on exit

use grid_draft::api::HttpAuthority;
use grid_draft::config;
use grid_draft::draft::reconciler::{DraftView, ViewPhase};
use grid_draft::draft::resolver::{PendingState, PickOutcome};
use grid_draft::session::{self, SessionCommand, SessionOptions, ViewUpdate};

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("Draft client starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: league={}, participant={}",
        config.league.name, config.league.my_participant_id
    );

    // 3. Build the HTTP authority client
    let authority = HttpAuthority::new(&config.authority.base_url, &config.league.id);

    // 4. Create mpsc channels and spawn the session task
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (view_tx, mut view_rx) = mpsc::channel(256);
    let options = SessionOptions::from_config(&config);
    let session_handle = tokio::spawn(async move {
        if let Err(e) = session::run(authority, options, cmd_rx, view_tx).await {
            error!("session loop error: {}", e);
        }
    });

    // 5. Command loop: stdin drives commands, the session drives the feed
    println!("Commands: pick <driver-id> | drivers | status | ack | quit");
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut last_view: Option<DraftView> = None;

    loop {
        tokio::select! {
            update = view_rx.recv() => {
                match update {
                    Some(ViewUpdate { view, .. }) => {
                        print_view(&view);
                        last_view = Some(view);
                    }
                    None => {
                        info!("session ended, exiting");
                        break;
                    }
                }
            }

            line = stdin.next_line() => {
                let Ok(Some(line)) = line else {
                    // stdin closed (EOF)
                    let _ = cmd_tx.send(SessionCommand::Shutdown).await;
                    break;
                };
                let mut parts = line.split_whitespace();
                match (parts.next(), parts.next()) {
                    (Some("pick"), Some(driver_id)) => {
                        let cmd = SessionCommand::AttemptPick {
                            driver_id: driver_id.to_string(),
                        };
                        if cmd_tx.send(cmd).await.is_err() {
                            break;
                        }
                    }
                    (Some("pick"), None) => println!("usage: pick <driver-id>"),
                    (Some("drivers"), _) => print_drivers(last_view.as_ref()),
                    (Some("status"), _) | (Some("refresh"), _) => {
                        if cmd_tx.send(SessionCommand::Refresh).await.is_err() {
                            break;
                        }
                    }
                    (Some("ack"), _) => {
                        if cmd_tx.send(SessionCommand::AcknowledgeOutcome).await.is_err() {
                            break;
                        }
                    }
                    (Some("quit"), _) | (Some("exit"), _) => {
                        let _ = cmd_tx.send(SessionCommand::Shutdown).await;
                        break;
                    }
                    (Some(other), _) => println!("unknown command: {other}"),
                    (None, _) => {}
                }
            }
        }
    }

    // 6. Cleanup: give the session a moment to wind down
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        let _ = session_handle.await;
    })
    .await;

    info!("Draft client shut down cleanly");
    Ok(())
}

/// One-line-per-fact rendering of a view update.
fn print_view(view: &DraftView) {
    match &view.phase {
        ViewPhase::Empty | ViewPhase::Loading => {
            println!("-- waiting for the first draft snapshot --");
            return;
        }
        ViewPhase::Stale { error } => {
            println!("!! connection trouble ({error}); showing last known state");
        }
        ViewPhase::Live => {}
    }

    let countdown = view
        .countdown
        .map(|d| {
            let secs = d.num_seconds();
            format!("{}:{:02}", secs / 60, secs % 60)
        })
        .unwrap_or_else(|| "--".to_string());

    println!(
        "[v{} {}] picks {}/{}  time {}",
        view.version, view.status, view.picks_made, view.structural_max, countdown
    );

    if let Some(cursor) = &view.cursor {
        let name = view
            .participants
            .iter()
            .find(|p| p.id == cursor.participant_id)
            .map(|p| p.display_name.as_str())
            .unwrap_or(cursor.participant_id.as_str());
        println!(
            "  on the clock: {} (round {}, slot {})",
            name, cursor.round, cursor.position_in_round
        );
    }
    if view.my_turn {
        println!("  >> your turn: pick <driver-id>");
    }

    match &view.pending {
        PendingState::Idle => {}
        PendingState::Pending(p) => {
            println!("  pending: {} (awaiting confirmation)", p.driver_id);
        }
        PendingState::Resolved(outcome) => match outcome {
            PickOutcome::Committed { driver_id } => {
                println!("  confirmed: {driver_id} is yours (ack to dismiss)");
            }
            PickOutcome::Lost { driver_id, winner } => {
                println!("  lost: {driver_id} went to {winner} (ack to dismiss)");
            }
            PickOutcome::Refused { driver_id, reason } => {
                println!("  refused: {driver_id} ({reason}) (ack to dismiss)");
            }
        },
    }
}

fn print_drivers(view: Option<&DraftView>) {
    let Some(view) = view else {
        println!("no snapshot yet");
        return;
    };
    println!("{} drivers available:", view.available_drivers.len());
    for driver in &view.available_drivers {
        match &driver.constructor {
            Some(team) => println!("  {}  {} ({team})", driver.id, driver.name),
            None => println!("  {}  {}", driver.id, driver.name),
        }
    }
}

/// Initialize tracing to stderr so stdout stays clean for the draft feed.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("grid_draft=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
