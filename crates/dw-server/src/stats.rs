//! Statistics sink
//!
//! The in-process consumer of the core's lifecycle events. A real
//! deployment can replace this with a dashboard or persistence
//! collaborator by taking the receiver end of the event channel instead.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use dw_core::events::NodeEvent;
use dw_core::types::DoorOutcome;

/// Running totals kept by the sink
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub sessions: u64,
    pub doors_completed: u64,
    pub doors_errored: u64,
    pub doors_timed_out: u64,
}

/// Consume lifecycle events until the channel closes or shutdown
pub async fn run_stats_sink(
    mut rx: mpsc::Receiver<NodeEvent>,
    cancel: CancellationToken,
) -> StatsSnapshot {
    let mut stats = StatsSnapshot::default();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = rx.recv() => {
                let Some(event) = event else { break };
                apply_event(&mut stats, &event);
            }
        }
    }

    tracing::info!(
        "Totals: {} sessions, {} doors completed, {} errored, {} timed out",
        stats.sessions,
        stats.doors_completed,
        stats.doors_errored,
        stats.doors_timed_out
    );
    stats
}

fn apply_event(stats: &mut StatsSnapshot, event: &NodeEvent) {
    match event {
        NodeEvent::SessionConnected { session, peer } => {
            stats.sessions += 1;
            tracing::info!("{} connected from {}", session, peer);
        }
        NodeEvent::SessionDisconnected { session, duration } => {
            tracing::info!("{} disconnected after {:?}", session, duration);
        }
        NodeEvent::DoorStarted { session, door } => {
            tracing::info!("{} entered door {:?}", session, door);
        }
        NodeEvent::DoorEnded {
            session,
            door,
            outcome,
            duration,
        } => {
            match outcome {
                DoorOutcome::Completed { .. } => stats.doors_completed += 1,
                DoorOutcome::Error => stats.doors_errored += 1,
                DoorOutcome::TimedOut => stats.doors_timed_out += 1,
            }
            tracing::info!(
                "{} left door {:?} ({}) after {:?}",
                session,
                door,
                outcome,
                duration
            );
        }
    }
}
