use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::ScheduleConfig;
use crate::diff::{Reconciliation, Refresher};
use crate::dispatch::{DispatchReport, Dispatcher};
use crate::error::PollError;

#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
}

impl From<&ScheduleConfig> for PollConfig {
    fn from(schedule: &ScheduleConfig) -> Self {
        Self {
            interval: schedule.interval(),
        }
    }
}

/// Result of one refresh-then-notify cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// `None` when a reconciliation started elsewhere was still running.
    pub reconciliation: Option<Reconciliation>,
    /// `None` when there was no snapshot to notify from or the subscriber
    /// list could not be read.
    pub dispatch: Option<DispatchReport>,
}

impl CycleReport {
    /// True when the cycle neither found new posts nor sent anything.
    pub fn is_quiet(&self) -> bool {
        let no_new_posts = self
            .reconciliation
            .as_ref()
            .map_or(true, |outcome| outcome.new_items().is_empty());
        let nothing_sent = self
            .dispatch
            .as_ref()
            .map_or(true, |report| report.delivered_items == 0);
        no_new_posts && nothing_sent
    }

    fn log(&self) {
        if self.is_quiet() {
            debug!(skipped = self.reconciliation.is_none(), "poll cycle quiet");
            return;
        }
        let new_posts = self
            .reconciliation
            .as_ref()
            .map_or(0, |outcome| outcome.new_items().len());
        let report = self.dispatch.clone().unwrap_or_default();
        info!(
            new_posts,
            delivered = report.delivered_items,
            notified = report.notified,
            failures = report.delivery_failures + report.store_failures,
            "poll cycle finished"
        );
    }
}

/// Refreshes the cache, then notifies every subscriber from the cached posts.
pub async fn poll_once(refresher: &Refresher, dispatcher: &Dispatcher) -> CycleReport {
    let reconciliation = refresher.try_refresh().await;

    let dispatch = match refresher.cache().get().await {
        Some(snapshot) => match dispatcher.dispatch(snapshot.items()).await {
            Ok(report) => Some(report),
            Err(err) => {
                warn!(error = %err, "unable to list subscribers, skipping notification pass");
                None
            }
        },
        None => {
            debug!("no cached posts, skipping notification pass");
            None
        }
    };

    CycleReport {
        reconciliation,
        dispatch,
    }
}

/// Running poll loop. Dropping the handle leaves the loop running.
pub struct PollerHandle {
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Signals the loop and waits for it. A cycle already running completes first.
    pub async fn stop(self) -> Result<(), PollError> {
        let _ = self.shutdown.send(());
        Ok(self.task.await?)
    }
}

/// Runs [`poll_once`] every `config.interval`, starting immediately. Ticks
/// missed while a cycle runs are dropped rather than replayed.
pub fn spawn_poller(
    refresher: Arc<Refresher>,
    dispatcher: Arc<Dispatcher>,
    config: PollConfig,
) -> PollerHandle {
    let (shutdown, mut shutdown_rx) = broadcast::channel(1);
    let task = tokio::spawn(async move {
        let mut ticks = interval(config.interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval = ?config.interval, "poller started");

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = ticks.tick() => poll_once(&refresher, &dispatcher).await.log(),
            }
        }
        info!("poller stopped");
    });

    PollerHandle { shutdown, task }
}
