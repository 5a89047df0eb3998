//! Long-running poll loop: each tick refreshes live matches and sweeps the
//! ones that ended, then the pacer decides when (or whether) the next tick
//! happens.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use anyhow::Result;
use chrono::{Days, NaiveDate, Utc};
use tracing::{error, info, warn};

use crate::feed::MatchFeed;
use crate::models::MatchStatus;
use crate::reconcile::{ReconcileSummary, Reconciler};
use crate::store::Store;
use crate::sweep::{LiveSweeper, SweepSummary};

/// Waits between ticks. Returning `false` stops the loop.
pub trait Pacer {
    fn wait(&mut self, interval: Duration) -> bool;
}

/// Sleeps on a channel so another thread can end the loop early.
pub struct ChannelPacer {
    rx: Receiver<()>,
}

#[derive(Clone)]
pub struct CancelHandle {
    tx: Sender<()>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(());
    }
}

pub fn cancellable_pacer() -> (ChannelPacer, CancelHandle) {
    let (tx, rx) = mpsc::channel();
    (ChannelPacer { rx }, CancelHandle { tx })
}

impl Pacer for ChannelPacer {
    fn wait(&mut self, interval: Duration) -> bool {
        // A message or every handle dropped both mean stop.
        matches!(self.rx.recv_timeout(interval), Err(RecvTimeoutError::Timeout))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub local_live: usize,
    /// Result of the date-window refresh, when this tick ran one.
    pub window: Option<ReconcileSummary>,
    pub live: Option<ReconcileSummary>,
    pub feed_failed: bool,
    /// `None` when the sweep guard held it back.
    pub sweep: Option<SweepSummary>,
}

impl TickReport {
    pub fn idle(&self) -> bool {
        self.local_live == 0
    }
}

pub struct PollingDriver<'a> {
    store: &'a Store,
    feed: &'a dyn MatchFeed,
    reconciler: &'a Reconciler,
    sweeper: LiveSweeper,
    interval: Duration,
    window_every: Option<u32>,
    ticks: u64,
}

impl<'a> PollingDriver<'a> {
    pub fn new(
        store: &'a Store,
        feed: &'a dyn MatchFeed,
        reconciler: &'a Reconciler,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            feed,
            reconciler,
            sweeper: LiveSweeper::new(),
            interval,
            window_every: None,
            ticks: 0,
        }
    }

    /// Also refresh yesterday..tomorrow every `every` ticks, starting with
    /// the first.
    pub fn with_window_every(mut self, every: Option<u32>) -> Self {
        self.window_every = every.filter(|n| *n > 0);
        self
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn tick(&mut self) -> Result<TickReport> {
        self.ticks += 1;
        let mut report = TickReport::default();

        if let Some(every) = self.window_every
            && (self.ticks - 1) % u64::from(every) == 0
        {
            let (from, to) = window_around(Utc::now().date_naive());
            report.window = self
                .reconciler
                .sync_range(self.store, self.feed, from, to)
                .ok();
        }

        report.local_live = self.store.count_matches_with_status(MatchStatus::Live)?;
        if report.local_live == 0 {
            info!("no live matches, idle");
            return Ok(report);
        }
        info!(live = report.local_live, "updating live matches");

        // One fetch serves both the refresh and the sweep.
        let live = self.feed.fetch_live_matches();
        match &live {
            Ok(batch) => report.live = Some(self.reconciler.reconcile(self.store, batch)),
            Err(err) => {
                warn!(error = %err, "live feed unavailable");
                report.feed_failed = true;
            }
        }
        report.sweep = self.sweeper.guarded_sweep(self.store, &live)?;
        if let Some(sweep) = report.sweep {
            info!(
                checked = sweep.checked,
                finished = sweep.finished_count,
                "sweep done"
            );
        }
        Ok(report)
    }

    /// Ticks until the pacer says stop. A failed tick is logged and the loop
    /// carries on.
    pub fn run(&mut self, pacer: &mut dyn Pacer) -> u64 {
        info!(interval_secs = self.interval.as_secs(), "polling started");
        loop {
            if let Err(err) = self.tick() {
                error!(error = %format!("{err:#}"), "tick failed");
            }
            if !pacer.wait(self.interval) {
                break;
            }
        }
        info!(ticks = self.ticks, "polling stopped");
        self.ticks
    }
}

/// Yesterday through tomorrow.
pub fn window_around(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let from = today.checked_sub_days(Days::new(1)).unwrap_or(today);
    let to = today.checked_add_days(Days::new(1)).unwrap_or(today);
    (from, to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_pacer_stops_on_cancel_or_drop() {
        let (mut pacer, handle) = cancellable_pacer();
        assert!(pacer.wait(Duration::from_millis(1)));
        handle.cancel();
        assert!(!pacer.wait(Duration::from_secs(60)));
        drop(handle);
        assert!(!pacer.wait(Duration::from_secs(60)));
    }

    #[test]
    fn window_spans_three_days() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let (from, to) = window_around(today);
        assert_eq!(from, NaiveDate::from_ymd_opt(2025, 2, 28).unwrap());
        assert_eq!(to, NaiveDate::from_ymd_opt(2025, 3, 2).unwrap());
    }
}
