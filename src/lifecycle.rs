//! Lifecycle coordinator: setup, poll loop, and ordered teardown
//!
//! `Starting -> Running -> Draining -> Stopped`, or straight from `Starting`
//! to `Stopped` when setup fails. While running, a fixed one-second ticker
//! and the shutdown token are the only two event sources; a poll and the
//! shutdown never run concurrently.

use crate::backend::{Acquired, Backend};
use crate::poll::{ChangeEvent, PollState};
use crate::setup::setup;
use crate::target::Target;
use crate::Result;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Fixed polling cadence.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Running,
    Draining,
    Stopped,
}

/// Destination for change events.
pub trait ChangeSink: Send {
    fn record(&mut self, event: &ChangeEvent);
}

/// Writes every change to the log stream.
#[derive(Debug, Default)]
pub struct LogSink;

impl ChangeSink for LogSink {
    fn record(&mut self, event: &ChangeEvent) {
        info!("{}", event);
    }
}

impl ChangeSink for Vec<ChangeEvent> {
    fn record(&mut self, event: &ChangeEvent) {
        self.push(event.clone());
    }
}

/// What happened during one run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub polls: u64,
    pub changes: u64,
    pub iteration_failures: u64,
    pub released: usize,
    pub release_failures: usize,
}

pub struct Coordinator<S = LogSink> {
    shutdown: CancellationToken,
    sink: S,
    phase: Phase,
}

impl Coordinator<LogSink> {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self::with_sink(shutdown, LogSink)
    }
}

impl<S: ChangeSink> Coordinator<S> {
    pub fn with_sink(shutdown: CancellationToken, sink: S) -> Self {
        Self {
            shutdown,
            sink,
            phase: Phase::Starting,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn enter(&mut self, phase: Phase) {
        debug!("Lifecycle {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// Run until the shutdown token is cancelled.
    ///
    /// Setup errors are returned after the backend rolled back. Once setup
    /// succeeded, every closer is released exactly once in reverse
    /// acquisition order; if this future is dropped or panics first, the
    /// registry releases them on drop instead.
    pub async fn run<B: Backend>(&mut self, backend: B, target: &Target) -> Result<RunSummary> {
        self.enter(Phase::Starting);

        let Acquired { tables, closers } = match setup(backend, target).await {
            Ok(acquired) => acquired,
            Err(e) => {
                self.enter(Phase::Stopped);
                return Err(e);
            }
        };

        self.enter(Phase::Running);
        let mut summary = RunSummary::default();
        let mut state = PollState::new();
        let shutdown = self.shutdown.clone();

        let mut ticker = interval_at(Instant::now() + POLL_INTERVAL, POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Waiting for {} calls...", target.symbol());
        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Received signal, exiting..");
                    break;
                }
                _ = ticker.tick() => {
                    let report = state.poll(&tables);
                    summary.polls += 1;
                    summary.changes += report.changes.len() as u64;
                    summary.iteration_failures += report.failures.len() as u64;
                    for change in &report.changes {
                        self.sink.record(change);
                    }
                }
            }
        }

        self.enter(Phase::Draining);
        drop(tables);
        let release = closers.release_all().await;
        if !release.is_clean() {
            warn!(
                "{} of {} resources failed to release",
                release.failures.len(),
                release.released + release.failures.len()
            );
        }
        summary.released = release.released;
        summary.release_failures = release.failures.len();

        self.enter(Phase::Stopped);
        Ok(summary)
    }
}
