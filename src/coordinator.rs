use chrono::Local;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::PipelineError;
use crate::messages::PollerMessage;
use crate::sampler::{ApplicationId, ProcessSampler};
use crate::tracker::{StateTracker, Timestamp};
use crate::writer::{log_file_name, LogLine, LogSender, LogWriter};

/// Lifecycle of the logging pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Stopped,
    Initializing,
    Running,
    Stopping,
}

/// Maps a log file name to the full path it should be written to
pub type PathResolver = Box<dyn Fn(&str) -> PathBuf + Send + Sync>;

/// Tasks and handles that only exist while running
struct RunningPipeline<S> {
    stop_tx: oneshot::Sender<PollerMessage>,
    /// Yields the sampler back, unless a sample panicked
    poller: JoinHandle<Option<S>>,
    writer: LogWriter,
}

/// Wires the sampler, the state tracker and the log writer together
pub struct Coordinator<S: ProcessSampler> {
    state: CoordinatorState,
    /// Held here while stopped, moved into the polling task while running
    sampler: Option<S>,
    interval: Duration,
    resolve_path: PathResolver,
    running: Option<RunningPipeline<S>>,
}

impl<S: ProcessSampler> Coordinator<S> {
    pub fn new(
        sampler: S,
        interval: Duration,
        resolve_path: impl Fn(&str) -> PathBuf + Send + Sync + 'static,
    ) -> Self {
        Self {
            state: CoordinatorState::Stopped,
            sampler: Some(sampler),
            interval,
            resolve_path: Box::new(resolve_path),
            running: None,
        }
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// Path of the current log file, while running
    pub fn log_path(&self) -> Option<&Path> {
        self.running.as_ref().map(|r| r.writer.path())
    }

    /// Open a fresh log file and start polling.
    ///
    /// Polling never begins if the file cannot be opened. Calling this while
    /// already running does nothing.
    pub async fn start(&mut self) -> Result<(), PipelineError> {
        if self.state == CoordinatorState::Running {
            debug!("Already running");
            return Ok(());
        }

        let sampler = self
            .sampler
            .take()
            .ok_or(PipelineError::SamplerUnavailable)?;

        self.state = CoordinatorState::Initializing;
        let path = (self.resolve_path)(&log_file_name(Local::now()));

        let writer = match LogWriter::open(&path).await {
            Ok(writer) => writer,
            Err(e) => {
                error!("Error initiating log file, not starting: {}", e);
                self.sampler = Some(sampler);
                self.state = CoordinatorState::Stopped;
                return Err(e.into());
            }
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        let poller = tokio::spawn(poll_loop(sampler, writer.sender(), self.interval, stop_rx));

        self.running = Some(RunningPipeline {
            stop_tx,
            poller,
            writer,
        });
        self.state = CoordinatorState::Running;
        info!("Logging foreground apps every {:?}", self.interval);

        Ok(())
    }

    /// Stop polling, then drain and close the log file.
    ///
    /// Calling this while stopped does nothing.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            debug!("Already stopped");
            return;
        };

        self.state = CoordinatorState::Stopping;
        let _ = running.stop_tx.send(PollerMessage::Stop);

        // The poller must be gone before the writer is closed
        match running.poller.await {
            Ok(sampler) => self.sampler = sampler,
            Err(e) => error!("Polling task failed: {}", e),
        }

        running.writer.close().await;
        self.state = CoordinatorState::Stopped;
        info!("Stopped logging");
    }
}

/// Sample, diff and submit until told to stop.
///
/// The delay is measured from the end of each cycle, so cycles never overlap
/// and the cadence drifts by however long a cycle takes.
async fn poll_loop<S: ProcessSampler>(
    mut sampler: S,
    log: LogSender,
    interval: Duration,
    mut stop_rx: oneshot::Receiver<PollerMessage>,
) -> Option<S> {
    let mut tracker = StateTracker::new();

    loop {
        // Sampling reads /proc and queries the X server
        let (returned, sampled) = match tokio::task::spawn_blocking(move || {
            let sampled = sampler.sample();
            (sampler, sampled)
        })
        .await
        {
            Ok(result) => result,
            Err(e) => {
                error!("Sampler task failed: {}", e);
                return None;
            }
        };
        sampler = returned;

        record_cycle(&mut tracker, &log, sampled, Timestamp::now());

        tokio::select! {
            biased;
            message = &mut stop_rx => match message {
                Ok(PollerMessage::Stop) | Err(_) => break,
            },
            _ = tokio::time::sleep(interval) => {}
        }
    }

    debug!("Discarding {} open sessions", tracker.active().len());
    Some(sampler)
}

/// Diff one sample and submit a line per closed session.
/// Returns the number of closed sessions.
fn record_cycle(
    tracker: &mut StateTracker,
    log: &LogSender,
    sampled: anyhow::Result<HashSet<ApplicationId>>,
    now: Timestamp,
) -> usize {
    let current = sampled.unwrap_or_else(|e| {
        warn!("Failed to sample foreground apps: {:#}", e);
        HashSet::new()
    });

    let closed = tracker.process_sample(&current, now);
    for session in &closed {
        let line = LogLine::session(session);
        debug!("{}", line);
        log.submit(line);
    }

    closed.len()
}
