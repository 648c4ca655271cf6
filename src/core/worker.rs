//! Real-time playback worker
//!
//! Replays a `Sequence` at its nominal rate on a dedicated thread, feeding
//! every frame through the corrector and the engine and publishing it to the
//! observer. The control context steers the loop through `PlaybackControl`.
//!
//! # Lifecycle
//!
//! `Idle -> Running -> Stopping -> Stopped`
//!
//! - `start()` only from `Idle`, otherwise `AlreadyRunning`
//! - `stop()` sends `Stop` and joins; engine summary runs before `Stopped`
//! - dropping a started worker stops and joins it
//!
//! # Loop
//!
//! Each iteration folds queued commands, then either handles a reset, or
//! processes one frame and sleeps the rest of the frame budget, or waits
//! for a command. Late frames are not compensated: after an overrun the next
//! frame is processed immediately.
//!
//! Engine, corrector and observer faults end the loop. The error is returned
//! from `stop()` / `join()`.

use anyhow::Context;
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info, trace, warn};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::control::{Command, CommandInbox, Observer, PlaybackControl};
use super::engine::{Corrector, Engine, EngineFactory, SessionState};
use super::frame::FramePair;
use super::sequence::{Sequence, SequenceError, SequenceFrame};
use crate::config::PlaybackConfig;

/// Worker lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Idle = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => WorkerState::Idle,
            1 => WorkerState::Running,
            2 => WorkerState::Stopping,
            _ => WorkerState::Stopped,
        }
    }
}

/// State cell shared between the worker handle and its thread
#[derive(Debug, Clone)]
struct SharedState(Arc<AtomicU8>);

impl SharedState {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(WorkerState::Idle as u8)))
    }

    fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: WorkerState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move `Running -> Stopping`; other states are left alone
    fn begin_stop(&self) {
        let _ = self.0.compare_exchange(
            WorkerState::Running as u8,
            WorkerState::Stopping as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

/// Counters collected over one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackReport {
    /// Frames handed to the engine
    pub frames_processed: u64,
    /// Frames dropped because they failed to decode
    pub frames_skipped: u64,
    /// Frames whose processing exceeded the frame budget
    pub overruns: u64,
    /// Engine sessions constructed
    pub sessions: u32,
    /// Resets handled
    pub resets: u32,
}

/// Worker errors
#[derive(Debug)]
pub enum WorkerError {
    /// `start()` on a worker that is not `Idle`
    AlreadyRunning(WorkerState),
    /// `stop()` / `join()` before `start()`
    NotStarted,
    /// `stop()` / `join()` after the run was already collected
    AlreadyStopped,
    /// Sequence has no entries
    SequenceNotOpened,
    /// Corrector reports a zero-sized output
    InvalidCorrector { width: u32, height: u32 },
    /// Worker thread could not be spawned
    Spawn(std::io::Error),
    /// Engine / corrector / observer fault that ended the loop
    Fault(anyhow::Error),
    /// Worker thread panicked
    Panicked(String),
}

impl std::fmt::Display for WorkerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerError::AlreadyRunning(state) => write!(f, "Worker already started (state: {:?})", state),
            WorkerError::NotStarted => write!(f, "Worker was never started"),
            WorkerError::AlreadyStopped => write!(f, "Worker already stopped"),
            WorkerError::SequenceNotOpened => write!(f, "Sequence is not opened"),
            WorkerError::InvalidCorrector { width, height } => {
                write!(f, "Corrector output size {}x{} is invalid", width, height)
            }
            WorkerError::Spawn(e) => write!(f, "Failed to spawn worker thread: {}", e),
            WorkerError::Fault(e) => write!(f, "Playback failed: {:#}", e),
            WorkerError::Panicked(msg) => write!(f, "Worker thread panicked: {}", msg),
        }
    }
}

impl std::error::Error for WorkerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WorkerError::Spawn(e) => Some(e),
            WorkerError::Fault(e) => Some(&**e),
            _ => None,
        }
    }
}

/// Collaborators moved into the worker thread on `start()`
struct Parts<F, C, O> {
    sequence: Sequence,
    corrector: C,
    factory: F,
    observer: O,
}

/// Handle to the playback thread.
///
/// # Example
/// ```ignore
/// let mut worker = PlaybackWorker::new(sequence, corrector, factory, observer, config);
/// let control = worker.control();
/// worker.start()?;
/// control.pause();
/// control.reset();
/// control.resume();
/// let report = worker.stop()?;
/// ```
pub struct PlaybackWorker<F, C, O>
where
    F: EngineFactory + 'static,
    C: Corrector + 'static,
    O: Observer + 'static,
{
    parts: Option<Parts<F, C, O>>,
    config: PlaybackConfig,
    state: SharedState,
    tx: Sender<Command>,
    rx: Option<Receiver<Command>>,
    handle: Option<thread::JoinHandle<anyhow::Result<PlaybackReport>>>,
}

impl<F, C, O> PlaybackWorker<F, C, O>
where
    F: EngineFactory + 'static,
    C: Corrector + 'static,
    O: Observer + 'static,
{
    pub fn new(sequence: Sequence, corrector: C, factory: F, observer: O, config: PlaybackConfig) -> Self {
        let (tx, rx) = unbounded();
        Self {
            parts: Some(Parts {
                sequence,
                corrector,
                factory,
                observer,
            }),
            config,
            state: SharedState::new(),
            tx,
            rx: Some(rx),
            handle: None,
        }
    }

    /// Control handle. Commands sent before `start()` are applied on the first iteration.
    pub fn control(&self) -> PlaybackControl {
        PlaybackControl::new(self.tx.clone())
    }

    pub fn state(&self) -> WorkerState {
        self.state.get()
    }

    /// True once the worker thread has exited (stopped or faulted)
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| h.is_finished())
    }

    /// Spawn the playback thread.
    pub fn start(&mut self) -> Result<(), WorkerError> {
        let state = self.state.get();
        if state != WorkerState::Idle {
            return Err(WorkerError::AlreadyRunning(state));
        }

        let parts = self.parts.as_ref().ok_or(WorkerError::AlreadyRunning(state))?;
        if !parts.sequence.is_opened() {
            return Err(WorkerError::SequenceNotOpened);
        }
        let (width, height) = parts.corrector.output_dimensions();
        if width == 0 || height == 0 {
            return Err(WorkerError::InvalidCorrector { width, height });
        }

        let (Some(parts), Some(rx)) = (self.parts.take(), self.rx.take()) else {
            return Err(WorkerError::AlreadyRunning(state));
        };

        let inbox = CommandInbox::new(rx, !self.config.start_paused);
        let playback = Playback {
            sequence: parts.sequence,
            corrector: parts.corrector,
            factory: parts.factory,
            observer: parts.observer,
            inbox,
            session: SessionState::Uninitialized,
            config: self.config.clone(),
            state: self.state.clone(),
            report: PlaybackReport::default(),
            at_end: false,
            next_frame_at: None,
        };

        self.state.set(WorkerState::Running);
        let spawned = thread::Builder::new()
            .name("frameplay-worker".to_string())
            .spawn(move || playback.run());

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                info!("Playback worker started");
                Ok(())
            }
            Err(e) => {
                self.state.set(WorkerState::Stopped);
                Err(WorkerError::Spawn(e))
            }
        }
    }

    /// Request stop and block until the thread has exited.
    pub fn stop(&mut self) -> Result<PlaybackReport, WorkerError> {
        if self.handle.is_some() {
            self.state.begin_stop();
            let _ = self.tx.send(Command::Stop);
        }
        self.join()
    }

    /// Block until the thread exits on its own (stop command or fault).
    pub fn join(&mut self) -> Result<PlaybackReport, WorkerError> {
        let Some(handle) = self.handle.take() else {
            return Err(match self.state.get() {
                WorkerState::Idle => WorkerError::NotStarted,
                _ => WorkerError::AlreadyStopped,
            });
        };

        debug!("Waiting for playback worker to finish...");
        let joined = handle.join();
        self.state.set(WorkerState::Stopped);

        match joined {
            Ok(Ok(report)) => {
                info!(
                    "Playback worker finished: {} frames, {} skipped, {} overruns",
                    report.frames_processed, report.frames_skipped, report.overruns
                );
                Ok(report)
            }
            Ok(Err(e)) => Err(WorkerError::Fault(e)),
            Err(payload) => Err(WorkerError::Panicked(panic_message(payload.as_ref()))),
        }
    }
}

impl<F, C, O> Drop for PlaybackWorker<F, C, O>
where
    F: EngineFactory + 'static,
    C: Corrector + 'static,
    O: Observer + 'static,
{
    fn drop(&mut self) {
        if self.handle.is_some() {
            if let Err(e) = self.stop() {
                error!("Playback worker: {}", e);
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Time available per frame, `None` when the rate gives no usable budget
fn frame_budget(rate: f64) -> Option<Duration> {
    if rate.is_finite() && rate > 0.0 {
        Some(Duration::from_secs_f64(1.0 / rate))
    } else {
        None
    }
}

/// Loop state owned by the worker thread
struct Playback<F: EngineFactory, C, O> {
    sequence: Sequence,
    corrector: C,
    factory: F,
    observer: O,
    inbox: CommandInbox,
    session: SessionState<F::Engine>,
    config: PlaybackConfig,
    state: SharedState,
    report: PlaybackReport,
    at_end: bool,
    /// End of the last processed frame's budget
    next_frame_at: Option<Instant>,
}

impl<F, C, O> Playback<F, C, O>
where
    F: EngineFactory,
    C: Corrector,
    O: Observer,
{
    fn run(mut self) -> anyhow::Result<PlaybackReport> {
        let result = self.play();

        self.state.begin_stop();
        let summary = self.finish();
        self.state.set(WorkerState::Stopped);

        match (result, summary) {
            (Err(e), summary) => {
                if let Err(s) = summary {
                    warn!("Engine summary after fault failed: {:#}", s);
                }
                Err(e)
            }
            (Ok(()), Err(e)) => Err(e),
            (Ok(()), Ok(())) => Ok(self.report),
        }
    }

    fn play(&mut self) -> anyhow::Result<()> {
        let budget = frame_budget(self.sequence.rate());
        let idle_wait = Duration::from_millis(self.config.idle_wait_ms.max(1));
        debug!("Frame budget: {:?}", budget);

        loop {
            self.inbox.drain();
            if self.inbox.state.stop_requested {
                return Ok(());
            }

            if self.inbox.state.take_reset() {
                self.reset()?;
                continue;
            }

            if !self.inbox.state.processing_enabled {
                self.inbox.wait(idle_wait);
                continue;
            }

            if let Some(deadline) = self.next_frame_at {
                if Instant::now() < deadline {
                    self.pace(deadline);
                    continue;
                }
                self.next_frame_at = None;
            }

            match self.sequence.read() {
                Ok(Some(frame)) => self.process(frame, budget)?,
                Ok(None) => {
                    if !self.at_end {
                        self.at_end = true;
                        info!("End of sequence after {} frames", self.report.frames_processed);
                    }
                    self.inbox.wait(idle_wait);
                }
                Err(SequenceError::FrameDecode { index, source }) => {
                    warn!("Skipping frame {}: {}", index, source);
                    self.report.frames_skipped += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn reset(&mut self) -> anyhow::Result<()> {
        self.session.teardown();
        self.sequence.reset();
        self.at_end = false;
        self.next_frame_at = None;
        self.observer.reset().context("observer reset failed")?;
        self.report.resets += 1;
        info!("Pipeline reset");
        Ok(())
    }

    fn process(&mut self, frame: SequenceFrame, budget: Option<Duration>) -> anyhow::Result<()> {
        let started = Instant::now();

        let pair = FramePair::from_image(&frame.image);
        let gray = self
            .corrector
            .correct_gray(&pair.gray)
            .with_context(|| format!("correcting frame {}", frame.index))?;
        let color = self
            .corrector
            .correct_color(&pair.color)
            .with_context(|| format!("correcting frame {}", frame.index))?;

        let fresh = !self.session.is_active();
        let session = self
            .session
            .get_or_construct(&mut self.factory, &self.corrector, self.config.engine_settings.as_deref())
            .context("engine construction failed")?;
        if fresh {
            self.report.sessions += 1;
        }

        let frame_id = session.frame_counter;
        session
            .engine
            .track_frame(frame_id, frame.timestamp, &gray, &color)
            .with_context(|| format!("tracking frame {} (t={:.6})", frame_id, frame.timestamp))?;
        session.last_timestamp = frame.timestamp;

        self.observer.publish_frame(&gray).context("publishing frame failed")?;

        session.frame_counter += 1;
        self.report.frames_processed += 1;

        let elapsed = started.elapsed();
        trace!("Frame {} processed in {:?}", frame_id, elapsed);

        if let Some(budget) = budget {
            if elapsed < budget {
                self.next_frame_at = Some(started + budget);
            } else {
                self.report.overruns += 1;
                trace!("Frame {} overran budget by {:?}", frame_id, elapsed - budget);
            }
        }

        Ok(())
    }

    /// Sleep until `deadline`, waking early for stop, reset or pause.
    ///
    /// The deadline itself stays in `next_frame_at`, so waking early never
    /// shortens the frame budget.
    fn pace(&mut self, deadline: Instant) {
        loop {
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            self.inbox.wait(deadline - now);

            let signals = &self.inbox.state;
            if signals.stop_requested || signals.reset_requested || !signals.processing_enabled {
                return;
            }
        }
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        if let SessionState::Active(session) = &mut self.session {
            info!("Summarizing session ({} frames)", session.frame_counter);
            session.engine.summarize().context("engine summary failed")?;
        }
        Ok(())
    }
}
