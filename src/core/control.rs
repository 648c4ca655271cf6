//! Control commands between the control context and the playback worker
//!
//! The control context (live view, test harness, signal handler) never touches
//! worker state directly. It sends `Command`s through a `PlaybackControl`
//! handle; the worker drains the channel once per loop iteration and folds the
//! commands into `ControlState`.
//!
//! - Pause / Resume are level triggers (last one wins)
//! - Reset is an edge trigger, consumed exactly once
//! - Stop ends the loop at the next iteration boundary

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use image::GrayImage;
use log::trace;
use std::sync::Arc;
use std::time::Duration;

/// Command sent from the control context to the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Pause,
    Resume,
    Reset,
    Stop,
}

/// Cloneable sender side of the command channel.
///
/// Sends never block. Sending to a worker that has already exited is a no-op.
#[derive(Debug, Clone)]
pub struct PlaybackControl {
    tx: Sender<Command>,
}

impl PlaybackControl {
    pub(crate) fn new(tx: Sender<Command>) -> Self {
        Self { tx }
    }

    pub fn send(&self, cmd: Command) {
        trace!("Control: {:?}", cmd);
        let _ = self.tx.send(cmd);
    }

    pub fn pause(&self) {
        self.send(Command::Pause);
    }

    pub fn resume(&self) {
        self.send(Command::Resume);
    }

    /// Enable or disable frame processing
    pub fn set_processing(&self, enabled: bool) {
        self.send(if enabled { Command::Resume } else { Command::Pause });
    }

    pub fn reset(&self) {
        self.send(Command::Reset);
    }

    /// Request the loop to end. Use `PlaybackWorker::stop()` to also wait for it.
    pub fn request_stop(&self) {
        self.send(Command::Stop);
    }
}

/// Signals as seen by the worker after folding received commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlState {
    pub processing_enabled: bool,
    pub reset_requested: bool,
    pub stop_requested: bool,
}

impl ControlState {
    pub fn new(processing_enabled: bool) -> Self {
        Self {
            processing_enabled,
            reset_requested: false,
            stop_requested: false,
        }
    }

    pub fn apply(&mut self, cmd: Command) {
        match cmd {
            Command::Pause => self.processing_enabled = false,
            Command::Resume => self.processing_enabled = true,
            Command::Reset => self.reset_requested = true,
            Command::Stop => self.stop_requested = true,
        }
    }

    /// Consume a pending reset request
    pub fn take_reset(&mut self) -> bool {
        std::mem::take(&mut self.reset_requested)
    }
}

/// Worker-side receiver that folds commands into a `ControlState`.
pub(crate) struct CommandInbox {
    rx: Receiver<Command>,
    pub state: ControlState,
}

impl CommandInbox {
    pub fn new(rx: Receiver<Command>, processing_enabled: bool) -> Self {
        Self {
            rx,
            state: ControlState::new(processing_enabled),
        }
    }

    /// Fold every queued command without blocking.
    pub fn drain(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(cmd) => self.state.apply(cmd),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.state.stop_requested = true;
                    break;
                }
            }
        }
    }

    /// Wait up to `timeout` for the next command.
    ///
    /// Returns early when a command arrives; the command is folded, not acted
    /// upon. Returns true if the wait was cut short.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(cmd) => {
                self.state.apply(cmd);
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => {
                self.state.stop_requested = true;
                true
            }
        }
    }
}

/// Live view that receives every processed frame.
///
/// Called from the worker thread, so implementations use interior mutability
/// and must be `Send + Sync` to be shared with the control context.
pub trait Observer: Send + Sync {
    /// Show the latest processed (corrected, grayscale) frame
    fn publish_frame(&self, frame: &GrayImage) -> anyhow::Result<()>;

    /// Clear any accumulated view state after a pipeline reset
    fn reset(&self) -> anyhow::Result<()>;
}

impl<T: Observer + ?Sized> Observer for Arc<T> {
    fn publish_frame(&self, frame: &GrayImage) -> anyhow::Result<()> {
        (**self).publish_frame(frame)
    }

    fn reset(&self) -> anyhow::Result<()> {
        (**self).reset()
    }
}

/// Observer that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl Observer for NullObserver {
    fn publish_frame(&self, _frame: &GrayImage) -> anyhow::Result<()> {
        Ok(())
    }

    fn reset(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::time::Instant;

    #[test]
    fn test_pause_resume_last_wins() {
        let mut state = ControlState::new(true);
        state.apply(Command::Pause);
        assert!(!state.processing_enabled);
        state.apply(Command::Resume);
        state.apply(Command::Pause);
        assert!(!state.processing_enabled);
    }

    /// Test: Reset edge trigger
    /// Validates: A reset request is consumed exactly once
    #[test]
    fn test_reset_consumed_once() {
        let mut state = ControlState::new(false);
        state.apply(Command::Reset);
        state.apply(Command::Reset);
        assert!(state.take_reset());
        assert!(!state.take_reset());
    }

    #[test]
    fn test_inbox_drain_folds_all() {
        let (tx, rx) = unbounded();
        let control = PlaybackControl::new(tx);
        let mut inbox = CommandInbox::new(rx, false);

        control.resume();
        control.reset();
        inbox.drain();

        assert!(inbox.state.processing_enabled);
        assert!(inbox.state.reset_requested);
        assert!(!inbox.state.stop_requested);
    }

    #[test]
    fn test_inbox_disconnect_means_stop() {
        let (tx, rx) = unbounded::<Command>();
        let mut inbox = CommandInbox::new(rx, true);
        drop(tx);
        inbox.drain();
        assert!(inbox.state.stop_requested);
    }

    /// Test: Interruptible wait
    /// Validates: A queued command ends the wait immediately
    #[test]
    fn test_wait_interrupted_by_command() {
        let (tx, rx) = unbounded();
        let control = PlaybackControl::new(tx);
        let mut inbox = CommandInbox::new(rx, true);

        control.request_stop();
        let started = Instant::now();
        assert!(inbox.wait(Duration::from_secs(5)));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(inbox.state.stop_requested);
    }

    #[test]
    fn test_wait_times_out() {
        let (_tx, rx) = unbounded::<Command>();
        let mut inbox = CommandInbox::new(rx, true);
        assert!(!inbox.wait(Duration::from_millis(5)));
        assert_eq!(inbox.state, ControlState::new(true));
    }
}
