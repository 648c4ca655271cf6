//! Playback engine modules - sequence, frames, control, worker
//!
//! These modules form the replay pipeline, independent of any UI.

pub mod control;
pub mod engine;
pub mod frame;
pub mod sequence;
pub mod worker;

// Re-exports for convenience
pub use control::{Command, ControlState, NullObserver, Observer, PlaybackControl};
pub use engine::{Corrector, Engine, EngineFactory, IdentityCorrector, Session, SessionState};
pub use frame::{load_frame, FrameError, FramePair};
pub use sequence::{Direction, Sequence, SequenceEntry, SequenceError, SequenceFrame};
pub use worker::{PlaybackReport, PlaybackWorker, WorkerError, WorkerState};
