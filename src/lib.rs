//! FRAMEPLAY - Real-time replay harness for recorded image sequences
//!
//! Replays a timestamped frame sequence at its capture rate through an
//! external processing engine, publishes every frame to a live observer, and
//! logs promoted geometry to append-only text files.

// Core pipeline (sequence, control, engine boundary, worker)
pub mod core;

pub mod config;
pub mod logging;
pub mod writer;

// Re-export commonly used types from core
pub use config::PlaybackConfig;
pub use crate::core::control::{Command, Observer, PlaybackControl};
pub use crate::core::engine::{Corrector, Engine, EngineFactory, IdentityCorrector};
pub use crate::core::sequence::{Direction, Sequence, SequenceError};
pub use crate::core::worker::{PlaybackReport, PlaybackWorker, WorkerError, WorkerState};
pub use writer::{AffineLight, FramePose, MapPoint, ResultSink, ResultWriter, WriterError};
