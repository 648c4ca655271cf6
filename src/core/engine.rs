//! Boundaries to the external processing engine and image corrector
//!
//! The harness never looks inside either collaborator. It only needs:
//! - `Corrector`: output geometry, intrinsics, and a per-image correction
//! - `EngineFactory`: builds an `Engine` once the output geometry is known
//! - `Engine`: tracks frames and prints a summary when the run ends
//!
//! `SessionState` models the engine's lifetime inside one worker run: it is
//! created on the first processed frame and dropped on reset.

use glam::Mat3;
use image::{GrayImage, RgbImage};
use log::debug;
use std::path::Path;

/// Processing engine for one session.
pub trait Engine: Send {
    /// Track one frame. May block for an unbounded time.
    fn track_frame(
        &mut self,
        frame_id: u64,
        timestamp: f64,
        gray: &GrayImage,
        color: &RgbImage,
    ) -> anyhow::Result<()>;

    /// Flush/print the run summary. Called once before the worker stops.
    fn summarize(&mut self) -> anyhow::Result<()>;
}

/// Builds engines for new sessions.
pub trait EngineFactory: Send {
    type Engine: Engine;

    fn construct(
        &mut self,
        width: u32,
        height: u32,
        intrinsics: Mat3,
        settings: Option<&Path>,
    ) -> anyhow::Result<Self::Engine>;
}

/// Geometric correction applied to every frame before tracking.
pub trait Corrector: Send {
    /// Camera matrix of the corrected output
    fn intrinsics(&self) -> Mat3;

    /// Corrected output (width, height)
    fn output_dimensions(&self) -> (u32, u32);

    fn correct_gray(&self, image: &GrayImage) -> anyhow::Result<GrayImage>;

    fn correct_color(&self, image: &RgbImage) -> anyhow::Result<RgbImage>;
}

/// Corrector for sequences that are already rectified.
///
/// Passes images through unchanged and reports fixed intrinsics.
#[derive(Debug, Clone, Copy)]
pub struct IdentityCorrector {
    intrinsics: Mat3,
    width: u32,
    height: u32,
}

impl IdentityCorrector {
    pub fn new(intrinsics: Mat3, width: u32, height: u32) -> Self {
        Self {
            intrinsics,
            width,
            height,
        }
    }

    /// Pinhole camera from focal lengths and principal point
    pub fn pinhole(fx: f32, fy: f32, cx: f32, cy: f32, width: u32, height: u32) -> Self {
        // glam is column-major
        let k = Mat3::from_cols_array(&[fx, 0.0, 0.0, 0.0, fy, 0.0, cx, cy, 1.0]);
        Self::new(k, width, height)
    }
}

impl Corrector for IdentityCorrector {
    fn intrinsics(&self) -> Mat3 {
        self.intrinsics
    }

    fn output_dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn correct_gray(&self, image: &GrayImage) -> anyhow::Result<GrayImage> {
        Ok(image.clone())
    }

    fn correct_color(&self, image: &RgbImage) -> anyhow::Result<RgbImage> {
        Ok(image.clone())
    }
}

/// Live engine plus per-session counters
pub struct Session<E> {
    pub engine: E,
    pub frame_counter: u64,
    pub last_timestamp: f64,
}

/// Engine lifetime inside a worker run
pub enum SessionState<E> {
    Uninitialized,
    Active(Session<E>),
}

impl<E: Engine> SessionState<E> {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active(_))
    }

    /// Return the active session, constructing one on first use.
    pub fn get_or_construct<F, C>(
        &mut self,
        factory: &mut F,
        corrector: &C,
        settings: Option<&Path>,
    ) -> anyhow::Result<&mut Session<E>>
    where
        F: EngineFactory<Engine = E>,
        C: Corrector + ?Sized,
    {
        if let SessionState::Uninitialized = self {
            let (width, height) = corrector.output_dimensions();
            let engine = factory.construct(width, height, corrector.intrinsics(), settings)?;
            debug!("Session started ({}x{})", width, height);
            *self = SessionState::Active(Session {
                engine,
                frame_counter: 0,
                last_timestamp: 0.0,
            });
        }

        match self {
            SessionState::Active(session) => Ok(session),
            SessionState::Uninitialized => Err(anyhow::anyhow!("engine session missing after construction")),
        }
    }

    /// Drop the engine, returning to `Uninitialized`
    pub fn teardown(&mut self) {
        if self.is_active() {
            debug!("Session torn down");
        }
        *self = SessionState::Uninitialized;
    }

    /// Frames tracked in the current session
    pub fn frame_counter(&self) -> u64 {
        match self {
            SessionState::Active(s) => s.frame_counter,
            SessionState::Uninitialized => 0,
        }
    }
}
