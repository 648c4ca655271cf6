//! Append-only point cloud and keyframe logs
//!
//! **Why**: The engine promotes geometry in batches (per marginalized
//! keyframe). Each batch is flushed to plain-text logs that external tools can
//! tail while the run is still going.
//!
//! **Used by**: Engine implementations, through `ResultSink`
//!
//! # Formats
//!
//! Point log, one point per line:
//! ```text
//! x y z r g b rx ry rz
//! ```
//! Keyframe log, one frame id per line.
//!
//! # File Handling
//!
//! Both logs are truncated when the writer is created. Every call opens its
//! log in append mode, writes the whole batch, and closes it again. If the
//! open fails nothing is written.

use glam::{Affine3A, Vec3};
use log::{debug, warn};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Map point in its host frame's camera coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapPoint {
    pub position: Vec3,
    /// Observed color (per channel, 0..255 range before correction)
    pub color: Vec3,
}

/// Photometric affine correction: `global = a * observed + b`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineLight {
    pub a: f32,
    pub b: f32,
}

impl Default for AffineLight {
    fn default() -> Self {
        Self { a: 1.0, b: 0.0 }
    }
}

/// Keyframe pose and photometric state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramePose {
    pub id: u64,
    pub cam_to_world: Affine3A,
    pub light: AffineLight,
}

/// One line of the point log
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointRecord {
    pub position_world: Vec3,
    pub color_global: [i32; 3],
    pub ray_direction: Vec3,
}

impl PointRecord {
    /// Move a point into the world frame and correct its color
    pub fn new(point: &MapPoint, frame: &FramePose) -> Self {
        let position_world = frame.cam_to_world.transform_point3(point.position);
        let color = point.color * frame.light.a + Vec3::splat(frame.light.b);
        let camera_center = Vec3::from(frame.cam_to_world.translation);

        Self {
            position_world,
            // `as` truncates toward zero
            color_global: [color.x as i32, color.y as i32, color.z as i32],
            ray_direction: position_world - camera_center,
        }
    }

    fn to_line(&self) -> String {
        let p = self.position_world;
        let c = self.color_global;
        let r = self.ray_direction;
        format!(
            "{} {} {} {} {} {} {} {} {}\n",
            p.x, p.y, p.z, c[0], c[1], c[2], r.x, r.y, r.z
        )
    }
}

/// Writer errors
#[derive(Debug)]
pub enum WriterError {
    Open { path: PathBuf, source: std::io::Error },
    Write { path: PathBuf, source: std::io::Error },
}

impl std::fmt::Display for WriterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriterError::Open { path, source } => write!(f, "Cannot open {}: {}", path.display(), source),
            WriterError::Write { path, source } => write!(f, "Cannot write {}: {}", path.display(), source),
        }
    }
}

impl std::error::Error for WriterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WriterError::Open { source, .. } | WriterError::Write { source, .. } => Some(source),
        }
    }
}

/// Destination for promoted geometry
pub trait ResultSink {
    /// Append `points`, hosted by `frame`, to the point log
    fn output(&mut self, points: &[MapPoint], frame: &FramePose) -> Result<(), WriterError>;

    /// Append `frame`'s id to the keyframe log
    fn output_keyframes(&mut self, frame: &FramePose) -> Result<(), WriterError>;
}

/// Plain-text log writer. Holds paths only; no handle outlives a call.
#[derive(Debug, Clone)]
pub struct ResultWriter {
    point_log: PathBuf,
    keyframe_log: PathBuf,
}

impl ResultWriter {
    /// Create the writer, truncating both logs
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(point_log: P, keyframe_log: Q) -> Result<Self, WriterError> {
        let writer = Self {
            point_log: point_log.into(),
            keyframe_log: keyframe_log.into(),
        };

        for path in [&writer.point_log, &writer.keyframe_log] {
            File::create(path).map_err(|source| WriterError::Open {
                path: path.clone(),
                source,
            })?;
        }

        debug!(
            "Result writer initialized: {}, {}",
            writer.point_log.display(),
            writer.keyframe_log.display()
        );
        Ok(writer)
    }

    pub fn point_log(&self) -> &Path {
        &self.point_log
    }

    pub fn keyframe_log(&self) -> &Path {
        &self.keyframe_log
    }
}

/// Open `path` for append and write `text` in one go
fn append(path: &Path, text: &str) -> Result<(), WriterError> {
    let mut file = OpenOptions::new().append(true).create(true).open(path).map_err(|source| {
        warn!("Cannot open {} for append: {}", path.display(), source);
        WriterError::Open {
            path: path.to_path_buf(),
            source,
        }
    })?;

    file.write_all(text.as_bytes())
        .and_then(|_| file.flush())
        .map_err(|source| WriterError::Write {
            path: path.to_path_buf(),
            source,
        })
}

impl ResultSink for ResultWriter {
    fn output(&mut self, points: &[MapPoint], frame: &FramePose) -> Result<(), WriterError> {
        let text: String = points
            .iter()
            .map(|p| PointRecord::new(p, frame).to_line())
            .collect();
        append(&self.point_log, &text)?;
        debug!("Wrote {} points for frame {}", points.len(), frame.id);
        Ok(())
    }

    fn output_keyframes(&mut self, frame: &FramePose) -> Result<(), WriterError> {
        append(&self.keyframe_log, &format!("{}\n", frame.id))
    }
}
