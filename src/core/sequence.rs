//! Timestamped image sequence indexed by a CSV file
//!
//! **Why**: Recorded datasets ship frames named by their capture time in
//! nanoseconds plus an index listing them in capture order. Playback needs the
//! ordered list, per-frame timestamps in seconds, and a nominal rate to pace
//! the replay.
//!
//! **Used by**: PlaybackWorker (frame source)
//!
//! # Index Format
//!
//! ```text
//! #timestamp [ns],filename
//! 1000000000,1000000000.png
//! 1100000000,1100000000.png
//! ```
//!
//! First line is a header and is skipped. Empty lines are ignored. Only the
//! first comma-delimited field is used: frame path is `<base_dir>/<token>.<ext>`,
//! timestamp is `token / 1e9` seconds.
//!
//! # Nominal Rate
//!
//! `rate = entry_count / (last_ts - first_ts)`. This counts entries, not
//! intervals, so it reads slightly fast for short sequences.

use image::DynamicImage;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

use super::frame::{load_frame, FrameError};

/// Default frame file extension
pub const DEFAULT_IMAGE_EXT: &str = "png";

/// Playback direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
}

impl Direction {
    /// Cursor increment (+1 / -1)
    pub fn step(self) -> isize {
        match self {
            Direction::Forward => 1,
            Direction::Reverse => -1,
        }
    }
}

/// One frame reference parsed from the index
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceEntry {
    pub source_path: PathBuf,
    /// Capture time in seconds
    pub timestamp: f64,
}

/// Decoded frame handed out by `Sequence::read()`
#[derive(Debug, Clone)]
pub struct SequenceFrame {
    /// Position in the index (file order)
    pub index: usize,
    pub timestamp: f64,
    pub image: DynamicImage,
}

/// Sequence errors
#[derive(Debug)]
pub enum SequenceError {
    /// Index could not be read
    Io { path: PathBuf, source: std::io::Error },
    /// Index holds no usable entries, or a line could not be parsed
    EmptyOrMalformed(String),
    /// Frame at the cursor failed to decode. Cursor has already advanced.
    FrameDecode { index: usize, source: FrameError },
}

impl std::fmt::Display for SequenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SequenceError::Io { path, source } => {
                write!(f, "Failed to read index {}: {}", path.display(), source)
            }
            SequenceError::EmptyOrMalformed(msg) => write!(f, "Empty or malformed sequence: {}", msg),
            SequenceError::FrameDecode { index, source } => {
                write!(f, "Frame {} failed to decode: {}", index, source)
            }
        }
    }
}

impl std::error::Error for SequenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SequenceError::Io { source, .. } => Some(source),
            SequenceError::FrameDecode { source, .. } => Some(source),
            SequenceError::EmptyOrMalformed(_) => None,
        }
    }
}

/// Ordered frame list with a playback cursor.
///
/// Built empty by `new()`, filled once by `open()`. Afterwards only the
/// cursor moves (`read()` / `reset()`).
#[derive(Debug, Clone)]
pub struct Sequence {
    base_dir: PathBuf,
    index_path: PathBuf,
    image_ext: String,
    direction: Direction,
    files: Vec<PathBuf>,
    timestamps: Vec<f64>,
    cursor: isize,
    rate: f64,
}

impl Sequence {
    /// Create an unopened sequence reading frames from `base_dir`
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(base_dir: P, index_path: Q, direction: Direction) -> Self {
        Self {
            base_dir: base_dir.into(),
            index_path: index_path.into(),
            image_ext: DEFAULT_IMAGE_EXT.to_string(),
            direction,
            files: Vec::new(),
            timestamps: Vec::new(),
            cursor: 0,
            rate: 0.0,
        }
    }

    /// Override frame file extension (without the dot)
    pub fn with_image_ext(mut self, ext: &str) -> Self {
        self.image_ext = ext.trim_start_matches('.').to_string();
        self
    }

    /// Parse the index and derive the nominal rate.
    ///
    /// All-or-nothing: on error the sequence is left empty.
    pub fn open(&mut self) -> Result<(), SequenceError> {
        if let Err(e) = self.read_index() {
            self.files.clear();
            self.timestamps.clear();
            self.rate = 0.0;
            warn!("Sequence {} not opened: {}", self.index_path.display(), e);
            return Err(e);
        }

        // sequence length in seconds
        let first = self.timestamps[0];
        let last = self.timestamps[self.timestamps.len() - 1];
        self.rate = self.timestamps.len() as f64 / (last - first);

        self.reset();

        info!(
            "Sequence: {} frames, {:.3}s, {:.2} fps ({:?})",
            self.files.len(),
            last - first,
            self.rate,
            self.direction
        );
        Ok(())
    }

    fn read_index(&mut self) -> Result<(), SequenceError> {
        self.files.clear();
        self.timestamps.clear();

        let bytes = std::fs::read(&self.index_path).map_err(|source| SequenceError::Io {
            path: self.index_path.clone(),
            source,
        })?;
        // only the leading numeric token matters; the header may be in any encoding
        let text = String::from_utf8_lossy(&bytes);

        // header on the first line
        for (line_no, line) in text.lines().enumerate().skip(1) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let token = line.split(',').next().unwrap_or("").trim();
            let nanos: f64 = token.parse().map_err(|_| {
                SequenceError::EmptyOrMalformed(format!(
                    "line {}: bad timestamp token '{}'",
                    line_no + 1,
                    token
                ))
            })?;

            self.files.push(self.base_dir.join(format!("{}.{}", token, self.image_ext)));
            self.timestamps.push(nanos / 1e9);
        }

        if self.timestamps.is_empty() {
            return Err(SequenceError::EmptyOrMalformed(format!(
                "no entries in {}",
                self.index_path.display()
            )));
        }
        if self.timestamps.len() != self.files.len() {
            return Err(SequenceError::EmptyOrMalformed(format!(
                "{} timestamps for {} files",
                self.timestamps.len(),
                self.files.len()
            )));
        }

        Ok(())
    }

    /// Rewind the cursor to the first frame in playback direction.
    pub fn reset(&mut self) {
        self.cursor = match self.direction {
            Direction::Forward => 0,
            Direction::Reverse => self.files.len() as isize - 1,
        };
        debug!("Sequence cursor reset to {}", self.cursor);
    }

    /// Advance the cursor without decoding.
    ///
    /// Returns `None` at end of sequence, leaving the cursor in place.
    pub fn next_entry(&mut self) -> Option<(usize, SequenceEntry)> {
        if self.cursor < 0 || self.cursor >= self.files.len() as isize {
            return None;
        }

        let index = self.cursor as usize;
        self.cursor += self.direction.step();

        Some((
            index,
            SequenceEntry {
                source_path: self.files[index].clone(),
                timestamp: self.timestamps[index],
            },
        ))
    }

    /// Decode the frame under the cursor and advance.
    ///
    /// - `Ok(Some(frame))`: frame decoded
    /// - `Ok(None)`: end of sequence, cursor unchanged
    /// - `Err(FrameDecode)`: frame skipped, cursor advanced
    pub fn read(&mut self) -> Result<Option<SequenceFrame>, SequenceError> {
        let Some((index, entry)) = self.next_entry() else {
            return Ok(None);
        };

        let image = load_frame(&entry.source_path)
            .map_err(|source| SequenceError::FrameDecode { index, source })?;

        Ok(Some(SequenceFrame {
            index,
            timestamp: entry.timestamp,
            image,
        }))
    }

    /// True once `open()` has parsed at least one entry
    pub fn is_opened(&self) -> bool {
        !self.files.is_empty()
    }

    /// Nominal playback rate in frames per second
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Entry count
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Current cursor position (may sit one past either end)
    pub fn cursor(&self) -> isize {
        self.cursor
    }

    /// Parsed entry by index (file order)
    pub fn entry(&self, index: usize) -> Option<SequenceEntry> {
        Some(SequenceEntry {
            source_path: self.files.get(index)?.clone(),
            timestamp: *self.timestamps.get(index)?,
        })
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}
