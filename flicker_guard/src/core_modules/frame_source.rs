// THEORY:
// A `FrameSource` is anything that can hand the monitor loop a fresh, downsampled
// `Frame` on demand. The core only depends on the trait; concrete backends are thin
// adapters that obtain a raw image somehow and then defer to `Frame::from_capture` for
// cropping and resizing, so every backend produces frames the same way.
//
// Two backends ship with the crate:
// - `ImageSequenceSource` replays image files from a directory in file-name order. It
//   stands in for the screen when reproducing a recorded flashing sequence.
// - `CommandCaptureSource` runs an external screenshot tool that writes an encoded image
//   to stdout (`grim -`, `screencapture -x -t png /dev/stdout`, `import -window root png:-`)
//   and decodes the result.

use crate::config::{CaptureRegion, Resolution};
use crate::core_modules::frame::Frame;
use crate::error::CaptureError;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "gif", "webp"];

/// Produces one frame per call, already scaled to the configured resolution.
pub trait FrameSource {
    fn capture(&mut self) -> Result<Frame, CaptureError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn capture(&mut self) -> Result<Frame, CaptureError> {
        (**self).capture()
    }
}

/// Replays a directory of still images as if they were consecutive screen captures.
#[derive(Debug)]
pub struct ImageSequenceSource {
    pending: VecDeque<PathBuf>,
    region: CaptureRegion,
    resolution: Resolution,
}

impl ImageSequenceSource {
    pub fn new(paths: Vec<PathBuf>, region: CaptureRegion, resolution: Resolution) -> Self {
        Self {
            pending: paths.into(),
            region,
            resolution,
        }
    }

    /// Collects every image file in `dir`, sorted by file name.
    pub fn from_dir(
        dir: &Path,
        region: CaptureRegion,
        resolution: Resolution,
    ) -> Result<Self, CaptureError> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if path.is_file() && is_image {
                paths.push(path);
            }
        }
        paths.sort();
        log::debug!("replaying {} frames from {}", paths.len(), dir.display());
        Ok(Self::new(paths, region, resolution))
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl FrameSource for ImageSequenceSource {
    fn capture(&mut self) -> Result<Frame, CaptureError> {
        let path = self.pending.pop_front().ok_or(CaptureError::Exhausted)?;
        let image = image::open(&path)?;
        Frame::from_capture(&image, &self.region, self.resolution, Instant::now())
    }
}

/// Captures the screen by running an external command that prints an image to stdout.
#[derive(Debug, Clone)]
pub struct CommandCaptureSource {
    program: String,
    args: Vec<String>,
    region: CaptureRegion,
    resolution: Resolution,
}

impl CommandCaptureSource {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        region: CaptureRegion,
        resolution: Resolution,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            region,
            resolution,
        }
    }

    /// Splits a whitespace-separated command line into program and arguments.
    pub fn from_command_line(
        command_line: &str,
        region: CaptureRegion,
        resolution: Resolution,
    ) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect(), region, resolution))
    }
}

impl FrameSource for CommandCaptureSource {
    fn capture(&mut self) -> Result<Frame, CaptureError> {
        let output = Command::new(&self.program).args(&self.args).output()?;
        let captured_at = Instant::now();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.to_ascii_lowercase().contains("permission denied") {
                return Err(CaptureError::PermissionDenied);
            }
            return Err(CaptureError::Unavailable(format!(
                "{} exited with {}: {}",
                self.program, output.status, stderr
            )));
        }
        if output.stdout.is_empty() {
            return Err(CaptureError::EmptyFrame);
        }

        let image = image::load_from_memory(&output.stdout)?;
        Frame::from_capture(&image, &self.region, self.resolution, captured_at)
    }
}
