// THEORY:
// Errors in this crate describe faults at the edges of the detection pipeline:
// acquiring a frame, the shape of a frame, the configuration handed in at startup,
// and the presentation layer refusing an alert. None of them are used for ordinary
// control flow. Threshold crossings and timeouts are plain return values.
//
// The monitor loop treats `CaptureError` and `FrameError` as cycle-local: the frame
// is dropped, the reason is logged, and the next cycle proceeds.

use thiserror::Error;

/// A failure to obtain a usable frame from a `FrameSource`.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The capture backend could not be reached or exited unsuccessfully.
    #[error("capture source unavailable: {0}")]
    Unavailable(String),
    /// The platform refused to hand over the screen contents.
    #[error("permission denied while capturing the screen")]
    PermissionDenied,
    /// The backend returned an image with no pixels.
    #[error("capture returned an empty frame")]
    EmptyFrame,
    /// The captured bytes could not be decoded as an image.
    #[error("failed to decode captured image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("capture i/o failed: {0}")]
    Io(#[from] std::io::Error),
    /// A finite source (a replay) has no more frames. Ends the monitor loop.
    #[error("frame source exhausted")]
    Exhausted,
}

impl CaptureError {
    /// Whether the loop should keep running after this error.
    pub fn is_transient(&self) -> bool {
        !matches!(self, CaptureError::Exhausted)
    }
}

/// A frame that cannot be compared with its predecessor.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame geometry mismatch: expected {expected:?}, got {actual:?}")]
    Geometry {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("frame buffer holds {actual} bytes, {expected} expected for its dimensions")]
    BufferLength { expected: usize, actual: usize },
}

/// A configuration value that would make detection meaningless.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("resolution must be non-zero, got {width}x{height}")]
    ZeroResolution { width: u32, height: u32 },
    #[error("sampling interval must be greater than zero")]
    ZeroSamplingInterval,
    #[error("{metric} consecutive frame count must be at least 1")]
    ZeroConsecutiveFrames { metric: &'static str },
    #[error("{metric} threshold must be a finite, non-negative number, got {value}")]
    InvalidThreshold { metric: &'static str, value: f64 },
    #[error("capture region must be non-empty")]
    EmptyCaptureRegion,
}

/// The presentation layer could not show an alert.
#[derive(Debug, Error)]
pub enum PresentError {
    #[error("presentation layer unavailable: {0}")]
    Unavailable(String),
    #[error("presentation i/o failed: {0}")]
    Io(#[from] std::io::Error),
}
