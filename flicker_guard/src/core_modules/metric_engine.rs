// THEORY:
// The `metric_engine` turns a pair of frames (current, previous) into two scalar
// measurements of how violently the screen changed between them.
//
// 1.  **Luminance change**: the mean Rec. 601 luma of each frame, compared as a
//     percentage of the previous mean. A small epsilon in the denominator keeps a fully
//     black previous frame from producing an infinite or NaN result.
// 2.  **Chromaticity change**: both frames in CIE L*a*b*, per-pixel |Δa*| + |Δb*|,
//     averaged over 2·N and multiplied by a fixed scale. Lightness is left out on purpose
//     because the luminance metric already covers it; this metric isolates color-only
//     flashes (e.g. saturated red/blue alternation at constant brightness).
//
// Both are pure. The free function `compute` takes two frames directly. `MetricEngine`
// is the stateful form used by the monitor loop: it remembers only the analysis of the
// previous frame (its mean luminance and its a*/b* buffer) so every frame is converted to
// Lab exactly once.

use crate::core_modules::frame::Frame;
use crate::error::FrameError;

/// Guards the percentage change against a previous mean luminance of zero.
pub const LUMINANCE_EPSILON: f64 = 1e-5;
/// Multiplier applied to the averaged chromaticity difference. A readability constant,
/// not a photometric one.
pub const COLOR_DIFF_SCALE: f64 = 100.0;

/// The per-cycle measurement handed to the hysteresis tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChangeMetrics {
    /// Mean luminance of the current frame. Becomes the next cycle's baseline.
    pub mean_luminance: f64,
    /// |L_cur - L_prev| / (L_prev + ε) · 100, or 0 without a previous frame.
    pub luminance_pct_change: f64,
    /// Scaled mean a*/b* difference, or 0 without a previous frame.
    pub color_diff_score: f64,
}

/// Everything about a frame that the next comparison needs.
#[derive(Debug, Clone)]
struct FrameAnalysis {
    dimensions: (u32, u32),
    mean_luminance: f64,
    /// (a*, b*) per pixel, row-major.
    chromaticity: Vec<(f64, f64)>,
}

impl FrameAnalysis {
    fn of(frame: &Frame) -> Self {
        let chromaticity = frame
            .pixels()
            .map(|pixel| {
                let lab = pixel.to_lab();
                (lab.a, lab.b)
            })
            .collect();
        Self {
            dimensions: frame.dimensions(),
            mean_luminance: mean_luminance(frame),
            chromaticity,
        }
    }

    fn compare(&self, previous: Option<&FrameAnalysis>) -> Result<ChangeMetrics, FrameError> {
        let Some(previous) = previous else {
            return Ok(ChangeMetrics {
                mean_luminance: self.mean_luminance,
                luminance_pct_change: 0.0,
                color_diff_score: 0.0,
            });
        };
        if previous.dimensions != self.dimensions {
            return Err(FrameError::Geometry {
                expected: previous.dimensions,
                actual: self.dimensions,
            });
        }
        Ok(ChangeMetrics {
            mean_luminance: self.mean_luminance,
            luminance_pct_change: luminance_pct_change(
                self.mean_luminance,
                Some(previous.mean_luminance),
            ),
            color_diff_score: color_diff_score(&self.chromaticity, &previous.chromaticity),
        })
    }
}

/// Mean Rec. 601 luma of a frame on the 0..255 scale.
pub fn mean_luminance(frame: &Frame) -> f64 {
    let count = frame.pixel_count();
    if count == 0 {
        return 0.0;
    }
    frame.pixels().map(|p| p.luminance()).sum::<f64>() / count as f64
}

/// Percentage change of mean luminance relative to the previous frame.
pub fn luminance_pct_change(current: f64, previous: Option<f64>) -> f64 {
    match previous {
        Some(previous) => (current - previous).abs() / (previous + LUMINANCE_EPSILON) * 100.0,
        None => 0.0,
    }
}

/// Scaled mean chromaticity difference between two equally sized (a*, b*) buffers.
pub fn color_diff_score(current: &[(f64, f64)], previous: &[(f64, f64)]) -> f64 {
    if current.is_empty() {
        return 0.0;
    }
    let total: f64 = current
        .iter()
        .zip(previous)
        .map(|((a1, b1), (a2, b2))| (a1 - a2).abs() + (b1 - b2).abs())
        .sum();
    COLOR_DIFF_SCALE * total / (2.0 * current.len() as f64)
}

/// Computes both change metrics for `current` against an optional predecessor.
pub fn compute(current: &Frame, previous: Option<&Frame>) -> Result<ChangeMetrics, FrameError> {
    let previous = previous.map(FrameAnalysis::of);
    FrameAnalysis::of(current).compare(previous.as_ref())
}

/// Stateful metric computation that retains exactly one previous frame's analysis.
#[derive(Debug, Default)]
pub struct MetricEngine {
    previous: Option<FrameAnalysis>,
}

impl MetricEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Measures `frame` against the last observed frame and makes it the new baseline.
    /// A frame whose dimensions differ from the baseline is rejected and the baseline kept.
    pub fn observe(&mut self, frame: &Frame) -> Result<ChangeMetrics, FrameError> {
        let analysis = FrameAnalysis::of(frame);
        let metrics = analysis.compare(self.previous.as_ref())?;
        self.previous = Some(analysis);
        Ok(metrics)
    }

    /// Forgets the previous frame; the next observation is treated as the first.
    pub fn reset(&mut self) {
        self.previous = None;
    }

    /// Mean luminance of the most recent frame, if any.
    pub fn luminance_state(&self) -> Option<f64> {
        self.previous.as_ref().map(|p| p.mean_luminance)
    }
}
