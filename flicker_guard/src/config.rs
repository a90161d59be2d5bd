// THEORY:
// `MonitorConfig` is the single, immutable bundle of tunables for the detector. It is
// built once at startup (from defaults, a TOML file, or command-line overrides in the
// harness) and then handed by value to the monitor loop, which passes the relevant
// pieces down to the tracker. Nothing mutates it afterwards.
//
// Durations are stored as whole milliseconds so a config file stays plain numbers;
// accessors convert them into `Duration`.
//
// The color threshold and the color score scale are policy constants tuned by hand.
// They are not derived from any broadcast flash standard.

use crate::error::ConfigError;
use serde::Deserialize;
use std::time::Duration;

/// Width and height that every captured frame is resized to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 200,
            height: 100,
        }
    }
}

impl Resolution {
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// The screen rectangle sampled by capture backends, in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CaptureRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for CaptureRegion {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            width: 1920,
            height: 1080,
        }
    }
}

/// Configuration for the flash detector.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Screen area handed to the capture backend.
    pub capture_region: CaptureRegion,
    /// Size each frame is downsampled to before any metric is computed.
    pub resolution: Resolution,
    /// Time between the start of two consecutive sampling cycles.
    pub sampling_interval_ms: u64,
    /// Minimum percentage change of mean luminance that counts as a qualifying frame.
    pub luminance_threshold: f64,
    /// Minimum scaled a*/b* difference score that counts as a qualifying frame.
    pub color_threshold: f64,
    /// Qualifying luminance frames needed before a luminance trigger fires.
    pub luminance_consecutive_frames: u32,
    /// Qualifying color frames needed before a color trigger fires.
    pub color_consecutive_frames: u32,
    /// A streak with no qualifying frame for this long is discarded.
    pub timeout_ms: u64,
    /// The alert stays up at least this long, even if acknowledged sooner.
    pub min_alert_display_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            capture_region: CaptureRegion::default(),
            resolution: Resolution::default(),
            sampling_interval_ms: 1,
            luminance_threshold: 70.0,
            color_threshold: 1000.0,
            luminance_consecutive_frames: 3,
            color_consecutive_frames: 3,
            timeout_ms: 250,
            min_alert_display_ms: 0,
        }
    }
}

impl MonitorConfig {
    pub fn sampling_interval(&self) -> Duration {
        Duration::from_millis(self.sampling_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn min_alert_display(&self) -> Duration {
        Duration::from_millis(self.min_alert_display_ms)
    }

    /// Rejects settings under which the detector could never behave sensibly.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let Resolution { width, height } = self.resolution;
        if width == 0 || height == 0 {
            return Err(ConfigError::ZeroResolution { width, height });
        }
        if self.capture_region.width == 0 || self.capture_region.height == 0 {
            return Err(ConfigError::EmptyCaptureRegion);
        }
        if self.sampling_interval_ms == 0 {
            return Err(ConfigError::ZeroSamplingInterval);
        }
        for (metric, value) in [
            ("luminance", self.luminance_threshold),
            ("color", self.color_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidThreshold { metric, value });
            }
        }
        if self.luminance_consecutive_frames == 0 {
            return Err(ConfigError::ZeroConsecutiveFrames { metric: "luminance" });
        }
        if self.color_consecutive_frames == 0 {
            return Err(ConfigError::ZeroConsecutiveFrames { metric: "color" });
        }
        Ok(())
    }
}
