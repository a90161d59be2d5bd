// Configuration for the harness: a TOML file with any subset of `MonitorConfig` fields,
// then command-line overrides on top, then validation.

use anyhow::{Context, Result};
use clap::Args;
use flicker_guard::MonitorConfig;
use std::fs;
use std::path::Path;

/// Command-line overrides for individual detector settings.
#[derive(Args, Debug, Default, Clone)]
pub struct Overrides {
    /// Milliseconds between sampling cycles
    #[arg(long)]
    pub interval_ms: Option<u64>,
    /// Milliseconds without a qualifying frame before a streak is discarded
    #[arg(long)]
    pub timeout_ms: Option<u64>,
    /// Minimum luminance change (percent) for a qualifying frame
    #[arg(long)]
    pub luminance_threshold: Option<f64>,
    /// Minimum scaled color score for a qualifying frame
    #[arg(long)]
    pub color_threshold: Option<f64>,
    /// Consecutive luminance frames before an alert
    #[arg(long)]
    pub luminance_frames: Option<u32>,
    /// Consecutive color frames before an alert
    #[arg(long)]
    pub color_frames: Option<u32>,
    /// Downsampled frame width
    #[arg(long)]
    pub width: Option<u32>,
    /// Downsampled frame height
    #[arg(long)]
    pub height: Option<u32>,
    /// Keep the alert up at least this many milliseconds
    #[arg(long)]
    pub min_display_ms: Option<u64>,
}

impl Overrides {
    pub fn apply(&self, config: &mut MonitorConfig) {
        if let Some(value) = self.interval_ms {
            config.sampling_interval_ms = value;
        }
        if let Some(value) = self.timeout_ms {
            config.timeout_ms = value;
        }
        if let Some(value) = self.luminance_threshold {
            config.luminance_threshold = value;
        }
        if let Some(value) = self.color_threshold {
            config.color_threshold = value;
        }
        if let Some(value) = self.luminance_frames {
            config.luminance_consecutive_frames = value;
        }
        if let Some(value) = self.color_frames {
            config.color_consecutive_frames = value;
        }
        if let Some(value) = self.width {
            config.resolution.width = value;
        }
        if let Some(value) = self.height {
            config.resolution.height = value;
        }
        if let Some(value) = self.min_display_ms {
            config.min_alert_display_ms = value;
        }
    }
}

pub fn parse_config(text: &str) -> Result<MonitorConfig> {
    toml::from_str(text).context("invalid detector configuration")
}

/// Defaults, then the optional file, then overrides. The result is validated.
pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<MonitorConfig> {
    let mut config = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            parse_config(&text).with_context(|| format!("in {}", path.display()))?
        }
        None => MonitorConfig::default(),
    };
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}
