// THEORY:
// The `HysteresisTracker` decides when a run of measurements is a real flashing episode
// rather than a single-frame artifact (a compression glitch, a cursor blink, a window
// opening). It is the false-positive filter of the detector.
//
// Key rules:
// 1.  **Consecutive counting**: each metric has its own counter, incremented on every
//     frame that meets that metric's threshold. A non-qualifying frame does not decrement
//     it; streaks only end by a trigger or by timeout.
// 2.  **Shared watchdog**: a single `last_qualifying_change_at` is refreshed whenever
//     either metric qualifies. If nothing qualifies for `timeout`, both counters are
//     cleared, so an old, never-completed streak cannot later combine with unrelated
//     frames into a false trigger.
// 3.  **Atomic reset**: counters are always cleared together, on trigger, timeout or an
//     external reset.
// 4.  **Tie-break**: when both counters reach their threshold in the same cycle, the
//     color trigger is reported. The order is fixed for reproducibility.

use crate::config::MonitorConfig;
use crate::core_modules::metric_engine::ChangeMetrics;
use std::fmt;
use std::time::{Duration, Instant};

/// Which metric completed its streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerReason {
    Luminance,
    Color,
}

impl TriggerReason {
    /// Short tag shown to the user next to the alert message.
    pub fn tag(&self) -> &'static str {
        match self {
            TriggerReason::Luminance => "LUM",
            TriggerReason::Color => "RGB",
        }
    }
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerReason::Luminance => write!(f, "luminance"),
            TriggerReason::Color => write!(f, "color"),
        }
    }
}

/// Outcome of feeding one cycle's metrics to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerDecision {
    None,
    LuminanceTrigger,
    ColorTrigger,
}

impl TriggerDecision {
    pub fn reason(&self) -> Option<TriggerReason> {
        match self {
            TriggerDecision::None => None,
            TriggerDecision::LuminanceTrigger => Some(TriggerReason::Luminance),
            TriggerDecision::ColorTrigger => Some(TriggerReason::Color),
        }
    }
}

/// Snapshot of the tracker's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HysteresisCounters {
    pub luminance_count: u32,
    pub color_count: u32,
    pub last_qualifying_change_at: Instant,
}

/// Thresholds and streak lengths, copied out of `MonitorConfig`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HysteresisConfig {
    pub luminance_threshold: f64,
    pub color_threshold: f64,
    pub luminance_consecutive_frames: u32,
    pub color_consecutive_frames: u32,
    pub timeout: Duration,
}

impl From<&MonitorConfig> for HysteresisConfig {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            luminance_threshold: config.luminance_threshold,
            color_threshold: config.color_threshold,
            luminance_consecutive_frames: config.luminance_consecutive_frames,
            color_consecutive_frames: config.color_consecutive_frames,
            timeout: config.timeout(),
        }
    }
}

/// Consecutive-exceedance counters with timeout decay.
#[derive(Debug, Clone)]
pub struct HysteresisTracker {
    config: HysteresisConfig,
    luminance_count: u32,
    color_count: u32,
    last_qualifying_change_at: Instant,
}

impl HysteresisTracker {
    /// Creates a tracker whose timeout watchdog starts at `now`.
    pub fn new(config: HysteresisConfig, now: Instant) -> Self {
        Self {
            config,
            luminance_count: 0,
            color_count: 0,
            last_qualifying_change_at: now,
        }
    }

    pub fn update(&mut self, metrics: &ChangeMetrics, now: Instant) -> TriggerDecision {
        self.expire_if_stale(now);

        let luminance_qualifies = metrics.luminance_pct_change >= self.config.luminance_threshold;
        let color_qualifies = metrics.color_diff_score >= self.config.color_threshold;

        if luminance_qualifies {
            self.luminance_count += 1;
        }
        if color_qualifies {
            self.color_count += 1;
        }
        if luminance_qualifies || color_qualifies {
            self.last_qualifying_change_at = now;
        }

        if self.color_count >= self.config.color_consecutive_frames {
            self.clear_counts();
            TriggerDecision::ColorTrigger
        } else if self.luminance_count >= self.config.luminance_consecutive_frames {
            self.clear_counts();
            TriggerDecision::LuminanceTrigger
        } else {
            TriggerDecision::None
        }
    }

    /// Clears both counters and restarts the timeout watchdog at `now`.
    pub fn reset(&mut self, now: Instant) {
        self.clear_counts();
        self.last_qualifying_change_at = now;
    }

    pub fn counters(&self) -> HysteresisCounters {
        HysteresisCounters {
            luminance_count: self.luminance_count,
            color_count: self.color_count,
            last_qualifying_change_at: self.last_qualifying_change_at,
        }
    }

    /// Clears both counters if no qualifying frame was seen within the timeout before
    /// `now`. Returns whether a non-empty streak was discarded.
    ///
    /// `update` runs this before counting its frame, so a streak that went quiet for
    /// longer than the timeout never combines with the frame that ends the silence.
    pub fn expire_if_stale(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_qualifying_change_at) < self.config.timeout {
            return false;
        }
        let had_streak = self.luminance_count > 0 || self.color_count > 0;
        if had_streak {
            log::debug!(
                "streak timed out (luminance {}, color {}), counters reset",
                self.luminance_count,
                self.color_count
            );
        }
        self.clear_counts();
        had_streak
    }

    fn clear_counts(&mut self) {
        self.luminance_count = 0;
        self.color_count = 0;
    }
}
