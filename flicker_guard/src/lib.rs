// THEORY:
// This file is the entry point for the `flicker_guard` library crate. It exposes the
// detection core as a small public API for whatever hosts it (the `flicker_tester`
// harness, or a GUI shell that owns the real alert window).
//
// The high-level surface is `pipeline::MonitorLoop` plus `MonitorConfig`; the building
// blocks it drives (frames, metrics, hysteresis, alert lifecycle, frame sources) live in
// `core_modules` and are public so hosts can plug in their own sources and presenters.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;

pub use config::{CaptureRegion, MonitorConfig, Resolution};
pub use core_modules::alert_controller::{AlertController, AlertEvent, AlertPresenter, AlertState};
pub use core_modules::frame::Frame;
pub use core_modules::frame_source::FrameSource;
pub use pipeline::{MonitorLoop, MonitorSummary};
