// THEORY:
// The `pipeline` module is the top-level driver of the detector. `MonitorLoop` wires the
// stages together and runs them on a fixed cadence:
//
//   FrameSource -> MetricEngine -> HysteresisTracker -> AlertController
//
// Key architectural principles:
// 1.  **Synchronous cycle body**: `step` performs exactly one cycle given a capture
//     result and a timestamp. It has no timers in it, which keeps the detection logic
//     testable with hand-made frames and instants.
// 2.  **Async cadence**: `run` owns the timing. It ticks a `tokio::time::Interval`,
//     suspends entirely while an alert is showing (no capture, no comparison), and races
//     every wait against the shutdown signal so a stop request is honoured promptly.
//     Captures run on the blocking pool for the same reason.
// 3.  **Faults are cycle-local**: a failed capture or a frame of the wrong size is logged
//     and dropped. It neither advances nor resets a streak.
// 4.  **Clean slate after an alert**: once acknowledged, the previous frame, the
//     luminance baseline and both counters are discarded, so the first frame after the
//     alert is never compared against the last frame before it.

use crate::config::MonitorConfig;
use crate::core_modules::alert_controller::AlertController;
use crate::core_modules::frame::Frame;
use crate::core_modules::frame_source::FrameSource;
use crate::core_modules::hysteresis::{HysteresisCounters, HysteresisTracker, TriggerDecision};
use crate::core_modules::metric_engine::{ChangeMetrics, MetricEngine};
use crate::error::{CaptureError, FrameError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

// Re-export key data structures for the public API.
pub use crate::core_modules::alert_controller::{AlertEvent, AlertPresenter, AlertState};
pub use crate::core_modules::hysteresis::TriggerReason;

/// What happened during one cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Metrics were computed and fed to the tracker.
    Measured {
        metrics: ChangeMetrics,
        decision: TriggerDecision,
    },
    /// An alert is showing; detection did not run.
    Paused,
    /// The capture failed; the cycle was a no-op.
    CaptureFault(CaptureError),
    /// The frame could not be compared; it was discarded.
    MalformedFrame(FrameError),
    /// The source has no more frames.
    Exhausted,
}

/// Counters accumulated over a monitor run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorSummary {
    /// Cycles in which a capture was attempted.
    pub cycles: u64,
    /// Cycles whose frame made it through the metric engine.
    pub measured: u64,
    /// Cycles dropped because of a capture fault or a malformed frame.
    pub skipped: u64,
    /// Alerts raised by this loop.
    pub alerts: u64,
    /// Cycles whose capture and analysis took longer than the sampling interval.
    pub deadline_misses: u64,
}

/// Samples a `FrameSource` on a fixed cadence and drives the alert lifecycle.
pub struct MonitorLoop<S> {
    config: MonitorConfig,
    // Lent to a blocking task while a capture is in flight.
    source: Option<S>,
    engine: MetricEngine,
    tracker: HysteresisTracker,
    controller: Arc<AlertController>,
    alert_raised_at: Option<Instant>,
    summary: MonitorSummary,
}

impl<S: FrameSource> MonitorLoop<S> {
    pub fn new(config: MonitorConfig, source: S, controller: Arc<AlertController>) -> Self {
        let tracker = HysteresisTracker::new((&config).into(), clock_now());
        Self {
            config,
            source: Some(source),
            engine: MetricEngine::new(),
            tracker,
            controller,
            alert_raised_at: None,
            summary: MonitorSummary::default(),
        }
    }

    pub fn controller(&self) -> &Arc<AlertController> {
        &self.controller
    }

    pub fn counters(&self) -> HysteresisCounters {
        self.tracker.counters()
    }

    /// Mean luminance of the last measured frame, if one is retained.
    pub fn luminance_state(&self) -> Option<f64> {
        self.engine.luminance_state()
    }

    pub fn summary(&self) -> MonitorSummary {
        self.summary
    }

    /// Runs one detection cycle on an already captured frame.
    pub fn step(&mut self, capture: Result<Frame, CaptureError>, now: Instant) -> CycleOutcome {
        if self.controller.state().is_alerting() {
            return CycleOutcome::Paused;
        }
        if self.alert_raised_at.is_some() {
            self.resume_after_acknowledgment(now);
        }

        let frame = match capture {
            Ok(frame) => frame,
            Err(err) if !err.is_transient() => return CycleOutcome::Exhausted,
            Err(err) => {
                log::warn!("skipping cycle, capture failed: {err}");
                self.summary.skipped += 1;
                return CycleOutcome::CaptureFault(err);
            }
        };

        let metrics = match frame
            .ensure_resolution(self.config.resolution)
            .and_then(|()| self.engine.observe(&frame))
        {
            Ok(metrics) => metrics,
            Err(err) => {
                log::warn!("skipping cycle, discarded frame: {err}");
                self.summary.skipped += 1;
                return CycleOutcome::MalformedFrame(err);
            }
        };
        self.summary.measured += 1;

        log::debug!(
            "luminance {:.2} ({:+.2}%), color score {:.2}",
            metrics.mean_luminance,
            metrics.luminance_pct_change,
            metrics.color_diff_score
        );

        let decision = self.tracker.update(&metrics, now);
        if let Some(reason) = decision.reason() {
            if self.controller.on_trigger(reason) {
                self.summary.alerts += 1;
                self.alert_raised_at = Some(now);
            }
        }
        CycleOutcome::Measured { metrics, decision }
    }

    /// Discards every trace of the pre-alert streak. `step` calls this on the first cycle
    /// after an acknowledgment.
    pub fn resume_after_acknowledgment(&mut self, now: Instant) {
        self.engine.reset();
        self.tracker.reset(now);
        self.alert_raised_at = None;
    }

}

impl<S: FrameSource + Send + 'static> MonitorLoop<S> {
    /// Drives cycles until `shutdown` becomes `true` (or its sender is dropped) or the
    /// source is exhausted. Captures run on the blocking pool so a slow screenshot
    /// command never holds up the shutdown signal.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> MonitorSummary {
        // `tokio::time::interval` panics on a zero period.
        let sampling_interval = self.config.sampling_interval().max(Duration::from_millis(1));
        let mut interval = tokio::time::interval(sampling_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        log::info!(
            "monitoring at {}x{} every {:?}",
            self.config.resolution.width,
            self.config.resolution.height,
            sampling_interval
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            // The raised timestamp covers an acknowledgment that lands before we get here.
            if self.alert_raised_at.is_some() || self.controller.state().is_alerting() {
                tokio::select! {
                    _ = self.controller.wait_for_acknowledgment() => {}
                    _ = shutdown_requested(&mut shutdown) => break,
                }
                if let Some(raised_at) = self.alert_raised_at {
                    let shown_for = clock_now().saturating_duration_since(raised_at);
                    let remaining = self.config.min_alert_display().saturating_sub(shown_for);
                    if !remaining.is_zero() {
                        tokio::select! {
                            _ = tokio::time::sleep(remaining) => {}
                            _ = shutdown_requested(&mut shutdown) => break,
                        }
                    }
                }
                self.resume_after_acknowledgment(clock_now());
                interval.reset();
                continue;
            }

            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown_requested(&mut shutdown) => break,
            }

            let cycle_start = clock_now();
            let Some(mut source) = self.source.take() else {
                break;
            };
            let pending = tokio::task::spawn_blocking(move || {
                let capture = source.capture();
                (source, capture)
            });
            let capture = tokio::select! {
                joined = pending => match joined {
                    Ok((source, capture)) => {
                        self.source = Some(source);
                        capture
                    }
                    Err(err) => {
                        log::error!("capture task failed: {err}");
                        break;
                    }
                },
                _ = shutdown_requested(&mut shutdown) => break,
            };
            self.summary.cycles += 1;
            if let CycleOutcome::Exhausted = self.step(capture, clock_now()) {
                log::info!("frame source exhausted, stopping");
                break;
            }
            if clock_now().saturating_duration_since(cycle_start) > sampling_interval {
                self.summary.deadline_misses += 1;
            }
        }

        log::info!("monitor stopped: {:?}", self.summary);
        self.summary
    }
}

// Reads the tokio clock so paused-time tests see the same instants as the timers.
fn clock_now() -> Instant {
    tokio::time::Instant::now().into_std()
}

async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender counts as a stop request.
    let _ = shutdown.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Resolution;
    use crate::core_modules::alert_controller::LogPresenter;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DARK: [u8; 3] = [20, 20, 20];
    const BRIGHT: [u8; 3] = [200, 200, 200];

    fn config() -> MonitorConfig {
        MonitorConfig {
            resolution: Resolution { width: 8, height: 4 },
            sampling_interval_ms: 10,
            ..MonitorConfig::default()
        }
    }

    fn frame(rgb: [u8; 3]) -> Frame {
        Frame::filled(8, 4, rgb, Instant::now())
    }

    fn monitor() -> MonitorLoop<ScriptedSource> {
        MonitorLoop::new(
            config(),
            ScriptedSource::repeating(DARK),
            Arc::new(AlertController::new(Box::new(LogPresenter))),
        )
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    /// Plays back a fixed list of frames, then repeats a fallback or reports exhaustion.
    struct ScriptedSource {
        frames: VecDeque<[u8; 3]>,
        fallback: Option<[u8; 3]>,
        captures: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn once(frames: &[[u8; 3]]) -> Self {
            Self {
                frames: frames.iter().copied().collect(),
                fallback: None,
                captures: Arc::default(),
            }
        }

        fn repeating(rgb: [u8; 3]) -> Self {
            Self {
                frames: VecDeque::new(),
                fallback: Some(rgb),
                captures: Arc::default(),
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn capture(&mut self) -> Result<Frame, CaptureError> {
            self.captures.fetch_add(1, Ordering::SeqCst);
            let rgb = self
                .frames
                .pop_front()
                .or(self.fallback)
                .ok_or(CaptureError::Exhausted)?;
            Ok(Frame::filled(8, 4, rgb, clock_now()))
        }
    }

    #[test]
    fn strobing_triggers_a_luminance_alert_on_the_third_change() {
        let mut monitor = monitor();
        let start = Instant::now();

        let mut decisions = Vec::new();
        for (i, rgb) in [DARK, BRIGHT, DARK, BRIGHT].into_iter().enumerate() {
            if let CycleOutcome::Measured { decision, .. } =
                monitor.step(Ok(frame(rgb)), start + ms(10 * i as u64))
            {
                decisions.push(decision);
            }
        }

        assert_eq!(
            decisions,
            vec![
                TriggerDecision::None,
                TriggerDecision::None,
                TriggerDecision::None,
                TriggerDecision::LuminanceTrigger
            ]
        );
        assert_eq!(
            monitor.controller().state(),
            AlertState::Alerting(TriggerReason::Luminance)
        );
        assert_eq!(monitor.summary().alerts, 1);
    }

    #[test]
    fn quiet_gap_decays_the_streak() {
        let mut monitor = monitor();
        let start = Instant::now();

        monitor.step(Ok(frame(DARK)), start);
        monitor.step(Ok(frame(BRIGHT)), start + ms(10));
        monitor.step(Ok(frame(DARK)), start + ms(20));
        assert_eq!(monitor.counters().luminance_count, 2);

        // The screen holds still for 300ms of regular cycles.
        for t in (30..=320).step_by(10) {
            monitor.step(Ok(frame(DARK)), start + ms(t));
        }
        assert_eq!(monitor.counters().luminance_count, 0);

        let outcome = monitor.step(Ok(frame(BRIGHT)), start + ms(330));
        assert!(matches!(
            outcome,
            CycleOutcome::Measured { decision: TriggerDecision::None, .. }
        ));
        assert!(!monitor.controller().state().is_alerting());
    }

    #[test]
    fn detection_pauses_while_alerting() {
        let mut monitor = monitor();
        let start = Instant::now();
        for (i, rgb) in [DARK, BRIGHT, DARK, BRIGHT].into_iter().enumerate() {
            monitor.step(Ok(frame(rgb)), start + ms(10 * i as u64));
        }

        let outcome = monitor.step(Ok(frame(DARK)), start + ms(40));
        assert!(matches!(outcome, CycleOutcome::Paused));
        assert_eq!(monitor.summary().measured, 4);
    }

    #[test]
    fn acknowledgment_starts_from_a_clean_slate() {
        let mut monitor = monitor();
        let start = Instant::now();
        for (i, rgb) in [DARK, BRIGHT, DARK, BRIGHT].into_iter().enumerate() {
            monitor.step(Ok(frame(rgb)), start + ms(10 * i as u64));
        }

        assert!(monitor.controller().acknowledge());

        // The last frame before the alert was BRIGHT; DARK must not be compared with it.
        match monitor.step(Ok(frame(DARK)), start + ms(60)) {
            CycleOutcome::Measured { metrics, decision } => {
                assert_eq!(metrics.luminance_pct_change, 0.0);
                assert_eq!(metrics.color_diff_score, 0.0);
                assert_eq!(decision, TriggerDecision::None);
            }
            other => panic!("expected a measurement, got {other:?}"),
        }
        let counters = monitor.counters();
        assert_eq!(counters.luminance_count, 0);
        assert_eq!(counters.color_count, 0);
        assert!((monitor.luminance_state().unwrap() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn exhausted_source_ends_the_cycle_without_counting_a_skip() {
        let mut monitor = monitor();
        let outcome = monitor.step(Err(CaptureError::Exhausted), Instant::now());
        assert!(matches!(outcome, CycleOutcome::Exhausted));
        assert_eq!(monitor.summary().skipped, 0);
    }

    struct StalledSource;

    impl FrameSource for StalledSource {
        fn capture(&mut self) -> Result<Frame, CaptureError> {
            std::thread::sleep(Duration::from_millis(300));
            Err(CaptureError::EmptyFrame)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_does_not_wait_for_a_stalled_capture() {
        let controller = Arc::new(AlertController::new(Box::new(LogPresenter)));
        let monitor = MonitorLoop::new(config(), StalledSource, controller);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(monitor.run(shutdown_rx));

        tokio::time::sleep(ms(50)).await;
        let asked_at = std::time::Instant::now();
        shutdown_tx.send(true).expect("monitor dropped its receiver");

        let summary = handle.await.expect("monitor task panicked");
        assert!(asked_at.elapsed() < ms(200));
        assert_eq!(summary.cycles, 0);
    }

    #[test]
    fn capture_fault_leaves_the_streak_untouched() {
        let mut monitor = monitor();
        let start = Instant::now();
        monitor.step(Ok(frame(DARK)), start);
        monitor.step(Ok(frame(BRIGHT)), start + ms(10));

        let outcome = monitor.step(Err(CaptureError::PermissionDenied), start + ms(20));
        assert!(matches!(outcome, CycleOutcome::CaptureFault(_)));
        assert_eq!(monitor.counters().luminance_count, 1);
        assert!((monitor.luminance_state().unwrap() - 200.0).abs() < 1e-9);
        assert_eq!(monitor.summary().skipped, 1);
    }

    #[test]
    fn wrong_sized_frame_is_discarded() {
        let mut monitor = monitor();
        let start = Instant::now();
        monitor.step(Ok(frame(DARK)), start);

        let outcome = monitor.step(Ok(Frame::filled(4, 4, BRIGHT, start)), start + ms(10));
        assert!(matches!(
            outcome,
            CycleOutcome::MalformedFrame(FrameError::Geometry { .. })
        ));
        assert!((monitor.luminance_state().unwrap() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn color_flashes_trigger_a_color_alert() {
        let mut monitor = monitor();
        let start = Instant::now();
        let red = [200, 30, 30];
        let blue = [30, 30, 200];

        let mut last = None;
        for (i, rgb) in [red, blue, red, blue].into_iter().enumerate() {
            last = Some(monitor.step(Ok(frame(rgb)), start + ms(10 * i as u64)));
        }
        assert!(matches!(
            last,
            Some(CycleOutcome::Measured { decision: TriggerDecision::ColorTrigger, .. })
        ));
        assert_eq!(
            monitor.controller().state(),
            AlertState::Alerting(TriggerReason::Color)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn run_pauses_for_acknowledgment_then_finishes() {
        let source = ScriptedSource::once(&[DARK, BRIGHT, DARK, BRIGHT, DARK, DARK]);
        let captures = Arc::clone(&source.captures);
        let controller = Arc::new(AlertController::new(Box::new(LogPresenter)));
        let monitor = MonitorLoop::new(config(), source, Arc::clone(&controller));

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(monitor.run(shutdown_rx));

        controller
            .subscribe()
            .wait_for(|state| state.is_alerting())
            .await
            .expect("controller dropped");
        assert_eq!(captures.load(Ordering::SeqCst), 4);

        // No capture happens while the alert is up.
        tokio::time::sleep(ms(500)).await;
        assert_eq!(captures.load(Ordering::SeqCst), 4);

        assert!(controller.acknowledge());
        let summary = handle.await.expect("monitor task panicked");

        assert_eq!(summary.alerts, 1);
        assert_eq!(summary.measured, 6);
        assert_eq!(summary.cycles, 7);
        assert_eq!(controller.state(), AlertState::Monitoring);
    }

    #[tokio::test(start_paused = true)]
    async fn minimum_display_holds_the_pause_after_acknowledgment() {
        let source = ScriptedSource::once(&[DARK, BRIGHT, DARK, BRIGHT, DARK]);
        let captures = Arc::clone(&source.captures);
        let controller = Arc::new(AlertController::new(Box::new(LogPresenter)));
        let config = MonitorConfig {
            min_alert_display_ms: 3_000,
            ..config()
        };
        let monitor = MonitorLoop::new(config, source, Arc::clone(&controller));

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(monitor.run(shutdown_rx));

        controller
            .subscribe()
            .wait_for(|state| state.is_alerting())
            .await
            .expect("controller dropped");
        controller.acknowledge();

        tokio::time::sleep(ms(1_000)).await;
        assert_eq!(captures.load(Ordering::SeqCst), 4);

        let summary = handle.await.expect("monitor task panicked");
        assert_eq!(summary.measured, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_the_loop() {
        let controller = Arc::new(AlertController::new(Box::new(LogPresenter)));
        let monitor = MonitorLoop::new(config(), ScriptedSource::repeating(DARK), controller);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(monitor.run(shutdown_rx));

        tokio::time::sleep(ms(95)).await;
        shutdown_tx.send(true).expect("monitor dropped its receiver");

        let summary = tokio::time::timeout(ms(100), handle)
            .await
            .expect("loop did not stop promptly")
            .expect("monitor task panicked");
        assert!(summary.cycles >= 9);
        assert_eq!(summary.alerts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_a_pending_alert() {
        let controller = Arc::new(AlertController::new(Box::new(LogPresenter)));
        let source = ScriptedSource::once(&[DARK, BRIGHT, DARK, BRIGHT]);
        let monitor = MonitorLoop::new(config(), source, Arc::clone(&controller));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(monitor.run(shutdown_rx));

        controller
            .subscribe()
            .wait_for(|state| state.is_alerting())
            .await
            .expect("controller dropped");
        drop(shutdown_tx);

        let summary = handle.await.expect("monitor task panicked");
        assert_eq!(summary.alerts, 1);
        assert!(controller.state().is_alerting());
    }
}
