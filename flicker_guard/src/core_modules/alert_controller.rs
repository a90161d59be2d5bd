// THEORY:
// The `AlertController` owns the alert lifecycle and is the only meeting point between
// the sampling task and the presentation layer.
//
//   Monitoring --on_trigger(reason)--> Alerting(reason) --acknowledge()--> Monitoring
//
// Key architectural principles:
// 1.  **One shared cell**: the state lives in a `tokio::sync::watch` channel. Writers
//     (`on_trigger` from the sampler, `acknowledge` from the UI) do an atomic
//     check-and-set with `send_if_modified` and never wait. The sampler is the single
//     waiter: it parks on the channel until the state returns to Monitoring.
// 2.  **No automatic exit**: once Alerting, only an explicit acknowledgment leaves the
//     state. Further triggers while Alerting are ignored.
// 3.  **Loud failure**: entering Alerting synchronously hands an `AlertEvent` to the
//     presenter. If the presenter cannot show it, the controller still enters Alerting
//     and prints an emergency notice to stderr and the error log. A silent miss is the
//     worst outcome for this system.
// 4.  **Idempotent acknowledgment**: acknowledging while Monitoring changes nothing.

use crate::core_modules::hysteresis::TriggerReason;
use crate::error::PresentError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::watch;

pub const ALERT_MESSAGE: &str = "Strange light activity detected, click to disregard";

/// The lifecycle state shared between the sampler and the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertState {
    Monitoring,
    Alerting(TriggerReason),
}

impl AlertState {
    pub fn is_alerting(&self) -> bool {
        matches!(self, AlertState::Alerting(_))
    }

    pub fn reason(&self) -> Option<TriggerReason> {
        match self {
            AlertState::Monitoring => None,
            AlertState::Alerting(reason) => Some(*reason),
        }
    }
}

/// What the presentation layer is asked to display.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub reason: TriggerReason,
    /// Full text for the user, tagged with the metric that fired.
    pub message: String,
    pub raised_at: Instant,
}

impl AlertEvent {
    pub fn new(reason: TriggerReason, raised_at: Instant) -> Self {
        Self {
            reason,
            message: format!("{ALERT_MESSAGE} - {}", reason.tag()),
            raised_at,
        }
    }
}

/// The external layer that shows alerts and obscures other content.
///
/// `present` runs on the sampling task and must return promptly; acknowledgment comes
/// back later through `AlertController::acknowledge` from the presenter's own thread.
pub trait AlertPresenter: Send + Sync {
    fn present(&self, event: &AlertEvent) -> Result<(), PresentError>;

    /// Called once the alert has been acknowledged.
    fn dismiss(&self) {}
}

/// A presenter with no UI: alerts go to the error log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPresenter;

impl AlertPresenter for LogPresenter {
    fn present(&self, event: &AlertEvent) -> Result<(), PresentError> {
        log::error!("ALERT: {}", event.message);
        Ok(())
    }
}

/// Owns the Monitoring / Alerting state machine.
pub struct AlertController {
    state: watch::Sender<AlertState>,
    presenter: Box<dyn AlertPresenter>,
    alerts_raised: AtomicU64,
}

impl AlertController {
    pub fn new(presenter: Box<dyn AlertPresenter>) -> Self {
        let (state, _) = watch::channel(AlertState::Monitoring);
        Self {
            state,
            presenter,
            alerts_raised: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> AlertState {
        *self.state.borrow()
    }

    /// A receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<AlertState> {
        self.state.subscribe()
    }

    /// Number of times the controller has entered Alerting.
    pub fn alerts_raised(&self) -> u64 {
        self.alerts_raised.load(Ordering::Relaxed)
    }

    /// Enters Alerting and presents the alert. Returns `false` if an alert was
    /// already showing, in which case nothing happens.
    pub fn on_trigger(&self, reason: TriggerReason) -> bool {
        let entered = self.state.send_if_modified(|state| match state {
            AlertState::Monitoring => {
                *state = AlertState::Alerting(reason);
                true
            }
            AlertState::Alerting(_) => false,
        });
        if !entered {
            log::debug!("{reason} trigger ignored, alert already showing");
            return false;
        }

        self.alerts_raised.fetch_add(1, Ordering::Relaxed);
        log::info!("{reason} flashing detected, raising alert");

        let event = AlertEvent::new(reason, Instant::now());
        if let Err(err) = self.presenter.present(&event) {
            emergency_notice(&event, &err);
        }
        true
    }

    /// Returns to Monitoring. Returns `false` (and does nothing) when no alert is showing.
    pub fn acknowledge(&self) -> bool {
        let cleared = self.state.send_if_modified(|state| match state {
            AlertState::Alerting(_) => {
                *state = AlertState::Monitoring;
                true
            }
            AlertState::Monitoring => false,
        });
        if cleared {
            log::info!("alert acknowledged, resuming monitoring");
            self.presenter.dismiss();
        }
        cleared
    }

    /// Resolves once the state is Monitoring. Returns immediately if no alert is showing.
    pub async fn wait_for_acknowledgment(&self) {
        let mut receiver = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = receiver.wait_for(|state| !state.is_alerting()).await;
    }
}

fn emergency_notice(event: &AlertEvent, err: &PresentError) {
    log::error!(
        "could not present alert ({err}); EMERGENCY: {}",
        event.message
    );
    eprintln!();
    eprintln!("!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!");
    eprintln!("!! {}", event.message);
    eprintln!("!! Look away from the screen. The alert window could not be shown.");
    eprintln!("!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!");
    eprintln!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default, Clone)]
    struct RecordingPresenter {
        shown: Arc<Mutex<Vec<AlertEvent>>>,
        dismissed: Arc<Mutex<u32>>,
    }

    impl AlertPresenter for RecordingPresenter {
        fn present(&self, event: &AlertEvent) -> Result<(), PresentError> {
            self.shown.lock().unwrap().push(event.clone());
            Ok(())
        }

        fn dismiss(&self) {
            *self.dismissed.lock().unwrap() += 1;
        }
    }

    struct BrokenPresenter;

    impl AlertPresenter for BrokenPresenter {
        fn present(&self, _event: &AlertEvent) -> Result<(), PresentError> {
            Err(PresentError::Unavailable("no display".into()))
        }
    }

    #[test]
    fn trigger_enters_alerting_and_presents_once() {
        let presenter = RecordingPresenter::default();
        let controller = AlertController::new(Box::new(presenter.clone()));

        assert!(controller.on_trigger(TriggerReason::Luminance));
        assert!(!controller.on_trigger(TriggerReason::Color));

        assert_eq!(controller.state(), AlertState::Alerting(TriggerReason::Luminance));
        assert_eq!(controller.alerts_raised(), 1);
        let shown = presenter.shown.lock().unwrap();
        assert_eq!(shown.len(), 1);
        assert_eq!(
            shown[0].message,
            "Strange light activity detected, click to disregard - LUM"
        );
    }

    #[test]
    fn acknowledge_returns_to_monitoring() {
        let presenter = RecordingPresenter::default();
        let controller = AlertController::new(Box::new(presenter.clone()));

        controller.on_trigger(TriggerReason::Color);
        assert!(controller.acknowledge());
        assert_eq!(controller.state(), AlertState::Monitoring);
        assert_eq!(controller.state().reason(), None);
        assert_eq!(*presenter.dismissed.lock().unwrap(), 1);
    }

    #[test]
    fn acknowledge_while_monitoring_is_a_no_op() {
        let presenter = RecordingPresenter::default();
        let controller = AlertController::new(Box::new(presenter.clone()));

        assert!(!controller.acknowledge());
        assert!(!controller.acknowledge());
        assert_eq!(controller.state(), AlertState::Monitoring);
        assert_eq!(*presenter.dismissed.lock().unwrap(), 0);
    }

    #[test]
    fn presenter_failure_still_enters_alerting() {
        let controller = AlertController::new(Box::new(BrokenPresenter));
        assert!(controller.on_trigger(TriggerReason::Color));
        assert!(controller.state().is_alerting());
    }

    #[test]
    fn acknowledge_from_another_thread() {
        let controller = Arc::new(AlertController::new(Box::new(LogPresenter)));
        controller.on_trigger(TriggerReason::Luminance);

        let remote = Arc::clone(&controller);
        std::thread::spawn(move || remote.acknowledge())
            .join()
            .expect("acknowledging thread panicked");

        assert_eq!(controller.state(), AlertState::Monitoring);
    }

    #[tokio::test]
    async fn waiter_wakes_on_acknowledgment() {
        let controller = Arc::new(AlertController::new(Box::new(LogPresenter)));
        controller.on_trigger(TriggerReason::Color);

        let remote = Arc::clone(&controller);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.acknowledge();
        });

        tokio::time::timeout(Duration::from_secs(5), controller.wait_for_acknowledgment())
            .await
            .expect("acknowledgment should wake the waiter");
        assert_eq!(controller.state(), AlertState::Monitoring);
    }

    #[tokio::test]
    async fn waiting_while_monitoring_returns_immediately() {
        let controller = AlertController::new(Box::new(LogPresenter));
        controller.wait_for_acknowledgment().await;
    }
}
