// A terminal stand-in for the alert window: prints a banner when an alert is raised and
// treats every line on stdin as the "disregard" button.

use chrono::Local;
use flicker_guard::error::PresentError;
use flicker_guard::{AlertController, AlertEvent, AlertPresenter};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;

pub struct ConsolePresenter;

impl AlertPresenter for ConsolePresenter {
    fn present(&self, event: &AlertEvent) -> Result<(), PresentError> {
        let mut out = io::stdout().lock();
        writeln!(out)?;
        writeln!(out, "================================================================")?;
        writeln!(out, "[{}] {}", Local::now().format("%H:%M:%S"), event.message)?;
        writeln!(out, "Press Enter to disregard.")?;
        writeln!(out, "================================================================")?;
        out.flush()?;
        Ok(())
    }

    fn dismiss(&self) {
        println!("[{}] alert disregarded, monitoring resumed", Local::now().format("%H:%M:%S"));
    }
}

/// Reads stdin on a dedicated thread and acknowledges on every line.
pub fn spawn_acknowledger(controller: Arc<AlertController>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            if line.is_err() {
                break;
            }
            if !controller.acknowledge() {
                log::debug!("nothing to acknowledge");
            }
        }
        log::warn!("stdin closed; alerts can no longer be acknowledged from the console");
    })
}
