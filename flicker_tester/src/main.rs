mod console;
mod settings;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use flicker_guard::core_modules::alert_controller::LogPresenter;
use flicker_guard::core_modules::frame_source::{CommandCaptureSource, ImageSequenceSource};
use flicker_guard::{AlertController, AlertPresenter, FrameSource, MonitorConfig, MonitorLoop};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(
    name = "flicker_tester",
    version,
    about = "Run the flicker_guard detector against the live screen or a recorded frame sequence"
)]
struct Cli {
    /// TOML file with detector settings (any subset of fields)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(flatten)]
    overrides: settings::Overrides,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sample the screen through an external screenshot command
    Watch(WatchArgs),
    /// Replay a directory of image files as consecutive frames
    Replay(ReplayArgs),
    /// Print the effective configuration and exit
    PrintConfig,
}

#[derive(Args, Debug)]
struct WatchArgs {
    /// Command that writes one PNG/JPEG screenshot to stdout
    #[arg(long, default_value = "grim -t png -")]
    capture_cmd: String,
}

#[derive(Args, Debug)]
struct ReplayArgs {
    /// Directory of frames, played in file-name order
    frames_dir: PathBuf,
    /// Acknowledge alerts automatically after this many milliseconds
    #[arg(long)]
    auto_ack_ms: Option<u64>,
    /// Report alerts to the log instead of the console banner
    #[arg(long)]
    headless: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = settings::load(cli.config.as_deref(), &cli.overrides)?;

    match cli.command {
        Commands::PrintConfig => {
            println!("{config:#?}");
            Ok(())
        }
        Commands::Watch(args) => watch(config, args).await,
        Commands::Replay(args) => replay(config, args).await,
    }
}

async fn watch(config: MonitorConfig, args: WatchArgs) -> Result<()> {
    let Some(source) = CommandCaptureSource::from_command_line(
        &args.capture_cmd,
        config.capture_region,
        config.resolution,
    ) else {
        bail!("capture command is empty");
    };

    let controller = Arc::new(AlertController::new(Box::new(console::ConsolePresenter)));
    console::spawn_acknowledger(Arc::clone(&controller));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("interrupt received, shutting down");
        }
        let _ = shutdown_tx.send(true);
    });

    monitor(config, Box::new(source), controller, shutdown_rx).await
}

async fn replay(config: MonitorConfig, args: ReplayArgs) -> Result<()> {
    let source =
        ImageSequenceSource::from_dir(&args.frames_dir, config.capture_region, config.resolution)
            .with_context(|| format!("failed to list frames in {}", args.frames_dir.display()))?;
    if source.remaining() == 0 {
        bail!("no image files found in {}", args.frames_dir.display());
    }

    let presenter: Box<dyn AlertPresenter> = if args.headless {
        Box::new(LogPresenter)
    } else {
        Box::new(console::ConsolePresenter)
    };
    let controller = Arc::new(AlertController::new(presenter));

    match args.auto_ack_ms {
        Some(delay_ms) => spawn_auto_acknowledger(Arc::clone(&controller), delay_ms),
        None => {
            console::spawn_acknowledger(Arc::clone(&controller));
        }
    }

    // Replays end on their own; the sender stays alive until then.
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    monitor(config, Box::new(source), controller, shutdown_rx).await
}

async fn monitor(
    config: MonitorConfig,
    source: Box<dyn FrameSource + Send>,
    controller: Arc<AlertController>,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let summary = tokio::spawn(MonitorLoop::new(config, source, controller).run(shutdown))
        .await
        .context("monitor task failed")?;

    println!(
        "cycles: {}, measured: {}, skipped: {}, alerts: {}, deadline misses: {}",
        summary.cycles, summary.measured, summary.skipped, summary.alerts, summary.deadline_misses
    );
    Ok(())
}

fn spawn_auto_acknowledger(controller: Arc<AlertController>, delay_ms: u64) {
    tokio::spawn(async move {
        let mut states = controller.subscribe();
        loop {
            let alerting = states.wait_for(|state| state.is_alerting()).await.is_ok();
            if !alerting {
                break;
            }
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            controller.acknowledge();
        }
    });
}
