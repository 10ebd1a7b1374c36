//! motion_trap - webcam motion detection driving a gphoto2 photo camera
//!
//! 1. Loads configuration (defaults, config file, environment, command line)
//! 2. Opens and configures the detection camera (fatal on failure)
//! 3. Samples frames at a fixed interval and scores foreground motion
//! 4. Starts a time-lapse or exposure-bracket sequence when motion is detected
//!
//! Ctrl-C stops sampling and waits for an in-flight capture sequence.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use motion_trap::cli::Args;
use motion_trap::{build_camera, open_source, MotionTrap, SequenceController, TrapConfig};

/// Longest time to wait for a running capture sequence at shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(120);

fn main() -> Result<()> {
    let args = Args::parse();
    let default_filter = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let config = TrapConfig::load(args.config.as_deref(), args.overrides())?;
    log::debug!("configuration: {:?}", config);

    let mut source = open_source(&config.device)?;
    source
        .configure(config.width, config.height)
        .with_context(|| format!("configure detection camera {}", config.device))?;

    let estimator = config.estimator.build();
    let camera = build_camera(&config);
    log::info!(
        "photo camera backend: {}, capture mode: {:?} x{}",
        camera.name(),
        config.capture_mode(),
        config.photo_count
    );
    let controller = SequenceController::new(camera);

    let stop = Arc::new(AtomicBool::new(false));
    let stop_handler = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        if stop_handler.swap(true, Ordering::SeqCst) {
            // Second signal: give up on the in-flight sequence.
            std::process::exit(130);
        }
    })
    .context("install Ctrl-C handler")?;

    let mut trap = MotionTrap::new(&config, source, estimator, controller);
    log::info!(
        "motion_trap watching {} ({}x{} requested), sampling every {:.3}s, threshold {:.3}",
        config.device,
        config.width,
        config.height,
        config.detection_interval.as_secs_f64(),
        config.min_motion
    );
    trap.run_until(&stop);

    if !trap.controller().wait_idle(SHUTDOWN_GRACE) {
        log::warn!("capture sequence still running after {:?}; exiting", SHUTDOWN_GRACE);
    }
    Ok(())
}
