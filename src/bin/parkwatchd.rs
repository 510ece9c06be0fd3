//! parkwatchd - parking occupancy reporting daemon
//!
//! This daemon:
//! 1. Loads the pipeline configuration (file + environment)
//! 2. Starts one pipeline thread per configured camera
//! 3. Reports occupancy every cycle until Ctrl-C or source exhaustion
//!
//! A configuration error stops the affected camera's pipeline only.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::thread;

use parkwatch::config::DaemonConfig;
use parkwatch::pipeline::run_configured;
use parkwatch::StopSignal;

#[derive(Parser, Debug)]
#[command(author, version, about = "Report parking occupancy to a tracking service")]
struct Args {
    /// Pipeline configuration file (.toml or JSON).
    /// Without one, a single pipeline is built from PARKWATCH_* variables.
    #[arg(long, env = "PARKWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Load and validate the configuration, then exit.
    #[arg(long)]
    check: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = DaemonConfig::load(args.config.as_deref())?;
    for pipeline in &config.pipelines {
        log::info!(
            "pipeline camera={} lot={} mode={} cadence={} source={} endpoint={} timeout={}s",
            pipeline.camera_id,
            pipeline.lot_id,
            pipeline.mode.as_str(),
            pipeline.gate,
            pipeline.source,
            pipeline.endpoint,
            pipeline.timeout.as_secs()
        );
    }
    if args.check {
        log::info!("configuration ok ({} pipelines)", config.pipelines.len());
        return Ok(());
    }

    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        log::info!("shutdown signal received, finishing in-flight deliveries...");
        handler_stop.trigger();
    })
    .expect("error setting Ctrl-C handler");

    let mut handles = Vec::with_capacity(config.pipelines.len());
    for settings in config.pipelines {
        let stop = stop.clone();
        let name = format!("pipeline-{}", settings.camera_id);
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || {
                let result = run_configured(&settings, &stop);
                if let Err(err) = &result {
                    log::error!("camera {} stopped: {:#}", settings.camera_id, err);
                }
                (settings.camera_id, result)
            })?;
        handles.push(handle);
    }

    let mut failed = Vec::new();
    for handle in handles {
        let (camera_id, result) = handle
            .join()
            .map_err(|_| anyhow!("pipeline thread panicked"))?;
        match result {
            Ok(stats) => log::info!(
                "camera {}: {} cycles, {} delivered, {} deferred",
                camera_id,
                stats.cycles,
                stats.delivered,
                stats.deferred
            ),
            Err(_) => failed.push(camera_id),
        }
    }

    if !failed.is_empty() {
        return Err(anyhow!("pipelines failed: {}", failed.join(", ")));
    }
    Ok(())
}
