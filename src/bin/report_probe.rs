//! report_probe - check connectivity to the tracking service
//!
//! By default sends a single lot-level test report (camera id suffixed `_test`).
//! With `--vehicle-count` and `--capacity` it sends one real lot-level report decided by
//! the occupancy engine instead. `--dry-run` prints the request body without sending.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::time::{Duration, SystemTime};

use parkwatch::config::{DEFAULT_ENDPOINT, DEFAULT_TIMEOUT_SECS};
use parkwatch::detect::VehicleFilter;
use parkwatch::transport::encode_batch;
use parkwatch::{
    epoch_seconds, validate_identifier, CycleSummary, DecisionMode, DetectionEvidence,
    HttpReportClient, OccupancyEngine, OccupancyRecord, ReportBatch, ReportClient, RetryPolicy,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Send a test report to the parking tracking service")]
struct Args {
    /// Camera report endpoint.
    #[arg(long, env = "PARKWATCH_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Lot the report is for.
    #[arg(long, env = "PARKWATCH_LOT_ID", default_value = "1")]
    lot_id: String,

    /// Camera identifier. Test reports append `_test`.
    #[arg(long, env = "PARKWATCH_CAMERA_ID", default_value = "camera_001")]
    camera_id: String,

    /// Request timeout in seconds.
    #[arg(long, env = "PARKWATCH_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// Send a lot-level report for this many vehicles instead of a test report.
    #[arg(long, requires = "capacity")]
    vehicle_count: Option<u32>,

    /// Lot capacity used with --vehicle-count.
    #[arg(long, requires = "vehicle_count")]
    capacity: Option<u32>,

    /// Fraction of capacity at which the lot counts as occupied.
    #[arg(long, default_value_t = 0.5)]
    occupancy_fraction: f64,

    /// Print the request body and exit without sending.
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    validate_identifier("lot_id", &args.lot_id)?;
    validate_identifier("camera_id", &args.camera_id)?;
    let captured_at = epoch_seconds(SystemTime::now())?;

    let batch = match (args.vehicle_count, args.capacity) {
        (Some(count), Some(capacity)) => {
            let engine = OccupancyEngine::new(
                &args.lot_id,
                &args.camera_id,
                DecisionMode::Lot {
                    capacity,
                    fraction: args.occupancy_fraction,
                },
                VehicleFilter::default(),
            )?;
            let records = engine.decide(&DetectionEvidence::VehicleCount(count), captured_at)?;
            ReportBatch::assemble(1, records)?
        }
        _ => test_batch(&args, captured_at)?,
    };

    if args.dry_run {
        let body = encode_batch(&batch)?;
        println!("POST {}", args.endpoint);
        println!("{}", String::from_utf8_lossy(&body));
        return Ok(());
    }

    let mut client = HttpReportClient::new(&args.endpoint, Duration::from_secs(args.timeout_secs))
        .context("invalid endpoint")?;
    log::info!(
        "sending {} report(s) for lot {} to {}",
        batch.len(),
        batch.lot_id(),
        client.endpoint()
    );
    let outcome = client.deliver(&batch);
    let summary = RetryPolicy::new().conclude(&batch, outcome);
    summary.log();

    if let Err(err) = accepted(&summary, &args.endpoint) {
        if summary.failure.is_some() {
            print_hints(&args.endpoint);
        } else {
            eprintln!("the service rejected the report; check that lot {} exists", args.lot_id);
        }
        return Err(err);
    }
    if !summary.errors.is_empty() {
        eprintln!("the service rejected some records; check that lot {} exists", args.lot_id);
    }
    println!(
        "ok: {} record(s) sent, {} updated",
        summary.records_sent, summary.records_updated
    );
    Ok(())
}

/// A report counts as accepted only if the retry policy marked it delivered.
fn accepted(summary: &CycleSummary, endpoint: &str) -> Result<()> {
    if summary.is_delivered() {
        Ok(())
    } else {
        Err(anyhow!(
            "report was not accepted by {} ({} of {} records updated, state={})",
            endpoint,
            summary.records_updated,
            summary.records_sent,
            summary.state
        ))
    }
}

fn test_batch(args: &Args, captured_at: u64) -> Result<ReportBatch> {
    let camera_id = format!("{}_test", args.camera_id);
    validate_identifier("camera_id", &camera_id)?;
    let record = OccupancyRecord {
        lot_id: args.lot_id.clone(),
        spot_id: None,
        occupied: true,
        camera_id,
        captured_at_epoch_s: captured_at,
    };
    Ok(ReportBatch::assemble(1, vec![record])?)
}

fn print_hints(endpoint: &str) {
    eprintln!("troubleshooting:");
    eprintln!("  - is the tracking service running and reachable at {}?", endpoint);
    eprintln!("  - does the endpoint path end in /api/update_camera?");
    eprintln!("  - tunnels (ngrok and similar) change URL on restart; update PARKWATCH_ENDPOINT");
    eprintln!("  - rerun with RUST_LOG=debug for request details");
}
