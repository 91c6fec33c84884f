mod session;

use anyhow::{Context, Result};
use clap::Parser;
use leaf_config::AppConfig;
use session::Session;
use std::path::PathBuf;
use tracing::{info, warn};

/// Replay a recorded sensor session and export the leaf observations.
#[derive(Debug, Parser)]
#[command(name = "leaf-app", version, about)]
struct Args {
    /// Session script to replay.
    script: PathBuf,

    /// Config file to use instead of the platform default.
    #[arg(long)]
    config: Option<PathBuf>,

    /// CSV output path [default: <export dir>/leaf_angles.csv].
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Also write the recordings as JSON.
    #[arg(long)]
    json: Option<PathBuf>,

    /// Pace the replay by the script timestamps.
    #[arg(long)]
    realtime: bool,

    /// Do not write the latest calibration back to the config.
    #[arg(long)]
    no_save: bool,
}

fn load_config(args: &Args) -> AppConfig {
    let loaded = match &args.config {
        Some(path) => leaf_config::load_config_from(path),
        None => leaf_config::load_config(),
    };
    loaded.unwrap_or_else(|e| {
        warn!(?e, "Failed to load config, using defaults");
        AppConfig::default()
    })
}

fn save_config(args: &Args, config: &AppConfig) -> Result<()> {
    match &args.config {
        Some(path) => leaf_config::save_config_to(config, path),
        None => leaf_config::save_config(config),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "leaf_app=info,leaf_imu=info,leaf_record=info,leaf_config=info".into()
            }),
        )
        .init();

    let args = Args::parse();
    info!(script = ?args.script, "Leaf angle session starting");

    let mut config = load_config(&args);
    info!(
        saved_calibration = config.calibration.is_some(),
        default_tag = %config.export.default_tag,
        "Config loaded"
    );

    let records = session::load_script(&args.script)?;

    let mut session = Session::new(&config, chrono::Local::now().naive_local());
    session.start().context("starting orientation engine")?;

    let applied = session::replay(&mut session, &records, args.realtime).await;
    info!(
        applied,
        total = records.len(),
        recordings = session.log().len(),
        offsets = ?session.engine().offsets(),
        "Replay complete"
    );

    let (log, calibration) = session.finish();

    let csv_path = args
        .csv
        .clone()
        .unwrap_or_else(|| config.export.resolve("leaf_angles.csv"));
    log.save_csv(&csv_path)
        .with_context(|| format!("writing {}", csv_path.display()))?;
    if let Some(json_path) = &args.json {
        log.save_json(json_path)
            .with_context(|| format!("writing {}", json_path.display()))?;
    }

    if let Some(calibration) = calibration {
        if args.no_save {
            info!("Not saving calibration (--no-save)");
        } else {
            config.calibration = Some(calibration);
            save_config(&args, &config)?;
        }
    }

    Ok(())
}
