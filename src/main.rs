use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, Duration};

use daq_trace::config::TraceConfig;
use daq_trace::live::{LiveSession, SimulatedTransport};
use daq_trace::playback::{run_playback, PlaybackCommand};
use daq_trace::session::{SessionEvent, TraceSession};
use daq_trace::stats::RunStats;
use daq_trace::status::StatusWriter;
use daq_trace::types::GeoPoint;

#[derive(Parser, Debug)]
#[command(name = "daq_trace")]
#[command(about = "Vehicle telemetry tracer - live sensor link and CSV log replay", long_about = None)]
struct Args {
    /// JSON config file (defaults apply to missing keys)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output directory for status and trace snapshots
    #[arg(long, global = true, default_value = "daq_trace_sessions")]
    output_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll the sensor board (simulated) and trace the drive as it happens
    Live {
        /// Duration in seconds (0 = until Ctrl-C)
        #[arg(value_name = "SECONDS", default_value = "0")]
        duration: u64,

        /// Substring of the advertised device name
        #[arg(long)]
        device: Option<String>,

        /// Reference latitude for the sensor's fused position
        #[arg(long, requires = "ref_lon", allow_hyphen_values = true)]
        ref_lat: Option<f64>,

        /// Reference longitude for the sensor's fused position
        #[arg(long, requires = "ref_lat", allow_hyphen_values = true)]
        ref_lon: Option<f64>,

        /// Polls before the simulated board reports a GPS fix
        #[arg(long, default_value = "0")]
        fix_after: u64,
    },
    /// Replay a CSV log (.csv or .csv.gz) through the playback clock
    Replay {
        log: PathBuf,

        /// Samples advanced per tick
        #[arg(long)]
        step: Option<usize>,

        /// Milliseconds between ticks
        #[arg(long)]
        tick_ms: Option<u64>,
    },
    /// Print run statistics for a CSV log
    Stats {
        log: PathBuf,

        /// Braking / acceleration threshold in m/s²
        #[arg(long)]
        threshold: Option<f64>,

        /// Emit JSON instead of a text summary
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => TraceConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => TraceConfig::default(),
    };

    match args.command {
        Command::Live {
            duration,
            device,
            ref_lat,
            ref_lon,
            fix_after,
        } => {
            if let Some(device) = device {
                config.live.device_name = device;
            }
            if let (Some(lat), Some(lon)) = (ref_lat, ref_lon) {
                config.live.reference = Some(GeoPoint::new(lat, lon));
            }
            config.validate()?;
            run_live(config, duration, fix_after, &args.output_dir).await
        }
        Command::Replay { log, step, tick_ms } => {
            if let Some(step) = step {
                config.playback.step_size = step;
            }
            if let Some(tick_ms) = tick_ms {
                config.playback.tick_interval_ms = tick_ms;
            }
            config.validate()?;
            run_replay(config, &log, &args.output_dir).await
        }
        Command::Stats {
            log,
            threshold,
            json,
        } => {
            if let Some(threshold) = threshold {
                config.stats.event_threshold = threshold;
            }
            print_stats(&config, &log, json)
        }
    }
}

async fn run_live(config: TraceConfig, duration: u64, fix_after: u64, output_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(output_dir)?;
    println!("[{}] Live session starting", ts_now());
    println!("  Device: {}", config.live.device_name);
    println!("  Duration: {} seconds (0=continuous)", duration);
    match config.live.reference {
        Some(reference) => println!(
            "  Reference: {:.6}, {:.6}",
            reference.latitude, reference.longitude
        ),
        None => println!("  Reference: unset (pass --ref-lat/--ref-lon or live.reference)"),
    }

    let mut transport = SimulatedTransport::new(&config.live.device_name);
    transport.fix_after = fix_after;
    transport.poll_dt = config.live.poll_interval().as_secs_f64();

    let mut live = LiveSession::connect(transport, config.live.clone())
        .await
        .context("connecting to sensor board")?;

    let mut session = new_session(config, output_dir);
    let renderer = tokio::spawn(render_events(session.subscribe()));
    let shutdown = shutdown_signal(duration);

    let result = live.run(&mut session, shutdown).await;
    session.unsubscribe();

    let stats = match &result {
        Ok(stats) => *stats,
        Err(_) => live.stats(),
    };
    write_outputs(&mut session, output_dir)?;
    let _ = renderer.await;

    println!("\n=== Live Summary ===");
    println!("Polls: {}", stats.polls);
    println!("Samples: {}", stats.samples);
    println!("Without fix: {}", stats.no_fix);
    println!("Malformed frames: {}", stats.malformed);
    println!("Max speed: {:.2} m/s", session.cache().max_speed());

    result.map(|_| ()).context("live session failed")
}

async fn run_replay(config: TraceConfig, log: &Path, output_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(output_dir)?;

    let mut session = new_session(config, output_dir);
    let renderer = tokio::spawn(render_events(session.subscribe()));

    let summary = session
        .load_file(log)
        .with_context(|| format!("loading {}", log.display()))?;
    println!("[{}] {}: {}", ts_now(), log.display(), summary);

    let (command_tx, command_rx) = mpsc::channel(4);
    command_tx.send(PlaybackCommand::Play).await?;
    // Closing the channel lets the driver stop once playback finishes
    drop(command_tx);

    let rendered = run_playback(&mut session, command_rx, shutdown_signal(0)).await;
    session.unsubscribe();

    write_outputs(&mut session, output_dir)?;
    let _ = renderer.await;

    println!("\n=== Replay Summary ===");
    println!("Rendered samples: {}", rendered);
    println!("Path points: {}", session.cache().total_points());
    println!("Max speed: {:.2} m/s", session.cache().max_speed());
    Ok(())
}

fn print_stats(config: &TraceConfig, log: &Path, json: bool) -> Result<()> {
    let ingested = daq_trace::ingest::ingest_path(log)
        .with_context(|| format!("loading {}", log.display()))?;
    let stats = RunStats::from_trajectory(&ingested.trajectory, &config.stats);

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("=== {} ===", log.display());
    println!("Rows: {}", ingested.summary);
    println!("Duration: {:.1} s", stats.total_time_s);
    println!("Distance: {:.1} m", stats.total_distance_m);
    println!("Max speed: {:.2} m/s (avg {:.2})", stats.max_speed, stats.avg_speed);
    println!("Peak accel: {:.2} m/s² (avg {:.2})", stats.peak_accel, stats.avg_accel);
    println!("Braking events: {}", stats.braking_events);
    println!("Acceleration events: {}", stats.acceleration_events);
    Ok(())
}

/// Stand-in renderer: logs what a map view would draw
async fn render_events(mut events: mpsc::UnboundedReceiver<SessionEvent>) {
    let mut generation = 0;
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::TraceReplaced {
                generation: g,
                mode,
                summary,
            } => {
                generation = g;
                info!("New trace (generation {}, {:?}): {}", g, mode, summary);
            }
            SessionEvent::SampleReady {
                generation: g,
                sample,
                point,
                speed,
            } if g == generation => {
                debug!(
                    "t={} ms ({:.6}, {:.6}) -> ({:.1}, {:.1}) m at {:.2} m/s",
                    sample.timestamp_ms,
                    sample.latitude(),
                    sample.longitude(),
                    point.x,
                    point.y,
                    speed
                );
            }
            SessionEvent::PlaybackChanged { state, .. } => info!("Playback {:?}", state),
            SessionEvent::Status(message) => info!("{}", message),
            _ => {}
        }
    }
}

/// Flips to true on Ctrl-C, or after `duration_secs` when non-zero
fn shutdown_signal(duration_secs: u64) -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if duration_secs > 0 {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => println!("[{}] Interrupted, stopping...", ts_now()),
                _ = sleep(Duration::from_secs(duration_secs)) => {
                    println!("[{}] Duration reached, stopping...", ts_now())
                }
            }
        } else if tokio::signal::ctrl_c().await.is_ok() {
            println!("[{}] Interrupted, stopping...", ts_now());
        } else {
            warn!("Ctrl-C handler unavailable");
            return;
        }
        let _ = tx.send(true);
    });
    rx
}

/// Session that keeps `status.json` in `output_dir` current while it runs
fn new_session(config: TraceConfig, output_dir: &Path) -> TraceSession {
    let interval = config.status.save_interval();
    let mut session = TraceSession::new(config);
    session.set_status_writer(StatusWriter::new(output_dir.join("status.json"), interval));
    session
}

fn write_outputs(session: &mut TraceSession, output_dir: &Path) -> Result<()> {
    if let Some(mut writer) = session.take_status_writer() {
        writer
            .save_now(session)
            .with_context(|| format!("writing {}", writer.path().display()))?;
        debug!("Status written {} times", writer.saves());
    }

    let filename = output_dir.join(format!("trace_{}.json", ts_now_clean()));
    let snapshot = serde_json::to_string_pretty(&session.snapshot())?;
    std::fs::write(&filename, snapshot)?;
    println!(
        "[{}] Saved {} path points to {}",
        ts_now(),
        session.cache().total_points(),
        filename.display()
    );
    Ok(())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

fn ts_now_clean() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}
