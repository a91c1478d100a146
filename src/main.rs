//! CLI replay harness: drives `SensorFusionEngine` from a recorded trace of
//! interleaved accelerometer/GPS readings, mirroring the teacher's
//! `bin/replay.rs` shape (clap args, gzip-or-plain JSON trace, one line of
//! output per tick) but over the fused engine instead of a raw EKF.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use flate2::read::GzDecoder;
use log::{error, info};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use sensor_fusion_engine::{EngineSnapshot, Event, SensorFusionEngine, SfeConfig, SfeError};

#[derive(Parser, Debug)]
#[command(name = "sfe_replay")]
struct Args {
    /// Path to a recorded trace (.json or .json.gz).
    #[arg(long)]
    trace: PathBuf,

    /// Optional JSON file of `SfeConfig` overrides; falls back to defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print one EngineSnapshot JSON line per accelerometer tick to stdout.
    #[arg(long, default_value_t = false)]
    verbose_ticks: bool,
}

#[derive(Deserialize)]
struct TraceAccel {
    ax: f64,
    ay: f64,
    az: f64,
    t_ms: f64,
    linear: bool,
}

#[derive(Deserialize)]
struct TraceGps {
    lat: f64,
    lon: f64,
    speed_m_s: Option<f64>,
    accuracy_m: Option<f64>,
    t_ms: f64,
}

#[derive(Deserialize)]
struct TraceReading {
    accel: Option<TraceAccel>,
    gps: Option<TraceGps>,
}

#[derive(Deserialize)]
struct Trace {
    readings: Vec<TraceReading>,
}

enum SensorInput {
    Accel(TraceAccel),
    Gps(TraceGps),
}

/// Printed once at end-of-run. Grounded in the teacher's `SessionMetadata`
/// (`xhlsa-gojo` Android crate's `session.rs`), generalized from a
/// recording-session summary to a single fusion run's summary.
#[derive(Debug, Serialize)]
struct SessionSummary {
    generated_at: String,
    ticks: u64,
    fixes: u64,
    distance_m: f64,
    peak_speed_m_s: f64,
    final_snapshot: EngineSnapshot,
    events: Vec<Event>,
}

fn load_trace(path: &PathBuf) -> Result<Trace> {
    let file = File::open(path).with_context(|| format!("opening trace file {}", path.display()))?;
    let trace = if path.extension().map(|e| e == "gz").unwrap_or(false) {
        let reader = BufReader::new(GzDecoder::new(file));
        serde_json::from_reader(reader)
    } else {
        let reader = BufReader::new(file);
        serde_json::from_reader(reader)
    };
    trace.map_err(|e| SfeError::TraceParse(e.to_string())).context("parsing trace file")
}

fn load_config(path: Option<&PathBuf>) -> Result<SfeConfig> {
    let config = match path {
        Some(p) => {
            let text = std::fs::read_to_string(p).with_context(|| format!("reading config file {}", p.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing config file {}", p.display()))?
        }
        None => SfeConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

/// Single-consumer event loop, matching the teacher's `main.rs` pattern of
/// multiplexing several async producers onto one task that owns the
/// estimator state (spec §5 "single event loop... holds no locks"). The
/// trace is static, so the two producer tasks just forward readings in
/// timestamp order rather than pacing them against a wall clock.
async fn run(trace: Trace, config: SfeConfig, verbose_ticks: bool) -> Result<SessionSummary> {
    let (tx, mut rx) = mpsc::unbounded_channel::<SensorInput>();

    let readings = trace.readings;
    tokio::spawn(async move {
        for reading in readings {
            if let Some(accel) = reading.accel {
                let _ = tx.send(SensorInput::Accel(accel));
            }
            if let Some(gps) = reading.gps {
                let _ = tx.send(SensorInput::Gps(gps));
            }
        }
    });

    let mut engine = SensorFusionEngine::new(config);
    engine.start_run(0.0);

    let mut ticks = 0u64;
    let mut fixes = 0u64;
    let mut peak_speed = 0.0f64;
    let mut events = Vec::new();
    let mut last_t_ms = 0.0;

    while let Some(input) = rx.recv().await {
        let new_events = match input {
            SensorInput::Accel(a) => {
                ticks += 1;
                last_t_ms = a.t_ms;
                let evts = engine.push_accel(a.ax, a.ay, a.az, a.t_ms, a.linear);
                if verbose_ticks {
                    println!("{}", serde_json::to_string(&engine.snapshot())?);
                }
                evts
            }
            SensorInput::Gps(g) => {
                fixes += 1;
                last_t_ms = g.t_ms;
                engine.push_gps(g.lat, g.lon, g.speed_m_s, g.accuracy_m.unwrap_or(20.0), g.t_ms)
            }
        };
        for event in &new_events {
            info!("event: {event:?}");
        }
        events.extend(new_events);
        peak_speed = peak_speed.max(engine.snapshot().speed_m_s);
    }

    engine.stop_run(last_t_ms);
    let final_snapshot = engine.snapshot();
    Ok(SessionSummary {
        generated_at: Utc::now().to_rfc3339(),
        ticks,
        fixes,
        distance_m: final_snapshot.distance_m,
        peak_speed_m_s: peak_speed,
        final_snapshot,
        events,
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let trace = load_trace(&args.trace)?;
    let config = load_config(args.config.as_ref())?;

    match run(trace, config, args.verbose_ticks).await {
        Ok(summary) => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Err(e) => {
            error!("replay failed: {e:#}");
            Err(e)
        }
    }
}
