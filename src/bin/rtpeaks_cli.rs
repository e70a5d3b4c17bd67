use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rtpeaks::acquisition::{ReplaySampler, Sampler, SyntheticSampler, SyntheticSpec};
use rtpeaks::analysis::{LogTrigger, NoopTrigger, Trigger};
use rtpeaks::calibration::{BaselineCalibrator, CalibrationState};
use rtpeaks::config::PipelineConfig;
use rtpeaks::engine::Engine;
use rtpeaks::telemetry;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::filter::LevelFilter;

#[derive(Parser, Debug)]
#[command(
    name = "rtpeaks_cli",
    about = "Real-time adaptive peak/trough detection over recorded or synthetic signals"
)]
struct Cli {
    /// JSON configuration file (defaults to config/rtpeaks.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Override the detection log path
    #[arg(long, global = true)]
    log: Option<PathBuf>,
    /// Verbose stage logging
    #[arg(long, short, global = true)]
    verbose: bool,
    /// Write every raw frame to this CSV file (a baseline for later sessions)
    #[arg(long, global = true)]
    record: Option<PathBuf>,
    /// Stream telemetry events as JSON lines on stderr
    #[arg(long, global = true)]
    telemetry: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run baseline calibration and print the resulting seed as JSON
    Calibrate {
        #[arg(long)]
        baseline: PathBuf,
        /// Also write the seed to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Run the pipeline over a `timestamp,ch0,...` recording
    Replay {
        #[arg(long)]
        input: PathBuf,
        /// Baseline recording, overriding the configured one
        #[arg(long)]
        baseline: Option<PathBuf>,
        /// Seed from a saved calibration or a previous detection log
        #[arg(long, conflicts_with = "baseline")]
        seed: Option<PathBuf>,
        /// Release samples at their recorded pace
        #[arg(long)]
        realtime: bool,
        /// Log each trigger firing
        #[arg(long)]
        trace_triggers: bool,
    },
    /// Run the pipeline over a synthetic sine
    Simulate {
        #[arg(long, default_value_t = 1.0)]
        frequency_hz: f64,
        #[arg(long, default_value_t = 1.0)]
        amplitude: f64,
        #[arg(long, default_value_t = 0.0)]
        noise: f64,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        #[arg(long, default_value_t = 2_000)]
        samples: usize,
        #[arg(long)]
        trace_triggers: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load_from_file(path),
        None => PipelineConfig::load(),
    };
    if let Some(log) = cli.log {
        config.event_log.path = log;
    }
    if let Some(record) = cli.record {
        config.acquisition.record_path = Some(record);
    }
    config.validate().context("invalid configuration")?;
    if cli.telemetry {
        stream_telemetry();
    }

    match cli.command {
        Commands::Calibrate { baseline, output } => run_calibrate(&config, baseline, output),
        Commands::Replay {
            input,
            baseline,
            seed,
            realtime,
            trace_triggers,
        } => {
            if let Some(path) = baseline {
                config.baseline.enabled = true;
                config.baseline.source_path = Some(path);
            }
            let sampler = ReplaySampler::from_csv_path(&input)
                .with_context(|| format!("loading recording {}", input.display()))?
                .paced(realtime || config.acquisition.realtime_replay);
            let seed = seed.map(|path| load_seed(&config, &path)).transpose()?;
            run_pipeline(config, Box::new(sampler), seed, trace_triggers)
        }
        Commands::Simulate {
            frequency_hz,
            amplitude,
            noise,
            seed,
            samples,
            trace_triggers,
        } => {
            let spec = SyntheticSpec {
                frequency_hz,
                amplitude,
                noise,
                seed,
                samples,
                samplerate: config.acquisition.samplerate,
            };
            // Synthetic signals have a single channel
            config.acquisition.channel_index = 0;
            run_pipeline(
                config,
                Box::new(SyntheticSampler::new(spec)),
                None,
                trace_triggers,
            )
        }
    }
}

fn run_calibrate(
    config: &PipelineConfig,
    baseline: PathBuf,
    output: Option<PathBuf>,
) -> Result<ExitCode> {
    let state = BaselineCalibrator::new(&config.detection)
        .with_channel(config.acquisition.channel_index)
        .calibrate_file(&baseline)
        .with_context(|| format!("calibrating from {}", baseline.display()))?
        .aligned_to_session_start(config.acquisition.sample_period_ms());

    println!("{}", serde_json::to_string_pretty(&state)?);
    if let Some(path) = output {
        state
            .save_json(&path)
            .with_context(|| format!("writing seed to {}", path.display()))?;
    }
    Ok(ExitCode::from(0))
}

/// Seed from a saved calibration (`.json`) or a detection log (anything else)
fn load_seed(config: &PipelineConfig, path: &Path) -> Result<CalibrationState> {
    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let state = if is_json {
        CalibrationState::load_json(path)
    } else {
        CalibrationState::from_event_log(path, &config.detection)
            .map(|state| state.aligned_to_session_start(config.acquisition.sample_period_ms()))
    };
    state.with_context(|| format!("loading seed from {}", path.display()))
}

/// Print every telemetry event from a background thread
fn stream_telemetry() {
    let mut rx = telemetry::hub().subscribe();
    thread::spawn(move || loop {
        match rx.blocking_recv() {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => eprintln!("{line}"),
                Err(err) => tracing::warn!("[Telemetry] Unserializable event: {}", err),
            },
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("[Telemetry] Skipped {} events", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    });
}

fn run_pipeline(
    config: PipelineConfig,
    sampler: Box<dyn Sampler>,
    seed: Option<CalibrationState>,
    trace_triggers: bool,
) -> Result<ExitCode> {
    let trigger: Box<dyn Trigger> = if trace_triggers {
        Box::new(LogTrigger::new())
    } else {
        Box::new(NoopTrigger)
    };

    let mut engine = Engine::new(config);
    if let Some(seed) = seed {
        engine = engine.with_seed(seed);
    }
    let report = engine
        .launch(sampler, trigger)
        .context("launching pipeline")?
        .join()
        .context("waiting for pipeline")?;

    println!("{}", serde_json::to_string_pretty(&report.summary())?);
    if report.faulted() {
        Ok(ExitCode::from(2))
    } else {
        Ok(ExitCode::from(0))
    }
}
