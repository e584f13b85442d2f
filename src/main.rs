//! CLI for single-shot and looped DMM7510 resistance measurements.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use log::{error, info};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use dmm_daq::adapters::{registry_for, TransportKind};
use dmm_daq::config::Settings;
use dmm_daq::error::DmmError;
use dmm_daq::measurement::{
    configure_2wire_resistance, conductivity_s_per_m, read_resistance_average, Aggregate,
    Geometry, TriggerMode,
};
use dmm_daq::session::{ConnectionManager, Session};
use dmm_daq::storage::{CsvLogger, ResistanceRecord};

#[derive(Parser)]
#[command(
    name = "dmm_daq",
    about = "Keithley DMM7510 resistance and conductivity measurements over SCPI"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the instrument resource (host:port or VISA resource string)
    #[arg(long, global = true)]
    resource: Option<String>,

    /// Override the configured transport family
    #[arg(long, global = true, value_enum)]
    transport: Option<TransportKind>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct SamplingArgs {
    /// Number of samples to aggregate (default from configuration)
    #[arg(long)]
    count: Option<u32>,

    /// Delay between samples in seconds (default from configuration)
    #[arg(long)]
    delay_s: Option<f64>,

    /// Integration time in power-line cycles (default from configuration)
    #[arg(long)]
    nplc: Option<f64>,

    /// Reduction applied to the samples
    #[arg(long, value_enum, default_value_t = Aggregate::Mean)]
    aggregate: Aggregate,

    /// Trigger style for each sample (default from configuration)
    #[arg(long, value_enum)]
    trigger: Option<TriggerMode>,

    /// Probe spacing / sample length in meters (requires --area-m2)
    #[arg(long)]
    length_m: Option<f64>,

    /// Cross-sectional area in square meters (requires --length-m)
    #[arg(long)]
    area_m2: Option<f64>,

    /// Skip instrument I/O and print the effective settings
    #[arg(long)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Take one aggregated resistance reading and print it
    Measure {
        #[command(flatten)]
        sampling: SamplingArgs,
    },
    /// Measure repeatedly, printing each reading and optionally logging CSV
    Monitor {
        #[command(flatten)]
        sampling: SamplingArgs,

        /// Seconds between displayed readings
        #[arg(long, default_value_t = 1.0)]
        interval_s: f64,

        /// Stop after this many readings (default: run until Ctrl-C)
        #[arg(long)]
        iterations: Option<u64>,

        /// Write readings to this CSV file
        #[arg(long)]
        out_csv: Option<PathBuf>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run(Cli::parse()) {
        error!("{:#}", err);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    if cli.resource.is_some() {
        // CLI override wins over environment and file
        settings.resource = cli.resource.clone();
    }
    if let Some(transport) = cli.transport {
        settings.transport = transport;
    }

    match cli.command {
        Command::Measure { sampling } => measure(&settings, &sampling),
        Command::Monitor {
            sampling,
            interval_s,
            iterations,
            out_csv,
        } => monitor(&settings, &sampling, interval_s, iterations, out_csv),
    }
}

/// Resolve the per-run sampling parameters against configured defaults.
struct SamplingPlan {
    count: u32,
    delay: Duration,
    nplc: f64,
    aggregate: Aggregate,
    trigger: TriggerMode,
    geometry: Option<Geometry>,
}

impl SamplingPlan {
    fn resolve(settings: &Settings, args: &SamplingArgs) -> Result<Self> {
        let delay = match args.delay_s {
            Some(seconds) => {
                if !(seconds >= 0.0) {
                    bail!(DmmError::InvalidParameter(
                        "delay_s cannot be negative".to_string()
                    ));
                }
                Duration::from_secs_f64(seconds)
            }
            None => settings.sample_delay(),
        };

        let geometry = match (args.length_m, args.area_m2) {
            (Some(length_m), Some(area_m2)) => Some(Geometry::new(length_m, area_m2)?),
            (None, None) => None,
            _ => bail!(DmmError::InvalidParameter(
                "both length_m and area_m2 must be provided to compute conductivity".to_string()
            )),
        };

        Ok(Self {
            count: args.count.unwrap_or(settings.sample_count),
            delay,
            nplc: args.nplc.unwrap_or(settings.nplc),
            aggregate: args.aggregate,
            trigger: args.trigger.unwrap_or(settings.trigger),
            geometry,
        })
    }
}

fn open_configured_session(settings: &Settings) -> Result<Session> {
    let manager = ConnectionManager::new(registry_for(settings.transport)?);
    let session = manager.open_session(settings)?;
    Ok(session)
}

fn measure(settings: &Settings, args: &SamplingArgs) -> Result<()> {
    let plan = SamplingPlan::resolve(settings, args)?;

    if args.dry_run {
        println!("Dry run: would perform measurement with current settings.");
        println!("{}", serde_json::to_string_pretty(settings)?);
        return Ok(());
    }

    let mut session = open_configured_session(settings)?;
    println!("Connected to instrument: {}", session.identify()?);

    configure_2wire_resistance(&mut session, plan.nplc)?;
    let resistance_ohm = read_resistance_average(
        &mut session,
        plan.count,
        plan.delay,
        plan.aggregate,
        plan.trigger,
    )?;

    println!("Measured resistance: {:.6} ohm", resistance_ohm);
    if let Some(sigma) = conductivity_s_per_m(resistance_ohm, plan.geometry.as_ref())? {
        println!("Conductivity: {:.6} S/m", sigma);
    }
    Ok(())
}

fn monitor(
    settings: &Settings,
    args: &SamplingArgs,
    interval_s: f64,
    iterations: Option<u64>,
    out_csv: Option<PathBuf>,
) -> Result<()> {
    let plan = SamplingPlan::resolve(settings, args)?;
    if !(interval_s > 0.0) {
        bail!(DmmError::InvalidParameter(
            "interval_s must be > 0".to_string()
        ));
    }
    let interval = Duration::from_secs_f64(interval_s);

    if args.dry_run {
        println!("Dry run: would start measurement loop with current settings.");
        println!("{}", serde_json::to_string_pretty(settings)?);
        return Ok(());
    }

    let mut logger = match &out_csv {
        Some(path) => Some(
            CsvLogger::create(path, plan.geometry.is_some())
                .with_context(|| format!("failed to create CSV log at '{}'", path.display()))?,
        ),
        None => None,
    };

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
            .context("failed to install Ctrl-C handler")?;
    }

    let mut session = open_configured_session(settings)?;
    println!("Connected to instrument: {}", session.identify()?);

    configure_2wire_resistance(&mut session, plan.nplc)?;
    println!("Starting resistance measurements. Press Ctrl+C to stop.\n");

    let mut completed: u64 = 0;
    while !stop.load(Ordering::SeqCst) {
        let resistance_ohm = read_resistance_average(
            &mut session,
            plan.count,
            plan.delay,
            plan.aggregate,
            plan.trigger,
        )?;
        let sigma = conductivity_s_per_m(resistance_ohm, plan.geometry.as_ref())?;
        let timestamp = Utc::now();

        let mut line = format!(
            "{}  R = {:.6} ohm",
            timestamp.format("%Y-%m-%dT%H:%M:%S"),
            resistance_ohm
        );
        if let Some(sigma) = sigma {
            line.push_str(&format!("  sigma = {:.6} S/m", sigma));
        }
        println!("{}", line);

        if let Some(logger) = logger.as_mut() {
            logger.append(&ResistanceRecord {
                timestamp,
                resistance_ohm,
                conductivity_s_per_m: sigma,
            })?;
        }

        completed += 1;
        if let Some(limit) = iterations {
            if completed >= limit {
                break;
            }
        }

        sleep_interruptible(interval, &stop);
    }

    info!("measurement loop stopped after {} readings", completed);
    Ok(())
}

/// Sleep in short slices so a Ctrl-C is honored promptly and the session
/// still goes through its normal scoped release.
fn sleep_interruptible(total: Duration, stop: &AtomicBool) {
    const SLICE: Duration = Duration::from_millis(100);
    let mut remaining = total;
    while !remaining.is_zero() && !stop.load(Ordering::SeqCst) {
        let chunk = remaining.min(SLICE);
        thread::sleep(chunk);
        remaining = remaining.saturating_sub(chunk);
    }
}
