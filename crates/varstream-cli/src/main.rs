//! `varstream` – demo host for the variable bridge.
//!
//! Runs a simulated processing pipeline with the bridge plugged in:
//!
//! 1. Loads `~/.varstream/config.toml` (or `--config FILE`), applies
//!    `VARSTREAM_*` environment overrides and command-line flags.
//! 2. Publishes the demo variables, prepares the bridge and runs the
//!    processing loop on a dedicated thread at the pipeline's cycle rate.
//! 3. Prints stream announcements and samples as they leave the bridge and,
//!    with `--serve PORT`, forwards them to WebSocket clients.
//! 4. Stops after the configured number of cycles or on **Ctrl-C**.

mod config;
mod demo;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use varstream_outlet::{BusMessage, SampleServer, SampleValues, StreamBus};
use varstream_runtime::{BridgeControl, BridgePlugin, PipelineShape};
use varstream_space::Catalogue;
use varstream_types::BridgeError;

use crate::config::Config;
use crate::demo::DemoPipeline;

#[derive(Parser, Debug)]
#[command(name = "varstream")]
#[command(version, about = "Stream pipeline variables to network clients", long_about = None)]
struct Cli {
    /// Path to configuration file (TOML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write the default configuration file and exit
    #[arg(long)]
    init: bool,

    /// Variables to export, comma separated (default: all)
    #[arg(long, value_delimiter = ',')]
    vars: Option<Vec<String>>,

    /// Cycles to skip after each send
    #[arg(long)]
    skip: Option<u32>,

    /// Cycles to run; 0 runs until Ctrl-C
    #[arg(long)]
    cycles: Option<u64>,

    /// Serve samples over WebSocket on this port
    #[arg(long, value_name = "PORT")]
    serve: Option<u16>,

    /// Do not print individual samples
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = varstream_runtime::init_tracing("varstream");

    print_banner();

    let path = cli.config.clone().unwrap_or_else(config::config_path);
    if cli.init {
        return match config::save_to(&Config::default(), &path) {
            Ok(()) => {
                println!(
                    "  {} Config written to {}",
                    "✓".green().bold(),
                    path.display().to_string().bold()
                );
                ExitCode::SUCCESS
            }
            Err(e) => {
                println!("{}: {}", "Error saving config".red(), e);
                ExitCode::FAILURE
            }
        };
    }

    let mut cfg = match config::load_from(&path) {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", path.display().to_string().bold());
            cfg
        }
        Ok(None) => {
            println!(
                "  No config at {}; using defaults (run with {} to create one).",
                path.display().to_string().dimmed(),
                "--init".bold()
            );
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };
    apply_cli_overrides(&mut cfg, &cli);

    match run(cfg, cli.quiet) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("{} {}", "✗".red().bold(), e.to_string().red());
            if e.is_configuration() {
                println!("  Check the [bridge] section of {}.", path.display());
            }
            ExitCode::FAILURE
        }
    }
}

fn apply_cli_overrides(cfg: &mut Config, cli: &Cli) {
    if let Some(vars) = &cli.vars {
        cfg.bridge.vars = vars
            .iter()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
    }
    if let Some(skip) = cli.skip {
        cfg.bridge.skip = skip;
    }
    if let Some(cycles) = cli.cycles {
        cfg.demo.cycles = cycles;
    }
    if let Some(port) = cli.serve {
        cfg.demo.ws_port = port;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Demo run
// ─────────────────────────────────────────────────────────────────────────────

fn run(cfg: Config, quiet: bool) -> Result<(), BridgeError> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_handler = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping …".yellow().bold());
        shutdown_handler.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| BridgeError::Outlet(format!("failed to start async runtime: {e}")))?;

    let bus = StreamBus::default();
    runtime.spawn(print_bus(bus.subscribe(), quiet));
    if cfg.demo.ws_port != 0 {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], cfg.demo.ws_port));
        let server = SampleServer::new(bus.clone());
        runtime.spawn(async move {
            if let Err(e) = server.run(addr).await {
                error!(error = %e, "sample server stopped");
            }
        });
        println!("  Serving samples on {}", format!("ws://{addr}").bold());
    }

    let pipeline = DemoPipeline::new(cfg.demo.spectrum_bins, cfg.demo.realloc_every);
    let mut plugin = BridgePlugin::new(
        cfg.bridge.clone(),
        Catalogue::new(pipeline.space()),
        Arc::new(bus.clone()),
    );
    let control = plugin.control();
    let shape = PipelineShape::new(cfg.demo.sample_rate, cfg.demo.fragment_size);
    plugin.prepare(shape)?;
    println!(
        "  Bridging {} variable(s) at {:.1} Hz: {}",
        control.settings().vars.len(),
        shape.stream_rate(cfg.bridge.skip),
        control.settings().vars.join(", ").bold()
    );

    let cycles = cfg.demo.cycles;
    let period = Duration::from_secs_f64(1.0 / shape.cycle_rate());
    let processing = {
        let shutdown = shutdown.clone();
        thread::Builder::new()
            .name("varstream-processing".to_string())
            .spawn(move || {
                let result = processing_loop(&mut plugin, &pipeline, cycles, period, &shutdown);
                (plugin, result)
            })
            .map_err(|e| BridgeError::Outlet(format!("failed to spawn processing thread: {e}")))?
    };

    // The control thread owns the disposal of retired registries.
    while !processing.is_finished() {
        collect(&control);
        thread::sleep(Duration::from_millis(50));
    }
    let (mut plugin, result) = processing
        .join()
        .map_err(|_| BridgeError::Outlet("processing thread panicked".to_string()))?;
    plugin.release();
    collect(&control);

    // Let the printer drain the close announcements.
    runtime.block_on(tokio::time::sleep(Duration::from_millis(50)));
    runtime.shutdown_timeout(Duration::from_millis(200));

    let ran = result?;
    println!("  {} {} cycle(s) processed.", "✓".green().bold(), ran);
    Ok(())
}

fn processing_loop(
    plugin: &mut BridgePlugin,
    pipeline: &DemoPipeline,
    cycles: u64,
    period: Duration,
    shutdown: &AtomicBool,
) -> Result<u64, BridgeError> {
    let mut cycle = 0u64;
    while (cycles == 0 || cycle < cycles) && !shutdown.load(Ordering::SeqCst) {
        // SAFETY: `plugin` is the only bridge over the pipeline's space and
        // runs on this thread after the writes; every cycle reconciles
        // before it sends.
        unsafe { pipeline.advance(cycle) };
        plugin.process_signal(cycle)?;
        cycle += 1;
        thread::sleep(period);
    }
    info!(cycles = cycle, "processing loop finished");
    Ok(cycle)
}

fn collect(control: &BridgeControl) {
    if control.collect() {
        info!("dropped retired registry");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

async fn print_bus(mut rx: tokio::sync::broadcast::Receiver<BusMessage>, quiet: bool) {
    loop {
        match rx.recv().await {
            Ok(BusMessage::StreamOpened { info, .. }) => println!(
                "  {} {} {} × {} @ {:.1} Hz",
                "+".green().bold(),
                info.name.bold(),
                info.type_label.cyan(),
                info.channel_count,
                info.nominal_srate
            ),
            Ok(BusMessage::StreamClosed { name, .. }) => {
                println!("  {} {}", "-".red().bold(), name.dimmed())
            }
            Ok(BusMessage::Sample(frame)) if !quiet => println!(
                "    {:<8} #{:<5} {}",
                frame.name,
                frame.seq,
                format_values(&frame.values).dimmed()
            ),
            Ok(BusMessage::Sample(_)) => {}
            Err(RecvError::Lagged(n)) => warn!(lagged_by = n, "sample printer lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

fn format_values(values: &SampleValues) -> String {
    const SHOWN: usize = 6;
    fn join<T: std::fmt::Display>(v: &[T], precision: usize) -> String {
        let mut out: Vec<String> = v
            .iter()
            .take(SHOWN)
            .map(|x| format!("{x:.precision$}"))
            .collect();
        if v.len() > SHOWN {
            out.push(format!("… (+{})", v.len() - SHOWN));
        }
        format!("[{}]", out.join(", "))
    }
    match values {
        SampleValues::Int32(v) => join(v, 0),
        SampleValues::Float32(v) => join(v, 3),
        SampleValues::Float64(v) => join(v, 3),
    }
}

fn print_banner() {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║        varstream variable bridge     ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
}
