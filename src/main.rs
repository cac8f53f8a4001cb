//! socscope - Main Entry Point
//!
//! Builds one of the simulated SoCs from the config file, runs it on a
//! runner thread and reports what comes back.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use socscope::{
    capture::{CaptureState, TraceFormat},
    config::{config_path, SocConfig},
    runtime::{self, RunnerBridge, StatusMessage, Target, TargetCommand},
    targets::{EdidDebugSoc, Hdmi2EthSoc},
};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "socscope", version, about = "Cycle-level SoC debug dataflow model")]
struct Cli {
    /// Config file (default: platform config dir, or $SOCSCOPE_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Shared UART debug SoC with console, bus bridge and capture
    EdidDebug {
        /// Route the UART to the bus bridge instead of the console
        #[arg(long)]
        bridge: bool,
        /// Text typed on the host side; a carriage return is appended
        #[arg(long)]
        send: Option<String>,
        /// Cycles to run (default: runtime.max_cycles, 0 = until the capture completes)
        #[arg(long)]
        cycles: Option<u64>,
        /// Where to write the capture (default: export settings)
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// DMA to UDP streaming pipeline across two clock domains
    Hdmi2eth {
        /// Cycles of the system clock to run (0 = forever)
        #[arg(long)]
        cycles: Option<u64>,
        /// UDP destination, host:port
        #[arg(long)]
        peer: Option<String>,
    },
    /// Write a default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init_logging(log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,socscope=debug"));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr));

    let Some(path) = log_file else {
        registry.init();
        return Ok(None);
    };
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path.file_name().context("log file path has no file name")?;
    let appender = tracing_appender::rolling::never(dir, name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    registry
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .init();
    Ok(Some(guard))
}

/// What to do with a target once it runs.
struct Session {
    cycles: u64,
    export: Option<(PathBuf, TraceFormat)>,
    collect_tx: bool,
}

/// Drive `target` on a runner thread until the session is over.
fn run_session(
    target: Box<dyn Target>,
    config: &SocConfig,
    session: Session,
) -> anyhow::Result<()> {
    let name = target.name().to_string();
    let (bridge, handle) = runtime::spawn_with(
        target,
        config.runtime.tick_rate_hz,
        config.runtime.cycles_per_tick,
    )
    .context("failed to start runner thread")?;

    let outcome = drive_session(&name, &bridge, &session);
    if handle.join().is_err() {
        bail!("runner thread for '{}' panicked", name);
    }
    outcome
}

/// React to runner messages until the runner shuts down. The first runner
/// error ends the session and becomes its result.
fn drive_session(name: &str, bridge: &RunnerBridge, session: &Session) -> anyhow::Result<()> {
    let export_cmd = |(path, format): &(PathBuf, TraceFormat)| TargetCommand::Export {
        path: path.clone(),
        format: *format,
    };

    if session.cycles > 0 {
        bridge.step(session.cycles);
    } else {
        tracing::info!("Free-running '{}'", name);
        bridge.start();
    }

    let mut failure: Option<String> = None;
    while let Ok(msg) = bridge.msg_rx.recv() {
        match msg {
            StatusMessage::Stepped { cycle } => {
                tracing::info!("{} stopped at cycle {}", name, cycle);
                if let Some(export) = &session.export {
                    bridge.target(export_cmd(export));
                }
                if session.collect_tx {
                    bridge.target(TargetCommand::TakeTx);
                }
                bridge.shutdown();
            }
            StatusMessage::Capture(status) => {
                tracing::info!(
                    "Capture {} ({} / {} samples)",
                    status.state,
                    status.samples,
                    status.capacity
                );
                if status.state == CaptureState::Done && session.cycles == 0 {
                    match &session.export {
                        Some(export) => bridge.target(export_cmd(export)),
                        None => bridge.shutdown(),
                    }
                }
            }
            StatusMessage::Exported { path, summary } => {
                println!(
                    "wrote {} samples of {} signals to {} ({} bytes)",
                    summary.samples,
                    summary.signals,
                    path.display(),
                    summary.bytes
                );
                if session.cycles == 0 {
                    if session.collect_tx {
                        bridge.target(TargetCommand::TakeTx);
                    }
                    bridge.shutdown();
                }
            }
            StatusMessage::TxBytes(bytes) => {
                print!("{}", String::from_utf8_lossy(&bytes));
            }
            StatusMessage::Indicators(indicators) => {
                let leds: Vec<String> = indicators
                    .iter()
                    .map(|i| format!("{}={}", i.name, u8::from(i.lit)))
                    .collect();
                tracing::debug!("{}", leds.join(" "));
            }
            StatusMessage::Status(status) => {
                tracing::info!("{:?}", status);
            }
            StatusMessage::Error(e) => {
                tracing::error!("{}", e);
                if failure.is_none() {
                    failure = Some(e);
                }
                bridge.shutdown();
            }
            StatusMessage::Shutdown => break,
        }
    }

    match failure {
        Some(e) => bail!("{}: {}", name, e),
        None => Ok(()),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.log_file.as_deref())?;

    let config = SocConfig::load_or_default(cli.config.as_deref());

    match cli.cmd {
        Cmd::EdidDebug {
            bridge,
            send,
            cycles,
            export,
        } => {
            let mut soc = EdidDebugSoc::new(config.edid_debug.clone())?;
            let ports = config.capture.ports(soc.capture().layout())?;
            for port in ports {
                soc.handle(TargetCommand::AddTriggerPort(port))?;
            }
            let export = export.map(|path| {
                let format = TraceFormat::from_path(&path).unwrap_or(config.export.format);
                (path, format)
            });
            let export = export.or_else(|| {
                (!config.capture.triggers.is_empty())
                    .then(|| (config.export.path(), config.export.format))
            });
            if config.capture.arm_on_start || export.is_some() {
                soc.handle(TargetCommand::Arm)?;
            }
            soc.handle(TargetCommand::SetSwitch(bridge))?;
            if let Some(text) = send {
                let mut bytes = text.into_bytes();
                bytes.push(b'\r');
                soc.handle(TargetCommand::InjectRx(bytes))?;
            }

            let cycles = cycles.unwrap_or(config.runtime.max_cycles);
            if cycles == 0 && export.is_none() {
                bail!("nothing to wait for: pass --cycles or configure a capture trigger");
            }
            run_session(
                Box::new(soc),
                &config,
                Session {
                    cycles,
                    export,
                    collect_tx: true,
                },
            )
        }
        Cmd::Hdmi2eth { cycles, peer } => {
            let mut hdmi = config.hdmi2eth.clone();
            if let Some(peer) = peer {
                hdmi.peer = peer;
            }
            let soc = Hdmi2EthSoc::new(hdmi)?;
            run_session(
                Box::new(soc),
                &config,
                Session {
                    cycles: cycles.unwrap_or(config.runtime.max_cycles),
                    export: None,
                    collect_tx: false,
                },
            )
        }
        Cmd::InitConfig { force } => {
            let path = cli
                .config
                .or_else(config_path)
                .context("could not determine config path")?;
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            SocConfig::default().save(&path)?;
            println!("wrote {}", path.display());
            Ok(())
        }
    }
}
