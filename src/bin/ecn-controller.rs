use std::io::Write;
use std::path::PathBuf;
use std::process::exit;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};

use rusty_p4_ecn::config::{parse_threshold, ControllerConfig};
use rusty_p4_ecn::controller::{Controller, RunSummary};
use rusty_p4_ecn::report::{JsonLinesReporter, LogReporter, Reporter};
use rusty_p4_ecn::util::Shutdown;

#[derive(Parser)]
#[command(name = "ecn-controller")]
#[command(about = "Installs ECN forwarding rules and reports congestion telemetry", long_about = None)]
struct Cli {
    /// Topology and program configuration (JSON)
    #[arg(long, value_name = "FILE", default_value = "config/ecn.json")]
    config: PathBuf,
    /// ECN threshold; prompted for when neither this nor the config sets it
    #[arg(long)]
    threshold: Option<u32>,
    /// Log level spec, e.g. "info" or "debug,tonic=info"
    #[arg(long, default_value = "info")]
    log: String,
    /// Write congestion reports to stdout as JSON lines instead of the log
    #[arg(long)]
    json: bool,
    /// Log every table entry read back after rule installation
    #[arg(long)]
    dump_tables: bool,
}

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(summary) => summary.exit_code(),
        Err(err) => {
            error!("{:?}", err);
            eprintln!("ecn-controller error: {:?}", err);
            1
        }
    };
    exit(code);
}

fn prompt_threshold() -> Result<u32> {
    print!("set ecn limit: ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("reading threshold from stdin")?;
    Ok(parse_threshold(&line)?)
}

async fn run() -> Result<RunSummary> {
    let cli = Cli::parse();
    let _logger = flexi_logger::Logger::with_str(&cli.log)
        .start()
        .context("starting logger")?;

    let mut config = ControllerConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if cli.threshold.is_some() {
        config.threshold = cli.threshold;
    }
    if config.threshold.is_none() {
        config.threshold = Some(prompt_threshold()?);
    }
    config.dump_tables |= cli.dump_tables;

    let controller = Controller::from_config(config)?;

    let shutdown = Shutdown::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutting down");
                signal.trigger();
            }
            Err(e) => warn!("cannot listen for ctrl-c: {}", e),
        }
    });

    let reporter: Box<dyn Reporter> = if cli.json {
        Box::new(JsonLinesReporter::new(std::io::stdout()))
    } else {
        Box::new(LogReporter)
    };
    let summary = controller.run(reporter, shutdown).await;
    log_summary(&summary);
    summary.ensure_started()?;
    Ok(summary)
}

fn log_summary(summary: &RunSummary) {
    for failure in &summary.switch_failures {
        error!(
            "switch {} failed at {}: {}",
            failure.switch, failure.stage, failure.error
        );
    }
    for failure in &summary.rule_failures {
        error!(
            "switch {}: {} not installed: {}",
            failure.switch, failure.rule, failure.cause
        );
    }
    for lost in &summary.lost_streams {
        error!("{}", lost);
    }
    for stats in &summary.monitored {
        info!(
            "switch {}: {} message(s), {} report(s), {} malformed, {} dropped",
            stats.switch, stats.received, stats.reported, stats.malformed, stats.dropped
        );
    }
}
