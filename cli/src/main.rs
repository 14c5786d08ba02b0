//! Simulate a peer-to-peer cryptocurrency network from the command line.

use chainsim_simulator::{Config, Limit, Simulation, Summary};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
    time::Duration,
};
use thiserror::Error;
use tracing::{error, info, Level};

mod graph;

/// Returns the version of the crate.
pub const fn crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unable to read topology file {path}: {source}")]
    GraphFileUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("topology file describes {actual} peers, expected {expected}")]
    GraphFileMismatch { expected: usize, actual: usize },
    #[error("malformed topology file: {0}")]
    MalformedGraphFile(String),
    #[error("simulation failed: {0}")]
    Simulator(#[from] chainsim_simulator::Error),
    #[error("unable to write summary: {0}")]
    Summary(String),
}

fn command() -> Command {
    Command::new("chainsim")
        .version(crate_version())
        .about(
            "Simulate block and transaction propagation in a peer-to-peer cryptocurrency network.",
        )
        .arg(
            Arg::new("peers")
                .required(true)
                .help("Number of peers")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("z0")
                .required(true)
                .help("Fraction of peers with a slow network connection")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            Arg::new("z1")
                .required(true)
                .help("Fraction of peers with low hashing power")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            Arg::new("transaction-interval")
                .long("transaction-interval")
                .default_value("10")
                .help("Mean time between transactions of a peer (seconds)")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            Arg::new("block-interval")
                .long("block-interval")
                .default_value("600")
                .help("Mean time between blocks across the network (seconds)")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            Arg::new("horizon")
                .long("horizon")
                .default_value("3600")
                .help("Simulated time to run for (seconds)")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            Arg::new("events")
                .long("events")
                .conflicts_with("horizon")
                .help("Number of events to dispatch (instead of running until the horizon)")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .default_value("0")
                .help("Seed for the random number generator")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("topology")
                .long("topology")
                .help("Path to a topology file (generated at random if not provided)")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("no-drain")
                .long("no-drain")
                .help("Stop at the horizon without delivering in-flight messages")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("summary")
                .long("summary")
                .help("Path to write the run summary to (JSON)")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("metrics")
                .long("metrics")
                .help("Print all metrics when the run completes")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .default_value("info")
                .help("Maximum level of emitted logs")
                .value_parser(value_parser!(Level)),
        )
}

/// Convert a number of seconds provided on the command line.
fn seconds(name: &str, value: f64) -> Result<Duration, Error> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        Error::InvalidArgument(format!(
            "{name} must be a representable non-negative number of seconds: {value}"
        ))
    })
}

/// Build the simulation configuration from parsed arguments.
fn config(matches: &ArgMatches) -> Result<Config, Error> {
    for name in ["z0", "z1"] {
        let fraction = *matches.get_one::<f64>(name).unwrap();
        if !(0.0..=1.0).contains(&fraction) {
            return Err(Error::InvalidArgument(format!(
                "{name} must be in [0, 1]: {fraction}"
            )));
        }
    }
    Ok(Config {
        seed: *matches.get_one::<u64>("seed").unwrap(),
        slow_fraction: *matches.get_one::<f64>("z0").unwrap(),
        low_fraction: *matches.get_one::<f64>("z1").unwrap(),
        transaction_interval: seconds(
            "transaction-interval",
            *matches.get_one::<f64>("transaction-interval").unwrap(),
        )?,
        block_interval: seconds(
            "block-interval",
            *matches.get_one::<f64>("block-interval").unwrap(),
        )?,
        drain: !matches.get_flag("no-drain"),
        ..Config::default()
    })
}

fn limit(matches: &ArgMatches) -> Result<Limit, Error> {
    if let Some(events) = matches.get_one::<usize>("events") {
        return Ok(Limit::Events(*events));
    }
    let horizon = *matches.get_one::<f64>("horizon").unwrap();
    Ok(Limit::Horizon(seconds("horizon", horizon)?))
}

fn write_summary(path: &Path, summary: &Summary) -> Result<(), Error> {
    let json =
        serde_json::to_string_pretty(summary).map_err(|e| Error::Summary(e.to_string()))?;
    fs::write(path, json).map_err(|e| Error::Summary(format!("{}: {e}", path.display())))?;
    info!(path = %path.display(), "wrote summary");
    Ok(())
}

fn run(matches: &ArgMatches) -> Result<(), Error> {
    let peers = *matches.get_one::<usize>("peers").unwrap();
    let cfg = config(matches)?;
    let limit = limit(matches)?;

    let mut simulation = match matches.get_one::<PathBuf>("topology") {
        Some(path) => Simulation::new(cfg, graph::load(path, peers)?)?,
        None => Simulation::generate(cfg, peers)?,
    };
    let summary = simulation.run(limit);

    for peer in &summary.peers {
        info!(
            peer = peer.peer,
            speed = ?peer.speed,
            tier = ?peer.tier,
            tip = peer.tip,
            height = peer.tip_height,
            known = peer.blocks_known,
            mined = peer.blocks_mined,
            in_chain = peer.mined_in_chain,
            forks = peer.forks,
            rejected = peer.blocks_rejected,
            balance = peer.balance,
            "peer summary"
        );
    }
    info!(
        time = ?summary.time,
        events = summary.events,
        height = summary.max_height(),
        mined = summary.blocks_mined(),
        converged = summary.converged(),
        "run complete"
    );

    if let Some(path) = matches.get_one::<PathBuf>("summary") {
        write_summary(path, &summary)?;
    }
    if matches.get_flag("metrics") {
        print!("{}", simulation.encode_metrics());
    }
    Ok(())
}

/// Entrypoint for the chainsim CLI
fn main() -> ExitCode {
    // Parse arguments (usage errors exit with 1, help and version with 0)
    let matches = match command().try_get_matches() {
        Ok(matches) => matches,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    // Create logger
    let level = *matches.get_one::<Level>("log-level").unwrap();
    tracing_subscriber::fmt().with_max_level(level).init();

    if let Err(e) = run(&matches) {
        error!(error = ?e, "simulation failed");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
