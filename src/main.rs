use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use log::{info, warn};
use std::path::PathBuf;
use tokio::runtime::Builder;

use dvr_sim::network::parse_topology;
use dvr_sim::report::{divergences, render_json, render_round};
use dvr_sim::{Coordinator, RoundReport, SimulationConfig, Topology};

#[derive(Parser)]
#[command(name = "dvr-sim", about = "Simulate Distance Vector Routing in lockstep rounds")]
struct Cli {
    /// Topology file: node count, node names, then `<src> <dst> <cost>` lines
    topology: PathBuf,

    /// JSON simulation config; command line flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    rounds: Option<u32>,

    /// Abort a round that takes longer than this
    #[arg(long)]
    round_timeout_ms: Option<u64>,

    /// Report finished routers when a round times out
    #[arg(long)]
    partial_results: bool,

    /// One JSON report per line instead of the table dump
    #[arg(long)]
    json: bool,

    /// Compare the final tables with Dijkstra shortest paths
    #[arg(long)]
    verify: bool,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn simulation_config(&self) -> Result<SimulationConfig> {
        let mut config = match &self.config {
            Some(path) => SimulationConfig::load(path)?,
            None => SimulationConfig::default(),
        };
        if let Some(rounds) = self.rounds {
            config.rounds = rounds;
        }
        if self.round_timeout_ms.is_some() {
            config.round_timeout_ms = self.round_timeout_ms;
        }
        if self.partial_results {
            config.partial_results = true;
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn emit(report: &RoundReport, topology: &Topology, json: bool) -> Result<()> {
    if json {
        println!("{}", render_json(report)?);
    } else {
        print!("{}", render_round(report, topology));
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli.simulation_config()?;
    let text = std::fs::read_to_string(&cli.topology)
        .with_context(|| format!("reading topology {}", cli.topology.display()))?;
    let topology = parse_topology(&text).context("Check input file for syntax errors")?;
    if !topology.is_connected() {
        warn!("Topology is not connected, some destinations stay unreachable");
    }

    let rt = Builder::new_multi_thread().enable_all().build()?;
    rt.block_on(simulate(topology, config, &cli))
}

async fn simulate(topology: Topology, config: SimulationConfig, cli: &Cli) -> Result<()> {
    let mut coordinator = Coordinator::new(topology.clone(), config)?;
    let mut last = coordinator.initial_report().await;
    emit(&last, &topology, cli.json)?;

    {
        let mut rounds = std::pin::pin!(coordinator.run_all());
        while let Some(report) = rounds.next().await {
            let report = report?;
            emit(&report, &topology, cli.json)?;
            last = report;
        }
    }

    if cli.verify {
        let found = divergences(&last, &topology);
        if found.is_empty() {
            info!("All tables match shortest paths after round {}", last.round);
        } else {
            for d in &found {
                warn!(
                    "{} -> {}: cost {} but shortest path is {}",
                    d.node, d.destination, d.actual, d.expected
                );
            }
            anyhow::bail!(
                "{} entries have not converged after {} rounds",
                found.len(),
                coordinator.rounds_completed()
            );
        }
    }

    Ok(())
}
