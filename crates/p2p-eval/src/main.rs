//! p2p-eval: bandwidth experiments on an ephemeral container mesh.
//!
//! Each run provisions a fresh mesh, subscribes every node to one pubsub
//! topic, samples `libp2p_network_bytes_total` on all nodes while a publish
//! scenario runs, and tears the mesh down again.
//!
//! # Usage
//!
//! ```text
//! p2p-eval messages --per-node 1,2,4,8,16
//! p2p-eval --config eval.toml size --sizes 1,1024,65536 --trials 3
//! p2p-eval config
//! ```

mod experiment;
mod results;
mod scenario;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use p2p_eval_core::EvalConfig;
use p2p_eval_mesh::DockerCli;
use p2p_eval_metrics::BandwidthSummary;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::experiment::Experiment;
use crate::results::{ResultsWriter, RunSummary, run_label};
use crate::scenario::Scenario;

#[derive(Parser)]
#[command(
    name = "p2p-eval",
    about = "Measure relay bandwidth on an ephemeral container mesh",
    version
)]
struct Cli {
    /// TOML configuration file. Every field is optional.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Total number of nodes.
    #[arg(long, global = true)]
    nodes: Option<usize>,

    /// Number of bootstrap nodes.
    #[arg(long, global = true)]
    bootstrappers: Option<usize>,

    /// Node container image.
    #[arg(long, global = true)]
    image: Option<String>,

    /// Directory for result files.
    #[arg(long, global = true)]
    results_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Every node publishes N messages concurrently, one run per N.
    Messages {
        /// Messages per node, one run each.
        #[arg(long, value_delimiter = ',', default_value = "1,2,4,8,16")]
        per_node: Vec<usize>,

        /// Runs per configuration.
        #[arg(long, default_value = "1")]
        trials: u32,
    },
    /// One node publishes a batch of S-byte messages, one run per S.
    Size {
        /// Payload sizes in bytes, one run each.
        #[arg(
            long,
            value_delimiter = ',',
            default_value = "1,16,64,128,1024,8192,65536,131072"
        )]
        sizes: Vec<usize>,

        /// Messages published per run.
        #[arg(long, default_value = "20")]
        batch: usize,

        /// Runs per size. Each run picks its publisher at random.
        #[arg(long, default_value = "1")]
        trials: u32,
    },
    /// Print the effective configuration as TOML.
    Config,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<EvalConfig> {
        let mut config = match &self.config {
            Some(path) => EvalConfig::from_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => EvalConfig::default(),
        };
        if let Some(nodes) = self.nodes {
            config.mesh.num_nodes = nodes;
        }
        if let Some(bootstrappers) = self.bootstrappers {
            config.mesh.bootstrappers = bootstrappers;
        }
        if let Some(image) = &self.image {
            config.mesh.image = image.clone();
        }
        if let Some(dir) = &self.results_dir {
            config.experiment.results_dir = dir.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new("info,p2p_eval=debug"))?,
        )
        .init();

    let cli = Cli::parse();
    let config = cli.load_config()?;

    let nodes = config.mesh.num_nodes;
    let runs: Vec<(Scenario, u32)> = match &cli.command {
        Command::Config => {
            print!("{}", config.to_toml_string()?);
            return Ok(());
        }
        Command::Messages { per_node, trials } => per_node
            .iter()
            .flat_map(|&n| (0..*trials).map(move |t| (Scenario::Messages { per_node: n }, t)))
            .collect(),
        Command::Size {
            sizes,
            batch,
            trials,
        } => {
            let mut rng = rand::thread_rng();
            let mut runs = Vec::new();
            for &size in sizes {
                for trial in 0..*trials {
                    let scenario =
                        Scenario::size_with_random_publisher(size, *batch, nodes, &mut rng);
                    runs.push((scenario, trial));
                }
            }
            runs
        }
    };
    for (scenario, _) in &runs {
        scenario.validate()?;
    }

    // Ctrl-C interrupts the current phase; the mesh is still torn down.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, tearing down");
            let _ = shutdown_tx.send(true);
        }
    });

    run_session(&config, runs, shutdown_rx).await
}

async fn run_session(
    config: &EvalConfig,
    runs: Vec<(Scenario, u32)>,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let Some(name) = runs.first().map(|(s, _)| s.name()) else {
        warn!("nothing to run");
        return Ok(());
    };
    let engine = Arc::new(DockerCli::new());
    let experiment = Experiment::new(config, shutdown)?;
    let writer = ResultsWriter::new(&config.experiment.results_dir);

    info!(
        scenario = name,
        runs = runs.len(),
        nodes = config.mesh.num_nodes,
        engine = engine.binary(),
        "starting experiment session"
    );

    let mut summaries = Vec::new();
    for (scenario, trial) in runs {
        let label = run_label(scenario.name(), scenario.param(), trial);
        info!(
            run = %label,
            expected_messages = scenario.total_messages(config.mesh.num_nodes),
            "starting run"
        );

        let outcome = experiment
            .run(engine.clone(), &scenario)
            .await
            .with_context(|| format!("run {label} failed"))?;

        if outcome.samples.is_empty() {
            warn!(run = %label, "no samples collected, skipping");
            continue;
        }
        writer.write_samples(&label, &outcome.samples)?;

        let bandwidth = BandwidthSummary::from_samples(&label, &outcome.samples);
        info!(
            run = %label,
            published = outcome.published,
            net_bandwidth_mb = bandwidth.total_megabytes(),
            "run complete"
        );
        summaries.push(RunSummary {
            scenario: scenario.name().to_string(),
            param: scenario.param(),
            trial,
            messages: outcome.published,
            payload_bytes: scenario.total_payload_bytes(&outcome.node_ids),
            net_bandwidth_mb: bandwidth.total_megabytes(),
            bandwidth,
        });
    }

    if summaries.is_empty() {
        warn!("no run produced data");
        return Ok(());
    }
    let path = writer.write_summary(name, &summaries)?;
    info!(path = %path.display(), runs = summaries.len(), "experiment session finished");
    Ok(())
}
