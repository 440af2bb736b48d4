// main.rs -- CLI entry point: load a dataset, anneal a detector, dump it.
//
// The learned tree is written as JSON (preorder flat node list plus the
// offset radius that regenerates the table it indexes, enough for
// downstream tooling to reconstruct and compile the detector) and printed
// as an indented dump on stdout,
// which is where the original trainer's logfile consumers look for it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use faster_learn::anneal::Annealer;
use faster_learn::config::RunConfig;
use faster_learn::dataset::Dataset;
use faster_learn::offsets::OffsetTable;
use faster_learn::repeatability::compute_repeatability_exact;
use faster_learn::tree::FlatNode;
use faster_learn::warp::WarpPolicy;

/// Learn a corner detector by simulated annealing over decision trees.
#[derive(Parser, Debug)]
#[command(name = "faster-learn", version)]
struct Cli {
    /// Run configuration file (TOML)
    #[arg(short, long, default_value = "learn_detector.toml")]
    config: PathBuf,

    /// Dataset directory (overrides the config file)
    #[arg(short, long)]
    dataset: Option<PathBuf>,

    /// Random seed (overrides the config file)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Where to write the learned detector
    #[arg(short, long, default_value = "detector.json")]
    output: PathBuf,

    /// After the run, re-score the final tree with the exact (uncached)
    /// repeatability metric for comparison against published results
    #[arg(long)]
    exact: bool,

    /// Print the offset table before the run (needed to keep extraction
    /// tooling in sync when the radius changes)
    #[arg(long)]
    print_offsets: bool,
}

/// On-disk form of a learned detector.
#[derive(Serialize)]
struct DetectorFile {
    num_nodes: usize,
    offset_radius: i32,
    threshold: i32,
    nodes: Vec<FlatNode>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let mut config = RunConfig::load(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;
    if let Some(dir) = cli.dataset {
        config.dataset_dir = dir;
    }
    if let Some(seed) = cli.seed {
        config.anneal.seed = seed;
    }

    let offsets = OffsetTable::generate(config.offset_radius);
    if cli.print_offsets {
        println!("{offsets}");
    }

    let dataset = Dataset::load(&config.dataset_dir, &config.frames, WarpPolicy::Pruned)
        .context("loading dataset")?;

    let mut annealer = Annealer::new(config.anneal.clone(), &offsets)?;
    let result = annealer.run(&dataset.frames, &dataset.warps);

    println!("Final tree ({} nodes):", result.tree.num_nodes());
    print!("{}", result.tree);
    if let Some(costs) = result.breakdown {
        info!(
            cost = costs.cost,
            repeatability = costs.repeatability,
            "final accepted cost",
        );
    }

    let file = DetectorFile {
        num_nodes: result.tree.num_nodes(),
        offset_radius: config.offset_radius,
        threshold: config.anneal.threshold,
        nodes: result.tree.flatten(),
    };
    std::fs::write(&cli.output, serde_json::to_string_pretty(&file)?)
        .with_context(|| format!("writing {}", cli.output.display()))?;
    info!(output = %cli.output.display(), "detector written");

    if cli.exact {
        // Reload the warps unpruned; the exact metric must see the points
        // the cached one prunes away.
        let exact_set = Dataset::load(&config.dataset_dir, &config.frames, WarpPolicy::Exact)
            .context("reloading dataset for exact scoring")?;
        let mut scratch = faster_learn::image::Image::new(
            dataset.frames[0].width(),
            dataset.frames[0].height(),
        );
        let corners: Vec<_> = dataset
            .frames
            .iter()
            .map(|img| {
                faster_learn::detect::detect(
                    img,
                    &result.tree,
                    &offsets,
                    config.anneal.threshold,
                    &mut scratch,
                )
            })
            .collect();
        let exact = compute_repeatability_exact(
            &exact_set.warps,
            &corners,
            config.anneal.match_radius as f64,
        );
        info!(exact_repeatability = exact, "exact validation score");
    }

    Ok(())
}
