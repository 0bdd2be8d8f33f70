use std::env;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use log::info;

use kidney_exchange::{ComparisonRecord, SimulationConfig, run_batch};

fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}

struct Args {
    config: Option<PathBuf>,
    results: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut args = env::args().skip(1);
    let config = args.next().map(PathBuf::from);
    let results = args.next().map(PathBuf::from);
    if let Some(extra) = args.next() {
        anyhow::bail!("Unexpected extra argument: {extra}");
    }
    Ok(Args { config, results })
}

fn load_config(path: Option<&Path>) -> Result<SimulationConfig> {
    let Some(path) = path else {
        return Ok(SimulationConfig::default());
    };
    let raw = fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
    let config: SimulationConfig =
        serde_json::from_str(&raw).with_context(|| format!("parse config {:?}", path))?;
    Ok(config)
}

fn main() -> Result<()> {
    init_logging();
    let args = parse_args()?;
    let config = load_config(args.config.as_deref())?;
    config.validate().context("validate simulation config")?;

    info!(
        "Pool {}, entry {}, death {}, cycle {}, chain {}, formulation {}, {} replications",
        config.pool,
        config.entry_rate,
        config.death_rate,
        config.max_cycle,
        config.max_chain,
        config.formulation,
        config.replications
    );

    let start = Instant::now();
    let records = run_batch(&config).context("run greedy/optimal comparison")?;
    for record in &records {
        info!(
            "Seed {}: optimal {:.2}, greedy {:.2}, ratio {:.4}, wall {:.2}s",
            record.seed,
            record.optimal_objective,
            record.greedy_objective,
            record.ratio,
            record.wall_time
        );
        println!("{}", record.to_csv_row());
    }
    info!("Finished {} runs in {:?}", records.len(), start.elapsed());

    if let Some(path) = args.results {
        append_records(&path, &records)?;
    }
    Ok(())
}

fn append_records(path: &Path, records: &[ComparisonRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("ensure results directory {:?}", parent))?;
    }
    let fresh = !path.exists();
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open results file {:?}", path))?;
    if fresh {
        writeln!(file, "{}", ComparisonRecord::CSV_HEADER)?;
    }
    for record in records {
        writeln!(file, "{}", record.to_csv_row())
            .with_context(|| format!("append to {:?}", path))?;
    }
    info!("Appended {} rows to {:?}", records.len(), path);
    Ok(())
}
