use anyhow::Result;
use clap::Parser;
use ephswarm_core::metrics::init_logging;
use ephswarm_lib::runner::{run, Preset, RunOptions};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scenario file (.toml or .json)
    #[arg(short, long)]
    scenario: Option<PathBuf>,

    /// Built-in scenario used when no file is given
    #[arg(short, long, value_enum, default_value = "head-on")]
    preset: PresetArg,

    /// Agents per group for presets that take a count
    #[arg(short, long, default_value_t = 10)]
    agents: usize,

    /// Config file applied to presets
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of steps to simulate
    #[arg(short = 'n', long, default_value_t = 1000)]
    steps: u64,

    /// Trajectory output (JSON lines)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Gzip the trajectory output
    #[arg(long)]
    gzip: bool,

    /// Predictive model artifact
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Override the world seed
    #[arg(long)]
    seed: Option<u64>,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PresetArg {
    HeadOn,
    Crossing,
    Random,
    Corridor,
}

impl From<PresetArg> for Preset {
    fn from(p: PresetArg) -> Self {
        match p {
            PresetArg::HeadOn => Preset::HeadOn,
            PresetArg::Crossing => Preset::Crossing,
            PresetArg::Random => Preset::Random,
            PresetArg::Corridor => Preset::Corridor,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let options = RunOptions {
        scenario: args.scenario,
        preset: Some(args.preset.into()),
        agents: args.agents,
        config: args.config,
        steps: args.steps,
        output: args.output,
        gzip: args.gzip,
        model: args.model,
        seed: args.seed,
    };

    let summary = run(&options)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
