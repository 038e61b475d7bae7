//! Headless runs: load or generate a scenario, step it, record it.

use anyhow::{bail, Context, Result};
use ephswarm_core::config::SimConfig;
use ephswarm_core::model::PredictiveModel;
use ephswarm_core::world::World;
use ephswarm_io::generators;
use ephswarm_io::{load_model, RunHeader, Scenario, TrajectoryRecorder};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Built-in scenario families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    HeadOn,
    Crossing,
    Random,
    Corridor,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Scenario file; takes precedence over `preset`.
    pub scenario: Option<PathBuf>,
    pub preset: Option<Preset>,
    /// Agent count for presets (per group for crossing, per side for corridor).
    pub agents: usize,
    /// Configuration used by presets.
    pub config: Option<PathBuf>,
    pub steps: u64,
    pub output: Option<PathBuf>,
    pub gzip: bool,
    /// Model artifact overriding the scenario's own model.
    pub model: Option<PathBuf>,
    pub seed: Option<u64>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            scenario: None,
            preset: Some(Preset::HeadOn),
            agents: 10,
            config: None,
            steps: 1000,
            output: None,
            gzip: false,
            model: None,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub scenario: String,
    pub steps: u64,
    pub agents: usize,
    pub collisions: u64,
    pub overrides: u64,
    pub model_failures: u64,
    pub elapsed: Duration,
}

const CROSSING_MARGIN: f64 = 10.0;

fn preset_scenario(preset: Preset, config: SimConfig, agents: usize) -> Result<Scenario> {
    let scenario = match preset {
        Preset::HeadOn => generators::head_on_pair(config, 10.0, 1.0),
        Preset::Crossing => {
            // Spawn strips shrink with small arenas.
            let margin = CROSSING_MARGIN.min(0.25 * config.world.width.min(config.world.height));
            generators::crossing_groups(config, agents, margin, 1.5)?
        }
        Preset::Random => generators::random_with_goals(config, agents, 1.5)?,
        Preset::Corridor => generators::corridor(config, agents, 6.0, 1.5)?,
    };
    Ok(scenario)
}

/// Resolves the scenario described by `options`.
pub fn build_scenario(options: &RunOptions) -> Result<Scenario> {
    let scenario = if let Some(path) = &options.scenario {
        Scenario::load(path).with_context(|| format!("Failed to load scenario {}", path.display()))?
    } else if let Some(preset) = options.preset {
        let mut config = match &options.config {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                SimConfig::from_toml(&content)?
            }
            None => SimConfig::default(),
        };
        if let Some(seed) = options.seed {
            config.world.seed = seed;
        }
        preset_scenario(preset, config, options.agents)?
    } else {
        bail!("Either a scenario file or a preset is required");
    };

    Ok(match options.seed {
        Some(seed) => scenario.with_seed(seed),
        None => scenario,
    })
}

/// Runs the simulation to completion and returns its totals.
pub fn run(options: &RunOptions) -> Result<RunSummary> {
    let scenario = build_scenario(options)?;
    let name = scenario.name.clone();

    let model: Option<Arc<dyn PredictiveModel>> = match &options.model {
        Some(path) => Some(load_model(path).context("Failed to load predictive model")?),
        None => None,
    };
    let mut world: World = scenario.into_world(model).context("Failed to build world")?;

    let mut recorder = match &options.output {
        Some(path) => {
            let mut recorder = TrajectoryRecorder::create(path, options.gzip)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            recorder.write_header(RunHeader {
                scenario: name.clone(),
                fingerprint: world.config().fingerprint(),
                agents: world.agents().len(),
                model: world.model().name().to_string(),
            })?;
            Some(recorder)
        }
        None => None,
    };

    for _ in 0..options.steps {
        let report = world.step()?;
        if let Some(recorder) = recorder.as_mut() {
            recorder.record(&report)?;
        }
    }
    if let Some(recorder) = recorder {
        let records = recorder.finish()?;
        tracing::info!(records, "Trajectory written");
    }

    let metrics = world.metrics();
    Ok(RunSummary {
        scenario: name,
        steps: metrics.step_count(),
        agents: world.agents().len(),
        collisions: metrics.collision_count(),
        overrides: metrics.override_count(),
        model_failures: metrics.model_failure_count(),
        elapsed: metrics.elapsed(),
    })
}
