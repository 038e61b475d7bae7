//! Scenario files: configuration, initial agents, obstacles and an optional model.
//!
//! ```toml
//! name = "head-on"
//!
//! [config.world]
//! width = 100.0
//! height = 100.0
//!
//! [[agents]]
//! id = 0
//! position = { x = 45.0, y = 50.0 }
//! velocity = { x = 1.0, y = 0.0 }
//! goal = { kind = "point", at = { x = 95.0, y = 50.0 } }
//!
//! [[obstacles]]
//! shape = "disc"
//! center = { x = 50.0, y = 70.0 }
//! radius = 2.0
//!
//! [model]
//! kind = "advection"
//! horizon = 0.5
//! ```

use crate::error::{IoError, Result};
use ephswarm_core::config::SimConfig;
use ephswarm_core::model::{ModelSpec, PredictiveModel};
use ephswarm_core::world::World;
use ephswarm_data::{Agent, Obstacle};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub config: SimConfig,
    #[serde(default)]
    pub agents: Vec<Agent>,
    #[serde(default)]
    pub obstacles: Vec<Obstacle>,
    /// Model to attach when none is supplied at run time.
    #[serde(default)]
    pub model: Option<ModelSpec>,
}

impl Scenario {
    pub fn from_toml(content: &str) -> Result<Self> {
        let scenario: Scenario = toml::from_str(content)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let scenario: Scenario = serde_json::from_str(content)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Loads a `.toml` or `.json` scenario file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(IoError::not_found(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let parsed = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(&content),
            Some("json") => Self::from_json(&content),
            other => Err(IoError::validation(format!(
                "Unsupported scenario extension {other:?}"
            ))),
        };
        parsed.map_err(|e| e.with_context(format!("loading {}", path.display())))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }

    /// Structural checks that do not need a world.
    pub fn validate(&self) -> Result<()> {
        self.config.validate()?;
        if self.agents.is_empty() {
            return Err(IoError::validation("Scenario has no agents"));
        }
        for (slot, agent) in self.agents.iter().enumerate() {
            if agent.id.index() != slot {
                return Err(IoError::validation(format!(
                    "Agent at slot {slot} has id {}; ids must be 0..n in order",
                    agent.id.0
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.world.seed = seed;
        self
    }

    /// Builds the world. `model` takes precedence over the scenario's own model entry.
    pub fn into_world(self, model: Option<Arc<dyn PredictiveModel>>) -> Result<World> {
        let model = model.or_else(|| self.model.map(|spec| spec.build()));
        let world = World::new(self.config, self.agents, self.obstacles, model)?;
        Ok(world)
    }
}
