pub mod macros;

use ephswarm_core::config::{DynamicsLaw, SimConfig, Topology};
use ephswarm_core::model::PredictiveModel;
use ephswarm_core::observation::StepReport;
use ephswarm_core::world::World;
use ephswarm_data::{Agent, Goal, Obstacle, Vec2};
use std::sync::Arc;

#[allow(dead_code)]
pub struct ScenarioBuilder {
    config: SimConfig,
    agents: Vec<Agent>,
    obstacles: Vec<Obstacle>,
    model: Option<Arc<dyn PredictiveModel>>,
}

#[allow(dead_code)]
impl ScenarioBuilder {
    pub fn new() -> Self {
        Self {
            config: SimConfig::default(),
            agents: Vec::new(),
            obstacles: Vec::new(),
            model: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.world.seed = seed;
        self
    }

    pub fn with_arena(mut self, width: f64, height: f64, topology: Topology) -> Self {
        self.config.world.width = width;
        self.config.world.height = height;
        self.config.world.topology = topology;
        self
    }

    pub fn heading_aligned(mut self) -> Self {
        self.config.dynamics.law = DynamicsLaw::HeadingAligned {
            max_turn_rate: std::f64::consts::TAU,
        };
        self
    }

    pub fn with_config<F>(mut self, modifier: F) -> Self
    where
        F: FnOnce(&mut SimConfig),
    {
        modifier(&mut self.config);
        self
    }

    /// Adds an agent; its id is the next free slot.
    pub fn with_agent(mut self, agent: AgentBuilder) -> Self {
        let id = self.agents.len() as u32;
        self.agents.push(agent.build(id));
        self
    }

    pub fn with_obstacle(mut self, obstacle: Obstacle) -> Self {
        self.obstacles.push(obstacle);
        self
    }

    pub fn with_model(mut self, model: Arc<dyn PredictiveModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn build(self) -> World {
        World::new(self.config, self.agents, self.obstacles, self.model)
            .expect("Failed to create world in test builder")
    }
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct AgentBuilder {
    position: Vec2,
    velocity: Vec2,
    heading: Option<f64>,
    goal: Goal,
    group: u16,
    max_action: Option<f64>,
}

#[allow(dead_code)]
impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            position: Vec2::new(10.0, 10.0),
            velocity: Vec2::ZERO,
            heading: None,
            goal: Goal::default(),
            group: 0,
            max_action: None,
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Vec2::new(x, y);
        self
    }

    pub fn moving(mut self, vx: f64, vy: f64) -> Self {
        self.velocity = Vec2::new(vx, vy);
        self
    }

    pub fn heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }

    pub fn towards_point(mut self, x: f64, y: f64) -> Self {
        self.goal = Goal::Point { at: Vec2::new(x, y) };
        self
    }

    pub fn towards_direction(mut self, x: f64, y: f64) -> Self {
        self.goal = Goal::Direction {
            towards: Vec2::new(x, y),
        };
        self
    }

    pub fn group(mut self, group: u16) -> Self {
        self.group = group;
        self
    }

    pub fn max_action(mut self, limit: f64) -> Self {
        self.max_action = Some(limit);
        self
    }

    pub fn build(self, id: u32) -> Agent {
        let mut agent = Agent::new(id, self.position, self.goal)
            .with_velocity(self.velocity)
            .with_group(self.group);
        if let Some(h) = self.heading {
            agent = agent.with_heading(h);
        }
        if let Some(limit) = self.max_action {
            agent = agent.with_max_action(limit);
        }
        agent
    }
}

/// Runs `steps` steps and returns every report.
#[allow(dead_code)]
pub fn run_reports(world: &mut World, steps: u64) -> Vec<StepReport> {
    let mut reports = Vec::with_capacity(steps as usize);
    world
        .run(steps, |r| reports.push(r.clone()))
        .expect("Simulation step failed");
    reports
}
