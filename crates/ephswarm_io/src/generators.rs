//! Scenario generators for the standard experiments.
//!
//! All placement is drawn from a seeded ChaCha stream, so a generator called
//! twice with the same arguments returns the same scenario.

use crate::error::{IoError, Result};
use crate::scenario::Scenario;
use ephswarm_core::config::SimConfig;
use ephswarm_data::{Agent, Goal, Obstacle, Vec2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const MAX_ATTEMPTS_PER_AGENT: usize = 1000;

/// Axis-aligned spawn region.
#[derive(Debug, Clone, Copy)]
struct Region {
    min: Vec2,
    max: Vec2,
}

impl Region {
    fn is_empty(&self) -> bool {
        !(self.min.is_finite() && self.max.is_finite() && self.min.x <= self.max.x && self.min.y <= self.max.y)
    }

    fn sample(&self, rng: &mut ChaCha8Rng) -> Result<Vec2> {
        if self.is_empty() {
            return Err(IoError::validation(format!(
                "Empty spawn region {:?}..{:?}",
                self.min, self.max
            )));
        }
        Ok(Vec2::new(
            rng.gen_range(self.min.x..=self.max.x),
            rng.gen_range(self.min.y..=self.max.y),
        ))
    }
}

fn ensure_length(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(IoError::validation(format!("{name} must be finite and non-negative, got {value}")))
    }
}

/// Rejection-samples a point in `region` at least `spacing` from everything in `taken`.
fn place(rng: &mut ChaCha8Rng, region: Region, spacing: f64, taken: &[Vec2]) -> Result<Vec2> {
    for _ in 0..MAX_ATTEMPTS_PER_AGENT {
        let p = region.sample(rng)?;
        if taken.iter().all(|q| (p - *q).length() >= spacing) {
            return Ok(p);
        }
    }
    Err(IoError::validation(format!(
        "Could not place an agent {spacing} apart from {} others in {:?}..{:?}",
        taken.len(),
        region.min,
        region.max
    )))
}

/// Two agents on the arena's horizontal midline, `separation` apart, closing at `speed` each.
#[must_use]
pub fn head_on_pair(config: SimConfig, separation: f64, speed: f64) -> Scenario {
    let cx = 0.5 * config.world.width;
    let cy = 0.5 * config.world.height;
    let half = 0.5 * separation;
    let agents = vec![
        Agent::new(0, Vec2::new(cx - half, cy), Goal::Direction {
            towards: Vec2::new(1.0, 0.0),
        })
        .with_velocity(Vec2::new(speed, 0.0))
        .with_heading(0.0),
        Agent::new(1, Vec2::new(cx + half, cy), Goal::Direction {
            towards: Vec2::new(-1.0, 0.0),
        })
        .with_velocity(Vec2::new(-speed, 0.0))
        .with_heading(std::f64::consts::PI)
        .with_group(1),
    ];
    Scenario {
        name: "head-on".into(),
        config,
        agents,
        obstacles: Vec::new(),
        model: None,
    }
}

/// Four groups entering from the four sides, each heading straight across.
///
/// Group `g` spawns in a strip of depth `margin` along one side and aims at the
/// opposite side: 0 west→east, 1 east→west, 2 south→north, 3 north→south.
pub fn crossing_groups(config: SimConfig, per_group: usize, margin: f64, spacing: f64) -> Result<Scenario> {
    let w = config.world.width;
    let h = config.world.height;
    ensure_length("Margin", margin)?;
    ensure_length("Spacing", spacing)?;
    if 2.0 * margin > w.min(h) {
        return Err(IoError::validation(format!(
            "Margin {margin} leaves no room in a {w}x{h} arena"
        )));
    }
    let mut rng = ChaCha8Rng::seed_from_u64(config.world.seed);
    let inner = |lo: f64, hi: f64| (lo + margin, hi - margin);
    let (x0, x1) = inner(0.0, w);
    let (y0, y1) = inner(0.0, h);
    let groups = [
        (Region { min: Vec2::new(0.0, y0), max: Vec2::new(margin, y1) }, Vec2::new(1.0, 0.0)),
        (Region { min: Vec2::new(w - margin, y0), max: Vec2::new(w, y1) }, Vec2::new(-1.0, 0.0)),
        (Region { min: Vec2::new(x0, 0.0), max: Vec2::new(x1, margin) }, Vec2::new(0.0, 1.0)),
        (Region { min: Vec2::new(x0, h - margin), max: Vec2::new(x1, h) }, Vec2::new(0.0, -1.0)),
    ];

    let mut agents: Vec<Agent> = Vec::with_capacity(4 * per_group);
    let mut taken = Vec::with_capacity(4 * per_group);
    for (group, (region, towards)) in groups.into_iter().enumerate() {
        for _ in 0..per_group {
            let p = place(&mut rng, region, spacing, &taken)?;
            taken.push(p);
            let goal = Vec2::new(
                if towards.x == 0.0 { p.x } else { w - p.x },
                if towards.y == 0.0 { p.y } else { h - p.y },
            );
            agents.push(
                Agent::new(agents.len() as u32, p, Goal::Point { at: goal })
                    .with_heading(towards.angle())
                    .with_group(group as u16),
            );
        }
    }
    Ok(Scenario {
        name: "crossing".into(),
        config,
        agents,
        obstacles: Vec::new(),
        model: None,
    })
}

/// `n` agents placed uniformly with random point goals, all at least `spacing` apart.
pub fn random_with_goals(config: SimConfig, n: usize, spacing: f64) -> Result<Scenario> {
    ensure_length("Spacing", spacing)?;
    let mut rng = ChaCha8Rng::seed_from_u64(config.world.seed);
    let region = Region {
        min: Vec2::ZERO,
        max: Vec2::new(config.world.width, config.world.height),
    };
    let mut taken = Vec::with_capacity(n);
    let mut agents = Vec::with_capacity(n);
    for i in 0..n {
        let p = place(&mut rng, region, spacing, &taken)?;
        taken.push(p);
        let goal = region.sample(&mut rng)?;
        agents.push(Agent::new(i as u32, p, Goal::Point { at: goal }));
    }
    Ok(Scenario {
        name: "random".into(),
        config,
        agents,
        obstacles: Vec::new(),
        model: None,
    })
}

/// Two walls leaving a horizontal corridor of `gap` through the middle of the
/// arena, with `per_side` agents at each end heading through it.
pub fn corridor(config: SimConfig, per_side: usize, gap: f64, spacing: f64) -> Result<Scenario> {
    let w = config.world.width;
    let h = config.world.height;
    ensure_length("Spacing", spacing)?;
    if !(gap > 0.0 && gap < h) {
        return Err(IoError::validation(format!("Corridor gap {gap} must lie in (0, {h})")));
    }
    let cy = 0.5 * h;
    let wall_x = (0.3 * w, 0.7 * w);
    let obstacles = vec![
        Obstacle::rect(Vec2::new(wall_x.0, 0.0), Vec2::new(wall_x.1, cy - 0.5 * gap)),
        Obstacle::rect(Vec2::new(wall_x.0, cy + 0.5 * gap), Vec2::new(wall_x.1, h)),
    ];

    let mut rng = ChaCha8Rng::seed_from_u64(config.world.seed);
    let band = (cy - 0.5 * gap.max(spacing * per_side as f64), cy + 0.5 * gap.max(spacing * per_side as f64));
    let sides = [
        (Region { min: Vec2::new(0.05 * w, band.0.max(0.0)), max: Vec2::new(0.2 * w, band.1.min(h)) }, 0.9 * w),
        (Region { min: Vec2::new(0.8 * w, band.0.max(0.0)), max: Vec2::new(0.95 * w, band.1.min(h)) }, 0.1 * w),
    ];
    let mut taken = Vec::new();
    let mut agents: Vec<Agent> = Vec::new();
    for (group, (region, goal_x)) in sides.into_iter().enumerate() {
        for _ in 0..per_side {
            let p = place(&mut rng, region, spacing, &taken)?;
            taken.push(p);
            agents.push(
                Agent::new(agents.len() as u32, p, Goal::Point { at: Vec2::new(goal_x, cy) })
                    .with_group(group as u16),
            );
        }
    }
    Ok(Scenario {
        name: "corridor".into(),
        config,
        agents,
        obstacles,
        model: None,
    })
}
