use super::vector::Vec2;
use serde::{Deserialize, Serialize};

/// Static obstacle geometry in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum ObstacleShape {
    Point { at: Vec2 },
    Disc { center: Vec2, radius: f64 },
    /// Axis-aligned rectangle spanning `min..max`.
    Rect { min: Vec2, max: Vec2 },
}

/// An immutable obstacle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    #[serde(flatten)]
    pub shape: ObstacleShape,
}

impl Obstacle {
    #[must_use]
    pub fn point(at: Vec2) -> Self {
        Self {
            shape: ObstacleShape::Point { at },
        }
    }

    #[must_use]
    pub fn disc(center: Vec2, radius: f64) -> Self {
        Self {
            shape: ObstacleShape::Disc { center, radius },
        }
    }

    #[must_use]
    pub fn rect(min: Vec2, max: Vec2) -> Self {
        Self {
            shape: ObstacleShape::Rect { min, max },
        }
    }

    /// Reference point used to pick the periodic image in a toroidal world.
    #[must_use]
    pub fn anchor(&self) -> Vec2 {
        match self.shape {
            ObstacleShape::Point { at } => at,
            ObstacleShape::Disc { center, .. } => center,
            ObstacleShape::Rect { min, max } => (min + max) * 0.5,
        }
    }

    /// Closest point of the obstacle's surface (or the point itself) to `p`.
    ///
    /// For a `p` inside a disc or rectangle the nearest boundary point is returned.
    #[must_use]
    pub fn closest_point(&self, p: Vec2) -> Vec2 {
        match self.shape {
            ObstacleShape::Point { at } => at,
            ObstacleShape::Disc { center, radius } => {
                let d = p - center;
                match d.normalized(1e-12) {
                    Some(n) => center + n * radius,
                    None => center + Vec2::new(radius, 0.0),
                }
            }
            ObstacleShape::Rect { min, max } => {
                let clamped = Vec2::new(p.x.clamp(min.x, max.x), p.y.clamp(min.y, max.y));
                if clamped != p {
                    return clamped;
                }
                // Inside: project onto the nearest edge.
                let left = p.x - min.x;
                let right = max.x - p.x;
                let bottom = p.y - min.y;
                let top = max.y - p.y;
                let m = left.min(right).min(bottom).min(top);
                if m == left {
                    Vec2::new(min.x, p.y)
                } else if m == right {
                    Vec2::new(max.x, p.y)
                } else if m == bottom {
                    Vec2::new(p.x, min.y)
                } else {
                    Vec2::new(p.x, max.y)
                }
            }
        }
    }

    #[must_use]
    pub fn contains(&self, p: Vec2) -> bool {
        match self.shape {
            ObstacleShape::Point { .. } => false,
            ObstacleShape::Disc { center, radius } => (p - center).length_squared() < radius * radius,
            ObstacleShape::Rect { min, max } => {
                p.x > min.x && p.x < max.x && p.y > min.y && p.y < max.y
            }
        }
    }

    /// Evenly spaced points along the outline, at most `spacing` apart.
    ///
    /// A point obstacle yields itself.
    #[must_use]
    pub fn outline_samples(&self, spacing: f64) -> Vec<Vec2> {
        let spacing = spacing.max(1e-3);
        match self.shape {
            ObstacleShape::Point { at } => vec![at],
            ObstacleShape::Disc { center, radius } => {
                let circumference = std::f64::consts::TAU * radius;
                let n = ((circumference / spacing).ceil() as usize).max(4);
                (0..n)
                    .map(|i| center + Vec2::from_angle(std::f64::consts::TAU * i as f64 / n as f64) * radius)
                    .collect()
            }
            ObstacleShape::Rect { min, max } => {
                let corners = [
                    min,
                    Vec2::new(max.x, min.y),
                    max,
                    Vec2::new(min.x, max.y),
                ];
                let mut out = Vec::new();
                for i in 0..4 {
                    let a = corners[i];
                    let b = corners[(i + 1) % 4];
                    let n = (((b - a).length() / spacing).ceil() as usize).max(1);
                    for k in 0..n {
                        out.push(a + (b - a) * (k as f64 / n as f64));
                    }
                }
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disc_closest_point() {
        let d = Obstacle::disc(Vec2::new(0.0, 0.0), 2.0);
        let c = d.closest_point(Vec2::new(5.0, 0.0));
        assert!((c.x - 2.0).abs() < 1e-12);
        assert!(c.y.abs() < 1e-12);
    }

    #[test]
    fn test_rect_closest_point_inside_projects_to_edge() {
        let r = Obstacle::rect(Vec2::new(0.0, 0.0), Vec2::new(10.0, 4.0));
        assert!(r.contains(Vec2::new(1.0, 2.0)));
        assert_eq!(r.closest_point(Vec2::new(1.0, 2.0)), Vec2::new(0.0, 2.0));
        assert_eq!(r.closest_point(Vec2::new(12.0, 7.0)), Vec2::new(10.0, 4.0));
    }

    #[test]
    fn test_outline_samples_spacing() {
        let r = Obstacle::rect(Vec2::new(0.0, 0.0), Vec2::new(4.0, 2.0));
        let samples = r.outline_samples(1.0);
        assert_eq!(samples.len(), 12);
        assert_eq!(Obstacle::point(Vec2::new(1.0, 1.0)).outline_samples(0.5).len(), 1);
    }

    #[test]
    fn test_obstacle_serde_shape_tag() {
        let json = r#"{"shape": "disc", "center": {"x": 1.0, "y": 1.0}, "radius": 0.5}"#;
        let o: Obstacle = serde_json::from_str(json).unwrap();
        assert_eq!(o, Obstacle::disc(Vec2::new(1.0, 1.0), 0.5));
    }
}
