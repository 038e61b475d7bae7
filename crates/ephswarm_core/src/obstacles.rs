//! Static obstacle field shared read-only by every step.

use crate::geometry::Arena;
use ephswarm_data::{Obstacle, Vec2};

/// Obstacles plus their precomputed outline samples.
#[derive(Debug, Clone, Default)]
pub struct ObstacleField {
    obstacles: Vec<Obstacle>,
    outlines: Vec<Vec<Vec2>>,
}

/// Nearest surface point of one obstacle, in the image closest to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceHit {
    pub index: usize,
    /// Closest surface point in the query's coordinates (may lie outside the arena on a torus).
    pub point: Vec2,
    /// Offset from the query to `point`.
    pub offset: Vec2,
    pub inside: bool,
}

impl SurfaceHit {
    #[inline]
    #[must_use]
    pub fn distance(&self) -> f64 {
        self.offset.length()
    }
}

impl ObstacleField {
    #[must_use]
    pub fn new(obstacles: Vec<Obstacle>, sample_spacing: f64) -> Self {
        let outlines = obstacles
            .iter()
            .map(|o| o.outline_samples(sample_spacing))
            .collect();
        Self {
            obstacles,
            outlines,
        }
    }

    #[must_use]
    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.obstacles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.obstacles.is_empty()
    }

    /// Translation that moves obstacle `index` to its image nearest `p`.
    fn image_shift(&self, arena: &Arena, index: usize, p: Vec2) -> Vec2 {
        let anchor = self.obstacles[index].anchor();
        (p + arena.relative(p, anchor)) - anchor
    }

    /// Closest surface point of obstacle `index` to `p`.
    #[must_use]
    pub fn surface_hit(&self, arena: &Arena, index: usize, p: Vec2) -> SurfaceHit {
        let shift = self.image_shift(arena, index, p);
        let local = p - shift;
        let obstacle = &self.obstacles[index];
        let point = obstacle.closest_point(local) + shift;
        SurfaceHit {
            index,
            point,
            offset: point - p,
            inside: obstacle.contains(local),
        }
    }

    /// Every obstacle whose surface lies strictly within `radius` of `p`.
    pub fn hits_within(&self, arena: &Arena, p: Vec2, radius: f64) -> impl Iterator<Item = SurfaceHit> + '_ {
        let arena = *arena;
        (0..self.obstacles.len())
            .map(move |i| self.surface_hit(&arena, i, p))
            .filter(move |hit| hit.inside || hit.distance() < radius)
    }

    /// Perception points of obstacle `index` seen from `p`: the closest surface
    /// point followed by the outline samples, all in `p`'s image.
    #[must_use]
    pub fn perception_points(&self, arena: &Arena, index: usize, p: Vec2) -> Vec<Vec2> {
        let shift = self.image_shift(arena, index, p);
        let hit = self.surface_hit(arena, index, p);
        let mut points = Vec::with_capacity(self.outlines[index].len() + 1);
        points.push(hit.point);
        points.extend(self.outlines[index].iter().map(|&s| s + shift));
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Topology;

    #[test]
    fn test_surface_hit_uses_wrapped_image() {
        let arena = Arena::new(20.0, 20.0, Topology::Toroidal);
        let field = ObstacleField::new(vec![Obstacle::disc(Vec2::new(19.0, 10.0), 0.5)], 0.5);
        let hit = field.surface_hit(&arena, 0, Vec2::new(1.0, 10.0));
        assert!((hit.distance() - 1.5).abs() < 1e-9);
        assert!(hit.point.x < 0.0);
    }

    #[test]
    fn test_hits_within_filters_by_radius() {
        let arena = Arena::new(50.0, 50.0, Topology::Clamped);
        let field = ObstacleField::new(
            vec![
                Obstacle::rect(Vec2::new(10.0, 10.0), Vec2::new(12.0, 20.0)),
                Obstacle::point(Vec2::new(40.0, 40.0)),
            ],
            1.0,
        );
        let hits: Vec<_> = field.hits_within(&arena, Vec2::new(8.0, 15.0), 3.0).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].index, 0);
        assert!((hits[0].distance() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_inside_rect_is_reported() {
        let arena = Arena::new(50.0, 50.0, Topology::Clamped);
        let field = ObstacleField::new(vec![Obstacle::rect(Vec2::new(10.0, 10.0), Vec2::new(20.0, 20.0))], 1.0);
        let hit = field.surface_hit(&arena, 0, Vec2::new(11.0, 15.0));
        assert!(hit.inside);
        assert_eq!(hit.point, Vec2::new(10.0, 15.0));
    }
}
