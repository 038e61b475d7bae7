use crate::geometry::Arena;
use ephswarm_data::Vec2;
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

#[derive(Clone, Debug)]
/// Uniform grid index over agent positions for radius queries.
///
/// Uses the offset-array layout (like compressed sparse rows):
/// `cell_offsets[i]..cell_offsets[i+1]` indexes into `agent_indices` for
/// every agent in cell `i`. Cells divide the arena evenly, so wrapped
/// queries on a torus line up with the opposite edge.
///
/// # Examples
/// ```
/// use ephswarm_core::config::Topology;
/// use ephswarm_core::geometry::Arena;
/// use ephswarm_core::spatial_hash::SpatialHash;
/// use ephswarm_data::Vec2;
///
/// let arena = Arena::new(100.0, 100.0, Topology::Toroidal);
/// let mut spatial = SpatialHash::new(10.0, &arena);
/// spatial.build(&[Vec2::new(15.0, 15.0), Vec2::new(99.0, 15.0), Vec2::new(60.0, 60.0)]);
///
/// let mut nearby = Vec::new();
/// spatial.query_into(Vec2::new(2.0, 15.0), 5.0, &mut nearby);
/// assert_eq!(nearby, vec![1]);
/// ```
pub struct SpatialHash {
    pub cell_w: f64,
    pub cell_h: f64,
    pub cols: usize,
    pub rows: usize,
    pub wrap: bool,
    pub cell_offsets: Vec<usize>,
    pub agent_indices: Vec<usize>,
}

impl SpatialHash {
    /// Creates an index whose cells are at least `cell_size` wide.
    pub fn new(cell_size: f64, arena: &Arena) -> Self {
        let cols = ((arena.width / cell_size).floor() as usize).max(1);
        let rows = ((arena.height / cell_size).floor() as usize).max(1);
        Self {
            cell_w: arena.width / cols as f64,
            cell_h: arena.height / rows as f64,
            cols,
            rows,
            wrap: arena.is_toroidal(),
            cell_offsets: vec![0; cols * rows + 1],
            agent_indices: Vec::new(),
        }
    }

    /// Flat cell index of a position; coordinates on or past the far edge land in the last cell.
    #[inline]
    pub fn get_cell_idx(&self, p: Vec2) -> Option<usize> {
        if !p.is_finite() {
            return None;
        }
        let cx = ((p.x / self.cell_w).floor().max(0.0) as usize).min(self.cols - 1);
        let cy = ((p.y / self.cell_h).floor().max(0.0) as usize).min(self.rows - 1);
        Some(cy * self.cols + cx)
    }

    /// Rebuilds the index. Agent `i` is `positions[i]`.
    pub fn build(&mut self, positions: &[Vec2]) {
        let cell_count = self.cols * self.rows;

        let atomic_counts: Vec<AtomicUsize> =
            (0..cell_count).map(|_| AtomicUsize::new(0)).collect();
        positions.par_iter().for_each(|&p| {
            if let Some(idx) = self.get_cell_idx(p) {
                atomic_counts[idx].fetch_add(1, AtomicOrdering::Relaxed);
            }
        });
        let counts: Vec<usize> = atomic_counts.into_iter().map(|a| a.into_inner()).collect();

        self.cell_offsets.resize(cell_count + 1, 0);
        let mut total = 0;
        for (i, &count) in counts.iter().enumerate() {
            self.cell_offsets[i] = total;
            total += count;
        }
        self.cell_offsets[cell_count] = total;

        self.agent_indices.resize(total, 0);
        let mut cursor = self.cell_offsets[..cell_count].to_vec();
        for (agent_idx, &p) in positions.iter().enumerate() {
            if let Some(cell_idx) = self.get_cell_idx(p) {
                self.agent_indices[cursor[cell_idx]] = agent_idx;
                cursor[cell_idx] += 1;
            }
        }
    }

    /// Column (or row) indices touched by `[lo, hi]`, wrapped or clipped.
    fn axis_range(&self, lo: f64, hi: f64, cell: f64, count: usize) -> Vec<usize> {
        let min_c = (lo / cell).floor() as i64;
        let max_c = (hi / cell).floor() as i64;
        if self.wrap {
            if max_c - min_c + 1 >= count as i64 {
                (0..count).collect()
            } else {
                (min_c..=max_c)
                    .map(|c| c.rem_euclid(count as i64) as usize)
                    .collect()
            }
        } else {
            let lo = min_c.max(0);
            let hi = max_c.min(count as i64 - 1);
            if lo > hi {
                Vec::new()
            } else {
                (lo as usize..=hi as usize).collect()
            }
        }
    }

    /// Calls `callback` for every agent in a cell overlapping the query box.
    ///
    /// Candidates are a superset; callers filter by exact distance.
    pub fn query_callback<F>(&self, center: Vec2, radius: f64, mut callback: F)
    where
        F: FnMut(usize),
    {
        if !center.is_finite() {
            return;
        }
        let xs = self.axis_range(center.x - radius, center.x + radius, self.cell_w, self.cols);
        let ys = self.axis_range(center.y - radius, center.y + radius, self.cell_h, self.rows);
        for &cy in &ys {
            for &cx in &xs {
                let cell_idx = cy * self.cols + cx;
                let start = self.cell_offsets[cell_idx];
                let end = self.cell_offsets[cell_idx + 1];
                for &agent_idx in &self.agent_indices[start..end] {
                    callback(agent_idx);
                }
            }
        }
    }

    /// Entities within `radius` of `center` under the arena's distance, sorted by index.
    pub fn query_into(&self, center: Vec2, radius: f64, result: &mut Vec<usize>) {
        result.clear();
        self.query_callback(center, radius, |idx| result.push(idx));
        result.sort_unstable();
    }

    /// Like [`SpatialHash::query_into`] but keeps only entities strictly closer than `radius`.
    pub fn query_within(
        &self,
        arena: &Arena,
        positions: &[Vec2],
        center: Vec2,
        radius: f64,
        result: &mut Vec<usize>,
    ) {
        self.query_into(center, radius, result);
        let r2 = radius * radius;
        result.retain(|&idx| arena.relative(center, positions[idx]).length_squared() < r2);
    }
}
