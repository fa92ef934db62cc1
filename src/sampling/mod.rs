//! Uniform point sampling inside polygons
//!
//! Rejection sampling over the bounding box: candidates are drawn uniformly in
//! the box and kept only if they fall strictly inside the polygon. Every
//! sampler draws from a caller-provided [`ChaCha8Rng`], so a fixed seed
//! reproduces the same points.

mod gpu;

pub use gpu::GpuSampler;

use geo::{Contains, Coord, Polygon, Rect};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::error::PartitionError;
use crate::geometry;

/// A point strictly inside the polygon it was drawn for
pub type SamplePoint = Coord<f64>;

/// Largest candidate batch drawn by the CPU sampler
pub const CPU_BATCH_LIMIT: usize = 1000;

/// Source of sample sites for Voronoi tessellation
pub trait PointSampler: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Draw up to `count` points strictly inside `polygon`
    ///
    /// May return fewer points than requested (including none) when the
    /// attempt budget runs out or the polygon is degenerate.
    fn sample(
        &self,
        polygon: &Polygon<f64>,
        count: usize,
        rng: &mut ChaCha8Rng,
    ) -> Vec<SamplePoint>;

    /// Like [`sample`](Self::sample), also pushing onto `issues` any error
    /// the sampler recovered from mid-call
    fn sample_with_issues(
        &self,
        polygon: &Polygon<f64>,
        count: usize,
        rng: &mut ChaCha8Rng,
        issues: &mut Vec<PartitionError>,
    ) -> Vec<SamplePoint> {
        let _ = issues;
        self.sample(polygon, count, rng)
    }
}

/// Bounding box to sample from, `None` when sampling is pointless
///
/// Degenerate extents and non-finite coordinates both give `None`.
pub fn sampling_frame(polygon: &Polygon<f64>) -> Option<Rect<f64>> {
    if geometry::is_degenerate(polygon) {
        return None;
    }
    let rect = geometry::bounds(polygon)?;
    let finite = [rect.min().x, rect.min().y, rect.max().x, rect.max().y]
        .iter()
        .all(|v| v.is_finite());
    finite.then_some(rect)
}

/// Keep the candidates inside `polygon` until `points` holds `count`
pub(crate) fn accept_into(
    polygon: &Polygon<f64>,
    candidates: impl IntoIterator<Item = Coord<f64>>,
    points: &mut Vec<Coord<f64>>,
    count: usize,
) {
    for candidate in candidates {
        if points.len() >= count {
            break;
        }
        if polygon.contains(&candidate) {
            points.push(candidate);
        }
    }
}

/// Uniform point in `rect` from two unit samples
#[inline]
pub(crate) fn scale_to_frame(rect: &Rect<f64>, u: f64, v: f64) -> Coord<f64> {
    Coord {
        x: rect.min().x + u * rect.width(),
        y: rect.min().y + v * rect.height(),
    }
}

/// Host rejection sampler
#[derive(Debug, Clone, Copy)]
pub struct CpuSampler {
    /// Attempts allowed per requested point
    pub attempt_multiplier: usize,
}

impl Default for CpuSampler {
    fn default() -> Self {
        Self {
            attempt_multiplier: 1000,
        }
    }
}

impl CpuSampler {
    pub fn new(attempt_multiplier: usize) -> Self {
        Self {
            attempt_multiplier: attempt_multiplier.max(1),
        }
    }

    /// Top `points` up to `count`, spending at most `budget` candidates
    pub(crate) fn fill(
        &self,
        polygon: &Polygon<f64>,
        rect: &Rect<f64>,
        points: &mut Vec<Coord<f64>>,
        count: usize,
        budget: usize,
        rng: &mut ChaCha8Rng,
    ) {
        let mut attempts = 0usize;

        while points.len() < count && attempts < budget {
            let remaining = count - points.len();
            let batch = (2 * remaining).min(CPU_BATCH_LIMIT).min(budget - attempts);

            let candidates: Vec<Coord<f64>> = (0..batch)
                .map(|_| scale_to_frame(rect, rng.gen::<f64>(), rng.gen::<f64>()))
                .collect();
            accept_into(polygon, candidates, points, count);
            attempts += batch;
        }

        if points.len() < count {
            tracing::debug!(
                requested = count,
                produced = points.len(),
                attempts,
                "cpu sampling budget exhausted"
            );
        }
    }
}

impl PointSampler for CpuSampler {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn sample(
        &self,
        polygon: &Polygon<f64>,
        count: usize,
        rng: &mut ChaCha8Rng,
    ) -> Vec<SamplePoint> {
        let rect = match sampling_frame(polygon) {
            Some(r) if count > 0 => r,
            _ => return Vec::new(),
        };

        let mut points = Vec::with_capacity(count);
        let budget = count.saturating_mul(self.attempt_multiplier);
        self.fill(polygon, &rect, &mut points, count, budget, rng);
        points
    }
}
