//! Accelerator-backed rejection sampling
//!
//! Candidates are generated on the device in large batches as unit-square
//! samples and mapped to the polygon's bounding box on the host, where the
//! containment test runs.

use geo::{Coord, Polygon};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

use super::{accept_into, sampling_frame, scale_to_frame, CpuSampler, PointSampler, SamplePoint};
use crate::dispatch::Accelerator;
use crate::error::PartitionError;

/// Largest candidate batch requested from the device
pub const DEVICE_BATCH_LIMIT: usize = 100_000;

/// Batches below this size are drawn on the host
pub const DEVICE_MIN_BATCH: usize = 1000;

/// Sampler that draws candidate batches from an [`Accelerator`]
///
/// A device error degrades only the current call: the points accepted so far
/// are kept, the remainder is filled on the CPU and the error is reported
/// through [`PointSampler::sample_with_issues`].
pub struct GpuSampler {
    accelerator: Arc<dyn Accelerator>,
    fallback: CpuSampler,
}

impl GpuSampler {
    pub fn new(accelerator: Arc<dyn Accelerator>, attempt_multiplier: usize) -> Self {
        Self {
            accelerator,
            fallback: CpuSampler::new(attempt_multiplier),
        }
    }
}

impl PointSampler for GpuSampler {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn sample(
        &self,
        polygon: &Polygon<f64>,
        count: usize,
        rng: &mut ChaCha8Rng,
    ) -> Vec<SamplePoint> {
        self.sample_with_issues(polygon, count, rng, &mut Vec::new())
    }

    fn sample_with_issues(
        &self,
        polygon: &Polygon<f64>,
        count: usize,
        rng: &mut ChaCha8Rng,
        issues: &mut Vec<PartitionError>,
    ) -> Vec<SamplePoint> {
        let rect = match sampling_frame(polygon) {
            Some(r) if count > 0 => r,
            _ => return Vec::new(),
        };

        let budget = count.saturating_mul(self.fallback.attempt_multiplier);
        let batch_size = count.saturating_mul(5).min(DEVICE_BATCH_LIMIT);
        let mut points = Vec::with_capacity(count);
        let mut attempts = 0usize;

        while points.len() < count && attempts < budget {
            let batch = batch_size.min(budget - attempts);

            if batch < DEVICE_MIN_BATCH {
                let candidates: Vec<Coord<f64>> = (0..batch)
                    .map(|_| scale_to_frame(&rect, rng.gen::<f64>(), rng.gen::<f64>()))
                    .collect();
                accept_into(polygon, candidates, &mut points, count);
            } else {
                match self.accelerator.uniform_batch(batch, rng.gen::<u64>()) {
                    Ok(unit) => {
                        let candidates = unit
                            .into_iter()
                            .map(|[u, v]| scale_to_frame(&rect, u as f64, v as f64));
                        accept_into(polygon, candidates, &mut points, count);
                    }
                    Err(err) => {
                        tracing::warn!(
                            device = %self.accelerator.name(),
                            error = %err,
                            accepted = points.len(),
                            "device batch failed, finishing on CPU"
                        );
                        issues.push(err);
                        self.fallback
                            .fill(polygon, &rect, &mut points, count, budget - attempts, rng);
                        return points;
                    }
                }
            }
            attempts += batch;

            // Past half the budget, take what we have
            if points.len() < count && !points.is_empty() && attempts * 2 > budget {
                tracing::debug!(
                    requested = count,
                    produced = points.len(),
                    attempts,
                    "accepting partial sample"
                );
                break;
            }
        }

        points
    }
}
