//! Partition orchestration
//!
//! Turns entities into zones: sizing picks a zone count, the dispatch decision
//! picks a sampler, and each polygon part goes through sampling, relaxation and
//! tessellation with a recovery path for every way that can fail.

use geo::{Area, Polygon};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::time::{Duration, Instant};

use crate::config::{PartitionConfig, TessellationMethod};
use crate::dispatch::{
    DeviceProbe, DispatchController, DispatchDecision, HardwareState, SystemProbe,
};
use crate::entity::{Entity, FeatureCollection, PartitionResult, Zone};
use crate::error::PartitionError;
use crate::geometry;
use crate::pool::{self, JobOutcome};
use crate::sampling::PointSampler;
use crate::sizing::part_counts;
use crate::tessellation::{relax, tessellate_grid, tessellate_voronoi};

/// Result of partitioning one entity of a batch
#[derive(Debug, Clone, PartialEq)]
pub enum EntityOutcome {
    Completed(PartitionResult),
    Failed { entity: String, error: PartitionError },
}

impl EntityOutcome {
    /// Name of the entity this outcome belongs to
    pub fn entity(&self) -> &str {
        match self {
            EntityOutcome::Completed(result) => &result.entity,
            EntityOutcome::Failed { entity, .. } => entity,
        }
    }
}

/// Everything a batch run produced
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    /// Per-entity outcomes: completion order on the CPU, submission order on the GPU
    pub outcomes: Vec<EntityOutcome>,

    /// Hardware the batch ran on
    pub hardware: HardwareState,

    /// Run-level warnings, such as a required GPU that could not be found
    pub warnings: Vec<String>,
}

impl BatchReport {
    pub fn completed(&self) -> impl Iterator<Item = &PartitionResult> {
        self.outcomes.iter().filter_map(|o| match o {
            EntityOutcome::Completed(result) => Some(result),
            EntityOutcome::Failed { .. } => None,
        })
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &PartitionError)> {
        self.outcomes.iter().filter_map(|o| match o {
            EntityOutcome::Failed { entity, error } => Some((entity.as_str(), error)),
            EntityOutcome::Completed(_) => None,
        })
    }

    /// Total number of zones over the completed entities
    pub fn zone_count(&self) -> usize {
        self.completed().map(|r| r.zones.len()).sum()
    }

    /// Gather the zones of every completed entity into one collection
    pub fn into_feature_collection(self, region_name: impl Into<String>) -> FeatureCollection {
        let results = self.outcomes.into_iter().filter_map(|o| match o {
            EntityOutcome::Completed(result) => Some(result),
            EntityOutcome::Failed { .. } => None,
        });
        FeatureCollection::from_results(region_name, results)
    }
}

/// Splits entities into zones according to a [`PartitionConfig`]
///
/// # Examples
///
/// ```
/// use geo::polygon;
/// use rust_voronoi_zones::*;
///
/// let config = PartitionConfigBuilder::new()
///     .seed(42)
///     .hardware(HardwarePreference::Cpu)
///     .build()
///     .unwrap();
/// let partitioner = Partitioner::new(config);
///
/// let square = polygon![
///     (x: 0.0, y: 0.0),
///     (x: 0.02, y: 0.0),
///     (x: 0.02, y: 0.02),
///     (x: 0.0, y: 0.02),
///     (x: 0.0, y: 0.0),
/// ];
/// let result = partitioner.partition(&Entity::new("Village", "28001", square));
/// assert!(!result.zones.is_empty());
/// assert!(result.zones[0].name.starts_with("Village - Zone "));
/// ```
#[derive(Debug, Clone)]
pub struct Partitioner {
    config: PartitionConfig,
    decision: DispatchDecision,
}

impl Partitioner {
    /// Create a partitioner, probing this machine for an accelerator
    pub fn new(config: PartitionConfig) -> Self {
        Self::with_probe(config, &SystemProbe)
    }

    /// Create a partitioner using `probe` to look for an accelerator
    pub fn with_probe(config: PartitionConfig, probe: &dyn DeviceProbe) -> Self {
        let decision = DispatchController::new(config.hardware).select(probe);
        Self::with_decision(config, decision)
    }

    /// Create a partitioner with a hardware decision taken elsewhere
    pub fn with_decision(config: PartitionConfig, decision: DispatchDecision) -> Self {
        Self { config, decision }
    }

    #[inline]
    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    #[inline]
    pub fn decision(&self) -> &DispatchDecision {
        &self.decision
    }

    /// Zone count the sizing policy assigns to `entity`
    pub fn target_count(&self, entity: &Entity) -> usize {
        let area = geometry::area_km2(&entity.geometry, self.config.km_per_degree);
        self.config.sizing.target_zone_count(area, entity.population)
    }

    /// Partition `entity` with the configured method, count and seed
    pub fn partition(&self, entity: &Entity) -> PartitionResult {
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let count = self.target_count(entity);
        self.partition_with(entity, self.config.method, count, &mut rng)
    }

    /// Partition `entity` into about `count` zones with an explicit method
    pub fn partition_with(
        &self,
        entity: &Entity,
        method: TessellationMethod,
        count: usize,
        rng: &mut ChaCha8Rng,
    ) -> PartitionResult {
        let sampler = self.decision.sampler(self.config.sample_attempt_multiplier);
        let result = partition_entity(
            entity,
            method,
            count,
            sampler.as_ref(),
            self.config.relaxation_iterations,
            rng,
        );
        self.decision.release();
        result
    }

    /// Partition a batch of entities
    ///
    /// On the GPU entities run one at a time in submission order, releasing
    /// device memory after each. On the CPU they run on a pool of
    /// `min(max_cpu_workers, entities.len())` workers. A timed-out or
    /// panicking entity is reported as failed and the batch carries on.
    pub fn partition_all(&self, entities: Vec<Entity>) -> BatchReport {
        let start = Instant::now();
        let total = entities.len();
        let timeout = self.config.entity_timeout;

        let jobs: Vec<(String, (usize, Entity))> = entities
            .into_iter()
            .enumerate()
            .map(|(index, entity)| (entity.name.clone(), (index, entity)))
            .collect();

        let sampler = self.decision.sampler(self.config.sample_attempt_multiplier);
        let method = self.config.method;
        let iterations = self.config.relaxation_iterations;
        let seed = self.config.seed;
        let sizing = self.config.sizing.clone();
        let km_per_degree = self.config.km_per_degree;

        let work = move |(index, entity): (usize, Entity)| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(index as u64));
            let area = geometry::area_km2(&entity.geometry, km_per_degree);
            let count = sizing.target_zone_count(area, entity.population);
            partition_entity(&entity, method, count, sampler.as_ref(), iterations, &mut rng)
        };

        let hardware = self.decision.state();
        let outcomes = match hardware {
            HardwareState::Gpu => {
                pool::run_sequential(jobs, timeout, work, || self.decision.release())
            }
            _ => {
                let workers = self.config.max_cpu_workers.min(total).max(1);
                tracing::debug!(workers, entities = total, "starting cpu pool");
                pool::run_parallel(jobs, workers, timeout, work)
            }
        };

        let outcomes: Vec<EntityOutcome> = outcomes
            .into_iter()
            .map(|(entity, outcome)| entity_outcome(entity, outcome, timeout))
            .collect();

        let report = BatchReport {
            outcomes,
            hardware,
            warnings: self.decision.warning().map(str::to_string).into_iter().collect(),
        };

        tracing::info!(
            entities = total,
            failed = report.failed().count(),
            zones = report.zone_count(),
            hardware = %hardware,
            elapsed = ?start.elapsed(),
            "batch finished"
        );

        report
    }
}

/// Map a pool outcome to an entity outcome
fn entity_outcome(
    entity: String,
    outcome: JobOutcome<PartitionResult>,
    timeout: Duration,
) -> EntityOutcome {
    match outcome {
        JobOutcome::Finished(result) => EntityOutcome::Completed(result),
        JobOutcome::TimedOut => {
            tracing::warn!(entity = %entity, seconds = timeout.as_secs(), "entity timed out");
            EntityOutcome::Failed {
                error: PartitionError::EntityTimeout {
                    entity: entity.clone(),
                    seconds: timeout.as_secs(),
                },
                entity,
            }
        }
        JobOutcome::Panicked => {
            tracing::warn!(entity = %entity, "entity worker panicked");
            EntityOutcome::Failed {
                error: PartitionError::WorkerPanicked {
                    entity: entity.clone(),
                },
                entity,
            }
        }
    }
}

/// Partition every part of `entity` and label the resulting zones
///
/// The zone count is shared out across parts by area. Zones are labelled
/// `"<entity> - Zone <k>"`, or `"<entity> - Zone <part> - Zone <k>"` when the
/// entity has more than one part, both 1-based.
pub fn partition_entity(
    entity: &Entity,
    method: TessellationMethod,
    count: usize,
    sampler: &dyn PointSampler,
    iterations: usize,
    rng: &mut ChaCha8Rng,
) -> PartitionResult {
    let start = Instant::now();
    let parts = &entity.geometry.0;
    let areas: Vec<f64> = parts.iter().map(|p| p.unsigned_area()).collect();
    let counts = part_counts(count, &areas);
    let multipart = parts.len() > 1;

    let mut zones = Vec::new();
    let mut issues = Vec::new();

    for (part_idx, (part, &part_count)) in parts.iter().zip(counts.iter()).enumerate() {
        let pieces =
            partition_part(part, method, part_count, sampler, iterations, rng, &mut issues);

        for (k, piece) in pieces.into_iter().enumerate() {
            let name = if multipart {
                format!("{} - Zone {} - Zone {}", entity.name, part_idx + 1, k + 1)
            } else {
                format!("{} - Zone {}", entity.name, k + 1)
            };
            let id = uuid::Builder::from_random_bytes(rng.gen()).into_uuid();
            zones.push(Zone::new(id, name, piece));
        }
    }

    tracing::debug!(
        entity = %entity.name,
        method = %method,
        sampler = sampler.name(),
        requested = count,
        produced = zones.len(),
        issues = issues.len(),
        elapsed = ?start.elapsed(),
        "entity partitioned"
    );

    PartitionResult {
        entity: entity.name.clone(),
        produced: zones.len(),
        requested: count,
        zones,
        issues,
    }
}

/// Split one polygon part, recovering from every failure
///
/// Never returns an empty list; the part itself is the last resort.
fn partition_part(
    part: &Polygon<f64>,
    method: TessellationMethod,
    count: usize,
    sampler: &dyn PointSampler,
    iterations: usize,
    rng: &mut ChaCha8Rng,
    issues: &mut Vec<PartitionError>,
) -> Vec<Polygon<f64>> {
    if let Err(err) = geometry::validate(part) {
        tracing::warn!(error = %err, "keeping invalid part whole");
        issues.push(err);
        return vec![part.clone()];
    }
    if count <= 1 || geometry::is_degenerate(part) {
        return vec![part.clone()];
    }

    match method {
        TessellationMethod::Grid => grid_or_whole(part, count, issues),
        TessellationMethod::Voronoi => {
            let points = sampler.sample_with_issues(part, count, rng, issues);
            if points.len() < count {
                issues.push(PartitionError::InsufficientSamples {
                    requested: count,
                    produced: points.len(),
                });
            }

            match points.len() {
                0 => {
                    tracing::debug!(requested = count, "no samples, falling back to grid");
                    grid_or_whole(part, count, issues)
                }
                1 => vec![part.clone()],
                _ => {
                    let points = relax(points, part, iterations);
                    match tessellate_voronoi(&points, part) {
                        Ok(pieces) => pieces,
                        Err(err) => {
                            tracing::warn!(
                                error = %err,
                                "voronoi clipping failed, falling back to grid"
                            );
                            issues.push(err);
                            grid_or_whole(part, count, issues)
                        }
                    }
                }
            }
        }
    }
}

fn grid_or_whole(
    part: &Polygon<f64>,
    count: usize,
    issues: &mut Vec<PartitionError>,
) -> Vec<Polygon<f64>> {
    match tessellate_grid(part, count) {
        Ok(pieces) => pieces,
        Err(err) => {
            tracing::warn!(error = %err, "grid clipping failed, keeping part whole");
            issues.push(err);
            vec![part.clone()]
        }
    }
}
