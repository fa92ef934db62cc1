//! Voronoi-based partitioning of municipal boundaries into zones
//!
//! A standalone library that splits administrative areas (given as lon/lat
//! polygons) into game-style zones, using either clipped Voronoi cells of
//! relaxed random sites or a clipped square lattice.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use geo::polygon;
//! use rust_voronoi_zones::*;
//!
//! let config = PartitionConfigBuilder::new()
//!     .seed(42)
//!     .profile(Profile::Precise)
//!     .relaxation_iterations(5).unwrap()
//!     .build().unwrap();
//!
//! let partitioner = Partitioner::new(config);
//!
//! let boundary = polygon![
//!     (x: -3.71, y: 40.41),
//!     (x: -3.69, y: 40.41),
//!     (x: -3.69, y: 40.43),
//!     (x: -3.71, y: 40.43),
//!     (x: -3.71, y: 40.41),
//! ];
//! let entities = vec![Entity::new("Centro", "28079", boundary).with_population(140_000)];
//!
//! let report = partitioner.partition_all(entities);
//! println!("Generated {} zones on {}", report.zone_count(), report.hardware);
//! let collection = report.into_feature_collection("Comunidad de Madrid");
//! ```
//!
//! # Features
//!
//! - `serde`: Enables serialization for configuration, zones and collections
//! - `gpu`: Enables the `wgpu` sampling accelerator

// Modules
pub mod error;
pub mod config;
pub mod sizing;
pub mod geometry;
pub mod sampling;
pub mod tessellation;
pub mod dispatch;
pub mod pool;
pub mod entity;
pub mod partition;

// Re-export core types for convenience
pub use error::{PartitionError, Result};
pub use config::{
    HardwarePreference, PartitionConfig, PartitionConfigBuilder, Profile, TessellationMethod,
    KM_PER_DEGREE,
};
pub use sizing::{part_counts, target_zone_count, SizingPolicy};
pub use sampling::{CpuSampler, GpuSampler, PointSampler, SamplePoint};
pub use tessellation::{relax, tessellate_grid, tessellate_voronoi, VoronoiDiagram};
pub use dispatch::{
    Accelerator, DeviceProbe, DispatchController, DispatchDecision, HardwareState, SystemProbe,
};
pub use entity::{entities_in_region, Entity, FeatureCollection, PartitionResult, Zone};
pub use partition::{partition_entity, BatchReport, EntityOutcome, Partitioner};

#[cfg(feature = "gpu")]
pub use dispatch::WgpuAccelerator;

// Re-export geo geometry types for convenience
pub use geo::{Coord, MultiPolygon, Polygon};
