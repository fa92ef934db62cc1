//! Polygon tessellation strategies
//!
//! Two interchangeable ways of cutting a polygon into zones:
//! - Voronoi: cells of (optionally relaxed) sample sites, clipped to the polygon
//! - Grid: a square lattice over the bounding box, clipped to the polygon

mod diagram;
mod grid;
mod lloyd;
mod voronoi;

pub use diagram::{VoronoiDiagram, OPEN_VERTEX};
pub use grid::tessellate_grid;
pub use lloyd::relax;
pub use voronoi::{far_field_sites, tessellate_voronoi, FAR_FIELD_SITES};
