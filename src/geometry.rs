//! Planar geometry helpers on top of `geo`
//!
//! Longitude/latitude are treated as Euclidean coordinates throughout.

use geo::{
    Area, BooleanOps, BoundingRect, Coord, Intersects, Line, LineString, MultiPolygon, Polygon,
    Rect,
};
use std::panic::{self, AssertUnwindSafe};

use crate::error::{PartitionError, Result};

/// Minimum bounding-box extent (in degrees) for a polygon to be subdivided
pub const MIN_EXTENT: f64 = 1e-5;

/// Bounding box of a polygon, `None` for an empty ring
#[inline]
pub fn bounds(polygon: &Polygon<f64>) -> Option<Rect<f64>> {
    polygon.bounding_rect()
}

/// True when the polygon is too thin in either axis to host multiple sites
pub fn is_degenerate(polygon: &Polygon<f64>) -> bool {
    match bounds(polygon) {
        Some(rect) => rect.width() < MIN_EXTENT || rect.height() < MIN_EXTENT,
        None => true,
    }
}

/// Planar area of a multipolygon converted to km² with a flat degree factor
pub fn area_km2(geometry: &MultiPolygon<f64>, km_per_degree: f64) -> f64 {
    geometry.unsigned_area() * km_per_degree * km_per_degree
}

/// Reject polygons the engine cannot subdivide safely
///
/// A polygon is accepted when every coordinate is finite, the exterior ring
/// has at least three distinct vertices enclosing a non-zero area, and no
/// ring crosses itself.
pub fn validate(polygon: &Polygon<f64>) -> Result<()> {
    let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors().iter());
    for (ring_idx, ring) in rings.enumerate() {
        if ring.coords().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
            return Err(PartitionError::InvalidGeometry(format!(
                "ring {} has non-finite coordinates",
                ring_idx
            )));
        }
        let vertices = ring_vertices(ring);
        if ring_idx == 0 && vertices.len() < 3 {
            return Err(PartitionError::InvalidGeometry(format!(
                "exterior ring has {} distinct vertices",
                vertices.len()
            )));
        }
        if ring_idx == 0 && Polygon::new(ring.clone(), Vec::new()).unsigned_area() == 0.0 {
            return Err(PartitionError::InvalidGeometry(
                "exterior ring encloses no area".to_string(),
            ));
        }
        if let Some((a, b)) = first_self_intersection(&vertices) {
            return Err(PartitionError::InvalidGeometry(format!(
                "ring {} self-intersects between segments {} and {}",
                ring_idx, a, b
            )));
        }
    }
    Ok(())
}

/// Ring vertices with the closing vertex and consecutive duplicates removed
fn ring_vertices(ring: &LineString<f64>) -> Vec<Coord<f64>> {
    let mut vertices: Vec<Coord<f64>> = Vec::with_capacity(ring.0.len());
    for &c in ring.coords() {
        if vertices.last() != Some(&c) {
            vertices.push(c);
        }
    }
    while vertices.len() > 1 && vertices.first() == vertices.last() {
        vertices.pop();
    }
    vertices
}

/// Find a pair of non-adjacent ring segments that touch or cross
///
/// Segments are swept in order of their minimum x so only pairs with
/// overlapping x ranges are tested.
fn first_self_intersection(vertices: &[Coord<f64>]) -> Option<(usize, usize)> {
    let n = vertices.len();
    if n < 4 {
        return None;
    }

    let segments: Vec<Line<f64>> = (0..n)
        .map(|i| Line::new(vertices[i], vertices[(i + 1) % n]))
        .collect();

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        min_x(&segments[a])
            .partial_cmp(&min_x(&segments[b]))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    for (pos, &i) in order.iter().enumerate() {
        let max_xi = max_x(&segments[i]);
        for &j in &order[pos + 1..] {
            if min_x(&segments[j]) > max_xi {
                break;
            }
            let adjacent = (i + 1) % n == j || (j + 1) % n == i;
            if !adjacent && segments[i].intersects(&segments[j]) {
                return Some((i.min(j), i.max(j)));
            }
        }
    }
    None
}

#[inline]
fn min_x(line: &Line<f64>) -> f64 {
    line.start.x.min(line.end.x)
}

#[inline]
fn max_x(line: &Line<f64>) -> f64 {
    line.start.x.max(line.end.x)
}

/// Intersect two polygons, splitting the result into positive-area parts
///
/// The boolean-ops sweep in `geo` can panic on numerically hostile input;
/// such a panic is reported as `ClippingFailed` instead of unwinding into the
/// caller.
pub fn clip(subject: &Polygon<f64>, boundary: &Polygon<f64>) -> Result<Vec<Polygon<f64>>> {
    let clipped = panic::catch_unwind(AssertUnwindSafe(|| subject.intersection(boundary)))
        .map_err(|payload| {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "boolean operation panicked".to_string());
            PartitionError::ClippingFailed(reason)
        })?;

    Ok(clipped
        .into_iter()
        .filter(|part| part.unsigned_area() > 0.0)
        .collect())
}

/// Axis-aligned rectangle as a polygon
pub fn rect_polygon(min: Coord<f64>, max: Coord<f64>) -> Polygon<f64> {
    Rect::new(min, max).to_polygon()
}
