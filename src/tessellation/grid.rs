//! Square-lattice tessellation
//!
//! Deterministic: the same polygon and count always give the same zones.

use geo::{Coord, Polygon};

use crate::error::Result;
use crate::geometry;

/// Cut `polygon` along a `side × side` lattice over its bounding box
///
/// `side = ceil(sqrt(n))`, with `n == 0` treated as 1. Cells are visited
/// row-major (rows bottom to top, cells left to right), and each positive-area
/// part of a cell's intersection with the polygon becomes a zone. A polygon
/// thinner than [`geometry::MIN_EXTENT`] is returned as its only zone.
///
/// # Errors
///
/// Returns `ClippingFailed` if a lattice cell cannot be intersected with the
/// polygon
pub fn tessellate_grid(polygon: &Polygon<f64>, n: usize) -> Result<Vec<Polygon<f64>>> {
    if geometry::is_degenerate(polygon) {
        return Ok(vec![polygon.clone()]);
    }
    let rect = match geometry::bounds(polygon) {
        Some(r) => r,
        None => return Ok(vec![polygon.clone()]),
    };

    let side = lattice_side(n);
    let min = rect.min();
    let step_x = rect.width() / side as f64;
    let step_y = rect.height() / side as f64;

    let mut zones = Vec::with_capacity(side * side);
    for row in 0..side {
        for col in 0..side {
            let lo = Coord {
                x: min.x + col as f64 * step_x,
                y: min.y + row as f64 * step_y,
            };
            let hi = Coord {
                x: min.x + (col + 1) as f64 * step_x,
                y: min.y + (row + 1) as f64 * step_y,
            };
            let cell = geometry::rect_polygon(lo, hi);
            zones.extend(geometry::clip(&cell, polygon)?);
        }
    }

    if zones.is_empty() {
        return Ok(vec![polygon.clone()]);
    }

    Ok(zones)
}

/// Lattice side length for a requested zone count
#[inline]
fn lattice_side(n: usize) -> usize {
    (n.max(1) as f64).sqrt().ceil() as usize
}
