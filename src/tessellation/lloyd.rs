//! Lloyd's relaxation for evenly spaced sites
//!
//! Each round moves every site to the centroid of its Voronoi cell clipped to
//! the boundary polygon, which spreads the sites into a honeycomb-like layout.

use geo::{Centroid, Contains, Coord, MultiPolygon, Point, Polygon};
use glam::DVec2;
use std::time::Instant;

use super::diagram::VoronoiDiagram;
use super::voronoi::closed_diagram;
use crate::geometry;

/// Apply `iterations` rounds of Lloyd's relaxation to `points`
///
/// # Algorithm
///
/// For each round:
/// 1. Build the Voronoi diagram of the points plus far-field sites
/// 2. Clip every bounded cell to `polygon`
/// 3. Move the site to the centroid of the clipped cell
///
/// A site keeps its position when its cell is unbounded, the clip is empty or
/// fails, or the centroid lands outside `polygon`. Every returned point is
/// therefore inside `polygon` whenever every input point was.
///
/// Fewer than three points are returned unchanged.
pub fn relax(
    mut points: Vec<Coord<f64>>,
    polygon: &Polygon<f64>,
    iterations: usize,
) -> Vec<Coord<f64>> {
    if points.len() <= 2 || iterations == 0 {
        return points;
    }

    let total_start = Instant::now();

    for iteration in 0..iterations {
        let iter_start = Instant::now();

        let diagram = match closed_diagram(&points, polygon) {
            Some(d) => d,
            None => break,
        };

        let mut max_displacement = 0.0f64;
        let mut moved = 0usize;

        for (site, point) in points.iter_mut().enumerate() {
            let Some(target) = cell_centroid(&diagram, site, polygon) else {
                continue;
            };

            let displacement =
                DVec2::new(target.x, target.y).distance(DVec2::new(point.x, point.y));
            max_displacement = max_displacement.max(displacement);
            moved += 1;
            *point = target;
        }

        tracing::debug!(
            iteration = iteration + 1,
            moved,
            max_displacement,
            elapsed = ?iter_start.elapsed(),
            "lloyd round"
        );
    }

    tracing::debug!(
        points = points.len(),
        iterations,
        elapsed = ?total_start.elapsed(),
        "lloyd finished"
    );

    points
}

/// Centroid of a site's cell clipped to `polygon`, if it is a valid new site
fn cell_centroid(
    diagram: &VoronoiDiagram,
    site: usize,
    polygon: &Polygon<f64>,
) -> Option<Coord<f64>> {
    let cell = diagram.cell_polygon(site)?;
    let parts = geometry::clip(&cell, polygon).ok()?;
    if parts.is_empty() {
        return None;
    }

    let centroid: Point<f64> = MultiPolygon::new(parts).centroid()?;
    let target = centroid.0;
    if !target.x.is_finite() || !target.y.is_finite() || !polygon.contains(&target) {
        return None;
    }

    Some(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::fixtures::{u_shape, unit_square};

    fn coords(points: &[(f64, f64)]) -> Vec<Coord<f64>> {
        points.iter().map(|&(x, y)| Coord { x, y }).collect()
    }

    #[test]
    fn test_two_points_unchanged() {
        let points = coords(&[(0.1, 0.1), (0.2, 0.2)]);
        let relaxed = relax(points.clone(), &unit_square(), 5);
        assert_eq!(relaxed, points);
    }

    #[test]
    fn test_zero_iterations_unchanged() {
        let points = coords(&[(0.1, 0.1), (0.2, 0.2), (0.3, 0.1)]);
        let relaxed = relax(points.clone(), &unit_square(), 0);
        assert_eq!(relaxed, points);
    }

    #[test]
    fn test_clustered_points_spread_out() {
        let square = unit_square();
        let points = coords(&[(0.1, 0.1), (0.15, 0.1), (0.1, 0.15), (0.15, 0.15)]);
        let relaxed = relax(points, &square, 5);

        assert_eq!(relaxed.len(), 4);
        let min_gap = relaxed
            .iter()
            .enumerate()
            .flat_map(|(i, a)| relaxed[i + 1..].iter().map(move |b| *a - *b))
            .map(|d| (d.x * d.x + d.y * d.y).sqrt())
            .fold(f64::INFINITY, f64::min);
        assert!(min_gap > 0.2, "sites should spread apart, min gap {}", min_gap);
    }

    #[test]
    fn test_relaxed_points_stay_inside() {
        let u = u_shape();
        let points = coords(&[
            (0.5, 0.5),
            (1.5, 0.5),
            (2.5, 0.5),
            (0.5, 1.5),
            (2.5, 1.5),
            (0.2, 1.9),
            (2.8, 1.9),
        ]);
        let relaxed = relax(points, &u, 5);

        assert_eq!(relaxed.len(), 7);
        for p in &relaxed {
            assert!(u.contains(p), "{:?} left the polygon", p);
        }
    }

    #[test]
    fn test_relaxation_determinism() {
        let square = unit_square();
        let points = coords(&[(0.1, 0.3), (0.7, 0.2), (0.4, 0.8), (0.9, 0.9), (0.5, 0.5)]);

        let a = relax(points.clone(), &square, 3);
        let b = relax(points, &square, 3);
        assert_eq!(a, b);
    }
}
