//! Voronoi cells clipped to a boundary polygon

use geo::{Coord, Polygon, Rect};
use glam::DVec2;

use super::diagram::VoronoiDiagram;
use crate::error::Result;
use crate::geometry;

/// Number of far-field sites appended before building the diagram
pub const FAR_FIELD_SITES: usize = 8;

/// Sites outside the bounding box that close every real cell
///
/// Placed at the corners and edge midpoints of the box expanded by one
/// width/height in each direction.
pub fn far_field_sites(rect: &Rect<f64>) -> [DVec2; FAR_FIELD_SITES] {
    let min = rect.min();
    let max = rect.max();
    let w = rect.width();
    let h = rect.height();
    let mid_x = (min.x + max.x) / 2.0;
    let mid_y = (min.y + max.y) / 2.0;

    [
        DVec2::new(min.x - w, min.y - h),
        DVec2::new(min.x - w, max.y + h),
        DVec2::new(max.x + w, min.y - h),
        DVec2::new(max.x + w, max.y + h),
        DVec2::new(min.x - w, mid_y),
        DVec2::new(max.x + w, mid_y),
        DVec2::new(mid_x, min.y - h),
        DVec2::new(mid_x, max.y + h),
    ]
}

/// Build the diagram of `points` plus the far-field sites of `polygon`
///
/// The real points keep their indices `0..points.len()`.
pub(crate) fn closed_diagram(
    points: &[Coord<f64>],
    polygon: &Polygon<f64>,
) -> Option<VoronoiDiagram> {
    let rect = geometry::bounds(polygon)?;
    let mut sites: Vec<DVec2> = points.iter().map(|c| DVec2::new(c.x, c.y)).collect();
    sites.extend(far_field_sites(&rect));
    Some(VoronoiDiagram::build(&sites))
}

/// Split `polygon` into the Voronoi cells of `points`
///
/// Sites whose cell is unbounded or degenerate contribute nothing, and a cell
/// that straddles a concavity yields one zone per part. Never returns an empty
/// list: with at most one point, or when every cell was discarded, the
/// polygon itself is the only zone.
///
/// # Errors
///
/// Returns `ClippingFailed` if a cell cannot be intersected with the polygon
pub fn tessellate_voronoi(
    points: &[Coord<f64>],
    polygon: &Polygon<f64>,
) -> Result<Vec<Polygon<f64>>> {
    if points.len() <= 1 {
        return Ok(vec![polygon.clone()]);
    }

    let diagram = match closed_diagram(points, polygon) {
        Some(d) => d,
        None => return Ok(vec![polygon.clone()]),
    };

    let mut zones = Vec::with_capacity(points.len());
    let mut discarded = 0usize;

    for site in 0..points.len() {
        let cell = match diagram.cell_polygon(site) {
            Some(cell) => cell,
            None => {
                discarded += 1;
                continue;
            }
        };

        let parts = geometry::clip(&cell, polygon)?;
        if parts.is_empty() {
            discarded += 1;
        }
        zones.extend(parts);
    }

    if discarded > 0 {
        tracing::debug!(sites = points.len(), discarded, "voronoi cells discarded");
    }

    if zones.is_empty() {
        return Ok(vec![polygon.clone()]);
    }

    Ok(zones)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::fixtures::{u_shape, unit_square};
    use geo::{Area, BooleanOps, Contains};

    fn coords(points: &[(f64, f64)]) -> Vec<Coord<f64>> {
        points.iter().map(|&(x, y)| Coord { x, y }).collect()
    }

    #[test]
    fn test_far_field_sites_surround_box() {
        let rect = Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 2.0, y: 1.0 });
        let sites = far_field_sites(&rect);

        assert!(sites.contains(&DVec2::new(-2.0, -1.0)));
        assert!(sites.contains(&DVec2::new(4.0, 2.0)));
        assert!(sites.contains(&DVec2::new(1.0, -1.0)));
        assert!(sites.contains(&DVec2::new(-2.0, 0.5)));
        for site in sites {
            let inside = site.x >= 0.0 && site.x <= 2.0 && site.y >= 0.0 && site.y <= 1.0;
            assert!(!inside);
        }
    }

    #[test]
    fn test_single_point_returns_polygon() {
        let square = unit_square();
        let zones = tessellate_voronoi(&coords(&[(0.5, 0.5)]), &square).unwrap();
        assert_eq!(zones, vec![square.clone()]);

        let zones = tessellate_voronoi(&[], &square).unwrap();
        assert_eq!(zones, vec![square]);
    }

    #[test]
    fn test_two_points_halve_the_square() {
        let square = unit_square();
        let zones = tessellate_voronoi(&coords(&[(0.25, 0.5), (0.75, 0.5)]), &square).unwrap();

        assert_eq!(zones.len(), 2);
        for zone in &zones {
            assert!((zone.unsigned_area() - 0.5).abs() < 1e-9);
        }
    }

    #[test]
    fn test_zones_cover_without_overlap() {
        let square = unit_square();
        let points = coords(&[(0.1, 0.2), (0.8, 0.3), (0.5, 0.9), (0.4, 0.5), (0.9, 0.9)]);
        let zones = tessellate_voronoi(&points, &square).unwrap();

        assert_eq!(zones.len(), points.len());
        let total: f64 = zones.iter().map(|z| z.unsigned_area()).sum();
        assert!((total - 1.0).abs() < 1e-9);

        for (i, a) in zones.iter().enumerate() {
            assert!(a.unsigned_area() > 0.0);
            for b in zones.iter().skip(i + 1) {
                assert!(a.intersection(b).unsigned_area() < 1e-9);
            }
        }
    }

    #[test]
    fn test_zones_keep_site_order() {
        let square = unit_square();
        let points = coords(&[(0.1, 0.1), (0.9, 0.9), (0.1, 0.9)]);
        let zones = tessellate_voronoi(&points, &square).unwrap();

        for (zone, point) in zones.iter().zip(points.iter()) {
            assert!(zone.contains(point));
        }
    }

    #[test]
    fn test_cell_straddling_concavity_splits() {
        // The upper site's cell is a band crossing both arms of the U
        let u = u_shape();
        let points = coords(&[(0.5, 0.3), (0.5, 1.8)]);
        let zones = tessellate_voronoi(&points, &u).unwrap();

        assert_eq!(zones.len(), 3);
        let total: f64 = zones.iter().map(|z| z.unsigned_area()).sum();
        assert!((total - u.unsigned_area()).abs() < 1e-9);
    }
}
