//! Planar Voronoi diagram from a Delaunay triangulation
//!
//! The Voronoi vertices are the circumcenters of the Delaunay triangles. A
//! site's cell is the ring of circumcenters of the triangles around it; sites
//! on the convex hull get an unbounded cell, marked with [`OPEN_VERTEX`].

use delaunator::{next_halfedge, Point, Triangulation, EMPTY};
use geo::algorithm::orient::{Direction, Orient};
use geo::{Coord, LineString, Polygon};
use glam::DVec2;

/// Sentinel vertex index closing an unbounded cell
pub const OPEN_VERTEX: usize = usize::MAX;

/// Voronoi diagram over a set of generator sites
#[derive(Debug, Clone)]
pub struct VoronoiDiagram {
    /// Generator sites, in input order
    pub sites: Vec<DVec2>,
    /// Diagram vertices (one circumcenter per Delaunay triangle)
    pub vertices: Vec<DVec2>,
    /// For each site, the ordered vertex indices of its cell
    ///
    /// Empty when the site was dropped by the triangulation (duplicate or
    /// fully collinear input). Contains `OPEN_VERTEX` when unbounded.
    pub cells: Vec<Vec<usize>>,
}

impl VoronoiDiagram {
    /// Build the diagram for `sites`
    pub fn build(sites: &[DVec2]) -> Self {
        let points: Vec<Point> = sites.iter().map(|s| Point { x: s.x, y: s.y }).collect();
        let triangulation = delaunator::triangulate(&points);

        let vertices = compute_circumcenters(sites, &triangulation);
        let incoming = build_point_halfedge_map(sites.len(), &triangulation);

        let cells = incoming
            .iter()
            .map(|&start| walk_cell(start, &triangulation))
            .collect();

        Self {
            sites: sites.to_vec(),
            vertices,
            cells,
        }
    }

    /// Number of generator sites
    #[inline]
    pub fn site_count(&self) -> usize {
        self.sites.len()
    }

    /// Vertex indices of a site's cell
    #[inline]
    pub fn cell(&self, site: usize) -> &[usize] {
        self.cells.get(site).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True if the cell is closed and has at least three vertices
    pub fn is_bounded(&self, site: usize) -> bool {
        let cell = self.cell(site);
        cell.len() >= 3 && !cell.contains(&OPEN_VERTEX)
    }

    /// The cell as a counter-clockwise polygon, `None` if unbounded or degenerate
    pub fn cell_polygon(&self, site: usize) -> Option<Polygon<f64>> {
        if !self.is_bounded(site) {
            return None;
        }

        let mut ring: Vec<Coord<f64>> = Vec::with_capacity(self.cell(site).len() + 1);
        for &idx in self.cell(site) {
            let v = self.vertices[idx];
            if !v.is_finite() {
                return None;
            }
            ring.push(Coord { x: v.x, y: v.y });
        }
        ring.push(ring[0]);

        Some(Polygon::new(LineString::new(ring), vec![]).orient(Direction::Default))
    }
}

/// Compute the circumcenter of every triangle
fn compute_circumcenters(sites: &[DVec2], triangulation: &Triangulation) -> Vec<DVec2> {
    triangulation
        .triangles
        .chunks_exact(3)
        .map(|tri| circumcenter(sites[tri[0]], sites[tri[1]], sites[tri[2]]))
        .collect()
}

/// Circumcenter of a planar triangle
///
/// Returns a non-finite point for collinear input; cells touching it are
/// treated as degenerate.
fn circumcenter(a: DVec2, b: DVec2, c: DVec2) -> DVec2 {
    let ab = b - a;
    let ac = c - a;
    let bl = ab.length_squared();
    let cl = ac.length_squared();
    let d = 0.5 / ab.perp_dot(ac);

    DVec2::new(
        a.x + (ac.y * bl - ab.y * cl) * d,
        a.y + (ab.x * cl - ac.x * bl) * d,
    )
}

/// Map each point to one halfedge ending at it
///
/// Hull halfedges are preferred so that walking around a hull point starts at
/// one open side and covers every adjacent triangle.
fn build_point_halfedge_map(point_count: usize, triangulation: &Triangulation) -> Vec<usize> {
    let mut map = vec![EMPTY; point_count];

    for e in 0..triangulation.triangles.len() {
        let endpoint = triangulation.triangles[next_halfedge(e)];
        if map[endpoint] == EMPTY || triangulation.halfedges[e] == EMPTY {
            map[endpoint] = e;
        }
    }

    map
}

/// Collect the triangles around a point, in rotation order
fn walk_cell(start: usize, triangulation: &Triangulation) -> Vec<usize> {
    if start == EMPTY {
        return Vec::new();
    }

    let mut cell = Vec::new();
    let mut incoming = start;
    loop {
        cell.push(incoming / 3);
        let outgoing = next_halfedge(incoming);
        incoming = triangulation.halfedges[outgoing];
        if incoming == EMPTY {
            cell.push(OPEN_VERTEX);
            break;
        }
        if incoming == start {
            break;
        }
    }

    cell
}
