//! Triangulation seam. The production intersection/triangulation engine sits
//! behind [`Triangulator`]; [`GridTriangulator`] is a structured-grid stand-in
//! that is enough to drive the pipeline end to end.

use nalgebra::Point3;

use crate::{
    coincidence::PointIndex,
    config::{COINCIDENCE_TOL, PARAM_EDGE_TOL},
    datatypes::{ChainPoint, IntersectionChain, SimpTri, Uw},
    surface::Surface,
};

/// Produces per-surface triangulations and the intersection chains between
/// the loaded surfaces.
///
/// Every point of the returned chains and of `constraints` must be a node of
/// the mesh of each surface the chain lies on.
pub trait Triangulator {
    fn intersect(
        &mut self,
        surfaces: &[Surface],
        constraints: &[IntersectionChain],
    ) -> (Vec<SurfaceMesh>, Vec<IntersectionChain>);
}

/// Barycentric slack for a point lying on a triangle edge.
const BARY_TOL: f64 = 1e-9;

fn cross2(a: &Uw, b: &Uw) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Barycentric coordinates of `p` in the parametric triangle `a b c`.
fn barycentric(a: &Uw, b: &Uw, c: &Uw, p: &Uw) -> Option<[f64; 3]> {
    let det = cross2(&(b - a), &(c - a));
    if det.abs() <= f64::EPSILON {
        return None;
    }
    let lb = cross2(&(p - a), &(c - a)) / det;
    let lc = cross2(&(b - a), &(p - a)) / det;
    Some([1.0 - lb - lc, lb, lc])
}

/// Working and simplified triangulation of one surface.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurfaceMesh {
    uw: Vec<Uw>,
    pnts: Vec<Point3<f64>>,
    tris: Vec<[usize; 3]>,
    simp_uw: Vec<Uw>,
    simp_pnts: Vec<Point3<f64>>,
    simp_tris: Vec<SimpTri>,
}

fn tri_area_vec(p0: &Point3<f64>, p1: &Point3<f64>, p2: &Point3<f64>) -> nalgebra::Vector3<f64> {
    (p1 - p0).cross(&(p2 - p0)) * 0.5
}

impl SurfaceMesh {
    pub fn from_parts(uw: Vec<Uw>, pnts: Vec<Point3<f64>>, tris: Vec<[usize; 3]>) -> SurfaceMesh {
        SurfaceMesh {
            uw,
            pnts,
            tris,
            ..SurfaceMesh::default()
        }
    }

    pub fn num_tris(&self) -> usize {
        self.tris.len()
    }

    /// One refinement pass: points are re-evaluated on the surface from their
    /// parametric location and zero-area triangles are dropped.
    pub fn remesh(&mut self, surf: &Surface) {
        for (p, uw) in self.pnts.iter_mut().zip(self.uw.iter()) {
            *p = surf.point(uw);
        }
        let pnts = &self.pnts;
        self.tris.retain(|t| {
            tri_area_vec(&pnts[t[0]], &pnts[t[1]], &pnts[t[2]]).norm() > f64::EPSILON
        });
    }

    /// Drops triangles facing against the surface normal, returning how many
    /// were removed.
    pub fn remove_reversed_tris(&mut self, surf: &Surface) -> usize {
        let before = self.tris.len();
        let (pnts, uw) = (&self.pnts, &self.uw);
        self.tris.retain(|t| {
            let center = (uw[t[0]] + uw[t[1]] + uw[t[2]]) / 3.0;
            let tri_norm = tri_area_vec(&pnts[t[0]], &pnts[t[1]], &pnts[t[2]]);
            tri_norm.dot(&surf.core.normal(center.x, center.y)) >= 0.0
        });
        before - self.tris.len()
    }

    /// Makes `(uw, pnt)` a node of the working mesh, splitting the triangle
    /// that contains it, or both triangles sharing the edge it lies on.
    /// Returns the node index, or `None` when the point is outside the mesh.
    pub fn insert_point(&mut self, uw: Uw, pnt: Point3<f64>) -> Option<usize> {
        if let Some(i) = self
            .pnts
            .iter()
            .position(|p| (p - pnt).norm() <= COINCIDENCE_TOL)
        {
            return Some(i);
        }

        let hits: Vec<(usize, [f64; 3])> = self
            .tris
            .iter()
            .enumerate()
            .filter_map(|(t, tri)| {
                let [a, b, c] = tri.map(|i| self.uw[i]);
                barycentric(&a, &b, &c, &uw)
                    .filter(|l| l.iter().all(|x| *x >= -BARY_TOL))
                    .map(|l| (t, l))
            })
            .collect();
        if hits.is_empty() {
            return None;
        }

        let p = self.uw.len();
        self.uw.push(uw);
        self.pnts.push(pnt);

        for (t, l) in hits {
            let [a, b, c] = self.tris[t];
            let split = if l[2].abs() <= BARY_TOL {
                vec![[a, p, c], [p, b, c]]
            } else if l[0].abs() <= BARY_TOL {
                vec![[a, b, p], [a, p, c]]
            } else if l[1].abs() <= BARY_TOL {
                vec![[a, b, p], [p, b, c]]
            } else {
                vec![[a, b, p], [b, c, p], [c, a, p]]
            };
            self.tris[t] = split[0];
            self.tris.extend_from_slice(&split[1..]);
        }

        Some(p)
    }

    /// Copies the working mesh into the simplified representation.
    pub fn load_simp_tris(&mut self) {
        self.simp_uw = self.uw.clone();
        self.simp_pnts = self.pnts.clone();
        self.simp_tris = self
            .tris
            .iter()
            .map(|t| SimpTri::new(t[0], t[1], t[2]))
            .collect();
    }

    /// Releases the working mesh; the simplified mesh is kept.
    pub fn clear(&mut self) {
        self.uw.clear();
        self.pnts.clear();
        self.tris.clear();
    }

    /// Merges coincident points of the simplified mesh, then drops triangles
    /// that collapsed and repeated triangles carrying an identical tag set.
    pub fn condense_simp_tris(&mut self) {
        let mut index = PointIndex::new(COINCIDENCE_TOL);
        let mut new_uw = Vec::new();
        let remap: Vec<usize> = self
            .simp_pnts
            .iter()
            .zip(self.simp_uw.iter())
            .map(|(p, uw)| {
                let idx = index.find_or_insert(*p);
                if idx == new_uw.len() {
                    new_uw.push(*uw);
                }
                idx
            })
            .collect();

        let mut seen: std::collections::HashSet<([usize; 3], Vec<i32>)> =
            std::collections::HashSet::new();
        let mut tris = Vec::with_capacity(self.simp_tris.len());
        for tri in self.simp_tris.drain(..) {
            let ind = tri.ind.map(|i| remap[i]);
            if ind[0] == ind[1] || ind[1] == ind[2] || ind[0] == ind[2] {
                continue;
            }
            let mut key = ind;
            key.sort_unstable();
            if !seen.insert((key, tri.tags.clone())) {
                continue;
            }
            tris.push(SimpTri { ind, tags: tri.tags });
        }

        self.simp_pnts = index.points().to_vec();
        self.simp_uw = new_uw;
        self.simp_tris = tris;
    }

    pub fn simp_uw(&self) -> &[Uw] {
        &self.simp_uw
    }

    pub fn simp_pnts(&self) -> &[Point3<f64>] {
        &self.simp_pnts
    }

    pub fn simp_tris(&self) -> &[SimpTri] {
        &self.simp_tris
    }

    pub fn simp_tris_mut(&mut self) -> &mut Vec<SimpTri> {
        &mut self.simp_tris
    }
}

/// Structured-grid triangulator over each surface's parametric rectangle.
///
/// Boundary edges that lie on another surface become intersection chains
/// between the two; all other boundary edges become border chains. Crossings
/// through the interior of two surfaces are not detected.
///
/// Chain pieces running along a constant u or w add a grid line there, and
/// every chain point is then inserted as a node. Chains following a grid line
/// are meshed edge for edge; oblique chains only share their points.
#[derive(Debug, Clone)]
pub struct GridTriangulator {
    pub max_edge_len: f64,
    pub on_surface_tol: f64,
}

impl GridTriangulator {
    pub fn new(max_edge_len: f64) -> GridTriangulator {
        GridTriangulator {
            max_edge_len,
            on_surface_tol: 1e-6,
        }
    }

    fn divisions(&self, length: f64) -> usize {
        if self.max_edge_len <= 0.0 {
            return 1;
        }
        ((length / self.max_edge_len) - 1e-9).ceil().max(1.0) as usize
    }

    /// Number of grid divisions along u and w.
    fn grid_size(&self, surf: &Surface) -> (usize, usize) {
        let b = surf.core.bounds();
        let mid_u = 0.5 * (b.min_u + b.max_u);
        let mid_w = 0.5 * (b.min_w + b.max_w);
        let samples = 8;

        let mut len_u = 0.0;
        let mut len_w = 0.0;
        for i in 0..samples {
            let t0 = i as f64 / samples as f64;
            let t1 = (i + 1) as f64 / samples as f64;
            let u0 = b.min_u + (b.max_u - b.min_u) * t0;
            let u1 = b.min_u + (b.max_u - b.min_u) * t1;
            let w0 = b.min_w + (b.max_w - b.min_w) * t0;
            let w1 = b.min_w + (b.max_w - b.min_w) * t1;
            len_u += (surf.core.point(u1, mid_w) - surf.core.point(u0, mid_w)).norm();
            len_w += (surf.core.point(mid_u, w1) - surf.core.point(mid_u, w0)).norm();
        }

        (self.divisions(len_u), self.divisions(len_w))
    }

    fn grid_params(min: f64, max: f64, n: usize) -> Vec<f64> {
        (0..=n)
            .map(|i| min + (max - min) * i as f64 / n as f64)
            .collect()
    }

    /// Adds the interior values of `extra` to the sorted grid `params`.
    fn merge_lines(mut params: Vec<f64>, extra: &[f64]) -> Vec<f64> {
        let (min, max) = (params[0], params[params.len() - 1]);
        params.extend(
            extra
                .iter()
                .copied()
                .filter(|v| *v > min + PARAM_EDGE_TOL && *v < max - PARAM_EDGE_TOL),
        );
        params.sort_by(|a, b| a.total_cmp(b));
        params.dedup_by(|a, b| (*a - *b).abs() < PARAM_EDGE_TOL);
        params
    }

    pub fn triangulate(&self, surf: &Surface) -> SurfaceMesh {
        self.triangulate_conforming(surf, &[])
    }

    /// Grid mesh of `surf` carrying every point of `polylines`, each given as
    /// `(uw, pnt)` pairs on this surface.
    pub fn triangulate_conforming(
        &self,
        surf: &Surface,
        polylines: &[Vec<(Uw, Point3<f64>)>],
    ) -> SurfaceMesh {
        let b = surf.core.bounds();
        let (nu, nw) = self.grid_size(surf);

        let mut u_lines = Vec::new();
        let mut w_lines = Vec::new();
        for line in polylines {
            for pair in line.windows(2) {
                let (p, q) = (pair[0].0, pair[1].0);
                if (p.x - q.x).abs() < PARAM_EDGE_TOL {
                    u_lines.push(p.x);
                }
                if (p.y - q.y).abs() < PARAM_EDGE_TOL {
                    w_lines.push(p.y);
                }
            }
        }
        let us = Self::merge_lines(Self::grid_params(b.min_u, b.max_u, nu), &u_lines);
        let ws = Self::merge_lines(Self::grid_params(b.min_w, b.max_w, nw), &w_lines);

        let mut mesh = Self::grid_mesh(surf, &us, &ws);
        for line in polylines {
            for (uw, pnt) in line {
                mesh.insert_point(*uw, *pnt);
            }
        }
        mesh
    }

    fn grid_mesh(surf: &Surface, us: &[f64], ws: &[f64]) -> SurfaceMesh {
        let (nu, nw) = (us.len() - 1, ws.len() - 1);

        let mut uw = Vec::with_capacity(us.len() * ws.len());
        let mut pnts = Vec::with_capacity(us.len() * ws.len());
        for w in ws {
            for u in us {
                let p = Uw::new(*u, *w);
                pnts.push(surf.point(&p));
                uw.push(p);
            }
        }

        let at = |i: usize, j: usize| j * (nu + 1) + i;
        let mut tris = Vec::with_capacity(2 * nu * nw);
        for j in 0..nw {
            for i in 0..nu {
                tris.push([at(i, j), at(i + 1, j), at(i + 1, j + 1)]);
                tris.push([at(i, j), at(i + 1, j + 1), at(i, j + 1)]);
            }
        }

        SurfaceMesh::from_parts(uw, pnts, tris)
    }

    /// Parametric samples along the four boundary edges, walked
    /// counter-clockwise in (u, w).
    fn boundary_edges(&self, surf: &Surface) -> Vec<Vec<Uw>> {
        let b = surf.core.bounds();
        let (nu, nw) = self.grid_size(surf);
        let us = Self::grid_params(b.min_u, b.max_u, nu);
        let ws = Self::grid_params(b.min_w, b.max_w, nw);

        vec![
            us.iter().map(|u| Uw::new(*u, b.min_w)).collect(),
            ws.iter().map(|w| Uw::new(b.max_u, *w)).collect(),
            us.iter().rev().map(|u| Uw::new(*u, b.max_w)).collect(),
            ws.iter().rev().map(|w| Uw::new(b.min_u, *w)).collect(),
        ]
    }

    /// Parametric location of every sample on `other`, if all of them lie on it.
    fn edge_on_surface(&self, samples: &[Point3<f64>], other: &Surface) -> Option<Vec<Uw>> {
        let bounds = other.core.bounds();
        samples
            .iter()
            .map(|p| {
                let (uw, dist) = other.core.project(p);
                (dist <= self.on_surface_tol && bounds.contains(&uw, PARAM_EDGE_TOL)).then_some(uw)
            })
            .collect()
    }

    fn same_curve(a: &IntersectionChain, b: &IntersectionChain, tol: f64) -> bool {
        let pair_a = (a.surf_a.min(a.surf_b), a.surf_a.max(a.surf_b));
        let pair_b = (b.surf_a.min(b.surf_b), b.surf_a.max(b.surf_b));
        if pair_a != pair_b || a.points.len() < 2 || b.points.len() < 2 {
            return false;
        }
        let (a0, a1) = (a.points[0].pnt, a.points[a.points.len() - 1].pnt);
        let (b0, b1) = (b.points[0].pnt, b.points[b.points.len() - 1].pnt);
        ((a0 - b0).norm() <= tol && (a1 - b1).norm() <= tol)
            || ((a0 - b1).norm() <= tol && (a1 - b0).norm() <= tol)
    }

    pub fn build_chains(&self, surfaces: &[Surface]) -> Vec<IntersectionChain> {
        let mut chains: Vec<IntersectionChain> = Vec::new();

        for (a, surf) in surfaces.iter().enumerate() {
            for edge in self.boundary_edges(surf) {
                let samples: Vec<Point3<f64>> = edge.iter().map(|uw| surf.point(uw)).collect();
                let mut touched = false;

                for (b, other) in surfaces.iter().enumerate() {
                    if a == b {
                        continue;
                    }
                    let Some(uw_b) = self.edge_on_surface(&samples, other) else {
                        continue;
                    };
                    touched = true;

                    let mut chain = IntersectionChain::new(a, b);
                    chain.points = samples
                        .iter()
                        .zip(edge.iter().zip(uw_b.iter()))
                        .map(|(p, (ua, ub))| ChainPoint {
                            pnt: *p,
                            uw_a: *ua,
                            uw_b: *ub,
                        })
                        .collect();

                    if !chains
                        .iter()
                        .any(|c| !c.border && Self::same_curve(c, &chain, self.on_surface_tol))
                    {
                        chains.push(chain);
                    }
                }

                if !touched {
                    let mut chain = IntersectionChain::new(a, a);
                    chain.border = true;
                    chain.points = samples
                        .iter()
                        .zip(edge.iter())
                        .map(|(p, uw)| ChainPoint {
                            pnt: *p,
                            uw_a: *uw,
                            uw_b: *uw,
                        })
                        .collect();
                    chains.push(chain);
                }
            }
        }

        chains
    }
}

/// The points of every non-border chain lying on surface `s`.
fn polylines_on(s: usize, chains: &[&IntersectionChain]) -> Vec<Vec<(Uw, Point3<f64>)>> {
    chains
        .iter()
        .filter(|c| !c.border)
        .flat_map(|c| {
            let mut lines: Vec<Vec<(Uw, Point3<f64>)>> = Vec::new();
            if c.surf_a == s {
                lines.push(c.points.iter().map(|p| (p.uw_a, p.pnt)).collect());
            }
            if c.surf_b == s && c.surf_a != s {
                lines.push(c.points.iter().map(|p| (p.uw_b, p.pnt)).collect());
            }
            lines
        })
        .collect()
}

impl Triangulator for GridTriangulator {
    fn intersect(
        &mut self,
        surfaces: &[Surface],
        constraints: &[IntersectionChain],
    ) -> (Vec<SurfaceMesh>, Vec<IntersectionChain>) {
        let chains = self.build_chains(surfaces);
        let all: Vec<&IntersectionChain> = chains.iter().chain(constraints.iter()).collect();
        let meshes = surfaces
            .iter()
            .enumerate()
            .map(|(s, surf)| self.triangulate_conforming(surf, &polylines_on(s, &all)))
            .collect();
        (meshes, chains)
    }
}
