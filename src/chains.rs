//! Intersection chains along sub-surface boundaries.
//!
//! Each boundary segment of a sub-surface is clipped to the host surface's
//! parametric rectangle and split into short straight pieces so the chain
//! follows the surface instead of cutting through it.

use crate::{
    config::{PARAM_EDGE_TOL, SUBSURF_SEGMENT_DIVISIONS},
    datatypes::{ChainPoint, IntersectionChain, Uw, UwBounds},
    structure::{FeaStructure, SubSurface},
    surface::Surface,
};

/// Both endpoints sit on the same min/max isoline of the domain.
fn on_same_domain_edge(uw0: &Uw, uw1: &Uw, b: &UwBounds) -> bool {
    let near = |a: f64, b: f64| (a - b).abs() < PARAM_EDGE_TOL;
    (near(uw0.x, b.max_u) && near(uw1.x, b.max_u))
        || (near(uw0.y, b.max_w) && near(uw1.y, b.max_w))
        || (near(uw0.x, b.min_u) && near(uw1.x, b.min_u))
        || (near(uw0.y, b.min_w) && near(uw1.y, b.min_w))
}

fn outside_domain(uw0: &Uw, uw1: &Uw, b: &UwBounds) -> bool {
    [uw0, uw1]
        .iter()
        .any(|p| p.x < b.min_u || p.y < b.min_w || p.x > b.max_u || p.y > b.max_w)
}

/// Closes a chain: it is kept only when it holds at least one segment.
fn retain_chain(
    chain: IntersectionChain,
    ss_index: usize,
    sub_surf: &SubSurface,
    chains: &mut Vec<IntersectionChain>,
) {
    if !chain.valid() {
        return;
    }
    let mut chain = chain;
    if sub_surf.intersection_cap {
        chain.ss_intersect_index = Some(ss_index);
    }
    chains.push(chain);
}

/// Chains of one sub-surface on one host surface.
pub fn sub_surface_chains(
    surf_index: usize,
    surf: &Surface,
    ss_index: usize,
    sub_surf: &SubSurface,
) -> Vec<IntersectionChain> {
    let b = surf.core.bounds();
    let segs = sub_surf.split_segments(&[b.min_u, b.max_u], &[b.min_w, b.max_w]);
    let is_poly = sub_surf.is_poly();

    let mut chains = Vec::new();
    let mut chain: Option<IntersectionChain> = None;
    let mut new_chain = true;

    for (uw0, uw1) in &segs {
        if new_chain {
            if let Some(done) = chain.take() {
                retain_chain(done, ss_index, sub_surf, &mut chains);
            }
            chain = Some(IntersectionChain::new(surf_index, surf_index));
            new_chain = false;
        }

        if outside_domain(uw0, uw1, &b) {
            new_chain = true;
            continue;
        }
        if is_poly && on_same_domain_edge(uw0, uw1, &b) {
            new_chain = true;
            continue;
        }

        let Some(current) = chain.as_mut() else {
            continue;
        };

        let n = SUBSURF_SEGMENT_DIVISIONS;
        let delta = (uw1 - uw0) / n as f64;
        let uw_at = |p: usize| {
            if p == n {
                *uw1
            } else {
                uw0 + delta * p as f64
            }
        };
        let chain_point = |uw: Uw| ChainPoint {
            pnt: surf.point(&uw),
            uw_a: uw,
            uw_b: uw,
        };

        for p in 1..=n {
            current.push_segment(chain_point(uw_at(p - 1)), chain_point(uw_at(p)));
        }
    }

    if let Some(done) = chain.take() {
        retain_chain(done, ss_index, sub_surf, &mut chains);
    }

    chains
}

/// Chains for every sub-surface of the structure on every surface of the
/// part hosting it.
pub fn build_sub_surf_int_chains(
    surfaces: &[Surface],
    structure: &FeaStructure,
) -> Vec<IntersectionChain> {
    let mut chains = Vec::new();
    for (s, surf) in surfaces.iter().enumerate() {
        for (ss, sub_surf) in structure.sub_surfaces.iter().enumerate() {
            if surf.fea_part_index != Some(sub_surf.parent_part) {
                continue;
            }
            chains.extend(sub_surface_chains(s, surf, ss, sub_surf));
        }
    }
    chains
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{structure::SubSurfaceShape, surface::PlanarPatch};
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Vector3};

    fn unit_skin() -> Surface {
        let mut surf = Surface::new(
            Box::new(PlanarPatch::new(
                Point3::origin(),
                Vector3::new(2.0, 0.0, 0.0),
                Vector3::new(0.0, 2.0, 0.0),
            )),
            0,
            false,
        );
        surf.fea_part_index = Some(0);
        surf
    }

    fn sub_surf(shape: SubSurfaceShape, cap: bool) -> SubSurface {
        SubSurface {
            name: "SS".to_owned(),
            parent_part: 0,
            shape,
            intersection_cap: cap,
        }
    }

    fn square(lo: f64, hi: f64) -> SubSurfaceShape {
        SubSurfaceShape::Polygon(vec![
            Uw::new(lo, lo),
            Uw::new(hi, lo),
            Uw::new(hi, hi),
            Uw::new(lo, hi),
        ])
    }

    #[test]
    fn interior_polygon_gives_one_closed_chain() {
        let surf = unit_skin();
        let chains = sub_surface_chains(0, &surf, 2, &sub_surf(square(0.25, 0.75), true));

        assert_eq!(chains.len(), 1);
        let chain = &chains[0];
        assert_eq!(chain.num_segments(), 4 * SUBSURF_SEGMENT_DIVISIONS);
        assert_eq!(chain.points[0].pnt, chain.points.last().unwrap().pnt);
        assert_eq!(chain.ss_intersect_index, Some(2));
        assert!(!chain.border);
        assert_relative_eq!(chain.points[0].pnt, Point3::new(0.5, 0.5, 0.0));
    }

    #[test]
    fn uncapped_chain_has_no_index() {
        let surf = unit_skin();
        let chains = sub_surface_chains(0, &surf, 0, &sub_surf(square(0.25, 0.75), false));
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].ss_intersect_index, None);
    }

    #[test]
    fn polygon_edge_on_domain_boundary_breaks_the_chain() {
        let surf = unit_skin();
        // bottom edge runs along w = 0
        let shape = SubSurfaceShape::Polygon(vec![
            Uw::new(0.2, 0.0),
            Uw::new(0.8, 0.0),
            Uw::new(0.8, 0.5),
            Uw::new(0.2, 0.5),
        ]);
        let chains = sub_surface_chains(0, &surf, 0, &sub_surf(shape, true));
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].num_segments(), 3 * SUBSURF_SEGMENT_DIVISIONS);
    }

    #[test]
    fn line_is_clipped_to_the_domain() {
        let surf = unit_skin();
        let shape = SubSurfaceShape::Line(Uw::new(-0.5, 0.5), Uw::new(0.5, 0.5));
        let chains = sub_surface_chains(0, &surf, 0, &sub_surf(shape, true));
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].num_segments(), SUBSURF_SEGMENT_DIVISIONS);
        assert_relative_eq!(chains[0].points[0].pnt, Point3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn polygon_outside_the_domain_gives_nothing() {
        let surf = unit_skin();
        let chains = sub_surface_chains(0, &surf, 0, &sub_surf(square(1.5, 2.5), true));
        assert!(chains.is_empty());
    }

    #[test]
    fn only_the_hosting_part_gets_chains() {
        let skin = unit_skin();
        let mut other = unit_skin();
        other.fea_part_index = Some(1);
        let structure = FeaStructure {
            name: "S".to_owned(),
            parts: Vec::new(),
            sub_surfaces: vec![sub_surf(square(0.25, 0.75), true)],
        };
        let chains = build_sub_surf_int_chains(&[skin, other], &structure);
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].surf_a, 0);
    }
}
