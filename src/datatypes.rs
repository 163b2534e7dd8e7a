use nalgebra::{Point3, Vector2};

/// Parametric (u, w) coordinate on a surface
pub type Uw = Vector2<f64>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UwBounds {
    pub min_u: f64,
    pub max_u: f64,
    pub min_w: f64,
    pub max_w: f64,
}

impl UwBounds {
    pub fn unit() -> UwBounds {
        UwBounds {
            min_u: 0.0,
            max_u: 1.0,
            min_w: 0.0,
            max_w: 1.0,
        }
    }

    pub fn contains(&self, uw: &Uw, tol: f64) -> bool {
        uw.x >= self.min_u - tol
            && uw.x <= self.max_u + tol
            && uw.y >= self.min_w - tol
            && uw.y <= self.max_w + tol
    }
}

/// A triangle of a surface's simplified mesh. Indices refer to the owning
/// mesh's point arrays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpTri {
    pub ind: [usize; 3],
    pub tags: Vec<i32>,
}

impl SimpTri {
    pub fn new(i0: usize, i1: usize, i2: usize) -> SimpTri {
        SimpTri {
            ind: [i0, i1, i2],
            tags: Vec::new(),
        }
    }
}

/// One tessellation point of an intersection chain with its parametric
/// location on both adjoining surfaces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainPoint {
    pub pnt: Point3<f64>,
    pub uw_a: Uw,
    pub uw_b: Uw,
}

impl ChainPoint {
    /// Parametric location on the given side of the chain.
    pub fn uw_on(&self, side: ChainSide) -> Uw {
        match side {
            ChainSide::A => self.uw_a,
            ChainSide::B => self.uw_b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainSide {
    A,
    B,
}

/// Ordered polyline where two surfaces (or a surface and one of its
/// sub-surface boundaries) meet.
#[derive(Debug, Clone, PartialEq)]
pub struct IntersectionChain {
    pub surf_a: usize,
    pub surf_b: usize,
    pub points: Vec<ChainPoint>,
    /// Outer domain boundary; never capped with beams
    pub border: bool,
    pub ss_intersect_index: Option<usize>,
}

impl IntersectionChain {
    pub fn new(surf_a: usize, surf_b: usize) -> IntersectionChain {
        IntersectionChain {
            surf_a,
            surf_b,
            points: Vec::new(),
            border: false,
            ss_intersect_index: None,
        }
    }

    pub fn num_segments(&self) -> usize {
        self.points.len().saturating_sub(1)
    }

    pub fn valid(&self) -> bool {
        self.num_segments() >= 1
    }

    /// Appends the segment `p0 -> p1`, sharing `p0` with the chain tail when
    /// the two are the same point.
    pub fn push_segment(&mut self, p0: ChainPoint, p1: ChainPoint) {
        match self.points.last() {
            Some(last) if (last.pnt - p0.pnt).norm() <= crate::config::COINCIDENCE_TOL => {}
            _ => self.points.push(p0),
        }
        self.points.push(p1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cp(x: f64) -> ChainPoint {
        ChainPoint {
            pnt: Point3::new(x, 0.0, 0.0),
            uw_a: Uw::new(x, 0.0),
            uw_b: Uw::new(x, 0.0),
        }
    }

    #[test]
    fn chain_segments_share_endpoints() {
        let mut chain = IntersectionChain::new(0, 0);
        assert!(!chain.valid());
        chain.push_segment(cp(0.0), cp(0.5));
        chain.push_segment(cp(0.5), cp(1.0));
        assert_eq!(chain.points.len(), 3);
        assert_eq!(chain.num_segments(), 2);
        assert!(chain.valid());
    }

    #[test]
    fn bounds_contain_with_tolerance() {
        let bounds = UwBounds::unit();
        assert!(bounds.contains(&Uw::new(1.0 + 1e-9, 0.5), 1e-6));
        assert!(!bounds.contains(&Uw::new(1.1, 0.5), 1e-6));
    }
}
