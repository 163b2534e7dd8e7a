use nalgebra::{Matrix2, Point3, Vector2, Vector3};

use crate::datatypes::{Uw, UwBounds};

/// Evaluation interface of the parametric surface kernel.
pub trait SurfaceCore: std::fmt::Debug {
    fn bounds(&self) -> UwBounds;

    fn point(&self, u: f64, w: f64) -> Point3<f64>;

    fn tangent_u(&self, u: f64, w: f64) -> Vector3<f64>;

    fn tangent_w(&self, u: f64, w: f64) -> Vector3<f64>;

    /// Unit normal, `tangent_u x tangent_w`
    fn normal(&self, u: f64, w: f64) -> Vector3<f64> {
        self.tangent_u(u, w)
            .cross(&self.tangent_w(u, w))
            .try_normalize(f64::EPSILON)
            .unwrap_or_else(Vector3::zeros)
    }

    fn bbox_center(&self) -> Point3<f64>;

    /// Closest parametric location of `pnt` and its distance from the surface.
    fn project(&self, pnt: &Point3<f64>) -> (Uw, f64);
}

/// Flat parallelogram `origin + u * u_edge + w * w_edge` over the unit square.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanarPatch {
    pub origin: Point3<f64>,
    pub u_edge: Vector3<f64>,
    pub w_edge: Vector3<f64>,
}

impl PlanarPatch {
    pub fn new(origin: Point3<f64>, u_edge: Vector3<f64>, w_edge: Vector3<f64>) -> PlanarPatch {
        PlanarPatch {
            origin,
            u_edge,
            w_edge,
        }
    }
}

impl SurfaceCore for PlanarPatch {
    fn bounds(&self) -> UwBounds {
        UwBounds::unit()
    }

    fn point(&self, u: f64, w: f64) -> Point3<f64> {
        self.origin + self.u_edge * u + self.w_edge * w
    }

    fn tangent_u(&self, _u: f64, _w: f64) -> Vector3<f64> {
        self.u_edge
    }

    fn tangent_w(&self, _u: f64, _w: f64) -> Vector3<f64> {
        self.w_edge
    }

    fn bbox_center(&self) -> Point3<f64> {
        self.point(0.5, 0.5)
    }

    fn project(&self, pnt: &Point3<f64>) -> (Uw, f64) {
        let d = pnt - self.origin;
        let gram = Matrix2::new(
            self.u_edge.dot(&self.u_edge),
            self.u_edge.dot(&self.w_edge),
            self.w_edge.dot(&self.u_edge),
            self.w_edge.dot(&self.w_edge),
        );
        let rhs = Vector2::new(self.u_edge.dot(&d), self.w_edge.dot(&d));

        let uw = match gram.try_inverse() {
            Some(inv) => inv * rhs,
            None => return (Uw::zeros(), f64::INFINITY),
        };
        let distance = (self.point(uw.x, uw.y) - pnt).norm();

        (uw, distance)
    }
}

/// A surface in the working list of one mesh generation run.
#[derive(Debug)]
pub struct Surface {
    pub core: Box<dyn SurfaceCore>,
    /// Negative for structural parts, non-negative for skin/body components
    pub comp_id: i32,
    pub fea_part_index: Option<usize>,
    pub flip: bool,
    pub base_tag: i32,
}

impl Surface {
    pub fn new(core: Box<dyn SurfaceCore>, comp_id: i32, flip: bool) -> Surface {
        Surface {
            core,
            comp_id,
            fea_part_index: None,
            flip,
            base_tag: 0,
        }
    }

    pub fn is_skin(&self) -> bool {
        self.comp_id >= 0
    }

    /// Unit normal honouring the flip flag.
    pub fn oriented_normal(&self, uw: &Uw) -> Vector3<f64> {
        let norm = self.core.normal(uw.x, uw.y);
        if self.flip {
            -norm
        } else {
            norm
        }
    }

    pub fn point(&self, uw: &Uw) -> Point3<f64> {
        self.core.point(uw.x, uw.y)
    }
}

/// Angle from `a` to `b`, negative when `a x b` points away from `reference`.
pub fn signed_angle(a: &Vector3<f64>, b: &Vector3<f64>, reference: &Vector3<f64>) -> f64 {
    let angle = a.angle(b);
    if a.cross(b).dot(reference) < 0.0 {
        -angle
    } else {
        angle
    }
}
