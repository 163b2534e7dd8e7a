//! Structural model store: structures, their parts and sub-surfaces, and the
//! shared property and material tables.

use nalgebra::Point3;

use crate::{
    datatypes::Uw,
    surface::{PlanarPatch, Surface},
};

/// Surface offset given to the first non-skin part; later parts count up from it.
pub const FEA_PART_COMP_OFFSET: i32 = -9999;

#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceSpec {
    pub comp_id: i32,
    pub patch: PlanarPatch,
    pub flip: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeaPart {
    pub name: String,
    pub is_skin: bool,
    pub surfaces: Vec<SurfaceSpec>,
    pub property: usize,
    pub cap_property: usize,
    pub intersection_cap: bool,
}

impl FeaPart {
    /// Hands out this part's geometry as working surfaces. Skin surfaces keep
    /// their own component ids; any other part is stamped with `comp_offset`.
    pub fn fetch_xfer_surfs(&self, comp_offset: i32) -> Vec<Surface> {
        self.surfaces
            .iter()
            .map(|spec| {
                let comp_id = if self.is_skin {
                    spec.comp_id
                } else {
                    comp_offset
                };
                Surface::new(Box::new(spec.patch.clone()), comp_id, spec.flip)
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubSurfaceShape {
    /// Closed boundary, last point connects back to the first
    Polygon(Vec<Uw>),
    Line(Uw, Uw),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubSurface {
    pub name: String,
    /// Part whose surfaces host this sub-surface
    pub parent_part: usize,
    pub shape: SubSurfaceShape,
    pub intersection_cap: bool,
}

impl SubSurface {
    pub fn is_poly(&self) -> bool {
        matches!(self.shape, SubSurfaceShape::Polygon(_))
    }

    pub fn boundary_segments(&self) -> Vec<(Uw, Uw)> {
        match &self.shape {
            SubSurfaceShape::Polygon(pts) => {
                let n = pts.len();
                if n < 2 {
                    return Vec::new();
                }
                (0..n).map(|i| (pts[i], pts[(i + 1) % n])).collect()
            }
            SubSurfaceShape::Line(p0, p1) => vec![(*p0, *p1)],
        }
    }

    /// Boundary segments split wherever they cross one of the given u or w
    /// isolines.
    pub fn split_segments(&self, u_lines: &[f64], w_lines: &[f64]) -> Vec<(Uw, Uw)> {
        let mut segs = self.boundary_segments();
        for u in u_lines {
            segs = split_segments_at(&segs, *u, 0);
        }
        for w in w_lines {
            segs = split_segments_at(&segs, *w, 1);
        }
        segs
    }

    /// Whether a parametric point falls inside this region. Open line
    /// sub-surfaces enclose nothing.
    pub fn subtag(&self, uw: &Uw) -> bool {
        match &self.shape {
            SubSurfaceShape::Polygon(pts) => point_in_polygon(uw, pts),
            SubSurfaceShape::Line(..) => false,
        }
    }
}

fn split_segments_at(segs: &[(Uw, Uw)], value: f64, axis: usize) -> Vec<(Uw, Uw)> {
    let mut out = Vec::with_capacity(segs.len());
    for (p0, p1) in segs {
        let d0 = p0[axis] - value;
        let d1 = p1[axis] - value;
        if d0 * d1 < 0.0 {
            let t = d0 / (d0 - d1);
            let mut mid = p0 + (p1 - p0) * t;
            mid[axis] = value;
            out.push((*p0, mid));
            out.push((mid, *p1));
        } else {
            out.push((*p0, *p1));
        }
    }
    out
}

/// Even-odd crossing test.
fn point_in_polygon(uw: &Uw, pts: &[Uw]) -> bool {
    let n = pts.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (pi, pj) = (pts[i], pts[j]);
        if (pi.y > uw.y) != (pj.y > uw.y) {
            let x_cross = pj.x + (uw.y - pj.y) * (pi.x - pj.x) / (pi.y - pj.y);
            if uw.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKind {
    Shell {
        thickness: f64,
    },
    Beam {
        area: f64,
        izz: f64,
        iyy: f64,
        izy: f64,
        ixx: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeaProperty {
    pub name: String,
    pub kind: PropertyKind,
    pub material: usize,
}

impl FeaProperty {
    pub fn thickness(&self) -> f64 {
        match self.kind {
            PropertyKind::Shell { thickness } => thickness,
            PropertyKind::Beam { .. } => 0.0,
        }
    }

    pub fn cross_section_area(&self) -> f64 {
        match self.kind {
            PropertyKind::Beam { area, .. } => area,
            PropertyKind::Shell { .. } => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeaMaterial {
    pub name: String,
    pub density: f64,
    pub elastic_modulus: f64,
    pub poisson_ratio: f64,
    pub thermal_expansion: f64,
}

impl FeaMaterial {
    pub fn shear_modulus(&self) -> f64 {
        self.elastic_modulus / (2.0 * (1.0 + self.poisson_ratio))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeaStructure {
    pub name: String,
    pub parts: Vec<FeaPart>,
    pub sub_surfaces: Vec<SubSurface>,
}

impl FeaStructure {
    pub fn num_parts(&self) -> usize {
        self.parts.len()
    }

    pub fn skin_index(&self) -> Option<usize> {
        self.parts.iter().position(|p| p.is_skin)
    }

    pub fn part(&self, index: usize) -> Option<&FeaPart> {
        self.parts.get(index)
    }

    pub fn part_name(&self, index: usize) -> &str {
        self.parts.get(index).map(|p| p.name.as_str()).unwrap_or("")
    }
}

/// Externally owned collection of structures plus the property and material
/// tables their parts reference by index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructureStore {
    pub structures: Vec<FeaStructure>,
    pub properties: Vec<FeaProperty>,
    pub materials: Vec<FeaMaterial>,
}

impl StructureStore {
    pub fn valid_struct_index(&self, index: usize) -> bool {
        index < self.structures.len()
    }

    pub fn property(&self, index: usize) -> Option<&FeaProperty> {
        self.properties.get(index)
    }

    pub fn material(&self, index: usize) -> Option<&FeaMaterial> {
        self.materials.get(index)
    }

    /// Density of the material behind a property, zero when unresolved.
    pub fn property_density(&self, property: usize) -> f64 {
        self.property(property)
            .and_then(|p| self.material(p.material))
            .map(|m| m.density)
            .unwrap_or(0.0)
    }
}

/// Planar rectangular surface spanned by two edge vectors from `origin`.
pub fn planar_spec(comp_id: i32, origin: [f64; 3], u_edge: [f64; 3], w_edge: [f64; 3]) -> SurfaceSpec {
    SurfaceSpec {
        comp_id,
        patch: PlanarPatch::new(
            Point3::from(origin),
            nalgebra::Vector3::from(u_edge),
            nalgebra::Vector3::from(w_edge),
        ),
        flip: false,
    }
}
