//! Finite elements and the node pool they draw their points from.

use std::fmt::{self, Write};

use nalgebra::{Point3, Vector3};

use crate::{coincidence::CoincidenceMap, structure::FeaProperty};

#[derive(Debug, Clone, PartialEq)]
pub struct FeaNode {
    pub pnt: Point3<f64>,
    /// 1-based export id, 0 until nodes are tagged
    pub index: usize,
    /// Structural parts referencing this point, ascending
    pub tags: Vec<usize>,
}

impl FeaNode {
    pub fn new(pnt: Point3<f64>) -> FeaNode {
        FeaNode {
            pnt,
            index: 0,
            tags: Vec::new(),
        }
    }

    pub fn add_tag(&mut self, part: usize) {
        if let Err(pos) = self.tags.binary_search(&part) {
            self.tags.insert(pos, part);
        }
    }

    pub fn has_only_index(&self, part: usize) -> bool {
        self.tags.len() == 1 && self.tags[0] == part
    }

    /// Fixed six-decimal coordinates keep each free-field value short.
    pub fn write_nastran(&self, out: &mut String) -> fmt::Result {
        writeln!(
            out,
            "GRID,{},,{:.6},{:.6},{:.6}",
            self.index, self.pnt.x, self.pnt.y, self.pnt.z
        )
    }

    pub fn write_calculix(&self, out: &mut String) -> fmt::Result {
        writeln!(out, "{},{},{},{}", self.index, self.pnt.x, self.pnt.y, self.pnt.z)
    }

    pub fn write_gmsh(&self, out: &mut String) -> fmt::Result {
        writeln!(out, "{} {} {} {}", self.index, self.pnt.x, self.pnt.y, self.pnt.z)
    }
}

/// Six-node shell: three corners followed by the mid-side points
/// 0-1, 1-2 and 2-0.
#[derive(Debug, Clone, PartialEq)]
pub struct FeaTri {
    pub nodes: [usize; 6],
    /// In-plane orientation, the surface u-tangent at the centroid
    pub orientation: Vector3<f64>,
    pub fea_part_index: Option<usize>,
    pub fea_ss_index: Option<usize>,
    /// Single region tag of the source triangle
    pub tag: Option<i32>,
}

impl FeaTri {
    pub fn create(
        pool: &mut Vec<FeaNode>,
        p0: Point3<f64>,
        p1: Point3<f64>,
        p2: Point3<f64>,
        orientation: Vector3<f64>,
    ) -> FeaTri {
        let start = pool.len();
        for p in [
            p0,
            p1,
            p2,
            nalgebra::center(&p0, &p1),
            nalgebra::center(&p1, &p2),
            nalgebra::center(&p2, &p0),
        ] {
            pool.push(FeaNode::new(p));
        }

        FeaTri {
            nodes: [start, start + 1, start + 2, start + 3, start + 4, start + 5],
            orientation,
            fea_part_index: None,
            fea_ss_index: None,
            tag: None,
        }
    }

    pub fn area(&self, pool: &[FeaNode]) -> f64 {
        let p0 = pool[self.nodes[0]].pnt;
        let p1 = pool[self.nodes[1]].pnt;
        let p2 = pool[self.nodes[2]].pnt;
        0.5 * (p1 - p0).cross(&(p2 - p0)).norm()
    }

    pub fn normal(&self, pool: &[FeaNode]) -> Vector3<f64> {
        let p0 = pool[self.nodes[0]].pnt;
        let p1 = pool[self.nodes[1]].pnt;
        let p2 = pool[self.nodes[2]].pnt;
        (p1 - p0)
            .cross(&(p2 - p0))
            .try_normalize(f64::EPSILON)
            .unwrap_or_else(Vector3::zeros)
    }
}

/// Two-node line element with its displacement (normal) vector.
#[derive(Debug, Clone, PartialEq)]
pub struct FeaBeam {
    pub nodes: [usize; 2],
    pub normal: Vector3<f64>,
    pub fea_part_index: Option<usize>,
    pub fea_ss_index: Option<usize>,
}

impl FeaBeam {
    pub fn create(
        pool: &mut Vec<FeaNode>,
        p0: Point3<f64>,
        p1: Point3<f64>,
        normal: Vector3<f64>,
    ) -> FeaBeam {
        let start = pool.len();
        pool.push(FeaNode::new(p0));
        pool.push(FeaNode::new(p1));

        FeaBeam {
            nodes: [start, start + 1],
            normal,
            fea_part_index: None,
            fea_ss_index: None,
        }
    }

    pub fn length(&self, pool: &[FeaNode]) -> f64 {
        (pool[self.nodes[1]].pnt - pool[self.nodes[0]].pnt).norm()
    }

    /// One `*NORMAL` record per node.
    pub fn write_calculix_normal(
        &self,
        out: &mut String,
        elem_id: usize,
        map: &CoincidenceMap,
    ) -> fmt::Result {
        for n in self.nodes {
            writeln!(
                out,
                "{},{},{},{},{}",
                elem_id,
                map.node_id(n),
                self.normal.x,
                self.normal.y,
                self.normal.z
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeaElement {
    Tri(FeaTri),
    Beam(FeaBeam),
}

impl FeaElement {
    pub fn is_beam(&self) -> bool {
        matches!(self, FeaElement::Beam(_))
    }

    pub fn fea_part_index(&self) -> Option<usize> {
        match self {
            FeaElement::Tri(t) => t.fea_part_index,
            FeaElement::Beam(b) => b.fea_part_index,
        }
    }

    pub fn fea_ss_index(&self) -> Option<usize> {
        match self {
            FeaElement::Tri(t) => t.fea_ss_index,
            FeaElement::Beam(b) => b.fea_ss_index,
        }
    }

    /// Pool indices of every node, corners first.
    pub fn nodes(&self) -> &[usize] {
        match self {
            FeaElement::Tri(t) => &t.nodes,
            FeaElement::Beam(b) => &b.nodes,
        }
    }

    pub fn corners(&self) -> &[usize] {
        match self {
            FeaElement::Tri(t) => &t.nodes[..3],
            FeaElement::Beam(b) => &b.nodes,
        }
    }

    /// Area x thickness x density for shells, length x section area x
    /// density for beams.
    pub fn compute_mass(&self, pool: &[FeaNode], property: &FeaProperty, density: f64) -> f64 {
        match self {
            FeaElement::Tri(t) => t.area(pool) * property.thickness() * density,
            FeaElement::Beam(b) => b.length(pool) * property.cross_section_area() * density,
        }
    }

    fn node_ids(&self, map: &CoincidenceMap) -> Vec<usize> {
        self.nodes().iter().map(|n| map.node_id(*n)).collect()
    }

    pub fn write_nastran(
        &self,
        out: &mut String,
        elem_id: usize,
        property_id: usize,
        map: &CoincidenceMap,
    ) -> fmt::Result {
        let ids = self.node_ids(map);
        match self {
            FeaElement::Tri(_) => writeln!(
                out,
                "CTRIA6,{},{},{},{},{},{},{},{}",
                elem_id, property_id, ids[0], ids[1], ids[2], ids[3], ids[4], ids[5]
            ),
            FeaElement::Beam(b) => writeln!(
                out,
                "CBEAM,{},{},{},{},{},{},{}",
                elem_id, property_id, ids[0], ids[1], b.normal.x, b.normal.y, b.normal.z
            ),
        }
    }

    pub fn write_calculix(&self, out: &mut String, elem_id: usize, map: &CoincidenceMap) -> fmt::Result {
        let ids: Vec<String> = self.node_ids(map).iter().map(|i| i.to_string()).collect();
        writeln!(out, "{},{}", elem_id, ids.join(","))
    }

    /// `physical` is the 1-based part group the element belongs to.
    pub fn write_gmsh(
        &self,
        out: &mut String,
        elem_id: usize,
        physical: usize,
        map: &CoincidenceMap,
    ) -> fmt::Result {
        let gmsh_type = match self {
            FeaElement::Tri(_) => 9,
            FeaElement::Beam(_) => 1,
        };
        let ids: Vec<String> = self.node_ids(map).iter().map(|i| i.to_string()).collect();
        writeln!(
            out,
            "{} {} 2 {} {} {}",
            elem_id,
            gmsh_type,
            physical,
            physical,
            ids.join(" ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::PropertyKind;
    use approx::assert_relative_eq;

    fn shell(thickness: f64) -> FeaProperty {
        FeaProperty {
            name: "shell".to_owned(),
            kind: PropertyKind::Shell { thickness },
            material: 0,
        }
    }

    fn beam_prop(area: f64) -> FeaProperty {
        FeaProperty {
            name: "cap".to_owned(),
            kind: PropertyKind::Beam {
                area,
                izz: 0.0,
                iyy: 0.0,
                izy: 0.0,
                ixx: 0.0,
            },
            material: 0,
        }
    }

    #[test]
    fn tri_has_midside_nodes() {
        let mut pool = Vec::new();
        let tri = FeaTri::create(
            &mut pool,
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
            Vector3::x(),
        );
        assert_eq!(pool.len(), 6);
        assert_eq!(pool[tri.nodes[3]].pnt, Point3::new(1.0, 0.0, 0.0));
        assert_eq!(pool[tri.nodes[4]].pnt, Point3::new(1.0, 1.0, 0.0));
        assert_eq!(pool[tri.nodes[5]].pnt, Point3::new(0.0, 1.0, 0.0));
        assert_relative_eq!(tri.area(&pool), 2.0);
        assert_relative_eq!(tri.normal(&pool), Vector3::z());
    }

    #[test]
    fn element_masses() {
        let mut pool = Vec::new();
        let tri = FeaElement::Tri(FeaTri::create(
            &mut pool,
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Vector3::x(),
        ));
        let beam = FeaElement::Beam(FeaBeam::create(
            &mut pool,
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, 3.0),
            Vector3::y(),
        ));

        assert_relative_eq!(tri.compute_mass(&pool, &shell(0.1), 10.0), 0.5);
        assert_relative_eq!(beam.compute_mass(&pool, &beam_prop(0.5), 2.0), 3.0);
        // shells carry no beam section and vice versa
        assert_eq!(beam.compute_mass(&pool, &shell(0.1), 2.0), 0.0);
        assert_eq!(beam.corners().len(), 2);
        assert_eq!(tri.corners().len(), 3);
        assert_eq!(tri.nodes().len(), 6);
    }

    #[test]
    fn node_tags_are_sorted_and_unique() {
        let mut node = FeaNode::new(Point3::origin());
        node.add_tag(2);
        node.add_tag(0);
        node.add_tag(2);
        assert_eq!(node.tags, vec![0, 2]);
        assert!(!node.has_only_index(0));

        let mut single = FeaNode::new(Point3::origin());
        single.add_tag(1);
        assert!(single.has_only_index(1));
    }

    #[test]
    fn element_cards() {
        let mut pool = Vec::new();
        let beam = FeaElement::Beam(FeaBeam::create(
            &mut pool,
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
        ));
        let pnts: Vec<Point3<f64>> = pool.iter().map(|n| n.pnt).collect();
        let map = CoincidenceMap::build(&pnts, 1e-8);

        let mut out = String::new();
        beam.write_nastran(&mut out, 7, 2, &map).unwrap();
        beam.write_calculix(&mut out, 7, &map).unwrap();
        beam.write_gmsh(&mut out, 7, 3, &map).unwrap();
        assert_eq!(out, "CBEAM,7,2,1,2,0,0,1\n7,1,2\n7 1 2 3 3 1 2\n");

        let mut normals = String::new();
        if let FeaElement::Beam(b) = &beam {
            b.write_calculix_normal(&mut normals, 7, &map).unwrap();
        }
        assert_eq!(normals, "7,1,0,0,1\n7,2,0,0,1\n");
    }

    #[test]
    fn grid_coordinates_are_fixed_width() {
        let mut node = FeaNode::new(Point3::new(0.1 + 0.2, -1.0 / 3.0, 12.5));
        node.index = 4;
        let mut out = String::new();
        node.write_nastran(&mut out).unwrap();
        assert_eq!(out, "GRID,4,,0.300000,-0.333333,12.500000\n");
    }
}
