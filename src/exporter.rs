use std::{
    fmt::{self, Write as FmtWrite},
    io::Write,
    path::PathBuf,
};

use crate::{
    config::{ExportFormat, ExportSettings},
    element::FeaElement,
    error::FeaMeshError,
    mesh_mgr::{MassReport, MeshContext},
    structure::{FeaMaterial, FeaProperty, PropertyKind, StructureStore},
};

/// Outcome of one export pass. Failed formats leave no file behind.
#[derive(Debug, Default)]
pub struct ExportSummary {
    pub written: Vec<PathBuf>,
    pub failed: Vec<(ExportFormat, FeaMeshError)>,
}

impl ExportSummary {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Set and material names may not contain whitespace in CalculiX decks.
fn set_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

fn write_property_nastran(out: &mut String, id: usize, prop: &FeaProperty) -> fmt::Result {
    let mid = prop.material + 1;
    match prop.kind {
        PropertyKind::Shell { thickness } => writeln!(out, "PSHELL,{},{},{}", id, mid, thickness),
        PropertyKind::Beam {
            area,
            izz,
            iyy,
            izy,
            ixx,
        } => writeln!(
            out,
            "PBEAM,{},{},{},{},{},{},{}",
            id, mid, area, izz, iyy, izy, ixx
        ),
    }
}

fn write_material_nastran(out: &mut String, id: usize, mat: &FeaMaterial) -> fmt::Result {
    writeln!(
        out,
        "MAT1,{},{},{},{},{},{}",
        id,
        mat.elastic_modulus,
        mat.shear_modulus(),
        mat.poisson_ratio,
        mat.density,
        mat.thermal_expansion
    )
}

fn write_property_calculix(
    out: &mut String,
    elset: &str,
    prop: &FeaProperty,
    store: &StructureStore,
) -> fmt::Result {
    let material = store
        .material(prop.material)
        .map(|m| set_name(&m.name))
        .unwrap_or_default();
    match prop.kind {
        PropertyKind::Shell { thickness } => {
            writeln!(out, "*SHELL SECTION, ELSET={}, MATERIAL={}", elset, material)?;
            writeln!(out, "{}", thickness)
        }
        PropertyKind::Beam {
            area,
            izz,
            iyy,
            izy,
            ixx,
        } => {
            writeln!(
                out,
                "*BEAM SECTION, ELSET={}, MATERIAL={}, SECTION=GENERAL",
                elset, material
            )?;
            writeln!(out, "{},{},{},{},{}", area, izz, izy, iyy, ixx)
        }
    }
}

fn write_material_calculix(out: &mut String, mat: &FeaMaterial) -> fmt::Result {
    writeln!(out, "*MATERIAL, NAME={}", set_name(&mat.name))?;
    writeln!(out, "*DENSITY")?;
    writeln!(out, "{}", mat.density)?;
    writeln!(out, "*ELASTIC, TYPE=ISO")?;
    writeln!(out, "{}, {}", mat.elastic_modulus, mat.poisson_ratio)?;
    writeln!(out, "*EXPANSION, TYPE=ISO")?;
    writeln!(out, "{}", mat.thermal_expansion)
}

/// Bulk data deck: per part elements, then per part gridpoints, shared and
/// orphan gridpoints, properties and materials.
pub fn write_nastran(ctx: &MeshContext, store: &StructureStore) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "BEGIN BULK")?;

    let mut elem_id = 0;
    for (p, part) in ctx.structure.parts.iter().enumerate() {
        writeln!(out)?;
        writeln!(out, "${}", part.name)?;

        for element in ctx.part_elements(p).filter(|e| !e.is_beam()) {
            elem_id += 1;
            element.write_nastran(&mut out, elem_id, part.property + 1, &ctx.coincidence)?;
        }
        for element in ctx.part_elements(p).filter(|e| e.is_beam()) {
            elem_id += 1;
            element.write_nastran(&mut out, elem_id, part.cap_property + 1, &ctx.coincidence)?;
        }
    }

    for (p, part) in ctx.structure.parts.iter().enumerate() {
        writeln!(out)?;
        writeln!(out, "${} Gridpoints", part.name)?;
        for node in ctx.unique_nodes().filter(|n| n.has_only_index(p)) {
            node.write_nastran(&mut out)?;
        }
    }

    writeln!(out)?;
    writeln!(out, "$Intersections")?;
    for node in ctx.unique_nodes().filter(|n| n.tags.len() > 1) {
        node.write_nastran(&mut out)?;
    }

    writeln!(out)?;
    writeln!(out, "$Remainingnodes")?;
    for node in ctx.unique_nodes().filter(|n| n.tags.is_empty()) {
        node.write_nastran(&mut out)?;
    }

    writeln!(out)?;
    writeln!(out, "$Properties")?;
    for (i, prop) in store.properties.iter().enumerate() {
        write_property_nastran(&mut out, i + 1, prop)?;
    }

    writeln!(out)?;
    writeln!(out, "$Materials")?;
    for (i, mat) in store.materials.iter().enumerate() {
        write_material_nastran(&mut out, i + 1, mat)?;
    }

    writeln!(out, "END DATA")?;
    Ok(out)
}

pub fn write_calculix(ctx: &MeshContext, store: &StructureStore) -> Result<String, fmt::Error> {
    let mut out = String::new();
    let mut elem_id = 0;

    for (p, part) in ctx.structure.parts.iter().enumerate() {
        let name = set_name(&part.name);

        writeln!(out, "**{}", part.name)?;
        writeln!(out, "*NODE, NSET=N{}", name)?;
        for node in ctx.unique_nodes().filter(|n| n.has_only_index(p)) {
            node.write_calculix(&mut out)?;
        }

        writeln!(out)?;
        writeln!(out, "*ELEMENT, TYPE=S6, ELSET=E{}", name)?;
        for element in ctx.part_elements(p).filter(|e| !e.is_beam()) {
            elem_id += 1;
            element.write_calculix(&mut out, elem_id, &ctx.coincidence)?;
        }

        writeln!(out)?;
        if let Some(prop) = store.property(part.property) {
            write_property_calculix(&mut out, &format!("E{}", name), prop, store)?;
        }

        let has_beams = ctx.part_elements(p).any(FeaElement::is_beam);
        if !(part.intersection_cap || has_beams) {
            continue;
        }

        writeln!(out)?;
        writeln!(out, "*ELEMENT, TYPE=B31, ELSET=E{}_CAP", name)?;
        let first_beam = elem_id + 1;
        for element in ctx.part_elements(p).filter(|e| e.is_beam()) {
            elem_id += 1;
            element.write_calculix(&mut out, elem_id, &ctx.coincidence)?;
        }

        writeln!(out)?;
        if let Some(prop) = store.property(part.cap_property) {
            write_property_calculix(&mut out, &format!("E{}_CAP", name), prop, store)?;
        }
        writeln!(out)?;

        writeln!(out, "*NORMAL")?;
        let beams = ctx.part_elements(p).filter_map(|e| match e {
            FeaElement::Beam(b) => Some(b),
            FeaElement::Tri(_) => None,
        });
        for (k, beam) in beams.enumerate() {
            beam.write_calculix_normal(&mut out, first_beam + k, &ctx.coincidence)?;
        }
        writeln!(out)?;
    }

    writeln!(out, "**Intersections")?;
    writeln!(out, "*NODE, NSET=Nintersections")?;
    for node in ctx.unique_nodes().filter(|n| n.tags.len() > 1) {
        node.write_calculix(&mut out)?;
    }

    writeln!(out)?;
    writeln!(out, "**Materials")?;
    for mat in &store.materials {
        write_material_calculix(&mut out, mat)?;
        writeln!(out)?;
    }

    Ok(out)
}

/// Gmsh 2.2 ASCII mesh. Each part becomes a physical group of dimension 2
/// numbered from 1.
pub fn write_gmsh(ctx: &MeshContext) -> Result<String, fmt::Error> {
    let mut out = String::new();
    let num_parts = ctx.num_parts();

    writeln!(out, "$MeshFormat")?;
    writeln!(out, "2.2 0 {}", std::mem::size_of::<f64>())?;
    writeln!(out, "$EndMeshFormat")?;

    writeln!(out, "$PhysicalNames")?;
    writeln!(out, "{}", num_parts)?;
    for (i, part) in ctx.structure.parts.iter().enumerate() {
        // physical dimension of a shell group, not an element type code
        writeln!(out, "2 {} \"{}\"", i + 1, part.name)?;
    }
    writeln!(out, "$EndPhysicalNames")?;

    writeln!(out, "$Nodes")?;
    writeln!(out, "{}", ctx.num_nodes())?;
    for node in ctx.unique_nodes() {
        node.write_gmsh(&mut out)?;
    }
    writeln!(out, "$EndNodes")?;

    let num_elements: usize = (0..num_parts).map(|p| ctx.part_elements(p).count()).sum();
    writeln!(out, "$Elements")?;
    writeln!(out, "{}", num_elements)?;
    let mut ele_cnt = 1;
    for p in 0..num_parts {
        for element in ctx.part_elements(p) {
            element.write_gmsh(&mut out, ele_cnt, p + 1, &ctx.coincidence)?;
            ele_cnt += 1;
        }
    }
    writeln!(out, "$EndElements")?;

    Ok(out)
}

/// ASCII STL with one solid per tag combination.
pub fn write_stl(ctx: &MeshContext) -> Result<String, fmt::Error> {
    let mut out = String::new();

    for combo in ctx.tags.combos() {
        let Some(tag) = ctx.tags.single_tag(combo) else {
            continue;
        };
        let name = ctx.tags.combo_name(combo);

        writeln!(out, "solid {}", name)?;
        for element in &ctx.elements {
            let FeaElement::Tri(tri) = element else {
                continue;
            };
            if tri.tag != Some(tag) {
                continue;
            }
            let n = tri.normal(&ctx.nodes);
            writeln!(out, "  facet normal {} {} {}", n.x, n.y, n.z)?;
            writeln!(out, "    outer loop")?;
            for corner in &tri.nodes[..3] {
                let p = ctx.nodes[*corner].pnt;
                writeln!(out, "      vertex {} {} {}", p.x, p.y, p.z)?;
            }
            writeln!(out, "    endloop")?;
            writeln!(out, "  endfacet")?;
        }
        writeln!(out, "endsolid {}", name)?;
    }

    Ok(out)
}

pub fn write_mass(mass: &MassReport) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "FeaStruct_Name: {}", mass.structure_name)?;
    for (name, m) in &mass.parts {
        writeln!(out, "\tFeaPartName: {}, Mass = {}", name, m)?;
    }
    writeln!(out, "Total Mass = {}", mass.total)?;
    Ok(out)
}

/// Renders one format completely in memory.
pub fn render(
    format: ExportFormat,
    ctx: &MeshContext,
    store: &StructureStore,
    mass: &MassReport,
) -> Result<String, FeaMeshError> {
    let rendered = match format {
        ExportFormat::Nastran => write_nastran(ctx, store),
        ExportFormat::Calculix => write_calculix(ctx, store),
        ExportFormat::Gmsh => write_gmsh(ctx),
        ExportFormat::Stl => write_stl(ctx),
        ExportFormat::Mass => write_mass(mass),
    };
    rendered.map_err(|err| FeaMeshError::Export(format!("unable to format {:?} output: {err}", format)))
}

fn write_file(
    format: ExportFormat,
    ctx: &MeshContext,
    store: &StructureStore,
    mass: &MassReport,
    settings: &ExportSettings,
) -> Result<PathBuf, FeaMeshError> {
    let contents = render(format, ctx, store, mass)?;
    let path = settings.file_name(format);

    let mut file = match std::fs::File::create(&path) {
        Ok(f) => f,
        Err(source) => return Err(FeaMeshError::FileOpen { path, source }),
    };
    if let Err(err) = file.write_all(contents.as_bytes()) {
        return Err(FeaMeshError::Export(format!(
            "failed to write {}: {err}",
            path.display()
        )));
    }

    Ok(path)
}

/// Writes every enabled format. A format that cannot be written is skipped
/// and recorded; the others still run.
pub fn export_files(
    ctx: &MeshContext,
    store: &StructureStore,
    mass: &MassReport,
    settings: &ExportSettings,
) -> ExportSummary {
    let mut summary = ExportSummary::default();

    for format in ExportFormat::ALL {
        if !settings.enabled(format) {
            continue;
        }
        match write_file(format, ctx, store, mass, settings) {
            Ok(path) => {
                println!("info: wrote {}", path.display());
                summary.written.push(path);
            }
            Err(err) => {
                println!("warning [export]: {err}");
                summary.failed.push((format, err));
            }
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        element::{FeaBeam, FeaTri},
        structure::{FeaPart, FeaStructure},
    };
    use nalgebra::{Point3, Vector3};

    fn store() -> StructureStore {
        StructureStore {
            structures: Vec::new(),
            properties: vec![
                FeaProperty {
                    name: "Shell".to_owned(),
                    kind: PropertyKind::Shell { thickness: 0.1 },
                    material: 0,
                },
                FeaProperty {
                    name: "Cap".to_owned(),
                    kind: PropertyKind::Beam {
                        area: 0.5,
                        izz: 1.0,
                        iyy: 2.0,
                        izy: 0.0,
                        ixx: 3.0,
                    },
                    material: 0,
                },
            ],
            materials: vec![FeaMaterial {
                name: "Al 7075".to_owned(),
                density: 2.0,
                elastic_modulus: 70.0,
                poisson_ratio: 0.25,
                thermal_expansion: 1e-5,
            }],
        }
    }

    /// One shell and one beam along its first edge, all in "Skin Panel".
    fn context() -> MeshContext {
        let mut ctx = MeshContext::default();
        ctx.structure = FeaStructure {
            name: "Wing".to_owned(),
            parts: vec![FeaPart {
                name: "Skin Panel".to_owned(),
                is_skin: true,
                surfaces: Vec::new(),
                property: 0,
                cap_property: 1,
                intersection_cap: true,
            }],
            sub_surfaces: Vec::new(),
        };

        let tag = ctx.tags.base_tag(0, 0, "Skin");
        ctx.tags.record_combo(&[tag]);
        ctx.tags.build_single_tag_map();

        let mut tri = FeaTri::create(
            &mut ctx.nodes,
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Vector3::x(),
        );
        tri.fea_part_index = Some(0);
        tri.tag = Some(tag);
        let mut beam = FeaBeam::create(
            &mut ctx.nodes,
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Vector3::z(),
        );
        beam.fea_part_index = Some(0);

        ctx.elements.push(FeaElement::Tri(tri));
        ctx.elements.push(FeaElement::Beam(beam));
        ctx.tag_fea_nodes();
        ctx
    }

    #[test]
    fn nastran_deck_layout() {
        let ctx = context();
        let deck = write_nastran(&ctx, &store()).unwrap();
        let expected = "BEGIN BULK

$Skin Panel
CTRIA6,1,1,1,2,3,4,5,6
CBEAM,2,2,1,2,0,0,1

$Skin Panel Gridpoints
GRID,1,,0.000000,0.000000,0.000000
GRID,2,,1.000000,0.000000,0.000000
GRID,3,,0.000000,1.000000,0.000000
GRID,4,,0.500000,0.000000,0.000000
GRID,5,,0.500000,0.500000,0.000000
GRID,6,,0.000000,0.500000,0.000000

$Intersections

$Remainingnodes

$Properties
PSHELL,1,1,0.1
PBEAM,2,1,0.5,1,2,0,3

$Materials
MAT1,1,70,28,0.25,2,0.00001
END DATA
";
        assert_eq!(deck, expected);
    }

    #[test]
    fn calculix_sections_in_order() {
        let ctx = context();
        let deck = write_calculix(&ctx, &store()).unwrap();

        let order = [
            "**Skin Panel\n*NODE, NSET=NSkin_Panel\n1,0,0,0\n",
            "*ELEMENT, TYPE=S6, ELSET=ESkin_Panel\n1,1,2,3,4,5,6\n",
            "*SHELL SECTION, ELSET=ESkin_Panel, MATERIAL=Al_7075\n0.1\n",
            "*ELEMENT, TYPE=B31, ELSET=ESkin_Panel_CAP\n2,1,2\n",
            "*BEAM SECTION, ELSET=ESkin_Panel_CAP, MATERIAL=Al_7075, SECTION=GENERAL\n0.5,1,0,2,3\n",
            "*NORMAL\n2,1,0,0,1\n2,2,0,0,1\n",
            "**Intersections\n*NODE, NSET=Nintersections\n",
            "**Materials\n*MATERIAL, NAME=Al_7075\n*DENSITY\n2\n*ELASTIC, TYPE=ISO\n70, 0.25\n",
        ];
        let mut cursor = 0;
        for section in order {
            let pos = deck[cursor..]
                .find(section)
                .unwrap_or_else(|| panic!("missing section {section:?}"));
            cursor += pos + section.len();
        }
    }

    #[test]
    fn gmsh_groups_by_part() {
        let ctx = context();
        let mesh = write_gmsh(&ctx).unwrap();

        assert!(mesh.starts_with("$MeshFormat\n2.2 0 8\n$EndMeshFormat\n"));
        assert!(mesh.contains("$PhysicalNames\n1\n2 1 \"Skin Panel\"\n$EndPhysicalNames\n"));
        assert!(mesh.contains("$Nodes\n6\n1 0 0 0\n"));
        assert!(mesh.contains("$Elements\n2\n1 9 2 1 1 1 2 3 4 5 6\n2 1 2 1 1 1 2\n$EndElements\n"));
    }

    #[test]
    fn stl_solid_per_tag() {
        let ctx = context();
        let stl = write_stl(&ctx).unwrap();
        assert!(stl.starts_with("solid Skin\n  facet normal 0 0 1\n    outer loop\n"));
        assert!(stl.contains("      vertex 0 1 0\n    endloop\n  endfacet\n"));
        assert!(stl.ends_with("endsolid Skin\n"));
        assert_eq!(stl.matches("facet normal").count(), 1);
    }

    #[test]
    fn mass_report_text() {
        let report = MassReport {
            structure_name: "Wing".to_owned(),
            parts: vec![("Skin".to_owned(), 0.5), ("Spar".to_owned(), 1.25)],
            total: 1.75,
        };
        assert_eq!(
            write_mass(&report).unwrap(),
            "FeaStruct_Name: Wing\n\tFeaPartName: Skin, Mass = 0.5\n\tFeaPartName: Spar, Mass = 1.25\nTotal Mass = 1.75\n"
        );
    }

    #[test]
    fn export_writes_every_enabled_format() {
        let dir = std::env::temp_dir().join("fea_mesh_export_written");
        std::fs::create_dir_all(&dir).unwrap();
        let settings = ExportSettings::new(&dir, "panel");
        let ctx = context();
        let mass = ctx.compute_mass(&store());

        let summary = export_files(&ctx, &store(), &mass, &settings);
        assert!(summary.is_complete());
        assert_eq!(summary.written.len(), ExportFormat::ALL.len());

        let on_disk = std::fs::read_to_string(settings.file_name(ExportFormat::Nastran)).unwrap();
        assert_eq!(on_disk, write_nastran(&ctx, &store()).unwrap());
    }

    #[test]
    fn unopenable_files_are_skipped() {
        let dir = std::env::temp_dir()
            .join("fea_mesh_export_missing")
            .join("nested");
        let _ = std::fs::remove_dir_all(&dir);
        let mut settings = ExportSettings::new(&dir, "panel");
        settings.stl = false;
        let ctx = context();
        let mass = ctx.compute_mass(&store());

        let summary = export_files(&ctx, &store(), &mass, &settings);
        assert!(summary.written.is_empty());
        assert_eq!(summary.failed.len(), 4);
        assert!(summary
            .failed
            .iter()
            .all(|(_, err)| matches!(err, FeaMeshError::FileOpen { .. }) && !err.is_fatal()));
        assert!(!settings.file_name(ExportFormat::Nastran).exists());
    }
}
