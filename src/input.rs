use std::path::{Path, PathBuf};

use json::JsonValue;
use nalgebra::{Point3, Vector3};

use crate::{
    config::{ExportSettings, MeshSettings, RemeshPolicy, DEFAULT_MAX_EDGE_LEN, REMESH_ITERATIONS},
    datatypes::Uw,
    error::FeaMeshError,
    structure::{
        FeaMaterial, FeaPart, FeaProperty, FeaStructure, PropertyKind, StructureStore,
        SubSurface, SubSurfaceShape, SurfaceSpec,
    },
    surface::PlanarPatch,
};

/// Everything a run needs, as read from the input json.
#[derive(Debug, Clone, PartialEq)]
pub struct InputFile {
    pub store: StructureStore,
    pub mesh: MeshSettings,
    pub export: ExportSettings,
}

fn missing(key: &str, section: &str) -> FeaMeshError {
    FeaMeshError::input(format!("Input json missing {key} field in {section}"))
}

fn req_f64(obj: &JsonValue, key: &str, section: &str) -> Result<f64, FeaMeshError> {
    obj[key].as_f64().ok_or_else(|| missing(key, section))
}

fn req_usize(obj: &JsonValue, key: &str, section: &str) -> Result<usize, FeaMeshError> {
    obj[key].as_usize().ok_or_else(|| missing(key, section))
}

fn req_str(obj: &JsonValue, key: &str, section: &str) -> Result<String, FeaMeshError> {
    obj[key]
        .as_str()
        .map(|s| s.to_owned())
        .ok_or_else(|| missing(key, section))
}

fn opt_bool(obj: &JsonValue, key: &str, default: bool) -> bool {
    obj[key].as_bool().unwrap_or(default)
}

fn req_array<'a>(
    obj: &'a JsonValue,
    key: &str,
    section: &str,
) -> Result<&'a JsonValue, FeaMeshError> {
    if !obj[key].is_array() {
        return Err(missing(key, section));
    }
    Ok(&obj[key])
}

fn parse_numbers(value: &JsonValue, len: usize, what: &str) -> Result<Vec<f64>, FeaMeshError> {
    if !value.is_array() || value.len() != len {
        return Err(FeaMeshError::input(format!(
            "Expected {len} numbers for {what}"
        )));
    }
    value
        .members()
        .map(|v| {
            v.as_f64()
                .ok_or_else(|| FeaMeshError::input(format!("Non-numeric value in {what}")))
        })
        .collect()
}

fn parse_vec3(obj: &JsonValue, key: &str, section: &str) -> Result<Vector3<f64>, FeaMeshError> {
    if obj[key].is_null() {
        return Err(missing(key, section));
    }
    let v = parse_numbers(&obj[key], 3, &format!("{key} in {section}"))?;
    Ok(Vector3::new(v[0], v[1], v[2]))
}

fn parse_uw(value: &JsonValue, what: &str) -> Result<Uw, FeaMeshError> {
    let v = parse_numbers(value, 2, what)?;
    Ok(Uw::new(v[0], v[1]))
}

fn parse_settings(input: &JsonValue) -> (MeshSettings, ExportSettings) {
    let settings = &input["settings"];

    let remesh_policy = if opt_bool(settings, "remesh_until_stable", false) {
        RemeshPolicy::UntilStable {
            max_iterations: REMESH_ITERATIONS,
        }
    } else {
        RemeshPolicy::default()
    };

    let mesh = MeshSettings {
        max_edge_len: settings["max_edge_length"]
            .as_f64()
            .unwrap_or(DEFAULT_MAX_EDGE_LEN),
        intersect_sub_surfaces: opt_bool(settings, "intersect_sub_surfaces", true),
        remesh_policy,
        quiet: false,
    };

    let output_dir = settings["output_dir"]
        .as_str()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let base_name = settings["base_name"].as_str().unwrap_or("fea_mesh");
    let mut export = ExportSettings::new(output_dir, base_name);
    export.nastran = opt_bool(settings, "nastran", true);
    export.calculix = opt_bool(settings, "calculix", true);
    export.gmsh = opt_bool(settings, "gmsh", true);
    export.stl = opt_bool(settings, "stl", true);

    (mesh, export)
}

fn parse_material(value: &JsonValue) -> Result<FeaMaterial, FeaMeshError> {
    let section = "materials";
    Ok(FeaMaterial {
        name: req_str(value, "name", section)?,
        density: req_f64(value, "density", section)?,
        elastic_modulus: req_f64(value, "elastic_modulus", section)?,
        poisson_ratio: req_f64(value, "poisson_ratio", section)?,
        thermal_expansion: value["thermal_expansion"].as_f64().unwrap_or(0.0),
    })
}

fn parse_property(value: &JsonValue, num_materials: usize) -> Result<FeaProperty, FeaMeshError> {
    let section = "properties";
    let name = req_str(value, "name", section)?;
    let material = req_usize(value, "material", section)?;
    if material >= num_materials {
        return Err(FeaMeshError::input(format!(
            "Property {name} references material {material}, only {num_materials} defined"
        )));
    }

    let kind = match req_str(value, "type", section)?.as_str() {
        "shell" => PropertyKind::Shell {
            thickness: req_f64(value, "thickness", section)?,
        },
        "beam" => PropertyKind::Beam {
            area: req_f64(value, "area", section)?,
            izz: req_f64(value, "izz", section)?,
            iyy: req_f64(value, "iyy", section)?,
            izy: value["izy"].as_f64().unwrap_or(0.0),
            ixx: req_f64(value, "ixx", section)?,
        },
        other => {
            return Err(FeaMeshError::input(format!(
                "Unrecognized property type {other} for property {name}"
            )))
        }
    };

    Ok(FeaProperty {
        name,
        kind,
        material,
    })
}

fn parse_surface(value: &JsonValue, part: &str) -> Result<SurfaceSpec, FeaMeshError> {
    let section = format!("surfaces of part {part}");
    let comp_id = value["comp_id"]
        .as_i32()
        .ok_or_else(|| missing("comp_id", &section))?;
    let origin = parse_vec3(value, "origin", &section)?;

    Ok(SurfaceSpec {
        comp_id,
        patch: PlanarPatch::new(
            Point3::from(origin),
            parse_vec3(value, "u_edge", &section)?,
            parse_vec3(value, "w_edge", &section)?,
        ),
        flip: opt_bool(value, "flip", false),
    })
}

fn parse_part(value: &JsonValue, num_properties: usize) -> Result<FeaPart, FeaMeshError> {
    let section = "parts";
    let name = req_str(value, "name", section)?;
    let property = req_usize(value, "property", section)?;
    let cap_property = value["cap_property"].as_usize().unwrap_or(property);
    for index in [property, cap_property] {
        if index >= num_properties {
            return Err(FeaMeshError::input(format!(
                "Part {name} references property {index}, only {num_properties} defined"
            )));
        }
    }

    let surfaces = req_array(value, "surfaces", &format!("part {name}"))?
        .members()
        .map(|s| parse_surface(s, &name))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(FeaPart {
        is_skin: opt_bool(value, "skin", false),
        property,
        cap_property,
        intersection_cap: opt_bool(value, "intersection_cap", false),
        surfaces,
        name,
    })
}

fn parse_sub_surface(value: &JsonValue, num_parts: usize) -> Result<SubSurface, FeaMeshError> {
    let section = "sub_surfaces";
    let name = req_str(value, "name", section)?;
    let parent_part = req_usize(value, "part", section)?;
    if parent_part >= num_parts {
        return Err(FeaMeshError::input(format!(
            "Sub-surface {name} references part {parent_part}, only {num_parts} defined"
        )));
    }

    let shape = if value.has_key("polygon") {
        let what = format!("polygon of {name}");
        let pts = value["polygon"]
            .members()
            .map(|p| parse_uw(p, &what))
            .collect::<Result<Vec<_>, _>>()?;
        if pts.len() < 3 {
            return Err(FeaMeshError::input(format!(
                "Sub-surface {name} polygon needs at least 3 points"
            )));
        }
        SubSurfaceShape::Polygon(pts)
    } else if value.has_key("line") {
        let what = format!("line of {name}");
        if value["line"].len() != 2 {
            return Err(FeaMeshError::input(format!(
                "Sub-surface {name} line needs exactly 2 points"
            )));
        }
        SubSurfaceShape::Line(
            parse_uw(&value["line"][0], &what)?,
            parse_uw(&value["line"][1], &what)?,
        )
    } else {
        return Err(FeaMeshError::input(format!(
            "Sub-surface {name} needs a polygon or line field"
        )));
    };

    Ok(SubSurface {
        name,
        parent_part,
        shape,
        intersection_cap: opt_bool(value, "intersection_cap", false),
    })
}

fn parse_structure(value: &JsonValue, num_properties: usize) -> Result<FeaStructure, FeaMeshError> {
    let name = req_str(value, "name", "structures")?;
    let section = format!("structure {name}");

    let parts = req_array(value, "parts", &section)?
        .members()
        .map(|p| parse_part(p, num_properties))
        .collect::<Result<Vec<_>, _>>()?;

    if parts.iter().filter(|p| p.is_skin).count() > 1 {
        return Err(FeaMeshError::input(format!(
            "Structure {name} has more than one skin part"
        )));
    }

    let sub_surfaces = value["sub_surfaces"]
        .members()
        .map(|s| parse_sub_surface(s, parts.len()))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(FeaStructure {
        name,
        parts,
        sub_surfaces,
    })
}

/// Parses and validates the contents of an input file.
pub fn parse_input(contents: &str) -> Result<InputFile, FeaMeshError> {
    let input = match json::parse(contents) {
        Ok(v) => v,
        Err(err) => {
            return Err(FeaMeshError::Input(format!(
                "Error in input file json: {err}"
            )))
        }
    };

    for key in ["materials", "properties", "structures"] {
        if !input.has_key(key) {
            return Err(FeaMeshError::Input(format!(
                "Input json missing {key} field"
            )));
        }
    }

    let materials = req_array(&input, "materials", "input")?
        .members()
        .map(parse_material)
        .collect::<Result<Vec<_>, _>>()?;

    let properties = req_array(&input, "properties", "input")?
        .members()
        .map(|p| parse_property(p, materials.len()))
        .collect::<Result<Vec<_>, _>>()?;

    let structures = req_array(&input, "structures", "input")?
        .members()
        .map(|s| parse_structure(s, properties.len()))
        .collect::<Result<Vec<_>, _>>()?;

    let (mesh, export) = parse_settings(&input);

    Ok(InputFile {
        store: StructureStore {
            structures,
            properties,
            materials,
        },
        mesh,
        export,
    })
}

/// Reads the input json at `path`.
///
/// # Arguments
/// * `path` - The path to the input file
///
/// # Returns
/// The structure store plus mesh and export settings
pub fn load_input_file(path: &Path) -> Result<InputFile, FeaMeshError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(_err) => {
            return Err(FeaMeshError::Input(format!(
                "Unable to open input file {}",
                path.display()
            )))
        }
    };
    parse_input(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WING: &str = r#"{
        "settings": { "max_edge_length": 0.25, "intersect_sub_surfaces": true,
                      "remesh_until_stable": true, "output_dir": "out", "base_name": "wing",
                      "stl": false },
        "materials": [ { "name": "Al", "density": 2700, "elastic_modulus": 7e10,
                         "poisson_ratio": 0.33, "thermal_expansion": 2.3e-5 } ],
        "properties": [ { "name": "skin", "type": "shell", "thickness": 0.002, "material": 0 },
                        { "name": "cap", "type": "beam", "area": 1e-4, "izz": 1e-8,
                          "iyy": 1e-8, "izy": 0, "ixx": 2e-8, "material": 0 } ],
        "structures": [ { "name": "WingStruct",
          "parts": [ { "name": "Skin", "skin": true, "property": 0, "cap_property": 1,
                       "surfaces": [ { "comp_id": 0, "origin": [0,0,0], "u_edge": [1,0,0],
                                       "w_edge": [0,1,0], "flip": true } ] },
                     { "name": "Spar", "property": 0, "cap_property": 1, "intersection_cap": true,
                       "surfaces": [ { "comp_id": 0, "origin": [0.5,0,0], "u_edge": [0,1,0],
                                       "w_edge": [0,0,0.1] } ] } ],
          "sub_surfaces": [ { "name": "Panel", "part": 0,
                              "polygon": [[0.2,0.2],[0.6,0.2],[0.6,0.6],[0.2,0.6]],
                              "intersection_cap": true },
                            { "name": "Cut", "part": 0, "line": [[0,0.5],[1,0.5]] } ] } ]
    }"#;

    #[test]
    fn parses_full_input() {
        let input = parse_input(WING).unwrap();
        let store = &input.store;

        assert_eq!(store.materials.len(), 1);
        assert_eq!(store.properties[0].thickness(), 0.002);
        assert_eq!(store.properties[1].cross_section_area(), 1e-4);

        let wing = &store.structures[0];
        assert_eq!(wing.name, "WingStruct");
        assert_eq!(wing.skin_index(), Some(0));
        assert!(wing.parts[0].surfaces[0].flip);
        assert!(wing.parts[1].intersection_cap);
        assert_eq!(wing.parts[1].surfaces[0].patch.w_edge, Vector3::new(0.0, 0.0, 0.1));
        assert!(wing.sub_surfaces[0].is_poly());
        assert!(!wing.sub_surfaces[1].is_poly());
        assert!(!wing.sub_surfaces[1].intersection_cap);

        assert_eq!(input.mesh.max_edge_len, 0.25);
        assert_eq!(
            input.mesh.remesh_policy,
            RemeshPolicy::UntilStable { max_iterations: REMESH_ITERATIONS }
        );
        assert_eq!(input.export.base_name, "wing");
        assert!(!input.export.stl);
        assert!(input.export.nastran);
    }

    #[test]
    fn settings_block_is_optional() {
        let input = parse_input(r#"{ "materials": [], "properties": [], "structures": [] }"#).unwrap();
        assert_eq!(input.mesh, MeshSettings::default());
        assert_eq!(input.export, ExportSettings::default());
    }

    #[test]
    fn missing_key_is_named() {
        let err = parse_input(r#"{ "materials": [ { "name": "Al", "density": 1 } ],
                                   "properties": [], "structures": [] }"#)
            .unwrap_err();
        assert!(err.to_string().contains("elastic_modulus"));

        let err = parse_input(r#"{ "materials": [], "properties": [] }"#).unwrap_err();
        assert!(err.to_string().contains("structures"));
    }

    #[test]
    fn rejects_bad_references() {
        let err = parse_input(
            r#"{ "materials": [], "properties": [
                   { "name": "p", "type": "shell", "thickness": 1, "material": 0 } ],
                 "structures": [] }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("references material 0"));

        let bad_type = WING.replace(r#""type": "shell""#, r#""type": "solid""#);
        assert!(parse_input(&bad_type)
            .unwrap_err()
            .to_string()
            .contains("Unrecognized property type solid"));

        let bad_part = WING.replace(r#""name": "Panel", "part": 0"#, r#""name": "Panel", "part": 7"#);
        assert!(parse_input(&bad_part)
            .unwrap_err()
            .to_string()
            .contains("references part 7"));
    }

    #[test]
    fn malformed_json() {
        let err = parse_input("{ not json").unwrap_err();
        assert!(matches!(err, FeaMeshError::Input(_)));
    }
}
