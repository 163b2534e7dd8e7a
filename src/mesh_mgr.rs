//! Mesh generation driver.
//!
//! A [`MeshContext`] holds every intermediate of one run (surfaces, their
//! triangulations, intersection chains, elements and the node pool) and is
//! rebuilt from scratch each time [`FeaMeshManager::generate`] is called.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use indicatif::{ProgressBar, ProgressStyle};
use nalgebra::{Point3, Vector3};

use crate::{
    chains::build_sub_surf_int_chains,
    coincidence::CoincidenceMap,
    config::{ExportSettings, MeshSettings, COINCIDENCE_TOL},
    datatypes::{ChainSide, IntersectionChain},
    element::{FeaBeam, FeaElement, FeaNode, FeaTri},
    error::FeaMeshError,
    exporter::{self, ExportSummary},
    structure::{FeaStructure, StructureStore, FEA_PART_COMP_OFFSET},
    surface::{signed_angle, Surface},
    tags::TagRegistry,
    triangulate::{SurfaceMesh, Triangulator},
};

/// Per-part and total mass of the generated mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MassReport {
    pub structure_name: String,
    pub parts: Vec<(String, f64)>,
    pub total: f64,
}

/// Edge usage of the shell elements after node merging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaterTightReport {
    pub num_edges: usize,
    /// Edges used by exactly one triangle
    pub open_edges: usize,
    /// Edges shared by more than two triangles
    pub junction_edges: usize,
}

impl WaterTightReport {
    pub fn is_water_tight(&self) -> bool {
        self.open_edges == 0
    }

    pub fn message(&self) -> String {
        if self.is_water_tight() {
            format!(
                "mesh is water tight ({} edges, {} junction edges)",
                self.num_edges, self.junction_edges
            )
        } else {
            format!(
                "mesh is NOT water tight: {} of {} edges are open, {} junction edges",
                self.open_edges, self.num_edges, self.junction_edges
            )
        }
    }
}

#[derive(Debug)]
pub struct GenerationReport {
    pub num_elements: usize,
    pub num_beams: usize,
    pub num_nodes: usize,
    pub remesh: RemeshStats,
    pub mass: MassReport,
    pub export: ExportSummary,
    pub water_tight: WaterTightReport,
}

/// What the remesh driver did, per surface and in total.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemeshStats {
    /// Passes run on each surface, in surface order
    pub passes: Vec<usize>,
    /// Reversed triangles dropped by the last pass of each surface
    pub reversed_removed: usize,
    /// Simplified triangles left after condensing
    pub total_tris: usize,
}

/// Points and normals of one capped chain, ready to become beams.
struct BeamCap {
    points: Vec<Point3<f64>>,
    normals: Vec<Vector3<f64>>,
    part: Option<usize>,
    ss: Option<usize>,
}

fn part_is_capped(surf: &Surface, structure: &FeaStructure) -> bool {
    surf.fea_part_index
        .and_then(|p| structure.part(p))
        .map_or(false, |p| p.intersection_cap)
}

/// Resolves whether a chain gets beams, and if so with which normals and
/// in which direction. Chains matching no capping case yield `None`.
fn beam_cap(
    chain: &IntersectionChain,
    surfaces: &[Surface],
    structure: &FeaStructure,
) -> Option<BeamCap> {
    if chain.border || chain.points.len() < 2 {
        return None;
    }
    let surf_a = surfaces.get(chain.surf_a)?;
    let surf_b = surfaces.get(chain.surf_b)?;

    let part_on_skin = match (surf_a.is_skin(), surf_b.is_skin()) {
        (false, true) => Some((surf_a, surf_b, ChainSide::B)),
        (true, false) => Some((surf_b, surf_a, ChainSide::A)),
        _ => None,
    };

    if let Some((part_surf, skin_surf, skin_side)) = part_on_skin {
        if !part_is_capped(part_surf, structure) {
            return None;
        }
        let mut points: Vec<Point3<f64>> = chain.points.iter().map(|p| p.pnt).collect();
        let mut normals: Vec<Vector3<f64>> = chain
            .points
            .iter()
            .map(|p| skin_surf.oriented_normal(&p.uw_on(skin_side)))
            .collect();

        let center = part_surf.core.bbox_center();
        let first = points[0] - center;
        let last = points[points.len() - 1] - center;
        if signed_angle(&first, &last, &center.coords) < 0.0 {
            points.reverse();
            normals.reverse();
        }

        return Some(BeamCap {
            points,
            normals,
            part: part_surf.fea_part_index,
            ss: None,
        });
    }

    if chain.surf_a == chain.surf_b && surf_a.is_skin() {
        let ss = chain.ss_intersect_index?;
        return Some(BeamCap {
            points: chain.points.iter().map(|p| p.pnt).collect(),
            normals: chain
                .points
                .iter()
                .map(|p| surf_a.oriented_normal(&p.uw_a))
                .collect(),
            part: surf_a.fea_part_index,
            ss: Some(ss),
        });
    }

    None
}

#[derive(Debug, Default)]
pub struct MeshContext {
    pub structure: FeaStructure,
    pub surfaces: Vec<Surface>,
    pub meshes: Vec<SurfaceMesh>,
    pub chains: Vec<IntersectionChain>,
    pub tags: TagRegistry,
    pub elements: Vec<FeaElement>,
    /// One entry per element node occurrence; merged through `coincidence`
    pub nodes: Vec<FeaNode>,
    pub coincidence: CoincidenceMap,
}

impl MeshContext {
    pub fn clean_up(&mut self) {
        *self = MeshContext::default();
    }

    pub fn num_parts(&self) -> usize {
        self.structure.num_parts()
    }

    /// Loads the skin first, then every other part, stamping each surface
    /// with its owning part index.
    pub fn load_surfaces(
        &mut self,
        store: &StructureStore,
        index: usize,
    ) -> Result<(), FeaMeshError> {
        self.clean_up();
        let Some(structure) = store.structures.get(index) else {
            return Err(FeaMeshError::InvalidSelection {
                index,
                count: store.structures.len(),
            });
        };

        self.structure = structure.clone();

        let skin = structure.skin_index();
        let order = skin
            .into_iter()
            .chain((0..structure.num_parts()).filter(|i| Some(*i) != skin));

        for i in order {
            let part = &structure.parts[i];
            let offset = FEA_PART_COMP_OFFSET + i as i32 - 1;
            for mut surf in part.fetch_xfer_surfs(offset) {
                surf.fea_part_index = Some(i);
                self.surfaces.push(surf);
            }
        }

        Ok(())
    }

    /// Gives every surface its base tag and numbers the sub-surface tags
    /// after them.
    pub fn sub_tag_surfaces(&mut self) {
        self.tags.clear();

        let mut part_comps: BTreeMap<usize, Vec<i32>> = BTreeMap::new();
        for surf in &self.surfaces {
            if let Some(p) = surf.fea_part_index {
                let comps = part_comps.entry(p).or_default();
                if !comps.contains(&surf.comp_id) {
                    comps.push(surf.comp_id);
                }
            }
        }

        for surf in self.surfaces.iter_mut() {
            let Some(part) = surf.fea_part_index else {
                continue;
            };
            let comps = &part_comps[&part];
            let part_name = self.structure.part_name(part);
            let name = if comps.len() > 1 {
                let k = comps.iter().position(|c| *c == surf.comp_id).unwrap_or(0);
                format!("{}_{}", part_name, k)
            } else {
                part_name.to_owned()
            };
            surf.base_tag = self.tags.base_tag(part, surf.comp_id, &name);
        }

        self.tags.assign_sub_surface_tags(
            self.structure
                .sub_surfaces
                .iter()
                .map(|ss| ss.name.as_str()),
        );
    }

    /// Builds the sub-surface boundary chains and hands them to the
    /// triangulator, so the surface meshes carry their points as nodes.
    pub fn intersect(&mut self, triangulator: &mut dyn Triangulator, settings: &MeshSettings) {
        let sub_surf_chains = if settings.intersect_sub_surfaces {
            build_sub_surf_int_chains(&self.surfaces, &self.structure)
        } else {
            Vec::new()
        };

        let (mut meshes, mut chains) = triangulator.intersect(&self.surfaces, &sub_surf_chains);

        if meshes.len() != self.surfaces.len() {
            println!(
                "warning [intersect]: triangulator returned {} meshes for {} surfaces",
                meshes.len(),
                self.surfaces.len()
            );
            meshes.resize_with(self.surfaces.len(), SurfaceMesh::default);
        }

        chains.extend(sub_surf_chains);

        self.meshes = meshes;
        self.chains = chains;
    }

    /// Refines every surface mesh under the configured policy, then tags
    /// and condenses the simplified triangles.
    pub fn remesh(&mut self, settings: &MeshSettings) -> RemeshStats {
        let num_surfs = self.surfaces.len();
        let max_iter = settings.remesh_policy.max_iterations();
        let bar = if settings.quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new((num_surfs * max_iter) as u64)
        };
        if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}") {
            bar.set_style(style);
        }

        let mut stats = RemeshStats::default();
        for (s, surf) in self.surfaces.iter().enumerate() {
            let Some(mesh) = self.meshes.get_mut(s) else {
                continue;
            };

            let mut previous = None;
            let mut passes = 0;
            let mut reversed = 0;
            for iter in 0..max_iter {
                mesh.remesh(surf);
                reversed = mesh.remove_reversed_tris(surf);
                passes += 1;
                let num_tris = mesh.num_tris();
                bar.set_message(format!(
                    "Surf {}/{} Iter {}/{} Num Tris = {}",
                    s + 1,
                    num_surfs,
                    iter + 1,
                    max_iter,
                    num_tris
                ));
                bar.inc(1);
                if settings.remesh_policy.converged(previous, num_tris) {
                    break;
                }
                previous = Some(num_tris);
            }
            stats.passes.push(passes);
            stats.reversed_removed += reversed;

            mesh.load_simp_tris();
            mesh.clear();

            let uw = mesh.simp_uw().to_vec();
            let sub_tag = settings.intersect_sub_surfaces && surf.is_skin();
            for tri in mesh.simp_tris_mut().iter_mut() {
                let mut tags = vec![surf.base_tag];
                if sub_tag {
                    let center = (uw[tri.ind[0]] + uw[tri.ind[1]] + uw[tri.ind[2]]) / 3.0;
                    for (ss, sub_surf) in self.structure.sub_surfaces.iter().enumerate() {
                        if surf.fea_part_index != Some(sub_surf.parent_part)
                            || !sub_surf.subtag(&center)
                        {
                            continue;
                        }
                        if let Some(tag) = self.tags.sub_surface_tag(ss) {
                            tags.push(tag);
                        }
                    }
                }
                self.tags.record_combo(&tags);
                tri.tags = tags;
            }

            mesh.condense_simp_tris();
            stats.total_tris += mesh.simp_tris().len();
        }

        self.tags.build_single_tag_map();
        bar.finish_with_message(format!("remeshed {} surfaces", num_surfs));

        if !settings.quiet {
            println!(
                "info: {} reversed tris collapsed in final iteration",
                stats.reversed_removed
            );
            println!("info: total num tris = {}", stats.total_tris);
        }

        stats
    }

    /// Turns the simplified triangles into shell elements and the capped
    /// intersection chains into beams.
    pub fn build_fea_mesh(&mut self) {
        self.elements.clear();
        self.nodes.clear();

        for (s, surf) in self.surfaces.iter().enumerate() {
            let Some(mesh) = self.meshes.get(s) else {
                continue;
            };
            let (uw, pnts) = (mesh.simp_uw(), mesh.simp_pnts());

            for tri in mesh.simp_tris() {
                let [i0, i1, i2] = tri.ind;
                let center = (uw[i0] + uw[i1] + uw[i2]) / 3.0;
                let orientation = surf
                    .core
                    .tangent_u(center.x, center.y)
                    .try_normalize(f64::EPSILON)
                    .unwrap_or_else(Vector3::zeros);

                let mut fea_tri =
                    FeaTri::create(&mut self.nodes, pnts[i0], pnts[i1], pnts[i2], orientation);
                fea_tri.fea_part_index = surf.fea_part_index;
                if tri.tags.len() > 1 {
                    fea_tri.fea_ss_index = self.tags.sub_surface_index(&tri.tags);
                }
                fea_tri.tag = self.tags.single_tag(&tri.tags);
                self.elements.push(FeaElement::Tri(fea_tri));
            }
        }

        for chain in &self.chains {
            let Some(cap) = beam_cap(chain, &self.surfaces, &self.structure) else {
                continue;
            };
            for j in 1..cap.points.len() {
                let mut beam = FeaBeam::create(
                    &mut self.nodes,
                    cap.points[j - 1],
                    cap.points[j],
                    cap.normals[j - 1],
                );
                beam.fea_part_index = cap.part;
                beam.fea_ss_index = cap.ss;
                self.elements.push(FeaElement::Beam(beam));
            }
        }
    }

    /// Merges coincident nodes and records on each surviving node every part
    /// whose elements reference it.
    pub fn tag_fea_nodes(&mut self) {
        let pnts: Vec<Point3<f64>> = self.nodes.iter().map(|n| n.pnt).collect();
        self.coincidence = CoincidenceMap::build(&pnts, COINCIDENCE_TOL);

        for (i, node) in self.nodes.iter_mut().enumerate() {
            node.tags.clear();
            node.index = self.coincidence.node_id(i);
        }

        for part in 0..self.num_parts() {
            for element in &self.elements {
                if element.fea_part_index() != Some(part) {
                    continue;
                }
                for n in element.nodes() {
                    let canonical = self.coincidence.canonical(*n);
                    self.nodes[canonical].add_tag(part);
                }
            }
        }
    }

    /// Elements owned by `part`, in creation order.
    pub fn part_elements(&self, part: usize) -> impl Iterator<Item = &FeaElement> {
        self.elements
            .iter()
            .filter(move |e| e.fea_part_index() == Some(part))
    }

    /// Surviving (unmerged) nodes in pool order.
    pub fn unique_nodes(&self) -> impl Iterator<Item = &FeaNode> {
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(i, _)| self.coincidence.is_unique(*i))
            .map(|(_, n)| n)
    }

    pub fn num_nodes(&self) -> usize {
        self.coincidence.num_unique
    }

    pub fn num_beams(&self) -> usize {
        self.elements.iter().filter(|e| e.is_beam()).count()
    }

    /// Shells are weighed with the part property, beams with its cap property.
    pub fn compute_mass(&self, store: &StructureStore) -> MassReport {
        let mut report = MassReport {
            structure_name: self.structure.name.clone(),
            ..MassReport::default()
        };

        for (p, part) in self.structure.parts.iter().enumerate() {
            let mut mass = 0.0;
            for element in self.part_elements(p) {
                let prop_index = if element.is_beam() {
                    part.cap_property
                } else {
                    part.property
                };
                let Some(property) = store.property(prop_index) else {
                    continue;
                };
                mass += element.compute_mass(
                    &self.nodes,
                    property,
                    store.property_density(prop_index),
                );
            }
            report.parts.push((part.name.clone(), mass));
            report.total += mass;
        }

        report
    }

    pub fn check_water_tight(&self) -> WaterTightReport {
        let mut edge_count: HashMap<(usize, usize), usize> = HashMap::new();
        for element in &self.elements {
            if element.is_beam() {
                continue;
            }
            let c: Vec<usize> = element
                .corners()
                .iter()
                .map(|n| self.coincidence.canonical(*n))
                .collect();
            for (a, b) in [(c[0], c[1]), (c[1], c[2]), (c[2], c[0])] {
                *edge_count.entry((a.min(b), a.max(b))).or_default() += 1;
            }
        }

        WaterTightReport {
            num_edges: edge_count.len(),
            open_edges: edge_count.values().filter(|n| **n == 1).count(),
            junction_edges: edge_count.values().filter(|n| **n > 2).count(),
        }
    }
}

/// Owns the run settings and the authoritative context of the last run.
#[derive(Debug)]
pub struct FeaMeshManager {
    pub settings: MeshSettings,
    pub export: ExportSettings,
    ctx: MeshContext,
    in_progress: Arc<AtomicBool>,
}

impl FeaMeshManager {
    pub fn new(settings: MeshSettings, export: ExportSettings) -> FeaMeshManager {
        FeaMeshManager {
            settings,
            export,
            ctx: MeshContext::default(),
            in_progress: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Readers must not look at the context while this is set.
    pub fn generation_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Shared handle to the in-progress flag for readers on other threads.
    pub fn progress_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.in_progress)
    }

    pub fn context(&self) -> &MeshContext {
        &self.ctx
    }

    /// Full pipeline for structure `index`. Invalid selections and empty
    /// geometry abort the run; per-format export failures are reported in the
    /// returned summary.
    pub fn generate(
        &mut self,
        store: &StructureStore,
        index: usize,
        triangulator: &mut dyn Triangulator,
    ) -> Result<GenerationReport, FeaMeshError> {
        if !store.valid_struct_index(index) {
            self.ctx.clean_up();
            return Err(FeaMeshError::InvalidSelection {
                index,
                count: store.structures.len(),
            });
        }

        self.in_progress.store(true, Ordering::SeqCst);
        let result = self.run_pipeline(store, index, triangulator);
        self.in_progress.store(false, Ordering::SeqCst);

        result
    }

    fn run_pipeline(
        &mut self,
        store: &StructureStore,
        index: usize,
        triangulator: &mut dyn Triangulator,
    ) -> Result<GenerationReport, FeaMeshError> {
        println!("info: Load Surfaces");
        self.ctx.load_surfaces(store, index)?;

        if self.ctx.surfaces.is_empty() {
            println!("warning [load]: no surfaces in structure {}", index);
            return Err(FeaMeshError::EmptyGeometry);
        }

        println!("info: Add Structure Parts");
        self.ctx.sub_tag_surfaces();

        println!("info: Intersect");
        self.ctx.intersect(triangulator, &self.settings);

        println!("info: InitMesh");
        let init_tris: usize = self.ctx.meshes.iter().map(|m| m.num_tris()).sum();
        println!(
            "info: {} surfaces, {} triangles, {} chains",
            self.ctx.surfaces.len(),
            init_tris,
            self.ctx.chains.len()
        );

        println!("info: Remesh");
        let remesh = self.ctx.remesh(&self.settings);

        println!("info: Build Fea Mesh");
        self.ctx.build_fea_mesh();

        println!("info: Tag Fea Nodes");
        self.ctx.tag_fea_nodes();

        println!("info: Exporting Files");
        let mass = self.ctx.compute_mass(store);
        let export = exporter::export_files(&self.ctx, store, &mass, &self.export);

        println!("info: Check Water Tight");
        let water_tight = self.ctx.check_water_tight();
        println!("info: {}", water_tight.message());

        println!("info: Finished");

        Ok(GenerationReport {
            num_elements: self.ctx.elements.len(),
            num_beams: self.ctx.num_beams(),
            num_nodes: self.ctx.num_nodes(),
            remesh,
            mass,
            export,
            water_tight,
        })
    }
}
