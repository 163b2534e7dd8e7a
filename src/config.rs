//! Tolerances, fixed budgets and runtime settings for a mesh generation run.

use std::path::{Path, PathBuf};

/// Number of straight pieces each sub-surface boundary segment is split into
/// before it is mapped onto its host surface.
pub const SUBSURF_SEGMENT_DIVISIONS: usize = 100;

/// Parametric tolerance used to detect a sub-surface segment lying on a
/// min/max isoline of the host surface.
pub const PARAM_EDGE_TOL: f64 = 1e-6;

/// Remeshing passes per surface under the default policy.
pub const REMESH_ITERATIONS: usize = 10;

/// Distance under which two points are the same node.
pub const COINCIDENCE_TOL: f64 = 1e-8;

/// Target element edge length when the input does not give one.
pub const DEFAULT_MAX_EDGE_LEN: f64 = 1.0;

/// How many remeshing passes a surface receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemeshPolicy {
    /// Always run exactly this many passes.
    Fixed(usize),
    /// Stop once two consecutive passes report the same triangle count.
    UntilStable { max_iterations: usize },
}

impl RemeshPolicy {
    pub fn max_iterations(&self) -> usize {
        match self {
            RemeshPolicy::Fixed(n) => *n,
            RemeshPolicy::UntilStable { max_iterations } => *max_iterations,
        }
    }

    /// Returns true when the driver may stop after a pass that produced
    /// `current` triangles, the previous pass having produced `previous`.
    pub fn converged(&self, previous: Option<usize>, current: usize) -> bool {
        match self {
            RemeshPolicy::Fixed(_) => false,
            RemeshPolicy::UntilStable { .. } => previous == Some(current),
        }
    }
}

impl Default for RemeshPolicy {
    fn default() -> Self {
        RemeshPolicy::Fixed(REMESH_ITERATIONS)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshSettings {
    pub max_edge_len: f64,
    pub intersect_sub_surfaces: bool,
    pub remesh_policy: RemeshPolicy,
    /// Hides progress bars
    pub quiet: bool,
}

impl Default for MeshSettings {
    fn default() -> Self {
        MeshSettings {
            max_edge_len: DEFAULT_MAX_EDGE_LEN,
            intersect_sub_surfaces: true,
            remesh_policy: RemeshPolicy::default(),
            quiet: false,
        }
    }
}

/// The on-disk outputs of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Nastran,
    Calculix,
    Gmsh,
    Stl,
    Mass,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 5] = [
        ExportFormat::Nastran,
        ExportFormat::Calculix,
        ExportFormat::Gmsh,
        ExportFormat::Stl,
        ExportFormat::Mass,
    ];

    fn suffix(&self) -> &'static str {
        match self {
            ExportFormat::Nastran => "_NASTRAN.dat",
            ExportFormat::Calculix => "_calculix_fea.inp",
            ExportFormat::Gmsh => "_fea.msh",
            ExportFormat::Stl => "_fea.stl",
            ExportFormat::Mass => "_mass.txt",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportSettings {
    pub output_dir: PathBuf,
    pub base_name: String,
    pub nastran: bool,
    pub calculix: bool,
    pub gmsh: bool,
    pub stl: bool,
}

impl ExportSettings {
    pub fn new(output_dir: impl AsRef<Path>, base_name: &str) -> ExportSettings {
        ExportSettings {
            output_dir: output_dir.as_ref().to_path_buf(),
            base_name: base_name.to_owned(),
            nastran: true,
            calculix: true,
            gmsh: true,
            stl: true,
        }
    }

    pub fn enabled(&self, format: ExportFormat) -> bool {
        match format {
            ExportFormat::Nastran => self.nastran,
            ExportFormat::Calculix => self.calculix,
            ExportFormat::Gmsh => self.gmsh,
            ExportFormat::Stl => self.stl,
            ExportFormat::Mass => true,
        }
    }

    pub fn file_name(&self, format: ExportFormat) -> PathBuf {
        self.output_dir
            .join(format!("{}{}", self.base_name, format.suffix()))
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        ExportSettings::new(".", "fea_mesh")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_fixed_budget() {
        let policy = RemeshPolicy::default();
        assert_eq!(policy.max_iterations(), REMESH_ITERATIONS);
        assert!(!policy.converged(Some(12), 12));
    }

    #[test]
    fn until_stable_stops_on_repeat() {
        let policy = RemeshPolicy::UntilStable { max_iterations: 10 };
        assert!(!policy.converged(None, 8));
        assert!(!policy.converged(Some(10), 8));
        assert!(policy.converged(Some(8), 8));
    }

    #[test]
    fn export_file_names() {
        let settings = ExportSettings::new("/tmp/out", "wing");
        assert_eq!(
            settings.file_name(ExportFormat::Nastran),
            PathBuf::from("/tmp/out/wing_NASTRAN.dat")
        );
        assert_eq!(
            settings.file_name(ExportFormat::Gmsh),
            PathBuf::from("/tmp/out/wing_fea.msh")
        );
        assert!(settings.enabled(ExportFormat::Mass));
    }
}
