use std::path::PathBuf;

use clap::Parser;

use fea_mesh::{input, mesh_mgr::FeaMeshManager, triangulate::GridTriangulator};

/// Generate and export a finite-element mesh for one structure of an input file
#[derive(Parser, Debug)]
#[command(name = "fea_mesh", version)]
struct Args {
    /// Input json describing structures, properties and materials
    input: PathBuf,

    /// Index of the structure to mesh
    #[arg(short, long, default_value_t = 0)]
    structure: usize,

    /// Overrides the output directory from the input file
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Hide progress bars
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let args = Args::parse();

    let mut input = match input::load_input_file(&args.input) {
        Ok(i) => i,
        Err(err) => {
            println!("error: {err}");
            std::process::exit(1)
        }
    };

    if let Some(dir) = args.output_dir {
        input.export.output_dir = dir;
    }
    input.mesh.quiet = args.quiet;

    let mut triangulator = GridTriangulator::new(input.mesh.max_edge_len);
    let mut manager = FeaMeshManager::new(input.mesh, input.export);

    let report = match manager.generate(&input.store, args.structure, &mut triangulator) {
        Ok(r) => r,
        Err(err) => {
            println!("error: {err}");
            std::process::exit(1)
        }
    };

    println!(
        "info: {} elements ({} beams), {} nodes, total mass {}",
        report.num_elements, report.num_beams, report.num_nodes, report.mass.total
    );

    if !report.export.is_complete() {
        println!(
            "warning [export]: {} of the output files could not be written",
            report.export.failed.len()
        );
        std::process::exit(2)
    }
}
