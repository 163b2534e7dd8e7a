//! Finite-element mesh generation and export for parametric structural
//! models: skins, spars, ribs and the sub-surfaces defined on them.

pub mod chains;
pub mod coincidence;
pub mod config;
pub mod datatypes;
pub mod element;
pub mod error;
pub mod exporter;
pub mod input;
pub mod mesh_mgr;
pub mod structure;
pub mod surface;
pub mod tags;
pub mod triangulate;
