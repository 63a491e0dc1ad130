//! File format support: STEP import and the mesh exporters.

pub mod gltf;
pub mod obj;
pub mod step;
pub mod stl;
