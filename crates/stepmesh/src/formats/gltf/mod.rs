//! glTF 2.0 export (text and binary containers).

mod schema;
mod writer;

pub use writer::GltfExporter;
