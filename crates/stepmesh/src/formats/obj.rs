//! Wavefront OBJ export.
//!
//! One `o` block per leaf node, vertices written in world space, faces
//! with global 1-based `v//vn` indices. The metadata table becomes header
//! comments.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::error::{ConvertError, Result};
use crate::export::{Exporter, Metadata, OutputFormat};
use crate::progress::PhaseScope;
use crate::scene::Document;

pub struct ObjExporter;

impl Exporter for ObjExporter {
    fn format(&self) -> OutputFormat {
        OutputFormat::Obj
    }

    fn export(
        &self,
        document: &Document,
        metadata: &Metadata,
        path: &Path,
        mut scope: PhaseScope<'_>,
    ) -> Result<()> {
        let fail = |message: String| ConvertError::export(OutputFormat::Obj, message);

        let mut out = String::new();
        for (key, value) in metadata {
            let _ = writeln!(out, "# {key}: {value}");
        }

        let leaves: Vec<_> = document
            .leaves()
            .filter_map(|(node, world)| {
                let mesh = document.shapes()[node.shape?].mesh.as_ref()?;
                Some((node, world, mesh))
            })
            .collect();
        let total = leaves.len().max(1);

        // OBJ indices are global and 1-based across all objects.
        let mut vertex_base = 1usize;
        let mut normal_base = 1usize;
        for (index, (node, world, mesh)) in leaves.into_iter().enumerate() {
            let mesh = mesh.transformed(world);
            let _ = writeln!(out, "o {}", object_name(&node.name));

            for p in &mesh.positions {
                let _ = writeln!(out, "v {:.6} {:.6} {:.6}", p.x, p.y, p.z);
            }
            if let Some(normals) = &mesh.normals {
                for n in normals {
                    let _ = writeln!(out, "vn {:.6} {:.6} {:.6}", n.x, n.y, n.z);
                }
            }

            for tri in mesh.indices.chunks_exact(3) {
                if mesh.normals.is_some() {
                    let _ = writeln!(
                        out,
                        "f {}//{} {}//{} {}//{}",
                        vertex_base + tri[0] as usize,
                        normal_base + tri[0] as usize,
                        vertex_base + tri[1] as usize,
                        normal_base + tri[1] as usize,
                        vertex_base + tri[2] as usize,
                        normal_base + tri[2] as usize,
                    );
                } else {
                    let _ = writeln!(
                        out,
                        "f {} {} {}",
                        vertex_base + tri[0] as usize,
                        vertex_base + tri[1] as usize,
                        vertex_base + tri[2] as usize,
                    );
                }
            }

            vertex_base += mesh.vertex_count();
            if let Some(normals) = &mesh.normals {
                normal_base += normals.len();
            }
            scope.advance_to(0.9 * (index + 1) as f64 / total as f64);
        }

        fs::write(path, out).map_err(|e| fail(e.to_string()))?;
        scope.complete();
        Ok(())
    }
}

/// OBJ object names cannot contain whitespace.
fn object_name(name: &str) -> String {
    if name.is_empty() {
        return "unnamed".to_string();
    }
    name.chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}
