//! Binary STL export.
//!
//! STL has no notion of a scene graph, so the document's leaf nodes are
//! flattened into one world-space compound first. The write itself is a
//! single synchronous step; the phase scope jumps to completion once the
//! file is on disk.

use std::fs;
use std::path::Path;

use glam::Vec3;

use crate::error::{ConvertError, Result};
use crate::export::{flatten_to_compound, Exporter, Metadata, OutputFormat};
use crate::progress::PhaseScope;
use crate::scene::Document;

const HEADER_LEN: usize = 80;
const TRIANGLE_LEN: usize = 50;

pub struct StlExporter;

impl Exporter for StlExporter {
    fn format(&self) -> OutputFormat {
        OutputFormat::Stl
    }

    fn export(
        &self,
        document: &Document,
        _metadata: &Metadata,
        path: &Path,
        scope: PhaseScope<'_>,
    ) -> Result<()> {
        let compound = flatten_to_compound(document);
        let count = compound.triangle_count();

        let mut bytes = Vec::with_capacity(HEADER_LEN + 4 + count * TRIANGLE_LEN);
        let mut header = [0u8; HEADER_LEN];
        let tag = b"stepmesh binary STL";
        header[..tag.len()].copy_from_slice(tag);
        bytes.extend_from_slice(&header);
        bytes.extend((count as u32).to_le_bytes());

        for tri in compound.indices.chunks_exact(3) {
            let a = compound.positions[tri[0] as usize];
            let b = compound.positions[tri[1] as usize];
            let c = compound.positions[tri[2] as usize];
            let normal = (b - a).cross(c - a).normalize_or_zero();
            for v in [normal, a, b, c] {
                push_vec3(&mut bytes, v);
            }
            bytes.extend(0u16.to_le_bytes());
        }

        fs::write(path, bytes).map_err(|e| ConvertError::export(OutputFormat::Stl, e.to_string()))?;
        scope.complete();
        Ok(())
    }
}

fn push_vec3(bytes: &mut Vec<u8>, v: Vec3) {
    bytes.extend(v.x.to_le_bytes());
    bytes.extend(v.y.to_le_bytes());
    bytes.extend(v.z.to_le_bytes());
}
