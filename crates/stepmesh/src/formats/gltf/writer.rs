//! glTF / GLB export.
//!
//! The text variant writes a JSON file plus a sibling `.bin` buffer; the
//! binary variant packs JSON and buffer into the two GLB chunks. Both keep
//! the document's node hierarchy, decompose node transforms to TRS, and
//! turn captured STEP colours into base-color materials.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use glam::Quat;
use indexmap::IndexMap;

use crate::error::{ConvertError, Result};
use crate::export::{Exporter, Metadata, OutputFormat};
use crate::progress::PhaseScope;
use crate::scene::geometry::TriangleMesh;
use crate::scene::Document;

use super::schema::{
    Accessor, Buffer, BufferView, Gltf, Material, Mesh, Node, PbrMetallicRoughness, Primitive,
    Scene, COMPONENT_FLOAT, COMPONENT_UNSIGNED_INT, COMPONENT_UNSIGNED_SHORT, MODE_TRIANGLES,
    TARGET_ARRAY_BUFFER, TARGET_ELEMENT_ARRAY_BUFFER,
};

const GLB_MAGIC: u32 = 0x4654_6C67; // "glTF"
const GLB_CHUNK_JSON: u32 = 0x4E4F_534A;
const GLB_CHUNK_BIN: u32 = 0x004E_4942;

/// Exporter for both glTF flavours.
pub struct GltfExporter {
    binary: bool,
}

impl GltfExporter {
    /// JSON `.gltf` with a sibling `.bin` buffer file.
    pub fn text() -> Self {
        GltfExporter { binary: false }
    }

    /// Single-file binary `.glb`.
    pub fn binary() -> Self {
        GltfExporter { binary: true }
    }
}

impl Exporter for GltfExporter {
    fn format(&self) -> OutputFormat {
        if self.binary {
            OutputFormat::Glb
        } else {
            OutputFormat::Gltf
        }
    }

    fn export(
        &self,
        document: &Document,
        metadata: &Metadata,
        path: &Path,
        mut scope: PhaseScope<'_>,
    ) -> Result<()> {
        let format = self.format();
        let fail = |message: String| ConvertError::export(format, message);

        let mut gltf = Gltf {
            asset: asset_header(metadata),
            ..Gltf::default()
        };
        let mut buffer = BufferBuilder::default();

        // One material per distinct captured colour.
        let mut material_index: HashMap<[u32; 3], usize> = HashMap::new();
        let mut material_for_shape: Vec<Option<usize>> = Vec::new();
        for shape in document.shapes() {
            let material = shape.color.map(|rgb| {
                let key = rgb.map(f32::to_bits);
                *material_index.entry(key).or_insert_with(|| {
                    gltf.materials.push(Material {
                        name: Some(shape.name.clone()),
                        pbr_metallic_roughness: PbrMetallicRoughness {
                            base_color_factor: [rgb[0], rgb[1], rgb[2], 1.0],
                            metallic_factor: 0.0,
                            roughness_factor: 0.8,
                        },
                        double_sided: false,
                    });
                    gltf.materials.len() - 1
                })
            });
            material_for_shape.push(material);
        }

        // Geometry: one glTF mesh per meshed shape.
        let shape_count = document.shape_count().max(1);
        let mut mesh_for_shape: Vec<Option<usize>> = vec![None; document.shape_count()];
        for (index, shape) in document.shapes().iter().enumerate() {
            let Some(mesh) = &shape.mesh else { continue };
            if mesh.is_empty() {
                continue;
            }
            let primitive =
                encode_primitive(mesh, material_for_shape[index], &mut gltf, &mut buffer);
            gltf.meshes.push(Mesh {
                name: Some(shape.name.clone()),
                primitives: vec![primitive],
            });
            mesh_for_shape[index] = Some(gltf.meshes.len() - 1);
            scope.advance_to(0.7 * (index + 1) as f64 / shape_count as f64);
        }

        // Nodes mirror the document one-to-one, so child indices carry over.
        for node in document.nodes() {
            let (scale, rotation, translation) = node.transform.to_scale_rotation_translation();
            gltf.nodes.push(Node {
                name: Some(node.name.clone()),
                children: node.children.clone(),
                mesh: node.shape.and_then(|s| mesh_for_shape[s]),
                translation: (translation.length_squared() > 1e-12).then(|| translation.to_array()),
                rotation: (rotation.angle_between(Quat::IDENTITY) > 1e-6)
                    .then(|| rotation.to_array()),
                scale: ((scale - glam::Vec3::ONE).length_squared() > 1e-12)
                    .then(|| scale.to_array()),
            });
        }
        gltf.scenes.push(Scene {
            name: None,
            nodes: document.roots().to_vec(),
        });
        gltf.scene = Some(0);
        scope.advance_to(0.8);

        let data = buffer.data;
        if self.binary {
            gltf.buffers.push(Buffer {
                byte_length: data.len(),
                uri: None,
            });
            let json = serde_json::to_vec(&gltf).map_err(|e| fail(e.to_string()))?;
            fs::write(path, glb_bytes(json, data)).map_err(|e| fail(e.to_string()))?;
        } else {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("buffer");
            let bin_name = format!("{stem}.bin");
            gltf.buffers.push(Buffer {
                byte_length: data.len(),
                uri: Some(bin_name.clone()),
            });
            let json = serde_json::to_vec_pretty(&gltf).map_err(|e| fail(e.to_string()))?;
            fs::write(path.with_file_name(bin_name), &data).map_err(|e| fail(e.to_string()))?;
            fs::write(path, json).map_err(|e| fail(e.to_string()))?;
        }

        scope.complete();
        Ok(())
    }
}

/// Asset header carrying the metadata table in `extras`.
fn asset_header(metadata: &Metadata) -> super::schema::Asset {
    let extras = if metadata.is_empty() {
        None
    } else {
        let map: serde_json::Map<String, serde_json::Value> = metadata
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        Some(serde_json::Value::Object(map))
    };
    super::schema::Asset {
        generator: Some(concat!("stepmesh ", env!("CARGO_PKG_VERSION")).to_string()),
        extras,
        ..super::schema::Asset::default()
    }
}

/// Encode one mesh's vertex data and indices into the shared buffer.
fn encode_primitive(
    mesh: &TriangleMesh,
    material: Option<usize>,
    gltf: &mut Gltf,
    buffer: &mut BufferBuilder,
) -> Primitive {
    let mut attributes = IndexMap::new();

    let bounds = mesh.compute_bounds();
    let positions: Vec<u8> = mesh
        .positions
        .iter()
        .flat_map(|p| p.to_array().into_iter().flat_map(f32::to_le_bytes))
        .collect();
    let view = buffer.push(&positions, Some(TARGET_ARRAY_BUFFER), gltf);
    gltf.accessors.push(Accessor {
        buffer_view: view,
        component_type: COMPONENT_FLOAT,
        count: mesh.vertex_count(),
        accessor_type: "VEC3",
        min: Some(bounds.min.to_array().to_vec()),
        max: Some(bounds.max.to_array().to_vec()),
    });
    attributes.insert("POSITION".to_string(), gltf.accessors.len() - 1);

    if let Some(normals) = &mesh.normals {
        let bytes: Vec<u8> = normals
            .iter()
            .flat_map(|n| n.to_array().into_iter().flat_map(f32::to_le_bytes))
            .collect();
        let view = buffer.push(&bytes, Some(TARGET_ARRAY_BUFFER), gltf);
        gltf.accessors.push(Accessor {
            buffer_view: view,
            component_type: COMPONENT_FLOAT,
            count: normals.len(),
            accessor_type: "VEC3",
            min: None,
            max: None,
        });
        attributes.insert("NORMAL".to_string(), gltf.accessors.len() - 1);
    }

    // Narrow indices to u16 when every vertex fits.
    let (index_bytes, component_type) = if mesh.vertex_count() <= u16::MAX as usize + 1 {
        let bytes = mesh
            .indices
            .iter()
            .flat_map(|&i| (i as u16).to_le_bytes())
            .collect::<Vec<u8>>();
        (bytes, COMPONENT_UNSIGNED_SHORT)
    } else {
        let bytes = mesh
            .indices
            .iter()
            .flat_map(|&i| i.to_le_bytes())
            .collect::<Vec<u8>>();
        (bytes, COMPONENT_UNSIGNED_INT)
    };
    let view = buffer.push(&index_bytes, Some(TARGET_ELEMENT_ARRAY_BUFFER), gltf);
    gltf.accessors.push(Accessor {
        buffer_view: view,
        component_type,
        count: mesh.indices.len(),
        accessor_type: "SCALAR",
        min: None,
        max: None,
    });

    Primitive {
        attributes,
        indices: Some(gltf.accessors.len() - 1),
        material,
        mode: MODE_TRIANGLES,
    }
}

/// Accumulates the single binary buffer, one aligned view per push.
#[derive(Default)]
struct BufferBuilder {
    data: Vec<u8>,
}

impl BufferBuilder {
    fn push(&mut self, bytes: &[u8], target: Option<u32>, gltf: &mut Gltf) -> usize {
        while self.data.len() % 4 != 0 {
            self.data.push(0);
        }
        gltf.buffer_views.push(BufferView {
            buffer: 0,
            byte_offset: self.data.len(),
            byte_length: bytes.len(),
            target,
        });
        self.data.extend_from_slice(bytes);
        gltf.buffer_views.len() - 1
    }
}

/// Assemble the GLB container: 12-byte header, space-padded JSON chunk,
/// zero-padded BIN chunk.
fn glb_bytes(mut json: Vec<u8>, mut bin: Vec<u8>) -> Vec<u8> {
    while json.len() % 4 != 0 {
        json.push(b' ');
    }
    while bin.len() % 4 != 0 {
        bin.push(0);
    }
    let total = 12 + 8 + json.len() + 8 + bin.len();

    let mut out = Vec::with_capacity(total);
    out.extend(GLB_MAGIC.to_le_bytes());
    out.extend(2u32.to_le_bytes());
    out.extend((total as u32).to_le_bytes());
    out.extend((json.len() as u32).to_le_bytes());
    out.extend(GLB_CHUNK_JSON.to_le_bytes());
    out.extend(json);
    out.extend((bin.len() as u32).to_le_bytes());
    out.extend(GLB_CHUNK_BIN.to_le_bytes());
    out.extend(bin);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentProgress;
    use crate::scene::geometry::BrepShape;
    use crate::scene::{DocumentNode, DocumentState, Shape};
    use glam::{Mat4, Vec3};
    use serde_json::Value;

    fn triangle_mesh() -> TriangleMesh {
        TriangleMesh {
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            normals: Some(vec![Vec3::Z; 3]),
            indices: vec![0, 1, 2],
        }
    }

    fn sample_document() -> Document {
        let mut doc = Document::new();
        let shape = doc.add_shape(Shape {
            name: "part".into(),
            color: Some([0.2, 0.4, 0.6]),
            brep: BrepShape::default(),
            mesh: Some(triangle_mesh()),
        });
        let root = doc.add_root(
            DocumentNode::new("asm").transformed(Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0))),
        );
        doc.add_child(root, DocumentNode::with_shape("part", shape));
        doc.transition(DocumentState::Populated);
        doc.transition(DocumentState::Meshed);
        doc
    }

    fn metadata() -> Metadata {
        let mut m = Metadata::new();
        m.insert("source".into(), "model.step".into());
        m
    }

    #[test]
    fn test_text_gltf_with_sibling_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.gltf");
        let sink = SilentProgress;
        GltfExporter::text()
            .export(&sample_document(), &metadata(), &path, PhaseScope::root(&sink))
            .unwrap();

        let json: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(json["asset"]["version"], "2.0");
        assert_eq!(json["asset"]["extras"]["source"], "model.step");
        assert_eq!(json["buffers"][0]["uri"], "out.bin");

        let bin = fs::read(dir.path().join("out.bin")).unwrap();
        assert_eq!(json["buffers"][0]["byteLength"], bin.len() as u64);

        // Hierarchy preserved: root node with translation, child with mesh.
        assert_eq!(json["scenes"][0]["nodes"][0], 0);
        assert_eq!(json["nodes"][0]["name"], "asm");
        assert_eq!(json["nodes"][0]["translation"][2], 3.0);
        assert_eq!(json["nodes"][1]["mesh"], 0);

        // Small mesh narrows to unsigned short indices.
        let index_accessor = &json["accessors"][2];
        assert_eq!(index_accessor["componentType"], 5123);
        assert_eq!(index_accessor["count"], 3);

        // Captured colour became a material.
        let factor = &json["materials"][0]["pbrMetallicRoughness"]["baseColorFactor"];
        assert!((factor[1].as_f64().unwrap() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_position_accessor_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.gltf");
        let sink = SilentProgress;
        GltfExporter::text()
            .export(&sample_document(), &metadata(), &path, PhaseScope::root(&sink))
            .unwrap();

        let json: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(json["accessors"][0]["type"], "VEC3");
        assert_eq!(json["accessors"][0]["min"], serde_json::json!([0.0, 0.0, 0.0]));
        assert_eq!(json["accessors"][0]["max"], serde_json::json!([1.0, 1.0, 0.0]));
    }

    #[test]
    fn test_glb_container_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.glb");
        let sink = SilentProgress;
        GltfExporter::binary()
            .export(&sample_document(), &metadata(), &path, PhaseScope::root(&sink))
            .unwrap();

        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[0..4], b"glTF");
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 2);
        assert_eq!(
            u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize,
            bytes.len()
        );

        let json_len = u32::from_le_bytes(bytes[12..16].try_into().unwrap()) as usize;
        assert_eq!(json_len % 4, 0);
        assert_eq!(&bytes[16..20], b"JSON");

        let json: Value = serde_json::from_slice(&bytes[20..20 + json_len]).unwrap();
        assert!(json["buffers"][0]["uri"].is_null());

        let bin_header = 20 + json_len;
        let bin_len =
            u32::from_le_bytes(bytes[bin_header..bin_header + 4].try_into().unwrap()) as usize;
        assert_eq!(bin_len % 4, 0);
        assert_eq!(&bytes[bin_header + 4..bin_header + 8], b"BIN\0");
        assert_eq!(bytes.len(), bin_header + 8 + bin_len);
    }
}
