//! Per-shape tessellation stage.

mod tessellate;

pub use tessellate::tessellate_face;

use tracing::{debug, warn};

use crate::config::ToleranceConfig;
use crate::progress::PhaseScope;
use crate::scene::geometry::{BrepShape, TriangleMesh};
use crate::scene::{Document, DocumentState};

/// Walks the document's shapes and attaches a triangle mesh to each,
/// dividing its phase scope evenly between them.
///
/// Per-shape failures are recoverable: the shape is left untessellated and
/// the stage carries on.
pub struct MeshingStage<'a> {
    config: &'a ToleranceConfig,
}

impl<'a> MeshingStage<'a> {
    pub fn new(config: &'a ToleranceConfig) -> Self {
        MeshingStage { config }
    }

    pub fn run(&self, document: &mut Document, mut scope: PhaseScope<'_>) {
        let count = document.shape_count();
        let linear = self.config.linear_deflection as f32;
        let angular = self.config.angular_deflection as f32;

        for index in 0..count {
            let mut shape_scope = scope.child(1.0 / count as f64);
            if shape_scope.should_abort() {
                shape_scope.complete();
                break;
            }

            let shape = &mut document.shapes_mut()[index];
            if shape.brep.is_empty() {
                debug!(shape = %shape.name, "degenerate shape, nothing to mesh");
                shape_scope.complete();
                continue;
            }

            let mesh = tessellate_shape(
                &shape.brep,
                linear,
                angular,
                &shape.name,
                &mut shape_scope,
            );
            if mesh.is_empty() {
                warn!(shape = %shape.name, "tessellation produced no triangles, shape left unmeshed");
            } else {
                debug!(
                    shape = %shape.name,
                    triangles = mesh.triangle_count(),
                    vertices = mesh.vertex_count(),
                    "shape meshed"
                );
                shape.mesh = Some(mesh);
            }
            shape_scope.complete();
        }

        document.transition(DocumentState::Meshed);
        scope.complete();
    }
}

/// Tessellate every face of a shape into one mesh, advancing the scope
/// per face. Faces that fail are skipped and counted.
pub fn tessellate_shape(
    brep: &BrepShape,
    linear: f32,
    angular: f32,
    name: &str,
    scope: &mut PhaseScope<'_>,
) -> TriangleMesh {
    let mut mesh = TriangleMesh::new();
    let total = brep.faces.len();
    let mut skipped = 0usize;

    for (index, face) in brep.faces.iter().enumerate() {
        match tessellate_face(face, linear, angular) {
            Some(part) => mesh.append(&part),
            None => skipped += 1,
        }
        scope.advance_to((index + 1) as f64 / total as f64);
    }

    if skipped > 0 {
        warn!(shape = name, skipped, total, "faces skipped during tessellation");
    }
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{PhaseScope, ProgressSink};
    use crate::scene::geometry::{BrepFace, Curve, Edge, Surface, Wire};
    use crate::scene::{DocumentNode, Shape};
    use glam::Vec3;
    use std::sync::Mutex;

    /// Axis-aligned unit cube as six planar trimmed faces.
    pub(crate) fn unit_cube() -> BrepShape {
        fn quad(origin: Vec3, u_axis: Vec3, v_axis: Vec3, size: f32) -> BrepFace {
            let corners = [
                origin,
                origin + u_axis * size,
                origin + u_axis * size + v_axis * size,
                origin + v_axis * size,
            ];
            let edges = (0..4)
                .map(|i| Edge {
                    curve: Curve::Line,
                    start: corners[i],
                    end: corners[(i + 1) % 4],
                })
                .collect();
            BrepFace {
                surface: Surface::Plane {
                    origin,
                    normal: u_axis.cross(v_axis),
                    u_axis,
                    v_axis,
                },
                outer: Wire { edges },
                holes: Vec::new(),
                same_sense: true,
            }
        }

        let (o, x, y, z) = (Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::Z);
        BrepShape {
            faces: vec![
                quad(o, y, x, 1.0),                   // bottom, normal -z
                quad(z, x, y, 1.0),                   // top, normal +z
                quad(o, x, z, 1.0),                   // front, normal -y
                quad(y, z, x, 1.0),                   // back, normal +y
                quad(o, z, y, 1.0),                   // left, normal -x
                quad(x, y, z, 1.0),                   // right, normal +x
            ],
        }
    }

    struct Recorder(Mutex<Vec<f64>>);

    impl ProgressSink for Recorder {
        fn advance(&self, fraction: f64) {
            self.0.lock().unwrap().push(fraction);
        }
    }

    #[test]
    fn test_cube_counts() {
        let sink = Recorder(Mutex::new(Vec::new()));
        let mut scope = PhaseScope::root(&sink);
        let mesh = tessellate_shape(&unit_cube(), 0.1, 0.5, "cube", &mut scope);
        // Two triangles and four vertices per face, faces unshared.
        assert_eq!(mesh.triangle_count(), 12);
        assert_eq!(mesh.vertex_count(), 24);

        let bounds = mesh.compute_bounds();
        assert!((bounds.min - Vec3::ZERO).length() < 1e-6);
        assert!((bounds.max - Vec3::ONE).length() < 1e-6);
    }

    #[test]
    fn test_cube_normals_point_outward() {
        let sink = Recorder(Mutex::new(Vec::new()));
        let mut scope = PhaseScope::root(&sink);
        let mesh = tessellate_shape(&unit_cube(), 0.1, 0.5, "cube", &mut scope);
        let center = Vec3::splat(0.5);
        for (p, n) in mesh.positions.iter().zip(mesh.normals.as_ref().unwrap()) {
            assert!(n.dot(*p - center) > 0.0, "inward normal at {p:?}");
        }
    }

    #[test]
    fn test_stage_meshes_all_shapes_and_fills_scope() {
        let mut document = Document::new();
        for name in ["a", "b", "c"] {
            let shape = document.add_shape(Shape {
                name: name.to_string(),
                color: None,
                brep: unit_cube(),
                mesh: None,
            });
            document.add_root(DocumentNode::with_shape(name, shape));
        }
        document.transition(DocumentState::Populated);

        let config = ToleranceConfig::default();
        let sink = Recorder(Mutex::new(Vec::new()));
        MeshingStage::new(&config).run(&mut document, PhaseScope::root(&sink));

        assert_eq!(document.state(), DocumentState::Meshed);
        assert!(document.shapes().iter().all(|s| s.mesh.is_some()));

        let events = sink.0.lock().unwrap();
        assert!((events.last().copied().unwrap() - 1.0).abs() < 1e-9);
        assert!(events.windows(2).all(|w| w[1] >= w[0] - 1e-9));
    }

    #[test]
    fn test_degenerate_shape_is_skipped_not_fatal() {
        let mut document = Document::new();
        let empty = document.add_shape(Shape {
            name: "empty".to_string(),
            color: None,
            brep: BrepShape::default(),
            mesh: None,
        });
        document.add_root(DocumentNode::with_shape("empty", empty));
        let cube = document.add_shape(Shape {
            name: "cube".to_string(),
            color: None,
            brep: unit_cube(),
            mesh: None,
        });
        document.add_root(DocumentNode::with_shape("cube", cube));
        document.transition(DocumentState::Populated);

        let config = ToleranceConfig::default();
        let sink = Recorder(Mutex::new(Vec::new()));
        MeshingStage::new(&config).run(&mut document, PhaseScope::root(&sink));

        assert!(document.shapes()[0].mesh.is_none());
        assert!(document.shapes()[1].mesh.is_some());
        assert_eq!(document.state(), DocumentState::Meshed);
        assert!((sink.0.lock().unwrap().last().copied().unwrap() - 1.0).abs() < 1e-9);
    }
}
