//! Mesh and B-rep geometry types.

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// A triangle mesh with optional per-vertex normals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriangleMesh {
    /// Vertex positions.
    pub positions: Vec<Vec3>,
    /// Per-vertex normals, if known.
    pub normals: Option<Vec<Vec3>>,
    /// Triangle indices, three per triangle.
    pub indices: Vec<u32>,
}

impl TriangleMesh {
    /// Create a new empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// True if the mesh carries no triangles.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Compute the axis-aligned bounding box.
    pub fn compute_bounds(&self) -> BoundingBox {
        BoundingBox::from_points(&self.positions)
    }

    /// Compute area-weighted vertex normals if none are present.
    pub fn compute_normals(&mut self) {
        if self.normals.is_some() {
            return;
        }

        let mut normals = vec![Vec3::ZERO; self.positions.len()];
        for tri in self.indices.chunks_exact(3) {
            let (i0, i1, i2) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
            let n = (self.positions[i1] - self.positions[i0])
                .cross(self.positions[i2] - self.positions[i0]);
            normals[i0] += n;
            normals[i1] += n;
            normals[i2] += n;
        }
        for n in &mut normals {
            *n = n.normalize_or_zero();
        }
        self.normals = Some(normals);
    }

    /// Return a copy with positions (and normals) carried through `transform`.
    pub fn transformed(&self, transform: Mat4) -> Self {
        let positions = self
            .positions
            .iter()
            .map(|p| transform.transform_point3(*p))
            .collect();
        let normals = self.normals.as_ref().map(|ns| {
            ns.iter()
                .map(|n| transform.transform_vector3(*n).normalize_or_zero())
                .collect()
        });
        Self {
            positions,
            normals,
            indices: self.indices.clone(),
        }
    }

    /// Append another mesh, rebasing its indices.
    pub fn append(&mut self, other: &TriangleMesh) {
        let base = self.positions.len() as u32;
        match (&mut self.normals, &other.normals) {
            (Some(ours), Some(theirs)) => ours.extend_from_slice(theirs),
            (Some(ours), None) => {
                ours.extend(std::iter::repeat(Vec3::Z).take(other.positions.len()));
            }
            (None, Some(theirs)) => {
                let mut normals = vec![Vec3::Z; base as usize];
                normals.extend_from_slice(theirs);
                self.normals = Some(normals);
            }
            (None, None) => {}
        }
        self.positions.extend_from_slice(&other.positions);
        self.indices.extend(other.indices.iter().map(|i| i + base));
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Minimum corner.
    pub min: Vec3,
    /// Maximum corner.
    pub max: Vec3,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            min: Vec3::splat(f32::MAX),
            max: Vec3::splat(f32::MIN),
        }
    }
}

impl BoundingBox {
    /// Bounding box of a point set.
    pub fn from_points(points: &[Vec3]) -> Self {
        let mut bounds = Self::default();
        for p in points {
            bounds.min = bounds.min.min(*p);
            bounds.max = bounds.max.max(*p);
        }
        bounds
    }
}

/// Symbolic boundary representation of one solid: a bag of trimmed faces.
#[derive(Debug, Clone, Default)]
pub struct BrepShape {
    /// Trimmed faces making up the shell(s).
    pub faces: Vec<BrepFace>,
}

impl BrepShape {
    /// True if the shape carries no faces at all (null/degenerate shape).
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}

/// One trimmed face: a surface bounded by an outer wire plus hole wires.
#[derive(Debug, Clone)]
pub struct BrepFace {
    /// The underlying analytic surface.
    pub surface: Surface,
    /// Outer boundary loop.
    pub outer: Wire,
    /// Inner (hole) loops.
    pub holes: Vec<Wire>,
    /// False if the face normal opposes the surface normal.
    pub same_sense: bool,
}

/// An ordered, oriented loop of edges.
#[derive(Debug, Clone, Default)]
pub struct Wire {
    /// Edges in loop order; each edge's `end` meets the next edge's `start`.
    pub edges: Vec<Edge>,
}

/// An oriented edge with resolved endpoints.
#[derive(Debug, Clone)]
pub struct Edge {
    /// The basis curve.
    pub curve: Curve,
    /// Start point in edge orientation.
    pub start: Vec3,
    /// End point in edge orientation.
    pub end: Vec3,
}

/// Basis curve of an edge.
#[derive(Debug, Clone)]
pub enum Curve {
    /// Straight segment between the edge endpoints.
    Line,
    /// Circular arc swept counterclockwise about `axis` from `start` to `end`.
    Arc {
        /// Circle center.
        center: Vec3,
        /// Rotation axis (unit).
        axis: Vec3,
        /// Reference direction at angle zero (unit, perpendicular to `axis`).
        x_dir: Vec3,
        /// Circle radius.
        radius: f32,
    },
}

/// An analytic surface with an orthonormal placement frame.
///
/// Parameterizations follow the usual conventions: `u` is the angle around
/// the frame's z axis for rotational surfaces, `v` runs along the axis
/// (cylinder, cone), latitude (sphere), or the minor angle (torus).
#[derive(Debug, Clone)]
pub enum Surface {
    /// Flat plane spanned by `u_axis`/`v_axis` through `origin`.
    Plane {
        origin: Vec3,
        normal: Vec3,
        u_axis: Vec3,
        v_axis: Vec3,
    },
    /// Cylinder of `radius` about the axis through `origin`.
    Cylinder {
        origin: Vec3,
        axis: Vec3,
        x_dir: Vec3,
        radius: f32,
    },
    /// Cone with base `radius` at `origin`, opening by `half_angle` along `axis`.
    Cone {
        origin: Vec3,
        axis: Vec3,
        x_dir: Vec3,
        radius: f32,
        half_angle: f32,
    },
    /// Sphere of `radius` about `center`.
    Sphere {
        center: Vec3,
        axis: Vec3,
        x_dir: Vec3,
        radius: f32,
    },
    /// Torus: tube of `minor_radius` around a circle of `major_radius`.
    Torus {
        center: Vec3,
        axis: Vec3,
        x_dir: Vec3,
        major_radius: f32,
        minor_radius: f32,
    },
}

impl Surface {
    /// Second in-plane axis of a rotational surface's frame (y = z × x).
    fn y_dir(axis: Vec3, x_dir: Vec3) -> Vec3 {
        axis.cross(x_dir)
    }

    /// Evaluate the surface point at parameters `(u, v)`.
    pub fn point_at(&self, u: f32, v: f32) -> Vec3 {
        match *self {
            Surface::Plane {
                origin,
                u_axis,
                v_axis,
                ..
            } => origin + u_axis * u + v_axis * v,
            Surface::Cylinder {
                origin,
                axis,
                x_dir,
                radius,
            } => {
                let y = Self::y_dir(axis, x_dir);
                origin + (x_dir * u.cos() + y * u.sin()) * radius + axis * v
            }
            Surface::Cone {
                origin,
                axis,
                x_dir,
                radius,
                half_angle,
            } => {
                let y = Self::y_dir(axis, x_dir);
                let r = radius + v * half_angle.tan();
                origin + (x_dir * u.cos() + y * u.sin()) * r + axis * v
            }
            Surface::Sphere {
                center,
                axis,
                x_dir,
                radius,
            } => {
                let y = Self::y_dir(axis, x_dir);
                center
                    + (x_dir * u.cos() + y * u.sin()) * (radius * v.cos())
                    + axis * (radius * v.sin())
            }
            Surface::Torus {
                center,
                axis,
                x_dir,
                major_radius,
                minor_radius,
            } => {
                let y = Self::y_dir(axis, x_dir);
                let ring = x_dir * u.cos() + y * u.sin();
                center + ring * (major_radius + minor_radius * v.cos()) + axis * (minor_radius * v.sin())
            }
        }
    }

    /// Outward surface normal at parameters `(u, v)`.
    pub fn normal_at(&self, u: f32, v: f32) -> Vec3 {
        match *self {
            Surface::Plane { normal, .. } => normal,
            Surface::Cylinder { axis, x_dir, .. } => {
                let y = Self::y_dir(axis, x_dir);
                x_dir * u.cos() + y * u.sin()
            }
            Surface::Cone {
                axis,
                x_dir,
                half_angle,
                ..
            } => {
                let y = Self::y_dir(axis, x_dir);
                let radial = x_dir * u.cos() + y * u.sin();
                (radial * half_angle.cos() - axis * half_angle.sin()).normalize_or_zero()
            }
            Surface::Sphere { axis, x_dir, .. } => {
                let y = Self::y_dir(axis, x_dir);
                (x_dir * u.cos() + y * u.sin()) * v.cos() + axis * v.sin()
            }
            Surface::Torus { axis, x_dir, .. } => {
                let y = Self::y_dir(axis, x_dir);
                (x_dir * u.cos() + y * u.sin()) * v.cos() + axis * v.sin()
            }
        }
    }

    /// Project a surface point back to `(u, v)` parameters.
    ///
    /// For rotational surfaces the angle comes back in `[-π, π]`; callers
    /// unwrap it along boundary loops.
    pub fn uv_of(&self, point: Vec3) -> [f32; 2] {
        match *self {
            Surface::Plane {
                origin,
                u_axis,
                v_axis,
                ..
            } => {
                let d = point - origin;
                [d.dot(u_axis), d.dot(v_axis)]
            }
            Surface::Cylinder {
                origin,
                axis,
                x_dir,
                ..
            } => {
                let y = Self::y_dir(axis, x_dir);
                let d = point - origin;
                let v = d.dot(axis);
                [d.dot(y).atan2(d.dot(x_dir)), v]
            }
            Surface::Cone {
                origin,
                axis,
                x_dir,
                ..
            } => {
                let y = Self::y_dir(axis, x_dir);
                let d = point - origin;
                [d.dot(y).atan2(d.dot(x_dir)), d.dot(axis)]
            }
            Surface::Sphere {
                center,
                axis,
                x_dir,
                radius,
            } => {
                let y = Self::y_dir(axis, x_dir);
                let d = point - center;
                let z = (d.dot(axis) / radius).clamp(-1.0, 1.0);
                [d.dot(y).atan2(d.dot(x_dir)), z.asin()]
            }
            Surface::Torus {
                center,
                axis,
                x_dir,
                major_radius,
                ..
            } => {
                let y = Self::y_dir(axis, x_dir);
                let d = point - center;
                let (dx, dy, dz) = (d.dot(x_dir), d.dot(y), d.dot(axis));
                let rho = (dx * dx + dy * dy).sqrt();
                [dy.atan2(dx), dz.atan2(rho - major_radius)]
            }
        }
    }
}
