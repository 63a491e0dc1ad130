//! Typed access over the raw instance table.
//!
//! Rather than materializing every STEP entity into its own struct, the
//! importer keeps instances raw and resolves the handful of geometric
//! building blocks on demand.

use glam::{Mat4, Vec3, Vec4};
use indexmap::IndexMap;

use super::p21::{Attr, Instance};

/// Resolved `AXIS2_PLACEMENT_3D`: an origin with an orthonormal frame.
#[derive(Debug, Clone, Copy)]
pub struct Placement {
    pub origin: Vec3,
    pub axis: Vec3,
    pub ref_dir: Vec3,
}

impl Placement {
    /// Local-to-parent transform with `ref_dir` as X and `axis` as Z.
    pub fn to_mat4(&self) -> Mat4 {
        let z = self.axis;
        let x = self.ref_dir;
        let y = z.cross(x);
        Mat4::from_cols(
            Vec4::new(x.x, x.y, x.z, 0.0),
            Vec4::new(y.x, y.y, y.z, 0.0),
            Vec4::new(z.x, z.y, z.z, 0.0),
            Vec4::new(self.origin.x, self.origin.y, self.origin.z, 1.0),
        )
    }
}

impl Default for Placement {
    fn default() -> Self {
        Placement {
            origin: Vec3::ZERO,
            axis: Vec3::Z,
            ref_dir: Vec3::X,
        }
    }
}

/// Instance table keyed by id, preserving file order for iteration.
pub struct EntityMap {
    instances: IndexMap<u64, Instance>,
}

impl EntityMap {
    pub fn new(instances: Vec<Instance>) -> Self {
        EntityMap {
            instances: instances.into_iter().map(|i| (i.id, i)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&Instance> {
        self.instances.get(&id)
    }

    /// All instances carrying the given type in any segment, in file order.
    pub fn of_type<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Instance> + 'a {
        self.instances.values().filter(move |i| i.has_type(name))
    }

    /// Attribute at `idx` of the referenced instance.
    pub fn attr_of(&self, id: u64, idx: usize) -> Option<&Attr> {
        self.get(id).and_then(|i| i.attr(idx))
    }

    /// `CARTESIAN_POINT` coordinates.
    pub fn point(&self, id: u64) -> Option<Vec3> {
        let inst = self.get(id)?;
        let coords = inst.segment("CARTESIAN_POINT")?.get(1)?.real_list();
        Some(Vec3::new(
            coords.first().copied().unwrap_or(0.0) as f32,
            coords.get(1).copied().unwrap_or(0.0) as f32,
            coords.get(2).copied().unwrap_or(0.0) as f32,
        ))
    }

    /// Normalized `DIRECTION` ratios.
    pub fn direction(&self, id: u64) -> Option<Vec3> {
        let inst = self.get(id)?;
        let ratios = inst.segment("DIRECTION")?.get(1)?.real_list();
        let v = Vec3::new(
            ratios.first().copied().unwrap_or(0.0) as f32,
            ratios.get(1).copied().unwrap_or(0.0) as f32,
            ratios.get(2).copied().unwrap_or(0.0) as f32,
        );
        Some(v.normalize_or_zero())
    }

    /// `VERTEX_POINT` position.
    pub fn vertex(&self, id: u64) -> Option<Vec3> {
        let inst = self.get(id)?;
        let point_ref = inst.segment("VERTEX_POINT")?.get(1)?.as_ref_id()?;
        self.point(point_ref)
    }

    /// Resolved `AXIS2_PLACEMENT_3D` with defaulted axes and the reference
    /// direction re-orthogonalized against the axis.
    pub fn placement(&self, id: u64) -> Option<Placement> {
        let inst = self.get(id)?;
        let attrs = inst.segment("AXIS2_PLACEMENT_3D")?;

        let origin = attrs
            .get(1)
            .and_then(Attr::as_ref_id)
            .and_then(|r| self.point(r))
            .unwrap_or(Vec3::ZERO);
        let axis = attrs
            .get(2)
            .and_then(Attr::as_ref_id)
            .and_then(|r| self.direction(r))
            .filter(|v| v.length_squared() > 0.0)
            .unwrap_or(Vec3::Z);

        let raw_ref = attrs
            .get(3)
            .and_then(Attr::as_ref_id)
            .and_then(|r| self.direction(r))
            .unwrap_or_else(|| perpendicular_to(axis));
        let ref_dir = (raw_ref - axis * raw_ref.dot(axis)).normalize_or_zero();
        let ref_dir = if ref_dir.length_squared() > 0.0 {
            ref_dir
        } else {
            perpendicular_to(axis)
        };

        Some(Placement {
            origin,
            axis,
            ref_dir,
        })
    }
}

/// Any unit vector perpendicular to `v`.
fn perpendicular_to(v: Vec3) -> Vec3 {
    let candidate = if v.x.abs() < 0.9 { Vec3::X } else { Vec3::Y };
    (candidate - v * candidate.dot(v)).normalize_or_zero()
}
