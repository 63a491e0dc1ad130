//! Trimmed-surface tessellation.
//!
//! Faces are triangulated in parameter space: boundary wires are sampled
//! against both deflection bounds, projected to UV with period unwrapping,
//! holes bridged into the outer loop, the resulting polygon ear-clipped,
//! and the triangles refined until parametric steps respect the deflections
//! again. Positions and normals come from the analytic surface.

use std::collections::HashMap;
use std::f32::consts::TAU;

use glam::Vec3;
use tracing::debug;

use crate::scene::geometry::{BrepFace, Curve, Surface, TriangleMesh, Wire};

const MAX_SPLIT_DEPTH: u32 = 8;
/// UV quantization for vertex dedup, about 6e-5 in parameter space.
const UV_QUANTUM: f32 = 16384.0;

/// Tessellate one trimmed face, or `None` when its boundary cannot be
/// turned into a valid parameter-space polygon.
pub fn tessellate_face(face: &BrepFace, linear: f32, angular: f32) -> Option<TriangleMesh> {
    let boundary = sample_wire(&face.outer, linear, angular);
    let mut outer = project_loop(&face.surface, &boundary)?;
    if polygon_area(&outer) < 0.0 {
        outer.reverse();
    }

    let mut holes = Vec::new();
    for hole in &face.holes {
        let samples = sample_wire(hole, linear, angular);
        let Some(mut uv) = project_loop(&face.surface, &samples) else {
            debug!("degenerate hole loop dropped");
            continue;
        };
        // Holes wind against the outer loop.
        if polygon_area(&uv) > 0.0 {
            uv.reverse();
        }
        holes.push(uv);
    }

    let polygon = bridge_holes(outer, holes);
    let triangles = ear_clip(&polygon)?;

    let (du_max, dv_max) = uv_steps(&face.surface, &polygon, linear, angular);
    let mut builder = MeshBuilder::new(&face.surface, face.same_sense);
    for [a, b, c] in triangles {
        refine_triangle(
            [polygon[a], polygon[b], polygon[c]],
            du_max,
            dv_max,
            0,
            &mut builder,
        );
    }

    let mesh = builder.finish();
    if mesh.is_empty() {
        None
    } else {
        Some(mesh)
    }
}

/// Angular step keeping an arc of radius `r` within both deflections.
fn arc_step(r: f32, linear: f32, angular: f32) -> f32 {
    let chordal = 2.0 * (1.0 - linear / r).clamp(-1.0, 1.0).acos();
    angular.min(chordal).max(1e-3)
}

/// Sample a wire into a closed 3D polyline (last point implicit).
fn sample_wire(wire: &Wire, linear: f32, angular: f32) -> Vec<Vec3> {
    let mut points = Vec::new();
    for edge in &wire.edges {
        match edge.curve {
            Curve::Line => points.push(edge.start),
            Curve::Arc {
                center,
                axis,
                x_dir,
                radius,
            } => {
                let y = axis.cross(x_dir);
                let angle_of = |p: Vec3| {
                    let d = p - center;
                    d.dot(y).atan2(d.dot(x_dir))
                };
                let a0 = angle_of(edge.start);
                let mut sweep = angle_of(edge.end) - a0;
                if (edge.end - edge.start).length() < 1e-5 * radius.max(1.0) {
                    // Closed circle edge.
                    sweep = TAU;
                } else {
                    while sweep <= 1e-6 {
                        sweep += TAU;
                    }
                    while sweep > TAU {
                        sweep -= TAU;
                    }
                }
                let segments = (sweep / arc_step(radius, linear, angular)).ceil().max(1.0) as usize;
                for k in 0..segments {
                    let a = a0 + sweep * k as f32 / segments as f32;
                    points.push(center + (x_dir * a.cos() + y * a.sin()) * radius);
                }
            }
        }
    }

    points.dedup_by(|a, b| (*a - *b).length_squared() < 1e-12);
    if points.len() > 1 {
        let closing = points[0] - *points.last().unwrap_or(&points[0]);
        if closing.length_squared() < 1e-12 {
            points.pop();
        }
    }
    points
}

/// Project a closed polyline into the surface's parameter space, keeping
/// the periodic angle continuous along the loop. Loops that wind a full
/// period (seamless periodic faces) are rejected.
fn project_loop(surface: &Surface, points: &[Vec3]) -> Option<Vec<[f32; 2]>> {
    if points.len() < 3 {
        return None;
    }
    let periodic_u = !matches!(surface, Surface::Plane { .. });
    let periodic_v = matches!(surface, Surface::Torus { .. });

    let mut uvs: Vec<[f32; 2]> = Vec::with_capacity(points.len());
    for p in points {
        let mut uv = surface.uv_of(*p);
        if let Some(prev) = uvs.last() {
            if periodic_u {
                uv[0] = unwrap_to(uv[0], prev[0]);
            }
            if periodic_v {
                uv[1] = unwrap_to(uv[1], prev[1]);
            }
        }
        uvs.push(uv);
    }

    if periodic_u {
        let first = uvs[0][0];
        let last = uvs[uvs.len() - 1][0];
        if (unwrap_to(first, last) - first).abs() > 1.0 {
            debug!("boundary loop winds the seam, face skipped");
            return None;
        }
    }
    Some(uvs)
}

/// Shift `value` by whole periods to land within half a period of `anchor`.
fn unwrap_to(value: f32, anchor: f32) -> f32 {
    value + ((anchor - value) / TAU).round() * TAU
}

/// Signed polygon area (positive when counterclockwise).
fn polygon_area(polygon: &[[f32; 2]]) -> f32 {
    let mut doubled = 0.0;
    for (i, a) in polygon.iter().enumerate() {
        let b = polygon[(i + 1) % polygon.len()];
        doubled += a[0] * b[1] - b[0] * a[1];
    }
    doubled * 0.5
}

fn cross2(a: [f32; 2], b: [f32; 2], c: [f32; 2]) -> f32 {
    (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
}

fn dist2(a: [f32; 2], b: [f32; 2]) -> f32 {
    let (dx, dy) = (a[0] - b[0], a[1] - b[1]);
    dx * dx + dy * dy
}

fn point_in_triangle(p: [f32; 2], a: [f32; 2], b: [f32; 2], c: [f32; 2]) -> bool {
    cross2(a, b, p) > 1e-12 && cross2(b, c, p) > 1e-12 && cross2(c, a, p) > 1e-12
}

/// Proper (interior) crossing of segments `ab` and `cd`.
fn segments_cross(a: [f32; 2], b: [f32; 2], c: [f32; 2], d: [f32; 2]) -> bool {
    let d1 = cross2(c, d, a);
    let d2 = cross2(c, d, b);
    let d3 = cross2(a, b, c);
    let d4 = cross2(a, b, d);
    (d1 * d2) < 0.0 && (d3 * d4) < 0.0
}

/// Merge hole loops into the outer loop with bridge edges, rightmost hole
/// first so earlier bridges cannot occlude later ones.
fn bridge_holes(mut outer: Vec<[f32; 2]>, mut holes: Vec<Vec<[f32; 2]>>) -> Vec<[f32; 2]> {
    let max_u = |poly: &[[f32; 2]]| {
        poly.iter()
            .map(|p| p[0])
            .fold(f32::NEG_INFINITY, f32::max)
    };
    holes.sort_by(|a, b| {
        max_u(b)
            .partial_cmp(&max_u(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    for hole in holes {
        let from = hole
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a[0].partial_cmp(&b[0]).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let target = visible_anchor(&outer, &hole, from);

        let mut merged = Vec::with_capacity(outer.len() + hole.len() + 2);
        merged.extend_from_slice(&outer[..=target]);
        merged.extend_from_slice(&hole[from..]);
        merged.extend_from_slice(&hole[..=from]);
        merged.push(outer[target]);
        merged.extend_from_slice(&outer[target + 1..]);
        outer = merged;
    }
    outer
}

/// Nearest outer vertex the bridge can reach without crossing either loop.
fn visible_anchor(outer: &[[f32; 2]], hole: &[[f32; 2]], from: usize) -> usize {
    let p = hole[from];
    let mut order: Vec<usize> = (0..outer.len()).collect();
    order.sort_by(|&a, &b| {
        dist2(outer[a], p)
            .partial_cmp(&dist2(outer[b], p))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    'candidate: for &i in &order {
        let q = outer[i];
        for e in 0..outer.len() {
            let next = (e + 1) % outer.len();
            if e == i || next == i {
                continue;
            }
            if segments_cross(p, q, outer[e], outer[next]) {
                continue 'candidate;
            }
        }
        for e in 0..hole.len() {
            let next = (e + 1) % hole.len();
            if e == from || next == from {
                continue;
            }
            if segments_cross(p, q, hole[e], hole[next]) {
                continue 'candidate;
            }
        }
        return i;
    }
    order[0]
}

/// Ear-clip a counterclockwise polygon (bridge duplicates allowed).
fn ear_clip(polygon: &[[f32; 2]]) -> Option<Vec<[usize; 3]>> {
    let n = polygon.len();
    if n < 3 {
        return None;
    }
    let mut idx: Vec<usize> = (0..n).collect();
    let mut triangles = Vec::with_capacity(n - 2);
    let mut guard = 0usize;

    while idx.len() > 3 {
        let m = idx.len();
        let mut clipped = false;

        for i in 0..m {
            let (pi, ci, ni) = (idx[(i + m - 1) % m], idx[i], idx[(i + 1) % m]);
            let (a, b, c) = (polygon[pi], polygon[ci], polygon[ni]);
            if cross2(a, b, c) <= 1e-12 {
                continue;
            }
            let blocked = idx.iter().any(|&j| {
                j != pi && j != ci && j != ni && point_in_triangle(polygon[j], a, b, c)
            });
            if !blocked {
                triangles.push([pi, ci, ni]);
                idx.remove(i);
                clipped = true;
                break;
            }
        }

        if !clipped {
            // Numerical dead end: clip the widest convex corner to make
            // progress. A remainder with no convex corner is a collinear
            // ring (arc sampling leaves those along straight parameter
            // edges), which encloses nothing; the ears collected so far
            // already cover the polygon.
            let m = idx.len();
            let best = (0..m)
                .map(|i| {
                    let (pi, ci, ni) = (idx[(i + m - 1) % m], idx[i], idx[(i + 1) % m]);
                    (i, cross2(polygon[pi], polygon[ci], polygon[ni]))
                })
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))?;
            let remaining: Vec<[f32; 2]> = idx.iter().map(|&j| polygon[j]).collect();
            if best.1 <= 1e-12 || polygon_area(&remaining).abs() <= 1e-9 {
                return Some(triangles);
            }
            let i = best.0;
            triangles.push([idx[(i + m - 1) % m], idx[i], idx[(i + 1) % m]]);
            idx.remove(i);
        }

        guard += 1;
        if guard > 4 * n {
            return None;
        }
    }

    triangles.push([idx[0], idx[1], idx[2]]);
    Some(triangles)
}

/// Largest parametric steps honoring both deflections on this surface,
/// derived from the polygon's parameter range where curvature varies.
fn uv_steps(surface: &Surface, polygon: &[[f32; 2]], linear: f32, angular: f32) -> (f32, f32) {
    let step = |r: f32| arc_step(r.max(1e-6), linear, angular);
    match *surface {
        Surface::Plane { .. } => (f32::INFINITY, f32::INFINITY),
        Surface::Cylinder { radius, .. } => (step(radius), f32::INFINITY),
        Surface::Cone {
            radius, half_angle, ..
        } => {
            let (mut v_min, mut v_max) = (f32::INFINITY, f32::NEG_INFINITY);
            for p in polygon {
                v_min = v_min.min(p[1]);
                v_max = v_max.max(p[1]);
            }
            let t = half_angle.tan();
            let r_max = (radius + v_min * t).abs().max((radius + v_max * t).abs());
            (step(r_max), f32::INFINITY)
        }
        Surface::Sphere { radius, .. } => (step(radius), step(radius)),
        Surface::Torus {
            major_radius,
            minor_radius,
            ..
        } => (step(major_radius + minor_radius), step(minor_radius)),
    }
}

/// Split a UV triangle until every edge respects the parametric steps.
fn refine_triangle(
    triangle: [[f32; 2]; 3],
    du_max: f32,
    dv_max: f32,
    depth: u32,
    out: &mut MeshBuilder<'_>,
) {
    let mut worst = 0;
    let mut worst_cost = 0.0f32;
    for e in 0..3 {
        let a = triangle[e];
        let b = triangle[(e + 1) % 3];
        let cost = ((a[0] - b[0]).abs() / du_max).max((a[1] - b[1]).abs() / dv_max);
        if cost > worst_cost {
            worst_cost = cost;
            worst = e;
        }
    }

    if worst_cost <= 1.0 || depth >= MAX_SPLIT_DEPTH {
        out.triangle(triangle);
        return;
    }

    let a = triangle[worst];
    let b = triangle[(worst + 1) % 3];
    let opposite = triangle[(worst + 2) % 3];
    let mid = [(a[0] + b[0]) * 0.5, (a[1] + b[1]) * 0.5];
    refine_triangle([a, mid, opposite], du_max, dv_max, depth + 1, out);
    refine_triangle([mid, b, opposite], du_max, dv_max, depth + 1, out);
}

/// Accumulates UV triangles into a mesh, deduplicating vertices by
/// quantized parameters and evaluating the surface per unique vertex.
struct MeshBuilder<'a> {
    surface: &'a Surface,
    flip: bool,
    lookup: HashMap<(i64, i64), u32>,
    mesh: TriangleMesh,
}

impl<'a> MeshBuilder<'a> {
    fn new(surface: &'a Surface, same_sense: bool) -> Self {
        MeshBuilder {
            surface,
            flip: !same_sense,
            lookup: HashMap::new(),
            mesh: TriangleMesh {
                normals: Some(Vec::new()),
                ..TriangleMesh::default()
            },
        }
    }

    fn vertex(&mut self, uv: [f32; 2]) -> u32 {
        let key = (
            (uv[0] * UV_QUANTUM).round() as i64,
            (uv[1] * UV_QUANTUM).round() as i64,
        );
        if let Some(&index) = self.lookup.get(&key) {
            return index;
        }
        let index = self.mesh.positions.len() as u32;
        self.mesh.positions.push(self.surface.point_at(uv[0], uv[1]));
        let sign = if self.flip { -1.0 } else { 1.0 };
        if let Some(normals) = &mut self.mesh.normals {
            normals.push(self.surface.normal_at(uv[0], uv[1]) * sign);
        }
        self.lookup.insert(key, index);
        index
    }

    fn triangle(&mut self, triangle: [[f32; 2]; 3]) {
        let a = self.vertex(triangle[0]);
        let b = self.vertex(triangle[1]);
        let c = self.vertex(triangle[2]);
        if a == b || b == c || a == c {
            return;
        }
        if self.flip {
            self.mesh.indices.extend([a, c, b]);
        } else {
            self.mesh.indices.extend([a, b, c]);
        }
    }

    fn finish(self) -> TriangleMesh {
        self.mesh
    }
}
