//! STEP file import: Part 21 text in, populated [`Document`] out.
//!
//! Resolves the product structure (assemblies with placed components) and
//! the B-rep geometry subset the tessellator understands. Faces on
//! unsupported surfaces are skipped and charged as recoverable gaps.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use glam::Mat4;
use tracing::{debug, warn};

use crate::error::{ConvertError, Result};
use crate::progress::PhaseScope;
use crate::scene::geometry::{BrepFace, BrepShape, Curve, Edge, Surface, Wire};
use crate::scene::{Document, DocumentNode, DocumentState, Shape};

use super::entities::EntityMap;
use super::p21::{parse_data_section, Attr};

/// What the importer captures beyond bare geometry.
#[derive(Debug, Clone, Copy)]
pub struct ImportOptions {
    /// Resolve STYLED_ITEM colour chains onto shapes.
    pub capture_colors: bool,
    /// Carry product names onto nodes and shapes.
    pub capture_names: bool,
    /// Accepted for interface parity; layer tables are not yet resolved.
    pub capture_layers: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        ImportOptions {
            capture_colors: true,
            capture_names: true,
            capture_layers: true,
        }
    }
}

/// Read a STEP file into a document.
///
/// Returns the populated document and the number of top-level (root)
/// shapes. Any read, parse, or structure failure maps to an import error
/// carrying the offending path; no partially built document escapes.
pub fn import_step(
    path: &Path,
    options: &ImportOptions,
    mut scope: PhaseScope<'_>,
) -> Result<(Document, usize)> {
    let bytes = fs::read(path).map_err(|e| ConvertError::import(path, e.to_string()))?;
    let text = String::from_utf8_lossy(&bytes);

    if !text.contains("ISO-10303-21") {
        return Err(ConvertError::import(path, "not a STEP Part 21 file"));
    }
    scope.advance_to(0.1);

    let (_, instances) = parse_data_section(&text).map_err(|err| {
        let offset = match &err {
            nom::Err::Error(e) | nom::Err::Failure(e) => text.len() - e.input.len(),
            nom::Err::Incomplete(_) => text.len(),
        };
        ConvertError::import(path, format!("malformed STEP data near byte {offset}"))
    })?;
    debug!(instances = instances.len(), "parsed DATA section");

    let entities = EntityMap::new(instances);
    scope.advance_to(0.5);

    let mut importer = Importer::new(&entities, options);
    if options.capture_colors {
        importer.collect_colors();
    }
    scope.advance_to(0.6);

    let root_count = importer.build_assembly_tree();
    let root_count = if root_count == 0 {
        importer.build_loose_solids()
    } else {
        root_count
    };

    if importer.document.shape_count() == 0 {
        return Err(ConvertError::import(path, "no solid geometry found"));
    }

    let mut document = importer.document;
    document.transition(DocumentState::Populated);
    debug!(
        roots = root_count,
        shapes = document.shape_count(),
        "document populated"
    );
    scope.complete();
    Ok((document, root_count))
}

struct Importer<'a> {
    entities: &'a EntityMap,
    options: &'a ImportOptions,
    document: Document,
    /// Colour per styled entity id (usually the MANIFOLD_SOLID_BREP).
    colors: HashMap<u64, [f32; 3]>,
    /// Memoized shape index per PRODUCT_DEFINITION id.
    shape_cache: HashMap<u64, Option<usize>>,
    anonymous: usize,
}

impl<'a> Importer<'a> {
    fn new(entities: &'a EntityMap, options: &'a ImportOptions) -> Self {
        Importer {
            entities,
            options,
            document: Document::new(),
            colors: HashMap::new(),
            shape_cache: HashMap::new(),
            anonymous: 0,
        }
    }

    // ---- presentation -------------------------------------------------

    /// Resolve every STYLED_ITEM's colour chain down to COLOUR_RGB.
    fn collect_colors(&mut self) {
        for styled in self.entities.of_type("STYLED_ITEM") {
            let attrs = match styled.segment("STYLED_ITEM") {
                Some(a) => a,
                None => continue,
            };
            let Some(item) = attrs.get(2).and_then(Attr::as_ref_id) else {
                continue;
            };
            let mut rgb = None;
            for style in attrs.get(1).map(Attr::ref_list).unwrap_or_default() {
                rgb = self.find_colour(style, 0);
                if rgb.is_some() {
                    break;
                }
            }
            if let Some(rgb) = rgb {
                self.colors.insert(item, rgb);
            }
        }
        debug!(styled = self.colors.len(), "resolved surface colours");
    }

    /// Depth-first walk through presentation entities until a COLOUR_RGB.
    fn find_colour(&self, id: u64, depth: usize) -> Option<[f32; 3]> {
        if depth > 8 {
            return None;
        }
        let inst = self.entities.get(id)?;
        if let Some(attrs) = inst.segment("COLOUR_RGB") {
            return Some([
                attrs.get(1)?.as_real()? as f32,
                attrs.get(2)?.as_real()? as f32,
                attrs.get(3)?.as_real()? as f32,
            ]);
        }
        for segment in &inst.segments {
            for attr in &segment.attrs {
                if let Some(found) = self.follow_colour(attr, depth) {
                    return Some(found);
                }
            }
        }
        None
    }

    fn follow_colour(&self, attr: &Attr, depth: usize) -> Option<[f32; 3]> {
        match attr {
            Attr::Ref(id) => self.find_colour(*id, depth + 1),
            Attr::List(items) | Attr::Typed(_, items) => items
                .iter()
                .find_map(|a| self.follow_colour(a, depth)),
            _ => None,
        }
    }

    // ---- product structure --------------------------------------------

    /// Build the assembly tree from the product structure, returning the
    /// number of root nodes created.
    fn build_assembly_tree(&mut self) -> usize {
        let definitions: Vec<u64> = self
            .entities
            .of_type("PRODUCT_DEFINITION")
            .map(|i| i.id)
            .collect();
        if definitions.is_empty() {
            return 0;
        }

        // Parent -> placed children, in file order.
        let mut children: HashMap<u64, Vec<(u64, Mat4)>> = HashMap::new();
        let mut placed: HashSet<u64> = HashSet::new();
        for nauo in self.entities.of_type("NEXT_ASSEMBLY_USAGE_OCCURRENCE") {
            let attrs = match nauo.segment("NEXT_ASSEMBLY_USAGE_OCCURRENCE") {
                Some(a) => a,
                None => continue,
            };
            let (Some(parent), Some(child)) = (
                attrs.get(3).and_then(Attr::as_ref_id),
                attrs.get(4).and_then(Attr::as_ref_id),
            ) else {
                continue;
            };
            let transform = self.occurrence_transform(nauo.id);
            children.entry(parent).or_default().push((child, transform));
            placed.insert(child);
        }

        let mut emitted = 0;
        let mut on_path = HashSet::new();
        for pd in definitions {
            if placed.contains(&pd) {
                continue;
            }
            let has_children = children.contains_key(&pd);
            if !has_children && self.shape_for_product(pd).is_none() {
                continue;
            }
            self.emit_node(pd, Mat4::IDENTITY, None, &children, &mut on_path);
            emitted += 1;
        }
        emitted
    }

    /// Placement transform of one assembly occurrence, identity when the
    /// file carries none.
    fn occurrence_transform(&self, nauo: u64) -> Mat4 {
        for cdsr in self
            .entities
            .of_type("CONTEXT_DEPENDENT_SHAPE_REPRESENTATION")
        {
            let attrs = match cdsr.segment("CONTEXT_DEPENDENT_SHAPE_REPRESENTATION") {
                Some(a) => a,
                None => continue,
            };
            let describes_nauo = attrs
                .get(1)
                .and_then(Attr::as_ref_id)
                .and_then(|pds| self.entities.attr_of(pds, 2))
                .and_then(Attr::as_ref_id)
                == Some(nauo);
            if !describes_nauo {
                continue;
            }
            let Some(relation) = attrs.first().and_then(Attr::as_ref_id) else {
                continue;
            };
            if let Some(transform) = self.relation_transform(relation) {
                return transform;
            }
        }
        Mat4::IDENTITY
    }

    /// Transform carried by a representation relationship, if any.
    fn relation_transform(&self, relation: u64) -> Option<Mat4> {
        let inst = self.entities.get(relation)?;
        // Complex form: ...WITH_TRANSFORMATION segment holds the operator.
        // Simple SHAPE_REPRESENTATION_RELATIONSHIP form puts it fifth.
        let operator = inst
            .segment("REPRESENTATION_RELATIONSHIP_WITH_TRANSFORMATION")
            .and_then(|a| a.first())
            .or_else(|| inst.attr(4))
            .and_then(Attr::as_ref_id)?;

        let idt = self.entities.get(operator)?;
        let attrs = idt.segment("ITEM_DEFINED_TRANSFORMATION")?;
        let from = self
            .entities
            .placement(attrs.get(2).and_then(Attr::as_ref_id)?)?;
        let to = self
            .entities
            .placement(attrs.get(3).and_then(Attr::as_ref_id)?)?;
        Some(to.to_mat4() * from.to_mat4().inverse())
    }

    fn emit_node(
        &mut self,
        pd: u64,
        transform: Mat4,
        parent: Option<usize>,
        children: &HashMap<u64, Vec<(u64, Mat4)>>,
        on_path: &mut HashSet<u64>,
    ) {
        if !on_path.insert(pd) {
            warn!(product = pd, "cyclic assembly reference, skipping");
            return;
        }

        let name = self.product_name(pd);
        let placed = children.get(&pd).cloned().unwrap_or_default();

        // Assembly reps usually carry no geometry of their own; a product
        // with components contributes structure only.
        let shape = if placed.is_empty() {
            self.shape_for_product(pd)
        } else {
            None
        };

        let mut node = DocumentNode::new(name).transformed(transform);
        node.shape = shape;
        let index = match parent {
            Some(p) => self.document.add_child(p, node),
            None => self.document.add_root(node),
        };

        for (child, child_transform) in placed {
            self.emit_node(child, child_transform, Some(index), children, on_path);
        }
        on_path.remove(&pd);
    }

    /// Product name via the formation chain, or a generated fallback.
    fn product_name(&mut self, pd: u64) -> String {
        if self.options.capture_names {
            let name = self
                .entities
                .attr_of(pd, 2)
                .and_then(Attr::as_ref_id)
                .and_then(|formation| self.entities.attr_of(formation, 2))
                .and_then(Attr::as_ref_id)
                .and_then(|product| {
                    let attrs = self.entities.get(product)?.segment("PRODUCT")?;
                    let name = attrs.get(1).and_then(Attr::as_str).filter(|s| !s.is_empty());
                    name.or_else(|| attrs.first().and_then(Attr::as_str))
                        .map(String::from)
                });
            if let Some(name) = name {
                return name;
            }
        }
        self.anonymous += 1;
        format!("Shape_{}", self.anonymous)
    }

    // ---- geometry -----------------------------------------------------

    /// Build (once) the shape for a product definition's representation.
    fn shape_for_product(&mut self, pd: u64) -> Option<usize> {
        if let Some(cached) = self.shape_cache.get(&pd) {
            return *cached;
        }

        let built = self.representation_of(pd).and_then(|rep| {
            let solids = self.solids_in(rep);
            if solids.is_empty() {
                return None;
            }
            let name = self.product_name(pd);
            let mut faces = Vec::new();
            let mut color = None;
            for solid in solids {
                faces.extend(self.convert_solid(solid, &name));
                if color.is_none() {
                    color = self.colors.get(&solid).copied();
                }
            }
            let index = self.document.add_shape(Shape {
                name,
                color,
                brep: BrepShape { faces },
                mesh: None,
            });
            Some(index)
        });

        self.shape_cache.insert(pd, built);
        built
    }

    /// The representation a SHAPE_DEFINITION_REPRESENTATION binds to `pd`.
    fn representation_of(&self, pd: u64) -> Option<u64> {
        for sdr in self.entities.of_type("SHAPE_DEFINITION_REPRESENTATION") {
            let attrs = sdr.segment("SHAPE_DEFINITION_REPRESENTATION")?;
            let definition = attrs
                .first()
                .and_then(Attr::as_ref_id)
                .and_then(|pds| self.entities.attr_of(pds, 2))
                .and_then(Attr::as_ref_id);
            if definition == Some(pd) {
                return attrs.get(1).and_then(Attr::as_ref_id);
            }
        }
        None
    }

    /// Solid ids among a shape representation's items.
    fn solids_in(&self, rep: u64) -> Vec<u64> {
        let Some(inst) = self.entities.get(rep) else {
            return Vec::new();
        };
        const REP_TYPES: [&str; 3] = [
            "ADVANCED_BREP_SHAPE_REPRESENTATION",
            "SHAPE_REPRESENTATION",
            "MANIFOLD_SURFACE_SHAPE_REPRESENTATION",
        ];
        let items = REP_TYPES
            .iter()
            .find_map(|t| inst.segment(t))
            .and_then(|a| a.get(1))
            .map(Attr::ref_list)
            .unwrap_or_default();

        items
            .into_iter()
            .filter(|&id| {
                self.entities
                    .get(id)
                    .map(|i| i.has_type("MANIFOLD_SOLID_BREP") || i.has_type("BREP_WITH_VOIDS"))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Faces of one solid, outer shell plus void shells.
    fn convert_solid(&self, solid: u64, name: &str) -> Vec<BrepFace> {
        let Some(inst) = self.entities.get(solid) else {
            return Vec::new();
        };
        let mut shells = Vec::new();
        if let Some(attrs) = inst
            .segment("MANIFOLD_SOLID_BREP")
            .or_else(|| inst.segment("BREP_WITH_VOIDS"))
        {
            if let Some(outer) = attrs.get(1).and_then(Attr::as_ref_id) {
                shells.push(outer);
            }
            if let Some(voids) = attrs.get(2) {
                shells.extend(voids.ref_list());
            }
        }

        let mut faces = Vec::new();
        let mut skipped = 0usize;
        for shell in shells {
            let face_ids = self
                .entities
                .get(shell)
                .and_then(|s| {
                    s.segment("CLOSED_SHELL")
                        .or_else(|| s.segment("OPEN_SHELL"))
                })
                .and_then(|a| a.get(1))
                .map(Attr::ref_list)
                .unwrap_or_default();
            for face_id in face_ids {
                match self.convert_face(face_id) {
                    Some(face) => faces.push(face),
                    None => skipped += 1,
                }
            }
        }
        if skipped > 0 {
            warn!(solid = name, skipped, "skipped faces on unsupported geometry");
        }
        faces
    }

    fn convert_face(&self, id: u64) -> Option<BrepFace> {
        let inst = self.entities.get(id)?;
        let attrs = inst
            .segment("ADVANCED_FACE")
            .or_else(|| inst.segment("FACE_SURFACE"))?;
        let surface = self.convert_surface(attrs.get(2).and_then(Attr::as_ref_id)?)?;
        let same_sense = attrs.get(3).and_then(Attr::as_bool).unwrap_or(true);

        let mut bounds: Vec<(bool, Wire)> = Vec::new();
        for bound_id in attrs.get(1).map(Attr::ref_list).unwrap_or_default() {
            let Some(bound) = self.entities.get(bound_id) else {
                continue;
            };
            let is_outer = bound.has_type("FACE_OUTER_BOUND");
            let Some(battrs) = bound
                .segment("FACE_OUTER_BOUND")
                .or_else(|| bound.segment("FACE_BOUND"))
            else {
                continue;
            };
            let Some(loop_id) = battrs.get(1).and_then(Attr::as_ref_id) else {
                continue;
            };
            let Some(mut wire) = self.convert_loop(loop_id) else {
                continue;
            };
            if !battrs.get(2).and_then(Attr::as_bool).unwrap_or(true) {
                wire = reversed(wire);
            }
            bounds.push((is_outer, wire));
        }
        if bounds.is_empty() {
            return None;
        }

        let outer_at = bounds.iter().position(|(o, _)| *o).unwrap_or(0);
        let outer = bounds.remove(outer_at).1;
        let holes = bounds.into_iter().map(|(_, w)| w).collect();
        Some(BrepFace {
            surface,
            outer,
            holes,
            same_sense,
        })
    }

    fn convert_loop(&self, id: u64) -> Option<Wire> {
        let attrs = self.entities.get(id)?.segment("EDGE_LOOP")?;
        let mut edges = Vec::new();
        for edge_id in attrs.get(1)?.ref_list() {
            edges.push(self.convert_oriented_edge(edge_id)?);
        }
        if edges.is_empty() {
            return None;
        }
        Some(Wire { edges })
    }

    fn convert_oriented_edge(&self, id: u64) -> Option<Edge> {
        let attrs = self.entities.get(id)?.segment("ORIENTED_EDGE")?;
        let orientation = attrs.get(4).and_then(Attr::as_bool).unwrap_or(true);
        let ec = attrs.get(3).and_then(Attr::as_ref_id)?;
        let ec_attrs = self.entities.get(ec)?.segment("EDGE_CURVE")?;

        let v1 = self
            .entities
            .vertex(ec_attrs.get(1).and_then(Attr::as_ref_id)?)?;
        let v2 = self
            .entities
            .vertex(ec_attrs.get(2).and_then(Attr::as_ref_id)?)?;
        let same_sense = ec_attrs.get(4).and_then(Attr::as_bool).unwrap_or(true);

        let (start, end) = if orientation { (v1, v2) } else { (v2, v1) };
        // Traversal runs with the basis curve when edge and use agree.
        let forward = orientation == same_sense;
        let curve = self.convert_curve(ec_attrs.get(3).and_then(Attr::as_ref_id)?, forward);
        Some(Edge { curve, start, end })
    }

    fn convert_curve(&self, id: u64, forward: bool) -> Curve {
        let Some(inst) = self.entities.get(id) else {
            return Curve::Line;
        };
        if let Some(attrs) = inst.segment("CIRCLE") {
            let placement = attrs
                .get(1)
                .and_then(Attr::as_ref_id)
                .and_then(|r| self.entities.placement(r));
            let radius = attrs.get(2).and_then(Attr::as_real);
            if let (Some(p), Some(radius)) = (placement, radius) {
                // A reversed traversal is counterclockwise about the
                // flipped axis, so sampling can always sweep ccw.
                let axis = if forward { p.axis } else { -p.axis };
                return Curve::Arc {
                    center: p.origin,
                    axis,
                    x_dir: p.ref_dir,
                    radius: radius as f32,
                };
            }
        }
        if !inst.has_type("LINE") {
            debug!(curve = inst.primary_type(), "approximating curve by its chord");
        }
        Curve::Line
    }

    fn convert_surface(&self, id: u64) -> Option<Surface> {
        let inst = self.entities.get(id)?;

        if let Some(attrs) = inst.segment("PLANE") {
            let p = self
                .entities
                .placement(attrs.get(1).and_then(Attr::as_ref_id)?)?;
            return Some(Surface::Plane {
                origin: p.origin,
                normal: p.axis,
                u_axis: p.ref_dir,
                v_axis: p.axis.cross(p.ref_dir),
            });
        }
        if let Some(attrs) = inst.segment("CYLINDRICAL_SURFACE") {
            let p = self
                .entities
                .placement(attrs.get(1).and_then(Attr::as_ref_id)?)?;
            return Some(Surface::Cylinder {
                origin: p.origin,
                axis: p.axis,
                x_dir: p.ref_dir,
                radius: attrs.get(2).and_then(Attr::as_real)? as f32,
            });
        }
        if let Some(attrs) = inst.segment("CONICAL_SURFACE") {
            let p = self
                .entities
                .placement(attrs.get(1).and_then(Attr::as_ref_id)?)?;
            return Some(Surface::Cone {
                origin: p.origin,
                axis: p.axis,
                x_dir: p.ref_dir,
                radius: attrs.get(2).and_then(Attr::as_real)? as f32,
                half_angle: attrs.get(3).and_then(Attr::as_real)? as f32,
            });
        }
        if let Some(attrs) = inst.segment("SPHERICAL_SURFACE") {
            let p = self
                .entities
                .placement(attrs.get(1).and_then(Attr::as_ref_id)?)?;
            return Some(Surface::Sphere {
                center: p.origin,
                axis: p.axis,
                x_dir: p.ref_dir,
                radius: attrs.get(2).and_then(Attr::as_real)? as f32,
            });
        }
        if let Some(attrs) = inst.segment("TOROIDAL_SURFACE") {
            let p = self
                .entities
                .placement(attrs.get(1).and_then(Attr::as_ref_id)?)?;
            return Some(Surface::Torus {
                center: p.origin,
                axis: p.axis,
                x_dir: p.ref_dir,
                major_radius: attrs.get(2).and_then(Attr::as_real)? as f32,
                minor_radius: attrs.get(3).and_then(Attr::as_real)? as f32,
            });
        }

        debug!(surface = inst.primary_type(), "unsupported surface type");
        None
    }

    // ---- fallback -----------------------------------------------------

    /// Files without product structure get one root node per solid.
    fn build_loose_solids(&mut self) -> usize {
        let solids: Vec<u64> = self
            .entities
            .of_type("MANIFOLD_SOLID_BREP")
            .chain(self.entities.of_type("BREP_WITH_VOIDS"))
            .map(|i| i.id)
            .collect();

        let mut emitted = 0;
        for solid in solids {
            let name = if self.options.capture_names {
                self.entities
                    .attr_of(solid, 0)
                    .and_then(Attr::as_str)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
            } else {
                None
            };
            let name = name.unwrap_or_else(|| {
                self.anonymous += 1;
                format!("Shape_{}", self.anonymous)
            });

            let faces = self.convert_solid(solid, &name);
            if faces.is_empty() {
                continue;
            }
            let shape = self.document.add_shape(Shape {
                name: name.clone(),
                color: self.colors.get(&solid).copied(),
                brep: BrepShape { faces },
                mesh: None,
            });
            self.document
                .add_root(DocumentNode::with_shape(name, shape));
            emitted += 1;
        }
        emitted
    }
}

/// Reverse a wire's direction: edge order, endpoints, and arc sweeps.
fn reversed(wire: Wire) -> Wire {
    let edges = wire
        .edges
        .into_iter()
        .rev()
        .map(|mut edge| {
            std::mem::swap(&mut edge.start, &mut edge.end);
            if let Curve::Arc { axis, .. } = &mut edge.curve {
                *axis = -*axis;
            }
            edge
        })
        .collect();
    Wire { edges }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{PhaseScope, SilentProgress};
    use glam::Vec3;
    use std::io::Write as _;

    /// Entities for one triangular planar face wrapped as a solid,
    /// occupying ids `base..base+20`. Returns the MANIFOLD_SOLID_BREP id.
    fn solid_block(out: &mut String, base: u64, name: &str) -> u64 {
        use std::fmt::Write as _;
        let b = base;
        let _ = write!(
            out,
            "#{p1} = CARTESIAN_POINT ( '', ( 0., 0., 0. ) );\n\
             #{p2} = CARTESIAN_POINT ( '', ( 1., 0., 0. ) );\n\
             #{p3} = CARTESIAN_POINT ( '', ( 0., 1., 0. ) );\n\
             #{d} = DIRECTION ( '', ( 1., 0., 0. ) );\n\
             #{vec} = VECTOR ( '', #{d}, 1. );\n\
             #{ln} = LINE ( '', #{p1}, #{vec} );\n\
             #{v1} = VERTEX_POINT ( '', #{p1} );\n\
             #{v2} = VERTEX_POINT ( '', #{p2} );\n\
             #{v3} = VERTEX_POINT ( '', #{p3} );\n\
             #{e1} = EDGE_CURVE ( '', #{v1}, #{v2}, #{ln}, .T. );\n\
             #{e2} = EDGE_CURVE ( '', #{v2}, #{v3}, #{ln}, .T. );\n\
             #{e3} = EDGE_CURVE ( '', #{v3}, #{v1}, #{ln}, .T. );\n\
             #{o1} = ORIENTED_EDGE ( '', *, *, #{e1}, .T. );\n\
             #{o2} = ORIENTED_EDGE ( '', *, *, #{e2}, .T. );\n\
             #{o3} = ORIENTED_EDGE ( '', *, *, #{e3}, .T. );\n\
             #{lp} = EDGE_LOOP ( '', ( #{o1}, #{o2}, #{o3} ) );\n\
             #{bd} = FACE_OUTER_BOUND ( '', #{lp}, .T. );\n\
             #{ax} = AXIS2_PLACEMENT_3D ( '', #{p1}, $, $ );\n\
             #{pl} = PLANE ( '', #{ax} );\n\
             #{fc} = ADVANCED_FACE ( '', ( #{bd} ), #{pl}, .T. );\n\
             #{sh} = CLOSED_SHELL ( '', ( #{fc} ) );\n\
             #{ms} = MANIFOLD_SOLID_BREP ( '{name}', #{sh} );\n",
            p1 = b,
            p2 = b + 1,
            p3 = b + 2,
            d = b + 3,
            vec = b + 4,
            ln = b + 5,
            v1 = b + 6,
            v2 = b + 7,
            v3 = b + 8,
            e1 = b + 9,
            e2 = b + 10,
            e3 = b + 11,
            o1 = b + 12,
            o2 = b + 13,
            o3 = b + 14,
            lp = b + 15,
            bd = b + 16,
            ax = b + 17,
            pl = b + 18,
            fc = b + 19,
            sh = b + 20,
            ms = b + 21,
            name = name,
        );
        b + 21
    }

    fn wrap_step(body: &str) -> String {
        format!(
            "ISO-10303-21;\nHEADER;\nENDSEC;\nDATA;\n{body}ENDSEC;\nEND-ISO-10303-21;\n"
        )
    }

    fn import_text(text: &str) -> Result<(Document, usize)> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        let sink = SilentProgress;
        import_step(
            file.path(),
            &ImportOptions::default(),
            PhaseScope::root(&sink),
        )
    }

    #[test]
    fn test_loose_solid_becomes_root_leaf() {
        let mut body = String::new();
        solid_block(&mut body, 1, "widget");
        let (doc, roots) = import_text(&wrap_step(&body)).unwrap();

        assert_eq!(roots, 1);
        assert_eq!(doc.shape_count(), 1);
        assert_eq!(doc.shapes()[0].name, "widget");
        assert_eq!(doc.shapes()[0].brep.faces.len(), 1);
        assert_eq!(doc.state(), DocumentState::Populated);

        let face = &doc.shapes()[0].brep.faces[0];
        assert_eq!(face.outer.edges.len(), 3);
        assert_eq!(face.outer.edges[0].start, Vec3::ZERO);
        assert_eq!(face.outer.edges[0].end, Vec3::X);
    }

    #[test]
    fn test_assembly_places_component_with_transform() {
        let mut body = String::new();
        let solid = solid_block(&mut body, 1, "part");
        use std::fmt::Write as _;
        // Child product carrying the solid, parent assembly placing it
        // shifted by (0, 0, 5).
        let _ = write!(
            body,
            "#100 = PRODUCT ( 'PART', 'part', '', ( ) );\n\
             #101 = PRODUCT_DEFINITION_FORMATION ( '', '', #100 );\n\
             #102 = PRODUCT_DEFINITION ( '', '', #101, $ );\n\
             #103 = PRODUCT_DEFINITION_SHAPE ( '', '', #102 );\n\
             #104 = SHAPE_REPRESENTATION ( '', ( #{solid} ), $ );\n\
             #105 = SHAPE_DEFINITION_REPRESENTATION ( #103, #104 );\n\
             #110 = PRODUCT ( 'ASM', 'assembly', '', ( ) );\n\
             #111 = PRODUCT_DEFINITION_FORMATION ( '', '', #110 );\n\
             #112 = PRODUCT_DEFINITION ( '', '', #111, $ );\n\
             #120 = NEXT_ASSEMBLY_USAGE_OCCURRENCE ( 'o1', '', '', #112, #102, $ );\n\
             #121 = PRODUCT_DEFINITION_SHAPE ( '', '', #120 );\n\
             #130 = CARTESIAN_POINT ( '', ( 0., 0., 0. ) );\n\
             #131 = AXIS2_PLACEMENT_3D ( '', #130, $, $ );\n\
             #132 = CARTESIAN_POINT ( '', ( 0., 0., 5. ) );\n\
             #133 = AXIS2_PLACEMENT_3D ( '', #132, $, $ );\n\
             #134 = ITEM_DEFINED_TRANSFORMATION ( '', '', #131, #133 );\n\
             #135 = SHAPE_REPRESENTATION ( '', ( ), $ );\n\
             #136 = ( REPRESENTATION_RELATIONSHIP ( '', '', #135, #104 ) \
             REPRESENTATION_RELATIONSHIP_WITH_TRANSFORMATION ( #134 ) \
             SHAPE_REPRESENTATION_RELATIONSHIP ( ) );\n\
             #137 = CONTEXT_DEPENDENT_SHAPE_REPRESENTATION ( #136, #121 );\n"
        );

        let (doc, roots) = import_text(&wrap_step(&body)).unwrap();
        assert_eq!(roots, 1);
        assert_eq!(doc.roots().len(), 1);

        let root = &doc.nodes()[doc.roots()[0]];
        assert_eq!(root.name, "assembly");
        assert!(root.shape.is_none());
        assert_eq!(root.children.len(), 1);

        let child = &doc.nodes()[root.children[0]];
        assert_eq!(child.name, "part");
        assert!(child.shape.is_some());
        let offset = child.transform.transform_point3(Vec3::ZERO);
        assert!((offset - Vec3::new(0.0, 0.0, 5.0)).length() < 1e-5);
    }

    #[test]
    fn test_styled_item_colour_lands_on_shape() {
        let mut body = String::new();
        let solid = solid_block(&mut body, 1, "red_part");
        use std::fmt::Write as _;
        let _ = write!(
            body,
            "#200 = COLOUR_RGB ( '', 0.8, 0.1, 0.1 );\n\
             #201 = FILL_AREA_STYLE_COLOUR ( '', #200 );\n\
             #202 = FILL_AREA_STYLE ( '', ( #201 ) );\n\
             #203 = SURFACE_STYLE_FILL_AREA ( #202 );\n\
             #204 = SURFACE_SIDE_STYLE ( '', ( #203 ) );\n\
             #205 = SURFACE_STYLE_USAGE ( .BOTH., #204 );\n\
             #206 = PRESENTATION_STYLE_ASSIGNMENT ( ( #205 ) );\n\
             #207 = STYLED_ITEM ( '', ( #206 ), #{solid} );\n"
        );

        let (doc, _) = import_text(&wrap_step(&body)).unwrap();
        let color = doc.shapes()[0].color.unwrap();
        assert!((color[0] - 0.8).abs() < 1e-6);
        assert!((color[1] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_reversed_bound_flips_wire() {
        let edge = Edge {
            curve: Curve::Arc {
                center: Vec3::ZERO,
                axis: Vec3::Z,
                x_dir: Vec3::X,
                radius: 1.0,
            },
            start: Vec3::X,
            end: Vec3::Y,
        };
        let wire = reversed(Wire { edges: vec![edge] });
        assert_eq!(wire.edges[0].start, Vec3::Y);
        assert_eq!(wire.edges[0].end, Vec3::X);
        match wire.edges[0].curve {
            Curve::Arc { axis, .. } => assert_eq!(axis, -Vec3::Z),
            Curve::Line => panic!("arc expected"),
        }
    }

    #[test]
    fn test_not_a_step_file() {
        let err = import_text("solid ascii\nendsolid\n").unwrap_err();
        assert!(err.to_string().contains("failed to read STEP file"));
    }

    #[test]
    fn test_no_geometry_is_an_error() {
        let body = "#1 = CARTESIAN_POINT ( '', ( 0., 0., 0. ) );\n";
        assert!(import_text(&wrap_step(body)).is_err());
    }
}
