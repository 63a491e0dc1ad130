//! In-memory representation of an imported CAD assembly.

pub mod geometry;

pub use geometry::{
    BoundingBox, BrepFace, BrepShape, Curve, Edge, Surface, TriangleMesh, Wire,
};

use glam::Mat4;

/// Lifecycle of a document within one pipeline run.
///
/// `Exported` and `Failed` are terminal and mutually exclusive; exactly one
/// document exists per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    /// Freshly allocated, nothing imported.
    Created,
    /// Assembly structure and shapes transferred from the importer.
    Populated,
    /// Every meshable shape has been visited by the meshing stage.
    Meshed,
    /// Output written; terminal.
    Exported,
    /// A fatal error occurred; terminal.
    Failed,
}

impl Default for DocumentState {
    fn default() -> Self {
        DocumentState::Created
    }
}

impl DocumentState {
    fn is_terminal(self) -> bool {
        matches!(self, DocumentState::Exported | DocumentState::Failed)
    }
}

/// One top-level shape: a named solid with its symbolic B-rep and, after
/// the meshing stage has run, its discretized surface data.
#[derive(Debug, Clone, Default)]
pub struct Shape {
    /// Name captured from the source file, or a generated fallback.
    pub name: String,
    /// Captured surface colour (RGB in `[0,1]`), if the file styles the shape.
    pub color: Option<[f32; 3]>,
    /// Symbolic boundary representation.
    pub brep: BrepShape,
    /// Tessellated mesh, attached in place by the meshing stage.
    pub mesh: Option<TriangleMesh>,
}

/// A node in the assembly hierarchy.
///
/// Leaf nodes (no children) reference an actual placed shape; interior
/// nodes only carry a transform and a name.
#[derive(Debug, Clone, Default)]
pub struct DocumentNode {
    /// Node name.
    pub name: String,
    /// Transform relative to the parent node.
    pub transform: Mat4,
    /// Child node indices.
    pub children: Vec<usize>,
    /// Index into the document's shape table, if this node places a shape.
    pub shape: Option<usize>,
}

impl DocumentNode {
    /// Create a named node with an identity transform.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Mat4::IDENTITY,
            ..Default::default()
        }
    }

    /// Create a leaf node placing a shape.
    pub fn with_shape(name: impl Into<String>, shape: usize) -> Self {
        Self {
            name: name.into(),
            transform: Mat4::IDENTITY,
            shape: Some(shape),
            ..Default::default()
        }
    }

    /// Set the local transform.
    pub fn transformed(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }
}

/// The imported assembly: node hierarchy plus top-level shape table.
///
/// Owned by the pipeline for the duration of one run and released on every
/// exit path; transitions Created → Populated → Meshed → Exported or, at
/// any point, → Failed.
#[derive(Debug, Default)]
pub struct Document {
    nodes: Vec<DocumentNode>,
    roots: Vec<usize>,
    shapes: Vec<Shape>,
    state: DocumentState,
}

impl Document {
    /// Create a new empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DocumentState {
        self.state
    }

    /// Advance the lifecycle.
    ///
    /// Terminal states are final; debug builds assert against illegal
    /// transitions out of them.
    pub fn transition(&mut self, to: DocumentState) {
        debug_assert!(
            !self.state.is_terminal(),
            "document already in terminal state {:?}",
            self.state
        );
        self.state = to;
    }

    /// Number of top-level shapes.
    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    /// Shape table, immutable.
    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    /// Shape table, mutable (the meshing stage attaches meshes in place).
    pub fn shapes_mut(&mut self) -> &mut [Shape] {
        &mut self.shapes
    }

    /// All nodes.
    pub fn nodes(&self) -> &[DocumentNode] {
        &self.nodes
    }

    /// Root node indices.
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    /// Add a shape to the table, returning its index.
    pub fn add_shape(&mut self, shape: Shape) -> usize {
        self.shapes.push(shape);
        self.shapes.len() - 1
    }

    /// Add a root node, returning its index.
    pub fn add_root(&mut self, node: DocumentNode) -> usize {
        let index = self.nodes.len();
        self.nodes.push(node);
        self.roots.push(index);
        index
    }

    /// Add a child node under `parent`, returning its index.
    pub fn add_child(&mut self, parent: usize, node: DocumentNode) -> usize {
        let index = self.nodes.len();
        self.nodes.push(node);
        self.nodes[parent].children.push(index);
        index
    }

    /// Depth-first traversal yielding each node with its accumulated world
    /// transform.
    pub fn traverse(&self) -> impl Iterator<Item = (usize, &DocumentNode, Mat4)> {
        Traverser::new(self)
    }

    /// Leaf nodes (no children) with their accumulated world transforms.
    pub fn leaves(&self) -> impl Iterator<Item = (&DocumentNode, Mat4)> {
        self.traverse()
            .filter(|(_, node, _)| node.children.is_empty())
            .map(|(_, node, world)| (node, world))
    }
}

/// Depth-first iterator accumulating world transforms.
struct Traverser<'a> {
    doc: &'a Document,
    stack: Vec<(usize, Mat4)>,
}

impl<'a> Traverser<'a> {
    fn new(doc: &'a Document) -> Self {
        let stack = doc
            .roots
            .iter()
            .rev()
            .map(|&idx| (idx, Mat4::IDENTITY))
            .collect();
        Self { doc, stack }
    }
}

impl<'a> Iterator for Traverser<'a> {
    type Item = (usize, &'a DocumentNode, Mat4);

    fn next(&mut self) -> Option<Self::Item> {
        let (idx, parent_world) = self.stack.pop()?;
        let node = &self.doc.nodes[idx];
        let world = parent_world * node.transform;

        // Reverse push so children come out left-to-right.
        for &child in node.children.iter().rev() {
            self.stack.push((child, world));
        }

        Some((idx, node, world))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_empty_document() {
        let doc = Document::new();
        assert_eq!(doc.shape_count(), 0);
        assert_eq!(doc.state(), DocumentState::Created);
    }

    #[test]
    fn test_traversal_order_and_world_transforms() {
        let mut doc = Document::new();
        let root = doc.add_root(
            DocumentNode::new("asm").transformed(Mat4::from_translation(Vec3::X)),
        );
        let child = doc.add_child(
            root,
            DocumentNode::new("sub").transformed(Mat4::from_translation(Vec3::Y)),
        );
        doc.add_child(child, DocumentNode::new("leaf"));
        doc.add_root(DocumentNode::new("second"));

        let visited: Vec<(&str, Vec3)> = doc
            .traverse()
            .map(|(_, n, w)| (n.name.as_str(), w.transform_point3(Vec3::ZERO)))
            .collect();
        assert_eq!(visited[0].0, "asm");
        assert_eq!(visited[1].0, "sub");
        assert_eq!(visited[2].0, "leaf");
        assert_eq!(visited[3].0, "second");
        // Leaf accumulates both translations.
        assert!((visited[2].1 - Vec3::new(1.0, 1.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn test_leaves_skip_interior_nodes() {
        let mut doc = Document::new();
        let root = doc.add_root(DocumentNode::new("asm"));
        doc.add_child(root, DocumentNode::new("a"));
        doc.add_child(root, DocumentNode::new("b"));

        let names: Vec<&str> = doc.leaves().map(|(n, _)| n.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut doc = Document::new();
        doc.transition(DocumentState::Populated);
        doc.transition(DocumentState::Meshed);
        doc.transition(DocumentState::Exported);
        assert_eq!(doc.state(), DocumentState::Exported);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "terminal")]
    fn test_terminal_state_is_final() {
        let mut doc = Document::new();
        doc.transition(DocumentState::Failed);
        doc.transition(DocumentState::Exported);
    }
}
