//! Output format selection and export dispatch.
//!
//! Exporters share a single contract and are looked up through a registry;
//! the dispatcher tracks which structural strategy a run took (scene graph
//! preserved vs. flattened compound) and ends in exactly one terminal state.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{ConvertError, Result};
use crate::formats::{gltf::GltfExporter, obj::ObjExporter, stl::StlExporter};
use crate::progress::PhaseScope;
use crate::scene::geometry::TriangleMesh;
use crate::scene::{Document, DocumentState};

/// String-keyed metadata carried into the exported file.
pub type Metadata = IndexMap<String, String>;

/// Supported output formats, derived from the output file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Gltf,
    Glb,
    Obj,
    Stl,
}

impl OutputFormat {
    /// Match a file extension, case-insensitively.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "gltf" => Some(OutputFormat::Gltf),
            "glb" => Some(OutputFormat::Glb),
            "obj" => Some(OutputFormat::Obj),
            "stl" => Some(OutputFormat::Stl),
            _ => None,
        }
    }

    /// Canonical lowercase extension.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Gltf => "gltf",
            OutputFormat::Glb => "glb",
            OutputFormat::Obj => "obj",
            OutputFormat::Stl => "stl",
        }
    }

    /// Whether the format keeps the assembly hierarchy. STL gets one
    /// flattened compound instead.
    pub fn preserves_scene(self) -> bool {
        !matches!(self, OutputFormat::Stl)
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OutputFormat::Gltf => "glTF",
            OutputFormat::Glb => "GLB",
            OutputFormat::Obj => "OBJ",
            OutputFormat::Stl => "STL",
        };
        f.write_str(name)
    }
}

/// An output path with its format resolved once, up front.
#[derive(Debug, Clone)]
pub struct OutputTarget {
    pub path: PathBuf,
    pub format: OutputFormat,
}

impl OutputTarget {
    /// Resolve the format from the path's extension; unknown or missing
    /// extensions are rejected before any work happens.
    pub fn from_path(path: &Path) -> Result<Self> {
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(OutputFormat::from_extension)
            .ok_or_else(|| ConvertError::UnsupportedExtension(path.to_path_buf()))?;
        Ok(OutputTarget {
            path: path.to_path_buf(),
            format,
        })
    }
}

/// Common exporter contract: write the meshed document to `path`,
/// reporting progress through `scope`.
pub trait Exporter {
    fn format(&self) -> OutputFormat;

    fn export(
        &self,
        document: &Document,
        metadata: &Metadata,
        path: &Path,
        scope: PhaseScope<'_>,
    ) -> Result<()>;
}

/// Format-keyed strategy table.
#[derive(Default)]
pub struct ExporterRegistry {
    exporters: Vec<Box<dyn Exporter>>,
}

impl ExporterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in exporter.
    pub fn with_default_exporters() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(GltfExporter::text()));
        registry.register(Box::new(GltfExporter::binary()));
        registry.register(Box::new(ObjExporter));
        registry.register(Box::new(StlExporter));
        registry
    }

    /// Later registrations shadow earlier ones for the same format.
    pub fn register(&mut self, exporter: Box<dyn Exporter>) {
        self.exporters.insert(0, exporter);
    }

    pub fn get(&self, format: OutputFormat) -> Option<&dyn Exporter> {
        self.exporters
            .iter()
            .find(|e| e.format() == format)
            .map(|e| e.as_ref())
    }
}

/// Dispatch lifecycle: one run, two mutually exclusive terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    SceneExport,
    FlattenExport,
    Done,
    Failed,
}

/// Routes a meshed document to the exporter for its target format and
/// records the outcome on both itself and the document.
pub struct ExportDispatcher {
    registry: ExporterRegistry,
    state: DispatchState,
}

impl Default for ExportDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ExportDispatcher {
    pub fn new() -> Self {
        ExportDispatcher {
            registry: ExporterRegistry::with_default_exporters(),
            state: DispatchState::Idle,
        }
    }

    pub fn with_registry(registry: ExporterRegistry) -> Self {
        ExportDispatcher {
            registry,
            state: DispatchState::Idle,
        }
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    /// Run the export. Consumes the dispatcher's one shot: terminal states
    /// are final and a second dispatch on the same instance is a
    /// programming error.
    pub fn dispatch(
        &mut self,
        document: &mut Document,
        metadata: &Metadata,
        target: &OutputTarget,
        scope: PhaseScope<'_>,
    ) -> Result<()> {
        debug_assert_eq!(self.state, DispatchState::Idle, "dispatcher already used");

        let Some(exporter) = self.registry.get(target.format) else {
            self.state = DispatchState::Failed;
            document.transition(DocumentState::Failed);
            return Err(ConvertError::export(target.format, "no exporter registered"));
        };

        self.state = if target.format.preserves_scene() {
            DispatchState::SceneExport
        } else {
            DispatchState::FlattenExport
        };
        debug!(format = %target.format, strategy = ?self.state, "exporting");

        match exporter.export(document, metadata, &target.path, scope) {
            Ok(()) => {
                self.state = DispatchState::Done;
                document.transition(DocumentState::Exported);
                Ok(())
            }
            Err(err) => {
                self.state = DispatchState::Failed;
                document.transition(DocumentState::Failed);
                Err(err)
            }
        }
    }
}

/// Flatten every meshed leaf node into one compound mesh in world space.
pub fn flatten_to_compound(document: &Document) -> TriangleMesh {
    let mut compound = TriangleMesh::new();
    for (node, world) in document.leaves() {
        let Some(shape) = node.shape else { continue };
        if let Some(mesh) = &document.shapes()[shape].mesh {
            compound.append(&mesh.transformed(world));
        }
    }
    compound
}
