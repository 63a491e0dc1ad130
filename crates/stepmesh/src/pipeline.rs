//! End-to-end conversion pipeline.
//!
//! Owns the root progress scope and carves it into the three weighted
//! phases: import 30%, meshing 20%, export 50%. Stage banners on stdout
//! are part of the CLI surface and only appear at verbosity > 0.

use std::path::Path;

use tracing::debug;

use crate::config::ToleranceConfig;
use crate::error::Result;
use crate::export::{ExportDispatcher, Metadata, OutputTarget};
use crate::formats::step::{import_step, ImportOptions};
use crate::mesh::MeshingStage;
use crate::progress::{PhaseScope, ProgressSink};

pub const IMPORT_WEIGHT: f64 = 0.30;
pub const MESH_WEIGHT: f64 = 0.20;
pub const EXPORT_WEIGHT: f64 = 0.50;

/// One conversion run: STEP in, mesh file out.
pub struct Pipeline<'a> {
    config: &'a ToleranceConfig,
    sink: &'a dyn ProgressSink,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a ToleranceConfig, sink: &'a dyn ProgressSink) -> Self {
        Pipeline { config, sink }
    }

    /// Convert `input` to `output`, with the format inferred from the
    /// output extension. Tolerances and the target format are validated
    /// before any file is touched.
    pub fn run(&self, input: &Path, output: &Path) -> Result<()> {
        self.config.validate()?;
        let target = OutputTarget::from_path(output)?;
        let verbose = self.config.verbosity > 0;

        let mut scope = PhaseScope::root(self.sink);

        if verbose {
            println!("Loading \"{}\" ...", input.display());
            println!("Parsing STEP ...");
        }
        let (mut document, roots) =
            import_step(input, &ImportOptions::default(), scope.child(IMPORT_WEIGHT))?;
        debug!(roots, shapes = document.shape_count(), "import finished");

        if verbose {
            println!(
                "Meshing shapes (linear {}, angular {}) ...",
                self.config.linear_deflection, self.config.angular_deflection
            );
        }
        MeshingStage::new(self.config).run(&mut document, scope.child(MESH_WEIGHT));

        if verbose {
            println!("Saving to {} ...", target.format.extension());
        }
        let metadata = self.metadata(input);
        let mut dispatcher = ExportDispatcher::new();
        dispatcher.dispatch(&mut document, &metadata, &target, scope.child(EXPORT_WEIGHT))?;

        scope.complete();
        Ok(())
    }

    fn metadata(&self, input: &Path) -> Metadata {
        let mut metadata = Metadata::new();
        if let Some(name) = input.file_name().and_then(|n| n.to_str()) {
            metadata.insert("source".to_string(), name.to_string());
        }
        metadata.insert(
            "generator".to_string(),
            concat!("stepmesh ", env!("CARGO_PKG_VERSION")).to_string(),
        );
        metadata.insert(
            "linear_deflection".to_string(),
            self.config.linear_deflection.to_string(),
        );
        metadata.insert(
            "angular_deflection".to_string(),
            self.config.angular_deflection.to_string(),
        );
        metadata
    }
}

/// Convenience wrapper for a single conversion.
pub fn convert(
    input: &Path,
    output: &Path,
    config: &ToleranceConfig,
    sink: &dyn ProgressSink,
) -> Result<()> {
    Pipeline::new(config, sink).run(input, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConvertError;
    use crate::progress::SilentProgress;
    use std::path::PathBuf;

    #[test]
    fn test_invalid_tolerance_rejected_before_io() {
        let config = ToleranceConfig::new(-1.0, 0.5);
        let sink = SilentProgress;
        let err = Pipeline::new(&config, &sink)
            .run(Path::new("does-not-exist.step"), Path::new("out.gltf"))
            .unwrap_err();
        assert!(matches!(err, ConvertError::InvalidTolerance { name: "linear", .. }));
    }

    #[test]
    fn test_unknown_extension_fails_before_import() {
        let config = ToleranceConfig::default();
        let sink = SilentProgress;
        // The input path does not exist: the extension check must fire first.
        let err = Pipeline::new(&config, &sink)
            .run(
                &PathBuf::from("does-not-exist.step"),
                &PathBuf::from("out.ply"),
            )
            .unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedExtension(_)));
    }

    #[test]
    fn test_missing_input_is_an_import_error() {
        let config = ToleranceConfig::default();
        let sink = SilentProgress;
        let err = Pipeline::new(&config, &sink)
            .run(
                &PathBuf::from("does-not-exist.step"),
                &PathBuf::from("out.stl"),
            )
            .unwrap_err();
        assert!(matches!(err, ConvertError::Import { .. }));
    }
}
