//! Error types for the conversion pipeline.

use std::path::PathBuf;

use thiserror::Error;

use crate::export::OutputFormat;

/// Result type for conversion operations.
pub type Result<T> = std::result::Result<T, ConvertError>;

/// Fatal errors surfaced by the conversion pipeline.
///
/// Per-shape meshing problems are deliberately absent here: they are
/// recovered inside the meshing stage and never escalate.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The output path does not carry a recognized extension.
    #[error("output filename shall have .gltf, .glb, .stl or .obj extension.")]
    UnsupportedExtension(PathBuf),

    /// A deflection tolerance is non-positive or non-finite.
    #[error("invalid {name} deflection {value}: must be a positive finite number")]
    InvalidTolerance {
        /// Which tolerance ("linear" or "angular").
        name: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// The STEP file could not be read, parsed, or transferred.
    #[error("failed to read STEP file {path:?}: {message}")]
    Import {
        /// Path of the offending input file.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// The writer for the selected format failed.
    #[error("failed to write {format} output: {message}")]
    Export {
        /// The format whose writer failed.
        format: OutputFormat,
        /// Format-specific failure message.
        message: String,
    },

    /// I/O error outside of a specific import/export context.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConvertError {
    /// Create an import error for the given path.
    pub fn import(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Import {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an export error for the given format.
    pub fn export(format: OutputFormat, message: impl Into<String>) -> Self {
        Self::Export {
            format,
            message: message.into(),
        }
    }
}
