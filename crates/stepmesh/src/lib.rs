//! STEP-to-mesh conversion library.
//!
//! Reads a STEP (ISO 10303-21) solid model, tessellates its shapes against
//! a pair of deflection tolerances, and writes glTF, GLB, OBJ, or binary
//! STL. Progress flows through weighted phase scopes into a pluggable
//! sink, so the CLI's terminal bar and silent test runs share one code
//! path.
//!
//! The typical entry point is [`pipeline::convert`]:
//!
//! ```no_run
//! use stepmesh::config::ToleranceConfig;
//! use stepmesh::progress::SilentProgress;
//!
//! let config = ToleranceConfig::default();
//! stepmesh::pipeline::convert(
//!     "model.step".as_ref(),
//!     "model.glb".as_ref(),
//!     &config,
//!     &SilentProgress,
//! )?;
//! # Ok::<(), stepmesh::error::ConvertError>(())
//! ```

pub mod config;
pub mod error;
pub mod export;
pub mod formats;
pub mod mesh;
pub mod pipeline;
pub mod progress;
pub mod scene;

pub use config::ToleranceConfig;
pub use error::{ConvertError, Result};
pub use export::{OutputFormat, OutputTarget};
pub use pipeline::{convert, Pipeline};
pub use progress::{PhaseScope, ProgressSink, SilentProgress, TerminalProgress};
pub use scene::{Document, DocumentState};
