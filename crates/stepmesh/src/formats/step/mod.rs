//! STEP (ISO 10303) import.

pub mod entities;
pub mod p21;
pub mod reader;

pub use reader::{import_step, ImportOptions};
