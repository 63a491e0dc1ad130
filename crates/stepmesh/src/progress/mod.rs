//! Progress reporting: weighted phase scopes rolling up into a sink.
//!
//! The pipeline depends only on the [`ProgressSink`] capability, so
//! non-interactive runs can plug in [`SilentProgress`] or
//! [`JsonLinesProgress`] without touching the stages.

mod scope;
mod sink;

pub use scope::PhaseScope;
pub use sink::{JsonLinesProgress, SilentProgress, TerminalProgress};

/// Consumer of fractional completion events from a tree of weighted phases.
///
/// `advance` may be called from multiple threads; implementations must
/// serialize their internal state themselves.
pub trait ProgressSink: Send + Sync {
    /// Report overall completion as a fraction in `[0, 1]`.
    fn advance(&self, fraction: f64);

    /// Cooperative cancellation query, polled between units of work.
    ///
    /// The interactive sink never requests an abort; the hook exists so
    /// long-running phases stay interruptible in principle.
    fn should_abort(&self) -> bool {
        false
    }
}
