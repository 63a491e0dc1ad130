//! Weighted slices of the total work.

use super::ProgressSink;

/// Tolerance on cumulative child weight, absorbing floating rounding when
/// N equal slices of 1/N are carved.
const WEIGHT_EPSILON: f64 = 1e-6;

/// A handle for one weighted slice of the total work.
///
/// A scope covers the global interval `[base, base + span]` of the root
/// sink's `[0, 1]` range. [`PhaseScope::child`] carves the next `weight`
/// fraction of the span for a nested phase; completion of children rolls
/// up proportionally. Under-allocation is allowed: any span not given to
/// a child simply stays pending until the scope itself advances.
///
/// Scopes are created when a stage begins a unit of work and dropped when
/// it completes; a child never outlives the sink borrowed by its parent.
pub struct PhaseScope<'s> {
    sink: &'s dyn ProgressSink,
    base: f64,
    span: f64,
    /// Cumulative weight handed out to children so far.
    allocated: f64,
}

impl<'s> PhaseScope<'s> {
    /// Create the root scope spanning the sink's whole `[0, 1]` range.
    pub fn root(sink: &'s dyn ProgressSink) -> Self {
        Self {
            sink,
            base: 0.0,
            span: 1.0,
            allocated: 0.0,
        }
    }

    /// Allocate a nested scope covering the next `weight` fraction of this
    /// scope's span.
    ///
    /// # Panics
    ///
    /// Panics if `weight` is negative or the cumulative weight of all
    /// children would exceed 1.0 (plus a small tolerance). Both are
    /// programming errors in the calling stage, not user-facing failures.
    pub fn child(&mut self, weight: f64) -> PhaseScope<'s> {
        assert!(
            weight >= 0.0 && weight.is_finite(),
            "phase weight must be a non-negative finite number, got {weight}"
        );
        assert!(
            self.allocated + weight <= 1.0 + WEIGHT_EPSILON,
            "phase over-allocated: {} + {weight} exceeds 1.0",
            self.allocated
        );

        let child = PhaseScope {
            sink: self.sink,
            base: self.base + self.span * self.allocated,
            span: self.span * weight,
            allocated: 0.0,
        };
        self.allocated += weight;
        child
    }

    /// Set this scope's local completion and forward the resulting global
    /// fraction to the root sink.
    pub fn advance_to(&mut self, fraction: f64) {
        let local = fraction.clamp(0.0, 1.0);
        self.sink.advance(self.base + self.span * local);
    }

    /// Drive the scope to full completion, consuming it so no further
    /// children can be created.
    pub fn complete(mut self) {
        self.advance_to(1.0);
    }

    /// Cooperative cancellation query, forwarded from the sink.
    pub fn should_abort(&self) -> bool {
        self.sink.should_abort()
    }

    /// Global position where this scope's span begins.
    #[cfg(test)]
    pub(crate) fn base(&self) -> f64 {
        self.base
    }

    /// Global extent of this scope's span.
    #[cfg(test)]
    pub(crate) fn span(&self) -> f64 {
        self.span
    }
}
