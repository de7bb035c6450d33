use std::time::Instant;

use tracing::Span;

/// Structured logging context passed explicitly through a run.
///
/// Created once per run, narrowed per comparison with [`LogContext::scoped`], and
/// finished with [`LogContext::close`]. Library code emits its events with
/// `parent: ctx.span()` so every matching decision is attributed to the comparison
/// that made it, even when comparisons run on worker threads.
///
/// # Examples
///
/// ```
/// use lineage_core::LogContext;
///
/// let ctx = LogContext::new("evolve");
/// let cmp = ctx.scoped("BinarySearch_KF0_v0_nop -> BinarySearch_KF0_v1_nop");
/// tracing::debug!(parent: cmp.span(), "comparing");
/// ctx.close();
/// ```
#[derive(Debug, Clone)]
pub struct LogContext {
    span: Span,
    started: Instant,
}

impl LogContext {
    /// Open the root span of a run.
    pub fn new(run: &str) -> Self {
        Self {
            span: tracing::info_span!("lineage", run = %run),
            started: Instant::now(),
        }
    }

    /// A context whose events have no parent span. Used by tests and one-off calls.
    pub fn disabled() -> Self {
        Self {
            span: Span::none(),
            started: Instant::now(),
        }
    }

    /// Child context for one comparison.
    pub fn scoped(&self, comparison: &str) -> Self {
        Self {
            span: tracing::debug_span!(parent: &self.span, "comparison", id = %comparison),
            started: Instant::now(),
        }
    }

    /// Span to use as `parent:` for events.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Finish the run, recording its wall time.
    pub fn close(self) {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        tracing::debug!(parent: &self.span, elapsed_ms, "run finished");
    }
}
