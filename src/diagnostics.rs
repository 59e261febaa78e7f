//! Sink for failures that are contained rather than propagated.

use std::sync::Arc;
use tracing::error;

/// Receives non-fatal errors. Implementations must never panic or re-raise.
pub trait Diagnostics: Send + Sync {
    fn report(&self, error: &anyhow::Error, message: &str);
}

impl<T: Diagnostics + ?Sized> Diagnostics for Arc<T> {
    fn report(&self, error: &anyhow::Error, message: &str) {
        (**self).report(error, message)
    }
}

/// Reports through the tracing subscriber installed by [`crate::logging::init`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn report(&self, error: &anyhow::Error, message: &str) {
        error!("{}: {:#}", message, error);
    }
}
