//! Per-store logging
//!
//! Each store owns its own span and verbosity instead of sharing a
//! process-wide logger. Events are emitted as children of the store span and
//! dropped when they are more verbose than the store's filter, regardless of
//! what the installed subscriber would accept.

use std::fmt;
use std::path::Path;

use tracing::level_filters::LevelFilter;
use tracing::{Level, Span};

/// Logging handle configured on a single store
#[derive(Debug, Clone)]
pub struct StoreLogger {
    span: Span,
    filter: LevelFilter,
}

impl StoreLogger {
    /// Create a logger whose span records the container path
    pub fn new(path: &Path, filter: LevelFilter) -> Self {
        Self {
            span: tracing::info_span!("store", path = %path.display()),
            filter,
        }
    }

    /// Whether events at `level` pass this store's filter
    pub fn enabled(&self, level: Level) -> bool {
        level <= self.filter
    }

    pub fn filter(&self) -> LevelFilter {
        self.filter
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        if self.enabled(Level::ERROR) {
            tracing::error!(parent: &self.span, "{}", args);
        }
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        if self.enabled(Level::WARN) {
            tracing::warn!(parent: &self.span, "{}", args);
        }
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        if self.enabled(Level::INFO) {
            tracing::info!(parent: &self.span, "{}", args);
        }
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        if self.enabled(Level::DEBUG) {
            tracing::debug!(parent: &self.span, "{}", args);
        }
    }

    pub fn trace(&self, args: fmt::Arguments<'_>) {
        if self.enabled(Level::TRACE) {
            tracing::trace!(parent: &self.span, "{}", args);
        }
    }
}
