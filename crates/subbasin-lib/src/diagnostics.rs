//! Per-item diagnostics recorded when a stage skips an item instead of failing

use crate::DataError;
use std::fmt;

/// Pipeline stage that produced a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Load,
    Resolve,
    Cache,
    Optimize,
    Fragment,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Resolve => "resolve",
            Stage::Cache => "cache",
            Stage::Optimize => "optimize",
            Stage::Fragment => "fragment",
        };
        f.write_str(name)
    }
}

/// A skipped item and the reason it was skipped
#[derive(Debug)]
pub struct Diagnostic {
    pub stage: Stage,
    /// Human-readable item reference, e.g. `subbasin 12` or `river "Рось"`
    pub item: String,
    pub error: DataError,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.stage, self.item, self.error)
    }
}

/// Collected diagnostics of a run
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a skipped item and log it
    pub fn record(&mut self, stage: Stage, item: impl Into<String>, error: DataError) {
        let diagnostic = Diagnostic {
            stage,
            item: item.into(),
            error,
        };
        tracing::warn!("{}", diagnostic);
        self.entries.push(diagnostic);
    }

    /// Move all entries of `other` into this collection
    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// Number of diagnostics recorded by one stage
    pub fn count_for(&self, stage: Stage) -> usize {
        self.entries.iter().filter(|d| d.stage == stage).count()
    }
}
