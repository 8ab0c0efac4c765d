//! Findings: array accesses whose index could not be proven in bounds.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// One possibly out-of-bounds access, identified by its source position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Report {
    /// Source file name, or the class name when the class has none.
    pub file: String,
    pub method: String,
    /// `None` when the method carries no line numbers.
    pub line: Option<u32>,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{} in {}", self.file, line, self.method),
            None => write!(f, "{}:? in {}", self.file, self.method),
        }
    }
}

/// Deduplicating, order-preserving collection of reports.
#[derive(Debug, Clone, Default)]
pub struct ReportSink {
    seen: HashSet<Report>,
    reports: Vec<Report>,
}

impl ReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `report` unless an equal one is already present. Returns whether
    /// it was new.
    pub fn push(&mut self, report: Report) -> bool {
        if self.seen.insert(report.clone()) {
            self.reports.push(report);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Report> + '_ {
        self.reports.iter()
    }

    pub fn into_vec(self) -> Vec<Report> {
        self.reports
    }
}
