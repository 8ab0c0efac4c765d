//! Per-run analysis context.
//!
//! Everything that outlives a single method analysis lives here: the class
//! repository, the set of classes whose methods may be entered, the memo of
//! method results, the recursion bookkeeping and the report sink. A context
//! is created fresh for every [`analyze`](super::analyze) call, so no state
//! leaks between runs.

use super::report::ReportSink;
use super::variable::Variable;
use super::AnalysisConfig;
use crate::loader::ClassRepository;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Identity of a method: owning class, name and descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodKey {
    pub class: String,
    pub name: String,
    pub descriptor: String,
}

impl MethodKey {
    pub fn new(class: &str, name: &str, descriptor: &str) -> Self {
        Self {
            class: class.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.class, self.name, self.descriptor)
    }
}

/// Abstract return values of analysed methods.
///
/// Stored values never carry relations.
#[derive(Debug, Clone)]
pub struct MemoTable {
    results: HashMap<MethodKey, Variable>,
}

impl MemoTable {
    pub fn new() -> Self {
        Self {
            results: HashMap::new(),
        }
    }

    pub fn get(&self, key: &MethodKey) -> Option<&Variable> {
        self.results.get(key)
    }

    /// Records the result for `key`, replacing any earlier one.
    pub fn insert(&mut self, key: MethodKey, mut result: Variable) {
        result.clear_relations();
        self.results.insert(key, result);
    }

    pub fn contains(&self, key: &MethodKey) -> bool {
        self.results.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl Default for MemoTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters collected over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisStats {
    /// Method bodies interpreted, counting every re-analysis.
    pub methods_analyzed: usize,
    pub opaque_calls: usize,
    /// Loop-body re-interpretations across all loops.
    pub loop_iterations: usize,
    /// Re-analyses of recursive methods.
    pub recursion_iterations: usize,
}

/// State threaded through every method analysis of one run.
pub struct AnalysisContext<'r> {
    pub(crate) repository: &'r dyn ClassRepository,
    analyzed: HashSet<String>,
    pub(crate) config: AnalysisConfig,
    /// Methods whose analysis has started and not finished.
    pub(crate) in_progress: HashSet<MethodKey>,
    /// Methods that were re-entered while in progress.
    pub(crate) recursive: HashSet<MethodKey>,
    pub(crate) memo: MemoTable,
    pub(crate) reports: ReportSink,
    pub(crate) stats: AnalysisStats,
}

impl fmt::Debug for AnalysisContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisContext")
            .field("analyzed", &self.analyzed)
            .field("config", &self.config)
            .field("in_progress", &self.in_progress)
            .field("memo", &self.memo.len())
            .field("reports", &self.reports.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<'r> AnalysisContext<'r> {
    pub fn new<I, S>(repository: &'r dyn ClassRepository, analyzed: I, config: AnalysisConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            repository,
            analyzed: analyzed.into_iter().map(Into::into).collect(),
            config,
            in_progress: HashSet::new(),
            recursive: HashSet::new(),
            memo: MemoTable::new(),
            reports: ReportSink::new(),
            stats: AnalysisStats::default(),
        }
    }

    /// Calls into `class` are followed; calls anywhere else are opaque.
    pub fn is_analyzed(&self, class: &str) -> bool {
        self.analyzed.contains(class)
    }

    pub fn memo(&self) -> &MemoTable {
        &self.memo
    }

    #[cfg(test)]
    pub(crate) fn reports(&self) -> &ReportSink {
        &self.reports
    }

    pub fn stats(&self) -> AnalysisStats {
        self.stats
    }
}
