//! Interprocedural array-bounds analysis.
//!
//! Integer values are abstracted by their sign ([`DomainValue`]) together
//! with sets of values they are known to be below ([`Variable`]). An array
//! access is safe when its index is non-negative and strictly below the
//! array's length; every other access produces a [`Report`].
//!
//! # Example
//!
//! ```
//! use jvm_bounds::analysis::{analyze, AnalysisConfig};
//! use jvm_bounds::ir::{ArrayKind, ClassIr, Instruction, MethodIr, ValueKind};
//! use jvm_bounds::loader::Repository;
//!
//! // static int first(int[] a) { return a[0]; }
//! let method = MethodIr::new_static("first", "([I)I").with_instructions(vec![
//!     Instruction::Load { kind: ValueKind::Reference, slot: 0 },
//!     Instruction::Const(jvm_bounds::ir::Constant::Int(0)),
//!     Instruction::ArrayLoad(ArrayKind::Int),
//!     Instruction::Return(Some(ValueKind::Int)),
//! ]);
//! let mut repository = Repository::new();
//! repository.add_class(ClassIr::new("demo/First").with_method(method));
//!
//! let outcome = analyze(&repository, &["demo/First"], &AnalysisConfig::default())?;
//! assert_eq!(outcome.reports.len(), 1);
//! assert_eq!(outcome.reports[0].to_string(), "demo/First:? in first");
//! # Ok::<(), jvm_bounds::error::AnalysisError>(())
//! ```

mod context;
mod engine;
mod lattice;
mod report;
mod state;
mod variable;

pub use context::{AnalysisContext, AnalysisStats, MemoTable, MethodKey};
pub use lattice::DomainValue;
pub use report::{Report, ReportSink};
pub use state::{ExecutionState, Relation};
pub use variable::{VarId, VarKind, Variable};

use crate::error::AnalysisError;
use crate::loader::ClassRepository;
use log::{debug, info};
use serde::Serialize;
use std::fmt;

/// Default cap on re-interpretations of one loop.
pub const DEFAULT_MAX_LOOP_ITERATIONS: usize = 32;
/// Default cap on re-analyses of one recursive method.
pub const DEFAULT_MAX_RECURSION_ITERATIONS: usize = 16;

/// Analysis limits.
///
/// The lattice bounds how often a single fact can change, but not how many
/// facts a loop or recursive call can touch, so both fixpoints are capped.
/// Hitting a cap logs a warning and keeps the last joined state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisConfig {
    pub max_loop_iterations: usize,
    pub max_recursion_iterations: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_loop_iterations: DEFAULT_MAX_LOOP_ITERATIONS,
            max_recursion_iterations: DEFAULT_MAX_RECURSION_ITERATIONS,
        }
    }
}

impl AnalysisConfig {
    pub fn with_max_loop_iterations(mut self, n: usize) -> Self {
        self.max_loop_iterations = n.max(1);
        self
    }

    pub fn with_max_recursion_iterations(mut self, n: usize) -> Self {
        self.max_recursion_iterations = n.max(1);
        self
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisOutcome {
    /// Deduplicated, in the order they were found.
    pub reports: Vec<Report>,
    pub stats: AnalysisStats,
}

impl AnalysisOutcome {
    pub fn is_clean(&self) -> bool {
        self.reports.is_empty()
    }
}

impl fmt::Display for AnalysisOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reports.is_empty() {
            return writeln!(f, "No defects found");
        }
        for report in &self.reports {
            writeln!(f, "{report}")?;
        }
        Ok(())
    }
}

/// Analyses every method of the named classes.
///
/// Calls into the named classes are followed; calls anywhere else are
/// opaque. Every class must be present in `repository`. Any error aborts
/// the whole run.
pub fn analyze<S: AsRef<str>>(
    repository: &dyn ClassRepository,
    class_names: &[S],
    config: &AnalysisConfig,
) -> Result<AnalysisOutcome, AnalysisError> {
    let names: Vec<&str> = class_names.iter().map(AsRef::as_ref).collect();
    let mut classes = Vec::with_capacity(names.len());
    for &name in &names {
        let class = repository
            .lookup(name)
            .ok_or_else(|| AnalysisError::ClassNotFound(name.to_string()))?;
        classes.push(class);
    }

    let mut ctx = AnalysisContext::new(repository, names.iter().copied(), *config);
    for class in classes {
        debug!("class {}", class.name);
        for method in &class.methods {
            let key = MethodKey::new(&class.name, &method.name, &method.descriptor);
            if ctx.memo().contains(&key) {
                continue;
            }
            engine::analyze_and_stabilise(&mut ctx, class, method)?;
        }
    }

    let stats = ctx.stats();
    info!(
        "analysed {} method bodies, {} opaque calls, {} loop iterations, {} recursion iterations",
        stats.methods_analyzed, stats.opaque_calls, stats.loop_iterations, stats.recursion_iterations
    );
    Ok(AnalysisOutcome {
        reports: ctx.reports.into_vec(),
        stats,
    })
}
