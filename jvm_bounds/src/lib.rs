// Library code logs through `log`; only the CLI binary writes to stderr.
#![deny(clippy::print_stderr)]

//! jvm_bounds
//!
//! Static array-bounds checking for JVM bytecode. Every method of a closed
//! set of classes is abstractly interpreted; each array access whose index
//! cannot be proven non-negative and strictly below the array's length is
//! reported as `file:line in method`.
//!
//! The pipeline is: class files are decoded by `jvm_bounds_classfile`,
//! lowered into [`ir`] by [`lowering`], collected in a [`loader::Repository`],
//! and analysed by [`analysis::analyze`].
//!
//! # Example
//!
//! ```
//! use jvm_bounds::{analyze, AnalysisConfig, Repository};
//!
//! let mut repository = Repository::new();
//! let names = repository.load_json_str(r#"[{"name": "demo/Empty"}]"#)?;
//! let outcome = analyze(&repository, &names, &AnalysisConfig::default())?;
//! assert!(outcome.is_clean());
//! assert_eq!(outcome.to_string(), "No defects found\n");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod analysis;
pub mod error;
pub mod ir;
pub mod loader;
pub mod lowering;

// Re-exports
pub use analysis::{analyze, AnalysisConfig, AnalysisOutcome, AnalysisStats, Report};
pub use error::{AnalysisError, LoadError, LoweringError};
pub use loader::{ClassRepository, Repository};
