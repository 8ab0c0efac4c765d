//! Error types for loading and analysis.
//!
//! Every error here is fatal for the run that produced it: the analysis never
//! returns a partial report list alongside an error.

use jvm_bounds_classfile::ClassFileError;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to turn a decoded method's bytecode into IR.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoweringError {
    #[error("bytecode ends inside the instruction at offset {offset}")]
    Truncated { offset: usize },

    #[error("unknown opcode {opcode:#04x} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },

    #[error("branch at offset {offset} targets {target}, which is not an instruction boundary")]
    InvalidBranchTarget { offset: usize, target: i64 },

    #[error("newarray at offset {offset} has unknown element type code {code}")]
    InvalidArrayType { offset: usize, code: u8 },

    #[error("in method {method}: {source}")]
    ClassFile {
        method: String,
        #[source]
        source: ClassFileError,
    },
}

/// Failure to load an input into the class repository.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot decode {}: {source}", .path.display())]
    ClassFile {
        path: PathBuf,
        #[source]
        source: ClassFileError,
    },

    #[error("cannot lower class {class}: {source}")]
    Lowering {
        class: String,
        #[source]
        source: LoweringError,
    },

    #[error("invalid class IR in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot read archive {}: {source}", .path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("{}: expected a .class, .jar or .json file, or a directory", .path.display())]
    UnsupportedInput { path: PathBuf },
}

/// Fatal condition met while interpreting a method.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("class {0} is not loaded")]
    ClassNotFound(String),

    #[error("cannot resolve method {owner}.{name}{descriptor}")]
    MethodNotFound {
        owner: String,
        name: String,
        descriptor: String,
    },

    #[error("operand stack underflow at instruction {pc}")]
    StackUnderflow { pc: usize },

    #[error("athrow at instruction {pc} of {method}: exception flow is not modelled")]
    Throw { method: String, pc: usize },

    #[error("unsupported instruction (opcode {opcode:#04x}) at {pc} of {method}")]
    UnsupportedInstruction {
        method: String,
        pc: usize,
        opcode: u8,
    },

    #[error(transparent)]
    Descriptor(#[from] ClassFileError),
}
