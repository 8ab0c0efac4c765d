//! Instruction-level IR consumed by the analysis.
//!
//! A [`ClassIr`] is what the analysis sees of a class: its name, superclass,
//! source file and methods. Each [`MethodIr`] carries a linear instruction list
//! with branch targets already resolved to instruction indices, plus sparse
//! line annotations. The analysis only ever reads the IR.
//!
//! IR can be produced by [`crate::lowering`] from class files, or written by
//! hand (or as JSON) for tests and other front ends.
//!
//! # Example
//!
//! ```
//! use jvm_bounds::ir::{ClassIr, Instruction, MethodIr, LineAnnotation};
//!
//! let method = MethodIr::new_static("zero", "()I")
//!     .with_instructions(vec![
//!         Instruction::Const(jvm_bounds::ir::Constant::Int(0)),
//!         Instruction::Return(Some(jvm_bounds::ir::ValueKind::Int)),
//!     ])
//!     .with_lines(vec![LineAnnotation { index: 0, line: 3 }]);
//! let class = ClassIr::new("demo/Zero").with_method(method);
//! assert_eq!(class.methods[0].line_at(1), Some(3));
//! ```

pub mod instr;

pub use instr::{
    ArithOp, ArrayKind, Cmp, Condition, Constant, ConvertTarget, Instruction, InvokeKind, NumKind,
    StackOp, ValueKind,
};
pub use jvm_bounds_classfile::access;

use serde::{Deserialize, Serialize};

/// Line number in effect from instruction `index` onwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineAnnotation {
    pub index: usize,
    pub line: u32,
}

/// A method as seen by the analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodIr {
    pub name: String,
    pub descriptor: String,
    pub access_flags: u16,
    /// Empty for native and abstract methods.
    #[serde(default)]
    pub instructions: Vec<Instruction>,
    /// Sorted by `index`.
    #[serde(default)]
    pub lines: Vec<LineAnnotation>,
}

impl MethodIr {
    pub fn new(name: &str, descriptor: &str, access_flags: u16) -> Self {
        Self {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access_flags,
            instructions: Vec::new(),
            lines: Vec::new(),
        }
    }

    /// A `public static` method.
    pub fn new_static(name: &str, descriptor: &str) -> Self {
        Self::new(name, descriptor, access::ACC_PUBLIC | access::ACC_STATIC)
    }

    pub fn with_instructions(mut self, instructions: Vec<Instruction>) -> Self {
        self.instructions = instructions;
        self
    }

    pub fn with_lines(mut self, mut lines: Vec<LineAnnotation>) -> Self {
        lines.sort();
        self.lines = lines;
        self
    }

    pub fn is_static(&self) -> bool {
        self.access_flags & access::ACC_STATIC != 0
    }

    pub fn is_native(&self) -> bool {
        self.access_flags & access::ACC_NATIVE != 0
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags & access::ACC_ABSTRACT != 0
    }

    /// Source line of the instruction at `index`: the nearest annotation at
    /// or before it.
    pub fn line_at(&self, index: usize) -> Option<u32> {
        let after = self.lines.partition_point(|a| a.index <= index);
        after.checked_sub(1).map(|i| self.lines[i].line)
    }
}

/// A class as seen by the analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassIr {
    /// Internal name, e.g. `com/example/Main`.
    pub name: String,
    #[serde(default)]
    pub super_name: Option<String>,
    #[serde(default)]
    pub source_file: Option<String>,
    #[serde(default)]
    pub methods: Vec<MethodIr>,
}

impl ClassIr {
    /// A class extending `java/lang/Object`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            super_name: Some("java/lang/Object".to_string()),
            source_file: None,
            methods: Vec::new(),
        }
    }

    pub fn with_super(mut self, super_name: Option<&str>) -> Self {
        self.super_name = super_name.map(str::to_string);
        self
    }

    pub fn with_source_file(mut self, file: &str) -> Self {
        self.source_file = Some(file.to_string());
        self
    }

    pub fn with_method(mut self, method: MethodIr) -> Self {
        self.methods.push(method);
        self
    }

    /// Name used in reports: the `SourceFile` attribute when present,
    /// otherwise the class name.
    pub fn source_name(&self) -> &str {
        self.source_file.as_deref().unwrap_or(&self.name)
    }

    /// Declared method with exactly this name and descriptor.
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&MethodIr> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }
}
