//! Linear instruction set.
//!
//! One variant per instruction category. Branch targets are indices into the
//! owning method's instruction list, never byte offsets.

use jvm_bounds_classfile::FieldType;
use serde::{Deserialize, Serialize};

/// Operand type of loads, stores and returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl ValueKind {
    /// The static type a fresh value of this kind carries, if known.
    pub fn field_type(self) -> Option<FieldType> {
        match self {
            ValueKind::Int => Some(FieldType::Int),
            ValueKind::Long => Some(FieldType::Long),
            ValueKind::Float => Some(FieldType::Float),
            ValueKind::Double => Some(FieldType::Double),
            ValueKind::Reference => None,
        }
    }
}

/// Numeric operand type of arithmetic, comparison and conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumKind {
    Int,
    Long,
    Float,
    Double,
}

impl NumKind {
    pub fn field_type(self) -> FieldType {
        match self {
            NumKind::Int => FieldType::Int,
            NumKind::Long => FieldType::Long,
            NumKind::Float => FieldType::Float,
            NumKind::Double => FieldType::Double,
        }
    }
}

/// Element type of `xaload` / `xastore`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrayKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
    /// `baload`/`bastore`, shared by `byte[]` and `boolean[]`.
    Byte,
    Char,
    Short,
}

impl ArrayKind {
    pub fn field_type(self) -> Option<FieldType> {
        match self {
            ArrayKind::Int => Some(FieldType::Int),
            ArrayKind::Long => Some(FieldType::Long),
            ArrayKind::Float => Some(FieldType::Float),
            ArrayKind::Double => Some(FieldType::Double),
            ArrayKind::Reference => None,
            ArrayKind::Byte => Some(FieldType::Byte),
            ArrayKind::Char => Some(FieldType::Char),
            ArrayKind::Short => Some(FieldType::Short),
        }
    }
}

/// Target of a numeric conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvertTarget {
    Int,
    Long,
    Float,
    Double,
    Byte,
    Char,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Neg,
    Shl,
    Shr,
    Ushr,
    And,
    Or,
    Xor,
}

impl ArithOp {
    pub fn is_unary(self) -> bool {
        matches!(self, ArithOp::Neg)
    }
}

/// Operand-stack shuffles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackOp {
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
}

/// Relational operator of a conditional branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cmp {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

/// Condition under which a conditional branch is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// `ifeq` .. `ifle`: one int compared against zero.
    Zero(Cmp),
    /// `if_icmpeq` .. `if_icmple`: two ints.
    Ints(Cmp),
    RefsEqual,
    RefsNotEqual,
    Null,
    NonNull,
}

impl Condition {
    /// Number of operands the branch pops.
    pub fn arity(self) -> usize {
        match self {
            Condition::Zero(_) | Condition::Null | Condition::NonNull => 1,
            Condition::Ints(_) | Condition::RefsEqual | Condition::RefsNotEqual => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
}

/// Operand of a constant push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constant {
    Null,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    /// A `Class` literal, by internal name.
    Class(String),
    /// Method handles, method types and dynamic constants.
    Opaque,
}

/// A single lowered instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Instruction {
    Nop,
    Const(Constant),
    Load {
        kind: ValueKind,
        slot: u16,
    },
    Store {
        kind: ValueKind,
        slot: u16,
    },
    Iinc {
        slot: u16,
        delta: i16,
    },
    Stack(StackOp),
    ArrayLoad(ArrayKind),
    ArrayStore(ArrayKind),
    ArrayLength,
    /// `newarray` and `anewarray`.
    NewArray {
        element: FieldType,
    },
    MultiNewArray {
        array: FieldType,
        dimensions: u8,
    },
    Arithmetic {
        op: ArithOp,
        kind: NumKind,
    },
    /// `lcmp`, `fcmpl`, `fcmpg`, `dcmpl`, `dcmpg`.
    Compare(NumKind),
    Convert {
        from: NumKind,
        to: ConvertTarget,
    },
    Branch {
        cond: Condition,
        target: usize,
    },
    Goto {
        target: usize,
    },
    /// `tableswitch` and `lookupswitch`.
    Switch {
        default: usize,
        targets: Vec<usize>,
    },
    Invoke {
        kind: InvokeKind,
        owner: String,
        name: String,
        descriptor: String,
    },
    InvokeDynamic {
        name: String,
        descriptor: String,
    },
    GetField {
        is_static: bool,
        descriptor: String,
    },
    PutField {
        is_static: bool,
        descriptor: String,
    },
    New {
        class: String,
    },
    CheckCast {
        class: String,
    },
    InstanceOf {
        class: String,
    },
    /// `monitorenter` and `monitorexit`.
    Monitor,
    Throw,
    /// `None` for a `void` return.
    Return(Option<ValueKind>),
    /// `jsr`, `ret` and anything else the analysis does not model.
    Unsupported {
        opcode: u8,
    },
}

impl Instruction {
    /// Instruction indices this instruction may transfer control to.
    pub fn targets(&self) -> Vec<usize> {
        match self {
            Instruction::Branch { target, .. } | Instruction::Goto { target } => vec![*target],
            Instruction::Switch { default, targets } => {
                let mut all = targets.clone();
                all.push(*default);
                all
            }
            _ => Vec::new(),
        }
    }
}
