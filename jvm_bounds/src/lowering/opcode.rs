//! Single-instruction bytecode decoder.
//!
//! Branch targets come out as absolute byte offsets; [`super::lower_method`]
//! maps them to instruction indices once every instruction boundary is known.

use super::LowerResult;
use crate::error::LoweringError;
use crate::ir::{
    ArithOp, ArrayKind, Cmp, Condition, Constant, ConvertTarget, Instruction, InvokeKind, NumKind,
    StackOp, ValueKind,
};
use jvm_bounds_classfile::{ClassFileError, Constant as PoolConstant, ConstantPool, FieldType, Reader};

const VALUE_KINDS: [ValueKind; 5] = [
    ValueKind::Int,
    ValueKind::Long,
    ValueKind::Float,
    ValueKind::Double,
    ValueKind::Reference,
];

const NUM_KINDS: [NumKind; 4] = [NumKind::Int, NumKind::Long, NumKind::Float, NumKind::Double];

const ARRAY_KINDS: [ArrayKind; 8] = [
    ArrayKind::Int,
    ArrayKind::Long,
    ArrayKind::Float,
    ArrayKind::Double,
    ArrayKind::Reference,
    ArrayKind::Byte,
    ArrayKind::Char,
    ArrayKind::Short,
];

const CMPS: [Cmp; 6] = [Cmp::Eq, Cmp::Ne, Cmp::Lt, Cmp::Ge, Cmp::Gt, Cmp::Le];

/// Cursor over one method's code with the constant pool at hand.
pub(super) struct Decoder<'a> {
    reader: Reader<'a>,
    pool: &'a ConstantPool,
    method: &'a str,
    /// Offset of the instruction being decoded.
    start: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(code: &'a [u8], pool: &'a ConstantPool, method: &'a str) -> Self {
        Self {
            reader: Reader::new(code),
            pool,
            method,
            start: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.reader.is_empty()
    }

    pub fn position(&self) -> usize {
        self.reader.position()
    }

    fn truncated(&self) -> LoweringError {
        LoweringError::Truncated { offset: self.start }
    }

    fn u8(&mut self) -> LowerResult<u8> {
        self.reader.u8().map_err(|_| self.truncated())
    }

    fn i8(&mut self) -> LowerResult<i8> {
        self.reader.i8().map_err(|_| self.truncated())
    }

    fn u16(&mut self) -> LowerResult<u16> {
        self.reader.u16().map_err(|_| self.truncated())
    }

    fn i16(&mut self) -> LowerResult<i16> {
        self.reader.i16().map_err(|_| self.truncated())
    }

    fn i32(&mut self) -> LowerResult<i32> {
        self.reader.i32().map_err(|_| self.truncated())
    }

    fn in_pool<T>(&self, result: Result<T, ClassFileError>) -> LowerResult<T> {
        result.map_err(|source| LoweringError::ClassFile {
            method: self.method.to_string(),
            source,
        })
    }

    /// Absolute target of a branch `relative` bytes from the current
    /// instruction.
    fn target(&self, relative: i64) -> LowerResult<usize> {
        let absolute = self.start as i64 + relative;
        usize::try_from(absolute).map_err(|_| LoweringError::InvalidBranchTarget {
            offset: self.start,
            target: absolute,
        })
    }

    fn branch16(&mut self) -> LowerResult<usize> {
        let relative = self.i16()?;
        self.target(i64::from(relative))
    }

    fn branch32(&mut self) -> LowerResult<usize> {
        let relative = self.i32()?;
        self.target(i64::from(relative))
    }

    fn class_name(&self, index: u16) -> LowerResult<String> {
        self.in_pool(self.pool.class_name(index)).map(str::to_string)
    }

    fn ldc(&self, index: u16) -> LowerResult<Constant> {
        let constant = match self.in_pool(self.pool.get(index))? {
            PoolConstant::Integer(v) => Constant::Int(*v),
            PoolConstant::Float(v) => Constant::Float(*v),
            PoolConstant::Long(v) => Constant::Long(*v),
            PoolConstant::Double(v) => Constant::Double(*v),
            PoolConstant::String { string_index } => {
                Constant::String(self.in_pool(self.pool.utf8(*string_index))?.to_string())
            }
            PoolConstant::Class { name_index } => {
                Constant::Class(self.in_pool(self.pool.utf8(*name_index))?.to_string())
            }
            _ => Constant::Opaque,
        };
        Ok(constant)
    }

    fn invoke(&mut self, kind: InvokeKind) -> LowerResult<Instruction> {
        let index = self.u16()?;
        if kind == InvokeKind::Interface {
            self.u8()?; // count
            self.u8()?; // zero
        }
        let member = self.in_pool(self.pool.member_ref(index))?;
        Ok(Instruction::Invoke {
            kind,
            owner: member.owner.to_string(),
            name: member.name.to_string(),
            descriptor: member.descriptor.to_string(),
        })
    }

    fn field(&mut self, is_static: bool, read: bool) -> LowerResult<Instruction> {
        let index = self.u16()?;
        let descriptor = self.in_pool(self.pool.member_ref(index))?.descriptor.to_string();
        Ok(if read {
            Instruction::GetField {
                is_static,
                descriptor,
            }
        } else {
            Instruction::PutField {
                is_static,
                descriptor,
            }
        })
    }

    fn switch(&mut self, opcode: u8) -> LowerResult<Instruction> {
        self.reader.align4().map_err(|_| self.truncated())?;
        let default = self.branch32()?;
        let mut targets = Vec::new();
        if opcode == 0xaa {
            let low = self.i32()?;
            let high = self.i32()?;
            let count = i64::from(high) - i64::from(low) + 1;
            for _ in 0..count.max(0) {
                targets.push(self.branch32()?);
            }
        } else {
            let pairs = self.i32()?;
            for _ in 0..pairs.max(0) {
                self.i32()?; // match
                targets.push(self.branch32()?);
            }
        }
        Ok(Instruction::Switch { default, targets })
    }

    fn wide(&mut self) -> LowerResult<Instruction> {
        let opcode = self.u8()?;
        let slot = self.u16()?;
        let instruction = match opcode {
            0x15..=0x19 => Instruction::Load {
                kind: VALUE_KINDS[usize::from(opcode - 0x15)],
                slot,
            },
            0x36..=0x3a => Instruction::Store {
                kind: VALUE_KINDS[usize::from(opcode - 0x36)],
                slot,
            },
            0x84 => Instruction::Iinc {
                slot,
                delta: self.i16()?,
            },
            0xa9 => Instruction::Unsupported { opcode },
            _ => {
                return Err(LoweringError::UnknownOpcode {
                    opcode,
                    offset: self.start,
                })
            }
        };
        Ok(instruction)
    }

    /// Decodes the instruction at the current position.
    pub fn decode_next(&mut self) -> LowerResult<Instruction> {
        self.start = self.reader.position();
        let opcode = self.u8()?;
        let instruction = match opcode {
            0x00 => Instruction::Nop,
            0x01 => Instruction::Const(Constant::Null),
            0x02..=0x08 => Instruction::Const(Constant::Int(i32::from(opcode) - 3)),
            0x09 | 0x0a => Instruction::Const(Constant::Long(i64::from(opcode - 0x09))),
            0x0b..=0x0d => Instruction::Const(Constant::Float(f32::from(opcode - 0x0b))),
            0x0e | 0x0f => Instruction::Const(Constant::Double(f64::from(opcode - 0x0e))),
            0x10 => Instruction::Const(Constant::Int(i32::from(self.i8()?))),
            0x11 => Instruction::Const(Constant::Int(i32::from(self.i16()?))),
            0x12 => {
                let index = u16::from(self.u8()?);
                Instruction::Const(self.ldc(index)?)
            }
            0x13 | 0x14 => {
                let index = self.u16()?;
                Instruction::Const(self.ldc(index)?)
            }
            0x15..=0x19 => Instruction::Load {
                kind: VALUE_KINDS[usize::from(opcode - 0x15)],
                slot: u16::from(self.u8()?),
            },
            0x1a..=0x2d => {
                let n = opcode - 0x1a;
                Instruction::Load {
                    kind: VALUE_KINDS[usize::from(n / 4)],
                    slot: u16::from(n % 4),
                }
            }
            0x2e..=0x35 => Instruction::ArrayLoad(ARRAY_KINDS[usize::from(opcode - 0x2e)]),
            0x36..=0x3a => Instruction::Store {
                kind: VALUE_KINDS[usize::from(opcode - 0x36)],
                slot: u16::from(self.u8()?),
            },
            0x3b..=0x4e => {
                let n = opcode - 0x3b;
                Instruction::Store {
                    kind: VALUE_KINDS[usize::from(n / 4)],
                    slot: u16::from(n % 4),
                }
            }
            0x4f..=0x56 => Instruction::ArrayStore(ARRAY_KINDS[usize::from(opcode - 0x4f)]),
            0x57 => Instruction::Stack(StackOp::Pop),
            0x58 => Instruction::Stack(StackOp::Pop2),
            0x59 => Instruction::Stack(StackOp::Dup),
            0x5a => Instruction::Stack(StackOp::DupX1),
            0x5b => Instruction::Stack(StackOp::DupX2),
            0x5c => Instruction::Stack(StackOp::Dup2),
            0x5d => Instruction::Stack(StackOp::Dup2X1),
            0x5e => Instruction::Stack(StackOp::Dup2X2),
            0x5f => Instruction::Stack(StackOp::Swap),
            0x60..=0x77 => {
                let n = opcode - 0x60;
                let op = [
                    ArithOp::Add,
                    ArithOp::Sub,
                    ArithOp::Mul,
                    ArithOp::Div,
                    ArithOp::Rem,
                    ArithOp::Neg,
                ][usize::from(n / 4)];
                Instruction::Arithmetic {
                    op,
                    kind: NUM_KINDS[usize::from(n % 4)],
                }
            }
            0x78..=0x83 => {
                // int and long forms alternate
                let n = opcode - 0x78;
                let op = [
                    ArithOp::Shl,
                    ArithOp::Shr,
                    ArithOp::Ushr,
                    ArithOp::And,
                    ArithOp::Or,
                    ArithOp::Xor,
                ][usize::from(n / 2)];
                let kind = if n % 2 == 0 { NumKind::Int } else { NumKind::Long };
                Instruction::Arithmetic { op, kind }
            }
            0x84 => Instruction::Iinc {
                slot: u16::from(self.u8()?),
                delta: i16::from(self.i8()?),
            },
            0x85..=0x93 => {
                use ConvertTarget as T;
                let (from, to) = match opcode {
                    0x85 => (NumKind::Int, T::Long),
                    0x86 => (NumKind::Int, T::Float),
                    0x87 => (NumKind::Int, T::Double),
                    0x88 => (NumKind::Long, T::Int),
                    0x89 => (NumKind::Long, T::Float),
                    0x8a => (NumKind::Long, T::Double),
                    0x8b => (NumKind::Float, T::Int),
                    0x8c => (NumKind::Float, T::Long),
                    0x8d => (NumKind::Float, T::Double),
                    0x8e => (NumKind::Double, T::Int),
                    0x8f => (NumKind::Double, T::Long),
                    0x90 => (NumKind::Double, T::Float),
                    0x91 => (NumKind::Int, T::Byte),
                    0x92 => (NumKind::Int, T::Char),
                    _ => (NumKind::Int, T::Short),
                };
                Instruction::Convert { from, to }
            }
            0x94 => Instruction::Compare(NumKind::Long),
            0x95 | 0x96 => Instruction::Compare(NumKind::Float),
            0x97 | 0x98 => Instruction::Compare(NumKind::Double),
            0x99..=0x9e => Instruction::Branch {
                cond: Condition::Zero(CMPS[usize::from(opcode - 0x99)]),
                target: self.branch16()?,
            },
            0x9f..=0xa4 => Instruction::Branch {
                cond: Condition::Ints(CMPS[usize::from(opcode - 0x9f)]),
                target: self.branch16()?,
            },
            0xa5 | 0xa6 => Instruction::Branch {
                cond: if opcode == 0xa5 {
                    Condition::RefsEqual
                } else {
                    Condition::RefsNotEqual
                },
                target: self.branch16()?,
            },
            0xa7 => Instruction::Goto {
                target: self.branch16()?,
            },
            0xa8 => {
                self.i16()?;
                Instruction::Unsupported { opcode }
            }
            0xa9 => {
                self.u8()?;
                Instruction::Unsupported { opcode }
            }
            0xaa | 0xab => self.switch(opcode)?,
            0xac..=0xb0 => Instruction::Return(Some(VALUE_KINDS[usize::from(opcode - 0xac)])),
            0xb1 => Instruction::Return(None),
            0xb2 => self.field(true, true)?,
            0xb3 => self.field(true, false)?,
            0xb4 => self.field(false, true)?,
            0xb5 => self.field(false, false)?,
            0xb6 => self.invoke(InvokeKind::Virtual)?,
            0xb7 => self.invoke(InvokeKind::Special)?,
            0xb8 => self.invoke(InvokeKind::Static)?,
            0xb9 => self.invoke(InvokeKind::Interface)?,
            0xba => {
                let index = self.u16()?;
                self.u16()?;
                let (name, descriptor) = self.in_pool(self.pool.invoke_dynamic(index))?;
                Instruction::InvokeDynamic {
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                }
            }
            0xbb => {
                let index = self.u16()?;
                Instruction::New {
                    class: self.class_name(index)?,
                }
            }
            0xbc => {
                let code = self.u8()?;
                let element = match code {
                    4 => FieldType::Boolean,
                    5 => FieldType::Char,
                    6 => FieldType::Float,
                    7 => FieldType::Double,
                    8 => FieldType::Byte,
                    9 => FieldType::Short,
                    10 => FieldType::Int,
                    11 => FieldType::Long,
                    _ => {
                        return Err(LoweringError::InvalidArrayType {
                            offset: self.start,
                            code,
                        })
                    }
                };
                Instruction::NewArray { element }
            }
            0xbd => {
                let index = self.u16()?;
                let name = self.class_name(index)?;
                let element = self.in_pool(FieldType::from_class_name(&name))?;
                Instruction::NewArray { element }
            }
            0xbe => Instruction::ArrayLength,
            0xbf => Instruction::Throw,
            0xc0 => {
                let index = self.u16()?;
                Instruction::CheckCast {
                    class: self.class_name(index)?,
                }
            }
            0xc1 => {
                let index = self.u16()?;
                Instruction::InstanceOf {
                    class: self.class_name(index)?,
                }
            }
            0xc2 | 0xc3 => Instruction::Monitor,
            0xc4 => self.wide()?,
            0xc5 => {
                let index = self.u16()?;
                let dimensions = self.u8()?;
                let name = self.class_name(index)?;
                let array = self.in_pool(FieldType::from_class_name(&name))?;
                Instruction::MultiNewArray { array, dimensions }
            }
            0xc6 | 0xc7 => Instruction::Branch {
                cond: if opcode == 0xc6 {
                    Condition::Null
                } else {
                    Condition::NonNull
                },
                target: self.branch16()?,
            },
            0xc8 => Instruction::Goto {
                target: self.branch32()?,
            },
            0xc9 => {
                self.i32()?;
                Instruction::Unsupported { opcode }
            }
            _ => {
                return Err(LoweringError::UnknownOpcode {
                    opcode,
                    offset: self.start,
                })
            }
        };
        Ok(instruction)
    }
}
