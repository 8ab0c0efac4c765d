//! Abstract interpreter for one method body.
//!
//! The interpreter walks an instruction range in program order, updating an
//! [`ExecutionState`]. Structured control flow is recovered on the fly:
//!
//! - a forward conditional branch forks the state, interprets the
//!   fall-through arm first, then the taken arm when the fall-through arm
//!   ends in a forward `goto`, and joins the two
//! - a `goto` only records its target; the enclosing branch decides whether
//!   it closes an `else` arm or a loop
//! - a backward target (from a `goto` or a conditional branch) is a loop, and
//!   its body is re-interpreted until the state at the back-edge stops
//!   changing
//!
//! Calls into analysed classes recurse into [`analyze_method`].

mod branch;
mod call;


pub(crate) use call::analyze_and_stabilise;
#[cfg(test)]
pub(crate) use call::analyze_method;

use super::context::AnalysisContext;
use super::lattice::DomainValue;
use super::report::Report;
use super::state::ExecutionState;
use super::variable::{VarId, VarKind, Variable};
use crate::error::AnalysisError;
use crate::ir::{ClassIr, Constant, Instruction, MethodIr, StackOp};
use jvm_bounds_classfile::FieldType;
use log::{debug, trace};

pub(crate) type Result<T> = std::result::Result<T, AnalysisError>;

/// What the interpreter does after one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Next,
    /// Continue at the given instruction.
    Resume(usize),
    /// The path ended in a `return`.
    Return,
}

/// The method currently being interpreted, with its owning class.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MethodFrame<'a> {
    pub class: &'a ClassIr,
    pub method: &'a MethodIr,
}

impl<'a> MethodFrame<'a> {
    pub fn new(class: &'a ClassIr, method: &'a MethodIr) -> Self {
        Self { class, method }
    }

    fn qualified_name(&self) -> String {
        format!("{}.{}{}", self.class.name, self.method.name, self.method.descriptor)
    }

    /// Interprets instructions `start..=end` on `state`, stopping early at a
    /// `return`. On exit `state.pc()` is the last instruction executed.
    pub fn interpret(
        &self,
        ctx: &mut AnalysisContext<'_>,
        start: usize,
        end: usize,
        state: &mut ExecutionState,
    ) -> Result<()> {
        let len = self.method.instructions.len();
        let mut pc = start;
        while pc <= end && pc < len {
            state.set_pc(pc);
            match self.step(ctx, pc, end, state)? {
                Flow::Next => pc += 1,
                Flow::Resume(next) => pc = next,
                Flow::Return => break,
            }
        }
        Ok(())
    }

    fn step(
        &self,
        ctx: &mut AnalysisContext<'_>,
        pc: usize,
        end: usize,
        state: &mut ExecutionState,
    ) -> Result<Flow> {
        let instruction = &self.method.instructions[pc];
        trace!("{}: {pc}: {instruction:?}", self.method.name);
        match instruction {
            Instruction::Nop | Instruction::CheckCast { .. } => {}
            Instruction::Const(constant) => {
                state.push(constant_value(constant, pc));
            }
            Instruction::Load { slot, .. } => state.load(*slot),
            Instruction::Store { slot, .. } => state.store(*slot)?,
            Instruction::Iinc { slot, delta } => state.iinc(*slot, i32::from(*delta)),
            Instruction::Stack(op) => stack_op(*op, state)?,
            Instruction::ArrayLoad(kind) => {
                let index = state.pop()?;
                let array = state.pop()?;
                self.check_access(ctx, pc, state, array, index);
                let ty = kind.field_type().or_else(|| {
                    state
                        .get(array)
                        .and_then(|a| a.ty.as_ref())
                        .and_then(FieldType::element)
                        .cloned()
                });
                state.push(Variable::top(ty, pc));
            }
            Instruction::ArrayStore(_) => {
                state.pop()?;
                let index = state.pop()?;
                let array = state.pop()?;
                self.check_access(ctx, pc, state, array, index);
            }
            Instruction::ArrayLength => {
                let array = state.pop()?;
                let mut length =
                    Variable::new(Some(FieldType::Int), VarKind::Local, DomainValue::NonNegative, pc);
                length.at_most.insert(array);
                state.push(length);
            }
            Instruction::NewArray { element } => {
                state.pop()?;
                let ty = FieldType::Array(Box::new(element.clone()));
                state.push(Variable::top(Some(ty), pc));
            }
            Instruction::MultiNewArray { array, dimensions } => {
                state.pop_n(usize::from(*dimensions))?;
                state.push(Variable::top(Some(array.clone()), pc));
            }
            Instruction::Arithmetic { op, kind } => {
                let result = if op.is_unary() {
                    state.pop()?;
                    Variable::top(Some(kind.field_type()), pc)
                } else {
                    let rhs = state.pop()?;
                    let lhs = state.pop()?;
                    Variable::binary(*op, &value(state, lhs), &value(state, rhs), *kind, pc)
                };
                state.push(result);
            }
            Instruction::Compare(_) => {
                state.pop_n(2)?;
                state.push(Variable::top(Some(FieldType::Int), pc));
            }
            Instruction::Convert { from, to } => {
                let operand = state.pop()?;
                let converted = value(state, operand).converted(*from, *to, pc);
                state.push(converted);
            }
            Instruction::Branch { cond, target } => {
                return self.branch(ctx, pc, *cond, *target, end, state);
            }
            Instruction::Goto { target } => state.set_pending_jump(*target),
            Instruction::Switch { .. } => {
                state.pop()?;
            }
            Instruction::Invoke {
                kind,
                owner,
                name,
                descriptor,
            } => self.invoke(ctx, pc, state, *kind, owner, name, descriptor)?,
            Instruction::InvokeDynamic { descriptor, .. } => {
                self.opaque_call(ctx, pc, state, descriptor, false)?;
            }
            Instruction::GetField {
                is_static,
                descriptor,
            } => {
                if !is_static {
                    state.pop()?;
                }
                let kind = if *is_static {
                    VarKind::Static
                } else {
                    VarKind::Field
                };
                let ty = FieldType::parse(descriptor)?;
                state.push(Variable::new(Some(ty), kind, DomainValue::Top, pc));
            }
            Instruction::PutField { is_static, .. } => {
                state.pop()?;
                if !is_static {
                    state.pop()?;
                }
            }
            Instruction::New { class } => {
                let ty = FieldType::Object(class.clone());
                state.push(Variable::top(Some(ty), pc));
            }
            Instruction::InstanceOf { .. } => {
                state.pop()?;
                state.push(Variable::new(
                    Some(FieldType::Int),
                    VarKind::Local,
                    DomainValue::NonNegative,
                    pc,
                ));
            }
            Instruction::Monitor => {
                state.pop()?;
            }
            Instruction::Throw => {
                return Err(AnalysisError::Throw {
                    method: self.qualified_name(),
                    pc,
                });
            }
            Instruction::Return(kind) => {
                if kind.is_some() {
                    let returned = state.pop()?;
                    state.record_return(returned);
                }
                return Ok(Flow::Return);
            }
            Instruction::Unsupported { opcode } => {
                return Err(AnalysisError::UnsupportedInstruction {
                    method: self.qualified_name(),
                    pc,
                    opcode: *opcode,
                });
            }
        }
        Ok(Flow::Next)
    }

    /// Reports the access `array[index]` unless the index is proven in
    /// bounds, then treats it as in bounds for the rest of this path.
    fn check_access(
        &self,
        ctx: &mut AnalysisContext<'_>,
        pc: usize,
        state: &mut ExecutionState,
        array: VarId,
        index: VarId,
    ) {
        if state.get(index).is_some_and(|v| v.is_safe(array)) {
            return;
        }
        let report = Report {
            file: self.class.source_name().to_string(),
            method: self.method.name.clone(),
            line: self.method.line_at(pc),
        };
        if ctx.reports.push(report) {
            debug!(
                "possible out-of-bounds access at instruction {pc} of {}",
                self.qualified_name()
            );
        }
        if let Some(var) = state.get_mut(index) {
            var.mark_safe(array);
        }
    }
}

/// Snapshot of a variable, or an unknown value for a dangling id.
fn value(state: &ExecutionState, id: VarId) -> Variable {
    state
        .get(id)
        .cloned()
        .unwrap_or_else(|| Variable::top(None, state.pc()))
}

fn constant_value(constant: &Constant, pc: usize) -> Variable {
    let (ty, domain) = match constant {
        Constant::Int(v) => (Some(FieldType::Int), DomainValue::of_int(i64::from(*v))),
        Constant::Long(v) => (Some(FieldType::Long), DomainValue::of_int(*v)),
        Constant::Float(v) => (Some(FieldType::Float), DomainValue::of_float(f64::from(*v))),
        Constant::Double(v) => (Some(FieldType::Double), DomainValue::of_float(*v)),
        Constant::String(_) => (
            Some(FieldType::Object("java/lang/String".to_string())),
            DomainValue::Top,
        ),
        Constant::Class(_) => (
            Some(FieldType::Object("java/lang/Class".to_string())),
            DomainValue::Top,
        ),
        Constant::Null | Constant::Opaque => (None, DomainValue::Top),
    };
    Variable::new(ty, VarKind::Const, domain, pc)
}

/// JVM operand-stack shuffles. Values keep their identity when duplicated.
fn stack_op(op: StackOp, state: &mut ExecutionState) -> Result<()> {
    match op {
        StackOp::Pop => {
            state.pop()?;
        }
        StackOp::Pop2 => {
            if state.category_at(0)? == 2 {
                state.pop()?;
            } else {
                state.pop_n(2)?;
            }
        }
        StackOp::Dup => {
            let top = state.peek(0)?;
            state.push_id(top);
        }
        StackOp::DupX1 => {
            let v1 = state.pop()?;
            let v2 = state.pop()?;
            push_all(state, &[v1, v2, v1]);
        }
        StackOp::DupX2 => {
            let v1 = state.pop()?;
            if state.category_at(0)? == 2 {
                let v2 = state.pop()?;
                push_all(state, &[v1, v2, v1]);
            } else {
                let v2 = state.pop()?;
                let v3 = state.pop()?;
                push_all(state, &[v1, v3, v2, v1]);
            }
        }
        StackOp::Dup2 => {
            if state.category_at(0)? == 2 {
                let v1 = state.peek(0)?;
                state.push_id(v1);
            } else {
                let v1 = state.peek(0)?;
                let v2 = state.peek(1)?;
                push_all(state, &[v2, v1]);
            }
        }
        StackOp::Dup2X1 => {
            if state.category_at(0)? == 2 {
                let v1 = state.pop()?;
                let v2 = state.pop()?;
                push_all(state, &[v1, v2, v1]);
            } else {
                let v1 = state.pop()?;
                let v2 = state.pop()?;
                let v3 = state.pop()?;
                push_all(state, &[v2, v1, v3, v2, v1]);
            }
        }
        StackOp::Dup2X2 => {
            let v1 = state.pop()?;
            if state.get(v1).map_or(1, Variable::category) == 2 {
                let v2 = state.pop()?;
                if state.get(v2).map_or(1, Variable::category) == 2 {
                    push_all(state, &[v1, v2, v1]);
                } else {
                    let v3 = state.pop()?;
                    push_all(state, &[v1, v3, v2, v1]);
                }
            } else {
                let v2 = state.pop()?;
                let v3 = state.pop()?;
                if state.get(v3).map_or(1, Variable::category) == 2 {
                    push_all(state, &[v2, v1, v3, v2, v1]);
                } else {
                    let v4 = state.pop()?;
                    push_all(state, &[v2, v1, v4, v3, v2, v1]);
                }
            }
        }
        StackOp::Swap => {
            let v1 = state.pop()?;
            let v2 = state.pop()?;
            push_all(state, &[v1, v2]);
        }
    }
    Ok(())
}

fn push_all(state: &mut ExecutionState, ids: &[VarId]) {
    for &id in ids {
        state.push_id(id);
    }
}
