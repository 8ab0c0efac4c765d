//! Conditional branches, joins and loops.

use super::{Flow, MethodFrame, Result};
use crate::analysis::context::AnalysisContext;
use crate::analysis::lattice::DomainValue;
use crate::analysis::state::{ExecutionState, Relation};
use crate::analysis::variable::VarId;
use crate::ir::{Cmp, Condition};
use log::{trace, warn};

impl MethodFrame<'_> {
    /// Conditional branch at `pc`.
    pub(super) fn branch(
        &self,
        ctx: &mut AnalysisContext<'_>,
        pc: usize,
        cond: Condition,
        target: usize,
        end: usize,
        state: &mut ExecutionState,
    ) -> Result<Flow> {
        if target <= pc {
            self.backward_branch(ctx, pc, cond, target, state)?;
            return Ok(Flow::Next);
        }

        let operands = state.pop_n(cond.arity())?;
        let mut fallthrough = state.fork();
        assume_condition(state, cond, &operands, true);
        assume_condition(&mut fallthrough, cond, &operands, false);

        self.interpret(ctx, pc + 1, (target - 1).min(end), &mut fallthrough)?;

        match fallthrough.pending_jump() {
            Some(join) if join > pc => {
                // The fall-through arm jumps over the taken arm: if/else.
                trace!("{}: if/else at {pc}, taken arm {target}..{join}", self.method.name);
                let mut taken = state.fork();
                if join > target {
                    self.interpret(ctx, target, (join - 1).min(end), &mut taken)?;
                }
                if let Some(back) = taken.pending_jump().filter(|&back| back <= pc) {
                    self.loop_fixpoint(ctx, back, end, &mut taken)?;
                }
                // the taken arm carries on from where it stopped
                *state = taken;
            }
            Some(back) => self.loop_fixpoint(ctx, back, end, &mut fallthrough)?,
            None => {}
        }

        state.merge(&fallthrough);
        Ok(Flow::Resume((state.pc() + 1).max(target)))
    }

    /// Re-interprets `back..` up to the instruction before the back-edge at
    /// `state.pc()` until the back-edge state stops changing.
    fn loop_fixpoint(
        &self,
        ctx: &mut AnalysisContext<'_>,
        back: usize,
        end: usize,
        state: &mut ExecutionState,
    ) -> Result<()> {
        let last = state.pc().saturating_sub(1).min(end);
        trace!("{}: loop {back}..={last}", self.method.name);
        for _ in 0..ctx.config.max_loop_iterations {
            ctx.stats.loop_iterations += 1;
            let mut body = state.fork();
            self.interpret(ctx, back, last, &mut body)?;
            if !state.merge(&body) {
                return Ok(());
            }
        }
        warn!(
            "loop at {}..={} in {} did not stabilise after {} iterations",
            back,
            last,
            self.qualified_name(),
            ctx.config.max_loop_iterations
        );
        Ok(())
    }

    /// Conditional branch back to `target`: a bottom-tested loop. The body
    /// runs under the taken-side assumption until the state at the branch
    /// stabilises, then the loop exits under the not-taken assumption.
    fn backward_branch(
        &self,
        ctx: &mut AnalysisContext<'_>,
        pc: usize,
        cond: Condition,
        target: usize,
        state: &mut ExecutionState,
    ) -> Result<()> {
        let arity = cond.arity();
        let mut stable = false;
        for _ in 0..ctx.config.max_loop_iterations {
            ctx.stats.loop_iterations += 1;
            let mut body = state.fork();
            let operands = body.pop_n(arity)?;
            assume_condition(&mut body, cond, &operands, true);
            if target < pc {
                self.interpret(ctx, target, pc - 1, &mut body)?;
            }
            if !state.merge(&body) {
                stable = true;
                break;
            }
        }
        if !stable {
            warn!(
                "loop at {}..={} in {} did not stabilise after {} iterations",
                target,
                pc,
                self.qualified_name(),
                ctx.config.max_loop_iterations
            );
        }
        state.set_pc(pc);
        let operands = state.pop_n(arity)?;
        assume_condition(state, cond, &operands, false);
        Ok(())
    }
}

/// Refines the popped `operands` of a branch on `cond` for the side where
/// the condition `holds` (or does not).
pub(super) fn assume_condition(
    state: &mut ExecutionState,
    cond: Condition,
    operands: &[VarId],
    holds: bool,
) {
    match (cond, operands) {
        (Condition::Ints(cmp), &[lhs, rhs]) => {
            let relation = if holds {
                relation_of(cmp)
            } else {
                relation_of(negate(cmp))
            };
            if let Some(relation) = relation {
                state.assume(lhs, relation, rhs);
            }
        }
        (Condition::Zero(cmp), &[value]) => {
            let cmp = if holds { cmp } else { negate(cmp) };
            let Some(current) = state.get(value).map(|v| v.domain) else {
                return;
            };
            if let Some(domain) = sign_given(cmp, current) {
                state.assume_domain(value, domain);
            }
        }
        _ => {}
    }
}

fn negate(cmp: Cmp) -> Cmp {
    match cmp {
        Cmp::Eq => Cmp::Ne,
        Cmp::Ne => Cmp::Eq,
        Cmp::Lt => Cmp::Ge,
        Cmp::Ge => Cmp::Lt,
        Cmp::Gt => Cmp::Le,
        Cmp::Le => Cmp::Gt,
    }
}

fn relation_of(cmp: Cmp) -> Option<Relation> {
    match cmp {
        Cmp::Eq => Some(Relation::Eq),
        Cmp::Ne => None,
        Cmp::Lt => Some(Relation::Lt),
        Cmp::Le => Some(Relation::Le),
        Cmp::Gt => Some(Relation::Gt),
        Cmp::Ge => Some(Relation::Ge),
    }
}

/// Sign of `x` once `x cmp 0` is known to hold.
fn sign_given(cmp: Cmp, current: DomainValue) -> Option<DomainValue> {
    use DomainValue::*;
    match cmp {
        Cmp::Eq => Some(current.meet(NonNegative)),
        Cmp::Ge => Some(current.meet(NonNegative)),
        Cmp::Gt => Some(current.meet(StrictlyPositive)),
        Cmp::Le if current.is_non_negative() => Some(NonNegative),
        Cmp::Le | Cmp::Lt => Some(Top),
        Cmp::Ne => None,
    }
}
