//! Abstract machine state for one path through a method.
//!
//! `ExecutionState` owns an arena of [`Variable`]s keyed by [`VarId`]. The
//! operand stack and the local slots hold ids into that arena, so a value
//! loaded from a local and the local itself share one id, and a refinement
//! applied to the stack copy is visible through the local.
//!
//! States are forked at conditional branches and joined with [`merge`]
//! at control-flow join points and loop heads.
//!
//! [`merge`]: ExecutionState::merge

use super::lattice::DomainValue;
use super::variable::{VarId, VarKind, Variable};
use crate::error::AnalysisError;
use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

type Result<T> = std::result::Result<T, AnalysisError>;

/// Relation assumed to hold between two values on one side of a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

/// Operand stack, locals and return value of one analysed path.
///
/// # Example
///
/// ```
/// use jvm_bounds::analysis::{DomainValue, ExecutionState, Variable};
///
/// let mut state = ExecutionState::new();
/// let mut zero = Variable::top(None, 0);
/// zero.domain = DomainValue::NonNegative;
/// state.push(zero);
/// state.store(1).unwrap();
///
/// let mut other = state.fork();
/// other.iinc(1, -1);
/// assert!(state.merge(&other));
/// assert_eq!(state.local(1).unwrap().domain, DomainValue::Top);
/// ```
#[derive(Debug)]
pub struct ExecutionState {
    vars: BTreeMap<VarId, Variable>,
    stack: Vec<VarId>,
    locals: Vec<VarId>,
    pc: usize,
    pending_jump: Option<usize>,
    return_value: Option<VarId>,
    /// Shared by every fork of one method analysis so ids never collide.
    next_id: Rc<Cell<u32>>,
}

impl Default for ExecutionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionState {
    pub fn new() -> Self {
        Self {
            vars: BTreeMap::new(),
            stack: Vec::new(),
            locals: Vec::new(),
            pc: 0,
            pending_jump: None,
            return_value: None,
            next_id: Rc::new(Cell::new(0)),
        }
    }

    /// An independent copy for one side of a branch. The copy starts without
    /// a pending jump.
    pub fn fork(&self) -> Self {
        Self {
            vars: self.vars.clone(),
            stack: self.stack.clone(),
            locals: self.locals.clone(),
            pc: self.pc,
            pending_jump: None,
            return_value: self.return_value,
            next_id: Rc::clone(&self.next_id),
        }
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn set_pc(&mut self, pc: usize) {
        self.pc = pc;
    }

    pub fn pending_jump(&self) -> Option<usize> {
        self.pending_jump
    }

    pub fn set_pending_jump(&mut self, target: usize) {
        self.pending_jump = Some(target);
    }

    fn fresh_id(&self) -> VarId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        VarId(id)
    }

    /// Adds `var` to the arena without placing it anywhere.
    pub fn alloc(&mut self, var: Variable) -> VarId {
        let id = self.fresh_id();
        self.vars.insert(id, var);
        id
    }

    pub fn get(&self, id: VarId) -> Option<&Variable> {
        self.vars.get(&id)
    }

    pub fn get_mut(&mut self, id: VarId) -> Option<&mut Variable> {
        self.vars.get_mut(&id)
    }

    fn slot_of(&self, id: VarId) -> Option<u16> {
        self.vars.get(&id).and_then(|v| v.slot)
    }

    // ---- operand stack ----

    pub fn push(&mut self, var: Variable) -> VarId {
        let id = self.alloc(var);
        self.stack.push(id);
        id
    }

    pub fn push_id(&mut self, id: VarId) {
        self.stack.push(id);
    }

    pub fn pop(&mut self) -> Result<VarId> {
        self.stack
            .pop()
            .ok_or(AnalysisError::StackUnderflow { pc: self.pc })
    }

    /// Pops `n` ids, returned deepest first.
    pub fn pop_n(&mut self, n: usize) -> Result<Vec<VarId>> {
        if self.stack.len() < n {
            return Err(AnalysisError::StackUnderflow { pc: self.pc });
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    /// Id `depth` entries below the top; `0` is the top.
    pub fn peek(&self, depth: usize) -> Result<VarId> {
        self.stack
            .len()
            .checked_sub(depth + 1)
            .map(|i| self.stack[i])
            .ok_or(AnalysisError::StackUnderflow { pc: self.pc })
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    pub fn stack(&self) -> impl Iterator<Item = &Variable> + '_ {
        self.stack.iter().filter_map(|id| self.vars.get(id))
    }

    /// Category of the value `depth` entries below the top.
    pub fn category_at(&self, depth: usize) -> Result<u8> {
        let id = self.peek(depth)?;
        Ok(self.vars.get(&id).map_or(1, Variable::category))
    }

    // ---- locals ----

    fn ensure_local(&mut self, slot: u16) {
        let needed = usize::from(slot) + 1;
        while self.locals.len() < needed {
            let placeholder = Variable::top(None, self.pc).with_slot(self.locals.len() as u16);
            let id = self.alloc(placeholder);
            self.locals.push(id);
        }
    }

    /// Places a new variable in `slot` without touching the stack.
    pub fn define_local(&mut self, slot: u16, var: Variable) -> VarId {
        self.ensure_local(slot);
        let id = self.alloc(var.with_slot(slot));
        self.locals[usize::from(slot)] = id;
        id
    }

    /// Pushes the variable held in `slot`.
    pub fn load(&mut self, slot: u16) {
        self.ensure_local(slot);
        let id = self.locals[usize::from(slot)];
        self.stack.push(id);
    }

    /// Pops the top value into `slot`.
    pub fn store(&mut self, slot: u16) -> Result<()> {
        let id = self.pop()?;
        self.ensure_local(slot);
        let defined_at = self.pc + 1;
        if let Some(var) = self.vars.get_mut(&id) {
            var.slot = Some(slot);
            var.kind = VarKind::Local;
            var.defined_at = defined_at;
        }
        self.locals[usize::from(slot)] = id;
        Ok(())
    }

    pub fn local(&self, slot: u16) -> Option<&Variable> {
        self.locals
            .get(usize::from(slot))
            .and_then(|id| self.vars.get(id))
    }

    pub fn local_id(&self, slot: u16) -> Option<VarId> {
        self.locals.get(usize::from(slot)).copied()
    }

    pub fn locals_len(&self) -> usize {
        self.locals.len()
    }

    /// `iinc`: the slot gets a fresh variable; copies already on the stack
    /// keep the old value.
    pub fn iinc(&mut self, slot: u16, delta: i32) {
        self.ensure_local(slot);
        let old = self.locals[usize::from(slot)];
        let next = match self.vars.get(&old) {
            Some(var) => var.incremented(delta, self.pc),
            None => Variable::top(None, self.pc),
        };
        let id = self.alloc(next.with_slot(slot));
        self.locals[usize::from(slot)] = id;
    }

    // ---- return value ----

    /// Records a returned value. A path that already returned keeps the join
    /// of both values, without relations.
    pub fn record_return(&mut self, id: VarId) {
        let joined = match (self.return_value(), self.vars.get(&id)) {
            (Some(previous), Some(returned)) if self.return_value != Some(id) => {
                let mut joined = returned.clone();
                joined.domain = previous.domain.join(returned.domain);
                joined.clear_relations();
                Some(joined)
            }
            _ => None,
        };
        self.return_value = match joined {
            Some(joined) => Some(self.alloc(joined)),
            None => Some(id),
        };
    }

    pub fn return_value(&self) -> Option<&Variable> {
        self.return_value.and_then(|id| self.vars.get(&id))
    }

    // ---- refinement ----

    /// Refines `lhs` and `rhs` under the assumption `lhs rel rhs`.
    ///
    /// Both sides read a snapshot of the other taken before either is
    /// updated.
    pub fn assume(&mut self, lhs: VarId, rel: Relation, rhs: VarId) {
        let (Some(a), Some(b)) = (self.vars.get(&lhs).cloned(), self.vars.get(&rhs).cloned()) else {
            return;
        };
        if let Some(var) = self.vars.get_mut(&lhs) {
            match rel {
                Relation::Lt => var.refine_lt(&b),
                Relation::Le => var.refine_le(&b),
                Relation::Gt => var.refine_gt(&b),
                Relation::Ge => var.refine_ge(&b),
                Relation::Eq => var.refine_eq(&b),
            }
        }
        if lhs == rhs {
            return;
        }
        if let Some(var) = self.vars.get_mut(&rhs) {
            match rel {
                Relation::Lt => var.refine_gt(&a),
                Relation::Le => var.refine_ge(&a),
                Relation::Gt => var.refine_lt(&a),
                Relation::Ge => var.refine_le(&a),
                Relation::Eq => var.refine_eq(&a),
            }
        }
    }

    /// Sets the sign of `id` as known on one side of a test against zero.
    pub fn assume_domain(&mut self, id: VarId, domain: DomainValue) {
        if let Some(var) = self.vars.get_mut(&id) {
            var.domain = domain;
        }
    }

    // ---- join ----

    /// Joins `other` into `self`, position by position over the stack, the
    /// locals and the return value. Returns whether anything in `self` became
    /// less precise.
    ///
    /// Stacks or locals of different length are joined over their common
    /// prefix. Afterwards every variable that is no longer reachable is
    /// dropped from the arena, and relation targets naming dropped
    /// variables are pruned.
    pub fn merge(&mut self, other: &ExecutionState) -> bool {
        self.pc = self.pc.max(other.pc);
        let mut changed = false;

        let pairs: Vec<(VarId, VarId)> = self
            .stack
            .iter()
            .copied()
            .zip(other.stack.iter().copied())
            .chain(self.locals.iter().copied().zip(other.locals.iter().copied()))
            .collect();
        for (mine, theirs) in pairs {
            changed |= self.merge_var(mine, other, theirs);
        }

        match (self.return_value, other.return_value) {
            (Some(mine), Some(theirs)) => changed |= self.merge_var(mine, other, theirs),
            (None, Some(theirs)) => {
                if let Some(var) = other.vars.get(&theirs) {
                    let mut var = var.clone();
                    var.clear_relations();
                    let id = self.alloc(var);
                    self.return_value = Some(id);
                    changed = true;
                }
            }
            _ => {}
        }

        self.collect_garbage();
        changed
    }

    fn merge_var(&mut self, mine: VarId, other: &ExecutionState, theirs: VarId) -> bool {
        let Some(incoming) = other.vars.get(&theirs) else {
            return false;
        };
        let Some(current) = self.vars.get(&mine) else {
            return false;
        };
        let strictly_below =
            self.common_targets(&current.strictly_below, other, &incoming.strictly_below);
        let at_most = self.common_targets(&current.at_most, other, &incoming.at_most);

        let Some(current) = self.vars.get_mut(&mine) else {
            return false;
        };
        let mut changed = current.domain.merge(incoming.domain);
        if strictly_below.len() != current.strictly_below.len() {
            current.strictly_below = strictly_below;
            changed = true;
        }
        if at_most.len() != current.at_most.len() {
            current.at_most = at_most;
            changed = true;
        }
        changed
    }

    /// Targets of `mine` that `theirs` also names, by id or by local slot.
    fn common_targets(
        &self,
        mine: &BTreeSet<VarId>,
        other: &ExecutionState,
        theirs: &BTreeSet<VarId>,
    ) -> BTreeSet<VarId> {
        mine.iter()
            .copied()
            .filter(|&target| {
                theirs.contains(&target) || {
                    let slot = self.slot_of(target);
                    slot.is_some() && theirs.iter().any(|&t| other.slot_of(t) == slot)
                }
            })
            .collect()
    }

    fn collect_garbage(&mut self) {
        let live: BTreeSet<VarId> = self
            .stack
            .iter()
            .chain(self.locals.iter())
            .chain(self.return_value.iter())
            .copied()
            .collect();
        self.vars.retain(|id, _| live.contains(id));
        for var in self.vars.values_mut() {
            var.strictly_below.retain(|t| live.contains(t));
            var.at_most.retain(|t| live.contains(t));
        }
    }
}
