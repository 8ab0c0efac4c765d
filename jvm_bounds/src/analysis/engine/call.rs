//! Method calls and whole-method analysis.
//!
//! Calls into analysed classes are resolved along the superclass chain and
//! analysed on demand, with results memoised per [`MethodKey`]. A call to a
//! method whose analysis is still in progress gets a provisional unknown
//! result; once the outer analysis finishes, the method is re-analysed
//! against its own previous result until that result stops changing.

use super::{MethodFrame, Result};
use crate::analysis::context::{AnalysisContext, MethodKey};
use crate::analysis::lattice::DomainValue;
use crate::analysis::state::ExecutionState;
use crate::analysis::variable::{VarKind, Variable};
use crate::error::AnalysisError;
use crate::ir::{ClassIr, InvokeKind, MethodIr};
use jvm_bounds_classfile::{FieldType, MethodDescriptor};
use log::{debug, trace, warn};

impl MethodFrame<'_> {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn invoke(
        &self,
        ctx: &mut AnalysisContext<'_>,
        pc: usize,
        state: &mut ExecutionState,
        kind: InvokeKind,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<()> {
        let has_receiver = kind != InvokeKind::Static;
        if !ctx.is_analyzed(owner) {
            return self.opaque_call(ctx, pc, state, descriptor, has_receiver);
        }
        let Some((class, method)) = resolve(ctx, owner, name, descriptor)? else {
            return self.opaque_call(ctx, pc, state, descriptor, has_receiver);
        };

        let key = MethodKey::new(&class.name, &method.name, &method.descriptor);
        let result = match ctx.memo.get(&key) {
            Some(result) => result.clone(),
            None => analyze_and_stabilise(ctx, class, method)?,
        };

        let parsed = MethodDescriptor::parse(descriptor)?;
        state.pop_n(parsed.parameters.len() + usize::from(has_receiver))?;
        if !parsed.is_void() {
            let mut returned = result;
            returned.clear_relations();
            returned.kind = VarKind::Local;
            returned.slot = None;
            returned.defined_at = pc;
            state.push(returned);
        }
        Ok(())
    }

    /// A call whose target is not analysed: arguments are consumed and the
    /// result, if any, is unknown.
    pub(super) fn opaque_call(
        &self,
        ctx: &mut AnalysisContext<'_>,
        pc: usize,
        state: &mut ExecutionState,
        descriptor: &str,
        has_receiver: bool,
    ) -> Result<()> {
        ctx.stats.opaque_calls += 1;
        let parsed = MethodDescriptor::parse(descriptor)?;
        state.pop_n(parsed.parameters.len() + usize::from(has_receiver))?;
        if let Some(ty) = parsed.return_type {
            state.push(Variable::top(Some(ty), pc));
        }
        Ok(())
    }

    /// Entry state: `this` in slot 0 for instance methods, then one unknown
    /// value per parameter in its JVM slot.
    fn initial_state(&self, descriptor: &MethodDescriptor) -> ExecutionState {
        let mut state = ExecutionState::new();
        let mut slot: u16 = 0;
        if !self.method.is_static() {
            let this = Variable::top(Some(FieldType::Object(self.class.name.clone())), 0);
            state.define_local(0, this);
            slot = 1;
        }
        for parameter in &descriptor.parameters {
            let width = if parameter.is_category2() { 2 } else { 1 };
            state.define_local(slot, Variable::top(Some(parameter.clone()), 0));
            slot = slot.saturating_add(width);
        }
        state
    }
}

/// Walks the superclass chain from `owner` to the first concrete method
/// named `name` with `descriptor`.
///
/// Returns `None` when the chain leaves the analysed classes, in which case
/// the call is treated as opaque.
fn resolve<'r>(
    ctx: &AnalysisContext<'r>,
    owner: &str,
    name: &str,
    descriptor: &str,
) -> Result<Option<(&'r ClassIr, &'r MethodIr)>> {
    let repository = ctx.repository;
    let mut next = Some(owner);
    while let Some(class_name) = next {
        if !ctx.is_analyzed(class_name) {
            debug!("{owner}.{name}{descriptor} resolves outside the analysed classes via {class_name}");
            return Ok(None);
        }
        let Some(class) = repository.lookup(class_name) else {
            warn!("class {class_name} is not loaded; treating call to {owner}.{name}{descriptor} as opaque");
            return Ok(None);
        };
        if let Some(method) = class.find_method(name, descriptor) {
            if !method.is_abstract() {
                return Ok(Some((class, method)));
            }
        }
        next = class.super_name.as_deref();
    }
    Err(AnalysisError::MethodNotFound {
        owner: owner.to_string(),
        name: name.to_string(),
        descriptor: descriptor.to_string(),
    })
}

/// Analyses one method body and memoises its abstract return value.
///
/// A method already in progress is recursive: the call gets an unknown
/// result that is not memoised, and the method is marked for re-analysis.
pub(crate) fn analyze_method<'r>(
    ctx: &mut AnalysisContext<'r>,
    class: &'r ClassIr,
    method: &'r MethodIr,
) -> Result<Variable> {
    let key = MethodKey::new(&class.name, &method.name, &method.descriptor);
    let descriptor = MethodDescriptor::parse(&method.descriptor)?;
    let unknown = Variable::top(descriptor.return_type.clone(), 0);

    if ctx.in_progress.contains(&key) {
        trace!("recursive call to {key}");
        ctx.recursive.insert(key);
        return Ok(unknown);
    }
    if method.is_native() || method.is_abstract() || method.instructions.is_empty() {
        ctx.memo.insert(key, unknown.clone());
        return Ok(unknown);
    }

    debug!("analyzing {key}");
    ctx.stats.methods_analyzed += 1;
    ctx.in_progress.insert(key.clone());
    let frame = MethodFrame::new(class, method);
    let mut state = frame.initial_state(&descriptor);
    let last = method.instructions.len() - 1;
    let outcome = frame.interpret(ctx, 0, last, &mut state);
    ctx.in_progress.remove(&key);
    outcome?;

    let mut result = state.return_value().cloned().unwrap_or(unknown);
    result.clear_relations();
    ctx.memo.insert(key, result.clone());
    Ok(result)
}

/// [`analyze_method`], followed by re-analysis to a fixpoint if the method
/// turned out to call itself.
pub(crate) fn analyze_and_stabilise<'r>(
    ctx: &mut AnalysisContext<'r>,
    class: &'r ClassIr,
    method: &'r MethodIr,
) -> Result<Variable> {
    let mut result = analyze_method(ctx, class, method)?;
    let key = MethodKey::new(&class.name, &method.name, &method.descriptor);
    if ctx.in_progress.contains(&key) || !ctx.recursive.remove(&key) {
        return Ok(result);
    }

    let cap = ctx.config.max_recursion_iterations;
    for _ in 0..cap {
        ctx.stats.recursion_iterations += 1;
        let next = analyze_method(ctx, class, method)?;
        ctx.recursive.remove(&key);
        let changed = result.domain.merge(next.domain);
        ctx.memo.insert(key.clone(), result.clone());
        if !changed {
            debug!("{key} stabilised with return {}", result.domain);
            return Ok(result);
        }
    }
    warn!("recursive method {key} did not stabilise after {cap} iterations");
    if result.domain != DomainValue::Top {
        result.domain = DomainValue::Top;
        ctx.memo.insert(key, result.clone());
    }
    Ok(result)
}
