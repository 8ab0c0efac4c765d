//! Abstract values and their relational facts.
//!
//! A [`Variable`] pairs a [`DomainValue`] with two relation sets naming other
//! variables by [`VarId`]:
//!
//! - `strictly_below`: this value is `<` each target
//! - `at_most`: this value is `<=` each target
//!
//! Array lengths are `NonNegative` variables with an `at_most` edge to their
//! array, and an index is proven in bounds when it is non-negative and
//! `strictly_below` the array itself. Comparison refinements move targets
//! between the two sets so that `i < a.length` yields `i strictly_below a`.
//!
//! Variables never know their own id; ids are assigned by the
//! [`ExecutionState`](super::ExecutionState) arena that owns them.

use super::lattice::DomainValue;
use crate::ir::{ArithOp, ConvertTarget, NumKind};
use jvm_bounds_classfile::FieldType;
use std::collections::BTreeSet;
use std::fmt;

/// Identity of a variable within one method analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub(crate) u32);

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Where a value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarKind {
    Local,
    Static,
    Field,
    Const,
}

/// One abstract fact about one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    /// `None` when the static type is unknown, e.g. `aconst_null`.
    pub ty: Option<FieldType>,
    pub kind: VarKind,
    pub domain: DomainValue,
    /// Local slot the value was last stored to. Two variables in different
    /// states denote the same entity when their slots match.
    pub slot: Option<u16>,
    /// Instruction index that produced the value.
    pub defined_at: usize,
    pub strictly_below: BTreeSet<VarId>,
    pub at_most: BTreeSet<VarId>,
}

impl Variable {
    pub fn new(ty: Option<FieldType>, kind: VarKind, domain: DomainValue, defined_at: usize) -> Self {
        Self {
            ty,
            kind,
            domain,
            slot: None,
            defined_at,
            strictly_below: BTreeSet::new(),
            at_most: BTreeSet::new(),
        }
    }

    /// An unconstrained local value.
    pub fn top(ty: Option<FieldType>, defined_at: usize) -> Self {
        Self::new(ty, VarKind::Local, DomainValue::Top, defined_at)
    }

    pub fn with_slot(mut self, slot: u16) -> Self {
        self.slot = Some(slot);
        self
    }

    /// Stack words the value occupies in the JVM: 2 for `long` and `double`.
    pub fn category(&self) -> u8 {
        match &self.ty {
            Some(ty) if ty.is_category2() => 2,
            _ => 1,
        }
    }

    /// The value is a proven in-bounds index for `array`.
    pub fn is_safe(&self, array: VarId) -> bool {
        self.domain.is_non_negative() && self.strictly_below.contains(&array)
    }

    pub fn mark_safe(&mut self, array: VarId) {
        self.strictly_below.insert(array);
    }

    pub fn clear_relations(&mut self) {
        self.strictly_below.clear();
        self.at_most.clear();
    }

    /// Keeps only the facts both operands share.
    fn intersect_relations(&mut self, lhs: &Variable, rhs: &Variable) {
        self.strictly_below = lhs.strictly_below.intersection(&rhs.strictly_below).copied().collect();
        self.at_most = lhs.at_most.intersection(&rhs.at_most).copied().collect();
    }

    pub fn has_relations(&self) -> bool {
        !self.strictly_below.is_empty() || !self.at_most.is_empty()
    }

    /// Refines `self` given `self < other`.
    pub fn refine_lt(&mut self, other: &Variable) {
        self.strictly_below.extend(other.strictly_below.iter().copied());
        self.strictly_below.extend(other.at_most.iter().copied());
    }

    /// Refines `self` given `self <= other`.
    pub fn refine_le(&mut self, other: &Variable) {
        self.strictly_below.extend(other.strictly_below.iter().copied());
        self.at_most.extend(other.at_most.iter().copied());
    }

    /// Refines `self` given `self > other`.
    pub fn refine_gt(&mut self, other: &Variable) {
        if other.domain.is_non_negative() {
            self.domain = self.domain.meet(DomainValue::StrictlyPositive);
        }
    }

    /// Refines `self` given `self >= other`.
    pub fn refine_ge(&mut self, other: &Variable) {
        if other.domain.is_non_negative() {
            self.domain = self.domain.meet(other.domain);
        }
    }

    /// Refines `self` given `self == other`: every bound and the sign of
    /// either side holds for both.
    pub fn refine_eq(&mut self, other: &Variable) {
        self.refine_le(other);
        self.domain = self.domain.meet(other.domain);
    }

    /// The value after `iinc delta`, as a fresh variable in the same slot.
    ///
    /// # Example
    ///
    /// ```
    /// use jvm_bounds::analysis::{DomainValue, Variable};
    ///
    /// let i = Variable::top(None, 0);
    /// let mut zero = i.clone();
    /// zero.domain = DomainValue::NonNegative;
    /// assert_eq!(zero.incremented(1, 4).domain, DomainValue::StrictlyPositive);
    /// assert_eq!(zero.incremented(-1, 4).domain, DomainValue::Top);
    /// ```
    pub fn incremented(&self, delta: i32, defined_at: usize) -> Variable {
        let mut next = self.clone();
        next.defined_at = defined_at;
        match delta {
            0 => {}
            1 => {
                // i < x becomes i + 1 <= x
                next.at_most = std::mem::take(&mut next.strictly_below);
                if next.domain == DomainValue::NonNegative {
                    next.domain = DomainValue::StrictlyPositive;
                }
            }
            -1 => {
                // i <= x becomes i - 1 < x
                let at_most = std::mem::take(&mut next.at_most);
                next.strictly_below.extend(at_most);
                next.domain = match next.domain {
                    DomainValue::StrictlyPositive => DomainValue::NonNegative,
                    DomainValue::NonNegative => DomainValue::Top,
                    other => other,
                };
            }
            d if d > 1 => {
                next.clear_relations();
                if next.domain == DomainValue::NonNegative {
                    next.domain = DomainValue::StrictlyPositive;
                }
            }
            _ => {
                next.clear_relations();
                next.domain = DomainValue::Top;
            }
        }
        next
    }

    /// Result of a binary arithmetic instruction `lhs op rhs`.
    pub fn binary(op: ArithOp, lhs: &Variable, rhs: &Variable, kind: NumKind, defined_at: usize) -> Variable {
        let ty = Some(kind.field_type());
        let mut out = Variable::top(ty, defined_at);
        match op {
            ArithOp::Add => out.domain = lhs.domain.add(rhs.domain),
            ArithOp::Mul => out.domain = lhs.domain.mul(rhs.domain),
            ArithOp::Div => {
                out.domain = lhs.domain.div(rhs.domain);
                if out.domain == DomainValue::NonNegative {
                    out.intersect_relations(lhs, rhs);
                }
            }
            ArithOp::Rem => {
                out.domain = lhs.domain.div(rhs.domain);
                if out.domain == DomainValue::NonNegative {
                    out.intersect_relations(lhs, rhs);
                    // a % b < b
                    out.strictly_below.extend(rhs.strictly_below.iter().copied());
                    out.strictly_below.extend(rhs.at_most.iter().copied());
                }
            }
            ArithOp::And => {
                // a & b <= min(a, b) when either side is non-negative
                let bounded: Vec<&Variable> = [lhs, rhs]
                    .into_iter()
                    .filter(|v| v.domain.is_non_negative())
                    .collect();
                if !bounded.is_empty() {
                    out.domain = DomainValue::NonNegative;
                    for v in bounded {
                        out.strictly_below.extend(v.strictly_below.iter().copied());
                        out.at_most.extend(v.at_most.iter().copied());
                    }
                }
            }
            ArithOp::Shr | ArithOp::Ushr => {
                if lhs.domain.is_non_negative() {
                    out.domain = DomainValue::NonNegative;
                    out.strictly_below = lhs.strictly_below.clone();
                    out.at_most = lhs.at_most.clone();
                }
            }
            ArithOp::Sub | ArithOp::Neg | ArithOp::Shl | ArithOp::Or | ArithOp::Xor => {}
        }
        out
    }

    /// Result of a numeric conversion.
    pub fn converted(&self, from: NumKind, to: ConvertTarget, defined_at: usize) -> Variable {
        let ty = match to {
            ConvertTarget::Int => FieldType::Int,
            ConvertTarget::Long => FieldType::Long,
            ConvertTarget::Float => FieldType::Float,
            ConvertTarget::Double => FieldType::Double,
            ConvertTarget::Byte => FieldType::Byte,
            ConvertTarget::Char => FieldType::Char,
            ConvertTarget::Short => FieldType::Short,
        };
        let mut out = self.clone();
        out.ty = Some(ty);
        out.kind = VarKind::Local;
        out.slot = None;
        out.defined_at = defined_at;

        use ConvertTarget as T;
        match (from, to) {
            // Widening keeps the exact value.
            (NumKind::Int, T::Long | T::Float | T::Double)
            | (NumKind::Long, T::Float | T::Double)
            | (NumKind::Float, T::Double) => {}
            // Truncation of a non-negative value stays non-negative and no larger.
            (NumKind::Int, T::Char)
            | (NumKind::Float | NumKind::Double, T::Int | T::Long)
            | (NumKind::Double, T::Float)
                if self.domain.is_non_negative() =>
            {
                out.domain = DomainValue::NonNegative;
            }
            _ if self.domain == DomainValue::Bottom => {}
            _ => {
                out.domain = DomainValue::Top;
                out.clear_relations();
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DomainValue::*;

    fn int(domain: DomainValue) -> Variable {
        Variable::new(Some(FieldType::Int), VarKind::Local, domain, 0)
    }

    fn ids(raw: &[u32]) -> BTreeSet<VarId> {
        raw.iter().map(|&id| VarId(id)).collect()
    }

    #[test]
    fn test_is_safe_needs_sign_and_bound() {
        let array = VarId(9);
        let mut index = int(NonNegative);
        assert!(!index.is_safe(array));
        index.mark_safe(array);
        assert!(index.is_safe(array));
        index.domain = Top;
        assert!(!index.is_safe(array));
        index.domain = Bottom;
        assert!(!index.is_safe(array));
    }

    #[test]
    fn test_lt_propagates_bounds_transitively() {
        // a < b and b < c give a < c
        let mut b = int(NonNegative);
        b.strictly_below = ids(&[3]);
        b.at_most = ids(&[4]);
        let mut a = int(NonNegative);
        a.refine_lt(&b);
        assert_eq!(a.strictly_below, ids(&[3, 4]));
        assert!(a.at_most.is_empty());
    }

    #[test]
    fn test_le_keeps_relation_kinds() {
        let mut b = int(NonNegative);
        b.strictly_below = ids(&[3]);
        b.at_most = ids(&[4]);
        let mut a = int(Top);
        a.refine_le(&b);
        assert_eq!(a.strictly_below, ids(&[3]));
        assert_eq!(a.at_most, ids(&[4]));
    }

    #[test]
    fn test_gt_and_ge_refine_sign() {
        let mut a = int(Top);
        a.refine_gt(&int(NonNegative));
        assert_eq!(a.domain, StrictlyPositive);

        let mut a = int(Top);
        a.refine_gt(&int(Top));
        assert_eq!(a.domain, Top);

        let mut a = int(Top);
        a.refine_ge(&int(StrictlyPositive));
        assert_eq!(a.domain, StrictlyPositive);

        // never loses precision already held
        let mut a = int(StrictlyPositive);
        a.refine_ge(&int(NonNegative));
        assert_eq!(a.domain, StrictlyPositive);
    }

    #[test]
    fn test_eq_takes_precise_sign() {
        let mut a = int(NonNegative);
        a.refine_eq(&int(StrictlyPositive));
        assert_eq!(a.domain, StrictlyPositive);
    }

    #[test]
    fn test_increment_turns_strict_bound_into_at_most() {
        let mut i = int(NonNegative);
        i.strictly_below = ids(&[7]);
        let next = i.incremented(1, 3);
        assert_eq!(next.domain, StrictlyPositive);
        assert!(next.strictly_below.is_empty());
        assert_eq!(next.at_most, ids(&[7]));
        assert_eq!(next.defined_at, 3);
    }

    #[test]
    fn test_decrement_turns_at_most_into_strict_bound() {
        let mut n = int(StrictlyPositive);
        n.at_most = ids(&[7]);
        let next = n.incremented(-1, 0);
        assert_eq!(next.domain, NonNegative);
        assert_eq!(next.strictly_below, ids(&[7]));
        assert!(next.at_most.is_empty());
    }

    #[test]
    fn test_large_steps_drop_relations() {
        let mut i = int(NonNegative);
        i.strictly_below = ids(&[1]);
        let up = i.incremented(4, 0);
        assert_eq!(up.domain, StrictlyPositive);
        assert!(!up.has_relations());
        let down = i.incremented(-4, 0);
        assert_eq!(down.domain, Top);
        assert!(!down.has_relations());
    }

    #[test]
    fn test_div_keeps_shared_bounds_only() {
        let mut a = int(NonNegative);
        a.strictly_below = ids(&[3, 5]);
        a.at_most = ids(&[4]);
        let mut b = int(StrictlyPositive);
        b.strictly_below = ids(&[3]);
        let q = Variable::binary(ArithOp::Div, &a, &b, NumKind::Int, 0);
        assert_eq!(q.domain, NonNegative);
        assert_eq!(q.strictly_below, ids(&[3]));
        assert!(q.at_most.is_empty());
    }

    #[test]
    fn test_div_by_unrelated_constant_loses_bounds() {
        let mut i = int(NonNegative);
        i.strictly_below = ids(&[2]);
        let q = Variable::binary(ArithOp::Div, &i, &int(StrictlyPositive), NumKind::Int, 0);
        assert!(!q.is_safe(VarId(2)));
        assert!(!q.has_relations());
    }

    #[test]
    fn test_div_of_bottom_is_non_negative() {
        let q = Variable::binary(ArithOp::Div, &int(Bottom), &int(NonNegative), NumKind::Int, 0);
        assert_eq!(q.domain, NonNegative);
        let q = Variable::binary(ArithOp::Div, &int(NonNegative), &int(Top), NumKind::Int, 0);
        assert_eq!(q.domain, Top);
    }

    #[test]
    fn test_rem_is_below_divisor_bound() {
        let i = int(NonNegative);
        let mut len = int(NonNegative);
        len.at_most = ids(&[8]);
        let r = Variable::binary(ArithOp::Rem, &i, &len, NumKind::Int, 0);
        assert!(r.is_safe(VarId(8)));
    }

    #[test]
    fn test_and_with_one_non_negative_side() {
        let mut mask = int(StrictlyPositive);
        mask.at_most = ids(&[2]);
        let r = Variable::binary(ArithOp::And, &int(Top), &mask, NumKind::Int, 0);
        assert_eq!(r.domain, NonNegative);
        assert_eq!(r.at_most, ids(&[2]));
    }

    #[test]
    fn test_opaque_operators_are_top() {
        for op in [ArithOp::Sub, ArithOp::Shl, ArithOp::Or, ArithOp::Xor] {
            let mut a = int(NonNegative);
            a.strictly_below = ids(&[1]);
            let r = Variable::binary(op, &a, &int(NonNegative), NumKind::Int, 0);
            assert_eq!(r.domain, Top, "{op:?}");
            assert!(!r.has_relations(), "{op:?}");
        }
    }

    #[test]
    fn test_conversions() {
        let mut i = int(StrictlyPositive);
        i.strictly_below = ids(&[5]);
        let wide = i.converted(NumKind::Int, ConvertTarget::Long, 0);
        assert_eq!(wide.domain, StrictlyPositive);
        assert_eq!(wide.category(), 2);
        assert_eq!(wide.strictly_below, ids(&[5]));

        let c = i.converted(NumKind::Int, ConvertTarget::Char, 0);
        assert_eq!(c.domain, NonNegative);
        assert!(c.is_safe(VarId(5)));

        let b = i.converted(NumKind::Int, ConvertTarget::Byte, 0);
        assert_eq!(b.domain, Top);
        assert!(!b.has_relations());
    }
}
