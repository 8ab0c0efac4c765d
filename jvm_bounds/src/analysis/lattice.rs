//! Sign lattice for integer values.
//!
//! ```text
//!        Top            any value
//!         |
//!    NonNegative        >= 0
//!         |
//!  StrictlyPositive     > 0
//!         |
//!       Bottom          unreached
//! ```
//!
//! The order is a chain, so joining two facts always picks one of them and
//! every fact reaches `Top` after at most three strict increases.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Abstract value of a single integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainValue {
    Bottom,
    StrictlyPositive,
    NonNegative,
    Top,
}

impl DomainValue {
    /// `self` is at least as imprecise as `other`.
    ///
    /// # Example
    ///
    /// ```
    /// use jvm_bounds::analysis::DomainValue;
    ///
    /// assert!(DomainValue::NonNegative.geq(DomainValue::StrictlyPositive));
    /// assert!(!DomainValue::StrictlyPositive.geq(DomainValue::NonNegative));
    /// assert!(DomainValue::Bottom.geq(DomainValue::Bottom));
    /// ```
    pub fn geq(self, other: DomainValue) -> bool {
        use DomainValue::*;
        match (self, other) {
            (Top, _) => true,
            (NonNegative, NonNegative | StrictlyPositive | Bottom) => true,
            (StrictlyPositive, StrictlyPositive | Bottom) => true,
            (Bottom, Bottom) => true,
            _ => false,
        }
    }

    /// Joins `incoming` into `self`; returns whether `self` changed.
    pub fn merge(&mut self, incoming: DomainValue) -> bool {
        if self.geq(incoming) {
            false
        } else {
            *self = incoming;
            true
        }
    }

    /// The join of two values.
    pub fn join(self, other: DomainValue) -> DomainValue {
        let mut joined = self;
        joined.merge(other);
        joined
    }

    /// The more precise of two values, used when both are known to hold.
    pub fn meet(self, other: DomainValue) -> DomainValue {
        if self.geq(other) {
            other
        } else {
            self
        }
    }

    /// `> 0` or `>= 0`.
    pub fn is_non_negative(self) -> bool {
        matches!(self, DomainValue::StrictlyPositive | DomainValue::NonNegative)
    }

    /// Abstraction of a known integer.
    pub fn of_int(value: i64) -> DomainValue {
        match value {
            v if v > 0 => DomainValue::StrictlyPositive,
            0 => DomainValue::NonNegative,
            _ => DomainValue::Top,
        }
    }

    /// Abstraction of a known float; NaN and negatives are `Top`.
    pub fn of_float(value: f64) -> DomainValue {
        if value > 0.0 {
            DomainValue::StrictlyPositive
        } else if value == 0.0 {
            DomainValue::NonNegative
        } else {
            DomainValue::Top
        }
    }

    pub fn add(self, rhs: DomainValue) -> DomainValue {
        use DomainValue::*;
        match (self, rhs) {
            (NonNegative, NonNegative) => NonNegative,
            (a, b) if a.is_non_negative() && b.is_non_negative() => StrictlyPositive,
            _ => Top,
        }
    }

    pub fn mul(self, rhs: DomainValue) -> DomainValue {
        use DomainValue::*;
        match (self, rhs) {
            (StrictlyPositive, StrictlyPositive) => StrictlyPositive,
            (a, b) if a.is_non_negative() && b.is_non_negative() => NonNegative,
            _ => Top,
        }
    }

    /// Shared by `div` and `rem`: `NonNegative` unless either side is `Top`.
    pub fn div(self, rhs: DomainValue) -> DomainValue {
        match (self, rhs) {
            (DomainValue::Top, _) | (_, DomainValue::Top) => DomainValue::Top,
            _ => DomainValue::NonNegative,
        }
    }
}

impl fmt::Display for DomainValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainValue::Bottom => write!(f, "⊥"),
            DomainValue::StrictlyPositive => write!(f, ">0"),
            DomainValue::NonNegative => write!(f, ">=0"),
            DomainValue::Top => write!(f, "⊤"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DomainValue::*;

    const ALL: [DomainValue; 4] = [Bottom, StrictlyPositive, NonNegative, Top];

    #[test]
    fn test_geq_table() {
        assert!(Top.geq(NonNegative));
        assert!(!NonNegative.geq(Top));
        assert!(NonNegative.geq(StrictlyPositive));
        assert!(!StrictlyPositive.geq(NonNegative));
        assert!(!StrictlyPositive.geq(Top));
        assert!(!Bottom.geq(StrictlyPositive));
    }

    #[test]
    fn test_geq_is_reflexive() {
        for v in ALL {
            assert!(v.geq(v), "{v} not reflexive");
        }
    }

    #[test]
    fn test_join_is_commutative() {
        for a in ALL {
            for b in ALL {
                assert_eq!(a.join(b), b.join(a), "join({a}, {b})");
            }
        }
    }

    #[test]
    fn test_self_merge_never_changes() {
        for v in ALL {
            let mut running = v;
            assert!(!running.merge(v));
            assert_eq!(running, v);
        }
    }

    #[test]
    fn test_merge_with_top_is_top() {
        for v in ALL {
            assert_eq!(v.join(Top), Top);
            assert_eq!(Top.join(v), Top);
        }
    }

    #[test]
    fn test_merge_converges_in_three_steps() {
        let mut running = Bottom;
        let mut steps = 0;
        for incoming in [StrictlyPositive, NonNegative, Top, Top, NonNegative] {
            if running.merge(incoming) {
                steps += 1;
            }
        }
        assert_eq!(running, Top);
        assert_eq!(steps, 3);
    }

    #[test]
    fn test_meet_picks_precise_side() {
        assert_eq!(NonNegative.meet(StrictlyPositive), StrictlyPositive);
        assert_eq!(Top.meet(NonNegative), NonNegative);
    }

    #[test]
    fn test_arithmetic_rules() {
        assert_eq!(NonNegative.add(NonNegative), NonNegative);
        assert_eq!(NonNegative.add(StrictlyPositive), StrictlyPositive);
        assert_eq!(Top.add(StrictlyPositive), Top);
        assert_eq!(StrictlyPositive.mul(StrictlyPositive), StrictlyPositive);
        assert_eq!(StrictlyPositive.mul(NonNegative), NonNegative);
        assert_eq!(NonNegative.div(StrictlyPositive), NonNegative);
        assert_eq!(Bottom.div(NonNegative), NonNegative);
        assert_eq!(StrictlyPositive.div(Bottom), NonNegative);
        assert_eq!(Top.div(NonNegative), Top);
        assert_eq!(Bottom.div(Top), Top);
    }

    #[test]
    fn test_constants() {
        assert_eq!(DomainValue::of_int(5), StrictlyPositive);
        assert_eq!(DomainValue::of_int(0), NonNegative);
        assert_eq!(DomainValue::of_int(-1), Top);
        assert_eq!(DomainValue::of_float(f64::NAN), Top);
    }
}
