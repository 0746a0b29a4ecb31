//! Operators and gate states of the indexed fault-tree graph.

use std::fmt;

/// Boolean operators for formulas and indexed gates.
///
/// The set is closed: preprocessing rewrites every gate into `And`, `Or`,
/// or `Null` form before decision diagrams are built.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Operator {
    And,
    Or,
    /// Complement of a single argument.
    Not,
    /// Single-argument pass-through.
    Null,
    Nand,
    Nor,
    Xor,
    /// "At least K of N arguments" with a vote number K >= 2.
    AtLeast,
}

impl Operator {
    /// All operators, indexable by [`Operator::index`].
    pub const ALL: [Operator; 8] = [
        Operator::And,
        Operator::Or,
        Operator::Not,
        Operator::Null,
        Operator::Nand,
        Operator::Nor,
        Operator::Xor,
        Operator::AtLeast,
    ];

    /// Dense index of the operator, for per-operator tables.
    pub fn index(self) -> usize {
        match self {
            Operator::And => 0,
            Operator::Or => 1,
            Operator::Not => 2,
            Operator::Null => 3,
            Operator::Nand => 4,
            Operator::Nor => 5,
            Operator::Xor => 6,
            Operator::AtLeast => 7,
        }
    }

    /// Operators that keep a graph coherent (monotonic).
    pub fn is_coherent(self) -> bool {
        matches!(
            self,
            Operator::And | Operator::Or | Operator::Null | Operator::AtLeast
        )
    }

    /// Operators in normal form (the only ones after normalization).
    pub fn is_normal(self) -> bool {
        matches!(self, Operator::And | Operator::Or | Operator::Null)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operator::And => "and",
            Operator::Or => "or",
            Operator::Not => "not",
            Operator::Null => "null",
            Operator::Nand => "nand",
            Operator::Nor => "nor",
            Operator::Xor => "xor",
            Operator::AtLeast => "atleast",
        };
        write!(f, "{}", name)
    }
}

/// Semantic state of an indexed gate.
///
/// A state change is sticky: a gate that becomes constant is detached from
/// the graph by parent rewrites and never returns to `Normal`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum State {
    /// The gate's logic is defined by its operator and arguments.
    Normal,
    /// The gate is the constant False.
    Null,
    /// The gate is the constant True.
    Unity,
}
