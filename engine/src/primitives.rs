// primitives.rs — Primitive table of the expression language
//
// Each primitive declares its arity, the operand kinds it accepts, and the
// kind it produces. The resolver uses the table to reject unknown names,
// arity mismatches, and statically visible kind errors at schema-build time.
// The evaluator enforces the same operand kinds at run time.

use std::fmt;

use crate::value::ValueKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Ge,
    Le,
    Lt,
    Gt,
    Equal,
    IsPwrOf2,
    Not,
    Add,
    Mult,
    Log2,
    ShiftLeft,
    ShiftRight,
    If,
    IfElse,
    And,
    Or,
    True,
    False,
    SrWrite,
}

/// What a primitive accepts in one operand position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// Any value; only its truthiness or identity matters.
    Any,
    /// Must evaluate to the given kind.
    Kind(ValueKind),
}

const INT: Operand = Operand::Kind(ValueKind::Int);
const STR: Operand = Operand::Kind(ValueKind::Str);
const ANY: Operand = Operand::Any;

impl Primitive {
    pub const ALL: [Primitive; 19] = [
        Primitive::Ge,
        Primitive::Le,
        Primitive::Lt,
        Primitive::Gt,
        Primitive::Equal,
        Primitive::IsPwrOf2,
        Primitive::Not,
        Primitive::Add,
        Primitive::Mult,
        Primitive::Log2,
        Primitive::ShiftLeft,
        Primitive::ShiftRight,
        Primitive::If,
        Primitive::IfElse,
        Primitive::And,
        Primitive::Or,
        Primitive::True,
        Primitive::False,
        Primitive::SrWrite,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Primitive::Ge => "GE",
            Primitive::Le => "LE",
            Primitive::Lt => "LT",
            Primitive::Gt => "GT",
            Primitive::Equal => "EQUAL",
            Primitive::IsPwrOf2 => "IS_PWR_OF_2",
            Primitive::Not => "NOT",
            Primitive::Add => "ADD",
            Primitive::Mult => "MULT",
            Primitive::Log2 => "LOG2",
            Primitive::ShiftLeft => "SHIFT_LEFT",
            Primitive::ShiftRight => "SHIFT_RIGHT",
            Primitive::If => "IF",
            Primitive::IfElse => "IF_ELSE",
            Primitive::And => "AND",
            Primitive::Or => "OR",
            Primitive::True => "TRUE",
            Primitive::False => "FALSE",
            Primitive::SrWrite => "SR_WRITE",
        }
    }

    pub fn from_name(name: &str) -> Option<Primitive> {
        Primitive::ALL.iter().copied().find(|p| p.name() == name)
    }

    /// Accepted operand kinds, one entry per operand.
    pub fn operands(self) -> &'static [Operand] {
        match self {
            Primitive::Ge
            | Primitive::Le
            | Primitive::Lt
            | Primitive::Gt
            | Primitive::Add
            | Primitive::Mult
            | Primitive::ShiftLeft
            | Primitive::ShiftRight => &[INT, INT],
            Primitive::Equal => &[ANY, ANY],
            Primitive::IsPwrOf2 | Primitive::Log2 => &[INT],
            Primitive::Not => &[ANY],
            Primitive::If => &[ANY, ANY],
            Primitive::IfElse => &[ANY, ANY, ANY],
            Primitive::And | Primitive::Or => &[ANY, ANY],
            Primitive::True | Primitive::False => &[],
            Primitive::SrWrite => &[STR, INT],
        }
    }

    pub fn arity(self) -> usize {
        self.operands().len()
    }

    /// Kind of the result, when it does not depend on the operands.
    pub fn result_kind(self) -> Option<ValueKind> {
        match self {
            Primitive::Ge
            | Primitive::Le
            | Primitive::Lt
            | Primitive::Gt
            | Primitive::Equal
            | Primitive::IsPwrOf2
            | Primitive::Not
            | Primitive::True
            | Primitive::False
            | Primitive::SrWrite => Some(ValueKind::Bool),
            Primitive::Add
            | Primitive::Mult
            | Primitive::Log2
            | Primitive::ShiftLeft
            | Primitive::ShiftRight => Some(ValueKind::Int),
            Primitive::If | Primitive::IfElse | Primitive::And | Primitive::Or => None,
        }
    }

    /// Whether evaluating this primitive touches hardware.
    pub fn is_effectful(self) -> bool {
        matches!(self, Primitive::SrWrite)
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for p in Primitive::ALL {
            assert_eq!(Primitive::from_name(p.name()), Some(p));
        }
        assert_eq!(Primitive::from_name("SR_READ"), None);
        assert_eq!(Primitive::from_name("ge"), None);
    }

    #[test]
    fn arities() {
        assert_eq!(Primitive::SrWrite.arity(), 2);
        assert_eq!(Primitive::IfElse.arity(), 3);
        assert_eq!(Primitive::True.arity(), 0);
        assert_eq!(Primitive::Log2.arity(), 1);
    }

    #[test]
    fn only_sr_write_is_effectful() {
        let effectful: Vec<_> = Primitive::ALL.iter().filter(|p| p.is_effectful()).collect();
        assert_eq!(effectful, vec![&Primitive::SrWrite]);
    }
}
