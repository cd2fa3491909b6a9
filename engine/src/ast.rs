// AST node types for NocScript expressions.
//
// Produced by the parser from one descriptor expression string. Every node
// carries a `SimpleSpan` into that string for diagnostics.
//
// Preconditions: produced by the parser from a valid or partially-valid token stream.
// Postconditions: each node's span covers the source range of the construct.
// Failure modes: none (data-only module).
// Side effects: none.

use std::fmt;

use chumsky::span::SimpleSpan;

/// Byte-offset span (alias for chumsky's `SimpleSpan`).
pub type Span = SimpleSpan;

/// An expression with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Integer literal (decimal or hex).
    Int(i64),
    /// Quoted string literal.
    Str(String),
    /// `$name` — argument reference.
    Var(Ident),
    /// `%name` — attribute of the enclosing port.
    SelfAttr(Ident),
    /// `NAME(args)` — primitive application. Infix `a AND b` / `a OR b`
    /// parse to this form as well.
    Call { name: Ident, args: Vec<Expr> },
}

/// An identifier with its source text and span.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Int(v) => write!(f, "{v}"),
            ExprKind::Str(s) => write!(f, "{s:?}"),
            ExprKind::Var(id) => write!(f, "${}", id.name),
            ExprKind::SelfAttr(id) => write!(f, "%{}", id.name),
            ExprKind::Call { name, args } => {
                write!(f, "{}(", name.name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}
