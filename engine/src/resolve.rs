// resolve.rs — Symbol resolution for NocScript expressions
//
// Turns a parsed expression into a resolved node tree: `$name` becomes an
// `ArgId`, statically named `SR_WRITE` targets become `RegisterId`s, and
// primitive names become `Primitive`s. Unknown names, arity mismatches,
// statically visible operand kind errors, side effects in pure contexts,
// and misplaced `%attr` references are reported as diagnostics.
//
// Preconditions: `symbols` holds every argument and writable register of the block.
// Postconditions: returns a `CompiledExpr` iff no error diagnostic was produced.
// Failure modes: every defect is pushed to the caller's diagnostic list;
//                resolution continues past errors.
// Side effects: none.

use std::collections::HashMap;
use std::fmt;

use crate::ast::{Expr, ExprKind, Ident, Span};
use crate::diag::{codes, Diagnostic};
use crate::id::{ArgId, RegisterId};
use crate::primitives::{Operand, Primitive};
use crate::value::{ArgType, Value, ValueKind};

// ── Public types ────────────────────────────────────────────────────────────

/// Attributes of a port, in their fixed evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PortAttr {
    Type,
    Vlen,
    PktSize,
}

impl PortAttr {
    pub const ORDER: [PortAttr; 3] = [PortAttr::Type, PortAttr::Vlen, PortAttr::PktSize];

    pub fn name(self) -> &'static str {
        match self {
            PortAttr::Type => "type",
            PortAttr::Vlen => "vlen",
            PortAttr::PktSize => "pkt_size",
        }
    }

    pub fn from_name(name: &str) -> Option<PortAttr> {
        PortAttr::ORDER.iter().copied().find(|a| a.name() == name)
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Kind every resolved value of this attribute must have.
    pub fn kind(self) -> ValueKind {
        match self {
            PortAttr::Type => ValueKind::Str,
            PortAttr::Vlen | PortAttr::PktSize => ValueKind::Int,
        }
    }
}

/// Where an expression appears. Checks and port attributes are pure; only
/// actions may write registers. `%attr` is legal only in port attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprContext {
    Check,
    Action,
    Port(PortAttr),
}

impl ExprContext {
    fn is_pure(self) -> bool {
        !matches!(self, ExprContext::Action)
    }
}

/// Names visible to expressions of one block.
#[derive(Debug, Default)]
pub struct SymbolTable {
    pub args: HashMap<String, (ArgId, ArgType)>,
    pub writable: HashMap<String, RegisterId>,
}

/// Register operand of `SR_WRITE`.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteTarget {
    /// Name given as a string literal, resolved at schema-build time.
    Static(RegisterId),
    /// Name computed at run time; looked up when the write is issued.
    Dynamic(Box<Node>),
}

/// A resolved expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Const(Value),
    Arg(ArgId),
    SelfAttr(PortAttr),
    Call { prim: Primitive, args: Vec<Node> },
    Write { target: WriteTarget, value: Box<Node> },
}

/// A descriptor expression after parsing and resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpr {
    pub source: String,
    pub ast: Expr,
    pub root: Node,
}

impl CompiledExpr {
    /// A literal attribute that needed no parsing (e.g. a port type `sc16`).
    pub fn literal(value: Value) -> Self {
        let ast = Expr {
            kind: match &value {
                Value::Int(v) => ExprKind::Int(*v),
                Value::Str(s) => ExprKind::Str(s.clone()),
                Value::Bool(b) => ExprKind::Call {
                    name: Ident {
                        name: if *b { "TRUE" } else { "FALSE" }.to_string(),
                        span: (0..0).into(),
                    },
                    args: Vec::new(),
                },
            },
            span: (0..0).into(),
        };
        CompiledExpr {
            source: value.to_string(),
            ast,
            root: Node::Const(value),
        }
    }
}

impl fmt::Display for CompiledExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ast)
    }
}

// ── Public entry point ──────────────────────────────────────────────────────

/// Parse and resolve one expression string.
///
/// Diagnostics are appended to `diagnostics` with `origin` naming the
/// descriptor element. Returns `None` if any error was reported.
pub fn compile(
    source: &str,
    context: ExprContext,
    symbols: &SymbolTable,
    origin: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<CompiledExpr> {
    let parsed = crate::parser::parse(source);
    if !parsed.errors.is_empty() {
        for err in &parsed.errors {
            diagnostics.push(
                Diagnostic::error(origin, format!("syntax error: {}", err))
                    .with_code(codes::SYNTAX)
                    .with_span(*err.span()),
            );
        }
        return None;
    }
    let ast = parsed.expr?;

    let mut resolver = Resolver {
        symbols,
        context,
        origin,
        diagnostics: Vec::new(),
    };
    let resolved = resolver.node(&ast);
    let failed = !resolver.diagnostics.is_empty();
    diagnostics.extend(resolver.diagnostics);
    match resolved {
        Some((root, _)) if !failed => Some(CompiledExpr {
            source: source.to_string(),
            ast,
            root,
        }),
        _ => None,
    }
}

// ── Internal context ────────────────────────────────────────────────────────

struct Resolver<'a> {
    symbols: &'a SymbolTable,
    context: ExprContext,
    origin: &'a str,
    diagnostics: Vec<Diagnostic>,
}

impl Resolver<'_> {
    fn error(&mut self, code: crate::diag::DiagCode, span: Span, message: String) {
        self.diagnostics.push(
            Diagnostic::error(self.origin, message)
                .with_code(code)
                .with_span(span),
        );
    }

    /// Resolve a node and infer its kind where it is statically known.
    fn node(&mut self, expr: &Expr) -> Option<(Node, Option<ValueKind>)> {
        match &expr.kind {
            ExprKind::Int(v) => Some((Node::Const(Value::Int(*v)), Some(ValueKind::Int))),
            ExprKind::Str(s) => Some((Node::Const(Value::Str(s.clone())), Some(ValueKind::Str))),
            ExprKind::Var(ident) => self.var(ident),
            ExprKind::SelfAttr(ident) => self.self_attr(ident),
            ExprKind::Call { name, args } => self.call(name, args, expr.span),
        }
    }

    fn var(&mut self, ident: &Ident) -> Option<(Node, Option<ValueKind>)> {
        match self.symbols.args.get(&ident.name) {
            Some((id, ty)) => Some((Node::Arg(*id), Some(ty.kind()))),
            None => {
                let mut known: Vec<&str> = self.symbols.args.keys().map(String::as_str).collect();
                known.sort_unstable();
                self.diagnostics.push(
                    Diagnostic::error(
                        self.origin,
                        format!("reference to undeclared argument '${}'", ident.name),
                    )
                    .with_code(codes::UNDECLARED_ARG)
                    .with_span(ident.span)
                    .with_hint(format!("declared arguments: {}", known.join(", "))),
                );
                None
            }
        }
    }

    fn self_attr(&mut self, ident: &Ident) -> Option<(Node, Option<ValueKind>)> {
        let current = match self.context {
            ExprContext::Port(attr) => attr,
            _ => {
                self.error(
                    codes::BAD_SELF_ATTR,
                    ident.span,
                    format!("'%{}' is only valid inside a port attribute", ident.name),
                );
                return None;
            }
        };
        match PortAttr::from_name(&ident.name) {
            Some(attr) if attr.index() < current.index() => {
                Some((Node::SelfAttr(attr), Some(attr.kind())))
            }
            Some(attr) => {
                self.error(
                    codes::BAD_SELF_ATTR,
                    ident.span,
                    format!(
                        "'%{}' is not resolved yet when '{}' is evaluated",
                        attr.name(),
                        current.name()
                    ),
                );
                None
            }
            None => {
                self.error(
                    codes::BAD_SELF_ATTR,
                    ident.span,
                    format!("unknown port attribute '%{}'", ident.name),
                );
                None
            }
        }
    }

    fn call(
        &mut self,
        name: &Ident,
        args: &[Expr],
        span: Span,
    ) -> Option<(Node, Option<ValueKind>)> {
        let Some(prim) = Primitive::from_name(&name.name) else {
            self.error(
                codes::UNKNOWN_PRIMITIVE,
                name.span,
                format!("unknown primitive '{}'", name.name),
            );
            // Still resolve operands so their defects are reported too.
            for arg in args {
                self.node(arg);
            }
            return None;
        };

        if args.len() != prim.arity() {
            self.error(
                codes::ARITY,
                span,
                format!(
                    "{} takes {} operand(s), {} given",
                    prim,
                    prim.arity(),
                    args.len()
                ),
            );
            for arg in args {
                self.node(arg);
            }
            return None;
        }

        if prim.is_effectful() && self.context.is_pure() {
            self.error(
                codes::EFFECT_IN_PURE_CONTEXT,
                name.span,
                format!("{} is not allowed here: only actions may write registers", prim),
            );
            return None;
        }

        if prim == Primitive::SrWrite {
            return self.sr_write(&args[0], &args[1]);
        }

        let mut nodes = Vec::with_capacity(args.len());
        let mut ok = true;
        for (arg, operand) in args.iter().zip(prim.operands()) {
            match self.node(arg) {
                Some((node, kind)) => {
                    ok &= self.check_operand(prim, *operand, kind, arg.span);
                    nodes.push(node);
                }
                None => ok = false,
            }
        }
        ok.then(|| (Node::Call { prim, args: nodes }, prim.result_kind()))
    }

    fn sr_write(&mut self, target: &Expr, value: &Expr) -> Option<(Node, Option<ValueKind>)> {
        let target = match &target.kind {
            ExprKind::Str(name) => match self.symbols.writable.get(name) {
                Some(id) => Some(WriteTarget::Static(*id)),
                None => {
                    self.error(
                        codes::UNDECLARED_REGISTER,
                        target.span,
                        format!("SR_WRITE to undeclared register \"{}\"", name),
                    );
                    None
                }
            },
            _ => match self.node(target) {
                Some((node, kind)) => self
                    .check_operand(Primitive::SrWrite, Operand::Kind(ValueKind::Str), kind, target.span)
                    .then(|| WriteTarget::Dynamic(Box::new(node))),
                None => None,
            },
        };
        let value = match self.node(value) {
            Some((node, kind)) => self
                .check_operand(Primitive::SrWrite, Operand::Kind(ValueKind::Int), kind, value.span)
                .then_some(node),
            None => None,
        };
        Some((
            Node::Write {
                target: target?,
                value: Box::new(value?),
            },
            Primitive::SrWrite.result_kind(),
        ))
    }

    fn check_operand(
        &mut self,
        prim: Primitive,
        operand: Operand,
        actual: Option<ValueKind>,
        span: Span,
    ) -> bool {
        match (operand, actual) {
            (Operand::Kind(expected), Some(actual)) if expected != actual => {
                self.error(
                    codes::KIND_MISMATCH,
                    span,
                    format!("{} expects a {} operand, found {}", prim, expected, actual),
                );
                false
            }
            _ => true,
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
