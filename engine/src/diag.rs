// diag.rs — Schema diagnostics model
//
// Diagnostics accumulated while building a `BlockSchema` from a descriptor.
// A descriptor is checked completely before it is rejected, so every defect
// is reported in one pass.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::ast::Span;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0101`, `W0001`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Assigned diagnostic codes. A code is never reused for a different meaning.
pub mod codes {
    use super::DiagCode;

    // ── Descriptor structure ──
    pub const DUPLICATE_REGISTER: DiagCode = DiagCode("E0001");
    pub const DUPLICATE_ARG: DiagCode = DiagCode("E0002");
    pub const DUPLICATE_PORT: DiagCode = DiagCode("E0003");
    pub const BAD_DEFAULT: DiagCode = DiagCode("E0004");
    pub const BAD_BLOCK_ID: DiagCode = DiagCode("E0005");
    pub const BAD_ARG_TYPE: DiagCode = DiagCode("E0006");

    // ── Expressions ──
    pub const SYNTAX: DiagCode = DiagCode("E0100");
    pub const UNDECLARED_ARG: DiagCode = DiagCode("E0101");
    pub const UNDECLARED_REGISTER: DiagCode = DiagCode("E0102");
    pub const UNKNOWN_PRIMITIVE: DiagCode = DiagCode("E0103");
    pub const ARITY: DiagCode = DiagCode("E0104");
    pub const KIND_MISMATCH: DiagCode = DiagCode("E0105");
    pub const EFFECT_IN_PURE_CONTEXT: DiagCode = DiagCode("E0106");
    pub const BAD_SELF_ATTR: DiagCode = DiagCode("E0107");

    // ── Defaults ──
    pub const DEFAULT_REJECTED: DiagCode = DiagCode("E0200");
    pub const DEFAULT_EVAL: DiagCode = DiagCode("E0201");

    // ── Warnings ──
    pub const ALIASED_ADDRESS: DiagCode = DiagCode("W0001");
    pub const NO_IDS: DiagCode = DiagCode("W0002");
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A schema-build diagnostic.
///
/// `origin` names the descriptor element (`arg 'spp' action`, `port 'in'
/// vlen`, ...). `span`, when present, points into that element's expression
/// text.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub origin: String,
    pub span: Option<Span>,
    pub message: String,
    pub hint: Option<String>,
}

impl Diagnostic {
    pub fn new(level: DiagLevel, origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            origin: origin.into(),
            span: None,
            message: message.into(),
            hint: None,
        }
    }

    pub fn error(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, origin, message)
    }

    pub fn warning(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Warning, origin, message)
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a location inside the expression text.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagLevel::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        match &self.code {
            Some(code) => write!(f, "{}[{}]: {}: {}", level, code, self.origin, self.message)?,
            None => write!(f, "{}: {}: {}", level, self.origin, self.message)?,
        }
        if let Some(span) = &self.span {
            write!(f, " (at {}..{})", span.start, span.end)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}
