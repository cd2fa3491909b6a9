//! Runtime errors of the argument-set protocol

use thiserror::Error;

use crate::primitives::Primitive;
use crate::sink::RegisterWrite;
use crate::value::ValueKind;

/// A primitive could not be applied while evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("argument '${0}' has no committed value")]
    Unset(String),

    #[error("{prim} expects a {expected} operand, found {found}")]
    OperandKind {
        prim: Primitive,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("LOG2({0}): not a positive power of two")]
    NotPowerOfTwo(i64),

    #[error("integer overflow in {0}")]
    Overflow(Primitive),

    #[error("shift amount {0} out of range")]
    ShiftRange(i64),

    #[error("SR_WRITE to undeclared register \"{0}\"")]
    UndeclaredRegister(String),

    #[error("value {value} does not fit in register {register}")]
    RegisterRange { register: String, value: i64 },

    #[error("'%{0}' is not available here")]
    SelfAttrUnavailable(&'static str),

    #[error("register writes are not allowed outside an action")]
    EffectInPureContext,
}

/// The register sink failed to perform a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("register {register}: {message}")]
pub struct HardwareError {
    pub register: String,
    pub message: String,
}

/// Why an action stopped before completing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionFailure {
    #[error(transparent)]
    Evaluation(#[from] EvalError),

    #[error(transparent)]
    Hardware(#[from] HardwareError),
}

/// Outcome class of a failed set request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetErrorKind {
    UnknownArgument,
    Validation,
    Evaluation,
    PartiallyFailed,
}

/// A rejected or aborted argument-set request.
///
/// `Validation` and `CheckFailed` leave the argument store untouched.
/// `PartiallyFailed` means the value was committed and the writes in
/// `issued` reached the sink before the failure; they are not rolled back.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SetError {
    #[error("unknown argument '{0}'")]
    UnknownArgument(String),

    #[error("{arg}: {message}")]
    Validation { arg: String, message: String },

    #[error("{arg}: check could not be evaluated: {source}")]
    CheckFailed { arg: String, source: EvalError },

    #[error("{arg}: action aborted after {} write(s): {cause}", .issued.len())]
    PartiallyFailed {
        arg: String,
        issued: Vec<RegisterWrite>,
        cause: ActionFailure,
    },
}

impl SetError {
    pub fn kind(&self) -> SetErrorKind {
        match self {
            SetError::UnknownArgument(_) => SetErrorKind::UnknownArgument,
            SetError::Validation { .. } => SetErrorKind::Validation,
            SetError::CheckFailed { .. } => SetErrorKind::Evaluation,
            SetError::PartiallyFailed { .. } => SetErrorKind::PartiallyFailed,
        }
    }

    /// Whether the argument store was left unchanged by the failed request.
    pub fn store_unchanged(&self) -> bool {
        !matches!(self, SetError::PartiallyFailed { .. })
    }
}
