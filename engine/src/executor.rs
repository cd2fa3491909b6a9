// executor.rs — Action executor: one argument-set request
//
// Runs the set protocol for one argument:
//
//   Pending → Checking → Rejected
//                      → Committing → Acting → Completed
//                                            → PartiallyFailed
//
// The check sees the store with the candidate substituted. The candidate is
// committed before the action runs, so the action reads the new value. Writes
// reach the sink strictly in evaluation order, each acknowledged before the
// next is issued.
//
// Preconditions: the caller holds the instance lock for the whole call.
// Postconditions: on `Ok` the value is committed and every write was
//                 acknowledged. On `Rejected` the store is unchanged. On
//                 `PartiallyFailed` the value stays committed and writes
//                 already issued are not rolled back.
// Failure modes: `SetError::Validation`, `SetError::CheckFailed`,
//                `SetError::PartiallyFailed`.
// Side effects: register writes through the sink; one log event per failure.

use std::fmt;

use crate::error::{ActionFailure, SetError};
use crate::eval::{evaluate, evaluate_pure, Effects};
use crate::id::ArgId;
use crate::log::{LogEvent, LogSink, Severity};
use crate::schema::{ArgDefinition, BlockSchema};
use crate::sink::{RegisterSink, RegisterWrite};
use crate::store::ArgumentStore;
use crate::value::Value;

// ── Public types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetPhase {
    Pending,
    Checking,
    Rejected,
    Committing,
    Acting,
    Completed,
    PartiallyFailed,
}

impl fmt::Display for SetPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SetPhase::Pending => "pending",
            SetPhase::Checking => "checking",
            SetPhase::Rejected => "rejected",
            SetPhase::Committing => "committing",
            SetPhase::Acting => "acting",
            SetPhase::Completed => "completed",
            SetPhase::PartiallyFailed => "partially failed",
        };
        write!(f, "{name}")
    }
}

/// A completed set request.
#[derive(Debug, Clone, PartialEq)]
pub struct SetReport {
    pub arg: String,
    pub value: Value,
    /// Writes acknowledged by the sink, in issue order.
    pub writes: Vec<RegisterWrite>,
}

/// Everything a set request needs besides the mutable instance state.
pub struct SetContext<'a> {
    pub schema: &'a BlockSchema,
    /// Instance identity used in log events.
    pub instance: &'a str,
    pub log: &'a dyn LogSink,
}

// ── Entry point ─────────────────────────────────────────────────────────────

pub fn execute_set(
    ctx: &SetContext<'_>,
    store: &mut ArgumentStore,
    sink: &mut dyn RegisterSink,
    id: ArgId,
    candidate: Value,
) -> Result<SetReport, SetError> {
    let arg = ctx.schema.arg(id);
    let mut run = Run {
        ctx,
        arg,
        phase: SetPhase::Pending,
    };

    run.enter(SetPhase::Checking);
    if let Err(err) = run.check(store, &candidate) {
        run.enter(SetPhase::Rejected);
        run.report(&err);
        return Err(err);
    }

    run.enter(SetPhase::Committing);
    store.commit(id, candidate.clone());

    run.enter(SetPhase::Acting);
    let mut effects = SinkEffects {
        sink,
        issued: Vec::new(),
    };
    let outcome = match &arg.action {
        Some(action) => evaluate(ctx.schema, &action.root, &*store, &mut effects).map(drop),
        None => Ok(()),
    };
    match outcome {
        Ok(()) => {
            run.enter(SetPhase::Completed);
            Ok(SetReport {
                arg: arg.name.clone(),
                value: candidate,
                writes: effects.issued,
            })
        }
        Err(cause) => {
            run.enter(SetPhase::PartiallyFailed);
            let err = SetError::PartiallyFailed {
                arg: arg.name.clone(),
                issued: effects.issued,
                cause,
            };
            run.report(&err);
            Err(err)
        }
    }
}

// ── Internals ───────────────────────────────────────────────────────────────

struct Run<'a> {
    ctx: &'a SetContext<'a>,
    arg: &'a ArgDefinition,
    phase: SetPhase,
}

impl Run<'_> {
    fn enter(&mut self, phase: SetPhase) {
        if self.ctx.log.enabled(Severity::Trace) {
            self.event(Severity::Trace, format!("{} -> {}", self.phase, phase));
        }
        self.phase = phase;
    }

    fn event(&self, severity: Severity, message: String) {
        self.ctx.log.log(LogEvent {
            severity,
            component: self.ctx.instance.to_string(),
            argument: Some(self.arg.name.clone()),
            message,
        });
    }

    fn report(&self, err: &SetError) {
        let severity = match err {
            SetError::Validation { .. } | SetError::UnknownArgument(_) => Severity::Warning,
            SetError::CheckFailed { .. } | SetError::PartiallyFailed { .. } => Severity::Error,
        };
        self.event(severity, err.to_string());
    }

    fn check(&self, store: &ArgumentStore, candidate: &Value) -> Result<(), SetError> {
        let arg = self.arg;
        if !arg.ty.accepts(candidate) {
            return Err(SetError::Validation {
                arg: arg.name.clone(),
                message: format!("expected {} value, got {}", arg.ty, candidate.kind()),
            });
        }
        let Some(check) = &arg.check else {
            return Ok(());
        };
        let env = store.with_candidate(arg.id, candidate);
        match evaluate_pure(self.ctx.schema, &check.root, &env) {
            Ok(value) if value.is_truthy() => Ok(()),
            Ok(_) => Err(SetError::Validation {
                arg: arg.name.clone(),
                message: arg.rejection_message(candidate),
            }),
            Err(source) => Err(SetError::CheckFailed {
                arg: arg.name.clone(),
                source,
            }),
        }
    }
}

/// Forwards writes to the sink and remembers the acknowledged ones.
struct SinkEffects<'a> {
    sink: &'a mut dyn RegisterSink,
    issued: Vec<RegisterWrite>,
}

impl Effects for SinkEffects<'_> {
    fn write(&mut self, write: RegisterWrite) -> Result<(), ActionFailure> {
        self.sink.write(&write)?;
        self.issued.push(write);
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
