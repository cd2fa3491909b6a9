// ports.rs — Port binder
//
// Resolves a port's type, vlen and pkt_size against the current argument
// store. Attributes are evaluated in that fixed order so `%type` and `%vlen`
// are available to the attributes after them.
//
// Preconditions: `port` belongs to `schema`; `store` holds every argument.
// Postconditions: the returned attributes reflect `store` at call time.
// Failure modes: an attribute that fails to evaluate, or evaluates to the
//                wrong kind or a negative size, is a `PortError`.
// Side effects: none.

use std::fmt;

use thiserror::Error;

use crate::error::EvalError;
use crate::eval::{evaluate_pure, Environment};
use crate::resolve::PortAttr;
use crate::schema::{BlockSchema, PortDefinition, PortDirection};
use crate::store::{ArgumentStore, PortScope};
use crate::value::{Value, ValueKind};

/// Concrete attributes of one port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPort {
    pub name: String,
    pub direction: PortDirection,
    pub item_type: String,
    pub vlen: u64,
    pub pkt_size: u64,
}

impl fmt::Display for ResolvedPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: type={} vlen={} pkt_size={}",
            self.direction, self.name, self.item_type, self.vlen, self.pkt_size
        )
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PortError {
    #[error("unknown port '{0}'")]
    UnknownPort(String),

    #[error("port '{port}' {attr}: {source}")]
    Evaluation {
        port: String,
        attr: &'static str,
        source: EvalError,
    },

    #[error("port '{port}' {attr}: expected {expected}, found {found}")]
    Kind {
        port: String,
        attr: &'static str,
        expected: ValueKind,
        found: Value,
    },
}

pub fn resolve_port(
    schema: &BlockSchema,
    port: &PortDefinition,
    store: &ArgumentStore,
) -> Result<ResolvedPort, PortError> {
    let mut scope = PortScope::new(store);
    for attr in PortAttr::ORDER {
        let value = evaluate_pure(schema, &port.attr(attr).root, &scope).map_err(|source| {
            PortError::Evaluation {
                port: port.name.clone(),
                attr: attr.name(),
                source,
            }
        })?;
        let well_formed = match &value {
            Value::Int(v) => attr.kind() == ValueKind::Int && *v >= 0,
            other => attr.kind() == other.kind(),
        };
        if !well_formed {
            return Err(PortError::Kind {
                port: port.name.clone(),
                attr: attr.name(),
                expected: attr.kind(),
                found: value,
            });
        }
        scope.set(attr, value);
    }

    let item_type = match scope.self_attr(PortAttr::Type) {
        Some(Value::Str(s)) => s.clone(),
        _ => String::new(),
    };
    let size = |attr| match scope.self_attr(attr) {
        Some(Value::Int(v)) => u64::try_from(*v).unwrap_or(0),
        _ => 0,
    };
    Ok(ResolvedPort {
        name: port.name.clone(),
        direction: port.direction,
        item_type,
        vlen: size(PortAttr::Vlen),
        pkt_size: size(PortAttr::PktSize),
    })
}

/// Resolve every port of the block, in declaration order.
pub fn resolve_ports(
    schema: &BlockSchema,
    store: &ArgumentStore,
) -> Result<Vec<ResolvedPort>, PortError> {
    schema
        .ports()
        .iter()
        .map(|port| resolve_port(schema, port, store))
        .collect()
}
