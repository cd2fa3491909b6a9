// block.rs — Block instance: one configured block on the device
//
// An instance owns its argument store and its register sink behind a single
// mutex. A set request holds the lock from check to last write, so requests
// never interleave and readers never observe a half-applied set. Instances
// of one block type share only the immutable schema.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::error::{HardwareError, SetError};
use crate::executor::{execute_set, SetContext, SetReport};
use crate::log::{LogEvent, LogSink, Severity};
use crate::ports::{resolve_port, resolve_ports, PortError, ResolvedPort};
use crate::schema::BlockSchema;
use crate::sink::RegisterSink;
use crate::store::ArgumentStore;
use crate::value::Value;

/// A default failed while the instance was being constructed.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot instantiate {instance}: {source}")]
pub struct InstantiateError {
    pub instance: String,
    pub source: SetError,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadbackError {
    #[error("unknown readback register '{0}'")]
    UnknownRegister(String),

    #[error(transparent)]
    Hardware(#[from] HardwareError),
}

struct InstanceState {
    store: ArgumentStore,
    sink: Box<dyn RegisterSink>,
}

pub struct BlockInstance {
    schema: Arc<BlockSchema>,
    name: String,
    log: Arc<dyn LogSink>,
    state: Mutex<InstanceState>,
}

impl BlockInstance {
    /// Create an instance and apply every default in declaration order.
    ///
    /// Each default goes through the full set sequence, so its action's
    /// register writes reach `sink` before this returns.
    pub fn new(
        schema: Arc<BlockSchema>,
        name: impl Into<String>,
        mut sink: Box<dyn RegisterSink>,
        log: Arc<dyn LogSink>,
    ) -> Result<Self, InstantiateError> {
        let name = name.into();
        let mut store = ArgumentStore::new(schema.args().len());
        {
            let ctx = SetContext {
                schema: &schema,
                instance: &name,
                log: log.as_ref(),
            };
            for arg in schema.args() {
                execute_set(&ctx, &mut store, sink.as_mut(), arg.id, arg.default.clone()).map_err(
                    |source| InstantiateError {
                        instance: name.clone(),
                        source,
                    },
                )?;
            }
        }
        if log.enabled(Severity::Debug) {
            log.log(LogEvent {
                severity: Severity::Debug,
                component: name.clone(),
                argument: None,
                message: format!("initialized {} argument(s)", store.len()),
            });
        }
        Ok(BlockInstance {
            schema,
            name,
            log,
            state: Mutex::new(InstanceState { store, sink }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Arc<BlockSchema> {
        &self.schema
    }

    fn lock(&self) -> MutexGuard<'_, InstanceState> {
        // A panic mid-set leaves a committed store; keep serving it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run the set protocol for one argument.
    pub fn set_arg(&self, name: &str, value: Value) -> Result<SetReport, SetError> {
        let Some(id) = self.schema.arg_id(name) else {
            return Err(self.reject(name, SetError::UnknownArgument(name.to_string())));
        };
        let ctx = SetContext {
            schema: &self.schema,
            instance: &self.name,
            log: self.log.as_ref(),
        };
        let mut state = self.lock();
        let InstanceState { store, sink } = &mut *state;
        execute_set(&ctx, store, &mut **sink, id, value)
    }

    /// Set an argument from its textual form, parsed per the declared type.
    pub fn set_arg_str(&self, name: &str, literal: &str) -> Result<SetReport, SetError> {
        let Some(arg) = self.schema.arg_by_name(name) else {
            return self.set_arg(name, Value::Str(literal.to_string()));
        };
        match arg.ty.parse_literal(literal) {
            Some(value) => self.set_arg(name, value),
            None => Err(self.reject(
                name,
                SetError::Validation {
                    arg: name.to_string(),
                    message: format!("'{}' is not a valid {} value", literal, arg.ty),
                },
            )),
        }
    }

    /// Log a request turned away before the set protocol started.
    fn reject(&self, name: &str, err: SetError) -> SetError {
        self.log.log(LogEvent {
            severity: Severity::Warning,
            component: self.name.clone(),
            argument: Some(name.to_string()),
            message: err.to_string(),
        });
        err
    }

    /// Committed value of an argument.
    pub fn get_arg(&self, name: &str) -> Option<Value> {
        let id = self.schema.arg_id(name)?;
        self.lock().store.get(id).cloned()
    }

    /// Every argument with its committed value, in declaration order.
    pub fn args(&self) -> Vec<(String, Value)> {
        let state = self.lock();
        self.schema
            .args()
            .iter()
            .filter_map(|arg| Some((arg.name.clone(), state.store.get(arg.id)?.clone())))
            .collect()
    }

    pub fn port(&self, name: &str) -> Result<ResolvedPort, PortError> {
        let port = self
            .schema
            .port(name)
            .ok_or_else(|| PortError::UnknownPort(name.to_string()))?;
        resolve_port(&self.schema, port, &self.lock().store)
    }

    pub fn ports(&self) -> Result<Vec<ResolvedPort>, PortError> {
        resolve_ports(&self.schema, &self.lock().store)
    }

    /// Read a readback register through the sink.
    pub fn read_register(&self, name: &str) -> Result<u64, ReadbackError> {
        let register = self
            .schema
            .readback_register(name)
            .ok_or_else(|| ReadbackError::UnknownRegister(name.to_string()))?;
        Ok(self.lock().sink.read(register)?)
    }
}

impl std::fmt::Debug for BlockInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockInstance")
            .field("name", &self.name)
            .field("block", &self.schema.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Descriptor;
    use crate::error::SetErrorKind;
    use crate::log::{MemoryLog, NullLog};
    use crate::sink::RecordingSink;

    const DESC: &str = r#"{
        "name": "Gain", "ids": [{ "id": "1" }],
        "registers": {
            "setreg": [{ "name": "GAIN", "address": 130 }],
            "readback": [{ "name": "RB_GAIN", "address": 130 }]
        },
        "args": [
            { "name": "gain", "type": "int", "value": "3",
              "check": "LE($gain, 255)", "action": "SR_WRITE(\"GAIN\", $gain)" },
            { "name": "label", "type": "string", "value": "main" }
        ],
        "ports": { "source": [{ "name": "out", "type": "sc16", "vlen": "$gain" }] }
    }"#;

    fn schema() -> Arc<BlockSchema> {
        Arc::new(BlockSchema::from_descriptor(&Descriptor::from_json(DESC).unwrap()).unwrap())
    }

    #[test]
    fn defaults_applied_through_actions() {
        let sink = RecordingSink::new();
        let journal = sink.journal();
        let block = BlockInstance::new(schema(), "0/Gain#0", Box::new(sink), Arc::new(NullLog)).unwrap();
        assert_eq!(journal.snapshot()[0].to_string(), "GAIN := 3");
        assert_eq!(
            block.args(),
            vec![
                ("gain".to_string(), Value::Int(3)),
                ("label".to_string(), Value::Str("main".into())),
            ]
        );
    }

    #[test]
    fn default_failing_in_hardware_aborts_construction() {
        let sink = RecordingSink::new().fail_after(0);
        let err = BlockInstance::new(schema(), "0/Gain#0", Box::new(sink), Arc::new(NullLog)).unwrap_err();
        assert_eq!(err.source.kind(), SetErrorKind::PartiallyFailed);
        assert!(err.to_string().starts_with("cannot instantiate 0/Gain#0: gain:"));
    }

    #[test]
    fn set_from_text() {
        let block =
            BlockInstance::new(schema(), "g", Box::new(RecordingSink::new()), Arc::new(NullLog)).unwrap();
        let report = block.set_arg_str("gain", "0x10").unwrap();
        assert_eq!(report.value, Value::Int(16));
        assert_eq!(block.get_arg("gain"), Some(Value::Int(16)));
        let err = block.set_arg_str("gain", "loud").unwrap_err();
        assert_eq!(err.kind(), SetErrorKind::Validation);
        assert_eq!(block.get_arg("gain"), Some(Value::Int(16)));
    }

    #[test]
    fn unknown_argument_logged() {
        let log = Arc::new(MemoryLog::default());
        let block = BlockInstance::new(schema(), "g", Box::new(RecordingSink::new()), log.clone()).unwrap();
        let err = block.set_arg("volume", Value::Int(1)).unwrap_err();
        assert_eq!(err, SetError::UnknownArgument("volume".into()));
        assert_eq!(log.events().len(), 1);
        assert_eq!(block.get_arg("volume"), None);
    }

    #[test]
    fn unparseable_text_logged() {
        let log = Arc::new(MemoryLog::default());
        let block = BlockInstance::new(schema(), "g", Box::new(RecordingSink::new()), log.clone()).unwrap();
        let err = block.set_arg_str("gain", "big").unwrap_err();
        assert_eq!(err.kind(), SetErrorKind::Validation);
        let events = log.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].severity, Severity::Warning);
        assert_eq!(events[0].argument.as_deref(), Some("gain"));
        assert_eq!(events[0].message, err.to_string());
        assert_eq!(block.get_arg("gain"), Some(Value::Int(3)));
    }

    #[test]
    fn ports_follow_store() {
        let block =
            BlockInstance::new(schema(), "g", Box::new(RecordingSink::new()), Arc::new(NullLog)).unwrap();
        assert_eq!(block.port("out").unwrap().vlen, 3);
        block.set_arg("gain", Value::Int(7)).unwrap();
        assert_eq!(block.port("out").unwrap().vlen, 7);
        assert_eq!(block.port("in"), Err(PortError::UnknownPort("in".into())));
    }

    #[test]
    fn readback() {
        let sink = RecordingSink::new().with_readback("RB_GAIN", 42);
        let block = BlockInstance::new(schema(), "g", Box::new(sink), Arc::new(NullLog)).unwrap();
        assert_eq!(block.read_register("RB_GAIN"), Ok(42));
        assert_eq!(
            block.read_register("GAIN"),
            Err(ReadbackError::UnknownRegister("GAIN".into()))
        );
    }
}
