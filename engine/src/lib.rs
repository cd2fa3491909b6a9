// nocs — NocScript block engine
//
// Library root. Descriptors flow through the modules in this order:
// descriptor → lexer/parser → resolve → schema → (store, eval) → executor
// → block. The registry and the CLI sit on top.

pub mod ast;
pub mod block;
pub mod descriptor;
pub mod diag;
pub mod error;
pub mod eval;
pub mod executor;
pub mod id;
pub mod lexer;
pub mod log;
pub mod parser;
pub mod ports;
pub mod primitives;
pub mod registry;
pub mod resolve;
pub mod schema;
pub mod sink;
pub mod store;
pub mod value;

pub use block::{BlockInstance, InstantiateError, ReadbackError};
pub use descriptor::Descriptor;
pub use error::{ActionFailure, EvalError, HardwareError, SetError, SetErrorKind};
pub use executor::SetReport;
pub use log::{LogEvent, LogSink, MemoryLog, NullLog, Severity, TracingLog};
pub use ports::{PortError, ResolvedPort};
pub use registry::{RegistryError, SchemaRegistry};
pub use schema::{BlockKey, BlockSchema, SchemaError};
pub use sink::{RecordingSink, RegisterSink, RegisterWrite, WriteJournal};
pub use value::{ArgType, Value};
