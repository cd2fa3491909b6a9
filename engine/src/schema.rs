// schema.rs — Block schema: registers, arguments, and ports of one block type
//
// Built once per block type from a descriptor tree and shared by every
// instance. Building resolves every expression against the block's symbol
// table and checks that each default value passes its own check, so no
// defect in the descriptor is discovered while hardware is being touched.
//
// Preconditions: `descriptor` is a deserialized descriptor tree.
// Postconditions: `load` returns a schema iff no error-level diagnostic was
//                 produced; warnings are returned either way.
// Failure modes: duplicate names, unresolved references, unknown primitives,
//                arity and kind errors, bad literals, and self-rejecting
//                defaults are reported as `Diagnostic`s. Loading continues
//                past errors to report as many as possible.
// Side effects: none.

use std::collections::HashMap;
use std::fmt;

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::descriptor::{ArgDesc, Descriptor, PortDesc, RegisterDesc};
use crate::diag::{codes, Diagnostic};
use crate::eval::evaluate_pure;
use crate::id::{ArgId, IdAllocator, PortId, RegisterId};
use crate::resolve::{compile, CompiledExpr, ExprContext, Node, PortAttr, SymbolTable};
use crate::store::ArgumentStore;
use crate::value::{ArgType, Value};

// ── Public types ────────────────────────────────────────────────────────────

/// Block type identity: 64-bit block id plus descriptor revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockKey {
    pub block_id: u64,
    pub revision: u32,
}

impl BlockKey {
    pub fn new(block_id: u64, revision: u32) -> Self {
        BlockKey { block_id, revision }
    }

    /// Parse a hex block id, with or without `0x`.
    pub fn parse_id(text: &str) -> Option<u64> {
        let text = text.trim();
        let digits = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .unwrap_or(text);
        if digits.is_empty() {
            return None;
        }
        u64::from_str_radix(digits, 16).ok()
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}/r{}", self.block_id, self.revision)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterDirection {
    /// Settings register written by actions (`setreg`).
    Writable,
    /// Register read back from the block (`readback`).
    Readback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Register {
    pub id: RegisterId,
    pub name: String,
    pub address: u32,
    pub direction: RegisterDirection,
}

#[derive(Debug, Clone)]
pub struct ArgDefinition {
    pub id: ArgId,
    pub name: String,
    pub ty: ArgType,
    /// Default as written in the descriptor (e.g. `0x100`).
    pub default_literal: String,
    pub default: Value,
    pub check: Option<CompiledExpr>,
    pub check_message: Option<String>,
    pub action: Option<CompiledExpr>,
}

impl ArgDefinition {
    /// Message reported when a candidate value fails the check.
    pub fn rejection_message(&self, candidate: &Value) -> String {
        match &self.check_message {
            Some(message) => message.clone(),
            None => format!("invalid value {} for argument '{}'", candidate, self.name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    /// Input port.
    Sink,
    /// Output port.
    Source,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::Sink => write!(f, "sink"),
            PortDirection::Source => write!(f, "source"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PortDefinition {
    pub id: PortId,
    pub name: String,
    pub direction: PortDirection,
    /// Attribute expressions in evaluation order: type, vlen, pkt_size.
    pub attrs: [CompiledExpr; 3],
}

impl PortDefinition {
    pub fn attr(&self, attr: PortAttr) -> &CompiledExpr {
        &self.attrs[attr.index()]
    }
}

/// Immutable description of one block type.
#[derive(Debug)]
pub struct BlockSchema {
    name: String,
    instance_name: String,
    keys: Vec<BlockKey>,
    registers: Vec<Register>,
    readback: HashMap<String, RegisterId>,
    symbols: SymbolTable,
    args: Vec<ArgDefinition>,
    ports: Vec<PortDefinition>,
    fingerprint: [u8; 32],
}

/// Result of loading a descriptor.
#[derive(Debug)]
pub struct LoadResult {
    pub schema: Option<BlockSchema>,
    pub diagnostics: Vec<Diagnostic>,
}

/// A descriptor that cannot be turned into a schema.
#[derive(Debug, Clone, Error)]
#[error("block '{block}' rejected:{}", render(.diagnostics))]
pub struct SchemaError {
    pub block: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl SchemaError {
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }
}

fn render(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .filter(|d| d.is_error())
        .map(|d| format!("\n  {}", d))
        .collect()
}

// ── Public entry points ─────────────────────────────────────────────────────

/// Build a schema from a descriptor, collecting all diagnostics.
pub fn load(descriptor: &Descriptor) -> LoadResult {
    let mut builder = SchemaBuilder::new(descriptor);
    builder.collect_ids();
    builder.collect_registers();
    builder.declare_args();
    builder.compile_args();
    builder.compile_ports();
    let mut result = builder.finish();
    if let Some(schema) = &result.schema {
        let rejected = validate_defaults(schema);
        if !rejected.is_empty() {
            result.diagnostics.extend(rejected);
            result.schema = None;
        }
    }
    result
}

impl BlockSchema {
    /// Build a schema, failing on any error-level diagnostic.
    pub fn from_descriptor(descriptor: &Descriptor) -> Result<BlockSchema, SchemaError> {
        let result = load(descriptor);
        match result.schema {
            Some(schema) => Ok(schema),
            None => Err(SchemaError {
                block: descriptor.name.clone(),
                diagnostics: result.diagnostics,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name given to instances of this block type.
    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    /// Instance identity in `device/Name#index` form, e.g. `0/FFT#0`.
    pub fn instance_id(&self, device: usize, index: usize) -> String {
        format!("{}/{}#{}", device, self.instance_name, index)
    }

    pub fn keys(&self) -> &[BlockKey] {
        &self.keys
    }

    /// SHA-256 of the descriptor's canonical JSON.
    pub fn fingerprint(&self) -> &[u8; 32] {
        &self.fingerprint
    }

    pub fn fingerprint_hex(&self) -> String {
        self.fingerprint.iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn registers(&self) -> &[Register] {
        &self.registers
    }

    pub fn register(&self, id: RegisterId) -> &Register {
        &self.registers[id.index()]
    }

    pub fn writable_register(&self, name: &str) -> Option<&Register> {
        self.symbols.writable.get(name).map(|id| self.register(*id))
    }

    pub fn readback_register(&self, name: &str) -> Option<&Register> {
        self.readback.get(name).map(|id| self.register(*id))
    }

    pub fn args(&self) -> &[ArgDefinition] {
        &self.args
    }

    pub fn arg(&self, id: ArgId) -> &ArgDefinition {
        &self.args[id.index()]
    }

    pub fn arg_id(&self, name: &str) -> Option<ArgId> {
        self.symbols.args.get(name).map(|(id, _)| *id)
    }

    pub fn arg_by_name(&self, name: &str) -> Option<&ArgDefinition> {
        self.arg_id(name).map(|id| self.arg(id))
    }

    pub fn ports(&self) -> &[PortDefinition] {
        &self.ports
    }

    pub fn port(&self, name: &str) -> Option<&PortDefinition> {
        self.ports.iter().find(|p| p.name == name)
    }

    /// Symbol table used to resolve this block's expressions.
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }
}

// ── Builder ─────────────────────────────────────────────────────────────────

struct SchemaBuilder<'a> {
    descriptor: &'a Descriptor,
    diagnostics: Vec<Diagnostic>,
    ids: IdAllocator,
    keys: Vec<BlockKey>,
    registers: Vec<Register>,
    readback: HashMap<String, RegisterId>,
    symbols: SymbolTable,
    /// Argument descriptors that declared cleanly, with their parsed defaults.
    declared: Vec<(ArgId, &'a ArgDesc, ArgType, Value)>,
    args: Vec<ArgDefinition>,
    ports: Vec<PortDefinition>,
}

impl<'a> SchemaBuilder<'a> {
    fn new(descriptor: &'a Descriptor) -> Self {
        SchemaBuilder {
            descriptor,
            diagnostics: Vec::new(),
            ids: IdAllocator::new(),
            keys: Vec::new(),
            registers: Vec::new(),
            readback: HashMap::new(),
            symbols: SymbolTable::default(),
            declared: Vec::new(),
            args: Vec::new(),
            ports: Vec::new(),
        }
    }

    fn collect_ids(&mut self) {
        for entry in &self.descriptor.ids {
            match BlockKey::parse_id(&entry.id) {
                Some(block_id) => self.keys.push(BlockKey::new(block_id, entry.revision)),
                None => self.diagnostics.push(
                    Diagnostic::error("ids", format!("invalid block id '{}'", entry.id))
                        .with_code(codes::BAD_BLOCK_ID)
                        .with_hint("block ids are up to 16 hex digits"),
                ),
            }
        }
        if self.descriptor.ids.is_empty() {
            self.diagnostics.push(
                Diagnostic::warning("ids", "descriptor declares no block id")
                    .with_code(codes::NO_IDS)
                    .with_hint("the schema can only be looked up by name"),
            );
        }
    }

    fn collect_registers(&mut self) {
        let desc = self.descriptor;
        self.collect_register_set(&desc.registers.setreg, RegisterDirection::Writable);
        self.collect_register_set(&desc.registers.readback, RegisterDirection::Readback);
    }

    fn collect_register_set(&mut self, entries: &[RegisterDesc], direction: RegisterDirection) {
        let (kind, origin) = match direction {
            RegisterDirection::Writable => ("setreg", "registers.setreg"),
            RegisterDirection::Readback => ("readback", "registers.readback"),
        };
        let mut addresses: HashMap<u32, &str> = HashMap::new();
        for entry in entries {
            let names = match direction {
                RegisterDirection::Writable => &self.symbols.writable,
                RegisterDirection::Readback => &self.readback,
            };
            if names.contains_key(&entry.name) {
                self.diagnostics.push(
                    Diagnostic::error(origin, format!("duplicate {} register '{}'", kind, entry.name))
                        .with_code(codes::DUPLICATE_REGISTER),
                );
                continue;
            }
            if let Some(first) = addresses.insert(entry.address, &entry.name) {
                self.diagnostics.push(
                    Diagnostic::warning(
                        origin,
                        format!(
                            "register '{}' shares address {} with '{}'",
                            entry.name, entry.address, first
                        ),
                    )
                    .with_code(codes::ALIASED_ADDRESS),
                );
            }
            let id = self.ids.alloc_register();
            self.registers.push(Register {
                id,
                name: entry.name.clone(),
                address: entry.address,
                direction,
            });
            match direction {
                RegisterDirection::Writable => self.symbols.writable.insert(entry.name.clone(), id),
                RegisterDirection::Readback => self.readback.insert(entry.name.clone(), id),
            };
        }
    }

    /// Declare every argument before compiling any expression, so
    /// expressions may name arguments declared after them.
    fn declare_args(&mut self) {
        let desc = self.descriptor;
        for arg in &desc.args {
            let origin = format!("arg '{}'", arg.name);
            if self.symbols.args.contains_key(&arg.name) {
                self.diagnostics.push(
                    Diagnostic::error(origin, format!("duplicate argument '{}'", arg.name))
                        .with_code(codes::DUPLICATE_ARG),
                );
                continue;
            }
            let Some(ty) = ArgType::from_name(&arg.ty) else {
                self.diagnostics.push(
                    Diagnostic::error(origin, format!("unsupported argument type '{}'", arg.ty))
                        .with_code(codes::BAD_ARG_TYPE)
                        .with_hint("supported types: int, string"),
                );
                continue;
            };
            let Some(default) = ty.parse_literal(&arg.value) else {
                self.diagnostics.push(
                    Diagnostic::error(
                        origin,
                        format!("default '{}' is not a valid {} literal", arg.value, ty),
                    )
                    .with_code(codes::BAD_DEFAULT),
                );
                continue;
            };
            let id = self.ids.alloc_arg();
            self.symbols.args.insert(arg.name.clone(), (id, ty));
            self.declared.push((id, arg, ty, default));
        }
    }

    fn compile_args(&mut self) {
        let declared = std::mem::take(&mut self.declared);
        for (id, arg, ty, default) in declared {
            let check = self.compile_optional(
                arg.check.as_deref(),
                ExprContext::Check,
                &format!("arg '{}' check", arg.name),
            );
            let action = self.compile_optional(
                arg.action.as_deref(),
                ExprContext::Action,
                &format!("arg '{}' action", arg.name),
            );
            self.args.push(ArgDefinition {
                id,
                name: arg.name.clone(),
                ty,
                default_literal: arg.value.clone(),
                default,
                check,
                check_message: arg.check_message.clone(),
                action,
            });
        }
    }

    fn compile_optional(
        &mut self,
        source: Option<&str>,
        context: ExprContext,
        origin: &str,
    ) -> Option<CompiledExpr> {
        let source = source.map(str::trim).filter(|s| !s.is_empty())?;
        compile(source, context, &self.symbols, origin, &mut self.diagnostics)
    }

    fn compile_ports(&mut self) {
        let desc = self.descriptor;
        let groups = [
            (PortDirection::Sink, &desc.ports.sink),
            (PortDirection::Source, &desc.ports.source),
        ];
        for (direction, entries) in groups {
            let mut seen: Vec<&str> = Vec::new();
            for entry in entries.iter() {
                if seen.contains(&entry.name.as_str()) {
                    self.diagnostics.push(
                        Diagnostic::error(
                            format!("port '{}'", entry.name),
                            format!("duplicate {} port '{}'", direction, entry.name),
                        )
                        .with_code(codes::DUPLICATE_PORT),
                    );
                    continue;
                }
                seen.push(&entry.name);
                if let Some(port) = self.compile_port(direction, entry) {
                    self.ports.push(port);
                }
            }
        }
    }

    fn compile_port(&mut self, direction: PortDirection, entry: &PortDesc) -> Option<PortDefinition> {
        let texts = [&entry.ty, &entry.vlen, &entry.pkt_size];
        let mut compiled = Vec::with_capacity(3);
        for (attr, text) in PortAttr::ORDER.into_iter().zip(texts) {
            let origin = format!("port '{}' {}", entry.name, attr.name());
            compiled.push(self.compile_port_attr(text, attr, &origin));
        }
        let attrs: Vec<CompiledExpr> = compiled.into_iter().collect::<Option<_>>()?;
        let attrs: [CompiledExpr; 3] = attrs.try_into().ok()?;
        Some(PortDefinition {
            id: self.ids.alloc_port(),
            name: entry.name.clone(),
            direction,
            attrs,
        })
    }

    /// A bare word (`sc16`) is a string literal; anything else is an expression.
    fn compile_port_attr(&mut self, text: &str, attr: PortAttr, origin: &str) -> Option<CompiledExpr> {
        let text = text.trim();
        let compiled = if is_bare_word(text) {
            CompiledExpr::literal(Value::Str(text.to_string()))
        } else {
            compile(text, ExprContext::Port(attr), &self.symbols, origin, &mut self.diagnostics)?
        };
        let found = match &compiled.root {
            Node::Const(value) => Some(value.kind()),
            Node::Arg(id) => self
                .symbols
                .args
                .values()
                .find(|(arg, _)| arg == id)
                .map(|(_, ty)| ty.kind()),
            Node::SelfAttr(other) => Some(other.kind()),
            Node::Call { prim, .. } => prim.result_kind(),
            Node::Write { .. } => None,
        };
        match found {
            Some(found) if found != attr.kind() => {
                self.diagnostics.push(
                    Diagnostic::error(
                        origin,
                        format!("{} must be a {}, found {}", attr.name(), attr.kind(), found),
                    )
                    .with_code(codes::KIND_MISMATCH),
                );
                None
            }
            _ => Some(compiled),
        }
    }

    fn finish(self) -> LoadResult {
        let has_errors = self.diagnostics.iter().any(Diagnostic::is_error);
        let schema = (!has_errors).then(|| BlockSchema {
            name: self.descriptor.name.clone(),
            instance_name: self.descriptor.instance_name().to_string(),
            keys: self.keys,
            registers: self.registers,
            readback: self.readback,
            symbols: self.symbols,
            args: self.args,
            ports: self.ports,
            fingerprint: Sha256::digest(self.descriptor.canonical_json().as_bytes()).into(),
        });
        LoadResult {
            schema,
            diagnostics: self.diagnostics,
        }
    }
}

/// Run each default through its own check, in declaration order, against a
/// store that fills in as defaults are accepted.
fn validate_defaults(schema: &BlockSchema) -> Vec<Diagnostic> {
    let mut store = ArgumentStore::new(schema.args().len());
    let mut rejected = Vec::new();
    for arg in schema.args() {
        if let Some(check) = &arg.check {
            let env = store.with_candidate(arg.id, &arg.default);
            let origin = format!("arg '{}' default", arg.name);
            match evaluate_pure(schema, &check.root, &env) {
                Ok(value) if value.is_truthy() => {}
                Ok(_) => rejected.push(
                    Diagnostic::error(
                        origin,
                        format!(
                            "default '{}' fails its own check: {}",
                            arg.default_literal,
                            arg.rejection_message(&arg.default)
                        ),
                    )
                    .with_code(codes::DEFAULT_REJECTED),
                ),
                Err(err) => rejected.push(
                    Diagnostic::error(origin, format!("check of default failed: {}", err))
                        .with_code(codes::DEFAULT_EVAL)
                        .with_hint("a check may only read arguments declared before it"),
                ),
            }
        }
        store.commit(arg.id, arg.default.clone());
    }
    rejected
}

fn is_bare_word(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl fmt::Display for BlockSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block {}", self.name)?;
        if self.instance_name != self.name {
            write!(f, " as {}", self.instance_name)?;
        }
        writeln!(f)?;
        for key in &self.keys {
            writeln!(f, "  id {}", key)?;
        }
        for reg in &self.registers {
            let kind = match reg.direction {
                RegisterDirection::Writable => "setreg",
                RegisterDirection::Readback => "readback",
            };
            writeln!(f, "  {} {} @ {}", kind, reg.name, reg.address)?;
        }
        for arg in &self.args {
            writeln!(f, "  arg {}: {} = {}", arg.name, arg.ty, arg.default)?;
            if let Some(check) = &arg.check {
                writeln!(f, "    check {}", check)?;
            }
            if let Some(action) = &arg.action {
                writeln!(f, "    action {}", action)?;
            }
        }
        for port in &self.ports {
            write!(f, "  {} {}:", port.direction, port.name)?;
            for attr in PortAttr::ORDER {
                write!(f, " {}={}", attr.name(), port.attr(attr))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
