// id.rs — Resolved handles into a block schema
//
// Allocated in declaration order while the schema is built. Resolved
// expressions carry these instead of names, so evaluation never performs a
// string lookup for arguments or statically named registers.

use std::fmt;

/// Index of an argument in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArgId(pub u32);

/// Index of a register in the schema's register table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegisterId(pub u32);

/// Index of a port in declaration order (sinks first, then sources).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId(pub u32);

impl ArgId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl RegisterId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl PortId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ArgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "arg#{}", self.0)
    }
}

/// Allocator for schema handles. Produces monotonically increasing IDs in
/// allocation (declaration) order.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next_arg: u32,
    next_register: u32,
    next_port: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_arg(&mut self) -> ArgId {
        let id = ArgId(self.next_arg);
        self.next_arg += 1;
        id
    }

    pub fn alloc_register(&mut self) -> RegisterId {
        let id = RegisterId(self.next_register);
        self.next_register += 1;
        id
    }

    pub fn alloc_port(&mut self) -> PortId {
        let id = PortId(self.next_port);
        self.next_port += 1;
        id
    }
}
