// sink.rs — Register sink collaborator
//
// The engine hands every register write to a `RegisterSink` in emission
// order. The sink owns the transport (bus, crossbar, simulator); the schema
// has already resolved the register address.
//
// `RecordingSink` keeps an in-memory journal and can be told to start
// failing after a number of writes. It backs the CLI and the tests.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::HardwareError;
use crate::schema::Register;

/// One register write produced by an action.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegisterWrite {
    pub register: String,
    pub address: u32,
    pub value: u32,
}

impl fmt::Display for RegisterWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} := {}", self.register, self.value)
    }
}

/// Transport for register transactions.
///
/// `write` returning `Ok` is the acknowledgement: the executor issues the
/// next write only after it. A call may block; timeouts are the sink's
/// business.
pub trait RegisterSink: Send {
    fn write(&mut self, write: &RegisterWrite) -> Result<(), HardwareError>;

    fn read(&mut self, register: &Register) -> Result<u64, HardwareError>;
}

/// Shared view of the writes a `RecordingSink` accepted.
#[derive(Debug, Clone, Default)]
pub struct WriteJournal(Arc<Mutex<Vec<RegisterWrite>>>);

impl WriteJournal {
    fn push(&self, write: RegisterWrite) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(write);
    }

    /// Copy of every write accepted so far.
    pub fn snapshot(&self) -> Vec<RegisterWrite> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Drain the journal.
    pub fn take(&self) -> Vec<RegisterWrite> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory sink that journals writes and serves readback values.
#[derive(Debug, Default)]
pub struct RecordingSink {
    journal: WriteJournal,
    fail_after: Option<usize>,
    accepted: usize,
    readback: HashMap<String, u64>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `count` more writes, then fail every subsequent one.
    pub fn fail_after(mut self, count: usize) -> Self {
        self.fail_after = Some(self.accepted + count);
        self
    }

    /// Value returned when the named readback register is read.
    pub fn with_readback(mut self, register: impl Into<String>, value: u64) -> Self {
        self.readback.insert(register.into(), value);
        self
    }

    pub fn journal(&self) -> WriteJournal {
        self.journal.clone()
    }
}

impl RegisterSink for RecordingSink {
    fn write(&mut self, write: &RegisterWrite) -> Result<(), HardwareError> {
        if self.fail_after.is_some_and(|limit| self.accepted >= limit) {
            return Err(HardwareError {
                register: write.register.clone(),
                message: "injected write failure".to_string(),
            });
        }
        self.accepted += 1;
        self.journal.push(write.clone());
        Ok(())
    }

    fn read(&mut self, register: &Register) -> Result<u64, HardwareError> {
        self.readback
            .get(&register.name)
            .copied()
            .ok_or_else(|| HardwareError {
                register: register.name.clone(),
                message: "no readback value available".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(register: &str, value: u32) -> RegisterWrite {
        RegisterWrite {
            register: register.to_string(),
            address: 0,
            value,
        }
    }

    #[test]
    fn journal_records_in_order() {
        let mut sink = RecordingSink::new();
        let journal = sink.journal();
        sink.write(&write("A", 1)).unwrap();
        sink.write(&write("B", 2)).unwrap();
        assert_eq!(journal.snapshot(), vec![write("A", 1), write("B", 2)]);
        assert_eq!(journal.take().len(), 2);
        assert!(journal.is_empty());
    }

    #[test]
    fn fail_after_rejects_later_writes() {
        let mut sink = RecordingSink::new().fail_after(1);
        let journal = sink.journal();
        assert!(sink.write(&write("A", 1)).is_ok());
        let err = sink.write(&write("B", 2)).unwrap_err();
        assert_eq!(err.register, "B");
        assert_eq!(journal.len(), 1);
    }

    #[test]
    fn display_write() {
        assert_eq!(write("FFT_SIZE_LOG2", 8).to_string(), "FFT_SIZE_LOG2 := 8");
    }
}
