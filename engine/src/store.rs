// store.rs — Per-instance argument values
//
// Holds the latest committed value of every argument, indexed by `ArgId`.
// A slot is empty until its default commits during construction. No history
// is kept.

use crate::eval::Environment;
use crate::id::ArgId;
use crate::resolve::PortAttr;
use crate::value::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgumentStore {
    values: Vec<Option<Value>>,
}

impl ArgumentStore {
    /// A store with `len` empty slots.
    pub fn new(len: usize) -> Self {
        ArgumentStore {
            values: vec![None; len],
        }
    }

    pub fn get(&self, id: ArgId) -> Option<&Value> {
        self.values.get(id.index()).and_then(Option::as_ref)
    }

    pub fn commit(&mut self, id: ArgId, value: Value) {
        if let Some(slot) = self.values.get_mut(id.index()) {
            *slot = Some(value);
        }
    }

    /// Whether every argument has a committed value.
    pub fn is_complete(&self) -> bool {
        self.values.iter().all(Option::is_some)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The store as seen by a check: `id` temporarily holds `candidate`.
    pub fn with_candidate<'a>(&'a self, id: ArgId, candidate: &'a Value) -> Candidate<'a> {
        Candidate {
            store: self,
            id,
            candidate,
        }
    }
}

impl Environment for ArgumentStore {
    fn arg(&self, id: ArgId) -> Option<&Value> {
        self.get(id)
    }
}

/// Store overlay used while checking a candidate value.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    store: &'a ArgumentStore,
    id: ArgId,
    candidate: &'a Value,
}

impl Environment for Candidate<'_> {
    fn arg(&self, id: ArgId) -> Option<&Value> {
        if id == self.id {
            Some(self.candidate)
        } else {
            self.store.get(id)
        }
    }
}

/// Store plus the already-resolved attributes of one port.
#[derive(Debug, Clone)]
pub struct PortScope<'a> {
    store: &'a ArgumentStore,
    attrs: [Option<Value>; 3],
}

impl<'a> PortScope<'a> {
    pub fn new(store: &'a ArgumentStore) -> Self {
        PortScope {
            store,
            attrs: [None, None, None],
        }
    }

    pub fn set(&mut self, attr: PortAttr, value: Value) {
        self.attrs[attr.index()] = Some(value);
    }
}

impl Environment for PortScope<'_> {
    fn arg(&self, id: ArgId) -> Option<&Value> {
        self.store.get(id)
    }

    fn self_attr(&self, attr: PortAttr) -> Option<&Value> {
        self.attrs[attr.index()].as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty_and_fills() {
        let mut store = ArgumentStore::new(2);
        assert!(!store.is_complete());
        assert_eq!(store.get(ArgId(0)), None);
        store.commit(ArgId(0), Value::Int(256));
        store.commit(ArgId(1), Value::Str("COMPLEX".into()));
        assert!(store.is_complete());
        assert_eq!(store.get(ArgId(0)), Some(&Value::Int(256)));
    }

    #[test]
    fn commit_replaces_value() {
        let mut store = ArgumentStore::new(1);
        store.commit(ArgId(0), Value::Int(1));
        store.commit(ArgId(0), Value::Int(2));
        assert_eq!(store.get(ArgId(0)), Some(&Value::Int(2)));
    }

    #[test]
    fn candidate_overlays_one_slot() {
        let mut store = ArgumentStore::new(2);
        store.commit(ArgId(0), Value::Int(256));
        store.commit(ArgId(1), Value::Int(7));
        let candidate = Value::Int(5000);
        let env = store.with_candidate(ArgId(0), &candidate);
        assert_eq!(env.arg(ArgId(0)), Some(&Value::Int(5000)));
        assert_eq!(env.arg(ArgId(1)), Some(&Value::Int(7)));
        assert_eq!(store.get(ArgId(0)), Some(&Value::Int(256)));
    }

    #[test]
    fn candidate_visible_before_first_commit() {
        let store = ArgumentStore::new(1);
        let candidate = Value::Int(16);
        let env = store.with_candidate(ArgId(0), &candidate);
        assert_eq!(env.arg(ArgId(0)), Some(&Value::Int(16)));
    }

    #[test]
    fn port_scope_exposes_resolved_attrs() {
        let store = ArgumentStore::new(0);
        let mut scope = PortScope::new(&store);
        assert_eq!(scope.self_attr(PortAttr::Vlen), None);
        scope.set(PortAttr::Vlen, Value::Int(512));
        assert_eq!(scope.self_attr(PortAttr::Vlen), Some(&Value::Int(512)));
    }
}
