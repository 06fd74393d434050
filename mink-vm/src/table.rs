//! The associative table behind `Value::Table`.

use std::fmt;
use std::sync::{Arc, Mutex};

use hashbrown::HashMap;

use crate::error::Fault;
use crate::sync::lock;
use crate::value::Value;

/// Table storage. Keys hash through the engine's value hash, so a `Long`
/// key and the equal integral `Double` key address the same entry.
#[derive(Debug, Default)]
pub struct Table {
    entries: HashMap<Value, Value>,
}

impl Table {
    /// Empty table.
    pub fn new() -> Self {
        Table::default()
    }

    /// Empty table with reserved capacity.
    pub fn with_capacity(capacity: usize) -> Result<Self, Fault> {
        let mut entries = HashMap::new();
        entries
            .try_reserve(capacity)
            .map_err(|_| Fault::OutOfMemory)?;
        Ok(Table { entries })
    }

    /// Look up `key`; `None` when absent.
    pub fn get(&self, key: &Value) -> Option<Value> {
        self.entries.get(key).cloned()
    }

    /// Store `value` under `key`. Storing `Nil` removes the entry; a `Nil`
    /// key is rejected.
    pub fn set(&mut self, key: Value, value: Value) -> Result<(), Fault> {
        if key.is_nil() {
            return Err(Fault::NilTableKey);
        }
        if value.is_nil() {
            self.entries.remove(&key);
            return Ok(());
        }
        self.entries.try_reserve(1).map_err(|_| Fault::OutOfMemory)?;
        self.entries.insert(key, value);
        Ok(())
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries, stopping when `f` returns `false`.
    pub fn for_each(&self, mut f: impl FnMut(&Value, &Value) -> bool) {
        for (key, value) in &self.entries {
            if !f(key, value) {
                break;
            }
        }
    }
}

/// Shared handle to a table.
#[derive(Clone)]
pub struct TableRef(Arc<Mutex<Table>>);

impl TableRef {
    /// Allocate an empty table.
    pub fn new() -> Self {
        TableRef(Arc::new(Mutex::new(Table::new())))
    }

    /// Allocate a table with reserved capacity.
    pub fn with_capacity(capacity: usize) -> Result<Self, Fault> {
        Ok(TableRef(Arc::new(Mutex::new(Table::with_capacity(
            capacity,
        )?))))
    }

    /// Look up `key`.
    pub fn get(&self, key: &Value) -> Option<Value> {
        lock(&self.0).get(key)
    }

    /// Store `value` under `key`; see [`Table::set`].
    pub fn set(&self, key: Value, value: Value) -> Result<(), Fault> {
        lock(&self.0).set(key, value)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        lock(&self.0).len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        lock(&self.0).is_empty()
    }

    /// Run `f` with the table borrowed.
    pub fn with<R>(&self, f: impl FnOnce(&Table) -> R) -> R {
        f(&lock(&self.0))
    }

    /// Stable identity token.
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &TableRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for TableRef {
    fn default() -> Self {
        TableRef::new()
    }
}

impl fmt::Debug for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableRef(0x{:x})", self.addr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strings::VmString;

    fn s(text: &str) -> Value {
        Value::String(VmString::new(text.as_bytes()).expect("alloc"))
    }

    #[test]
    fn absent_key_is_none() {
        let table = TableRef::new();
        table.set(s("hello"), Value::Long(1)).expect("set");
        assert_eq!(table.get(&s("hello")), Some(Value::Long(1)));
        assert_eq!(table.get(&s("world")), None);
    }

    #[test]
    fn long_and_integral_double_address_the_same_slot() {
        let table = TableRef::new();
        table.set(Value::Long(3), Value::Long(30)).expect("set");
        assert_eq!(table.get(&Value::Double(3.0)), Some(Value::Long(30)));
    }

    #[test]
    fn storing_nil_removes_the_entry() {
        let table = TableRef::new();
        table.set(s("k"), Value::Long(1)).expect("set");
        assert_eq!(table.len(), 1);
        table.set(s("k"), Value::Nil).expect("remove");
        assert_eq!(table.len(), 0);
        assert_eq!(table.get(&s("k")), None);
    }

    #[test]
    fn nil_key_is_rejected() {
        let table = TableRef::new();
        assert_eq!(
            table.set(Value::Nil, Value::Long(1)),
            Err(Fault::NilTableKey)
        );
    }

    #[test]
    fn identity_not_structure() {
        let a = TableRef::new();
        let b = TableRef::new();
        assert!(!a.ptr_eq(&b));
        assert!(a.ptr_eq(&a.clone()));
    }
}
