//! Collector façade.
//!
//! The execution core requires a narrow contract from the collector: typed
//! descriptor registration (idempotent per VM), object and array allocation,
//! field/array-slot write barriers, and root registration by handle. This
//! implementation is a reference-counting collector: values own their heap
//! objects through shared handles, the barriers maintain the collector-visible
//! mirror slots scanned alongside the register files and operand stacks, and
//! the root set pins objects that must stay live independently of any stack.

use std::any::TypeId;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use hashbrown::HashMap;

use crate::closure::Closure;
use crate::coroutine::Coroutine;
use crate::error::Fault;
use crate::strings::VmString;
use crate::sync::lock;
use crate::table::TableRef;
use crate::userdata::{GcObject, UserdataRef};
use crate::value::Value;

/// Identifier of a registered type descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorId(u32);

/// Handle to an entry of the root set. Removing a root consumes the handle.
#[derive(Debug)]
pub struct RootRef(usize);

/// Heap object handle as seen by the collector's mirror slots.
#[derive(Debug, Clone)]
pub enum ObjectRef {
    /// String storage.
    String(VmString),
    /// Table storage.
    Table(TableRef),
    /// Closure storage.
    Closure(Closure),
    /// Coroutine storage.
    Coroutine(Coroutine),
    /// Full userdata buffer.
    Userdata(UserdataRef),
    /// Collector-managed host object.
    GcUserdata(GcObject),
}

impl ObjectRef {
    /// Identity token of the referenced object.
    pub fn addr(&self) -> usize {
        match self {
            ObjectRef::String(s) => s.addr(),
            ObjectRef::Table(t) => t.addr(),
            ObjectRef::Closure(c) => c.addr(),
            ObjectRef::Coroutine(c) => c.addr(),
            ObjectRef::Userdata(u) => u.addr(),
            ObjectRef::GcUserdata(o) => o.addr(),
        }
    }
}

#[derive(Debug, Default)]
struct RootSet {
    slots: Vec<Option<Value>>,
    free: Vec<usize>,
}

/// The collector.
#[derive(Default)]
pub struct Heap {
    descriptors: Mutex<HashMap<(TypeId, &'static str), DescriptorId>>,
    next_descriptor: AtomicU32,
    roots: Mutex<RootSet>,
}

impl Heap {
    /// Create an empty heap.
    pub fn new() -> Self {
        Heap::default()
    }

    /// Register a type descriptor for `T` under `name`.
    ///
    /// Registration is idempotent: the owner key is the pair of the Rust
    /// type identity and the descriptor name, so a module can register its
    /// types once per VM regardless of initialization order.
    pub fn register_descriptor<T: 'static>(&self, name: &'static str) -> DescriptorId {
        let mut descriptors = lock(&self.descriptors);
        *descriptors
            .entry((TypeId::of::<T>(), name))
            .or_insert_with(|| {
                DescriptorId(self.next_descriptor.fetch_add(1, Ordering::Relaxed))
            })
    }

    /// Pin a value independently of any register or stack slot.
    pub fn root_add(&self, value: Value) -> RootRef {
        let mut roots = lock(&self.roots);
        match roots.free.pop() {
            Some(index) => {
                roots.slots[index] = Some(value);
                RootRef(index)
            }
            None => {
                roots.slots.push(Some(value));
                RootRef(roots.slots.len() - 1)
            }
        }
    }

    /// Release a pinned value.
    pub fn root_remove(&self, root: RootRef) {
        let mut roots = lock(&self.roots);
        roots.slots[root.0] = None;
        roots.free.push(root.0);
    }

    /// Number of live roots.
    pub fn root_count(&self) -> usize {
        lock(&self.roots).slots.iter().flatten().count()
    }

    /// Allocate a fixed-slot value array (register files, operand stacks).
    pub fn alloc_slots(&self, len: usize) -> Result<Vec<Value>, Fault> {
        let mut slots = Vec::new();
        slots.try_reserve_exact(len).map_err(|_| Fault::OutOfMemory)?;
        slots.resize(len, Value::Nil);
        Ok(slots)
    }

    /// Allocate the mirror array paired with a slot array.
    pub fn alloc_mirror(&self, len: usize) -> Result<Vec<Option<ObjectRef>>, Fault> {
        let mut mirror = Vec::new();
        mirror.try_reserve_exact(len).map_err(|_| Fault::OutOfMemory)?;
        mirror.resize_with(len, || None);
        Ok(mirror)
    }

    /// Array-slot write barrier: record in the mirror the heap object the
    /// slot now references. Appends when `index` is one past the end.
    pub fn write_slot(&self, mirror: &mut Vec<Option<ObjectRef>>, index: usize, value: &Value) {
        let object = value.object_ref();
        if index == mirror.len() {
            mirror.push(object);
        } else {
            mirror[index] = object;
        }
    }

    /// Array-slot clear barrier. Pops when `index` is the last slot.
    pub fn clear_slot(&self, mirror: &mut Vec<Option<ObjectRef>>, index: usize) {
        if index + 1 == mirror.len() {
            mirror.pop();
        } else if index < mirror.len() {
            mirror[index] = None;
        }
    }
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("descriptors", &lock(&self.descriptors).len())
            .field("roots", &self.root_count())
            .finish()
    }
}
