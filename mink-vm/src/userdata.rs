//! Host-owned payloads embedded in the value model.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::error::Fault;
use crate::sync::lock;

/// Finalizer invoked when the last handle to a full userdata drops.
pub type UserdataFinalizer = Box<dyn FnOnce() + Send>;

#[derive(Debug)]
struct FullUserdata {
    module: i32,
    type_id: i32,
    bytes: Mutex<Box<[u8]>>,
    finalizer: Mutex<Option<DebugFinalizer>>,
}

struct DebugFinalizer(UserdataFinalizer);

impl fmt::Debug for DebugFinalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("finalizer")
    }
}

impl Drop for FullUserdata {
    fn drop(&mut self) {
        if let Some(DebugFinalizer(finalizer)) = lock(&self.finalizer).take() {
            finalizer();
        }
    }
}

/// Shared handle to an opaque byte buffer owned by the engine heap.
#[derive(Debug, Clone)]
pub struct UserdataRef(Arc<FullUserdata>);

impl UserdataRef {
    /// Allocate a zeroed buffer of `size` bytes.
    pub fn new(
        module: i32,
        type_id: i32,
        size: usize,
        finalizer: Option<UserdataFinalizer>,
    ) -> Result<Self, Fault> {
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(size).map_err(|_| Fault::OutOfMemory)?;
        bytes.resize(size, 0);
        Ok(UserdataRef(Arc::new(FullUserdata {
            module,
            type_id,
            bytes: Mutex::new(bytes.into_boxed_slice()),
            finalizer: Mutex::new(finalizer.map(DebugFinalizer)),
        })))
    }

    /// Registering module identifier.
    pub fn module(&self) -> i32 {
        self.0.module
    }

    /// Module-scoped type identifier.
    pub fn type_id(&self) -> i32 {
        self.0.type_id
    }

    /// Run `f` over the buffer contents.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        f(&mut lock(&self.0.bytes))
    }

    /// Stable identity token.
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &UserdataRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// An unmanaged host pointer tagged with module and type identifiers.
///
/// The engine never dereferences the pointer; it is an opaque token carried
/// for the host.
#[derive(Debug, Clone, Copy)]
pub struct LightUserdata {
    /// Registering module identifier.
    pub module: i32,
    /// Module-scoped type identifier.
    pub type_id: i32,
    ptr: *mut core::ffi::c_void,
}

unsafe impl Send for LightUserdata {}
unsafe impl Sync for LightUserdata {}

impl LightUserdata {
    /// Wrap a raw host pointer.
    pub fn new(module: i32, type_id: i32, ptr: *mut core::ffi::c_void) -> Self {
        LightUserdata {
            module,
            type_id,
            ptr,
        }
    }

    /// The wrapped pointer.
    pub fn as_ptr(&self) -> *mut core::ffi::c_void {
        self.ptr
    }

    /// The pointer as an identity token.
    pub fn addr(&self) -> usize {
        self.ptr as usize
    }
}

/// A collector-managed host object referenced from the value model.
#[derive(Clone)]
pub struct GcObject {
    module: i32,
    type_id: i32,
    object: Arc<dyn Any + Send + Sync>,
}

impl GcObject {
    /// Wrap a host object.
    pub fn new<T: Any + Send + Sync>(module: i32, type_id: i32, object: T) -> Self {
        GcObject {
            module,
            type_id,
            object: Arc::new(object),
        }
    }

    /// Registering module identifier.
    pub fn module(&self) -> i32 {
        self.module
    }

    /// Module-scoped type identifier.
    pub fn type_id(&self) -> i32 {
        self.type_id
    }

    /// Downcast to the concrete host type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.object.downcast_ref()
    }

    /// Stable identity token.
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.object) as *const () as usize
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &GcObject) -> bool {
        Arc::ptr_eq(&self.object, &other.object)
    }
}

impl fmt::Debug for GcObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GcObject(0x{:x})", self.addr())
    }
}
