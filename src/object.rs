// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Heap object layouts.
//!
//! Every heap object shares a common header (type tag, mark bit, intrusive
//! `next` pointer) so the collector can walk the whole heap without a
//! separate index. Concrete object types are `#[repr(C)]` with the header
//! as their first field, which makes the header-to-concrete-type cast in
//! [`ObjRef`] well defined.

use crate::chunk::Chunk;
use crate::table::Table;
use crate::value::Value;
use std::cell::{Cell, RefCell};
use std::ptr::NonNull;

/// Discriminant for the kind of heap object behind an [`ObjRef`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjKind {
    String,
    Function,
    Native,
    Closure,
    Upvalue,
    Class,
    Instance,
    BoundMethod,
}

/// Fields shared by every heap object.
pub(crate) struct ObjHeader {
    pub kind: ObjKind,
    pub marked: Cell<bool>,
    pub next: Cell<Option<NonNull<ObjHeader>>>,
}

/// A native function pointer: the VM calls it with the arguments slice and
/// gets back a value or an error message. The VM attaches the backtrace,
/// since a native function has no frame of its own.
pub type NativeFn = fn(args: &[Value]) -> Result<Value, String>;

#[repr(C)]
pub(crate) struct ObjString {
    pub header: ObjHeader,
    pub hash: u32,
    pub chars: Box<str>,
}

#[repr(C)]
pub(crate) struct ObjFunction {
    pub header: ObjHeader,
    /// `Cell`/`RefCell` throughout: the compiler fills this object in
    /// incrementally through a shared `ObjRef` while it is still being
    /// built — the in-progress `ObjFunction` is itself a GC root (see
    /// `Vm::compiler_roots`), so it must already live on the heap.
    pub arity: Cell<u8>,
    pub upvalue_count: Cell<usize>,
    pub chunk: RefCell<Chunk>,
    /// `None` for the synthetic top-level `<script>` function.
    pub name: Cell<Option<ObjRef>>,
}

#[repr(C)]
pub(crate) struct ObjNative {
    pub header: ObjHeader,
    pub function: NativeFn,
}

/// Where an upvalue currently reads/writes its captured variable.
pub(crate) enum UpvalueLocation {
    /// Still pointing at a live stack slot (`frame_base + index` into the
    /// VM's value stack).
    Open(usize),
    /// The enclosing frame returned; the value now lives inline.
    Closed(Value),
}

#[repr(C)]
pub(crate) struct ObjUpvalue {
    pub header: ObjHeader,
    pub location: RefCell<UpvalueLocation>,
    /// Forms the VM's open-upvalue list, sorted by descending stack slot.
    pub next_open: Cell<Option<NonNull<ObjUpvalue>>>,
}

#[repr(C)]
pub(crate) struct ObjClosure {
    pub header: ObjHeader,
    pub function: ObjRef,
    pub upvalues: Box<[Cell<Option<ObjRef>>]>,
}

#[repr(C)]
pub(crate) struct ObjClass {
    pub header: ObjHeader,
    pub name: ObjRef,
    pub methods: RefCell<Table>,
}

#[repr(C)]
pub(crate) struct ObjInstance {
    pub header: ObjHeader,
    pub class: ObjRef,
    pub fields: RefCell<Table>,
}

#[repr(C)]
pub(crate) struct ObjBoundMethod {
    pub header: ObjHeader,
    pub receiver: Value,
    pub method: ObjRef,
}

/// A type-erased, non-owning reference to a heap object.
///
/// Equality is pointer identity: because strings are interned, this makes
/// string equality coincide with reference equality, matching §3.1.
#[derive(Clone, Copy)]
pub struct ObjRef(pub(crate) NonNull<ObjHeader>);

impl PartialEq for ObjRef {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for ObjRef {}

impl std::hash::Hash for ObjRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.as_ptr().hash(state);
    }
}

impl std::fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjRef({:?}, {:?})", self.0, self.kind())
    }
}

macro_rules! downcast {
    ($name:ident, $kind:ident, $ty:ty) => {
        /// # Safety
        /// Caller must ensure the referenced object's kind is `$kind`.
        pub(crate) unsafe fn $name(&self) -> &$ty {
            debug_assert_eq!(self.kind(), ObjKind::$kind);
            unsafe { &*self.0.as_ptr().cast::<$ty>() }
        }
    };
}

impl ObjRef {
    pub(crate) fn header(&self) -> &ObjHeader {
        unsafe { self.0.as_ref() }
    }

    #[must_use]
    pub fn kind(&self) -> ObjKind {
        self.header().kind
    }

    pub(crate) fn as_header_ptr(&self) -> NonNull<ObjHeader> {
        self.0
    }

    downcast!(as_string, String, ObjString);
    downcast!(as_function, Function, ObjFunction);
    downcast!(as_native, Native, ObjNative);
    downcast!(as_closure, Closure, ObjClosure);
    downcast!(as_upvalue, Upvalue, ObjUpvalue);
    downcast!(as_class, Class, ObjClass);
    downcast!(as_instance, Instance, ObjInstance);
    downcast!(as_bound_method, BoundMethod, ObjBoundMethod);

    #[must_use]
    pub fn as_str(&self) -> &str {
        unsafe { &self.as_string().chars }
    }
}

/// Wrap a raw upvalue pointer (as stored in the VM's open-upvalue list)
/// back into a type-erased [`ObjRef`].
pub(crate) fn upvalue_ref(ptr: NonNull<ObjUpvalue>) -> ObjRef {
    ObjRef(ptr.cast())
}

pub(crate) fn new_header(kind: ObjKind) -> ObjHeader {
    ObjHeader {
        kind,
        marked: Cell::new(false),
        next: Cell::new(None),
    }
}

/// Approximate heap footprint of one object of `kind`, used for the GC's
/// byte-counted growth trigger. Deliberately coarse: it counts the fixed
/// struct but not variable-length payloads like a long string's bytes.
pub(crate) fn object_size(kind: ObjKind) -> usize {
    match kind {
        ObjKind::String => std::mem::size_of::<ObjString>(),
        ObjKind::Function => std::mem::size_of::<ObjFunction>(),
        ObjKind::Native => std::mem::size_of::<ObjNative>(),
        ObjKind::Closure => std::mem::size_of::<ObjClosure>(),
        ObjKind::Upvalue => std::mem::size_of::<ObjUpvalue>(),
        ObjKind::Class => std::mem::size_of::<ObjClass>(),
        ObjKind::Instance => std::mem::size_of::<ObjInstance>(),
        ObjKind::BoundMethod => std::mem::size_of::<ObjBoundMethod>(),
    }
}

/// Box an object, link it at the head of `objects`, and return a typed ref.
///
/// `T` must start with an `ObjHeader` (enforced by `#[repr(C)]` on every
/// concrete object type above).
pub(crate) fn link<T>(objects: &Cell<Option<NonNull<ObjHeader>>>, obj: T) -> NonNull<T> {
    let boxed = Box::new(obj);
    let ptr = NonNull::new(Box::into_raw(boxed)).expect("Box::into_raw is never null");
    let header_ptr = ptr.cast::<ObjHeader>();
    unsafe {
        header_ptr.as_ref().next.set(objects.get());
    }
    objects.set(Some(header_ptr));
    ptr
}
