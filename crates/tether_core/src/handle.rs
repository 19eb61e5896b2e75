//! Opaque handle types crossing the native boundary
//!
//! A [`NativeHandle`] is a token for a resource the native toolkit owns. It is
//! never dereferenced on the Rust side and carries no ownership: dropping one
//! does nothing, copying one does not extend the native object's lifetime.

use std::ffi::c_void;
use std::fmt;

/// Opaque reference to a toolkit-owned object
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NativeHandle(usize);

impl NativeHandle {
    /// The null sentinel (deleted or never-created object)
    pub const NULL: NativeHandle = NativeHandle(0);

    /// Wrap a raw handle value
    #[inline]
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    /// Wrap a raw toolkit pointer
    #[inline]
    pub fn from_ptr(ptr: *mut c_void) -> Self {
        Self(ptr as usize)
    }

    #[inline]
    pub const fn as_raw(&self) -> usize {
        self.0
    }

    /// Pointer form for passing back into the toolkit
    #[inline]
    pub fn as_ptr(&self) -> *mut c_void {
        self.0 as *mut c_void
    }

    #[inline]
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeHandle({:#x})", self.0)
    }
}

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Process-unique wrapper identifier
///
/// Allocated in increasing order by [`HandleRegistry::next_id`](crate::registry::HandleRegistry::next_id)
/// and never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(u32);

impl ItemId {
    pub(crate) const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque event payload delivered with a native signal
///
/// What it points at depends on the signal; parsers passed to
/// [`SmartEvent::with_parser`](crate::smart_event::SmartEvent::with_parser)
/// know how to read it.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EventInfo(usize);

impl EventInfo {
    /// No payload
    pub const NONE: EventInfo = EventInfo(0);

    #[inline]
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn from_ptr(ptr: *mut c_void) -> Self {
        Self(ptr as usize)
    }

    #[inline]
    pub const fn as_raw(&self) -> usize {
        self.0
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut c_void {
        self.0 as *mut c_void
    }

    #[inline]
    pub const fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for EventInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventInfo({:#x})", self.0)
    }
}
