//! Native toolkit boundary
//!
//! These traits are the only way the rest of the crate touches the toolkit.
//! A real binding implements them over the toolkit's C API; the
//! [`headless`](crate::headless) backend implements them in memory.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │   ItemObject / GenGridItem / SmartEvent │
//! └────────────────┬────────────────────────┘
//!                  │
//!       ┌──────────┼──────────────┐
//!       ▼          ▼              ▼
//! NativeLifecycle  ItemNative  SignalSource
//!       │          │              │
//!       └──────────┴──────┬───────┘
//!                         ▼
//!           toolkit C API  /  HeadlessNative
//! ```
//!
//! All methods are called on the toolkit's UI thread. Callbacks handed to
//! the toolkit are `Rc` and are invoked on that same thread.

use std::rc::Rc;

use crate::handle::{EventInfo, NativeHandle};

/// Invoked once by the toolkit when an item is destroyed
pub type DeleteCallback = Rc<dyn Fn(NativeHandle)>;

/// Invoked by the toolkit each time a named signal fires on an object
///
/// Arguments are the emitting object and the signal's payload. The toolkit
/// identifies a registration by the callback's pointer, so the same
/// `SmartCallback` must be passed to `callback_del` that was passed to
/// `callback_add`.
pub type SmartCallback = Rc<dyn Fn(NativeHandle, EventInfo)>;

/// Compare two callbacks by registration identity
pub fn same_callback<T: ?Sized>(a: &Rc<T>, b: &Rc<T>) -> bool {
    std::ptr::eq(Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ())
}

/// Item creation/destruction hooks
pub trait NativeLifecycle {
    /// Ask the toolkit to destroy an item
    ///
    /// The toolkit may run the item's delete callback before returning, or
    /// later from its event loop.
    fn item_del(&self, item: NativeHandle);

    /// Install (`Some`) or remove (`None`) the item's single delete callback slot
    fn item_del_cb_set(&self, item: NativeHandle, callback: Option<DeleteCallback>);
}

/// Per-item property forwarding
pub trait ItemNative {
    fn item_disabled_get(&self, item: NativeHandle) -> bool;
    fn item_disabled_set(&self, item: NativeHandle, disabled: bool);

    fn item_part_text_set(&self, item: NativeHandle, part: Option<&str>, text: &str);
    fn item_part_text_get(&self, item: NativeHandle, part: Option<&str>) -> Option<String>;

    fn item_part_content_set(&self, item: NativeHandle, part: Option<&str>, content: NativeHandle);
    /// Detach and return the part's current content ([`NativeHandle::NULL`] if empty)
    fn item_part_content_unset(&self, item: NativeHandle, part: Option<&str>) -> NativeHandle;

    /// Destroy a plain (non-item) toolkit object
    fn object_del(&self, object: NativeHandle);

    fn gengrid_item_selected_get(&self, item: NativeHandle) -> bool;
    fn gengrid_item_selected_set(&self, item: NativeHandle, selected: bool);
    fn gengrid_item_update(&self, item: NativeHandle);
}

/// Named-signal registration on toolkit objects
pub trait SignalSource {
    fn callback_add(&self, object: NativeHandle, event: &str, callback: &SmartCallback);
    fn callback_del(&self, object: NativeHandle, event: &str, callback: &SmartCallback);
}
