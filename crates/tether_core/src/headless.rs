//! In-memory native backend
//!
//! Implements every boundary trait without a toolkit. Used by the test suite
//! and the CLI simulator, and usable as a fallback on hosts where the real
//! toolkit is absent.
//!
//! The backend behaves the way a single-threaded widget toolkit does where it
//! matters to the bridge:
//!
//! - each item has one delete callback slot, invoked once on destruction
//! - signal callbacks are keyed by (object, event name, callback pointer)
//! - destroying an object drops its signal registrations
//! - [`DeleteMode::Synchronous`] runs delete callbacks inside `item_del`,
//!   [`DeleteMode::Deferred`] queues them until [`HeadlessNative::flush_deletes`]
//!
//! Callbacks are never invoked while the backend's own state is borrowed, so
//! they may call back into the backend.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{trace, warn};

use crate::features::SystemInfo;
use crate::handle::{EventInfo, NativeHandle};
use crate::native::{
    same_callback, DeleteCallback, ItemNative, NativeLifecycle, SignalSource, SmartCallback,
};

const FIRST_HANDLE: usize = 0x1000;
const HANDLE_STRIDE: usize = 0x10;

/// When the backend runs an item's delete callback
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeleteMode {
    /// Inside the `item_del` call
    #[default]
    Synchronous,
    /// On the next [`HeadlessNative::flush_deletes`]
    Deferred,
}

#[derive(Default)]
struct ItemState {
    disabled: bool,
    selected: bool,
    updates: u32,
    texts: FxHashMap<String, String>,
    contents: FxHashMap<String, NativeHandle>,
    delete_callback: Option<DeleteCallback>,
}

struct Registration {
    object: NativeHandle,
    event: String,
    callback: SmartCallback,
}

struct State {
    next_handle: usize,
    items: FxHashMap<NativeHandle, ItemState>,
    objects: FxHashSet<NativeHandle>,
    destroyed: FxHashSet<NativeHandle>,
    registrations: Vec<Registration>,
    pending_deletes: Vec<NativeHandle>,
}

fn part_key(part: Option<&str>) -> String {
    part.unwrap_or_default().to_string()
}

/// Toolkit stand-in that keeps all object state in memory
pub struct HeadlessNative {
    state: RefCell<State>,
    mode: DeleteMode,
    calls: Cell<usize>,
}

impl Default for HeadlessNative {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessNative {
    pub fn new() -> Self {
        Self::with_delete_mode(DeleteMode::default())
    }

    pub fn with_delete_mode(mode: DeleteMode) -> Self {
        Self {
            state: RefCell::new(State {
                next_handle: FIRST_HANDLE,
                items: FxHashMap::default(),
                objects: FxHashSet::default(),
                destroyed: FxHashSet::default(),
                registrations: Vec::new(),
                pending_deletes: Vec::new(),
            }),
            mode,
            calls: Cell::new(0),
        }
    }

    pub fn delete_mode(&self) -> DeleteMode {
        self.mode
    }

    fn allocate(&self) -> NativeHandle {
        let mut state = self.state.borrow_mut();
        let handle = NativeHandle::from_raw(state.next_handle);
        state.next_handle += HANDLE_STRIDE;
        handle
    }

    fn count_call(&self) {
        self.calls.set(self.calls.get() + 1);
    }

    /// Create a new item and return its handle
    pub fn create_item(&self) -> NativeHandle {
        let handle = self.allocate();
        self.adopt(handle);
        handle
    }

    /// Create a plain object (usable as part content)
    pub fn create_object(&self) -> NativeHandle {
        let handle = self.allocate();
        self.state.borrow_mut().objects.insert(handle);
        handle
    }

    /// Start tracking an item under a caller-chosen handle
    pub fn adopt(&self, handle: NativeHandle) {
        let mut state = self.state.borrow_mut();
        state.destroyed.remove(&handle);
        state.items.entry(handle).or_default();
    }

    /// Destroy an item from the toolkit side and run its delete callback
    ///
    /// Returns `false` if no such item is alive.
    pub fn destroy(&self, handle: NativeHandle) -> bool {
        let callback = {
            let mut state = self.state.borrow_mut();
            let Some(item) = state.items.remove(&handle) else {
                warn!(%handle, "destroy on unknown item");
                return false;
            };
            state.destroyed.insert(handle);
            state.registrations.retain(|r| r.object != handle);
            state.pending_deletes.retain(|&h| h != handle);
            item.delete_callback
        };

        trace!(%handle, "item destroyed");
        if let Some(callback) = callback {
            callback(handle);
        }
        true
    }

    /// Run queued deletions, returning how many items were destroyed
    pub fn flush_deletes(&self) -> usize {
        let pending = std::mem::take(&mut self.state.borrow_mut().pending_deletes);
        pending.into_iter().filter(|&h| self.destroy(h)).count()
    }

    /// Emit `event` on `object`, returning the number of callbacks invoked
    pub fn fire(&self, object: NativeHandle, event: &str, info: EventInfo) -> usize {
        let callbacks: Vec<SmartCallback> = self
            .state
            .borrow()
            .registrations
            .iter()
            .filter(|r| r.object == object && r.event == event)
            .map(|r| r.callback.clone())
            .collect();

        trace!(%object, event, listeners = callbacks.len(), "fire");
        for callback in &callbacks {
            callback(object, info);
        }
        callbacks.len()
    }

    /// Active signal registrations for (object, event)
    pub fn registration_count(&self, object: NativeHandle, event: &str) -> usize {
        self.state
            .borrow()
            .registrations
            .iter()
            .filter(|r| r.object == object && r.event == event)
            .count()
    }

    /// Active signal registrations on any object
    pub fn total_registrations(&self) -> usize {
        self.state.borrow().registrations.len()
    }

    pub fn is_alive(&self, handle: NativeHandle) -> bool {
        let state = self.state.borrow();
        state.items.contains_key(&handle) || state.objects.contains(&handle)
    }

    /// Whether `handle` was an item or object that has since been destroyed
    pub fn was_destroyed(&self, handle: NativeHandle) -> bool {
        self.state.borrow().destroyed.contains(&handle)
    }

    pub fn has_delete_callback(&self, item: NativeHandle) -> bool {
        self.state
            .borrow()
            .items
            .get(&item)
            .map(|i| i.delete_callback.is_some())
            .unwrap_or(false)
    }

    /// Number of `gengrid_item_update` calls seen for `item`
    pub fn update_count(&self, item: NativeHandle) -> u32 {
        self.state
            .borrow()
            .items
            .get(&item)
            .map(|i| i.updates)
            .unwrap_or(0)
    }

    /// Number of boundary-trait calls made so far
    pub fn call_count(&self) -> usize {
        self.calls.get()
    }

    fn with_item<R>(&self, item: NativeHandle, default: R, f: impl FnOnce(&mut ItemState) -> R) -> R {
        self.count_call();
        let mut state = self.state.borrow_mut();
        match state.items.get_mut(&item) {
            Some(item) => f(item),
            None => {
                warn!(%item, "call on unknown item");
                default
            }
        }
    }
}

impl NativeLifecycle for HeadlessNative {
    fn item_del(&self, item: NativeHandle) {
        self.count_call();
        match self.mode {
            DeleteMode::Synchronous => {
                self.destroy(item);
            }
            DeleteMode::Deferred => {
                let mut state = self.state.borrow_mut();
                if state.items.contains_key(&item) && !state.pending_deletes.contains(&item) {
                    state.pending_deletes.push(item);
                }
            }
        }
    }

    fn item_del_cb_set(&self, item: NativeHandle, callback: Option<DeleteCallback>) {
        self.with_item(item, (), |state| state.delete_callback = callback);
    }
}

impl ItemNative for HeadlessNative {
    fn item_disabled_get(&self, item: NativeHandle) -> bool {
        self.with_item(item, false, |state| state.disabled)
    }

    fn item_disabled_set(&self, item: NativeHandle, disabled: bool) {
        self.with_item(item, (), |state| state.disabled = disabled);
    }

    fn item_part_text_set(&self, item: NativeHandle, part: Option<&str>, text: &str) {
        self.with_item(item, (), |state| {
            state.texts.insert(part_key(part), text.to_string());
        });
    }

    fn item_part_text_get(&self, item: NativeHandle, part: Option<&str>) -> Option<String> {
        self.with_item(item, None, |state| state.texts.get(&part_key(part)).cloned())
    }

    fn item_part_content_set(&self, item: NativeHandle, part: Option<&str>, content: NativeHandle) {
        self.with_item(item, (), |state| {
            state.contents.insert(part_key(part), content);
        });
    }

    fn item_part_content_unset(&self, item: NativeHandle, part: Option<&str>) -> NativeHandle {
        self.with_item(item, NativeHandle::NULL, |state| {
            state.contents.remove(&part_key(part)).unwrap_or_default()
        })
    }

    fn object_del(&self, object: NativeHandle) {
        self.count_call();
        let mut state = self.state.borrow_mut();
        if state.objects.remove(&object) {
            state.destroyed.insert(object);
            state.registrations.retain(|r| r.object != object);
        } else {
            warn!(%object, "object_del on unknown object");
        }
    }

    fn gengrid_item_selected_get(&self, item: NativeHandle) -> bool {
        self.with_item(item, false, |state| state.selected)
    }

    fn gengrid_item_selected_set(&self, item: NativeHandle, selected: bool) {
        self.with_item(item, (), |state| state.selected = selected);
    }

    fn gengrid_item_update(&self, item: NativeHandle) {
        self.with_item(item, (), |state| state.updates += 1);
    }
}

impl SignalSource for HeadlessNative {
    fn callback_add(&self, object: NativeHandle, event: &str, callback: &SmartCallback) {
        self.count_call();
        self.state.borrow_mut().registrations.push(Registration {
            object,
            event: event.to_string(),
            callback: callback.clone(),
        });
    }

    fn callback_del(&self, object: NativeHandle, event: &str, callback: &SmartCallback) {
        self.count_call();
        let mut state = self.state.borrow_mut();
        let position = state.registrations.iter().position(|r| {
            r.object == object && r.event == event && same_callback(&r.callback, callback)
        });
        match position {
            Some(index) => {
                state.registrations.remove(index);
            }
            None => trace!(%object, event, "callback_del found no registration"),
        }
    }
}

/// Feature table standing in for the platform's system-info service
#[derive(Debug, Clone, Default)]
pub struct HeadlessSystemInfo {
    features: FxHashMap<String, bool>,
}

impl HeadlessSystemInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feature(mut self, key: impl Into<String>, supported: bool) -> Self {
        self.set(key, supported);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, supported: bool) {
        self.features.insert(key.into(), supported);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, bool)> for HeadlessSystemInfo {
    fn from_iter<I: IntoIterator<Item = (K, bool)>>(iter: I) -> Self {
        Self {
            features: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl SystemInfo for HeadlessSystemInfo {
    fn try_get_bool(&self, key: &str) -> Option<bool> {
        self.features.get(key).copied()
    }
}
