//! Handle registry: native handle and id to wrapper reverse lookup
//!
//! The toolkit hands us raw handles in callbacks (selection changed on item
//! `0x5f3a...`, item `0x5f3a...` deleted). The registry turns those back into
//! the Rust wrapper that represents them, and keeps that mapping honest when
//! the toolkit destroys objects on its own.
//!
//! # Ownership
//!
//! The registry never owns wrappers. It stores [`Weak`] references, so a
//! lookup on a wrapper that has been dropped reads as absent.
//!
//! # Threading
//!
//! Toolkits of this shape are UI-thread affine and so is the registry: it is
//! `!Send + !Sync` and does no locking. Create it on the UI thread and keep
//! every call there. Native callbacks arrive on that thread too.
//!
//! # Deletion
//!
//! ```text
//! registry.delete(item) ──► item_del(handle) ──┐
//!                                              │ (now, or later from the loop)
//! toolkit destroys object on its own ──────────┤
//!                                              ▼
//!                              delete callback ──► on_native_delete(handle)
//!                                                    1. notify_deleted()
//!                                                    2. invalidate()
//!                                                    3. drop both table entries
//!                                                    4. release_handle()
//! ```
//!
//! `on_native_delete` runs at most once per binding. Repeated or re-entrant
//! calls for the same handle are no-ops.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, error, trace};

use crate::error::{BindError, Result};
use crate::handle::{ItemId, NativeHandle};
use crate::native::{DeleteCallback, NativeLifecycle};

/// Minimal capability a wrapper needs to be tracked by a [`HandleRegistry`]
pub trait Wrapper {
    /// Id allocated from the registry at construction
    fn id(&self) -> ItemId;

    /// Current native handle, [`NativeHandle::NULL`] once deleted
    fn handle(&self) -> NativeHandle;

    /// Deliver the `Deleted` notification to the wrapper's observers
    fn notify_deleted(&self);

    /// Wrapper-specific teardown, run after `notify_deleted` and before the
    /// wrapper leaves the tables
    fn invalidate(&self) {}

    /// Set the wrapper's handle to null
    fn release_handle(&self);
}

struct Entry<T: ?Sized> {
    item: Weak<T>,
    handle: NativeHandle,
}

struct Tables<T: ?Sized> {
    by_id: FxHashMap<ItemId, Entry<T>>,
    by_handle: FxHashMap<NativeHandle, ItemId>,
    /// Handles whose deletion is in progress
    dying: FxHashSet<NativeHandle>,
}

impl<T: ?Sized> Tables<T> {
    fn is_live(&self, id: ItemId) -> bool {
        self.by_id
            .get(&id)
            .map(|e| e.item.strong_count() > 0)
            .unwrap_or(false)
    }

    fn resolve(&self, handle: NativeHandle) -> Option<(ItemId, Option<Rc<T>>)> {
        let id = *self.by_handle.get(&handle)?;
        let item = self.by_id.get(&id).and_then(|e| e.item.upgrade());
        Some((id, item))
    }
}

/// Reverse lookup tables from [`ItemId`] and [`NativeHandle`] to wrappers
pub struct HandleRegistry<T: ?Sized + Wrapper + 'static> {
    tables: RefCell<Tables<T>>,
    next_id: Cell<u32>,
    lifecycle: Rc<dyn NativeLifecycle>,
    this: Weak<HandleRegistry<T>>,
}

impl<T: ?Sized + Wrapper + 'static> HandleRegistry<T> {
    /// Create an empty registry over the toolkit's lifecycle hooks
    pub fn new(lifecycle: Rc<dyn NativeLifecycle>) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            tables: RefCell::new(Tables {
                by_id: FxHashMap::default(),
                by_handle: FxHashMap::default(),
                dying: FxHashSet::default(),
            }),
            next_id: Cell::new(0),
            lifecycle,
            this: this.clone(),
        })
    }

    /// Allocate the next wrapper id
    ///
    /// Ids are never reused. Once the id space runs out every further call
    /// fails with [`BindError::IdsExhausted`].
    pub fn next_id(&self) -> Result<ItemId> {
        let id = self.next_id.get();
        let Some(next) = id.checked_add(1) else {
            error!("item id space exhausted");
            return Err(BindError::IdsExhausted);
        };
        self.next_id.set(next);
        Ok(ItemId::new(id))
    }

    /// Bind `item` to `handle`
    ///
    /// Replaces the item's previous binding, if any, and moves the native
    /// delete callback from the old handle to the new one. A null `handle`
    /// keeps the item reachable by id only.
    ///
    /// # Errors
    ///
    /// [`BindError::OwnershipConflict`] when `handle` already belongs to a
    /// different live wrapper. The tables are left untouched.
    pub fn register(&self, item: &Rc<T>, handle: NativeHandle) -> Result<()> {
        let id = item.id();

        let previous = {
            let tables = self.tables.borrow();
            if !handle.is_null() {
                if let Some(&owner) = tables.by_handle.get(&handle) {
                    if owner != id && tables.is_live(owner) {
                        error!(%handle, %owner, claimant = %id, "handle already owned");
                        return Err(BindError::OwnershipConflict {
                            handle,
                            owner,
                            claimant: id,
                        });
                    }
                }
            }
            match tables.by_id.get(&id) {
                Some(entry) if entry.handle == handle => {
                    trace!(%id, %handle, "already bound");
                    return Ok(());
                }
                Some(entry) => entry.handle,
                None => NativeHandle::NULL,
            }
        };

        if !previous.is_null() {
            self.lifecycle.item_del_cb_set(previous, None);
        }

        {
            let mut tables = self.tables.borrow_mut();
            if !previous.is_null() && tables.by_handle.get(&previous) == Some(&id) {
                tables.by_handle.remove(&previous);
            }
            tables.by_id.insert(
                id,
                Entry {
                    item: Rc::downgrade(item),
                    handle,
                },
            );
            if !handle.is_null() {
                if let Some(stale) = tables.by_handle.insert(handle, id) {
                    if stale != id {
                        // Owner was dropped without leaving the tables
                        tables.by_id.remove(&stale);
                    }
                }
            }
        }

        if !handle.is_null() {
            self.install_delete_callback(handle);
        }

        debug!(%id, %handle, %previous, "registered");
        Ok(())
    }

    pub fn lookup_by_id(&self, id: ItemId) -> Option<Rc<T>> {
        self.tables
            .borrow()
            .by_id
            .get(&id)
            .and_then(|e| e.item.upgrade())
    }

    pub fn lookup_by_handle(&self, handle: NativeHandle) -> Option<Rc<T>> {
        self.tables.borrow().resolve(handle).and_then(|(_, item)| item)
    }

    /// Toolkit reports that `handle` has been destroyed
    pub fn on_native_delete(&self, handle: NativeHandle) {
        let found = {
            let mut tables = self.tables.borrow_mut();
            if tables.dying.contains(&handle) {
                None
            } else {
                let found = tables.resolve(handle);
                if found.is_some() {
                    tables.dying.insert(handle);
                }
                found
            }
        };

        let Some((id, item)) = found else {
            trace!(%handle, "delete for unbound handle ignored");
            return;
        };

        debug!(%id, %handle, "native delete");

        if let Some(item) = &item {
            item.notify_deleted();
            item.invalidate();
        }

        // A Deleted handler may have rebound the item to a new handle
        let rebound = {
            let mut tables = self.tables.borrow_mut();
            tables.dying.remove(&handle);
            if tables.by_handle.get(&handle) == Some(&id) {
                tables.by_handle.remove(&handle);
            }
            let rebound = tables
                .by_id
                .get(&id)
                .is_some_and(|entry| entry.handle != handle);
            if !rebound {
                tables.by_id.remove(&id);
            }
            rebound
        };

        if rebound {
            debug!(%id, %handle, "item rebound during delete, keeping new binding");
            return;
        }
        if let Some(item) = item {
            if item.handle() == handle {
                item.release_handle();
            }
        }
    }

    /// Ask the toolkit to destroy the item's native object
    ///
    /// The item's handle is null afterwards. The table entries go away when
    /// the toolkit runs the delete callback, which may happen inside this
    /// call or later.
    ///
    /// # Errors
    ///
    /// [`BindError::ItemDeleted`] if the item has no handle left.
    pub fn delete(&self, item: &T) -> Result<()> {
        let handle = item.handle();
        if handle.is_null() {
            return Err(BindError::ItemDeleted { id: item.id() });
        }

        debug!(id = %item.id(), %handle, "delete requested");
        self.lifecycle.item_del(handle);
        item.release_handle();
        Ok(())
    }

    /// Drop the bookkeeping for `id` without touching the toolkit
    ///
    /// Used when a wrapper goes away on the Rust side. The native object may
    /// already be gone, so no native call is made; a later delete callback
    /// for its handle finds nothing and is ignored.
    pub fn forget(&self, id: ItemId) {
        let Ok(mut tables) = self.tables.try_borrow_mut() else {
            return;
        };
        if let Some(entry) = tables.by_id.remove(&id) {
            if tables.by_handle.get(&entry.handle) == Some(&id) {
                tables.by_handle.remove(&entry.handle);
            }
            trace!(%id, handle = %entry.handle, "forgotten");
        }
    }

    /// Number of tracked wrappers
    pub fn len(&self) -> usize {
        self.tables.borrow().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> RegistryStats {
        let tables = self.tables.borrow();
        RegistryStats {
            items: tables.by_id.len(),
            handles: tables.by_handle.len(),
            next_id: self.next_id.get(),
        }
    }

    fn install_delete_callback(&self, handle: NativeHandle) {
        let registry = self.this.clone();
        let callback: DeleteCallback = Rc::new(move |deleted| {
            if let Some(registry) = registry.upgrade() {
                registry.on_native_delete(deleted);
            }
        });
        self.lifecycle.item_del_cb_set(handle, Some(callback));
    }
}

/// Statistics about a registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    pub items: usize,
    pub handles: usize,
    pub next_id: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{DeleteMode, HeadlessNative};

    struct Probe {
        id: ItemId,
        handle: Cell<NativeHandle>,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Probe {
        fn new(
            registry: &HandleRegistry<Probe>,
            log: &Rc<RefCell<Vec<String>>>,
        ) -> Rc<Self> {
            Rc::new(Probe {
                id: registry.next_id().unwrap(),
                handle: Cell::new(NativeHandle::NULL),
                log: log.clone(),
            })
        }

        fn bind(
            registry: &HandleRegistry<Probe>,
            probe: &Rc<Probe>,
            handle: NativeHandle,
        ) -> Result<()> {
            registry.register(probe, handle)?;
            probe.handle.set(handle);
            Ok(())
        }
    }

    impl Wrapper for Probe {
        fn id(&self) -> ItemId {
            self.id
        }

        fn handle(&self) -> NativeHandle {
            self.handle.get()
        }

        fn notify_deleted(&self) {
            self.log.borrow_mut().push(format!("deleted {}", self.id));
        }

        fn invalidate(&self) {
            self.log.borrow_mut().push(format!("invalidate {}", self.id));
        }

        fn release_handle(&self) {
            self.handle.set(NativeHandle::NULL);
        }
    }

    fn setup() -> (Rc<HeadlessNative>, Rc<HandleRegistry<Probe>>, Rc<RefCell<Vec<String>>>) {
        let native = Rc::new(HeadlessNative::new());
        let registry = HandleRegistry::<Probe>::new(native.clone());
        (native, registry, Rc::new(RefCell::new(Vec::new())))
    }

    #[test]
    fn test_ids_strictly_increasing() {
        let (_native, registry, _log) = setup();
        let ids: Vec<u32> = (0..32).map(|_| registry.next_id().unwrap().as_u32()).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(ids[0], 0);
    }

    #[test]
    fn test_id_exhaustion_is_an_error() {
        let (_native, registry, _log) = setup();
        registry.next_id.set(u32::MAX - 1);

        assert_eq!(registry.next_id().unwrap().as_u32(), u32::MAX - 1);
        assert_eq!(registry.next_id(), Err(BindError::IdsExhausted));
        assert_eq!(registry.next_id(), Err(BindError::IdsExhausted));
        assert_eq!(registry.stats().next_id, u32::MAX);
    }

    #[test]
    fn test_round_trip_lookup() {
        let (native, registry, log) = setup();
        let a = Probe::new(&registry, &log);
        let h = native.create_item();
        Probe::bind(&registry, &a, h).unwrap();

        assert!(Rc::ptr_eq(&registry.lookup_by_id(a.id).unwrap(), &a));
        assert!(Rc::ptr_eq(&registry.lookup_by_handle(h).unwrap(), &a));
        assert!(native.has_delete_callback(h));
    }

    #[test]
    fn test_lookup_miss_is_absent() {
        let (_native, registry, _log) = setup();
        assert!(registry.lookup_by_id(ItemId::new(99)).is_none());
        assert!(registry.lookup_by_handle(NativeHandle::from_raw(0x99)).is_none());
    }

    #[test]
    fn test_native_delete_clears_both_maps() {
        let (native, registry, log) = setup();
        let a = Probe::new(&registry, &log);
        let h = native.create_item();
        Probe::bind(&registry, &a, h).unwrap();

        native.destroy(h);

        assert!(registry.lookup_by_handle(h).is_none());
        assert!(registry.lookup_by_id(a.id).is_none());
        assert!(a.handle().is_null());
        assert_eq!(
            *log.borrow(),
            vec!["deleted #0".to_string(), "invalidate #0".to_string()]
        );
    }

    #[test]
    fn test_native_delete_idempotent() {
        let (native, registry, log) = setup();
        let a = Probe::new(&registry, &log);
        let h = native.create_item();
        Probe::bind(&registry, &a, h).unwrap();

        registry.on_native_delete(h);
        let after_once = (registry.stats(), log.borrow().clone());
        registry.on_native_delete(h);

        assert_eq!((registry.stats(), log.borrow().clone()), after_once);
    }

    #[test]
    fn test_rehandle_releases_old_binding() {
        let (native, registry, log) = setup();
        let a = Probe::new(&registry, &log);
        let h1 = native.create_item();
        let h2 = native.create_item();

        Probe::bind(&registry, &a, h1).unwrap();
        Probe::bind(&registry, &a, h2).unwrap();

        assert!(registry.lookup_by_handle(h1).is_none());
        assert!(Rc::ptr_eq(&registry.lookup_by_handle(h2).unwrap(), &a));
        assert!(!native.has_delete_callback(h1));
        assert!(native.has_delete_callback(h2));

        // Deleting the old handle no longer reaches the wrapper
        native.destroy(h1);
        assert!(log.borrow().is_empty());
        assert_eq!(a.handle(), h2);
    }

    #[test]
    fn test_ownership_conflict_rejected() {
        let (native, registry, log) = setup();
        let a = Probe::new(&registry, &log);
        let b = Probe::new(&registry, &log);
        let h = native.create_item();
        Probe::bind(&registry, &a, h).unwrap();

        let err = Probe::bind(&registry, &b, h).unwrap_err();
        assert_eq!(
            err,
            BindError::OwnershipConflict {
                handle: h,
                owner: a.id,
                claimant: b.id,
            }
        );
        assert!(Rc::ptr_eq(&registry.lookup_by_handle(h).unwrap(), &a));
        assert!(b.handle().is_null());
    }

    #[test]
    fn test_dropped_owner_does_not_conflict() {
        let (native, registry, log) = setup();
        let h = native.create_item();
        {
            let a = Probe::new(&registry, &log);
            Probe::bind(&registry, &a, h).unwrap();
        }
        let b = Probe::new(&registry, &log);
        Probe::bind(&registry, &b, h).unwrap();
        assert!(Rc::ptr_eq(&registry.lookup_by_handle(h).unwrap(), &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_null_handle_clears_binding() {
        let (native, registry, log) = setup();
        let a = Probe::new(&registry, &log);
        let h = native.create_item();
        Probe::bind(&registry, &a, h).unwrap();
        Probe::bind(&registry, &a, NativeHandle::NULL).unwrap();

        assert!(registry.lookup_by_handle(h).is_none());
        assert!(registry.lookup_by_id(a.id).is_some());
        assert!(!native.has_delete_callback(h));
    }

    #[test]
    fn test_delete_synchronous() {
        let (native, registry, log) = setup();
        let a = Probe::new(&registry, &log);
        let h = native.create_item();
        Probe::bind(&registry, &a, h).unwrap();

        registry.delete(&*a).unwrap();

        assert!(a.handle().is_null());
        assert!(registry.lookup_by_handle(h).is_none());
        assert_eq!(log.borrow().len(), 2);
        assert_eq!(registry.delete(&*a), Err(BindError::ItemDeleted { id: a.id }));
    }

    #[test]
    fn test_delete_deferred() {
        let native = Rc::new(HeadlessNative::with_delete_mode(DeleteMode::Deferred));
        let registry = HandleRegistry::<Probe>::new(native.clone());
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = Probe::new(&registry, &log);
        let h = native.create_item();
        Probe::bind(&registry, &a, h).unwrap();

        registry.delete(&*a).unwrap();
        assert!(a.handle().is_null());
        assert!(log.borrow().is_empty());

        native.flush_deletes();
        assert!(registry.lookup_by_handle(h).is_none());
        assert!(registry.lookup_by_id(a.id).is_none());
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn test_forget_makes_no_native_call() {
        let (native, registry, log) = setup();
        let a = Probe::new(&registry, &log);
        let h = native.create_item();
        Probe::bind(&registry, &a, h).unwrap();
        let calls = native.call_count();

        registry.forget(a.id);

        assert_eq!(native.call_count(), calls);
        assert!(registry.lookup_by_handle(h).is_none());
        // Callback is still installed natively and now resolves to nothing
        native.destroy(h);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_delete_two_items_scenario() {
        let native = Rc::new(HeadlessNative::new());
        let registry = HandleRegistry::<Probe>::new(native.clone());
        let log = Rc::new(RefCell::new(Vec::new()));
        let ha = NativeHandle::from_raw(0xaa);
        let hb = NativeHandle::from_raw(0xbb);
        native.adopt(ha);
        native.adopt(hb);

        let a = Probe::new(&registry, &log);
        Probe::bind(&registry, &a, ha).unwrap();
        let b = Probe::new(&registry, &log);
        Probe::bind(&registry, &b, hb).unwrap();
        assert_eq!(a.id.as_u32(), 0);
        assert_eq!(b.id.as_u32(), 1);

        registry.on_native_delete(ha);

        assert!(registry.lookup_by_id(ItemId::new(0)).is_none());
        assert!(registry.lookup_by_handle(ha).is_none());
        assert!(Rc::ptr_eq(&registry.lookup_by_id(ItemId::new(1)).unwrap(), &b));
        assert!(Rc::ptr_eq(&registry.lookup_by_handle(hb).unwrap(), &b));
    }
}
