//! Item wrappers
//!
//! [`ItemObject`] is the shared base of every toolkit item (grid cells, list
//! rows, toolbar entries). Concrete kinds embed one and implement [`Item`];
//! the [`ItemRegistry`] stores them as `dyn Item` so callbacks carrying a raw
//! item handle can be resolved back to the concrete wrapper.
//!
//! # Example
//!
//! ```rust
//! use std::rc::{Rc, Weak};
//! use tether_core::headless::HeadlessNative;
//! use tether_core::{downcast_item, EventHandler, GenGridItem, ItemContext, ItemObject};
//!
//! # fn main() -> tether_core::Result<()> {
//! let native = Rc::new(HeadlessNative::new());
//! let ctx = ItemContext::headless(&native);
//! let item = GenGridItem::new(&ctx, native.create_item(), "row data")?;
//!
//! item.set_part_text(Some("elm.text"), "Hello")?;
//! item.on_deleted(EventHandler::new(|item: &ItemObject, _: &()| {
//!     println!("{} gone", item.id())
//! }));
//!
//! let found = ctx
//!     .item_by_handle(item.handle())
//!     .and_then(downcast_item::<GenGridItem>);
//! assert!(found.is_some_and(|found| Rc::ptr_eq(&found, &item)));
//! # Ok(())
//! # }
//! ```

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::trace;

use crate::error::{BindError, Result};
use crate::handle::{EventInfo, ItemId, NativeHandle};
use crate::headless::HeadlessNative;
use crate::native::{ItemNative, NativeLifecycle, SignalSource};
use crate::registry::{HandleRegistry, Wrapper};
use crate::smart_event::{EventHandler, SmartEvent};

/// Cache key for the unnamed part
const DEFAULT_PART: &str = "__default__";

/// Registry of every live item on the UI thread
pub type ItemRegistry = HandleRegistry<dyn Item>;

/// Listener for an item's deletion
pub type DeletedHandler = EventHandler<ItemObject, ()>;

/// A concrete item kind
pub trait Item: Any {
    /// The embedded base object
    fn item(&self) -> &ItemObject;

    /// Kind-specific teardown when the native item is destroyed
    fn on_invalidate(&self) {}

    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;
}

/// Recover the concrete kind of a registry lookup
pub fn downcast_item<T: Item>(item: Rc<dyn Item>) -> Option<Rc<T>> {
    item.into_any().downcast::<T>().ok()
}

impl Wrapper for dyn Item {
    fn id(&self) -> ItemId {
        self.item().id()
    }

    fn handle(&self) -> NativeHandle {
        self.item().handle()
    }

    fn notify_deleted(&self) {
        self.item().notify_deleted();
    }

    fn invalidate(&self) {
        self.on_invalidate();
        self.item().part_contents.borrow_mut().clear();
    }

    fn release_handle(&self) {
        self.item().handle.set(NativeHandle::NULL);
    }
}

/// Shared toolkit access for items created on one UI thread
#[derive(Clone)]
pub struct ItemContext {
    registry: Rc<ItemRegistry>,
    native: Rc<dyn ItemNative>,
    signals: Rc<dyn SignalSource>,
}

impl ItemContext {
    pub fn new(
        lifecycle: Rc<dyn NativeLifecycle>,
        native: Rc<dyn ItemNative>,
        signals: Rc<dyn SignalSource>,
    ) -> Self {
        Self {
            registry: ItemRegistry::new(lifecycle),
            native,
            signals,
        }
    }

    /// Context backed entirely by the in-memory toolkit
    pub fn headless(native: &Rc<HeadlessNative>) -> Self {
        Self::new(native.clone(), native.clone(), native.clone())
    }

    pub fn registry(&self) -> &Rc<ItemRegistry> {
        &self.registry
    }

    pub fn signals(&self) -> &Rc<dyn SignalSource> {
        &self.signals
    }

    pub fn item_by_id(&self, id: ItemId) -> Option<Rc<dyn Item>> {
        self.registry.lookup_by_id(id)
    }

    pub fn item_by_handle(&self, handle: NativeHandle) -> Option<Rc<dyn Item>> {
        self.registry.lookup_by_handle(handle)
    }

    /// Bridge for a widget signal whose payload is an item handle
    ///
    /// Container widgets report per-item events (`selected`, `realized`,
    /// `longpressed`) on themselves and pass the item as the event info.
    /// Handlers get the resolved wrapper, or `None` for items without one.
    pub fn item_event<S: ?Sized + 'static>(
        &self,
        sender: Weak<S>,
        widget: NativeHandle,
        event_name: impl Into<String>,
    ) -> SmartEvent<S, ItemEvent> {
        let registry = Rc::downgrade(&self.registry);
        SmartEvent::with_parser(
            sender,
            widget,
            event_name,
            self.signals.clone(),
            move |_, info: EventInfo| ItemEvent {
                handle: NativeHandle::from_raw(info.as_raw()),
                item: registry
                    .upgrade()
                    .and_then(|r| r.lookup_by_handle(NativeHandle::from_raw(info.as_raw()))),
            },
        )
    }
}

/// Arguments of a per-item widget signal
#[derive(Clone)]
pub struct ItemEvent {
    /// Raw item handle from the payload
    pub handle: NativeHandle,
    /// Wrapper registered for that handle
    pub item: Option<Rc<dyn Item>>,
}

/// Base state shared by every item kind
pub struct ItemObject {
    id: ItemId,
    handle: Cell<NativeHandle>,
    ctx: ItemContext,
    deleted: RefCell<SmallVec<[DeletedHandler; 1]>>,
    part_contents: RefCell<FxHashMap<String, NativeHandle>>,
}

impl ItemObject {
    /// Allocate an id; the object has no handle until [`bind`](Self::bind)
    pub fn new(ctx: &ItemContext) -> Result<Self> {
        Ok(Self {
            id: ctx.registry.next_id()?,
            handle: Cell::new(NativeHandle::NULL),
            ctx: ctx.clone(),
            deleted: RefCell::new(SmallVec::new()),
            part_contents: RefCell::new(FxHashMap::default()),
        })
    }

    /// Bind `item` to a native handle and make it reachable from the registry
    ///
    /// Rebinding moves the item off its old handle. Binding to the handle it
    /// already holds does nothing.
    pub fn bind<T: Item>(item: &Rc<T>, handle: NativeHandle) -> Result<()> {
        let base = item.item();
        let entry: Rc<dyn Item> = item.clone();
        base.ctx.registry.register(&entry, handle)?;
        base.handle.set(handle);
        Ok(())
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    /// Native handle, [`NativeHandle::NULL`] once deleted
    pub fn handle(&self) -> NativeHandle {
        self.handle.get()
    }

    pub fn is_deleted(&self) -> bool {
        self.handle.get().is_null()
    }

    /// Handle for a native call, or [`BindError::ItemDeleted`]
    pub fn live_handle(&self) -> Result<NativeHandle> {
        let handle = self.handle.get();
        if handle.is_null() {
            return Err(BindError::ItemDeleted { id: self.id });
        }
        Ok(handle)
    }

    pub fn context(&self) -> &ItemContext {
        &self.ctx
    }

    pub(crate) fn native(&self) -> &dyn ItemNative {
        &*self.ctx.native
    }

    pub fn is_enabled(&self) -> Result<bool> {
        let handle = self.live_handle()?;
        Ok(!self.native().item_disabled_get(handle))
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        let handle = self.live_handle()?;
        self.native().item_disabled_set(handle, !enabled);
        Ok(())
    }

    pub fn set_part_text(&self, part: Option<&str>, text: &str) -> Result<()> {
        let handle = self.live_handle()?;
        self.native().item_part_text_set(handle, part, text);
        Ok(())
    }

    pub fn part_text(&self, part: Option<&str>) -> Result<Option<String>> {
        let handle = self.live_handle()?;
        Ok(self.native().item_part_text_get(handle, part))
    }

    /// Put `content` into `part`
    ///
    /// The part's previous content is destroyed unless `preserve_old` is set,
    /// in which case it is detached and left to the caller.
    pub fn set_part_content(
        &self,
        part: Option<&str>,
        content: NativeHandle,
        preserve_old: bool,
    ) -> Result<()> {
        let handle = self.live_handle()?;
        let native = self.native();

        let old = native.item_part_content_unset(handle, part);
        if !old.is_null() && !preserve_old {
            trace!(id = %self.id, %old, "destroying replaced part content");
            native.object_del(old);
        }
        native.item_part_content_set(handle, part, content);

        self.part_contents
            .borrow_mut()
            .insert(part.unwrap_or(DEFAULT_PART).to_string(), content);
        Ok(())
    }

    /// Content last set into `part` through this wrapper
    pub fn part_content(&self, part: Option<&str>) -> Option<NativeHandle> {
        self.part_contents
            .borrow()
            .get(part.unwrap_or(DEFAULT_PART))
            .copied()
    }

    /// Listen for the native item's destruction
    pub fn on_deleted(&self, handler: DeletedHandler) {
        self.deleted.borrow_mut().push(handler);
    }

    /// Remove every registration of `handler`, returning how many
    pub fn remove_deleted(&self, handler: &DeletedHandler) -> usize {
        let mut deleted = self.deleted.borrow_mut();
        let before = deleted.len();
        deleted.retain(|h| h != handler);
        before - deleted.len()
    }

    /// Destroy the native item
    ///
    /// The handle is null afterwards; `Deleted` fires when the toolkit runs
    /// the item's delete callback.
    pub fn delete(&self) -> Result<()> {
        self.ctx.registry.delete(self as &dyn Item)
    }

    fn notify_deleted(&self) {
        let handlers: SmallVec<[DeletedHandler; 1]> = self.deleted.borrow().clone();
        for handler in &handlers {
            handler.call(self, &());
        }
    }
}

impl Item for ItemObject {
    fn item(&self) -> &ItemObject {
        self
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

impl Drop for ItemObject {
    fn drop(&mut self) {
        self.ctx.registry.forget(self.id);
    }
}

impl std::fmt::Debug for ItemObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemObject")
            .field("id", &self.id)
            .field("handle", &self.handle.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::DeleteMode;

    fn plain_item(ctx: &ItemContext, handle: NativeHandle) -> Rc<ItemObject> {
        let item = Rc::new(ItemObject::new(ctx).unwrap());
        ItemObject::bind(&item, handle).unwrap();
        item
    }

    #[test]
    fn test_bind_and_lookup() {
        let native = Rc::new(HeadlessNative::new());
        let ctx = ItemContext::headless(&native);
        let h = native.create_item();
        let item = plain_item(&ctx, h);

        let found = ctx.item_by_handle(h).unwrap();
        assert_eq!(found.item().id(), item.id());
        assert!(downcast_item::<ItemObject>(found).is_some());
        assert!(ctx.item_by_id(item.id()).is_some());
    }

    #[test]
    fn test_enabled_and_text_forwarding() {
        let native = Rc::new(HeadlessNative::new());
        let ctx = ItemContext::headless(&native);
        let item = plain_item(&ctx, native.create_item());

        assert!(item.is_enabled().unwrap());
        item.set_enabled(false).unwrap();
        assert!(!item.is_enabled().unwrap());

        item.set_part_text(None, "title").unwrap();
        item.set_part_text(Some("elm.text.sub"), "subtitle").unwrap();
        assert_eq!(item.part_text(None).unwrap().as_deref(), Some("title"));
        assert_eq!(
            item.part_text(Some("elm.text.sub")).unwrap().as_deref(),
            Some("subtitle")
        );
    }

    #[test]
    fn test_part_content_replaces_and_destroys_old() {
        let native = Rc::new(HeadlessNative::new());
        let ctx = ItemContext::headless(&native);
        let item = plain_item(&ctx, native.create_item());
        let first = native.create_object();
        let second = native.create_object();
        let third = native.create_object();

        item.set_part_content(Some("icon"), first, false).unwrap();
        item.set_part_content(Some("icon"), second, false).unwrap();
        assert!(native.was_destroyed(first));

        item.set_part_content(Some("icon"), third, true).unwrap();
        assert!(native.is_alive(second));
        assert_eq!(item.part_content(Some("icon")), Some(third));
    }

    #[test]
    fn test_default_part_cached_under_default_key() {
        let native = Rc::new(HeadlessNative::new());
        let ctx = ItemContext::headless(&native);
        let item = plain_item(&ctx, native.create_item());
        let content = native.create_object();

        item.set_part_content(None, content, false).unwrap();

        assert_eq!(item.part_content(None), Some(content));
        assert_eq!(item.part_content(Some(DEFAULT_PART)), Some(content));
    }

    #[test]
    fn test_deleted_fires_and_clears_state() {
        let native = Rc::new(HeadlessNative::new());
        let ctx = ItemContext::headless(&native);
        let h = native.create_item();
        let item = plain_item(&ctx, h);
        item.set_part_content(None, native.create_object(), false)
            .unwrap();

        let seen = Rc::new(Cell::new(None));
        let seen_clone = seen.clone();
        item.on_deleted(EventHandler::new(move |item: &ItemObject, _: &()| {
            seen_clone.set(Some(item.id()));
        }));

        item.delete().unwrap();

        assert_eq!(seen.get(), Some(item.id()));
        assert!(item.is_deleted());
        assert!(item.part_content(None).is_none());
        assert!(ctx.item_by_handle(h).is_none());
        assert!(ctx.item_by_id(item.id()).is_none());
    }

    #[test]
    fn test_stale_use_fails_fast() {
        let native = Rc::new(HeadlessNative::new());
        let ctx = ItemContext::headless(&native);
        let item = plain_item(&ctx, native.create_item());
        native.destroy(item.handle());
        let calls = native.call_count();

        let expected = Err(BindError::ItemDeleted { id: item.id() });
        assert_eq!(item.is_enabled(), expected.clone().map(|_: ()| true));
        assert_eq!(item.set_part_text(None, "x"), expected);
        assert_eq!(item.delete(), expected);
        assert_eq!(native.call_count(), calls);
    }

    #[test]
    fn test_deleted_handler_can_query_registry() {
        let native = Rc::new(HeadlessNative::new());
        let ctx = ItemContext::headless(&native);
        let h = native.create_item();
        let item = plain_item(&ctx, h);

        let found_during = Rc::new(Cell::new(false));
        let found_clone = found_during.clone();
        let ctx_clone = ctx.clone();
        item.on_deleted(EventHandler::new(move |_: &ItemObject, _: &()| {
            found_clone.set(ctx_clone.item_by_handle(h).is_some());
        }));

        native.destroy(h);

        assert!(found_during.get());
        assert!(ctx.item_by_handle(h).is_none());
    }

    #[test]
    fn test_deleted_handler_may_delete_again() {
        let native = Rc::new(HeadlessNative::new());
        let ctx = ItemContext::headless(&native);
        let item = plain_item(&ctx, native.create_item());
        let hits = Rc::new(Cell::new(0));
        let hits_clone = hits.clone();
        item.on_deleted(EventHandler::new(move |item: &ItemObject, _: &()| {
            hits_clone.set(hits_clone.get() + 1);
            // Handle is still set here; the toolkit no longer knows it
            let _ = item.delete();
        }));

        item.delete().unwrap();

        assert_eq!(hits.get(), 1);
        assert!(item.is_deleted());
    }

    #[test]
    fn test_deleted_handler_may_rebind() {
        let native = Rc::new(HeadlessNative::new());
        let ctx = ItemContext::headless(&native);
        let old = native.create_item();
        let new = native.create_item();
        let item = plain_item(&ctx, old);

        let weak = Rc::downgrade(&item);
        item.on_deleted(EventHandler::new(move |_: &ItemObject, _: &()| {
            if let Some(item) = weak.upgrade() {
                ItemObject::bind(&item, new).unwrap();
            }
        }));

        native.destroy(old);

        assert_eq!(item.handle(), new);
        assert!(ctx.item_by_handle(old).is_none());
        assert_eq!(ctx.item_by_handle(new).map(|i| i.item().id()), Some(item.id()));
        assert!(ctx.item_by_id(item.id()).is_some());
        assert!(native.has_delete_callback(new));
        assert!(item.set_part_text(None, "still live").is_ok());
    }

    #[test]
    fn test_remove_deleted_handler() {
        let native = Rc::new(HeadlessNative::new());
        let ctx = ItemContext::headless(&native);
        let item = plain_item(&ctx, native.create_item());
        let hits = Rc::new(Cell::new(0));
        let hits_clone = hits.clone();
        let handler = EventHandler::new(move |_: &ItemObject, _: &()| {
            hits_clone.set(hits_clone.get() + 1)
        });

        item.on_deleted(handler.clone());
        item.on_deleted(handler.clone());
        assert_eq!(item.remove_deleted(&handler), 2);

        item.delete().unwrap();
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn test_deferred_delete_fires_after_flush() {
        let native = Rc::new(HeadlessNative::with_delete_mode(DeleteMode::Deferred));
        let ctx = ItemContext::headless(&native);
        let h = native.create_item();
        let item = plain_item(&ctx, h);
        let hits = Rc::new(Cell::new(0));
        let hits_clone = hits.clone();
        item.on_deleted(EventHandler::new(move |_: &ItemObject, _: &()| {
            hits_clone.set(hits_clone.get() + 1)
        }));

        item.delete().unwrap();
        assert!(item.is_deleted());
        assert_eq!(hits.get(), 0);

        native.flush_deletes();
        assert_eq!(hits.get(), 1);
        assert!(ctx.item_by_handle(h).is_none());
    }

    #[test]
    fn test_drop_forgets_item() {
        let native = Rc::new(HeadlessNative::new());
        let ctx = ItemContext::headless(&native);
        let h = native.create_item();
        let id = {
            let item = plain_item(&ctx, h);
            item.id()
        };

        assert!(ctx.item_by_id(id).is_none());
        assert!(ctx.registry().is_empty());
        assert!(native.is_alive(h));
        // Late delete callback resolves to nothing
        native.destroy(h);
    }

    #[test]
    fn test_item_event_resolves_wrapper() {
        let native = Rc::new(HeadlessNative::new());
        let ctx = ItemContext::headless(&native);
        let grid = native.create_object();
        let h = native.create_item();
        let item = plain_item(&ctx, h);
        let sender = Rc::new("grid");
        let event = ctx.item_event(Rc::downgrade(&sender), grid, "selected");

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        event
            .subscribe(&EventHandler::new(move |_: &&'static str, args: &ItemEvent| {
                seen_clone
                    .borrow_mut()
                    .push(args.item.as_ref().map(|i| i.item().id()));
            }))
            .unwrap();

        native.fire(grid, "selected", EventInfo::from_raw(h.as_raw()));
        native.fire(grid, "selected", EventInfo::from_raw(0xdead));

        assert_eq!(*seen.borrow(), vec![Some(item.id()), None]);
    }
}
