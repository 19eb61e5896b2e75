//! Grid items

use std::any::Any;
use std::cell::RefCell;
use std::ops::Deref;
use std::rc::Rc;

use tracing::debug;

use crate::error::Result;
use crate::handle::NativeHandle;
use crate::item::{Item, ItemContext, ItemObject};

/// One cell of a generic grid
///
/// Carries the caller's row data until the native item is destroyed.
pub struct GenGridItem {
    base: ItemObject,
    data: RefCell<Option<Rc<dyn Any>>>,
}

impl GenGridItem {
    pub fn new<D: Any>(ctx: &ItemContext, handle: NativeHandle, data: D) -> Result<Rc<Self>> {
        let item = Rc::new(Self {
            base: ItemObject::new(ctx)?,
            data: RefCell::new(Some(Rc::new(data))),
        });
        ItemObject::bind(&item, handle)?;
        Ok(item)
    }

    pub fn is_selected(&self) -> Result<bool> {
        let handle = self.base.live_handle()?;
        Ok(self.base.native().gengrid_item_selected_get(handle))
    }

    pub fn set_selected(&self, selected: bool) -> Result<()> {
        let handle = self.base.live_handle()?;
        self.base.native().gengrid_item_selected_set(handle, selected);
        Ok(())
    }

    /// Ask the grid to re-realize this cell
    pub fn update(&self) -> Result<()> {
        let handle = self.base.live_handle()?;
        self.base.native().gengrid_item_update(handle);
        Ok(())
    }

    /// Row data, if still attached and of type `D`
    pub fn data<D: Any>(&self) -> Option<Rc<D>> {
        self.data.borrow().clone()?.downcast::<D>().ok()
    }
}

impl Item for GenGridItem {
    fn item(&self) -> &ItemObject {
        &self.base
    }

    fn on_invalidate(&self) {
        debug!(id = %self.base.id(), "grid item invalidated");
        self.data.borrow_mut().take();
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

impl Deref for GenGridItem {
    type Target = ItemObject;

    fn deref(&self) -> &ItemObject {
        &self.base
    }
}
