//! Tether Core
//!
//! Boundary primitives for binding a UI-thread-affine native toolkit to Rust:
//!
//! - **Handles**: opaque [`NativeHandle`] tokens for toolkit-owned objects
//! - **Handle Registry**: reverse lookup from ids and handles to wrappers,
//!   kept in step with native deletion
//! - **Smart Events**: typed add/remove listeners over named native signals
//! - **Items**: the item wrapper base and the grid item kind built on it
//! - **Features**: platform feature-key queries
//! - **Headless**: an in-memory toolkit implementing every boundary trait
//!
//! Everything here is `!Send`. Build it on the toolkit's UI thread and use it
//! only there.
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//! use tether_core::headless::HeadlessNative;
//! use tether_core::{EventHandler, GenGridItem, ItemContext};
//!
//! let native = Rc::new(HeadlessNative::new());
//! let ctx = ItemContext::headless(&native);
//!
//! let handle = native.create_item();
//! let item = GenGridItem::new(&ctx, handle, "first row").unwrap();
//! item.on_deleted(EventHandler::new(|item: &tether_core::ItemObject, _: &()| {
//!     println!("item {} deleted", item.id());
//! }));
//!
//! assert!(ctx.item_by_handle(handle).is_some());
//! item.delete().unwrap();
//! assert!(ctx.item_by_handle(handle).is_none());
//! ```

pub mod error;
pub mod features;
pub mod gengrid;
pub mod handle;
pub mod headless;
pub mod item;
pub mod native;
pub mod registry;
pub mod smart_event;

pub use error::{BindError, Result};
pub use features::{Features, SystemInfo};
pub use gengrid::GenGridItem;
pub use handle::{EventInfo, ItemId, NativeHandle};
pub use item::{downcast_item, DeletedHandler, Item, ItemContext, ItemEvent, ItemObject, ItemRegistry};
pub use native::{DeleteCallback, ItemNative, NativeLifecycle, SignalSource, SmartCallback};
pub use registry::{HandleRegistry, RegistryStats, Wrapper};
pub use smart_event::{EventHandler, InfoParser, SmartEvent};
