//! Typed listeners over named native signals
//!
//! A [`SmartEvent`] owns the subscription side of one `(object, event name)`
//! signal. Each [`subscribe`](SmartEvent::subscribe) wraps the handler in a
//! fresh trampoline and registers that trampoline natively, so every add maps
//! to exactly one native registration:
//!
//! ```text
//! subscribe(F) ──► trampoline #1 ──► callback_add(obj, "selected", #1)
//! subscribe(F) ──► trampoline #2 ──► callback_add(obj, "selected", #2)
//! subscribe(G) ──► trampoline #3 ──► callback_add(obj, "selected", #3)
//!
//! unsubscribe(F) ──► callback_del #1, callback_del #2
//! ```
//!
//! Handlers are matched by identity: clones of one [`EventHandler`] are equal,
//! two handlers built from identical closures are not. Unsubscribing a handler
//! removes every registration it was added under.
//!
//! # Example
//!
//! ```ignore
//! use tether_core::smart_event::{EventHandler, SmartEvent};
//!
//! let clicked = SmartEvent::<Button>::new(Rc::downgrade(&button), handle, "clicked", native.clone());
//! let on_click = EventHandler::new(|button: &Button, _: &()| button.flash());
//!
//! clicked.subscribe(&on_click)?;
//! clicked.unsubscribe(&on_click);
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::error::{BindError, Result};
use crate::handle::{EventInfo, NativeHandle};
use crate::native::{same_callback, SignalSource, SmartCallback};

/// Turns a signal's raw payload into typed event arguments
pub type InfoParser<A> = Rc<dyn Fn(NativeHandle, EventInfo) -> A>;

/// A listener, compared by identity
pub struct EventHandler<S: ?Sized, A> {
    callback: Rc<dyn Fn(&S, &A)>,
}

impl<S: ?Sized, A> EventHandler<S, A> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&S, &A) + 'static,
    {
        Self {
            callback: Rc::new(f),
        }
    }

    pub fn call(&self, sender: &S, args: &A) {
        (self.callback)(sender, args)
    }
}

impl<S: ?Sized, A> Clone for EventHandler<S, A> {
    fn clone(&self) -> Self {
        Self {
            callback: self.callback.clone(),
        }
    }
}

impl<S: ?Sized, A> PartialEq for EventHandler<S, A> {
    fn eq(&self, other: &Self) -> bool {
        same_callback(&self.callback, &other.callback)
    }
}

impl<S: ?Sized, A> Eq for EventHandler<S, A> {}

impl<S: ?Sized, A> fmt::Debug for EventHandler<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventHandler({:p})", Rc::as_ptr(&self.callback) as *const ())
    }
}

struct NativeCallback<S: ?Sized, A> {
    callback: SmartCallback,
    handler: EventHandler<S, A>,
}

/// Subscription bridge for one named signal on one native object
///
/// Handlers receive the sender given at construction, not the raw object
/// pointer the toolkit passes to the trampoline.
///
/// The sender is held weakly, so a widget may own a bridge that names the
/// widget itself as sender. Signals arriving after the sender is dropped
/// are ignored.
pub struct SmartEvent<S: ?Sized + 'static, A: 'static = ()> {
    sender: Weak<S>,
    handle: NativeHandle,
    event_name: String,
    parser: InfoParser<A>,
    source: Rc<dyn SignalSource>,
    callbacks: RefCell<SmallVec<[NativeCallback<S, A>; 2]>>,
    shut_down: Cell<bool>,
}

impl<S: ?Sized + 'static, A: Default + 'static> SmartEvent<S, A> {
    /// Bridge whose handlers always receive `A::default()`
    pub fn new(
        sender: Weak<S>,
        handle: NativeHandle,
        event_name: impl Into<String>,
        source: Rc<dyn SignalSource>,
    ) -> Self {
        Self::with_parser(sender, handle, event_name, source, |_, _| A::default())
    }
}

impl<S: ?Sized + 'static, A: 'static> SmartEvent<S, A> {
    /// Bridge that builds each event's arguments from its native payload
    pub fn with_parser<P>(
        sender: Weak<S>,
        handle: NativeHandle,
        event_name: impl Into<String>,
        source: Rc<dyn SignalSource>,
        parser: P,
    ) -> Self
    where
        P: Fn(NativeHandle, EventInfo) -> A + 'static,
    {
        Self {
            sender,
            handle,
            event_name: event_name.into(),
            parser: Rc::new(parser),
            source,
            callbacks: RefCell::new(SmallVec::new()),
            shut_down: Cell::new(false),
        }
    }

    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    pub fn handle(&self) -> NativeHandle {
        self.handle
    }

    /// The sender, unless it has been dropped
    pub fn sender(&self) -> Option<Rc<S>> {
        self.sender.upgrade()
    }

    /// Live native registrations held by this bridge
    pub fn listener_count(&self) -> usize {
        self.callbacks.borrow().len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.get()
    }

    /// Add a listener
    ///
    /// Adding the same handler twice registers it twice.
    ///
    /// # Errors
    ///
    /// - [`BindError::EventShutDown`] after [`shutdown`](Self::shutdown) or
    ///   [`detach`](Self::detach)
    /// - [`BindError::NullHandle`] if the bridge was built on a null handle
    pub fn subscribe(&self, handler: &EventHandler<S, A>) -> Result<()> {
        if self.shut_down.get() {
            return Err(BindError::EventShutDown {
                event: self.event_name.clone(),
            });
        }
        if self.handle.is_null() {
            return Err(BindError::NullHandle);
        }

        let sender = self.sender.clone();
        let parser = self.parser.clone();
        let target = handler.clone();
        let callback: SmartCallback = Rc::new(move |object, info| {
            let Some(sender) = sender.upgrade() else {
                trace!(%object, "sender dropped, signal ignored");
                return;
            };
            let args = parser(object, info);
            target.call(&sender, &args);
        });

        self.callbacks.borrow_mut().push(NativeCallback {
            callback: callback.clone(),
            handler: handler.clone(),
        });
        self.source
            .callback_add(self.handle, &self.event_name, &callback);

        trace!(handle = %self.handle, event = %self.event_name, ?handler, "subscribed");
        Ok(())
    }

    /// Remove every registration made for `handler`, returning how many
    pub fn unsubscribe(&self, handler: &EventHandler<S, A>) -> usize {
        let removed: SmallVec<[SmartCallback; 2]> = {
            let mut callbacks = self.callbacks.borrow_mut();
            let mut removed = SmallVec::new();
            callbacks.retain(|entry| {
                if entry.handler == *handler {
                    removed.push(entry.callback.clone());
                    false
                } else {
                    true
                }
            });
            removed
        };

        for callback in &removed {
            self.source
                .callback_del(self.handle, &self.event_name, callback);
        }

        trace!(handle = %self.handle, event = %self.event_name, removed = removed.len(), "unsubscribed");
        removed.len()
    }

    /// Deregister every remaining listener and refuse new ones
    ///
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        if self.shut_down.replace(true) {
            return;
        }

        let callbacks = std::mem::take(&mut *self.callbacks.borrow_mut());
        for entry in &callbacks {
            self.source
                .callback_del(self.handle, &self.event_name, &entry.callback);
        }

        debug!(handle = %self.handle, event = %self.event_name, released = callbacks.len(), "shut down");
    }

    /// Forget every listener without calling the toolkit
    ///
    /// For use once the native object is gone and its registrations died with
    /// it. The bridge counts as shut down afterwards.
    pub fn detach(&self) {
        self.shut_down.set(true);
        let dropped = std::mem::take(&mut *self.callbacks.borrow_mut()).len();
        trace!(handle = %self.handle, event = %self.event_name, dropped, "detached");
    }
}

impl<S: ?Sized + 'static, A: 'static> Drop for SmartEvent<S, A> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<S: ?Sized + 'static, A: 'static> fmt::Debug for SmartEvent<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmartEvent")
            .field("handle", &self.handle)
            .field("event_name", &self.event_name)
            .field("listeners", &self.listener_count())
            .field("shut_down", &self.shut_down.get())
            .finish()
    }
}
