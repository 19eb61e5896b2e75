//! Simulate command - drive the bridge against the headless toolkit
//!
//! Builds a grid with a handful of items, routes `selected` signals through a
//! [`SmartEvent`](tether_core::SmartEvent), then tears items down both ways
//! (explicit delete and toolkit-side destruction) and reports what the
//! registry and signal tables look like at the end.

use std::cell::Cell;
use std::rc::Rc;

use anyhow::Result;
use tracing::{info, warn};

use tether_core::headless::{DeleteMode, HeadlessNative};
use tether_core::{
    downcast_item, EventHandler, EventInfo, GenGridItem, ItemContext, ItemEvent, ItemObject,
    NativeHandle,
};

/// Outcome of one simulation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationReport {
    pub created: usize,
    pub selections: usize,
    pub deleted_notifications: usize,
    pub deleted_explicitly: usize,
    pub destroyed_natively: usize,
    pub remaining_items: usize,
    pub remaining_registrations: usize,
}

pub fn run(items: usize, mode: DeleteMode) -> Result<SimulationReport> {
    let native = Rc::new(HeadlessNative::with_delete_mode(mode));
    let ctx = ItemContext::headless(&native);
    let grid = native.create_object();

    let grid_name = Rc::new("grid".to_string());
    let selected = ctx.item_event(Rc::downgrade(&grid_name), grid, "selected");
    let selections = Rc::new(Cell::new(0));
    let deleted = Rc::new(Cell::new(0));

    let selections_clone = selections.clone();
    selected.subscribe(&EventHandler::new(move |grid: &String, args: &ItemEvent| {
        let item = args.item.clone().and_then(downcast_item::<GenGridItem>);
        match item {
            Some(item) => {
                selections_clone.set(selections_clone.get() + 1);
                let row = item.data::<usize>().map(|r| *r);
                info!(%grid, id = %item.id(), handle = %args.handle, ?row, "selected");
                if let Err(err) = item.set_selected(true) {
                    warn!(id = %item.id(), %err, "could not mark item selected");
                }
            }
            None => info!(%grid, handle = %args.handle, "selected unknown item"),
        }
    }))?;

    let mut grid_items = Vec::with_capacity(items);
    for row in 0..items {
        let item = GenGridItem::new(&ctx, native.create_item(), row)?;
        item.set_part_text(Some("elm.text"), &format!("Row {}", row))?;
        let deleted_clone = deleted.clone();
        item.on_deleted(EventHandler::new(move |item: &ItemObject, _: &()| {
            deleted_clone.set(deleted_clone.get() + 1);
            info!(id = %item.id(), "deleted");
        }));
        grid_items.push(item);
    }
    info!(count = grid_items.len(), "items created");

    let handles: Vec<NativeHandle> = grid_items.iter().map(|item| item.handle()).collect();
    for handle in &handles {
        native.fire(grid, "selected", EventInfo::from_raw(handle.as_raw()));
    }

    // Even rows are deleted from Rust, odd rows by the toolkit itself
    let mut deleted_explicitly = 0;
    let mut destroyed_natively = 0;
    for (row, item) in grid_items.iter().enumerate() {
        if row % 2 == 0 {
            item.delete()?;
            deleted_explicitly += 1;
        } else if native.destroy(item.handle()) {
            destroyed_natively += 1;
        }
    }

    // A deleted item still resolves until its native delete runs, and its
    // forwarding calls fail; afterwards it resolves to nothing
    if let Some(first) = handles.first() {
        native.fire(grid, "selected", EventInfo::from_raw(first.as_raw()));
    }

    if mode == DeleteMode::Deferred {
        let flushed = native.flush_deletes();
        info!(flushed, "deferred deletes flushed");
    }

    selected.shutdown();

    let report = SimulationReport {
        created: grid_items.len(),
        selections: selections.get(),
        deleted_notifications: deleted.get(),
        deleted_explicitly,
        destroyed_natively,
        remaining_items: ctx.registry().len(),
        remaining_registrations: native.total_registrations(),
    };
    info!(?report, "simulation finished");
    Ok(report)
}
