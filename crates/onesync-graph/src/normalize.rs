//! Delta page normalization
//!
//! Every fetched delta page runs through five stages, in this order:
//!
//! 1. Percent-decode names (a name that fails to decode is kept as is)
//! 2. Drop package items (OneNote notebooks and similar)
//! 3. Clear content hashes on deleted items
//! 4. Deduplicate by id, keeping the last occurrence at its own position
//! 5. Within each parent, move deletions ahead of live items
//!
//! Stage 5 is a slot-preserving stable partition: a parent's items are
//! reordered only among the positions that parent already occupied, so items
//! of other parents never move. A consumer applying the page in order then
//! sees a delete of `a.txt` before a create of a new `a.txt` in the same
//! folder.

use std::collections::HashMap;

use onesync_core::domain::{DriveId, Item};
use percent_encoding::percent_decode_str;
use tracing::debug;

/// Runs the full pipeline over one page of items
pub fn normalize(items: Vec<Item>) -> Vec<Item> {
    let received = items.len();

    let mut items = items;
    decode_names(&mut items);
    drop_packages(&mut items);
    clear_deleted_hashes(&mut items);
    let items = dedup_keep_last(items);
    let items = deletions_first(items);

    if items.len() != received {
        debug!(received, kept = items.len(), "Normalized delta page");
    }
    items
}

fn decode_names(items: &mut [Item]) {
    for item in items.iter_mut() {
        if !item.name.contains('%') {
            continue;
        }
        match percent_decode_str(&item.name).decode_utf8() {
            Ok(decoded) => item.name = decoded.into_owned(),
            Err(_) => debug!(id = %item.id, "Keeping undecodable item name"),
        }
    }
}

fn drop_packages(items: &mut Vec<Item>) {
    items.retain(|item| !item.is_package);
}

fn clear_deleted_hashes(items: &mut [Item]) {
    for item in items.iter_mut().filter(|item| item.is_deleted) {
        item.clear_hashes();
    }
}

fn dedup_keep_last(items: Vec<Item>) -> Vec<Item> {
    let mut last_seen: HashMap<&str, usize> = HashMap::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        last_seen.insert(item.id.as_str(), index);
    }
    let keep: Vec<bool> = items
        .iter()
        .enumerate()
        .map(|(index, item)| last_seen.get(item.id.as_str()) == Some(&index))
        .collect();

    items
        .into_iter()
        .zip(keep)
        .filter_map(|(item, keep)| keep.then_some(item))
        .collect()
}

fn parent_key(item: &Item) -> (DriveId, Option<String>) {
    (item.parent_drive_id.clone(), item.parent_id.clone())
}

fn deletions_first(items: Vec<Item>) -> Vec<Item> {
    let mut slots_by_parent: HashMap<(DriveId, Option<String>), Vec<usize>> = HashMap::new();
    for (index, item) in items.iter().enumerate() {
        slots_by_parent
            .entry(parent_key(item))
            .or_default()
            .push(index);
    }

    let deleted: Vec<bool> = items.iter().map(|item| item.is_deleted).collect();
    let mut source: Vec<Option<Item>> = items.into_iter().map(Some).collect();
    let mut placed: Vec<Option<Item>> = (0..source.len()).map(|_| None).collect();

    for slots in slots_by_parent.values() {
        let (gone, live): (Vec<usize>, Vec<usize>) = slots.iter().partition(|&&i| deleted[i]);
        for (&slot, &from) in slots.iter().zip(gone.iter().chain(live.iter())) {
            placed[slot] = source[from].take();
        }
    }

    placed.into_iter().flatten().collect()
}
