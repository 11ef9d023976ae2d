//! Arena owning every tile of a body.
//!
//! Tiles refer to each other by [`TileKey`]. Retiring a tile marks its whole
//! subtree and queues it; the tiles stay addressable until [`TileStore::purge`]
//! frees them, so in-flight job results can still find (and ignore) them.

use slab::Slab;
use tracing::trace;

use crate::tile::{Tile, TileKey};

struct Entry {
    generation: u32,
    tile: Tile,
}

/// Slab of tiles with generational keys and deferred deletion.
#[derive(Default)]
pub(crate) struct TileStore {
    slots: Slab<Entry>,
    next_generation: u32,
    pending: Vec<TileKey>,
}

impl TileStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tile and return its key.
    pub fn insert(&mut self, tile: Tile) -> TileKey {
        self.next_generation = self.next_generation.wrapping_add(1);
        let generation = self.next_generation;
        let slot = self.slots.insert(Entry { generation, tile });
        TileKey {
            slot: slot as u32,
            generation,
        }
    }

    /// Look up a live or retired tile.
    pub fn get(&self, key: TileKey) -> Option<&Tile> {
        self.slots
            .get(key.slot as usize)
            .filter(|entry| entry.generation == key.generation)
            .map(|entry| &entry.tile)
    }

    /// Mutable lookup.
    pub fn get_mut(&mut self, key: TileKey) -> Option<&mut Tile> {
        self.slots
            .get_mut(key.slot as usize)
            .filter(|entry| entry.generation == key.generation)
            .map(|entry| &mut entry.tile)
    }

    /// Whether `key` still resolves.
    pub fn contains(&self, key: TileKey) -> bool {
        self.get(key).is_some()
    }

    /// Number of tiles held, retired ones included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Roots of subtrees awaiting [`TileStore::purge`].
    pub fn pending(&self) -> &[TileKey] {
        &self.pending
    }

    /// Mark `key` and all its descendants retired and queue them for deletion.
    ///
    /// Returns `false` if the key is stale or already retired.
    pub fn retire(&mut self, key: TileKey) -> bool {
        match self.get(key) {
            Some(tile) if !tile.retired => {}
            _ => return false,
        }
        let mut stack = vec![key];
        while let Some(current) = stack.pop() {
            if let Some(tile) = self.get_mut(current) {
                tile.retired = true;
                tile.job = None;
                if let Some(children) = tile.children {
                    stack.extend(children);
                }
            }
        }
        self.pending.push(key);
        true
    }

    /// Free every queued subtree. Returns the number of tiles removed.
    pub fn purge(&mut self) -> usize {
        let mut removed = 0;
        let mut stack = std::mem::take(&mut self.pending);
        while let Some(key) = stack.pop() {
            if !self.contains(key) {
                continue;
            }
            let entry = self.slots.remove(key.slot as usize);
            if let Some(children) = entry.tile.children {
                stack.extend(children);
            }
            removed += 1;
        }
        if removed > 0 {
            trace!(removed, remaining = self.slots.len(), "purged retired tiles");
        }
        removed
    }

    /// Iterate over all keys and tiles.
    pub fn iter(&self) -> impl Iterator<Item = (TileKey, &Tile)> {
        self.slots.iter().map(|(slot, entry)| {
            (
                TileKey {
                    slot: slot as u32,
                    generation: entry.generation,
                },
                &entry.tile,
            )
        })
    }
}
