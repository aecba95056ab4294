//! Mark-and-sweep tile sets
//!
//! A reconciliation pass clears every mark, marks the tiles it still wants
//! and then sweeps. Sweeping is the only eviction: unmarked tiles are either
//! demoted into another set or disposed. There is no size bound.

use super::types::Tile;
use crate::{core::geo::PixelRect, prelude::HashMap, traits::Disposer};

/// Tiles keyed by `TileKey::id`
#[derive(Default)]
pub struct TileSet {
    tiles: HashMap<String, Tile>,
}

impl TileSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tiles.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Tile> {
        self.tiles.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Tile> {
        self.tiles.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Tile> {
        self.tiles.values_mut()
    }

    /// Ids currently held, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tiles.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Finds the exact tile instance a load was issued for
    pub fn find_by_serial(&mut self, id: &str, serial: u64) -> Option<&mut Tile> {
        self.tiles
            .get_mut(id)
            .filter(|tile| tile.serial() == serial)
    }

    /// Inserts a tile, disposing any incumbent with the same id
    pub fn add(&mut self, tile: Tile, disposer: &mut dyn Disposer) {
        let id = tile.key.id.clone();
        if let Some(incumbent) = self.tiles.insert(id, tile) {
            incumbent.dispose(disposer);
        }
    }

    /// Moves a tile, untouched, into `dest`
    pub fn move_to<'d>(
        &mut self,
        id: &str,
        dest: &'d mut TileSet,
        disposer: &mut dyn Disposer,
    ) -> Option<&'d mut Tile> {
        let tile = self.tiles.remove(id)?;
        dest.add(tile, disposer);
        dest.tiles.get_mut(id)
    }

    pub fn reset_marks(&mut self) {
        for tile in self.tiles.values_mut() {
            tile.mark = false;
        }
    }

    /// Moves every unmarked tile into `target`, or disposes it when there is
    /// no target. Returns the swept ids.
    pub fn sweep(&mut self, target: Option<&mut TileSet>, disposer: &mut dyn Disposer) -> Vec<String> {
        self.sweep_with(target, disposer, |_| {})
    }

    /// Like [`TileSet::sweep`], handing each swept tile to `on_swept` first
    pub fn sweep_with<F>(
        &mut self,
        mut target: Option<&mut TileSet>,
        disposer: &mut dyn Disposer,
        mut on_swept: F,
    ) -> Vec<String>
    where
        F: FnMut(&mut Tile),
    {
        let mut swept: Vec<String> = self
            .tiles
            .iter()
            .filter(|(_, tile)| !tile.mark)
            .map(|(id, _)| id.clone())
            .collect();
        swept.sort();

        for id in &swept {
            let Some(mut tile) = self.tiles.remove(id) else {
                continue;
            };
            on_swept(&mut tile);
            match target.as_mut() {
                Some(dest) => dest.add(tile, disposer),
                None => tile.dispose(disposer),
            }
        }
        swept
    }

    /// Disposes every tile
    pub fn clear(&mut self, disposer: &mut dyn Disposer) {
        for (_, tile) in self.tiles.drain() {
            tile.dispose(disposer);
        }
    }

    /// Visits every tile with a drawable overlapping `bounds`
    pub fn intersect<F>(&self, bounds: &PixelRect, mut callback: F)
    where
        F: FnMut(&Tile),
    {
        for tile in self.tiles.values() {
            if tile.has_drawable() && bounds.touches(tile.bounds()) {
                callback(tile);
            }
        }
    }
}

impl std::fmt::Debug for TileSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.ids()).finish()
    }
}
