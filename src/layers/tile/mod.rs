//! Tiled imagery: selection, tile sets, previews and reconciliation

pub mod cache;
pub mod compositor;
pub mod key;
pub mod layer;
pub mod loader;
pub mod peer;
pub mod selector;
pub mod source;
pub mod trait_impl;
pub mod types;

pub use layer::TileLayer;
pub use types::{Tile, TileLayerOptions};
