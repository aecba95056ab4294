//! # tilemosaic
//!
//! A tiled-imagery display engine.
//!
//! Given a projection, a resolution and a viewport, the engine works out
//! which fixed-size raster tiles are visible, loads them asynchronously and
//! keeps a reusable cache of tiles across panning, zooming and resizing.
//! While a resolution change is in flight it preloads tiles for the target
//! state and paints interim previews from the previous generation.
//!
//! Pixels are never touched directly: hosts plug in a [`traits::Drawable`]
//! backend and an [`layers::tile::loader::ImageLoader`]. A headless backend
//! and a raster backend built on the `image` crate ship with the library.

pub mod core;
pub mod layers;
pub mod prelude;
pub mod rendering;
pub mod traits;
pub use crate::core::constants;

// Re-export public API
pub use crate::core::{
    bounds::Bounds,
    geo::{LatLng, PixelRect, Point},
    map_state::{MapState, StateChange},
    projection::{web_mercator, PlanarProjection, Projection, WebMercator},
};

pub use layers::{
    base::{AttachmentKind, LayerPeer, PeerContext},
    tile::{
        key::TileKey,
        peer::{ReconcileReport, TileLayerPeer},
        selector::TileSelector,
        TileLayer, TileLayerOptions,
    },
};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum MosaicError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "render")]
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Load error: {0}")]
    Load(String),

    #[error("Layer error: {0}")]
    Layer(String),
}

/// Error type alias for convenience
pub type Error = MosaicError;

/// Initializes `env_logger` from `RUST_LOG`, defaulting to info for this
/// crate. Safe to call more than once.
#[cfg(feature = "debug")]
pub fn init_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("tilemosaic=info"))
        .try_init();
}
