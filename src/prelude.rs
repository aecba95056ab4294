//! Prelude module for common tilemosaic types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use tilemosaic::prelude::*;`

pub use crate::core::{
    bounds::Bounds,
    config::{LoadingProfile, StalePolicy, TileLoadingConfig},
    geo::{LatLng, PixelRect, Point},
    map_state::{MapState, StateChange},
    projection::{web_mercator, PlanarProjection, Projection, WebMercator},
};

pub use crate::layers::{
    base::{dispatch_change, AttachmentKind, LayerPeer, PeerContext},
    tile::{
        cache::TileSet,
        compositor::TileCompositor,
        key::TileKey,
        loader::{DeferredLoader, DeferredQueue, ImageLoader, LoadHandle, LoadRequest, LoadSink},
        peer::{ReconcileReport, TileLayerPeer},
        selector::TileSelector,
        source::{TemplateSource, TileSource},
        types::Tile,
        TileLayer, TileLayerOptions,
    },
};

#[cfg(feature = "tokio-runtime")]
pub use crate::layers::tile::loader::HttpImageLoader;

pub use crate::rendering::headless::{HeadlessContainer, HeadlessFactory, HeadlessLedger};

#[cfg(feature = "render")]
pub use crate::rendering::raster::{DisplayList, RasterDrawable, RasterFactory};

pub use crate::traits::{
    BlitRect, Compositor, Container, ContainerRef, Disposer, Drawable, DrawableFactory,
};

pub use crate::{Error as MosaicError, Result};

pub use std::{rc::Rc, sync::Arc};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};
