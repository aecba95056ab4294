//! Tile grid selection, source resolution and load bookkeeping

use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;

use super::{
    key::TileKey,
    loader::{load_channel, ImageLoader, LoadHandle, LoadRequest, LoadResult, LoadSink, LoadTicket},
    source::{TemplateSource, TileSource},
    types::Tile,
};
use crate::{
    core::{
        constants::{DEFAULT_PIXEL_RATIO, MAX_SELECTION_TILES, TILE_SIZE},
        projection::Projection,
    },
    prelude::HashMap,
    traits::{Disposer, Drawable},
};

/// A load that has been issued and not yet completed or cancelled
pub struct PendingLoad {
    pub serial: u64,
    pub ticket: LoadTicket,
    pub uri: String,
    pub issued: Instant,
    handle: Box<dyn LoadHandle>,
}

/// Selects tiles for a grid laid out like OSM, Bing, Google et al. and
/// keeps track of the loads issued for them.
///
/// The pending registry is keyed by tile id. Issuing a second load for the
/// same id replaces the entry, and cancellation only applies to the entry's
/// owning tile.
pub struct TileSelector {
    tile_size: u32,
    source: Box<dyn TileSource>,
    src_template: String,
    pixel_ratio: f64,
    loader: Box<dyn ImageLoader>,
    pending: HashMap<String, PendingLoad>,
    sink: LoadSink,
    results: Receiver<LoadResult>,
}

impl TileSelector {
    pub fn new(tile_src: impl Into<String>, loader: Box<dyn ImageLoader>) -> Self {
        let src_template = tile_src.into();
        let source = Box::new(TemplateSource::new(src_template.clone()));
        Self::with_source(source, src_template, loader)
    }

    /// Selector resolving URIs through a custom source
    pub fn with_source(
        source: Box<dyn TileSource>,
        description: impl Into<String>,
        loader: Box<dyn ImageLoader>,
    ) -> Self {
        let (sink, results) = load_channel();
        Self {
            tile_size: TILE_SIZE,
            source,
            src_template: description.into(),
            pixel_ratio: DEFAULT_PIXEL_RATIO,
            loader,
            pending: HashMap::default(),
            sink,
            results,
        }
    }

    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn src_template(&self) -> &str {
        &self.src_template
    }

    pub fn pixel_ratio(&self) -> f64 {
        self.pixel_ratio
    }

    pub fn set_pixel_ratio(&mut self, pixel_ratio: f64) {
        self.pixel_ratio = pixel_ratio;
    }

    /// Selects every tile intersecting the box (x1, y1)-(x2, y2), given in
    /// projected units, at the native level nearest `resolution`.
    ///
    /// Keys come out row-major, rows first. Degenerate input yields nothing.
    pub fn select(
        &self,
        projection: &dyn Projection,
        resolution: f64,
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
    ) -> Vec<TileKey> {
        let tile_size = self.tile_size as f64;
        if self.tile_size == 0 || !(resolution.is_finite() && resolution > 0.0) {
            return Vec::new();
        }

        let native_level = projection.to_level(resolution).round();
        let native_res = projection.from_level(native_level);
        if !native_level.is_finite() || !(native_res.is_finite() && native_res > 0.0) {
            return Vec::new();
        }

        let extent = projection.extent();
        let (mut x1, mut y1, mut x2, mut y2) = (
            x1 / native_res,
            y1 / native_res,
            x2 / native_res,
            y2 / native_res,
        );

        let y_inverted = projection.y_inverted();
        let origin_y = if y_inverted {
            let origin = extent.max.y / native_res;
            y1 = origin - y1;
            y2 = origin - y2;
            origin
        } else {
            let origin = extent.min.y / native_res;
            y1 -= origin;
            y2 -= origin;
            origin
        };

        let x_inverted = projection.x_inverted();
        let origin_x = if x_inverted {
            let origin = extent.max.x / native_res;
            x1 = origin - x1;
            x2 = origin - x2;
            origin
        } else {
            let origin = extent.min.x / native_res;
            x1 -= origin;
            x2 -= origin;
            origin
        };

        let start_x = (x1.min(x2) / tile_size).floor();
        let start_y = (y1.min(y2) / tile_size).floor();
        let end_x = (x1.max(x2) / tile_size).floor();
        let end_y = (y1.max(y2) / tile_size).floor();
        if ![start_x, start_y, end_x, end_y].iter().all(|v| v.is_finite()) {
            return Vec::new();
        }

        let count = (end_x - start_x + 1.0) * (end_y - start_y + 1.0);
        if count > MAX_SELECTION_TILES as f64 {
            log::warn!(
                "Refusing to select {} tiles at level {} (limit {})",
                count,
                native_level,
                MAX_SELECTION_TILES
            );
            return Vec::new();
        }

        let level = native_level as i32;
        let (start_x, end_x) = (start_x as i64, end_x as i64);
        let (start_y, end_y) = (start_y as i64, end_y as i64);
        let mut keys = Vec::with_capacity(count as usize);

        for j in start_y..=end_y {
            let step_y = j as f64 * tile_size;
            let scaled_y = if y_inverted {
                origin_y - step_y
            } else {
                origin_y + step_y
            };

            for i in start_x..=end_x {
                let step_x = i as f64 * tile_size;
                let scaled_x = if x_inverted {
                    origin_x - step_x
                } else {
                    origin_x + step_x
                };

                keys.push(TileKey::new(
                    level,
                    i,
                    j,
                    native_res,
                    scaled_x,
                    scaled_y,
                    self.tile_size,
                ));
            }
        }

        keys
    }

    /// Source URI for a key
    pub fn resolve_src(&self, key: &TileKey) -> String {
        self.source.url(key, self.pixel_ratio)
    }

    /// Issues a load for `tile` and records it as pending
    pub fn load_tile(&mut self, tile: &mut Tile) {
        let uri = self.resolve_src(&tile.key);
        let ticket = LoadTicket {
            serial: tile.serial(),
            attempt: tile.retry_count(),
        };
        let request = LoadRequest {
            ticket,
            id: tile.key.id.clone(),
            uri: uri.clone(),
        };

        log::debug!("Loading tile {} from {}", tile.key.id, uri);
        let handle = self.loader.load(request, self.sink.clone());
        self.pending.insert(
            tile.key.id.clone(),
            PendingLoad {
                serial: tile.serial(),
                ticket,
                uri,
                issued: Instant::now(),
                handle,
            },
        );
        tile.loading = true;
    }

    /// Clears the pending entry a completion belongs to, if it still owns
    /// the slot. Returns how long the load took.
    pub fn finish_load(&mut self, result: &LoadResult) -> Option<Duration> {
        let owned = self
            .pending
            .get(&result.id)
            .map_or(false, |pending| pending.ticket == result.ticket);
        if !owned {
            return None;
        }
        self.pending
            .remove(&result.id)
            .map(|pending| pending.issued.elapsed())
    }

    /// Completions delivered since the last drain
    pub fn drain_results(&self) -> Vec<LoadResult> {
        self.results.try_iter().collect()
    }

    pub fn pending(&self, id: &str) -> Option<&PendingLoad> {
        self.pending.get(id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Sink completions are delivered to. Hosts can use it to inject
    /// results produced outside a loader.
    pub fn sink(&self) -> LoadSink {
        self.sink.clone()
    }
}

impl Disposer for TileSelector {
    fn destroy_tile(&mut self, tile: &Tile) {
        let owned = self
            .pending
            .get(&tile.key.id)
            .map_or(false, |pending| pending.serial == tile.serial());
        if owned {
            if let Some(mut pending) = self.pending.remove(&tile.key.id) {
                log::debug!("Cancelling load of {}", pending.uri);
                pending.handle.cancel();
            }
        }
    }

    fn destroy_drawable(&mut self, _key: &TileKey, mut drawable: Box<dyn Drawable>) {
        if drawable.is_attached() {
            drawable.detach();
        }
        drawable.destroy();
    }
}

impl std::fmt::Debug for TileSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileSelector")
            .field("tile_size", &self.tile_size)
            .field("src_template", &self.src_template)
            .field("pixel_ratio", &self.pixel_ratio)
            .field("pending", &self.pending.len())
            .finish()
    }
}
