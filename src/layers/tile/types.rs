//! Core data types for tile layer functionality

use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::{cache::TileSet, compositor::TileCompositor, key::TileKey};
use crate::{
    core::{
        config::TileLoadingConfig,
        constants::{DEFAULT_PIXEL_RATIO, OSM_TILE_SRC, TILE_SIZE},
        geo::PixelRect,
    },
    traits::{
        should_retry_with_backoff, Container, ContainerRef, Disposer, Drawable, DrawableFactory,
        RetryLogic,
    },
    MosaicError, Result,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileLayerOptions {
    pub tile_size: u32,
    /// URI template, see [`super::source`]
    pub tile_src: String,
    /// Tile pixels per display pixel. Overrides auto detection when set.
    pub pixel_ratio: Option<f64>,
    /// Use `device_pixel_ratio` when no explicit ratio is given
    pub auto_pixel_ratio: bool,
    /// Ratio reported by the host display
    pub device_pixel_ratio: f64,
    pub loading: TileLoadingConfig,
}

impl Default for TileLayerOptions {
    fn default() -> Self {
        Self {
            tile_size: TILE_SIZE,
            tile_src: String::new(),
            pixel_ratio: None,
            auto_pixel_ratio: false,
            device_pixel_ratio: DEFAULT_PIXEL_RATIO,
            loading: TileLoadingConfig::default(),
        }
    }
}

impl TileLayerOptions {
    pub fn new(tile_src: impl Into<String>) -> Self {
        Self {
            tile_src: tile_src.into(),
            ..Self::default()
        }
    }

    /// Options for the public OpenStreetMap tile servers
    pub fn openstreetmap() -> Self {
        Self::new(OSM_TILE_SRC)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json).map_err(MosaicError::from)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tile_size == 0 {
            return Err(MosaicError::Config("tile_size must be positive".into()).into());
        }
        if let Some(ratio) = self.pixel_ratio {
            if !(ratio.is_finite() && ratio > 0.0) {
                return Err(MosaicError::Config(format!("invalid pixel_ratio {}", ratio)).into());
            }
        }
        Ok(())
    }

    /// Explicit ratio, else the device ratio when auto detection is on,
    /// else 1
    pub fn effective_pixel_ratio(&self) -> f64 {
        let usable = |ratio: f64| ratio.is_finite() && ratio > 0.0;
        match self.pixel_ratio {
            Some(ratio) if usable(ratio) => ratio,
            _ if self.auto_pixel_ratio && usable(self.device_pixel_ratio) => {
                self.device_pixel_ratio
            }
            _ => DEFAULT_PIXEL_RATIO,
        }
    }
}

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// A renderable tile.
///
/// The drawable is not necessarily a decoded image: it may be a composite
/// preview painted from tiles of a previous generation.
pub struct Tile {
    serial: u64,
    pub key: TileKey,
    drawable: Option<Box<dyn Drawable>>,
    bounds: PixelRect,
    parent: Option<Weak<dyn Container>>,
    /// Still desired as of the current reconciliation pass
    pub mark: bool,
    /// Placeholder created during a transition
    pub temporary: bool,
    pub loading: bool,
    retry_count: u32,
    last_failure: Option<Instant>,
    last_error: Option<String>,
}

impl Tile {
    pub fn new(key: TileKey) -> Self {
        Self {
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            key,
            drawable: None,
            bounds: PixelRect::default(),
            parent: None,
            mark: false,
            temporary: false,
            loading: false,
            retry_count: 0,
            last_failure: None,
            last_error: None,
        }
    }

    /// Unique per tile instance, never reused
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn bounds(&self) -> &PixelRect {
        &self.bounds
    }

    pub fn drawable(&self) -> Option<&dyn Drawable> {
        self.drawable.as_deref()
    }

    pub fn has_drawable(&self) -> bool {
        self.drawable.is_some()
    }

    /// Container this tile is attached to, if it is still alive
    pub fn parent(&self) -> Option<ContainerRef> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn is_attached(&self) -> bool {
        self.parent().is_some()
    }

    pub fn set_bounds(&mut self, bounds: PixelRect) {
        self.bounds = bounds;
        if let Some(drawable) = self.drawable.as_mut() {
            drawable.set_bounds(&self.bounds);
        }
    }

    /// Installs a new drawable. When attached, the new drawable takes the
    /// previous one's place in the container.
    pub fn update(&mut self, mut drawable: Box<dyn Drawable>, disposer: &mut dyn Disposer) {
        let mut previous = self.drawable.take();
        drawable.set_bounds(&self.bounds);

        if let Some(container) = self.parent() {
            match previous.as_mut() {
                Some(old) if old.is_attached() => drawable.replace(&container, old.as_mut()),
                _ => drawable.attach(&container),
            }
        }
        self.drawable = Some(drawable);

        if let Some(old) = previous {
            disposer.destroy_drawable(&self.key, old);
        }
    }

    pub fn attach(&mut self, container: &ContainerRef) {
        if let Some(current) = self.parent() {
            if !same_container(&current, container) {
                self.detach();
            }
        }
        self.parent = Some(Rc::downgrade(container));

        if let Some(drawable) = self.drawable.as_mut() {
            drawable.set_bounds(&self.bounds);
            if !drawable.is_attached() {
                drawable.attach(container);
            }
        }
    }

    pub fn detach(&mut self) {
        self.parent = None;
        if let Some(drawable) = self.drawable.as_mut() {
            if drawable.is_attached() {
                drawable.detach();
            }
        }
    }

    /// Drops the drawable without replacing it
    pub fn release_drawable(&mut self, disposer: &mut dyn Disposer) {
        if let Some(drawable) = self.drawable.take() {
            disposer.destroy_drawable(&self.key, drawable);
        }
    }

    /// Detaches, destroys the drawable and cancels any load this tile owns
    pub fn dispose(mut self, disposer: &mut dyn Disposer) {
        self.detach();
        self.release_drawable(disposer);
        disposer.destroy_tile(&self);
    }

    /// Paints a preview from every tile in `source` overlapping this tile's
    /// bounds. Both this tile's bounds and the source tiles' bounds must be
    /// current. Returns whether a preview was installed.
    pub fn generate_preview(
        &mut self,
        source: &TileSet,
        factory: &mut dyn DrawableFactory,
        disposer: &mut dyn Disposer,
    ) -> bool {
        let bounds = self.bounds;
        let mut preview: Option<TileCompositor> = None;
        let mut unsupported = false;

        source.intersect(&bounds, |candidate| {
            if preview.is_none() && !unsupported {
                preview = TileCompositor::new(&bounds, factory);
                unsupported = preview.is_none();
            }
            if let Some(compositor) = preview.as_mut() {
                compositor.add(candidate);
            }
        });

        match preview.and_then(TileCompositor::finish) {
            Some(drawable) => {
                self.update(drawable, disposer);
                true
            }
            None => false,
        }
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn has_failed(&self) -> bool {
        self.last_error.is_some()
    }

    pub(crate) fn mark_loaded(&mut self) {
        self.loading = false;
        self.last_error = None;
    }

    pub(crate) fn mark_error(&mut self, error: String) {
        self.loading = false;
        self.last_error = Some(error);
        self.last_failure = Some(Instant::now());
    }

    /// Consumes one retry from the budget before a reload
    pub(crate) fn begin_retry(&mut self) {
        self.retry_count += 1;
        self.last_error = None;
    }
}

impl RetryLogic for Tile {
    fn should_retry(&self, max_retries: u32, retry_delay_ms: u64, exponential_backoff: bool) -> bool {
        self.has_failed()
            && !self.loading
            && should_retry_with_backoff(
                self.retry_count,
                self.last_failure,
                max_retries,
                retry_delay_ms,
                exponential_backoff,
            )
    }

    fn get_retry_count(&self) -> u32 {
        self.retry_count
    }

    fn get_last_retry_time(&self) -> Option<Instant> {
        self.last_failure
    }
}

impl std::fmt::Debug for Tile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tile")
            .field("serial", &self.serial)
            .field("id", &self.key.id)
            .field("bounds", &self.bounds)
            .field("has_drawable", &self.drawable.is_some())
            .field("attached", &self.is_attached())
            .field("mark", &self.mark)
            .field("temporary", &self.temporary)
            .field("loading", &self.loading)
            .finish()
    }
}

fn same_container(a: &ContainerRef, b: &ContainerRef) -> bool {
    Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const ()
}
