//! Capabilities the engine consumes from its host
//!
//! The engine never touches pixels or display trees directly. Everything it
//! needs from the host surface goes through the traits in this module.

use std::any::Any;
use std::rc::Rc;

use crate::{
    core::geo::PixelRect,
    layers::tile::{key::TileKey, types::Tile},
    Result,
};

/// Shared handle to a host container. Tiles only hold weak references.
pub type ContainerRef = Rc<dyn Container>;

/// A display surface drawables can be inserted into.
///
/// Containers are shared, so implementations use interior mutability for
/// whatever bookkeeping they keep.
pub trait Container: Any {
    fn as_any(&self) -> &dyn Any;
}

/// An opaque renderable unit positioned by pixel bounds
pub trait Drawable: Any {
    fn set_bounds(&mut self, bounds: &PixelRect);

    /// Appends this drawable to the container's display order
    fn attach(&mut self, container: &ContainerRef);

    /// Takes over `previous`'s slot in the container. Backends that can swap
    /// in place should override this to preserve z-order.
    fn replace(&mut self, container: &ContainerRef, previous: &mut dyn Drawable) {
        previous.detach();
        self.attach(container);
    }

    fn detach(&mut self);

    fn is_attached(&self) -> bool;

    /// Releases backend resources. Called once, after detach.
    fn destroy(&mut self) {}

    fn as_any(&self) -> &dyn Any;
}

/// A rectangle in fractional pixels, used for blit source and destination
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BlitRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BlitRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

/// An offscreen surface that previews are painted into
pub trait Compositor {
    /// Copies `src_rect` of `src` (in the source's native pixels) scaled onto
    /// `dst_rect` of this surface
    fn blit(&mut self, src: &dyn Drawable, src_rect: &BlitRect, dst_rect: &BlitRect) -> Result<()>;

    fn finish(self: Box<Self>) -> Box<dyn Drawable>;
}

/// Creates drawables for a host backend
pub trait DrawableFactory {
    /// Turns a fetched image payload into a drawable
    fn decode(&mut self, key: &TileKey, data: &[u8]) -> Result<Box<dyn Drawable>>;

    /// Allocates a compositing surface, or `None` when the backend cannot
    /// rasterize
    fn compositor(&mut self, width: u32, height: u32) -> Option<Box<dyn Compositor>>;
}

/// Destruction hooks invoked when tiles and drawables are released
pub trait Disposer {
    /// Cancels any load the tile still has outstanding
    fn destroy_tile(&mut self, tile: &Tile);

    fn destroy_drawable(&mut self, key: &TileKey, drawable: Box<dyn Drawable>);
}

/// Trait for retry logic with backoff
pub trait RetryLogic {
    fn should_retry(&self, max_retries: u32, retry_delay_ms: u64, exponential_backoff: bool)
        -> bool;
    fn get_retry_count(&self) -> u32;
    fn get_last_retry_time(&self) -> Option<std::time::Instant>;
}

/// Standard retry logic implementation
pub fn should_retry_with_backoff(
    retry_count: u32,
    last_retry_time: Option<std::time::Instant>,
    max_retries: u32,
    retry_delay_ms: u64,
    exponential_backoff: bool,
) -> bool {
    if retry_count >= max_retries {
        return false;
    }

    if let Some(last_retry) = last_retry_time {
        let delay_multiplier = if exponential_backoff {
            2_u64.saturating_pow(retry_count)
        } else {
            1
        };
        let required_delay = retry_delay_ms.saturating_mul(delay_multiplier);
        last_retry.elapsed().as_millis() >= required_delay as u128
    } else {
        true
    }
}
