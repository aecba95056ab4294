//! Preview compositing
//!
//! A new tile with nothing to show yet can borrow pixels from the previous
//! generation: every overlapping old tile is clipped to the new tile's
//! bounds and blitted, scaled, into an offscreen surface. Later sources may
//! overwrite earlier ones. Everything here is best effort.

use super::types::Tile;
use crate::{
    core::geo::PixelRect,
    traits::{BlitRect, Compositor, Drawable, DrawableFactory},
};

pub struct TileCompositor {
    target: PixelRect,
    surface: Box<dyn Compositor>,
    blits: usize,
}

impl TileCompositor {
    /// Allocates a surface the size of `target`. `None` when the target is
    /// empty or the backend cannot rasterize.
    pub fn new(target: &PixelRect, factory: &mut dyn DrawableFactory) -> Option<Self> {
        if target.is_empty() {
            return None;
        }
        let surface = factory.compositor(target.width as u32, target.height as u32)?;
        Some(Self {
            target: *target,
            surface,
            blits: 0,
        })
    }

    /// Source and destination rectangles for painting `source` into
    /// `target`. The source rect is in the source image's native pixels,
    /// `source_size` wide and tall.
    pub fn clip(
        target: &PixelRect,
        source: &PixelRect,
        source_size: u32,
    ) -> Option<(BlitRect, BlitRect)> {
        if source.width <= 0 || source.height <= 0 {
            return None;
        }

        let mut dx = source.left as f64 - target.left as f64;
        let mut dy = source.top as f64 - target.top as f64;
        let mut sx = 0.0;
        let mut sy = 0.0;
        let mut w = source.width as f64;
        let mut h = source.height as f64;
        let scale_x = source_size as f64 / source.width as f64;
        let scale_y = source_size as f64 / source.height as f64;

        if dx < 0.0 {
            sx = -dx;
            dx = 0.0;
            w -= sx;
        }
        if dy < 0.0 {
            sy = -dy;
            dy = 0.0;
            h -= sy;
        }

        let overflow = dx + w - target.width as f64;
        if overflow >= 0.0 {
            w -= overflow;
        }
        let overflow = dy + h - target.height as f64;
        if overflow >= 0.0 {
            h -= overflow;
        }

        let dst = BlitRect::new(dx, dy, w, h);
        if dst.is_empty() {
            return None;
        }
        let src = BlitRect::new(sx * scale_x, sy * scale_y, w * scale_x, h * scale_y);
        Some((src, dst))
    }

    /// Paints the overlapping part of `source`. Returns whether anything
    /// was drawn.
    pub fn add(&mut self, source: &Tile) -> bool {
        let Some(drawable) = source.drawable() else {
            return false;
        };
        let Some((src, dst)) = Self::clip(&self.target, source.bounds(), source.key.size) else {
            return false;
        };

        match self.surface.blit(drawable, &src, &dst) {
            Ok(()) => {
                self.blits += 1;
                true
            }
            Err(e) => {
                log::debug!("Preview blit from {} skipped: {}", source.key.id, e);
                false
            }
        }
    }

    pub fn blit_count(&self) -> usize {
        self.blits
    }

    /// The composite, if at least one source was painted into it
    pub fn finish(self) -> Option<Box<dyn Drawable>> {
        if self.blits == 0 {
            return None;
        }
        Some(self.surface.finish())
    }
}
