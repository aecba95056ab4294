//! Raster backend built on the `image` crate
//!
//! Decoded tiles and previews are RGBA buffers. A [`DisplayList`] records
//! what is attached and where, and flattens it into a frame on demand.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use image::{imageops, imageops::FilterType, RgbaImage};

use crate::{
    core::geo::PixelRect,
    layers::tile::key::TileKey,
    traits::{BlitRect, Compositor, Container, ContainerRef, Drawable, DrawableFactory},
    MosaicError, Result,
};

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Pixels plus the placement the display list reads when rendering
struct Surface {
    pixels: RgbaImage,
    bounds: Cell<PixelRect>,
}

/// Attached raster drawables in display order, bottom first
#[derive(Default)]
pub struct DisplayList {
    entries: RefCell<Vec<(u64, Rc<Surface>)>>,
}

impl DisplayList {
    pub fn shared() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Bounds of every entry, bottom first
    pub fn placements(&self) -> Vec<PixelRect> {
        self.entries
            .borrow()
            .iter()
            .map(|(_, surface)| surface.bounds.get())
            .collect()
    }

    /// Paints every entry, scaled to its bounds, onto a transparent frame
    pub fn render(&self, width: u32, height: u32) -> RgbaImage {
        let mut frame = RgbaImage::new(width, height);
        for (_, surface) in self.entries.borrow().iter() {
            let bounds = surface.bounds.get();
            if bounds.is_empty() {
                continue;
            }
            let (w, h) = (bounds.width as u32, bounds.height as u32);
            let x = bounds.left as i64;
            let y = bounds.top as i64;
            if surface.pixels.dimensions() == (w, h) {
                imageops::overlay(&mut frame, &surface.pixels, x, y);
            } else {
                let scaled = imageops::resize(&surface.pixels, w, h, FilterType::Triangle);
                imageops::overlay(&mut frame, &scaled, x, y);
            }
        }
        frame
    }

    fn push(&self, handle: u64, surface: Rc<Surface>) {
        self.entries.borrow_mut().push((handle, surface));
    }

    fn remove(&self, handle: u64) {
        self.entries.borrow_mut().retain(|(h, _)| *h != handle);
    }

    fn swap(&self, old: u64, handle: u64, surface: Rc<Surface>) -> bool {
        let mut entries = self.entries.borrow_mut();
        match entries.iter().position(|(h, _)| *h == old) {
            Some(index) => {
                entries[index] = (handle, surface);
                true
            }
            None => false,
        }
    }
}

impl Container for DisplayList {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn display_list(container: &ContainerRef) -> Option<&DisplayList> {
    container.as_any().downcast_ref::<DisplayList>()
}

pub struct RasterDrawable {
    handle: u64,
    surface: Rc<Surface>,
    parent: Option<Weak<dyn Container>>,
}

impl RasterDrawable {
    pub fn new(pixels: RgbaImage) -> Self {
        Self {
            handle: NEXT_HANDLE.fetch_add(1, Ordering::Relaxed),
            surface: Rc::new(Surface {
                pixels,
                bounds: Cell::new(PixelRect::default()),
            }),
            parent: None,
        }
    }

    pub fn downcast(drawable: &dyn Drawable) -> Option<&RasterDrawable> {
        drawable.as_any().downcast_ref::<RasterDrawable>()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.surface.pixels
    }

    pub fn bounds(&self) -> PixelRect {
        self.surface.bounds.get()
    }
}

impl Drawable for RasterDrawable {
    fn set_bounds(&mut self, bounds: &PixelRect) {
        self.surface.bounds.set(*bounds);
    }

    fn attach(&mut self, container: &ContainerRef) {
        if let Some(list) = display_list(container) {
            list.push(self.handle, Rc::clone(&self.surface));
        }
        self.parent = Some(Rc::downgrade(container));
    }

    fn replace(&mut self, container: &ContainerRef, previous: &mut dyn Drawable) {
        let old = RasterDrawable::downcast(previous).map(|d| d.handle);
        let swapped = match (display_list(container), old) {
            (Some(list), Some(old)) => list.swap(old, self.handle, Rc::clone(&self.surface)),
            _ => false,
        };
        if swapped {
            self.parent = Some(Rc::downgrade(container));
            previous.detach();
        } else {
            previous.detach();
            self.attach(container);
        }
    }

    fn detach(&mut self) {
        let container = self.parent.take().and_then(|parent| parent.upgrade());
        if let Some(list) = container.as_ref().and_then(display_list) {
            list.remove(self.handle);
        }
    }

    fn is_attached(&self) -> bool {
        self.parent.is_some()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Paints clipped, scaled regions of loaded tiles into a preview buffer
pub struct RasterCompositor {
    canvas: RgbaImage,
}

impl RasterCompositor {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            canvas: RgbaImage::new(width, height),
        }
    }
}

impl Compositor for RasterCompositor {
    fn blit(&mut self, src: &dyn Drawable, src_rect: &BlitRect, dst_rect: &BlitRect) -> Result<()> {
        let source = RasterDrawable::downcast(src)
            .ok_or_else(|| MosaicError::Render("not a raster drawable".into()))?;
        let pixels = source.pixels();
        let (src_w, src_h) = pixels.dimensions();

        let x = (src_rect.x.max(0.0).round() as u32).min(src_w);
        let y = (src_rect.y.max(0.0).round() as u32).min(src_h);
        let w = (src_rect.width.round() as u32).min(src_w - x);
        let h = (src_rect.height.round() as u32).min(src_h - y);
        let dst_w = dst_rect.width.round() as u32;
        let dst_h = dst_rect.height.round() as u32;
        if w == 0 || h == 0 || dst_w == 0 || dst_h == 0 {
            return Ok(());
        }

        let region = imageops::crop_imm(pixels, x, y, w, h).to_image();
        let scaled = if (w, h) == (dst_w, dst_h) {
            region
        } else {
            imageops::resize(&region, dst_w, dst_h, FilterType::Triangle)
        };
        imageops::replace(
            &mut self.canvas,
            &scaled,
            dst_rect.x.round() as i64,
            dst_rect.y.round() as i64,
        );
        Ok(())
    }

    fn finish(self: Box<Self>) -> Box<dyn Drawable> {
        Box::new(RasterDrawable::new(self.canvas))
    }
}

/// Decodes any format the `image` crate understands into RGBA drawables
#[derive(Debug, Default)]
pub struct RasterFactory;

impl RasterFactory {
    pub fn new() -> Self {
        Self
    }
}

impl DrawableFactory for RasterFactory {
    fn decode(&mut self, key: &TileKey, data: &[u8]) -> Result<Box<dyn Drawable>> {
        let decoded = image::load_from_memory(data).map_err(MosaicError::from)?;
        let pixels = decoded.to_rgba8();
        log::debug!(
            "Decoded tile {} ({}x{})",
            key.id,
            pixels.width(),
            pixels.height()
        );
        Ok(Box::new(RasterDrawable::new(pixels)))
    }

    fn compositor(&mut self, width: u32, height: u32) -> Option<Box<dyn Compositor>> {
        if width == 0 || height == 0 {
            return None;
        }
        Some(Box::new(RasterCompositor::new(width, height)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageOutputFormat, Rgba};
    use std::io::Cursor;

    fn png(color: [u8; 4], size: u32) -> Vec<u8> {
        let pixels = RgbaImage::from_pixel(size, size, Rgba(color));
        let mut data = Vec::new();
        DynamicImage::ImageRgba8(pixels)
            .write_to(&mut Cursor::new(&mut data), ImageOutputFormat::Png)
            .unwrap();
        data
    }

    fn key() -> TileKey {
        TileKey::new(1, 0, 0, 1.0, 0.0, 0.0, 4)
    }

    #[test]
    fn test_decode_png() {
        let mut factory = RasterFactory::new();
        let drawable = factory.decode(&key(), &png([255, 0, 0, 255], 4)).unwrap();
        let raster = RasterDrawable::downcast(drawable.as_ref()).unwrap();
        assert_eq!(raster.pixels().dimensions(), (4, 4));
        assert!(factory.decode(&key(), b"not an image").is_err());
    }

    #[test]
    fn test_display_list_renders_in_order() {
        let mut factory = RasterFactory::new();
        let list = DisplayList::shared();
        let container: ContainerRef = list.clone();

        let mut red = factory.decode(&key(), &png([255, 0, 0, 255], 4)).unwrap();
        let mut blue = factory.decode(&key(), &png([0, 0, 255, 255], 4)).unwrap();
        red.set_bounds(&PixelRect::new(0, 0, 4, 4));
        blue.set_bounds(&PixelRect::new(2, 0, 4, 4));
        red.attach(&container);
        blue.attach(&container);

        let frame = list.render(8, 4);
        assert_eq!(frame.get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
        assert_eq!(frame.get_pixel(3, 0), &Rgba([0, 0, 255, 255]));
        assert_eq!(frame.get_pixel(7, 0), &Rgba([0, 0, 0, 0]));

        blue.detach();
        assert_eq!(list.len(), 1);
        assert_eq!(list.render(8, 4).get_pixel(3, 0), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_replace_keeps_slot() {
        let list = DisplayList::shared();
        let container: ContainerRef = list.clone();
        let mut below = RasterDrawable::new(RgbaImage::from_pixel(2, 2, Rgba([1, 1, 1, 255])));
        let mut above = RasterDrawable::new(RgbaImage::from_pixel(2, 2, Rgba([2, 2, 2, 255])));
        below.attach(&container);
        above.attach(&container);

        let mut fresh = RasterDrawable::new(RgbaImage::from_pixel(2, 2, Rgba([3, 3, 3, 255])));
        fresh.replace(&container, &mut below);

        assert!(!below.is_attached());
        assert_eq!(list.len(), 2);
        assert_eq!(list.entries.borrow()[0].0, fresh.handle);
    }

    #[test]
    fn test_compositor_scales_region() {
        let source = RasterDrawable::new(RgbaImage::from_pixel(4, 4, Rgba([0, 255, 0, 255])));
        let mut compositor: Box<dyn Compositor> = Box::new(RasterCompositor::new(8, 8));

        // Left half of the source doubled into the right half of the preview
        compositor
            .blit(&source, &BlitRect::new(0.0, 0.0, 2.0, 4.0), &BlitRect::new(4.0, 0.0, 4.0, 8.0))
            .unwrap();
        let preview = compositor.finish();
        let pixels = RasterDrawable::downcast(preview.as_ref()).unwrap().pixels();

        let painted = pixels.get_pixel(5, 5);
        assert!(painted[1] > 200 && painted[3] > 200);
        assert_eq!(pixels.get_pixel(1, 5), &Rgba([0, 0, 0, 0]));
    }
}
