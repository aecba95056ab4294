//! Headless backend
//!
//! Drawables here carry no pixels, only the bookkeeping a display would
//! have: placement, display order and provenance. It backs tooling that
//! needs to reason about layout without rasterizing, and the test suites.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::{
    core::geo::PixelRect,
    layers::tile::key::TileKey,
    traits::{BlitRect, Compositor, Container, ContainerRef, Drawable, DrawableFactory},
    MosaicError, Result,
};

/// Counters shared by every drawable a factory creates
#[derive(Debug, Default)]
pub struct HeadlessLedger {
    next_handle: Cell<u64>,
    created: Cell<usize>,
    destroyed: Cell<usize>,
    composites: Cell<usize>,
}

impl HeadlessLedger {
    fn allocate(&self) -> u64 {
        let handle = self.next_handle.get() + 1;
        self.next_handle.set(handle);
        self.created.set(self.created.get() + 1);
        handle
    }

    pub fn created(&self) -> usize {
        self.created.get()
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.get()
    }

    pub fn live(&self) -> usize {
        self.created() - self.destroyed()
    }

    /// Number of previews composited so far
    pub fn composites(&self) -> usize {
        self.composites.get()
    }

    pub fn handle_of(&self, drawable: &dyn Drawable) -> Option<u64> {
        HeadlessDrawable::downcast(drawable).map(|d| d.handle)
    }

    pub fn bounds_of(&self, drawable: &dyn Drawable) -> Option<PixelRect> {
        HeadlessDrawable::downcast(drawable).map(|d| d.bounds)
    }

    pub fn label_of(&self, drawable: &dyn Drawable) -> Option<String> {
        HeadlessDrawable::downcast(drawable).map(|d| d.label.clone())
    }

    /// Labels of the drawables painted into a preview, in paint order
    pub fn sources_of(&self, drawable: &dyn Drawable) -> Vec<String> {
        HeadlessDrawable::downcast(drawable)
            .map(|d| d.blits.iter().map(|(label, _, _)| label.clone()).collect())
            .unwrap_or_default()
    }
}

/// Display order of attached drawable handles, bottom first
#[derive(Debug, Default)]
pub struct HeadlessContainer {
    children: RefCell<Vec<u64>>,
}

impl HeadlessContainer {
    pub fn shared() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn order(&self) -> Vec<u64> {
        self.children.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.children.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.borrow().is_empty()
    }

    pub fn contains(&self, handle: u64) -> bool {
        self.children.borrow().contains(&handle)
    }

    fn push(&self, handle: u64) {
        self.children.borrow_mut().push(handle);
    }

    fn remove(&self, handle: u64) {
        self.children.borrow_mut().retain(|&h| h != handle);
    }

    fn swap(&self, old: u64, new: u64) -> bool {
        let mut children = self.children.borrow_mut();
        match children.iter().position(|&h| h == old) {
            Some(index) => {
                children[index] = new;
                true
            }
            None => false,
        }
    }
}

impl Container for HeadlessContainer {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct HeadlessDrawable {
    handle: u64,
    label: String,
    bounds: PixelRect,
    parent: Option<Weak<dyn Container>>,
    blits: Vec<(String, BlitRect, BlitRect)>,
    ledger: Rc<HeadlessLedger>,
}

impl HeadlessDrawable {
    fn new(label: String, ledger: &Rc<HeadlessLedger>) -> Self {
        Self {
            handle: ledger.allocate(),
            label,
            bounds: PixelRect::default(),
            parent: None,
            blits: Vec::new(),
            ledger: Rc::clone(ledger),
        }
    }

    pub fn downcast(drawable: &dyn Drawable) -> Option<&HeadlessDrawable> {
        drawable.as_any().downcast_ref::<HeadlessDrawable>()
    }

    pub fn handle(&self) -> u64 {
        self.handle
    }

    fn container(&self) -> Option<ContainerRef> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }
}

fn headless(container: &ContainerRef) -> Option<&HeadlessContainer> {
    container.as_any().downcast_ref::<HeadlessContainer>()
}

impl Drawable for HeadlessDrawable {
    fn set_bounds(&mut self, bounds: &PixelRect) {
        self.bounds = *bounds;
    }

    fn attach(&mut self, container: &ContainerRef) {
        if let Some(host) = headless(container) {
            host.push(self.handle);
        }
        self.parent = Some(Rc::downgrade(container));
    }

    fn replace(&mut self, container: &ContainerRef, previous: &mut dyn Drawable) {
        let previous_handle = previous.as_any().downcast_ref::<HeadlessDrawable>().map(|d| d.handle);
        let swapped = match (headless(container), previous_handle) {
            (Some(host), Some(old)) => host.swap(old, self.handle),
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
        if let Some(container) = self.container() {
            if let Some(host) = headless(&container) {
                host.remove(self.handle);
            }
        }
        self.parent = None;
    }

    fn is_attached(&self) -> bool {
        self.parent.is_some()
    }

    fn destroy(&mut self) {
        self.ledger.destroyed.set(self.ledger.destroyed.get() + 1);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Records what a preview would have been painted from
pub struct HeadlessCompositor {
    preview: HeadlessDrawable,
}

impl Compositor for HeadlessCompositor {
    fn blit(&mut self, src: &dyn Drawable, src_rect: &BlitRect, dst_rect: &BlitRect) -> Result<()> {
        let source = HeadlessDrawable::downcast(src)
            .ok_or_else(|| MosaicError::Render("foreign drawable".into()))?;
        self.preview
            .blits
            .push((source.label.clone(), *src_rect, *dst_rect));
        Ok(())
    }

    fn finish(self: Box<Self>) -> Box<dyn Drawable> {
        let ledger = &self.preview.ledger;
        ledger.composites.set(ledger.composites.get() + 1);
        Box::new(self.preview)
    }
}

pub struct HeadlessFactory {
    ledger: Rc<HeadlessLedger>,
    rasterize: bool,
}

impl HeadlessFactory {
    pub fn new() -> Self {
        Self {
            ledger: Rc::new(HeadlessLedger::default()),
            rasterize: true,
        }
    }

    /// A factory whose backend cannot composite previews
    pub fn without_compositing() -> Self {
        Self {
            rasterize: false,
            ..Self::new()
        }
    }

    pub fn ledger(&self) -> Rc<HeadlessLedger> {
        Rc::clone(&self.ledger)
    }

    /// A loaded-image drawable for `key`
    pub fn image(&mut self, key: &TileKey) -> Box<dyn Drawable> {
        Box::new(HeadlessDrawable::new(format!("image:{}", key.id), &self.ledger))
    }
}

impl Default for HeadlessFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl DrawableFactory for HeadlessFactory {
    fn decode(&mut self, key: &TileKey, data: &[u8]) -> Result<Box<dyn Drawable>> {
        if data.is_empty() {
            return Err(MosaicError::Decode(format!("empty payload for {}", key.id)).into());
        }
        Ok(self.image(key))
    }

    fn compositor(&mut self, _width: u32, _height: u32) -> Option<Box<dyn Compositor>> {
        if !self.rasterize {
            return None;
        }
        Some(Box::new(HeadlessCompositor {
            preview: HeadlessDrawable::new("preview".to_string(), &self.ledger),
        }))
    }
}
