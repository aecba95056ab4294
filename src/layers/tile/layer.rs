//! Host facing tile layer

use super::{
    loader::ImageLoader,
    peer::{ReconcileReport, TileLayerPeer},
    selector::TileSelector,
    source::TileSource,
    TileLayerOptions,
};
use crate::{core::map_state::MapState, traits::ContainerRef, traits::DrawableFactory, Result};

pub struct TileLayer {
    pub(crate) id: String,
    pub(crate) options: TileLayerOptions,
    pub(crate) peer: TileLayerPeer,
    pub(crate) last_report: Option<ReconcileReport>,
}

impl TileLayer {
    /// Create a tile layer loading `options.tile_src` through `loader`
    pub fn new(
        id: impl Into<String>,
        options: TileLayerOptions,
        loader: Box<dyn ImageLoader>,
    ) -> Result<Self> {
        options.validate()?;
        let selector = TileSelector::new(options.tile_src.clone(), loader);
        Ok(Self::assemble(id.into(), options, selector))
    }

    /// Create a tile layer whose URIs come from a custom source.
    /// `options.tile_src` is kept only as a description.
    pub fn with_source(
        id: impl Into<String>,
        options: TileLayerOptions,
        source: Box<dyn TileSource>,
        loader: Box<dyn ImageLoader>,
    ) -> Result<Self> {
        options.validate()?;
        let selector = TileSelector::with_source(source, options.tile_src.clone(), loader);
        Ok(Self::assemble(id.into(), options, selector))
    }

    /// OpenStreetMap layer fetching over HTTP on the caller's tokio runtime
    #[cfg(feature = "tokio-runtime")]
    pub fn openstreetmap(id: impl Into<String>) -> Result<Self> {
        let loader = super::loader::HttpImageLoader::current()?;
        Self::new(id, TileLayerOptions::openstreetmap(), Box::new(loader))
    }

    fn assemble(id: String, options: TileLayerOptions, selector: TileSelector) -> Self {
        let pixel_ratio = options.effective_pixel_ratio();
        let selector = selector.with_tile_size(options.tile_size);
        let peer = TileLayerPeer::new(selector, pixel_ratio, options.loading.clone());

        log::debug!(
            "Created tile layer {} ({}, pixel ratio {})",
            id,
            options.tile_src,
            pixel_ratio
        );

        Self {
            id,
            options,
            peer,
            last_report: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn options(&self) -> &TileLayerOptions {
        &self.options
    }

    pub fn peer(&self) -> &TileLayerPeer {
        &self.peer
    }

    pub fn peer_mut(&mut self) -> &mut TileLayerPeer {
        &mut self.peer
    }

    pub fn pixel_ratio(&self) -> f64 {
        self.peer.pixel_ratio()
    }

    /// Report of the most recent reconciliation pass
    pub fn last_report(&self) -> Option<&ReconcileReport> {
        self.last_report.as_ref()
    }

    /// Loads issued and not yet completed or cancelled
    pub fn pending_loads(&self) -> usize {
        self.peer.selector().pending_count()
    }

    pub fn is_loading(&self) -> bool {
        self.pending_loads() > 0
    }

    pub fn reset(
        &mut self,
        state: &MapState,
        container: &ContainerRef,
        factory: &mut dyn DrawableFactory,
    ) -> &ReconcileReport {
        let report = self.peer.on_reset(state, container, factory);
        self.last_report.insert(report)
    }

    pub fn reposition(
        &mut self,
        state: &MapState,
        container: &ContainerRef,
        factory: &mut dyn DrawableFactory,
    ) -> &ReconcileReport {
        let report = self.peer.on_position(state, container, factory);
        self.last_report.insert(report)
    }

    /// Applies finished loads, then reissues failed ones that are due.
    /// Returns the number of tiles that received imagery.
    pub fn process_load_results(&mut self, factory: &mut dyn DrawableFactory) -> usize {
        let applied = self.peer.process_load_results(factory);
        let retried = self.peer.handle_load_retries();
        if applied > 0 || retried > 0 {
            log::debug!(
                "Layer {}: {} tiles loaded, {} retried, {} pending",
                self.id,
                applied,
                retried,
                self.pending_loads()
            );
        }
        applied
    }
}

impl std::fmt::Debug for TileLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileLayer")
            .field("id", &self.id)
            .field("tile_src", &self.options.tile_src)
            .field("pixel_ratio", &self.pixel_ratio())
            .field("tiles", &self.peer.current().len())
            .field("pending", &self.pending_loads())
            .finish()
    }
}
