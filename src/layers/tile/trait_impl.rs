//! LayerPeer implementation for TileLayer

use super::TileLayer;
use crate::{
    core::map_state::MapState,
    layers::base::{AttachmentKind, LayerPeer, PeerContext},
};

impl LayerPeer for TileLayer {
    fn kind(&self) -> AttachmentKind {
        AttachmentKind::Tiles
    }

    fn on_reset(&mut self, state: &MapState, ctx: &mut PeerContext<'_>) {
        self.reset(state, ctx.container, &mut *ctx.factory);
    }

    fn on_position(&mut self, state: &MapState, ctx: &mut PeerContext<'_>) {
        self.reposition(state, ctx.container, &mut *ctx.factory);
    }

    fn on_detach(&mut self) {
        log::debug!("Detaching tile layer {}", self.id);
        self.peer.detach();
        self.last_report = None;
    }

    fn update(&mut self, ctx: &mut PeerContext<'_>) -> bool {
        self.process_load_results(&mut *ctx.factory) > 0
    }
}
