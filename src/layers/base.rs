use crate::{
    core::map_state::{MapState, StateChange},
    traits::{ContainerRef, DrawableFactory},
};

/// How a layer's peer lives inside the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentKind {
    /// Tiled imagery reconciled against the display state
    Tiles,
    /// Host-drawn content the engine only positions
    Custom,
}

impl std::fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttachmentKind::Tiles => write!(f, "tiles"),
            AttachmentKind::Custom => write!(f, "custom"),
        }
    }
}

/// Host resources a peer draws with
pub struct PeerContext<'a> {
    pub container: &'a ContainerRef,
    pub factory: &'a mut dyn DrawableFactory,
}

impl<'a> PeerContext<'a> {
    pub fn new(container: &'a ContainerRef, factory: &'a mut dyn DrawableFactory) -> Self {
        Self { container, factory }
    }
}

/// Attachment contract between a host and a layer
pub trait LayerPeer {
    fn kind(&self) -> AttachmentKind;

    /// Geometry changed in a way that may change the tile level
    fn on_reset(&mut self, state: &MapState, ctx: &mut PeerContext<'_>);

    /// The viewport moved or was resized at the same resolution
    fn on_position(&mut self, state: &MapState, ctx: &mut PeerContext<'_>);

    /// The layer left the host. Everything it attached must be released.
    fn on_detach(&mut self);

    /// Applies asynchronous work that finished since the last call.
    /// Returns whether anything visible changed.
    fn update(&mut self, _ctx: &mut PeerContext<'_>) -> bool {
        false
    }
}

/// Notifies `peer` of the move from `previous` to `next`
pub fn dispatch_change(
    peer: &mut dyn LayerPeer,
    previous: &MapState,
    next: &MapState,
    ctx: &mut PeerContext<'_>,
) -> StateChange {
    let change = previous.compare(next);
    match change {
        StateChange::Full => peer.on_reset(next, ctx),
        StateChange::Position => peer.on_position(next, ctx),
        StateChange::None => {
            // A transition can start or end without moving the viewport
            if !same_final_state(previous, next) {
                peer.on_reset(next, ctx);
            }
        }
    }
    change
}

fn same_final_state(a: &MapState, b: &MapState) -> bool {
    match (&a.final_state, &b.final_state) {
        (None, None) => true,
        (Some(a), Some(b)) => std::sync::Arc::ptr_eq(a, b),
        _ => false,
    }
}
