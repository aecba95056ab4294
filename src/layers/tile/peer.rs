//! Reconciliation of desired tiles against the three tile generations
//!
//! * `current`: what is on display
//! * `old`: the previous generation, kept only as preview material
//! * `transition`: tiles preloaded for the state an in-flight transition
//!   is heading to
//!
//! The peer is Stable while the display state has no final state and
//! Transitioning while it does. Entering a transition preloads tiles for
//! the target; leaving it disposes whatever was preloaded and never claimed.

use std::sync::Arc;

use super::{
    cache::TileSet,
    key::TileKey,
    selector::TileSelector,
    types::Tile,
};
use crate::{
    core::{
        config::{StalePolicy, TileLoadingConfig},
        geo::{PixelRect, Point},
        map_state::MapState,
    },
    traits::{ContainerRef, Disposer, DrawableFactory, RetryLogic},
};

/// What a reconciliation pass did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub selected: usize,
    /// Satisfied by a tile already in `current`
    pub reused: usize,
    /// Satisfied by a tile claimed from `transition`
    pub stolen: usize,
    pub created: Vec<String>,
    /// Ids swept from `current` into `old`
    pub demoted: Vec<String>,
    pub loads_issued: usize,
    pub previews: usize,
    /// Number of tiles preloaded, when this pass entered a transition
    pub preloaded: Option<usize>,
}

enum Source {
    Current,
    Transition,
    Missing,
}

pub struct TileLayerPeer {
    sel: TileSelector,
    pixel_ratio: f64,
    loading: TileLoadingConfig,
    locked_state: Option<Arc<MapState>>,
    current: TileSet,
    old: TileSet,
    transition: TileSet,
}

impl TileLayerPeer {
    pub fn new(mut sel: TileSelector, pixel_ratio: f64, loading: TileLoadingConfig) -> Self {
        sel.set_pixel_ratio(pixel_ratio);
        Self {
            sel,
            pixel_ratio,
            loading,
            locked_state: None,
            current: TileSet::new(),
            old: TileSet::new(),
            transition: TileSet::new(),
        }
    }

    pub fn selector(&self) -> &TileSelector {
        &self.sel
    }

    pub fn selector_mut(&mut self) -> &mut TileSelector {
        &mut self.sel
    }

    pub fn pixel_ratio(&self) -> f64 {
        self.pixel_ratio
    }

    pub fn loading_config(&self) -> &TileLoadingConfig {
        &self.loading
    }

    pub fn current(&self) -> &TileSet {
        &self.current
    }

    pub fn old(&self) -> &TileSet {
        &self.old
    }

    pub fn transition(&self) -> &TileSet {
        &self.transition
    }

    pub fn is_transitioning(&self) -> bool {
        self.locked_state.is_some()
    }

    /// Keys the viewport of `state` needs, at the native level nearest its
    /// resolution scaled by the pixel ratio
    pub fn keys_for(&self, state: &MapState) -> Vec<TileKey> {
        if !(state.w.is_finite() && state.h.is_finite() && state.w > 0.0 && state.h > 0.0) {
            return Vec::new();
        }
        let (right, bottom) = (state.w - 1.0, state.h - 1.0);
        self.sel.select(
            state.prj.as_ref(),
            state.res / self.pixel_ratio,
            state.get_prj_x(0.0, 0.0),
            state.get_prj_y(0.0, 0.0),
            state.get_prj_x(right, bottom),
            state.get_prj_y(right, bottom),
        )
    }

    /// Full reconciliation after the geometry changed
    pub fn on_reset(
        &mut self,
        state: &MapState,
        container: &ContainerRef,
        factory: &mut dyn DrawableFactory,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let lock_changed = match (&self.locked_state, &state.final_state) {
            (None, None) => false,
            (Some(locked), Some(target)) => !Arc::ptr_eq(locked, target),
            _ => true,
        };
        if lock_changed {
            self.locked_state = state.final_state.clone();
            match self.locked_state.clone() {
                Some(target) => report.preloaded = Some(self.load_pending_tiles(&target)),
                None => log::debug!("Transition finished, releasing preloaded tiles"),
            }
        }

        self.reconcile(state, container, factory, &mut report);
        report
    }

    /// Pan-only update. Runs the same pass as [`Self::on_reset`] but keeps
    /// the transition lock from the last reset.
    pub fn on_position(
        &mut self,
        state: &MapState,
        container: &ContainerRef,
        factory: &mut dyn DrawableFactory,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        self.reconcile(state, container, factory, &mut report);
        report
    }

    /// Fills `transition` with tiles for a pending final state. Tiles
    /// already on display are claimed rather than reloaded. Returns the
    /// number of loads issued.
    fn load_pending_tiles(&mut self, target: &MapState) -> usize {
        let pr = self.pixel_ratio;
        self.transition.clear(&mut self.sel);

        let mut fresh = Vec::new();
        for key in self.keys_for(target) {
            if self
                .current
                .move_to(&key.id, &mut self.transition, &mut self.sel)
                .is_some()
            {
                continue;
            }
            let mut tile = Tile::new(key);
            tile.set_bounds(tile_bounds(target, &tile.key, pr));
            fresh.push(tile.key.id.clone());
            self.transition.add(tile, &mut self.sel);
        }

        sort_by_center_distance(&mut fresh, &self.transition, pr * target.w / 2.0, pr * target.h / 2.0);
        for id in &fresh {
            if let Some(tile) = self.transition.get_mut(id) {
                self.sel.load_tile(tile);
            }
        }

        log::debug!(
            "Preloaded {} tiles for resolution {} ({} claimed from display)",
            fresh.len(),
            target.res,
            self.transition.len() - fresh.len()
        );
        fresh.len()
    }

    fn reconcile(
        &mut self,
        state: &MapState,
        container: &ContainerRef,
        factory: &mut dyn DrawableFactory,
        report: &mut ReconcileReport,
    ) {
        let pr = self.pixel_ratio;
        let transitioning = self.locked_state.is_some();

        self.current.reset_marks();
        let keys = self.keys_for(state);
        report.selected = keys.len();

        let mut fresh = Vec::new();
        for key in keys {
            let id = key.id.clone();
            let mut source = if self.current.contains(&id) {
                Source::Current
            } else if self
                .transition
                .move_to(&id, &mut self.current, &mut self.sel)
                .is_some()
            {
                Source::Transition
            } else {
                Source::Missing
            };

            // Placeholders never outlive the transition they were made for
            let stale_placeholder = self.current.get(&id).map_or(false, |t| t.temporary);
            if !transitioning && stale_placeholder {
                source = Source::Missing;
            }

            match source {
                Source::Current => report.reused += 1,
                Source::Transition => report.stolen += 1,
                Source::Missing => {
                    let mut tile = Tile::new(key);
                    tile.temporary = transitioning;
                    self.current.add(tile, &mut self.sel);
                    report.created.push(id.clone());
                }
            }

            let Some(tile) = self.current.get_mut(&id) else {
                continue;
            };
            tile.mark = true;
            let bounds = tile_bounds(state, &tile.key, pr);
            tile.set_bounds(bounds);
            if !tile.is_attached() {
                fresh.push(id);
            }
        }

        // Unwanted tiles become preview material. Every generation kept in
        // old follows the display, not only the ones demoted this pass.
        report.demoted = self.current.sweep(Some(&mut self.old), &mut self.sel);
        for tile in self.old.iter_mut() {
            let bounds = tile_bounds(state, &tile.key, pr);
            tile.set_bounds(bounds);
        }

        sort_by_center_distance(&mut fresh, &self.current, pr * state.w / 2.0, pr * state.h / 2.0);
        for id in &fresh {
            let Some(tile) = self.current.get_mut(id) else {
                continue;
            };
            if !tile.loading && !tile.temporary {
                self.sel.load_tile(tile);
                report.loads_issued += 1;
            }
            if !tile.has_drawable() && tile.generate_preview(&self.old, factory, &mut self.sel) {
                report.previews += 1;
            }
            tile.attach(container);
        }

        self.current.sweep(None, &mut self.sel);
        if !transitioning {
            self.old.sweep(None, &mut self.sel);
            self.transition.clear(&mut self.sel);
        }

        log::debug!(
            "Reconciled {} tiles: {} reused, {} claimed, {} new, {} demoted, {} loads, {} previews",
            report.selected,
            report.reused,
            report.stolen,
            report.created.len(),
            report.demoted.len(),
            report.loads_issued,
            report.previews
        );
    }

    /// Applies completed loads to the tiles they were issued for. Returns
    /// the number of tiles that received a drawable.
    pub fn process_load_results(&mut self, factory: &mut dyn DrawableFactory) -> usize {
        let mut applied = 0;

        for result in self.sel.drain_results() {
            let elapsed = self.sel.finish_load(&result);
            let serial = result.ticket.serial;

            let (tile, demoted) = if let Some(tile) = self.current.find_by_serial(&result.id, serial) {
                (tile, false)
            } else if let Some(tile) = self.transition.find_by_serial(&result.id, serial) {
                (tile, false)
            } else if let Some(tile) = self.old.find_by_serial(&result.id, serial) {
                (tile, true)
            } else {
                log::debug!("Ignoring completion for released tile {}", result.id);
                continue;
            };

            if demoted && self.loading.stale_completions == StalePolicy::DiscardSuperseded {
                log::debug!("Discarding completion for superseded tile {}", result.id);
                tile.loading = false;
                continue;
            }

            let outcome = result
                .outcome
                .map_err(|e| e.to_string())
                .and_then(|data| factory.decode(&tile.key, &data).map_err(|e| e.to_string()));

            match outcome {
                Ok(drawable) => {
                    tile.update(drawable, &mut self.sel);
                    tile.mark_loaded();
                    applied += 1;
                    log::debug!("Tile {} loaded in {:?}", result.id, elapsed.unwrap_or_default());
                }
                Err(error) => fail_tile(tile, error, &self.loading, &mut self.sel),
            }
        }

        applied
    }

    /// Reissues loads for failed tiles whose backoff has elapsed
    pub fn handle_load_retries(&mut self) -> usize {
        if !self.loading.retries_enabled() {
            return 0;
        }

        let config = &self.loading;
        let mut retried = 0;
        for tile in self.current.iter_mut().chain(self.transition.iter_mut()) {
            if tile.should_retry(
                config.max_retries,
                config.retry_delay_ms,
                config.exponential_backoff,
            ) {
                tile.begin_retry();
                log::debug!("Retrying tile {} (attempt {})", tile.key.id, tile.retry_count());
                self.sel.load_tile(tile);
                retried += 1;
            }
        }
        retried
    }

    /// Releases every tile, as when the layer leaves its host
    pub fn detach(&mut self) {
        self.current.clear(&mut self.sel);
        self.old.clear(&mut self.sel);
        self.transition.clear(&mut self.sel);
        self.locked_state = None;
    }
}

/// Screen bounds of a tile for a display state, in device pixels
pub fn tile_bounds(state: &MapState, key: &TileKey, pixel_ratio: f64) -> PixelRect {
    let scaled_size = pixel_ratio * (key.size as f64 * key.res / state.res).ceil();
    let left = pixel_ratio * (state.prj_to_dsp_x(key.projected_x()) - state.x).floor();
    let top = pixel_ratio * (state.prj_to_dsp_y(key.projected_y()) - state.y).floor();
    PixelRect::truncated(left, top, scaled_size, scaled_size)
}

/// Orders ids so tiles nearest the viewport center come first. Ties keep
/// their selection order.
fn sort_by_center_distance(ids: &mut Vec<String>, set: &TileSet, cx: f64, cy: f64) {
    let center = Point::new(cx, cy);
    let mut scored: Vec<(f64, String)> = ids
        .drain(..)
        .map(|id| {
            let distance = set
                .get(&id)
                .map_or(f64::INFINITY, |tile| tile.bounds().center().distance_to(&center));
            (distance, id)
        })
        .collect();
    scored.sort_by(|a, b| a.0.total_cmp(&b.0));
    ids.extend(scored.into_iter().map(|(_, id)| id));
}

fn fail_tile(tile: &mut Tile, error: String, config: &TileLoadingConfig, disposer: &mut dyn Disposer) {
    log::warn!("Failed to load tile {}: {}", tile.key.id, error);
    tile.mark_error(error);
    // A preview stays up while retries remain
    if tile.retry_count() >= config.max_retries {
        tile.release_drawable(disposer);
    }
}
