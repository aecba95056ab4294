//! The display state a layer is rendered against.
//!
//! `x`/`y` locate the viewport's top-left corner in display space, which is
//! projected space divided by `res` with axis inversion undone. A state that
//! is on its way to some other state (an animated zoom, say) carries that
//! target in `final_state`.

use std::sync::Arc;

use crate::core::projection::{same_projection, web_mercator, Projection};

/// How much two display states differ
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StateChange {
    None,
    /// Only the viewport moved or resized
    Position,
    /// Projection or resolution changed
    Full,
}

#[derive(Debug, Clone)]
pub struct MapState {
    pub prj: Arc<dyn Projection>,
    pub res: f64,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub final_state: Option<Arc<MapState>>,
}

impl MapState {
    pub fn new(prj: Arc<dyn Projection>, res: f64, w: f64, h: f64) -> Self {
        Self {
            prj,
            res,
            x: 0.0,
            y: 0.0,
            w,
            h,
            final_state: None,
        }
    }

    /// Mercator state of the given size at the projection's default resolution
    pub fn mercator(w: f64, h: f64) -> Self {
        let prj = web_mercator();
        let res = prj.default_resolution();
        Self::new(prj, res, w, h)
    }

    pub fn with_final_state(mut self, target: Arc<MapState>) -> Self {
        self.final_state = Some(target);
        self
    }

    pub fn is_transitioning(&self) -> bool {
        self.final_state.is_some()
    }

    pub fn compare(&self, other: &MapState) -> StateChange {
        if !same_projection(&self.prj, &other.prj) || self.res != other.res {
            StateChange::Full
        } else if self.x != other.x || self.y != other.y || self.w != other.w || self.h != other.h {
            StateChange::Position
        } else {
            StateChange::None
        }
    }

    pub fn zoom(&self) -> f64 {
        self.prj.to_level(self.res)
    }

    pub fn get_dsp_x(&self, x: f64, _y: f64) -> f64 {
        self.x + x
    }

    pub fn get_dsp_y(&self, _x: f64, y: f64) -> f64 {
        self.y + y
    }

    /// Projected x of the viewport coordinate (x, y)
    pub fn get_prj_x(&self, x: f64, y: f64) -> f64 {
        let display = self.get_dsp_x(x, y) * self.res;
        if self.prj.x_inverted() {
            self.prj.extent().max.x - display
        } else {
            display
        }
    }

    /// Projected y of the viewport coordinate (x, y)
    pub fn get_prj_y(&self, x: f64, y: f64) -> f64 {
        let display = self.get_dsp_y(x, y) * self.res;
        if self.prj.y_inverted() {
            self.prj.extent().max.y - display
        } else {
            display
        }
    }

    pub fn get_glb_x(&self, x: f64, y: f64) -> f64 {
        self.prj.inv_x(self.get_prj_x(x, y))
    }

    pub fn get_glb_y(&self, x: f64, y: f64) -> f64 {
        self.prj.inv_y(self.get_prj_y(x, y))
    }

    pub fn prj_to_dsp_x(&self, prj_x: f64) -> f64 {
        let prj_x = if self.prj.x_inverted() {
            self.prj.extent().max.x - prj_x
        } else {
            prj_x
        };
        prj_x / self.res
    }

    pub fn prj_to_dsp_y(&self, prj_y: f64) -> f64 {
        let prj_y = if self.prj.y_inverted() {
            self.prj.extent().max.y - prj_y
        } else {
            prj_y
        };
        prj_y / self.res
    }

    /// Changes resolution keeping the projected point under viewport (x, y) fixed
    pub fn set_res(&mut self, res: f64, x: f64, y: f64) {
        if res != self.res {
            let prj_x = self.get_prj_x(x, y);
            let prj_y = self.get_prj_y(x, y);
            self.res = res;
            self.set_prj_xy(prj_x, prj_y, x, y);
        }
    }

    pub fn set_zoom(&mut self, level: f64, x: f64, y: f64) {
        let res = self.prj.from_level(level);
        self.set_res(res, x, y);
    }

    /// Places display coordinate (dsp_x, dsp_y) at viewport coordinate (x, y)
    pub fn set_dsp_xy(&mut self, dsp_x: f64, dsp_y: f64, x: f64, y: f64) {
        self.x = dsp_x - x;
        self.y = dsp_y - y;
    }

    pub fn set_prj_xy(&mut self, prj_x: f64, prj_y: f64, x: f64, y: f64) {
        let dsp_x = self.prj_to_dsp_x(prj_x);
        let dsp_y = self.prj_to_dsp_y(prj_y);
        self.set_dsp_xy(dsp_x, dsp_y, x, y);
    }

    /// Places a global coordinate (lng, lat for geographic projections)
    /// at viewport coordinate (x, y)
    pub fn set_glb_xy(&mut self, glb_x: f64, glb_y: f64, x: f64, y: f64) {
        let prj_x = self.prj.fwd_x(glb_x);
        let prj_y = self.prj.fwd_y(glb_y);
        self.set_prj_xy(prj_x, prj_y, x, y);
    }

    /// Centers the viewport on a global coordinate
    pub fn center_on(&mut self, glb_x: f64, glb_y: f64) {
        let (cx, cy) = (self.w / 2.0, self.h / 2.0);
        self.set_glb_xy(glb_x, glb_y, cx, cy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::projection::PlanarProjection;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-6, "{} != {}", a, b);
    }

    #[test]
    fn test_projected_round_trip_with_inversion() {
        let mut state = MapState::mercator(800.0, 600.0);
        state.center_on(-104.985441, 39.7406);

        assert_close(state.get_glb_x(400.0, 300.0), -104.985441);
        assert_close(state.get_glb_y(400.0, 300.0), 39.7406);

        let prj_y = state.get_prj_y(0.0, 10.0);
        assert_close(state.prj_to_dsp_y(prj_y), state.y + 10.0);
        // Y grows downward on screen but upward in mercator
        assert!(state.get_prj_y(0.0, 0.0) > state.get_prj_y(0.0, 100.0));
    }

    #[test]
    fn test_set_res_keeps_anchor_fixed() {
        let mut state = MapState::mercator(800.0, 600.0);
        state.center_on(10.0, 50.0);
        let before = (state.get_prj_x(200.0, 150.0), state.get_prj_y(200.0, 150.0));

        state.set_zoom(12.0, 200.0, 150.0);

        assert_close(state.zoom(), 12.0);
        assert_close(state.get_prj_x(200.0, 150.0), before.0);
        assert_close(state.get_prj_y(200.0, 150.0), before.1);
    }

    #[test]
    fn test_compare() {
        let prj: Arc<dyn Projection> = Arc::new(PlanarProjection::new(1024.0, 1024.0, 4.0, 2));
        let base = MapState::new(prj.clone(), 1.0, 300.0, 200.0);

        let mut moved = base.clone();
        moved.x = 12.0;
        let mut zoomed = base.clone();
        zoomed.res = 2.0;
        let reprojected = MapState::new(
            Arc::new(PlanarProjection::new(1024.0, 1024.0, 4.0, 2)),
            1.0,
            300.0,
            200.0,
        );

        assert_eq!(base.compare(&base.clone()), StateChange::None);
        assert_eq!(base.compare(&moved), StateChange::Position);
        assert_eq!(base.compare(&zoomed), StateChange::Full);
        assert_eq!(base.compare(&reprojected), StateChange::Full);
    }
}
