//! Projections map global coordinates onto a projected plane and define the
//! discrete resolution pyramid that tile grids are cut from.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};
use std::fmt::Debug;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::core::{
    bounds::Bounds,
    constants::{
        EARTH_RADIUS, MAX_LATITUDE, MERCATOR_DEFAULT_RES, MERCATOR_HIGHEST_RES,
        MERCATOR_MAX_LEVEL, MERCATOR_MIN_LEVEL,
    },
    geo::LatLng,
};

/// A projection and its resolution pyramid.
///
/// Projected coordinates are resolution invariant. Display coordinates are
/// projected coordinates divided by a resolution, with the inversion flags
/// describing whether the projected origin sits at the visual right/bottom.
pub trait Projection: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Continuous level for a resolution
    fn to_level(&self, res: f64) -> f64;

    /// Resolution for a (possibly fractional) level
    fn from_level(&self, level: f64) -> f64;

    /// Projected extent of the whole surface
    fn extent(&self) -> Bounds;

    fn x_inverted(&self) -> bool {
        false
    }

    fn y_inverted(&self) -> bool {
        false
    }

    fn min_level(&self) -> i32;
    fn max_level(&self) -> i32;

    fn default_resolution(&self) -> f64 {
        self.from_level(self.min_level() as f64)
    }

    fn fwd_x(&self, x: f64) -> f64;
    fn fwd_y(&self, y: f64) -> f64;
    fn inv_x(&self, x: f64) -> f64;
    fn inv_y(&self, y: f64) -> f64;

    fn clamp_level(&self, level: f64) -> f64 {
        level.clamp(self.min_level() as f64, self.max_level() as f64)
    }
}

/// Spherical mercator (EPSG:3857) with the usual 256px pyramid where level 1
/// is a 2x2 grid.
#[derive(Debug, Clone)]
pub struct WebMercator {
    min_level: i32,
    max_level: i32,
    extent: Bounds,
}

impl WebMercator {
    pub fn new() -> Self {
        Self::with_levels(MERCATOR_MIN_LEVEL, MERCATOR_MAX_LEVEL)
    }

    pub fn with_levels(min_level: i32, max_level: i32) -> Self {
        let extent = Bounds::from_coords(
            Self::project_x(-180.0),
            Self::project_y(-MAX_LATITUDE),
            Self::project_x(180.0),
            Self::project_y(MAX_LATITUDE),
        );
        Self {
            min_level,
            max_level,
            extent,
        }
    }

    /// Geographic extent covered by the projected plane
    pub fn global_extent() -> Bounds {
        Bounds::from_coords(-180.0, -MAX_LATITUDE, 180.0, MAX_LATITUDE)
    }

    pub fn default_center() -> LatLng {
        LatLng::new(39.7406, -104.985441)
    }

    fn project_x(lng: f64) -> f64 {
        lng.to_radians() * EARTH_RADIUS
    }

    fn project_y(lat: f64) -> f64 {
        (FRAC_PI_4 + 0.5 * lat.to_radians()).tan().ln() * EARTH_RADIUS
    }
}

impl Default for WebMercator {
    fn default() -> Self {
        Self::new()
    }
}

impl Projection for WebMercator {
    fn name(&self) -> &str {
        "EPSG:3857"
    }

    fn to_level(&self, res: f64) -> f64 {
        (MERCATOR_HIGHEST_RES / res).log2() + 1.0
    }

    fn from_level(&self, level: f64) -> f64 {
        MERCATOR_HIGHEST_RES / 2f64.powf(level - 1.0)
    }

    fn extent(&self) -> Bounds {
        self.extent
    }

    fn y_inverted(&self) -> bool {
        true
    }

    fn min_level(&self) -> i32 {
        self.min_level
    }

    fn max_level(&self) -> i32 {
        self.max_level
    }

    fn default_resolution(&self) -> f64 {
        MERCATOR_DEFAULT_RES
    }

    fn fwd_x(&self, x: f64) -> f64 {
        Self::project_x(x)
    }

    fn fwd_y(&self, y: f64) -> f64 {
        Self::project_y(y)
    }

    fn inv_x(&self, x: f64) -> f64 {
        (x / EARTH_RADIUS).to_degrees()
    }

    fn inv_y(&self, y: f64) -> f64 {
        (FRAC_PI_2 - 2.0 * (-y / EARTH_RADIUS).exp().atan()).to_degrees()
    }
}

/// Flat pixel pyramid for non-geographic imagery (scans, deep-zoom images).
///
/// Projected units are full-resolution image pixels. Level 0 is the most
/// zoomed out and each level halves the resolution.
#[derive(Debug, Clone)]
pub struct PlanarProjection {
    width: f64,
    height: f64,
    max_res: f64,
    max_level: i32,
}

impl PlanarProjection {
    pub fn new(width: f64, height: f64, max_res: f64, max_level: i32) -> Self {
        Self {
            width,
            height,
            max_res,
            max_level,
        }
    }
}

impl Projection for PlanarProjection {
    fn name(&self) -> &str {
        "planar"
    }

    fn to_level(&self, res: f64) -> f64 {
        (self.max_res / res).log2()
    }

    fn from_level(&self, level: f64) -> f64 {
        self.max_res / 2f64.powf(level)
    }

    fn extent(&self) -> Bounds {
        Bounds::from_coords(0.0, 0.0, self.width, self.height)
    }

    fn min_level(&self) -> i32 {
        0
    }

    fn max_level(&self) -> i32 {
        self.max_level
    }

    fn fwd_x(&self, x: f64) -> f64 {
        x
    }

    fn fwd_y(&self, y: f64) -> f64 {
        y
    }

    fn inv_x(&self, x: f64) -> f64 {
        x
    }

    fn inv_y(&self, y: f64) -> f64 {
        y
    }
}

static WEB_MERCATOR: Lazy<Arc<dyn Projection>> = Lazy::new(|| Arc::new(WebMercator::new()));

/// Shared spherical mercator instance.
///
/// Display states compare projections by identity, so hosts should hand out
/// this instance rather than constructing their own.
pub fn web_mercator() -> Arc<dyn Projection> {
    Arc::clone(&WEB_MERCATOR)
}

/// Identity comparison for shared projections
pub fn same_projection(a: &Arc<dyn Projection>, b: &Arc<dyn Projection>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}
