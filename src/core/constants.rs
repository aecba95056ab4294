//! Engine-wide constants. Keeping them in a single place makes it easier to
//! tweak the magic numbers shared by projections, selection and loading.

/// Default square tile size in pixels.
pub const TILE_SIZE: u32 = 256;

/// Pixel ratio used when neither the options nor the host provide one.
pub const DEFAULT_PIXEL_RATIO: f64 = 1.0;

/// Upper bound on the number of keys a single selection may produce.
/// Anything larger is treated as degenerate geometry.
pub const MAX_SELECTION_TILES: u64 = 16_384;

/// Mean equatorial radius used by the spherical mercator.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Latitude at which the spherical mercator grid becomes square.
pub const MAX_LATITUDE: f64 = 85.05112878;

/// Resolution (projected meters per pixel) of mercator level 1.
pub const MERCATOR_HIGHEST_RES: f64 = 78_271.5170;

/// Resolution a mercator map starts at when none is given (level 8).
pub const MERCATOR_DEFAULT_RES: f64 = 611.4962;

pub const MERCATOR_MIN_LEVEL: i32 = 1;
pub const MERCATOR_MAX_LEVEL: i32 = 18;

/// Default retry delay for failed tile loads, in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;

/// User agent sent by the HTTP image loader.
pub const USER_AGENT: &str = concat!("tilemosaic/", env!("CARGO_PKG_VERSION"));

/// Source template for the public OpenStreetMap tile servers.
pub const OSM_TILE_SRC: &str =
    "https://${modulo:a,b,c}.tile.openstreetmap.org/${level}/${tileX}/${tileY}.png";
