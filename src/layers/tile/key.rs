use serde::{Deserialize, Serialize};

/// Identity and geometry of one grid cell at one native level.
///
/// `scaled_x`/`scaled_y` are the cell's projected origin divided by the
/// native resolution, so `scaled_x * res` recovers projected units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileKey {
    pub id: String,
    pub level: i32,
    pub tile_x: i64,
    pub tile_y: i64,
    pub res: f64,
    pub scaled_x: f64,
    pub scaled_y: f64,
    pub size: u32,
}

impl TileKey {
    pub fn new(
        level: i32,
        tile_x: i64,
        tile_y: i64,
        res: f64,
        scaled_x: f64,
        scaled_y: f64,
        size: u32,
    ) -> Self {
        Self {
            id: Self::make_id(level, tile_x, tile_y),
            level,
            tile_x,
            tile_y,
            res,
            scaled_x,
            scaled_y,
            size,
        }
    }

    /// `"{tile_x},{tile_y}@{level}"`
    pub fn make_id(level: i32, tile_x: i64, tile_y: i64) -> String {
        format!("{},{}@{}", tile_x, tile_y, level)
    }

    pub fn projected_x(&self) -> f64 {
        self.scaled_x * self.res
    }

    pub fn projected_y(&self) -> f64 {
        self.scaled_y * self.res
    }

    /// Quadtree path of this tile, one digit per level from the root
    pub fn quadkey(&self) -> String {
        quadkey(self.tile_x, self.tile_y, self.level)
    }
}

/// Encodes a tile address as a quadkey.
///
/// Each digit is `'0'` plus 1 when the x bit is set and 2 when the y bit is
/// set, walking from the most significant level bit down.
pub fn quadkey(tile_x: i64, tile_y: i64, level: i32) -> String {
    let depth = level.clamp(0, 63);
    let mut key = String::with_capacity(depth as usize);
    for i in (1..=depth).rev() {
        let mask = 1i64 << (i - 1);
        let mut digit = b'0';
        if tile_x & mask != 0 {
            digit += 1;
        }
        if tile_y & mask != 0 {
            digit += 2;
        }
        key.push(digit as char);
    }
    key
}
