use serde::{Deserialize, Serialize};

use crate::core::constants::MAX_LATITUDE;

/// Represents a geographical coordinate with latitude and longitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Creates a new LatLng coordinate
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Validates that the coordinates are within valid ranges
    pub fn is_valid(&self) -> bool {
        self.lat >= -90.0 && self.lat <= 90.0 && self.lng >= -180.0 && self.lng <= 180.0
    }

    /// Wraps longitude to [-180, 180] range
    pub fn wrap_lng(lng: f64) -> f64 {
        let wrapped = lng % 360.0;
        if wrapped > 180.0 {
            wrapped - 360.0
        } else if wrapped < -180.0 {
            wrapped + 360.0
        } else {
            wrapped
        }
    }

    /// Clamps latitude to the range a mercator grid can represent
    pub fn clamp_lat(lat: f64) -> f64 {
        lat.clamp(-MAX_LATITUDE, MAX_LATITUDE)
    }
}

impl Default for LatLng {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Represents a point in screen or projected coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn add(&self, other: &Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }

    pub fn subtract(&self, other: &Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Integer screen rectangle in device pixels, anchored at its top-left corner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PixelRect {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

impl PixelRect {
    pub fn new(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Builds a rect from fractional coordinates, truncating toward zero.
    /// Non-finite inputs collapse to zero instead of wrapping.
    pub fn truncated(left: f64, top: f64, width: f64, height: f64) -> Self {
        fn px(v: f64) -> i32 {
            if v.is_finite() {
                v as i32
            } else {
                0
            }
        }
        Self::new(px(left), px(top), px(width), px(height))
    }

    pub fn right(&self) -> i32 {
        self.left.saturating_add(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.top.saturating_add(self.height)
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.left as f64 + self.width as f64 / 2.0,
            self.top as f64 + self.height as f64 / 2.0,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Overlap test used when looking for preview material.
    ///
    /// A candidate sitting flush against the left or top edge still counts,
    /// one flush against the right or bottom edge does not.
    pub fn touches(&self, candidate: &PixelRect) -> bool {
        !(candidate.left >= self.right()
            || candidate.right() < self.left
            || candidate.top >= self.bottom()
            || candidate.bottom() < self.top)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lat_lng_creation() {
        let coord = LatLng::new(40.7128, -74.0060);
        assert_eq!(coord.lat, 40.7128);
        assert_eq!(coord.lng, -74.0060);
        assert!(coord.is_valid());
        assert!(!LatLng::new(91.0, 0.0).is_valid());
    }

    #[test]
    fn test_wrap_and_clamp() {
        assert_eq!(LatLng::wrap_lng(190.0), -170.0);
        assert_eq!(LatLng::wrap_lng(-190.0), 170.0);
        assert_eq!(LatLng::clamp_lat(89.0), MAX_LATITUDE);
    }

    #[test]
    fn test_point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert_eq!(a.distance_to(&b), 5.0);
        assert_eq!(b.subtract(&a).add(&a), b);
    }

    #[test]
    fn test_pixel_rect_truncation() {
        let rect = PixelRect::truncated(10.9, -3.7, 256.0, f64::NAN);
        assert_eq!(rect, PixelRect::new(10, -3, 256, 0));
        assert!(rect.is_empty());
    }

    #[test]
    fn test_pixel_rect_truncation_of_infinities() {
        let rect = PixelRect::truncated(f64::INFINITY, f64::NEG_INFINITY, 256.0, f64::INFINITY);
        assert_eq!(rect, PixelRect::new(0, 0, 256, 0));
    }

    #[test]
    fn test_pixel_rect_touches() {
        let target = PixelRect::new(0, 0, 256, 256);

        assert!(target.touches(&PixelRect::new(128, 128, 256, 256)));
        // Flush on the left edge counts
        assert!(target.touches(&PixelRect::new(-256, 0, 256, 256)));
        // Flush on the right edge does not
        assert!(!target.touches(&PixelRect::new(256, 0, 256, 256)));
        assert!(!target.touches(&PixelRect::new(0, 300, 256, 256)));
    }
}
