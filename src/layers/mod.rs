pub mod base;
pub mod tile;
