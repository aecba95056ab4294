pub mod headless;

#[cfg(feature = "render")]
pub mod raster;
