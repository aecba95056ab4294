use std::time::{Duration, Instant};

use clap::Parser;
use tilemosaic::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "tilemosaic-app")]
#[command(about = "Render a map viewport to a PNG file")]
#[command(allow_negative_numbers = true)]
struct Args {
    /// Latitude of the viewport center
    lat: Option<f64>,

    /// Longitude of the viewport center
    lng: Option<f64>,

    /// Zoom level, clamped to the projection's levels
    #[arg(short, long, default_value_t = 12.0)]
    zoom: f64,

    /// Viewport width in CSS pixels
    #[arg(long, default_value_t = 800.0)]
    width: f64,

    /// Viewport height in CSS pixels
    #[arg(long, default_value_t = 600.0)]
    height: f64,

    /// Output file
    #[arg(short, long, default_value = "tilemosaic.png")]
    out: String,

    /// Tile layer options as JSON (defaults to OpenStreetMap)
    #[arg(long)]
    options: Option<String>,

    /// Seconds to wait for outstanding tiles
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tilemosaic::init_logger();
    let args = Args::parse();
    let center = WebMercator::default_center();
    let lat = args.lat.unwrap_or(center.lat);
    let lng = args.lng.unwrap_or(center.lng);
    let timeout = Duration::from_secs(args.timeout);

    let options = match &args.options {
        Some(path) => TileLayerOptions::from_json(&std::fs::read_to_string(path)?)?,
        None => TileLayerOptions::openstreetmap(),
    };
    log::info!("Loading tiles from {}", options.tile_src);

    let loader = HttpImageLoader::current()?;
    let mut layer = TileLayer::new("base", options, Box::new(loader))?;

    let mut state = MapState::mercator(args.width, args.height);
    let zoom = state.prj.clamp_level(args.zoom);
    state.set_zoom(zoom, 0.0, 0.0);
    state.center_on(lng, lat);

    let list = DisplayList::shared();
    let container: ContainerRef = list.clone();
    let mut factory = RasterFactory::new();
    let mut ctx = PeerContext::new(&container, &mut factory);

    layer.on_reset(&state, &mut ctx);
    if let Some(report) = layer.last_report() {
        log::info!("Selected {} tiles at zoom {}", report.selected, zoom);
    }

    let deadline = Instant::now() + timeout;
    while layer.is_loading() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
        layer.update(&mut ctx);
    }
    if layer.is_loading() {
        log::warn!("Gave up on {} tiles after {:?}", layer.pending_loads(), timeout);
    }

    let pr = layer.pixel_ratio();
    let frame = list.render((args.width * pr) as u32, (args.height * pr) as u32);
    frame.save(&args.out)?;
    log::info!("Wrote {} ({} tiles)", args.out, list.len());

    layer.on_detach();
    Ok(())
}
