use futures::future::BoxFuture;
use quadtile::prelude::*;
use quadtile::CancelToken;

/// Checkerboard tiles whose shade darkens with depth
struct Checkerboard;

impl TilePixelProvider for Checkerboard {
    fn decode(
        &self,
        level: u32,
        row: u32,
        col: u32,
        _cancel: CancelToken,
    ) -> BoxFuture<'_, TileDecodeResult> {
        Box::pin(async move {
            // pretend the deepest level was never rendered
            if level == 4 {
                return TileDecodeResult::Unavailable;
            }
            let shade = 255u8.saturating_sub((level * 50) as u8);
            let rgba = if (row + col) % 2 == 0 {
                [shade, shade, 255, 255]
            } else {
                [255, shade, shade, 255]
            };
            TileDecodeResult::Pixels(PixelBuffer::solid(64, 64, rgba))
        })
    }

    fn name(&self) -> &str {
        "checkerboard"
    }
}

/// Drives a pyramid without a window, zooming in on one spot
fn main() -> quadtile::Result<()> {
    env_logger::init();

    println!("🗺️ quadtile headless example");
    println!("============================");

    let spawner = ManualSpawner::new();
    let mut pyramid = PyramidBuilder::new(
        "demo://checkerboard",
        TileGrid::global_equirectangular(64, 5),
        Arc::new(Checkerboard),
    )
    .with_profile(PyramidProfile::HighQuality)
    .with_spawner(Arc::new(spawner.clone()))
    .build(HeadlessSurface::new(512, 512))?;

    println!("✅ Pyramid with {} root tiles", pyramid.roots().len());

    let projection: Arc<dyn MapProjection> = Arc::new(EquirectangularProjection);
    let center = GeoPoint::new(37.77, -122.42);
    let mut half = 90.0;

    for step in 0..6 {
        let bounds = GeoBounds::new(
            center.lat - half / 2.0,
            center.lng - half,
            center.lat + half / 2.0,
            center.lng + half,
        );
        let view = ViewState::fit(bounds, 512.0, 256.0, projection.clone());

        // one frame to issue loads, one to pick them up
        let issued = pyramid.draw(&view);
        let finished = spawner.run_until_stalled();
        let drawn = pyramid.draw(&view);

        println!(
            "   🔍 step {} level {:?}: {} loads, {} decodes, {} draws ({} borrowed, {} composited)",
            step,
            drawn.draw_level,
            issued.loads_issued,
            finished,
            drawn.draws,
            drawn.borrowed_draws,
            drawn.composites
        );
        half /= 2.0;
    }

    if let Some(cache) = pyramid.cache() {
        let stats = cache.stats();
        println!(
            "\n📦 Cache: {} textures, {} bytes, hit rate {:.2}",
            stats.size,
            stats.bytes,
            stats.hit_rate()
        );
    }
    println!("📊 Pyramid state: {}", pyramid.state());
    println!("🖼️ Live textures: {}", pyramid.surface().live_textures());

    pyramid.release();
    println!("✅ Released, {} textures left", pyramid.surface().live_textures());
    Ok(())
}
