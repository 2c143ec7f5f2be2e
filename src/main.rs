use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use glam::{DVec3, Mat4, Vec3};
use vista::{BlockMesher, CameraState, HeightfieldWorld, RenderConfig, WorldRenderer};
use vista_cluster::RecordingGfx;

#[derive(Parser, Debug)]
#[command(name = "vista", about = "Headless terrain visibility and draw batching demo")]
struct Cli {
    /// Renderer settings (TOML)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Number of frames to simulate
    #[arg(long, default_value_t = 300)]
    frames: u64,
    /// Overrides `render_distance` from the config
    #[arg(long)]
    render_distance: Option<i32>,
    /// Disable occlusion culling
    #[arg(long)]
    no_cull: bool,
}

/// Slow circle over the terrain, looking along the direction of travel and slightly down.
fn camera_at(frame: u64) -> CameraState {
    let t = frame as f64 * 0.01;
    let position = DVec3::new(t.cos() * 96.0, 84.0, t.sin() * 96.0);
    let dir = Vec3::new(-(t.sin() as f32), -0.25, t.cos() as f32).normalize();
    let view_proj = Mat4::perspective_rh_gl(70f32.to_radians(), 16.0 / 9.0, 0.1, 1024.0)
        * Mat4::look_to_rh(Vec3::ZERO, dir, Vec3::Y);
    CameraState {
        position,
        view_proj,
        light_dir: Some(Vec3::new(0.3, -1.0, 0.2)),
    }
}

fn main() {
    let cli = Cli::parse();

    let (mut config, config_error) = match &cli.config {
        Some(path) => match vista::load_config_from_path(path) {
            Ok(cfg) => (cfg, None),
            Err(e) => (RenderConfig::default(), Some(format!("{}: {}", path.display(), e))),
        },
        None => (RenderConfig::default(), None),
    };
    if let Some(rd) = cli.render_distance {
        config.render_distance = rd.max(1);
    }

    // RUST_LOG still overrides the configured level
    env_logger::Builder::new()
        .filter_level(config.log_filter())
        .parse_default_env()
        .init();
    if let Some(err) = config_error {
        log::warn!("Failed to load render config {}, using defaults", err);
    }

    let mesher = Arc::new(BlockMesher::new(HeightfieldWorld::default()));
    let mut renderer = match WorldRenderer::new(RecordingGfx::new(), config, mesher) {
        Ok(r) => r,
        Err(e) => {
            log::error!("Failed to start terrain workers: {}", e);
            std::process::exit(1);
        }
    };

    let should_cull = !cli.no_cull;
    for frame in 0..cli.frames {
        renderer.setup_terrain(&camera_at(frame), frame, should_cull);
        renderer.render_solid();
        renderer.render_translucent();
        if renderer.config().shadows_enabled {
            for cascade in 0..vista::SHADOW_CASCADES {
                renderer.render_shadow(cascade);
            }
        }
        renderer.end_frame();
        renderer.gfx_mut().advance_gpu();

        if frame % 60 == 0 {
            let stats = renderer.stats();
            log::info!(
                "frame {}: {} visible, {} uploaded, {} builds queued, {} draw calls",
                frame,
                stats.visible,
                stats.uploaded,
                stats.scheduled_builds,
                stats.draw_calls
            );
            for line in renderer.debug_text() {
                log::info!("  {}", line);
            }
        }
        std::thread::sleep(Duration::from_millis(4));
    }

    renderer.shutdown();
    log::info!(
        "done: {} draw calls recorded",
        renderer.gfx().draw_calls()
    );
}
