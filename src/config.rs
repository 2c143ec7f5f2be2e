use serde::Deserialize;
use std::error::Error;
use std::fs;
use std::path::Path;

use vista_terrain::IterationConfig;

/// Renderer settings. Every field may be omitted from the TOML file.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RenderConfig {
    /// Horizontal render distance in regions.
    #[serde(default = "default_render_distance")]
    pub render_distance: i32,
    #[serde(default)]
    pub advanced_terrain_culling: bool,
    #[serde(default = "default_true")]
    pub cull_backfacing_terrain: bool,
    #[serde(default)]
    pub enable_near_occluders: bool,
    #[serde(default)]
    pub shadows_enabled: bool,
    #[serde(default = "default_cascade_radii")]
    pub shadow_cascade_radii: [f32; 4],
    /// Log repeated GPU and task errors once, then only count them.
    #[serde(default = "default_true")]
    pub concise_errors: bool,
    #[serde(default)]
    pub debug_occlusion_raster: bool,
    #[serde(default)]
    pub trace_occlusion_edge_cases: bool,
    #[serde(default = "default_min_world_y")]
    pub min_world_y: i32,
    #[serde(default = "default_max_world_y")]
    pub max_world_y: i32,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_render_distance() -> i32 {
    12
}
fn default_true() -> bool {
    true
}
fn default_cascade_radii() -> [f32; 4] {
    [16.0, 48.0, 112.0, 240.0]
}
fn default_min_world_y() -> i32 {
    -64
}
fn default_max_world_y() -> i32 {
    320
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            render_distance: default_render_distance(),
            advanced_terrain_culling: false,
            cull_backfacing_terrain: true,
            enable_near_occluders: false,
            shadows_enabled: false,
            shadow_cascade_radii: default_cascade_radii(),
            concise_errors: true,
            debug_occlusion_raster: false,
            trace_occlusion_edge_cases: false,
            min_world_y: default_min_world_y(),
            max_world_y: default_max_world_y(),
            log_level: default_log_level(),
        }
    }
}

impl RenderConfig {
    /// Inclusive range of region layers covering `min_world_y..max_world_y`.
    pub fn chunk_y_range(&self) -> (i32, i32) {
        let min = self.min_world_y.min(self.max_world_y - 1);
        (min >> 4, (self.max_world_y - 1).max(min) >> 4)
    }

    pub fn iteration(&self, should_cull: bool) -> IterationConfig {
        IterationConfig {
            render_distance: self.render_distance.max(1),
            should_cull,
            advanced_culling: self.advanced_terrain_culling,
            cull_backfacing: self.cull_backfacing_terrain,
            enable_near_occluders: self.enable_near_occluders,
            shadows_enabled: self.shadows_enabled,
            cascade_radii: self.shadow_cascade_radii,
            frustum_padding: 0.0,
            debug_raster: self.debug_occlusion_raster,
            trace_edge_cases: self.trace_occlusion_edge_cases,
        }
    }

    pub fn log_filter(&self) -> log::LevelFilter {
        self.log_level
            .parse()
            .unwrap_or(log::LevelFilter::Info)
    }
}

pub fn load_config_from_path(path: &Path) -> Result<RenderConfig, Box<dyn Error>> {
    let s = fs::read_to_string(path)?;
    let cfg: RenderConfig = toml::from_str(&s)?;
    if cfg.render_distance < 1 {
        return Err(format!("render_distance must be positive, got {}", cfg.render_distance).into());
    }
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg: RenderConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, RenderConfig::default());
    }

    #[test]
    fn partial_file_overrides_named_fields() {
        let cfg: RenderConfig = toml::from_str(
            r#"
            render_distance = 6
            advanced_terrain_culling = true
            shadow_cascade_radii = [8.0, 24.0, 64.0, 128.0]
            log_level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.render_distance, 6);
        assert!(cfg.advanced_terrain_culling);
        assert!(cfg.cull_backfacing_terrain);
        assert_eq!(cfg.shadow_cascade_radii[0], 8.0);
        assert_eq!(cfg.log_filter(), log::LevelFilter::Debug);
    }

    #[test]
    fn unknown_log_level_falls_back_to_info() {
        let cfg = RenderConfig {
            log_level: "chatty".to_string(),
            ..RenderConfig::default()
        };
        assert_eq!(cfg.log_filter(), log::LevelFilter::Info);
        let cfg = RenderConfig {
            log_level: "TRACE".to_string(),
            ..RenderConfig::default()
        };
        assert_eq!(cfg.log_filter(), log::LevelFilter::Trace);
    }

    #[test]
    fn world_bounds_map_to_layers() {
        let cfg = RenderConfig {
            min_world_y: -64,
            max_world_y: 320,
            ..RenderConfig::default()
        };
        assert_eq!(cfg.chunk_y_range(), (-4, 19));
    }

    #[test]
    fn unreadable_file_is_an_error() {
        assert!(load_config_from_path(Path::new("/nonexistent/vista.toml")).is_err());
    }
}
