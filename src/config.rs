use crate::surface::MAX_CONTENT_HEIGHT;
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Which decorative layers are mounted at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub(crate) enum SceneMode {
    Sky,
    Chart,
    Both,
}

impl SceneMode {
    pub(crate) fn wants_sky(self) -> bool {
        matches!(self, SceneMode::Sky | SceneMode::Both)
    }
    pub(crate) fn wants_chart(self) -> bool {
        matches!(self, SceneMode::Chart | SceneMode::Both)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct Settings {
    pub(crate) fps_cap: u32,
    pub(crate) seed: u64,
    /// Device pixel density; capped at 1.5 when the surface is measured.
    pub(crate) density: f32,
    /// Logical pixels covered by one terminal cell.
    pub(crate) cell_width: f32,
    pub(crate) cell_height: f32,
    /// Height of the content the sky sits behind, in logical pixels.
    /// The surface is never shorter than the viewport.
    pub(crate) content_height: f32,
    pub(crate) scene: SceneMode,
    pub(crate) show_hud: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fps_cap: 60,
            seed: 0,
            density: 1.0,
            cell_width: 8.0,
            cell_height: 16.0,
            content_height: 0.0,
            scene: SceneMode::Both,
            show_hud: true,
        }
    }
}

#[derive(Parser, Debug, Default)]
#[command(name = "skyscene")]
#[command(about = "Decorative night sky and hero chart lines for the terminal", long_about = None)]
pub(crate) struct Cli {
    /// frames per second (10..240)
    #[arg(long)]
    pub(crate) fps: Option<u32>,

    /// rng seed (0 = random)
    #[arg(long)]
    pub(crate) seed: Option<u64>,

    /// device pixel density used for supersampling (capped at 1.5)
    #[arg(long)]
    pub(crate) density: Option<f32>,

    /// logical pixels per terminal column
    #[arg(long)]
    pub(crate) cell_width: Option<f32>,

    /// logical pixels per terminal row
    #[arg(long)]
    pub(crate) cell_height: Option<f32>,

    /// content height in logical pixels (surface grows to cover it)
    #[arg(long)]
    pub(crate) content_height: Option<f32>,

    /// layers to mount at startup
    #[arg(long, value_enum)]
    pub(crate) scene: Option<SceneMode>,

    /// start with the status line hidden
    #[arg(long, default_value_t = false)]
    pub(crate) no_hud: bool,

    /// write a debug log to the data directory
    #[arg(long, default_value_t = false)]
    pub(crate) log: bool,

    /// persist the effective settings
    #[arg(long, default_value_t = false)]
    pub(crate) save_settings: bool,
}

impl Settings {
    pub(crate) fn apply_cli(&mut self, cli: &Cli) {
        if let Some(v) = cli.fps {
            self.fps_cap = v;
        }
        if let Some(v) = cli.seed {
            self.seed = v;
        }
        if let Some(v) = cli.density {
            self.density = v;
        }
        if let Some(v) = cli.cell_width {
            self.cell_width = v;
        }
        if let Some(v) = cli.cell_height {
            self.cell_height = v;
        }
        if let Some(v) = cli.content_height {
            self.content_height = v;
        }
        if let Some(v) = cli.scene {
            self.scene = v;
        }
        if cli.no_hud {
            self.show_hud = false;
        }
        self.fps_cap = self.fps_cap.clamp(10, 240);
        if !(self.cell_width > 0.0 && self.cell_width.is_finite()) {
            self.cell_width = 8.0;
        }
        if !(self.cell_height > 0.0 && self.cell_height.is_finite()) {
            self.cell_height = 16.0;
        }
        self.content_height = if self.content_height.is_finite() {
            self.content_height.clamp(0.0, MAX_CONTENT_HEIGHT)
        } else {
            0.0
        };
    }
}

pub(crate) struct Paths {
    pub(crate) settings_path: PathBuf,
    pub(crate) log_path: PathBuf,
}

pub(crate) fn project_paths() -> Result<Paths> {
    let proj = ProjectDirs::from("com", "skyscene", "Skyscene")
        .context("could not resolve project directories")?;
    let dir = proj.data_local_dir().to_path_buf();
    fs::create_dir_all(&dir).ok();
    Ok(Paths {
        settings_path: dir.join("settings.json"),
        log_path: dir.join("skyscene.log"),
    })
}

pub(crate) fn load_settings(path: &Path) -> Settings {
    if let Ok(s) = fs::read_to_string(path) {
        if let Ok(v) = serde_json::from_str::<Settings>(&s) {
            return v;
        }
    }
    Settings::default()
}

pub(crate) fn save_settings_atomic(path: &Path, s: &Settings) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_vec_pretty(s)?;
    fs::write(&tmp, data).with_context(|| format!("writing {}", tmp.display()))?;
    if path.exists() {
        let _ = fs::remove_file(path);
    }
    fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_file_values_and_clamps_fps() {
        let mut s = Settings::default();
        let cli = Cli {
            fps: Some(1000),
            seed: Some(7),
            scene: Some(SceneMode::Sky),
            no_hud: true,
            ..Cli::default()
        };
        s.apply_cli(&cli);
        assert_eq!(s.fps_cap, 240);
        assert_eq!(s.seed, 7);
        assert_eq!(s.scene, SceneMode::Sky);
        assert!(!s.show_hud);
        assert!(s.scene.wants_sky());
        assert!(!s.scene.wants_chart());
    }

    #[test]
    fn content_height_is_kept_finite_and_bounded() {
        let mut s = Settings::default();
        s.apply_cli(&Cli {
            content_height: Some(f32::INFINITY),
            ..Cli::default()
        });
        assert_eq!(s.content_height, 0.0);

        s.apply_cli(&Cli {
            content_height: Some(f32::NAN),
            cell_height: Some(f32::INFINITY),
            ..Cli::default()
        });
        assert_eq!(s.content_height, 0.0);
        assert_eq!(s.cell_height, 16.0);

        s.apply_cli(&Cli {
            content_height: Some(1e9),
            ..Cli::default()
        });
        assert_eq!(s.content_height, MAX_CONTENT_HEIGHT);

        s.apply_cli(&Cli {
            content_height: Some(-50.0),
            ..Cli::default()
        });
        assert_eq!(s.content_height, 0.0);

        let surf = crate::surface::Surface::measure(
            crate::surface::Viewport { cols: 100, rows: 30 },
            &s,
        )
        .unwrap();
        let (w, h) = surf.backing_size();
        assert_eq!((w, h), (200, 120));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let s: Settings = serde_json::from_str(r#"{"fps_cap": 30, "scene": "chart"}"#).unwrap();
        assert_eq!(s.fps_cap, 30);
        assert_eq!(s.scene, SceneMode::Chart);
        assert_eq!(s.cell_width, 8.0);
    }

    #[test]
    fn settings_roundtrip_through_disk() {
        let dir = std::env::temp_dir().join(format!("skyscene-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.json");
        let mut s = Settings::default();
        s.density = 1.25;
        save_settings_atomic(&path, &s).unwrap();
        save_settings_atomic(&path, &s).unwrap();
        let back = load_settings(&path);
        assert_eq!(back.density, 1.25);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn unreadable_file_yields_defaults() {
        let s = load_settings(Path::new("/nonexistent/skyscene/settings.json"));
        assert_eq!(s.fps_cap, Settings::default().fps_cap);
    }
}
