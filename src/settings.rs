// ============================================================================
// SETTINGS — values persisted across sessions (settings.toml)
// ============================================================================

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Application settings that persist across sessions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub camera_position: [f32; 2],
    pub camera_zoom: f32,
    /// Zoom level past which the pixel grid fades out.
    pub grid_depth: f32,
    pub brush_radius: i32,
    pub brush_color: [f32; 4],
    /// Adapter name fragment, or "low power"; empty picks the fastest adapter.
    pub preferred_gpu: String,
    pub last_project: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            camera_position: [0.0, 0.0],
            camera_zoom: 100.0,
            grid_depth: 75.0,
            brush_radius: 5,
            brush_color: [1.0, 1.0, 1.0, 1.0],
            preferred_gpu: String::new(),
            last_project: None,
        }
    }
}

impl Settings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/normalmaker/settings.toml  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\normalmaker\settings.toml
    /// On macOS:   ~/Library/Application Support/normalmaker/settings.toml
    pub fn settings_path() -> Option<PathBuf> {
        Some(config_dir()?.join("normalmaker").join("settings.toml"))
    }

    /// Load from the default location; missing or unreadable files give defaults.
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "settings unreadable, using defaults");
                }
                return Self::default();
            }
        };
        match toml::from_str::<Settings>(&text) {
            Ok(settings) => settings.sanitized(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "settings corrupt, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        match Self::settings_path() {
            Some(path) => self.save_to(&path),
            None => Ok(()),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, text)?;
        tracing::debug!(path = %path.display(), "settings saved");
        Ok(())
    }

    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !self.camera_zoom.is_finite() || self.camera_zoom <= 0.0 {
            self.camera_zoom = defaults.camera_zoom;
        }
        if !self.camera_position.iter().all(|v| v.is_finite()) {
            self.camera_position = defaults.camera_position;
        }
        if !self.grid_depth.is_finite() {
            self.grid_depth = defaults.grid_depth;
        }
        self.brush_radius = self.brush_radius.clamp(1, 500);
        for c in &mut self.brush_color {
            *c = if c.is_finite() { c.clamp(0.0, 1.0) } else { 1.0 };
        }
        self
    }
}

/// Platform configuration directory (without the app sub-folder).
fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return Some(PathBuf::from(appdata));
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support"),
            );
        }
    }
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg));
    }
    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".config"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("normalmaker-settings-{}", std::process::id()))
            .join(name)
    }

    #[test]
    fn missing_file_gives_defaults() {
        let s = Settings::load_from(&temp_path("does-not-exist.toml"));
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn save_then_load() {
        let path = temp_path("roundtrip.toml");
        let s = Settings {
            camera_position: [12.0, -4.5],
            camera_zoom: 42.0,
            grid_depth: 60.0,
            brush_radius: 9,
            brush_color: [0.1, 0.2, 0.3, 1.0],
            preferred_gpu: "nvidia".into(),
            last_project: Some(PathBuf::from("/tmp/scene.nm")),
        };
        s.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path), s);
    }

    #[test]
    fn corrupt_file_gives_defaults() {
        let path = temp_path("corrupt.toml");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "camera_zoom = [").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let path = temp_path("partial.toml");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "brush_radius = 9000\ncamera_zoom = -1.0\n").unwrap();
        let s = Settings::load_from(&path);
        assert_eq!(s.brush_radius, 500);
        assert_eq!(s.camera_zoom, 100.0);
        assert_eq!(s.grid_depth, 75.0);
    }
}
