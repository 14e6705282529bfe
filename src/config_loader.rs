use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use ultraviolet::Vec3;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub shader_directory: PathBuf,
    pub texture_directory: PathBuf,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Output image size relative to the viewport.
    pub render_scale: f32,
    /// Frames rendered before the headless loop exits, `None` runs until killed.
    pub frame_count: Option<u64>,
    pub local_player_speed: f32,
    pub cached: CachedData,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shader_directory: "assets/shaders".into(),
            texture_directory: "assets/textures".into(),
            viewport_width: 1280,
            viewport_height: 720,
            render_scale: 0.5,
            frame_count: Some(600),
            local_player_speed: 200.0,
            cached: CachedData::default(),
        }
    }
}

impl Config {
    pub fn from_str(value: &str) -> serde_json::Result<Self> {
        serde_json::from_str(value)
    }

    /// Size of the traced image, never zero.
    pub fn render_extent(&self) -> (u32, u32) {
        let scale = |size: u32| ((size as f32 * self.render_scale) as u32).max(1);
        (scale(self.viewport_width), scale(self.viewport_height))
    }
}

pub struct ConfigFileLoader {
    pub path: PathBuf,
    config: Option<Config>,
}

impl ConfigFileLoader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().into(),
            config: None,
        }
    }

    /// Reads the file, or writes one with the defaults when there is none yet.
    pub fn load_config(&mut self) -> anyhow::Result<&mut Config> {
        let config = match std::fs::read_to_string(&self.path) {
            Ok(content) => Config::from_str(&content)
                .with_context(|| format!("Invalid config file {}", self.path.display()))?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No config at {}, writing defaults", self.path.display());
                self.config = Some(Config::default());
                self.save_config()?;
                Config::default()
            }
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("Could not read {}", self.path.display()))
            }
        };
        Ok(self.config.insert(config))
    }

    pub fn get_or_load_config(&mut self) -> anyhow::Result<&mut Config> {
        match self.config {
            Some(ref mut config) => Ok(config),
            None => self.load_config(),
        }
    }

    pub fn save_config(&self) -> anyhow::Result<()> {
        if let Some(config) = &self.config {
            let content = serde_json::to_string_pretty(config)?;
            std::fs::write(&self.path, content)
                .with_context(|| format!("Could not write {}", self.path.display()))?;
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct CachedData {
    pub camera_position: Option<CameraPosition>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CameraPosition {
    pub position: Vec3,
    pub pitch: f32,
    pub yaw: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("config.json");
        let mut loader = ConfigFileLoader::new(&path);

        let config = loader.load_config().unwrap().clone();

        assert_eq!(config, Config::default());
        assert!(path.exists());
    }

    #[test]
    fn saved_changes_are_loaded_back() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("config.json");
        let mut loader = ConfigFileLoader::new(&path);
        let config = loader.load_config().unwrap();
        config.viewport_width = 640;
        config.cached.camera_position = Some(CameraPosition {
            position: Vec3::new(1.0, 2.0, 3.0),
            pitch: 0.5,
            yaw: -0.25,
        });
        loader.save_config().unwrap();

        let mut reloaded = ConfigFileLoader::new(&path);
        let config = reloaded.get_or_load_config().unwrap();

        assert_eq!(config.viewport_width, 640);
        assert_eq!(
            config.cached.camera_position.as_ref().unwrap().position,
            Vec3::new(1.0, 2.0, 3.0)
        );
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let config = Config::from_str(r#"{ "render_scale": 1.0 }"#).unwrap();

        assert_eq!(config.render_scale, 1.0);
        assert_eq!(config.viewport_width, 1280);
        assert_eq!(config.render_extent(), (1280, 720));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(ConfigFileLoader::new(&path).load_config().is_err());
    }

    #[test]
    fn render_extent_never_collapses() {
        let config = Config {
            viewport_width: 1,
            viewport_height: 1,
            ..Config::default()
        };

        assert_eq!(config.render_extent(), (1, 1));
    }
}
