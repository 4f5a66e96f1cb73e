//! Loading and saving [`EngineConfig`] through confy.

use std::path::{Path, PathBuf};

use editorlog_types::EngineConfig;

use crate::error::Result;
use crate::state::JsonCheckpointStore;

const APP_NAME: &str = "editorlog";

pub trait EngineConfigExt: Sized {
    /// Load from the user config dir, falling back to defaults.
    fn load() -> Self;
    fn save(&self) -> Result<()>;
    fn config_path() -> Result<PathBuf>;
    /// Configured log path, or the platform default `Editor.log`.
    fn resolved_log_path(&self) -> Option<PathBuf>;
    fn resolved_checkpoint_dir(&self) -> Option<PathBuf>;
}

impl EngineConfigExt for EngineConfig {
    fn load() -> Self {
        match confy::load(APP_NAME, None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load config, using defaults");
                Self::default()
            }
        }
    }

    fn save(&self) -> Result<()> {
        confy::store(APP_NAME, None, self)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        Ok(confy::get_configuration_file_path(APP_NAME, None)?)
    }

    fn resolved_log_path(&self) -> Option<PathBuf> {
        self.live
            .log_path
            .as_ref()
            .map(PathBuf::from)
            .or_else(default_editor_log_path)
    }

    fn resolved_checkpoint_dir(&self) -> Option<PathBuf> {
        self.live
            .checkpoint_dir
            .as_ref()
            .map(PathBuf::from)
            .or_else(JsonCheckpointStore::default_dir)
    }
}

/// Where the Unity Editor writes `Editor.log` on this platform.
pub fn default_editor_log_path() -> Option<PathBuf> {
    if cfg!(target_os = "windows") {
        dirs::data_local_dir().map(|d| d.join("Unity").join("Editor").join("Editor.log"))
    } else if cfg!(target_os = "macos") {
        dirs::home_dir().map(|d| d.join("Library").join("Logs").join("Unity").join("Editor.log"))
    } else {
        dirs::config_dir().map(|d| d.join("unity3d").join("Editor.log"))
    }
}

/// Project name for a log written inside a Unity project folder.
///
/// Only `Editor.log` and `Editor_*.log` files count, and only when their
/// directory holds `Assets/` or `ProjectSettings/`.
pub fn project_name_from_log_path(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    if !file_name.contains("Editor.log") && !file_name.starts_with("Editor_") {
        return None;
    }
    let parent = path.parent()?;
    if !parent.join("Assets").is_dir() && !parent.join("ProjectSettings").is_dir() {
        return None;
    }
    parent.file_name()?.to_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_paths_win() {
        let mut config = EngineConfig::default();
        config.live.log_path = Some("/tmp/custom/Editor.log".to_string());
        config.live.checkpoint_dir = Some("/tmp/custom/cp".to_string());
        assert_eq!(config.resolved_log_path(), Some(PathBuf::from("/tmp/custom/Editor.log")));
        assert_eq!(config.resolved_checkpoint_dir(), Some(PathBuf::from("/tmp/custom/cp")));
    }

    #[test]
    fn test_default_log_path_is_editor_log() {
        if let Some(path) = default_editor_log_path() {
            assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("Editor.log"));
        }
    }

    #[test]
    fn test_project_name_from_project_folder() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("SpaceGame");
        std::fs::create_dir_all(project.join("ProjectSettings")).unwrap();
        assert_eq!(
            project_name_from_log_path(&project.join("Editor.log")),
            Some("SpaceGame".to_string())
        );
        assert_eq!(
            project_name_from_log_path(&project.join("Editor_2024.log")),
            Some("SpaceGame".to_string())
        );
        assert_eq!(project_name_from_log_path(&project.join("Player.log")), None);
        assert_eq!(project_name_from_log_path(&dir.path().join("Editor.log")), None);
    }
}
