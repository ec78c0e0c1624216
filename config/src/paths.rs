use directories::BaseDirs;
use std::path::PathBuf;
use std::sync::OnceLock;

static DATA_DIR_OVERRIDE: OnceLock<PathBuf> = OnceLock::new();

const APP_DIR: &str = "clofii";

pub struct PathManager;

impl PathManager {
    /// Set a custom data directory (tests and portable installs)
    pub fn set_data_dir(path: PathBuf) {
        let _ = DATA_DIR_OVERRIDE.set(path);
    }

    pub fn data_dir() -> Option<PathBuf> {
        if let Some(d) = DATA_DIR_OVERRIDE.get() {
            return Some(d.clone());
        }
        BaseDirs::new().map(|d| d.data_dir().join(APP_DIR))
    }

    pub fn config_dir() -> Option<PathBuf> {
        if let Some(d) = DATA_DIR_OVERRIDE.get() {
            return Some(d.join("config"));
        }
        BaseDirs::new().map(|d| d.config_dir().join(APP_DIR))
    }

    pub fn logs_dir() -> Option<PathBuf> {
        #[cfg(target_os = "macos")]
        {
            if DATA_DIR_OVERRIDE.get().is_none() {
                if let Some(dirs) = directories::UserDirs::new() {
                    return Some(dirs.home_dir().join("Library/Logs/Clofii"));
                }
            }
        }
        Self::data_dir().map(|d| d.join("logs"))
    }

    pub fn log_file_path() -> Option<PathBuf> {
        Self::logs_dir().map(|d| d.join("clofii.log"))
    }

    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|d| d.join("settings.toml"))
    }
}
