use directories::ProjectDirs;
use std::path::PathBuf;

const APP_NAME: &str = "catchdex";

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    /// Catch ledger under $HOME/.local/state, falling back to the platform data dir
    pub fn ledger_path() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            let state_dir = PathBuf::from(home)
                .join(".local")
                .join("state")
                .join(APP_NAME);
            Some(state_dir.join("catches.db"))
        } else {
            ProjectDirs::from("", "", APP_NAME)
                .map(|proj_dirs| proj_dirs.data_local_dir().join("catches.db"))
        }
    }

    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", APP_NAME).map(|pd| pd.config_dir().join("config.json"))
    }
}
