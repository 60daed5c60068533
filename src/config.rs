use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::process::Command;

use crate::models::enums::ResultDisplayType;

const EDITOR_CONTENT_FILE: &str = "editor_content.sql";
const PREFERENCES_FILE: &str = "preferences.json";
const SSMS_PATH_FILE: &str = "ssms_path.txt";

/// Every SSMS version installs somewhere else, so this is only a starting
/// point; the real path lives in `ssms_path.txt`.
const DEFAULT_SSMS_PATH: &str =
    r"C:\Program Files (x86)\Microsoft SQL Server Management Studio 18\Common7\IDE\ssms.exe";

/// Options that persist across runs. Everything else (query text, selection)
/// has its own file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppPreferences {
    pub result_display_type: ResultDisplayType,
    pub delimiter: String,
    pub connection_timeout_secs: u32,
    pub run_in_sequence: bool,
    pub deselect_on_completion: bool,
    pub ignore_empty_results: bool,
}

impl Default for AppPreferences {
    fn default() -> Self {
        Self {
            result_display_type: ResultDisplayType::Text,
            delimiter: String::new(),
            connection_timeout_secs: 30,
            run_in_sequence: false,
            deselect_on_completion: false,
            ignore_empty_results: false,
        }
    }
}

impl AppPreferences {
    /// A zero timeout means "use the default", matching the old behaviour of
    /// the timeout box.
    pub fn effective_timeout_secs(&self) -> u32 {
        if self.connection_timeout_secs == 0 {
            30
        } else {
            self.connection_timeout_secs
        }
    }

    pub fn load_from(path: &std::path::Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(prefs) => prefs,
                Err(e) => {
                    log::warn!("Ignoring unreadable preferences {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), String> {
        let content = serde_json::to_string_pretty(self).map_err(|e| e.to_string())?;
        fs::write(path, content).map_err(|e| e.to_string())
    }

    pub fn load() -> Self {
        Self::load_from(&get_data_dir().join(PREFERENCES_FILE))
    }

    pub fn save(&self) -> Result<(), String> {
        self.save_to(&ensure_data_dir().join(PREFERENCES_FILE))
    }
}

/// Data directory: `MULTISQL_DATA_DIR` when set to an absolute path,
/// otherwise `~/.multisql`.
pub fn get_data_dir() -> PathBuf {
    if let Ok(custom_dir) = std::env::var("MULTISQL_DATA_DIR") {
        let path = PathBuf::from(custom_dir);
        if path.is_absolute() {
            return path;
        }
    }

    if let Some(mut hd) = home_dir() {
        hd.push(".multisql");
        return hd;
    }
    PathBuf::from(".")
}

pub fn ensure_data_dir() -> PathBuf {
    let dir = get_data_dir();
    if let Err(e) = fs::create_dir_all(&dir) {
        log::error!("Failed to create data directory {}: {}", dir.display(), e);
    }
    dir
}

pub fn editor_content_path() -> PathBuf {
    get_data_dir().join(EDITOR_CONTENT_FILE)
}

/// The last query text, reloaded at startup.
pub fn load_editor_content() -> Option<String> {
    fs::read_to_string(editor_content_path()).ok()
}

/// Overwritten on every run so a crash never loses the query.
pub fn save_editor_content(text: &str) -> Result<(), String> {
    let path = ensure_data_dir().join(EDITOR_CONTENT_FILE);
    fs::write(&path, text).map_err(|e| format!("Cannot write {}: {}", path.display(), e))
}

/// Read the SSMS executable location, writing the default path back when the
/// file is missing so the user has something to edit.
pub fn ssms_executable_path() -> String {
    let path_file = get_data_dir().join(SSMS_PATH_FILE);
    match fs::read_to_string(&path_file) {
        Ok(content) => content.trim().to_string(),
        Err(_) => {
            log::info!(
                "Setting default SSMS path '{}' in '{}'. Edit that file if the executable lives elsewhere.",
                DEFAULT_SSMS_PATH,
                path_file.display()
            );
            let path_file = ensure_data_dir().join(SSMS_PATH_FILE);
            if let Err(e) = fs::write(&path_file, DEFAULT_SSMS_PATH) {
                log::error!(
                    "Unable to write SSMS path to '{}': {}",
                    path_file.display(),
                    e
                );
            }
            DEFAULT_SSMS_PATH.to_string()
        }
    }
}

/// Launch SSMS against a server. Failure is logged, never fatal.
pub fn open_in_ssms(server: &str) {
    let exe = ssms_executable_path();
    if let Err(e) = Command::new(&exe).arg("-S").arg(server).spawn() {
        log::error!(
            "Unable to open '{}': {}. Save the full path to ssms.exe in '{}'.",
            exe,
            e,
            get_data_dir().join(SSMS_PATH_FILE).display()
        );
    }
}
