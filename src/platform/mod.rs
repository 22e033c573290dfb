// markshelf platform abstraction
// Provides platform-specific config and data paths for Windows, macOS, and Linux.
//
// Uses `cfg(target_os)` for conditional compilation to select the correct
// platform-specific implementation at compile time.

use std::env;
use std::path::PathBuf;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "windows")]
mod windows;

/// Environment variable that replaces the platform data directory.
pub const DATA_DIR_ENV: &str = "MARKSHELF_DATA_DIR";

/// Environment variable that points at an explicit settings file.
pub const CONFIG_PATH_ENV: &str = "MARKSHELF_CONFIG";

/// Returns the platform-specific configuration directory for markshelf.
///
/// - **Linux**: `~/.config/markshelf` (or `$XDG_CONFIG_HOME/markshelf`)
/// - **macOS**: `~/Library/Application Support/Markshelf`
/// - **Windows**: `%APPDATA%/Markshelf`
pub fn get_config_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        linux::get_config_dir()
    }
    #[cfg(target_os = "macos")]
    {
        macos::get_config_dir()
    }
    #[cfg(target_os = "windows")]
    {
        windows::get_config_dir()
    }
}

/// Returns the data directory holding the embedded bookmark database.
///
/// `$MARKSHELF_DATA_DIR` wins when set and non-empty; otherwise:
/// - **Linux**: `~/.local/share/markshelf` (or `$XDG_DATA_HOME/markshelf`)
/// - **macOS**: `~/Library/Application Support/Markshelf`
/// - **Windows**: `%APPDATA%/Markshelf`
pub fn get_data_dir() -> PathBuf {
    data_dir_from(env::var(DATA_DIR_ENV).ok().as_deref())
}

/// Resolves the data directory given the value of the override variable.
pub fn data_dir_from(override_dir: Option<&str>) -> PathBuf {
    match override_dir {
        Some(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => platform_data_dir(),
    }
}

fn platform_data_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        linux::get_data_dir()
    }
    #[cfg(target_os = "macos")]
    {
        macos::get_data_dir()
    }
    #[cfg(target_os = "windows")]
    {
        windows::get_data_dir()
    }
}
