use std::{
    env,
    path::{Path, PathBuf},
};

#[cfg(windows)]
pub fn to_wstring(s: &str) -> Vec<u16> {
    use std::{ffi::OsStr, os::windows::ffi::OsStrExt};

    OsStr::new(s)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

pub fn user_home_dir() -> Option<PathBuf> {
    env::var("USERPROFILE")
        .or_else(|_| env::var("HOME"))
        .map(PathBuf::from)
        .ok()
}

/// Directory the executable lives in, skipping a trailing `bin/`.
pub fn app_root_dir() -> Option<PathBuf> {
    let exe_path = env::current_exe().ok()?;
    let exe_dir = exe_path.parent()?;

    if exe_dir.file_name().and_then(|n| n.to_str()) == Some("bin") {
        return exe_dir.parent().map(Path::to_path_buf);
    }

    Some(exe_dir.to_path_buf())
}

/// `%LOCALAPPDATA%\SolutionBadges`, falling back to `~/.solution-badges`.
pub fn app_data_dir() -> Option<PathBuf> {
    if let Ok(local) = env::var("LOCALAPPDATA") {
        return Some(PathBuf::from(local).join("SolutionBadges"));
    }

    user_home_dir().map(|p| p.join(".solution-badges"))
}

pub fn config_path() -> PathBuf {
    if let Some(root) = app_root_dir() {
        let candidate = root.join("config.yaml");
        if candidate.exists() {
            return candidate;
        }
    }

    if let Some(data) = app_data_dir() {
        return data.join("config.yaml");
    }

    PathBuf::from("config.yaml")
}
