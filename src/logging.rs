use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicU8, Ordering},
        mpsc::{self, Sender},
        OnceLock,
    },
    thread,
};

use chrono;

use crate::utility::app_data_dir;

/* =========================
   GLOBAL STATE
   ========================= */

static DEBUG: AtomicBool = AtomicBool::new(false);
static MIN_LEVEL: AtomicU8 = AtomicU8::new(Level::Warn as u8);
static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();
static LOG_TX: OnceLock<Sender<String>> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl Level {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "debug" | "trace" | "verbose" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

/* =========================
   PUBLIC API
   ========================= */

/// Starts the file writer thread. Lines logged before this call are dropped.
/// Returns false if the logger was already running or the file can't be opened.
pub fn init(debug: bool, level: &str, path: Option<PathBuf>) -> bool {
    if LOG_TX.get().is_some() {
        return false;
    }

    set_debug(debug);
    set_level(level);

    let path = path.unwrap_or_else(|| default_log_path().clone());
    let mut file = match open_log_file(&path) {
        Ok(file) => file,
        Err(_) => return false,
    };
    let _ = LOG_PATH.set(path);

    let (tx, rx) = mpsc::channel::<String>();
    if LOG_TX.set(tx).is_err() {
        return false;
    }

    thread::Builder::new()
        .name("badge-log".to_string())
        .spawn(move || {
            while let Ok(line) = rx.recv() {
                let _ = writeln!(file, "{line}");
                let _ = file.flush();
            }
        })
        .is_ok()
}

pub fn set_debug(debug: bool) {
    DEBUG.store(debug, Ordering::Relaxed);
}

pub fn set_level(level: &str) {
    let level = Level::parse(level).unwrap_or(Level::Warn);
    MIN_LEVEL.store(level as u8, Ordering::Relaxed);
}

#[inline]
pub fn should_log(level: Level) -> bool {
    if DEBUG.load(Ordering::Relaxed) {
        return true;
    }
    level as u8 >= MIN_LEVEL.load(Ordering::Relaxed)
}

pub fn log_path() -> Option<&'static PathBuf> {
    LOG_PATH.get()
}

/* =========================
   INTERNAL
   ========================= */

#[inline]
pub fn enqueue(level: Level, msg: String) {
    if let Some(tx) = LOG_TX.get() {
        let ts = timestamp();
        let _ = tx.send(format!("{ts} [{}] {msg}", level.as_str()));
    }
}

fn timestamp() -> String {
    let now = chrono::Local::now();
    now.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/* =========================
   MACROS
   ========================= */

#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {{
        if $crate::logging::should_log($crate::logging::Level::Debug) {
            $crate::logging::enqueue(
                $crate::logging::Level::Debug,
                format!($($arg)*)
            );
        }
    }};
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {{
        if $crate::logging::should_log($crate::logging::Level::Info) {
            $crate::logging::enqueue(
                $crate::logging::Level::Info,
                format!($($arg)*)
            );
        }
    }};
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {{
        if $crate::logging::should_log($crate::logging::Level::Warn) {
            $crate::logging::enqueue(
                $crate::logging::Level::Warn,
                format!($($arg)*)
            );
        }
    }};
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {{
        $crate::logging::enqueue(
            $crate::logging::Level::Error,
            format!($($arg)*)
        );
    }};
}

/* =========================
   PATH
   ========================= */

/// Opens `path` for appending, creating missing parent directories first.
fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn default_log_path() -> &'static PathBuf {
    static DEFAULT: OnceLock<PathBuf> = OnceLock::new();
    DEFAULT.get_or_init(|| {
        app_data_dir()
            .map(|p| p.join("solution-badges.log"))
            .unwrap_or_else(|| PathBuf::from("solution-badges.log"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parse_accepts_aliases() {
        assert_eq!(Level::parse("WARNING"), Some(Level::Warn));
        assert_eq!(Level::parse(" trace "), Some(Level::Debug));
        assert_eq!(Level::parse("info"), Some(Level::Info));
        assert_eq!(Level::parse("loud"), None);
    }

    #[test]
    fn test_open_log_file_creates_missing_dirs() {
        let root = std::env::temp_dir().join(format!("badge-log-{}", std::process::id()));
        let path = root.join("nested").join("app").join("solution-badges.log");
        let _ = fs::remove_dir_all(&root);

        let mut file = open_log_file(&path).unwrap();
        writeln!(file, "hello").unwrap();
        drop(file);

        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_open_log_file_appends() {
        let root = std::env::temp_dir().join(format!("badge-log-append-{}", std::process::id()));
        let path = root.join("solution-badges.log");
        let _ = fs::remove_dir_all(&root);

        writeln!(open_log_file(&path).unwrap(), "one").unwrap();
        writeln!(open_log_file(&path).unwrap(), "two").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\n");
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_levels_are_ordered() {
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
    }
}
