//! # Logging Setup
//!
//! Routes the `log` facade to stdout and a timestamped file through `fern`.
//! Every line reads `[YYYY-mm-dd HH:MM:SS][target][LEVEL] message`.
//!
//! At startup the log directory is created if needed and older log files of
//! the same application are deleted, keeping only the newest one.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;

/// Errors raised while installing the logger.
#[derive(Debug, Error)]
pub enum LoggerError {
    /// Creating the directory or the log file failed.
    #[error("log file error: {0}")]
    Io(#[from] std::io::Error),
    /// The application name produced an invalid glob pattern.
    #[error("invalid log file pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    /// A global logger is already installed.
    #[error("logger already initialised: {0}")]
    AlreadySet(#[from] log::SetLoggerError),
}

/// Maps a level name to a filter. Unknown names fall back to `info`.
pub fn parse_level(level: &str) -> log::LevelFilter {
    match level.trim().to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "warn" | "warning" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        "off" => log::LevelFilter::Off,
        _ => log::LevelFilter::Info,
    }
}

/// `<log_dir>/<app_name>_<local timestamp>.log`
pub fn log_file_path(log_dir: &Path, app_name: &str) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
    log_dir.join(format!("{}_{}.log", app_name, stamp))
}

/// Installs the global logger and returns the path of the new log file.
pub fn setup_logging(app_name: &str, log_dir: &Path, log_level: &str) -> Result<PathBuf, LoggerError> {
    fs::create_dir_all(log_dir)?;
    cleanup_old_logs(log_dir, app_name, 1)?;

    let log_path = log_file_path(log_dir, app_name);

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d %H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(parse_level(log_level))
        .chain(std::io::stdout())
        .chain(fern::log_file(&log_path)?)
        .apply()?;

    log::info!("Logging to {}", log_path.display());
    Ok(log_path)
}

/// Deletes `<app_name>_*.log` files in `log_dir` except the `keep` newest.
/// Returns how many files were removed.
pub fn cleanup_old_logs(log_dir: &Path, app_name: &str, keep: usize) -> Result<usize, LoggerError> {
    let pattern = log_dir.join(format!("{}_*.log", glob::Pattern::escape(app_name)));
    let mut entries: Vec<(PathBuf, SystemTime)> = glob::glob(&pattern.to_string_lossy())?
        .filter_map(Result::ok)
        .filter_map(|path| {
            let modified = fs::metadata(&path).and_then(|m| m.modified()).ok()?;
            Some((path, modified))
        })
        .collect();

    entries.sort_by_key(|(_, modified)| std::cmp::Reverse(*modified));

    let mut removed = 0;
    for (path, _) in entries.iter().skip(keep) {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => eprintln!("Failed to delete old log file {:?}: {}", path, e),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn touch(dir: &Path, name: &str, age_secs: u64) {
        let path = dir.join(name);
        fs::write(&path, b"line\n").unwrap();
        let file = fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age_secs)).unwrap();
    }

    #[test]
    fn only_the_newest_log_of_the_app_survives() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "dashboard_feed_2024-01-01_00-00-00.log", 300);
        touch(dir.path(), "dashboard_feed_2024-01-02_00-00-00.log", 200);
        touch(dir.path(), "dashboard_feed_2024-01-03_00-00-00.log", 100);
        touch(dir.path(), "other_app_2024-01-01_00-00-00.log", 900);
        touch(dir.path(), "dashboard_feed_notes.txt", 900);

        let removed = cleanup_old_logs(dir.path(), "dashboard_feed", 1).unwrap();
        assert_eq!(removed, 2);

        let mut left: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        left.sort();
        assert_eq!(
            left,
            vec![
                "dashboard_feed_2024-01-03_00-00-00.log",
                "dashboard_feed_notes.txt",
                "other_app_2024-01-01_00-00-00.log",
            ]
        );
    }

    #[test]
    fn cleanup_of_an_empty_directory_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(cleanup_old_logs(dir.path(), "dashboard_feed", 1).unwrap(), 0);
    }

    #[test]
    fn level_names_are_case_insensitive_with_info_fallback() {
        assert_eq!(parse_level("DEBUG"), log::LevelFilter::Debug);
        assert_eq!(parse_level(" warn "), log::LevelFilter::Warn);
        assert_eq!(parse_level("verbose"), log::LevelFilter::Info);
    }

    #[test]
    fn log_file_is_named_after_the_app() {
        let path = log_file_path(Path::new("/var/log/dash"), "dashboard_feed");
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("dashboard_feed_"));
        assert!(name.ends_with(".log"));
        assert_eq!(path.parent().unwrap(), Path::new("/var/log/dash"));
    }
}
