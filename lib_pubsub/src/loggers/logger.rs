use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Parses a textual level, defaulting to `Info` for anything unknown.
pub fn parse_level(log_level: &str) -> log::LevelFilter {
    match log_level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        "off" => log::LevelFilter::Off,
        _ => log::LevelFilter::Info,
    }
}

/// Installs the global logger: stdout plus a fresh timestamped file in `log_dir`.
///
/// Older files of the same application are removed, keeping only the most
/// recent one next to the new file. Returns the path of the new log file.
pub fn setup_logging(app_name: &str, log_dir: &Path, log_level: &str) -> Result<PathBuf> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)?;
    }

    // Clean up old log files, keeping only the most recent one
    cleanup_old_logs(app_name, log_dir)?;

    let log_file_name = format!("{}_{}.log", app_name, chrono::Local::now().format("%Y-%m-%d_%H-%M-%S"));
    let log_path = log_dir.join(log_file_name);

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

    Ok(log_path)
}

/// Deletes all but the newest `<app_name>_*.log` file in `log_dir`.
pub fn cleanup_old_logs(app_name: &str, log_dir: &Path) -> Result<()> {
    let prefix = format!("{}_", app_name);
    let mut entries: Vec<_> = fs::read_dir(log_dir)?
        .filter_map(|res| res.ok())
        .filter(|e| e.path().extension().map_or(false, |ext| ext == "log"))
        .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
        .collect();

    // Newest first; the timestamp in the name sorts the same way as creation time.
    entries.sort_by_key(|e| std::cmp::Reverse(e.file_name()));

    for entry in entries.iter().skip(1) {
        if let Err(e) = fs::remove_file(entry.path()) {
            eprintln!("Failed to delete old log file {:?}: {}", entry.path(), e);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_levels_fall_back_to_info() {
        assert_eq!(parse_level("DEBUG"), log::LevelFilter::Debug);
        assert_eq!(parse_level("fatal"), log::LevelFilter::Info);
    }

    #[test]
    fn cleanup_keeps_the_newest_file_of_the_app() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "pubsub_2024-01-01_00-00-00.log",
            "pubsub_2024-01-02_00-00-00.log",
            "pubsub_2024-01-03_00-00-00.log",
            "other_2024-01-01_00-00-00.log",
            "notes.txt",
        ] {
            fs::write(dir.path().join(name), "x").unwrap();
        }

        cleanup_old_logs("pubsub", dir.path()).unwrap();

        let mut left: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(
            left,
            vec![
                "notes.txt".to_string(),
                "other_2024-01-01_00-00-00.log".to_string(),
                "pubsub_2024-01-03_00-00-00.log".to_string(),
            ]
        );
    }
}
