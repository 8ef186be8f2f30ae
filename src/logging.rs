// In: src/logging.rs

//! Process-wide logger setup for binaries and tests embedding the crate.
//!
//! Library code only uses the `log` macros; nothing is printed until a host calls
//! `init_logging`.

use std::fs::OpenOptions;

use log::LevelFilter;

use crate::config::LogConfig;
use crate::error::Result;

/// Installs an `env_logger` backend configured from `config`.
///
/// Lines are formatted as `[LEVEL] message`. When `config.file` is set the file is
/// opened in append mode (and created if missing). Returns `Ok(false)` if a global
/// logger was already installed, in which case nothing changes.
pub fn init_logging(config: &LogConfig) -> Result<bool> {
    let level: LevelFilter = config.level_filter()?;

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);

    // Custom formatter: just print the level and message
    builder.format(|buf, record| {
        use std::io::Write;
        writeln!(buf, "[{}] {}", record.level(), record.args())?;
        buf.flush()?;
        Ok(())
    });

    if let Some(path) = &config.file {
        let file = OpenOptions::new().append(true).create(true).open(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    Ok(builder.try_init().is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TimelineError;

    #[test]
    fn test_bad_level_is_rejected_before_install() {
        let config = LogConfig {
            level: "chatty".to_string(),
            file: None,
        };
        assert!(matches!(
            init_logging(&config),
            Err(TimelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_file_target_and_idempotence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timeline.log");
        let config = LogConfig {
            level: "info".to_string(),
            file: Some(path.clone()),
        };

        let first = init_logging(&config).unwrap();
        // A second call never replaces the installed logger.
        assert!(!init_logging(&config).unwrap());
        // The log file is created even if another test installed the logger first.
        assert!(path.exists());

        if first {
            log::info!("hello from the timeline");
            log::logger().flush();
            let contents = std::fs::read_to_string(&path).unwrap();
            assert!(contents.contains("[INFO] hello from the timeline"));
        }
    }
}
