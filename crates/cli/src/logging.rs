use color_eyre::eyre::{Result, WrapErr};
use std::fs::File;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*};

/// Maps `-v` occurrences and `--quiet` to a level filter.
pub fn level_filter(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::OFF;
    }
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Installs the global subscriber: compact stderr output, plus a plain-text
/// file layer when `log_file` is given.
pub fn setup_logging(verbosity: u8, quiet: bool, log_file: Option<&Path>) -> Result<()> {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .compact();

    let subscriber = tracing_subscriber::registry()
        .with(level_filter(verbosity, quiet))
        .with(stderr_layer);

    match log_file {
        Some(path) => {
            let file = File::create(path)
                .wrap_err_with(|| format!("Failed to create log file {}", path.display()))?;
            let file_layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_thread_ids(true)
                .with_target(true);
            subscriber.with(file_layer).try_init()?;
        }
        None => subscriber.try_init()?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter_follows_flags() {
        assert_eq!(level_filter(0, false), LevelFilter::WARN);
        assert_eq!(level_filter(1, false), LevelFilter::INFO);
        assert_eq!(level_filter(2, false), LevelFilter::DEBUG);
        assert_eq!(level_filter(7, false), LevelFilter::TRACE);
        assert_eq!(level_filter(3, true), LevelFilter::OFF);
    }

    #[test]
    fn test_file_layer_writes_plain_text() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("mdk.log");
        let file = File::create(&path).expect("Failed to create log file");
        let subscriber = tracing_subscriber::registry().with(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false),
        );

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(stage = "minimize", "Message for the file");
        });

        let content = std::fs::read_to_string(&path).expect("Failed to read log file");
        assert!(content.contains("Message for the file"));
        assert!(content.contains("WARN"));
        assert!(content.contains("stage=\"minimize\""));
    }
}
