use std::{fs::File, sync::Mutex};

use anyhow::{anyhow, Context};
use time::{format_description::parse, OffsetDateTime};
use tracing::{subscriber::set_global_default, Level};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, FmtSubscriber};

/// Where log lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    /// A `<date>_<time>_log.txt` file in the working directory.
    File,
}

/// Installs the global tracing subscriber.
///
/// Fails if a global subscriber is already set or the log file cannot be created.
pub fn try_init_logger(target: LogTarget, max_level: Level) -> anyhow::Result<()> {
    let (writer, ansi) = match target {
        LogTarget::Stderr => (BoxMakeWriter::new(std::io::stderr), true),
        LogTarget::File => {
            let file_name = get_log_file_name()?;
            let file = File::create(&file_name)
                .with_context(|| format!("could not create log file {file_name}"))?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
    };
    // the local offset is unavailable in some multi-threaded contexts, fall back to UTC
    let local_offset = time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    let timer = tracing_subscriber::fmt::time::OffsetTime::new(
        local_offset,
        parse("[year]-[month]-[day] [hour]:[minute]:[second]").context("bad time format")?,
    );

    let subscriber = FmtSubscriber::builder()
        .with_max_level(max_level)
        .with_ansi(ansi)
        .with_timer(timer)
        .with_writer(writer)
        .finish();

    set_global_default(subscriber).map_err(|_| {
        anyhow!("a global tracing subscriber is already set, consider disabling logs")
    })
}

/// Will panic on error
pub fn init_logger(target: LogTarget, max_level: Level) {
    try_init_logger(target, max_level).expect("could not initialise logger");
}

fn get_log_file_name() -> anyhow::Result<String> {
    let format = parse("[year]-[month]-[day]_[hour]:[minute]:[second]_log.txt")
        .context("bad log file name format")?;
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(&format).context("could not format log file name")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_name_is_timestamped() {
        let name = get_log_file_name().unwrap();
        assert!(name.ends_with("_log.txt"));
        assert_eq!(name.len(), "2025-01-01_00:00:00_log.txt".len());
    }
}
