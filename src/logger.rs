//! Programmatic `log4rs` setup.
//!
//! Operation logs go to `app.log`; audit lines (target `docflow::audit`) go to
//! their own `audit.log`. Without a directory everything goes to stderr.

use crate::errors::OpError;
use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::Path;

pub const AUDIT_TARGET: &str = "docflow::audit";

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
const ROLL_SIZE: u64 = 10 * 1024 * 1024;
const DEFAULT_RETENTION: u32 = 7;

/// Parse a level name; unknown names fall back to `info`.
#[must_use]
pub fn parse_level(level: Option<&str>) -> LevelFilter {
    match level.unwrap_or("info").to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

fn rolling(dir: &Path, stem: &str, keep: u32) -> Result<RollingFileAppender, OpError> {
    let roller = FixedWindowRoller::builder()
        .build(&format!("{}", dir.join(format!("{stem}.{{}}.log")).display()), keep)
        .map_err(|e| OpError::Config(format!("log roller: {e}")))?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE)), Box::new(roller));
    Ok(RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(dir.join(format!("{stem}.log")), Box::new(policy))?)
}

/// Build the logging configuration without installing it.
///
/// # Errors
/// Returns `OpError::Io` if the directory cannot be created, `OpError::Config`
/// if an appender cannot be built.
pub fn build_config(
    dir: Option<&Path>,
    level: Option<&str>,
    retention: Option<usize>,
) -> Result<Config, OpError> {
    let lvl = parse_level(level);
    let builder = if let Some(dir) = dir {
        std::fs::create_dir_all(dir)?;
        let keep = retention.map_or(DEFAULT_RETENTION, |r| u32::try_from(r).unwrap_or(u32::MAX));
        Config::builder()
            .appender(Appender::builder().build("app", Box::new(rolling(dir, "app", keep)?)))
            .appender(Appender::builder().build("audit", Box::new(rolling(dir, "audit", keep)?)))
            .logger(Logger::builder().appender("audit").additive(false).build(AUDIT_TARGET, lvl))
    } else {
        let console = ConsoleAppender::builder()
            .target(Target::Stderr)
            .encoder(Box::new(PatternEncoder::new(PATTERN)))
            .build();
        Config::builder().appender(Appender::builder().build("app", Box::new(console)))
    };
    builder
        .build(Root::builder().appender("app").build(lvl))
        .map_err(|e| OpError::Config(format!("logger: {e}")))
}

/// Install the global logger.
/// - dir: rolling log files are written here; stderr when `None`
/// - level: off|error|warn|info|debug|trace
/// - retention: number of rolled files to keep (default 7)
///
/// # Errors
/// Fails if the configuration cannot be built or a logger is already installed.
pub fn configure_logging(
    dir: Option<&Path>,
    level: Option<&str>,
    retention: Option<usize>,
) -> Result<(), OpError> {
    let config = build_config(dir, level, retention)?;
    log4rs::init_config(config).map_err(|e| OpError::Config(format!("logger: {e}")))?;
    Ok(())
}

/// Configure logging from environment variables if present:
/// - DOCFLOW_LOG_DIR
/// - DOCFLOW_LOG_LEVEL
/// - DOCFLOW_LOG_RETENTION
///
/// # Errors
/// See [`configure_logging`].
pub fn configure_from_env() -> Result<(), OpError> {
    let dir = std::env::var("DOCFLOW_LOG_DIR").ok().map(std::path::PathBuf::from);
    let level = std::env::var("DOCFLOW_LOG_LEVEL").ok();
    let retention =
        std::env::var("DOCFLOW_LOG_RETENTION").ok().and_then(|s| s.parse::<usize>().ok());
    configure_logging(dir.as_deref(), level.as_deref(), retention)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names() {
        assert_eq!(parse_level(Some("DEBUG")), LevelFilter::Debug);
        assert_eq!(parse_level(Some("bogus")), LevelFilter::Info);
        assert_eq!(parse_level(None), LevelFilter::Info);
    }

    #[test]
    fn file_config_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("logs");
        let cfg = build_config(Some(&dir), Some("warn"), Some(3)).unwrap();
        assert!(dir.is_dir());
        assert_eq!(cfg.root().level(), LevelFilter::Warn);
        assert!(cfg.loggers().iter().any(|l| l.name() == AUDIT_TARGET));
    }
}
