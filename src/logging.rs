//! Tracing subscriber setup
//!
//! File output is always on (rolling per `rotation`). Text mode mirrors to
//! stdout; JSON mode writes structured records to the file only.

use crate::config::AppConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn file_appender(config: &AppConfig) -> RollingFileAppender {
    let (dir, file) = (&config.log_dir, &config.log_file);
    match config.rotation.as_str() {
        "hourly" => tracing_appender::rolling::hourly(dir, file),
        "daily" => tracing_appender::rolling::daily(dir, file),
        _ => tracing_appender::rolling::never(dir, file),
    }
}

/// Default filter when `RUST_LOG` is unset; sqlx statement logs are noisy
/// below warn
fn default_directives(config: &AppConfig) -> String {
    format!("{},sqlx=warn", config.log_level)
}

/// Install the global subscriber; keep the guard alive to flush file output
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let (writer, guard) = tracing_appender::non_blocking(file_appender(config));

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(config)));
    let registry = tracing_subscriber::registry().with(filter);

    if config.use_json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(writer)
                    .with_ansi(false),
            )
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(writer).with_ansi(false))
            .with(fmt::layer().with_target(false).with_ansi(true))
            .init();
    }

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_parse() {
        let config = AppConfig::from_yaml(
            "log_level: debug\nlog_dir: ./logs\nlog_file: t.log\nuse_json: true\nrotation: never\n",
        )
        .unwrap();
        let directives = default_directives(&config);
        assert_eq!(directives, "debug,sqlx=warn");
        assert!(EnvFilter::try_new(directives).is_ok());
    }
}
