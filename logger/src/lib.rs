use std::fs::File;

use colored::{Color, Colorize};
use middleware::logger::LoggerMiddleware;

pub mod middleware {
    pub mod logger;
}

pub const LOG_FILE: &str = "img2table.log";

/// Chatty dependencies and the most they may log.
const QUIET_TARGETS: &[(&str, log::LevelFilter)] = &[
    ("hyper", log::LevelFilter::Off),
    ("h2", log::LevelFilter::Off),
    ("rustls", log::LevelFilter::Warn),
    ("sqlx", log::LevelFilter::Warn),
    ("reqwest", log::LevelFilter::Info),
    ("actix_server", log::LevelFilter::Info),
];

/// Verbose in development, info and above in production.
pub fn default_level(production: bool) -> log::LevelFilter {
    if production {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Debug
    }
}

fn level_color(level: log::Level) -> Color {
    match level {
        log::Level::Error => Color::Red,
        log::Level::Warn => Color::Yellow,
        log::Level::Info => Color::Green,
        log::Level::Debug => Color::Magenta,
        log::Level::Trace => Color::BrightBlack,
    }
}

/// Logs to stdout and to a fresh `img2table.log` in the working directory.
pub fn setup(level: log::LevelFilter) -> Result<(), fern::InitError> {
    File::create(LOG_FILE).map_err(fern::InitError::Io)?;

    let dispatch = QUIET_TARGETS.iter().fold(
        fern::Dispatch::new()
            .format(|out, message, record| {
                out.finish(format_args!(
                    "{}[{}][{}] {}",
                    chrono::Local::now().format("[%H:%M:%S]"),
                    record.target(),
                    record
                        .level()
                        .to_string()
                        .color(level_color(record.level())),
                    message
                ))
            })
            .level(level),
        |dispatch, (target, filter)| dispatch.level_for(*target, (*filter).min(level)),
    );

    dispatch
        .chain(std::io::stdout())
        .chain(fern::log_file(LOG_FILE)?)
        .apply()?;
    Ok(())
}

pub fn middleware() -> LoggerMiddleware {
    LoggerMiddleware::new()
}
