use std::str::FromStr;

use anyhow::Result;
use fern::colors::{Color, ColoredLevelConfig};

/// Fixed, relative, append-only log file path. No rotation.
const LOG_FILE: &str = "proxy_server_log.txt";

/// Every record carries `[timestamp] [PID:pid] [TID:thread-id]` ahead of
/// the message, produced once here rather than at each call site.
fn prefix() -> String {
    format!(
        "[{}] [PID:{}] [TID:{}]",
        chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"),
        std::process::id(),
        thread_id(),
    )
}

/// `std::thread::ThreadId` has no public integer accessor; its `Debug`
/// form is `ThreadId(N)`, so the digits are lifted back out of that.
fn thread_id() -> String {
    let debug = format!("{:?}", std::thread::current().id());
    debug
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect::<String>()
}

pub fn init(log_level: &str, colored: bool) -> Result<()> {
    let colors = ColoredLevelConfig::new()
        .trace(Color::Magenta)
        .debug(Color::Blue)
        .info(Color::Green)
        .warn(Color::Yellow)
        .error(Color::Red);

    let level = log::LevelFilter::from_str(log_level)?;

    let stdout = fern::Dispatch::new()
        .format(move |out, message, record| {
            let level = if colored {
                colors.color(record.level()).to_string()
            } else {
                record.level().to_string()
            };
            out.finish(format_args!("{} {level} {message}", prefix()))
        })
        .level(level)
        .chain(std::io::stdout());

    // File records carry no level token, just the bracketed prefix
    // ahead of the message.
    let file = fern::Dispatch::new()
        .format(move |out, message, _record| out.finish(format_args!("{} {message}", prefix())))
        .level(level)
        .chain(fern::log_file(LOG_FILE)?);

    fern::Dispatch::new().chain(stdout).chain(file).apply()?;
    Ok(())
}
