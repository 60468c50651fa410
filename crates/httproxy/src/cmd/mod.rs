use std::str::FromStr;

use clap::Parser;

/// `<program> <port>`, a forwarding HTTP/HTTPS proxy with no further
/// configuration surface.
#[derive(Debug, Parser)]
#[command(name = "httproxy", version, about = "A forwarding HTTP/HTTPS proxy")]
pub struct Args {
    /// TCP port to listen on (IPv4 wildcard, SO_REUSEADDR)
    pub port: u16,

    /// log level: off, error, warn, info, debug, trace
    #[arg(short = 'v', long = "log-level", default_value = "info")]
    pub log_level: LogLevel,

    /// log with ANSI color on stdout
    #[arg(long, default_value_t = false)]
    pub colored: bool,
}

impl Args {
    /// Parses argv, printing a usage message to stderr and exiting with
    /// status 1 on any parse failure (wrong arity, non-numeric port).
    pub fn parse_or_exit() -> Self {
        match Self::try_parse() {
            Ok(args) => args,
            Err(err) if err.use_stderr() => {
                eprintln!("{err}");
                std::process::exit(1);
            }
            Err(err) => err.exit(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogLevel(pub String);

impl FromStr for LogLevel {
    type Err = core::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let level = match s.trim().to_ascii_lowercase().as_str() {
            "off" => "off",
            "err" | "error" => "error",
            "warn" | "warning" => "warn",
            "info" => "info",
            "debug" => "debug",
            "trace" => "trace",
            _ => "info",
        };
        Ok(Self(level.to_string()))
    }
}
