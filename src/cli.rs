//! Command-line interface (C12).
//!
//! Controls the configuration file path, a `--loopback` override, bind
//! address/port overrides, log verbosity, and the log file destination.
//! Mirrors the derive-API style and help styling used throughout this
//! codebase's CLI surface.

use clap::builder::styling::{AnsiColor, Styles};
use clap::Parser;
use std::path::PathBuf;

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Yellow.on_default())
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Pump gateway - a multiplexing TCP-to-serial bridge for infusion pumps.
///
/// Accepts `start`/`pump`/`close` commands from TCP clients and forwards
/// validated, framed commands to serially-attached pump devices (or a
/// built-in loopback simulator when no hardware is present).
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None, styles = styles())]
pub struct Args {
    /// Path to the gateway's JSON configuration file
    #[arg(short = 'c', long, default_value = "config.json")]
    pub config: PathBuf,

    /// Force loopback mode regardless of the config file's `loopback` flag
    ///
    /// Useful for exercising the gateway without any serially-attached
    /// hardware; every `start` creates a simulated pump instead.
    #[arg(long)]
    pub loopback: bool,

    /// Override the bind address from the config file
    #[arg(long)]
    pub bind_ip: Option<String>,

    /// Override the bind port from the config file
    #[arg(long)]
    pub bind_port: Option<u16>,

    /// Increase diagnostic log verbosity on stderr/file.
    ///
    ///  -v: debug
    ///  -vv and more: trace
    /// By default, only INFO and above are shown.
    #[arg(short, long, action = clap::ArgAction::Count, help_heading = "Output and Logging")]
    pub verbose: u8,

    /// Log file destination, or "stderr" to log to stderr instead of a file
    #[arg(long, help_heading = "Output and Logging")]
    pub log_file: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let args = Args::parse_from(["pump-gateway"]);
        assert_eq!(args.config, PathBuf::from("config.json"));
        assert!(!args.loopback);
        assert_eq!(args.bind_ip, None);
        assert_eq!(args.bind_port, None);
        assert_eq!(args.verbose, 0);
        assert_eq!(args.log_file, None);
    }

    #[test]
    fn repeated_verbose_flag_increases_count() {
        let args = Args::parse_from(["pump-gateway", "-vv"]);
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn accepts_loopback_override() {
        let args = Args::parse_from(["pump-gateway", "--loopback", "--config", "other.json"]);
        assert!(args.loopback);
        assert_eq!(args.config, PathBuf::from("other.json"));
    }
}
