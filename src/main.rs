//! # Pump Gateway - Main Entry Point
//!
//! Wires together configuration loading, logging, the gateway registry, and
//! the TCP front end's accept loop.
//!
//! ## Architecture Overview
//!
//! 1. **Parse arguments**: CLI flags control config path, bind overrides, logging
//! 2. **Initialize logging**: colorized console layer + rolling file layer
//! 3. **Load configuration**: parses and structurally validates `config.json`
//! 4. **Construct the gateway**: the `port -> session` registry
//! 5. **Run the TCP front end**: accept loop until the process is interrupted

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use pump_gateway::{cli::Args, gateway::Gateway, server::TcpFrontEnd, GatewayConfig};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{filter::LevelFilter, prelude::*, Layer};

/// Colorizes each console line by level and tags it with its originating
/// module when that module isn't the crate root, so a pump session's worker
/// noise is visually distinguishable from the accept loop's.
struct GatewayEventFormatter;

impl<S, N> FormatEvent<S, N> for GatewayEventFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> fmt::Result {
        let mut fields = String::new();
        ctx.format_fields(Writer::new(&mut fields), event)?;

        let target = event.metadata().target();
        let line = match target.strip_prefix("pump_gateway::") {
            Some(module) => format!("[{module}] {fields}"),
            None => fields,
        };

        let colored_line = match *event.metadata().level() {
            Level::INFO => line.white(),
            Level::WARN => line.yellow(),
            Level::ERROR => line.red(),
            Level::DEBUG => line.blue(),
            Level::TRACE => line.purple(),
        };

        writeln!(writer, "{colored_line}")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let guard;
    let detailed_log_layer;

    if let Some("stderr") = args.log_file.as_deref() {
        detailed_log_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(log_level)
            .boxed();
        guard = None;
    } else {
        let file_appender = match args.log_file.as_deref() {
            Some(path_str) => {
                let log_path = std::path::Path::new(path_str);
                let log_dir = log_path.parent().unwrap_or_else(|| std::path::Path::new("."));
                let log_filename =
                    log_path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("pump_gateway.log"));
                tracing_appender::rolling::daily(log_dir, log_filename)
            }
            None => tracing_appender::rolling::daily(".", "pump_gateway.log"),
        };
        let (non_blocking_writer, file_guard) = tracing_appender::non_blocking(file_appender);
        detailed_log_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_ansi(false)
            .with_filter(log_level)
            .boxed();
        guard = Some(file_guard);
    }

    let stdout_log = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .event_format(GatewayEventFormatter)
        .with_filter(log_level);

    tracing_subscriber::registry().with(detailed_log_layer).with(stdout_log).init();
    let _log_guard = guard;

    info!("Starting pump gateway");

    let mut config = GatewayConfig::load(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;

    if args.loopback {
        config.server_config.loopback = true;
    }
    if let Some(ip) = &args.bind_ip {
        config.server_config.ip = ip.clone();
    }
    if let Some(port) = args.bind_port {
        config.server_config.port = port;
    }

    let bind_addr = format!("{}:{}", config.server_config.ip, config.server_config.port);
    let delimiter = config.server_config.delimiter;

    let gateway = Arc::new(Gateway::new(&config));
    let front_end = Arc::new(TcpFrontEnd::new(gateway, delimiter));

    if let Err(e) = front_end.run(&bind_addr).await {
        error!("front end terminated: {e}");
        return Err(e.into());
    }

    Ok(())
}
