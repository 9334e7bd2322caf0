use tracing::{metadata::LevelFilter, *};
use tracing_log::LogTracer;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer};

use crate::cli;

// Start logger, should be done inside main
pub fn init() {
    // Redirect all logs from libs using "Log"
    LogTracer::init_with_filter(tracing::log::LevelFilter::Trace).expect("Failed to set logger");

    // Configure the console log
    let console_env_filter = match EnvFilter::try_from_default_env() {
        Ok(env_filter) => filter_unwanted_crates(env_filter),
        Err(_) => console_filter(cli::manager::is_verbose()),
    };

    let console_layer = fmt::Layer::new()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(fmt::format::FmtSpan::NONE)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_filter(console_env_filter);

    // Configure the file log
    let dir = cli::manager::log_path();
    let file_appender = tracing_appender::rolling::hourly(dir, "device-activity-tracker.log");
    let file_layer = fmt::Layer::new()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(fmt::format::FmtSpan::NONE)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_filter(file_filter(cli::manager::is_tracing()));

    // Configure the default subscriber
    let subscriber = tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer);
    tracing::subscriber::set_global_default(subscriber).expect("Unable to set a global subscriber");

    info!(
        "{}, version: {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
    );
    info!(
        "Starting at {}",
        chrono::Local::now().format("%Y-%m-%dT%H:%M:%S"),
    );
    debug!("Command line call: {}", cli::manager::command_line_string());
    debug!(
        "Command line input struct call: {}",
        cli::manager::command_line()
    );
}

fn console_filter(verbose: bool) -> EnvFilter {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    filter_unwanted_crates(EnvFilter::new(level.to_string()))
}

fn file_filter(tracing: bool) -> EnvFilter {
    let level = if tracing {
        LevelFilter::TRACE
    } else {
        LevelFilter::DEBUG
    };
    filter_unwanted_crates(EnvFilter::new(level.to_string()))
}

fn filter_unwanted_crates(env_filter: EnvFilter) -> EnvFilter {
    env_filter
        // Runtime internals are pretty verbose when they are on
        .add_directive("tokio=off".parse().unwrap())
        .add_directive("runtime=off".parse().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_selects_the_console_level() {
        assert_eq!(console_filter(false).max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(console_filter(true).max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn tracing_flag_selects_the_file_level() {
        assert_eq!(file_filter(false).max_level_hint(), Some(LevelFilter::DEBUG));
        assert_eq!(file_filter(true).max_level_hint(), Some(LevelFilter::TRACE));
    }

    #[test]
    fn runtime_internals_are_silenced() {
        let filter = file_filter(true).to_string();
        assert!(filter.contains("tokio=off"), "{filter}");
        assert!(filter.contains("runtime=off"), "{filter}");
    }
}
