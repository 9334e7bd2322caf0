use std::sync::Arc;

use clap::Parser;

use crate::transport::simulated::SimulatedLink;

#[derive(Parser, Debug)]
#[command(
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = env!("CARGO_PKG_DESCRIPTION"),
    long_about = None
)]
struct Args {
    /// Device identifier to track, may be repeated. Overrides the targets stored in the settings
    /// file for this run only.
    #[arg(long = "target", value_name = "ID")]
    targets: Vec<String>,

    /// Sets the settings file path, relative paths are resolved inside the user configuration
    /// folder.
    #[arg(long, value_name = "PATH", default_value = "settings.json")]
    settings_file: String,

    /// Deletes settings file before starting.
    #[arg(long)]
    reset: bool,

    /// Specifies the path in which the logs will be stored.
    #[arg(long, value_name = "PATH", default_value = "./logs")]
    log_path: String,

    /// Turns all log categories up to Debug, for more information check RUST_LOG env variable.
    #[arg(short, long)]
    verbose: bool,

    /// Turns all log categories up to Trace in the log file, for more information check RUST_LOG
    /// env variable.
    #[arg(long)]
    enable_tracing_level_log_file: bool,

    /// Overrides the delay between probes, in milliseconds.
    #[arg(long, value_name = "MS", env = "PROBE_INTERVAL_MS")]
    probe_interval: Option<u64>,

    /// Overrides how long to wait for a device acknowledgement, in milliseconds.
    #[arg(long, value_name = "MS", env = "PROBE_TIMEOUT_MS")]
    probe_timeout: Option<u64>,

    /// Prints every classification update as a JSON line on stdout.
    #[arg(long)]
    json: bool,

    /// Network profile of the simulated devices.
    #[arg(long, value_enum, default_value = "wifi")]
    simulated_link: SimulatedLink,
}

#[derive(Debug)]
struct Manager {
    clap_matches: Args,
}

lazy_static! {
    static ref MANAGER: Arc<Manager> = Arc::new(Manager::new());
}

impl Manager {
    fn new() -> Self {
        Self {
            clap_matches: Args::parse(),
        }
    }
}

// Construct our manager, should be done inside main
pub fn init() {
    MANAGER.as_ref();
}

// Check if the verbosity parameter was used
pub fn is_verbose() -> bool {
    MANAGER.clap_matches.verbose
}

pub fn is_tracing() -> bool {
    MANAGER.clap_matches.enable_tracing_level_log_file
}

pub fn is_reset() -> bool {
    MANAGER.clap_matches.reset
}

pub fn is_json() -> bool {
    MANAGER.clap_matches.json
}

pub fn log_path() -> String {
    MANAGER.clap_matches.log_path.clone()
}

pub fn settings_file() -> String {
    MANAGER.clap_matches.settings_file.clone()
}

pub fn targets() -> Vec<String> {
    MANAGER.clap_matches.targets.clone()
}

pub fn probe_interval() -> Option<u64> {
    MANAGER.clap_matches.probe_interval
}

pub fn probe_timeout() -> Option<u64> {
    MANAGER.clap_matches.probe_timeout
}

pub fn simulated_link() -> SimulatedLink {
    MANAGER.clap_matches.simulated_link
}

// Return the command line used to start this application
pub fn command_line_string() -> String {
    std::env::args().collect::<Vec<String>>().join(" ")
}

// Return a clone of current Args struct
pub fn command_line() -> String {
    format!("{:#?}", MANAGER.clap_matches)
}
