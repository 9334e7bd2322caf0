use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::*;

use device_activity_tracker::{
    cli, logger, settings,
    tracker::{
        self,
        config::TrackerConfig,
        types::{ClassificationUpdate, TargetId},
    },
    transport::simulated::{DeviceProfile, SimulatedTransport},
};

const DEFAULT_TARGET: &str = "simulated-device";

#[tokio::main]
async fn main() -> Result<()> {
    // CLI should be started before logger to allow control over verbosity
    cli::manager::init();
    // Logger should start before everybody else to register any log information
    logger::manager::init();
    // Settings should start before everybody else to ensure that the settings are available
    settings::manager::init(Some(&cli::manager::settings_file()), cli::manager::is_reset())?;

    let config = tracker_config()?;
    debug!("Tracker configuration: {config:#?}");
    tracker::manager::init(config)?;

    let (transport, mut acks) =
        SimulatedTransport::new(DeviceProfile::for_link(cli::manager::simulated_link()));
    let transport = Arc::new(transport);

    tokio::spawn(async move {
        while let Some(event) = acks.recv().await {
            tracker::manager::handle_ack(event);
        }
        debug!("Acknowledgement stream ended");
    });

    let printer = tokio::spawn(print_updates(tracker::manager::subscribe()?));

    for target in targets()? {
        if let Err(error) = tracker::manager::start_tracking(target.clone(), transport.clone()) {
            error!("Failed to track {target}: {error:#}");
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    tracker::manager::stop_all().await?;
    printer.abort();

    Ok(())
}

fn tracker_config() -> Result<TrackerConfig> {
    let mut config = settings::manager::tracker_config()?;

    if let Some(interval) = cli::manager::probe_interval() {
        config.probe_interval_ms = interval;
    }
    if let Some(timeout) = cli::manager::probe_timeout() {
        config.probe_timeout_ms = timeout;
    }
    config.validate()?;

    Ok(config)
}

fn targets() -> Result<Vec<TargetId>> {
    let mut targets = settings::manager::effective_targets(&cli::manager::targets())?;

    if targets.is_empty() {
        info!("No target configured, tracking {DEFAULT_TARGET}");
        targets.push(DEFAULT_TARGET.to_string());
    }

    Ok(targets.into_iter().map(TargetId::new).collect())
}

async fn print_updates(mut updates: broadcast::Receiver<ClassificationUpdate>) {
    loop {
        match updates.recv().await {
            Ok(update) => {
                if cli::manager::is_json() {
                    match serde_json::to_string(&update) {
                        Ok(line) => println!("{line}"),
                        Err(error) => warn!("Failed to serialize update: {error}"),
                    }
                    continue;
                }

                let classification = &update.classification;
                info!(
                    "{}: {} on {} (median {}, jitter {}, confidence {}, timeouts {})",
                    update.target,
                    classification.activity,
                    classification.network,
                    format_ms(classification.median_ms),
                    format_ms(classification.jitter_ms),
                    classification.confidence,
                    classification.consecutive_timeouts,
                );
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Update printer lagged behind, {skipped} update(s) skipped");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn format_ms(value: Option<f64>) -> String {
    value
        .map(|value| format!("{value:.0} ms"))
        .unwrap_or_else(|| "n/a".to_string())
}
