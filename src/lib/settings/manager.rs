use std::{
    io::prelude::*,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::*;

use crate::tracker::config::TrackerConfig;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct HeaderSettingsFile {
    pub name: String,
    pub version: u32,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct SettingsStruct {
    pub header: HeaderSettingsFile,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub targets: Vec<String>,
}

#[derive(Debug)]
struct ManagerStruct {
    pub file_name: PathBuf,
    pub config: SettingsStruct,
}

#[derive(Default)]
struct Manager {
    pub content: Option<ManagerStruct>,
}

lazy_static! {
    static ref MANAGER: Arc<Mutex<Manager>> = Default::default();
}

impl Default for SettingsStruct {
    fn default() -> Self {
        SettingsStruct {
            header: HeaderSettingsFile {
                name: "Device Activity Tracker".to_string(),
                version: 0,
            },
            tracker: TrackerConfig::default(),
            targets: vec![],
        }
    }
}

impl Manager {
    fn new(file_name: &str, reset: bool) -> Result<ManagerStruct> {
        let file_name = resolve_path(file_name)?;
        debug!("Using settings file: {file_name:?}");

        let settings = ManagerStruct {
            config: load_settings_from_file(&file_name, reset),
            file_name,
        };

        if let Err(error) = save_settings_to_file(&settings.file_name, &settings.config) {
            error!("Failed to save file: {error:#}");
        }

        Ok(settings)
    }
}

fn resolve_path(file_name: &str) -> Result<PathBuf> {
    if Path::new(file_name).is_absolute() {
        return Ok(file_name.into());
    }

    let project = ProjectDirs::from("com", "Device Activity Tracker", env!("CARGO_PKG_NAME"))
        .ok_or_else(|| anyhow!("Failed to find user settings path"))?;
    let folder_path = project.config_dir();
    if let Err(error) = std::fs::create_dir_all(folder_path) {
        error!("Failed to create settings folder: {folder_path:?}, reason: {error:#?}");
    }

    Ok(folder_path.join(file_name))
}

// Init settings manager with the desired settings file,
// will be created if does not exist
#[instrument(level = "debug")]
pub fn init(file_name: Option<&str>, reset: bool) -> Result<()> {
    let content = Manager::new(file_name.unwrap_or("settings.json"), reset)?;
    MANAGER
        .lock()
        .map_err(|_| anyhow!("Settings manager poisoned"))?
        .content = Some(content);

    Ok(())
}

fn load_settings_from_file(file_name: &Path, reset: bool) -> SettingsStruct {
    if reset {
        debug!("Settings reset requested");
        return SettingsStruct::default();
    }

    let Ok(content) = std::fs::read_to_string(file_name) else {
        return SettingsStruct::default();
    };

    let settings = serde_json::from_str::<SettingsStruct>(&content).unwrap_or_else(|error| {
        warn!("Failed to parse settings file {file_name:?}, using defaults: {error}");
        SettingsStruct::default()
    });

    // An invalid engine configuration would prevent the tracker from starting
    if let Err(error) = settings.tracker.validate() {
        warn!("Ignoring stored tracker settings: {error}");
        return SettingsStruct {
            tracker: TrackerConfig::default(),
            ..settings
        };
    }

    settings
}

fn save_settings_to_file(file_name: &Path, content: &SettingsStruct) -> Result<()> {
    let mut file = std::fs::File::create(file_name)
        .with_context(|| format!("Failed to create settings file {file_name:?}"))?;
    trace!("content: {content:#?}");
    let value = serde_json::to_string_pretty(content)?;
    file.write_all(value.as_bytes())?;
    Ok(())
}

// Save the latest state of the settings
pub fn save() -> Result<()> {
    let manager = MANAGER
        .lock()
        .map_err(|_| anyhow!("Settings manager poisoned"))?;
    let content = manager
        .content
        .as_ref()
        .ok_or_else(|| anyhow!("Settings manager was not initialized"))?;

    save_settings_to_file(&content.file_name, &content.config)
}

fn with_settings<T>(f: impl FnOnce(&mut SettingsStruct) -> T) -> Result<T> {
    let mut manager = MANAGER
        .lock()
        .map_err(|_| anyhow!("Settings manager poisoned"))?;
    let content = manager
        .content
        .as_mut()
        .ok_or_else(|| anyhow!("Settings manager was not initialized"))?;

    Ok(f(&mut content.config))
}

pub fn header() -> Result<HeaderSettingsFile> {
    with_settings(|settings| settings.header.clone())
}

pub fn tracker_config() -> Result<TrackerConfig> {
    with_settings(|settings| settings.tracker.clone())
}

pub fn set_tracker_config(config: TrackerConfig) -> Result<()> {
    config.validate()?;
    with_settings(|settings| settings.tracker = config)?;
    save()
}

pub fn targets() -> Result<Vec<String>> {
    with_settings(|settings| settings.targets.clone())
}

pub fn set_targets(targets: &[String]) -> Result<()> {
    with_settings(|settings| settings.targets = targets.to_vec())?;
    save()
}

/// Targets for this run: the overrides when given, the stored ones otherwise.
/// Overrides are never written back.
pub fn effective_targets(overrides: &[String]) -> Result<Vec<String>> {
    if !overrides.is_empty() {
        return Ok(overrides.to_vec());
    }
    targets()
}
