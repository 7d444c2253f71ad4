use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::{EntityType, Prevalence, Side};

static SETTINGS_FILE_NAME: &str = "settings.json";

pub struct ProjectConfig {
    pub settings: Settings,
    pub project_dirs: ProjectDirs,
}

impl ProjectConfig {
    pub async fn new() -> Result<Self> {
        let proj_dirs = ProjectDirs::from("org", "groupware-sync", "groupware-sync")
            .ok_or_else(|| anyhow!("Failed to resolve project directories"))?;
        for x in [proj_dirs.config_dir(), proj_dirs.cache_dir(), proj_dirs.data_dir()] {
            if !x.exists() {
                fs::create_dir_all(x).context("Failed to create config directory")?;
            }
        }

        let settings = Settings::new(&proj_dirs.config_dir().join(SETTINGS_FILE_NAME)).await?;
        Ok(Self {
            settings,
            project_dirs: proj_dirs,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    pub sync_config: SyncConfig,
    /// Accounts reconciled by the daemon, one pass per account per interval
    #[serde(default)]
    pub accounts: Vec<AccountSettings>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SyncConfig {
    pub sync_interval: Duration,
    /// Consecutive failed passes before an account is reported as disconnected
    #[serde(default = "default_disconnect_after_failures")]
    pub disconnect_after_failures: u32,
}

fn default_disconnect_after_failures() -> u32 {
    3
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(300),
            disconnect_after_failures: default_disconnect_after_failures(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AccountSettings {
    pub user_id: String,
    /// Root of the local store, one subdirectory per entity type
    pub local_root: PathBuf,
    /// Root of the remote store, one subdirectory per entity type
    pub remote_root: PathBuf,
    #[serde(default)]
    pub prevalence: PrevalenceSettings,
    #[serde(default)]
    pub pairings: Vec<PairingSettings>,
}

/// Conflict policy per entity type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq)]
pub struct PrevalenceSettings {
    #[serde(default)]
    pub contacts: Prevalence,
    #[serde(default)]
    pub events: Prevalence,
    #[serde(default)]
    pub tasks: Prevalence,
}

impl PrevalenceSettings {
    pub fn for_type(&self, entity_type: EntityType) -> Prevalence {
        match entity_type {
            EntityType::Contact => self.contacts,
            EntityType::Event => self.events,
            EntityType::Task => self.tasks,
        }
    }
}

/// A user's request to keep one local collection paired with one remote collection
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PairingSettings {
    pub entity_type: EntityType,
    pub local_collection: String,
    pub remote_collection: String,
}

impl Settings {
    /// Load the settings file, writing defaults only when none exists yet.
    /// A file that fails to load is left untouched for the user to fix.
    pub async fn new(config_file_path: &PathBuf) -> Result<Self> {
        if !config_file_path.exists() {
            warn!(
                "No settings at {}, creating default config",
                config_file_path.display()
            );
            let default = Self::default();
            default.save_to_file(config_file_path)?;
            return Ok(default);
        }

        Self::load_settings_from_file(config_file_path)
            .with_context(|| format!("Failed to load settings from {}", config_file_path.display()))
    }

    pub fn load_settings_from_file(config_file_path: &PathBuf) -> Result<Self> {
        if !config_file_path.exists() {
            return Err(anyhow!("Config file not found"));
        }
        let data = fs::read_to_string(config_file_path)?;
        let settings: Self = serde_json::from_str(&data)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.sync_config.sync_interval.is_zero() {
            return Err(anyhow!("sync_interval must be greater than zero"));
        }
        Ok(())
    }

    pub fn save_to_file(&self, config_file_path: &PathBuf) -> Result<()> {
        if let Some(parent_path) = config_file_path.parent().filter(|p| !p.exists()) {
            fs::create_dir_all(parent_path).context("Failed to create config directory")?;
        }

        let data = serde_json::to_string_pretty(self)?;
        fs::write(config_file_path, data)?;
        Ok(())
    }

    pub fn account(&self, user_id: &str) -> Option<&AccountSettings> {
        self.accounts.iter().find(|a| a.user_id == user_id)
    }
}

impl AccountSettings {
    /// Store root for one side and entity type
    pub fn store_root(&self, side: Side, entity_type: EntityType) -> PathBuf {
        let root: &Path = match side {
            Side::Local => &self.local_root,
            Side::Remote => &self.remote_root,
        };
        root.join(entity_type.as_str())
    }
}
