use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// One device/location combination a worker is invoked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: String,
    pub device: String,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: Option<String>,
    pub slots: Vec<Slot>,
    /// Feature flags forwarded to every worker invocation.
    #[serde(default)]
    pub flags: Vec<String>,
}

impl Playlist {
    #[must_use]
    pub fn slot_ids(&self) -> Vec<String> {
        self.slots.iter().map(|s| s.id.clone()).collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistsFile {
    pub playlists: Vec<Playlist>,
}

impl PlaylistsFile {
    #[must_use]
    pub fn find(&self, id: &str) -> Option<&Playlist> {
        self.playlists.iter().find(|p| p.id == id)
    }
}

/// Load and validate the playlist configuration from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_playlists(path: &Path) -> Result<PlaylistsFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::PlaylistsFileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_playlists(&content)
}

/// Parse and validate playlist YAML.
///
/// # Errors
///
/// Returns `ConfigError` if the YAML is malformed or fails validation.
pub fn parse_playlists(content: &str) -> Result<PlaylistsFile, ConfigError> {
    let file: PlaylistsFile = serde_yaml::from_str(content)?;
    validate_playlists(&file)?;
    Ok(file)
}

fn validate_playlists(file: &PlaylistsFile) -> Result<(), ConfigError> {
    let mut seen_ids = HashSet::new();

    for playlist in &file.playlists {
        if playlist.id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "playlist id must be non-empty".to_string(),
            ));
        }
        if !seen_ids.insert(playlist.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate playlist id: '{}'",
                playlist.id
            )));
        }
        if playlist.slots.is_empty() {
            return Err(ConfigError::Validation(format!(
                "playlist '{}' must define at least one slot",
                playlist.id
            )));
        }

        let mut seen_slots = HashSet::new();
        for slot in &playlist.slots {
            if slot.id.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "playlist '{}' has a slot with an empty id",
                    playlist.id
                )));
            }
            if !seen_slots.insert(slot.id.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "playlist '{}' has duplicate slot id '{}'",
                    playlist.id, slot.id
                )));
            }
        }
    }

    Ok(())
}
