//! Server settings and typed partial updates.
//!
//! Settings are updated with a [`SettingsPatch`], which mirrors the schema
//! with every leaf optional. Present leaves are set; lists are replaced as a
//! whole, never appended to.

use serde::{Deserialize, Serialize};

use crate::control::validate_volume;
use crate::error::{Error, Result};
use crate::player::MediaType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub karaoke: KaraokeSettings,
    pub player: PlayerSettings,
    pub playlist: PlaylistSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct KaraokeSettings {
    /// Songs only start when the requester presses play; stop always interrupts
    pub classic_mode: bool,
    /// Allow quizzes to be started
    pub quiz_mode: bool,
    /// Start over from the first song once the playlist ends
    pub repeat_playlist: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerSettings {
    /// Backend volume applied at startup
    pub volume: f64,
    pub pitch_and_speed_enabled: bool,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self { volume: 100.0, pitch_and_speed_enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlaylistSettings {
    /// Bundled media played between songs, in order
    pub intermission_media: Vec<MediaType>,
    /// Songs a non-admin may add to one playlist
    pub max_songs_per_user: u32,
}

impl Default for PlaylistSettings {
    fn default() -> Self {
        Self { intermission_media: vec![MediaType::Jingles, MediaType::Sponsors], max_songs_per_user: 5 }
    }
}

/// Deep-partial update of [`Settings`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub karaoke: Option<KaraokePatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player: Option<PlayerPatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playlist: Option<PlaylistPatch>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct KaraokePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classic_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiz_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeat_playlist: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct PlayerPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch_and_speed_enabled: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct PlaylistPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intermission_media: Option<Vec<MediaType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_songs_per_user: Option<u32>,
}

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

impl SettingsPatch {
    /// Check the patch without applying it.
    ///
    /// # Errors
    /// Returns [`Error::InvalidSetting`] for the first invalid leaf.
    pub fn validate(&self) -> Result<()> {
        if let Some(volume) = self.player.as_ref().and_then(|p| p.volume) {
            validate_volume(volume).map_err(|e| Error::InvalidSetting {
                key: "player.volume",
                reason: e.to_string(),
            })?;
        }
        if self.playlist.as_ref().and_then(|p| p.max_songs_per_user) == Some(0) {
            return Err(Error::InvalidSetting {
                key: "playlist.maxSongsPerUser",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

impl Settings {
    /// Apply a patch in place.
    pub fn apply(&mut self, patch: SettingsPatch) {
        if let Some(karaoke) = patch.karaoke {
            set(&mut self.karaoke.classic_mode, karaoke.classic_mode);
            set(&mut self.karaoke.quiz_mode, karaoke.quiz_mode);
            set(&mut self.karaoke.repeat_playlist, karaoke.repeat_playlist);
        }
        if let Some(player) = patch.player {
            set(&mut self.player.volume, player.volume);
            set(&mut self.player.pitch_and_speed_enabled, player.pitch_and_speed_enabled);
        }
        if let Some(playlist) = patch.playlist {
            set(&mut self.playlist.intermission_media, playlist.intermission_media);
            set(&mut self.playlist.max_songs_per_user, playlist.max_songs_per_user);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn test_patch_sets_only_present_leaves() {
        let mut settings = Settings::default();
        settings.karaoke.repeat_playlist = true;

        let patch: SettingsPatch =
            serde_json::from_value(json!({"karaoke": {"classicMode": true}})).unwrap();
        settings.apply(patch);

        assert!(settings.karaoke.classic_mode);
        assert!(settings.karaoke.repeat_playlist);
        assert_eq!(settings.player, PlayerSettings::default());
    }

    #[test]
    fn test_patch_replaces_lists() {
        let mut settings = Settings::default();
        let patch: SettingsPatch =
            serde_json::from_value(json!({"playlist": {"intermissionMedia": ["encores"]}})).unwrap();
        settings.apply(patch);
        assert_eq!(settings.playlist.intermission_media, vec![MediaType::Encores]);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let result = serde_json::from_value::<SettingsPatch>(json!({"karaoke": {"clasicMode": true}}));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let volume: SettingsPatch = serde_json::from_value(json!({"player": {"volume": 140}})).unwrap();
        assert_matches!(volume.validate(), Err(Error::InvalidSetting { key: "player.volume", .. }));

        let songs: SettingsPatch =
            serde_json::from_value(json!({"playlist": {"maxSongsPerUser": 0}})).unwrap();
        assert_matches!(songs.validate(), Err(Error::InvalidSetting { .. }));
    }

    #[test]
    fn test_empty_patch() {
        assert!(SettingsPatch::default().is_empty());
        assert_eq!(serde_json::to_value(SettingsPatch::default()).unwrap(), json!({}));
    }
}
