//! In-memory playlist collaborator.
//!
//! Just enough playlist handling to feed the player: a "current" playlist
//! that always exists, plus whatever playlists admins create or import.

use std::collections::BTreeMap;

use encore_core::error::{Error, Result};
use encore_ipc::commands::PlaylistSummary;

const CURRENT_NAME: &str = "Current";

#[derive(Debug)]
pub struct Playlists {
    next_plaid: u32,
    current: u32,
    playlists: BTreeMap<u32, PlaylistSummary>,
    /// Songs added per playlist and requester
    requested: BTreeMap<(u32, String), u32>,
}

impl Default for Playlists {
    fn default() -> Self {
        Self::new()
    }
}

impl Playlists {
    pub fn new() -> Self {
        let mut playlists = Self {
            next_plaid: 1,
            current: 1,
            playlists: BTreeMap::new(),
            requested: BTreeMap::new(),
        };
        playlists.current = playlists.create(CURRENT_NAME).plaid;
        playlists
    }

    pub fn list(&self) -> Vec<PlaylistSummary> {
        self.playlists.values().cloned().collect()
    }

    pub fn contains(&self, plaid: u32) -> bool {
        self.playlists.contains_key(&plaid)
    }

    pub fn current_plaid(&self) -> u32 {
        self.current
    }

    /// Karaoke ids of the playlist the player reads from.
    pub fn current_karas(&self) -> &[String] {
        self.playlists.get(&self.current).map(|p| p.karas.as_slice()).unwrap_or_default()
    }

    pub fn create(&mut self, name: &str) -> PlaylistSummary {
        self.import(name, Vec::new())
    }

    pub fn import(&mut self, name: &str, karas: Vec<String>) -> PlaylistSummary {
        let plaid = self.next_plaid;
        self.next_plaid += 1;
        let playlist = PlaylistSummary { plaid, name: name.to_string(), karas };
        self.playlists.insert(plaid, playlist.clone());
        playlist
    }

    /// Number of songs `requester` has added to a playlist.
    pub fn requested_by(&self, plaid: u32, requester: &str) -> u32 {
        self.requested.get(&(plaid, requester.to_string())).copied().unwrap_or(0)
    }

    /// Append a song to a playlist on behalf of `requester`.
    ///
    /// # Errors
    /// Returns [`Error::PlaylistNotFound`] for an unknown playlist.
    pub fn add(&mut self, plaid: u32, kid: String, requester: &str) -> Result<()> {
        let playlist = self.playlists.get_mut(&plaid).ok_or(Error::PlaylistNotFound(plaid))?;
        playlist.karas.push(kid);
        *self.requested.entry((plaid, requester.to_string())).or_default() += 1;
        Ok(())
    }

    /// Delete a playlist.
    ///
    /// # Errors
    /// Returns [`Error::PlaylistNotFound`] for an unknown playlist.
    pub fn delete(&mut self, plaid: u32) -> Result<()> {
        self.playlists.remove(&plaid).ok_or(Error::PlaylistNotFound(plaid))?;
        self.requested.retain(|(owner, _), _| *owner != plaid);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_playlist_exists() {
        let playlists = Playlists::new();
        assert_eq!(playlists.list().len(), 1);
        assert!(playlists.contains(playlists.current_plaid()));
        assert!(playlists.current_karas().is_empty());
    }

    #[test]
    fn test_add_to_current() {
        let mut playlists = Playlists::new();
        playlists.add(playlists.current_plaid(), "kara-1".into(), "Alice").unwrap();
        assert_eq!(playlists.current_karas(), ["kara-1".to_string()]);
    }

    #[test]
    fn test_requests_are_counted_per_playlist() {
        let mut playlists = Playlists::new();
        let current = playlists.current_plaid();
        let other = playlists.create("Later").plaid;
        playlists.add(current, "a".into(), "Alice").unwrap();
        playlists.add(current, "b".into(), "Alice").unwrap();
        playlists.add(other, "c".into(), "Alice").unwrap();
        playlists.add(current, "d".into(), "Bob").unwrap();

        assert_eq!(playlists.requested_by(current, "Alice"), 2);
        assert_eq!(playlists.requested_by(current, "Bob"), 1);
        assert_eq!(playlists.requested_by(other, "Alice"), 1);

        playlists.delete(other).unwrap();
        assert_eq!(playlists.requested_by(other, "Alice"), 0);
    }

    #[test]
    fn test_unknown_playlist() {
        let mut playlists = Playlists::new();
        assert!(matches!(playlists.add(42, "kara".into(), "Alice"), Err(Error::PlaylistNotFound(42))));
        assert!(playlists.delete(42).is_err());
    }

    #[test]
    fn test_import_assigns_new_id() {
        let mut playlists = Playlists::new();
        let imported = playlists.import("Anime night", vec!["a".into(), "b".into()]);
        assert_ne!(imported.plaid, playlists.current_plaid());
        assert_eq!(playlists.list().len(), 2);
    }
}
