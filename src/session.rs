// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::sync::Arc;

use parking_lot::RwLock;

/// A point-in-time view of what the soundboard is doing. At most one scene is
/// current at any time; the whole field set is replaced on each play and
/// cleared on stop.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    /// The track file the current scene belongs to.
    pub track: Option<String>,
    /// The name of the current scene.
    pub scene: Option<String>,
    /// The start offset of the current scene in seconds.
    pub start: f64,
    /// The loop duration of the current scene in seconds.
    pub duration: f64,
    /// Seconds of playback accrued by the clock. Not reset by loop re-seeks,
    /// so it can exceed the scene duration.
    pub elapsed: u64,
    /// Whether a scene is current. Remains true while paused.
    pub is_playing: bool,
    /// Whether playback is paused.
    pub is_paused: bool,
    /// The last status line published by the clock.
    pub status: String,
}

/// The shared session record. The engine replaces the field set, the clock
/// advances the elapsed counter, everyone else reads snapshots.
#[derive(Clone, Default)]
pub struct Session {
    state: Arc<RwLock<Snapshot>>,
}

impl Session {
    /// Creates a new idle session.
    pub fn new() -> Session {
        Session::default()
    }

    /// Returns a copy of the current state.
    pub fn snapshot(&self) -> Snapshot {
        self.state.read().clone()
    }

    /// Makes the given scene current. Replaces the entire field set.
    pub fn begin(&self, track: &str, scene: &str, start: f64, duration: f64) {
        let mut state = self.state.write();
        *state = Snapshot {
            track: Some(track.to_string()),
            scene: Some(scene.to_string()),
            start,
            duration,
            elapsed: 0,
            is_playing: true,
            is_paused: false,
            status: String::new(),
        };
    }

    /// Sets the paused flag. The scene stays current.
    pub fn set_paused(&self, paused: bool) {
        self.state.write().is_paused = paused;
    }

    /// Returns the session to idle.
    pub fn reset(&self) {
        *self.state.write() = Snapshot::default();
    }

    /// Returns true if the given scene is the current one and a scene is
    /// current (playing or paused).
    pub fn is_current(&self, track: &str, scene: &str) -> bool {
        let state = self.state.read();
        state.is_playing
            && state.track.as_deref() == Some(track)
            && state.scene.as_deref() == Some(scene)
    }

    /// Advances the elapsed counter by one second and republishes the status
    /// line. Returns the new status line, or None if nothing is playing or
    /// playback is paused.
    pub fn tick(&self) -> Option<String> {
        let mut state = self.state.write();
        if !state.is_playing || state.is_paused {
            return None;
        }

        state.elapsed += 1;
        let scene = state.scene.as_deref().unwrap_or_default().to_string();
        let status = format!(
            "Scene \"{}\" — elapsed {}s / {}s",
            scene, state.elapsed, state.duration as u64
        );
        state.status = status.clone();
        Some(status)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_begin_replaces_field_set() {
        let session = Session::new();
        session.begin("ambient.mp3", "Tavern", 60.0, 30.0);
        session.set_paused(true);
        session.tick();

        session.begin("forest.mp3", "Forest", 120.0, 45.0);
        let state = session.snapshot();
        assert_eq!(state.track.as_deref(), Some("forest.mp3"));
        assert_eq!(state.scene.as_deref(), Some("Forest"));
        assert_eq!(state.elapsed, 0);
        assert!(state.is_playing);
        assert!(!state.is_paused);
    }

    #[test]
    fn test_tick_formats_status() {
        let session = Session::new();
        session.begin("ambient.mp3", "Tavern", 60.0, 30.0);

        assert_eq!(
            session.tick().as_deref(),
            Some("Scene \"Tavern\" — elapsed 1s / 30s")
        );
        assert_eq!(
            session.tick().as_deref(),
            Some("Scene \"Tavern\" — elapsed 2s / 30s")
        );
        assert_eq!(session.snapshot().elapsed, 2);
    }

    #[test]
    fn test_tick_does_not_accrue_while_paused_or_idle() {
        let session = Session::new();
        assert!(session.tick().is_none());

        session.begin("ambient.mp3", "Tavern", 60.0, 30.0);
        session.tick();
        session.set_paused(true);
        assert!(session.tick().is_none());
        assert_eq!(session.snapshot().elapsed, 1);

        // Elapsed continues from its prior value on resume.
        session.set_paused(false);
        assert_eq!(
            session.tick().as_deref(),
            Some("Scene \"Tavern\" — elapsed 2s / 30s")
        );
    }

    #[test]
    fn test_is_current_tracks_identity() {
        let session = Session::new();
        assert!(!session.is_current("ambient.mp3", "Tavern"));

        session.begin("ambient.mp3", "Tavern", 60.0, 30.0);
        assert!(session.is_current("ambient.mp3", "Tavern"));
        assert!(!session.is_current("ambient.mp3", "Forest"));
        assert!(!session.is_current("forest.mp3", "Tavern"));

        // A paused scene is still the current one.
        session.set_paused(true);
        assert!(session.is_current("ambient.mp3", "Tavern"));

        session.reset();
        assert!(!session.is_current("ambient.mp3", "Tavern"));
    }
}
