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
use std::path::PathBuf;

/// Typed errors for soundboard operations so callers can distinguish a
/// missing track from a dangling scene reference without string matching.
/// None of these are fatal: the worst outcome anywhere is that playback
/// stops and the session returns to idle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The track file backing a scene is missing or unreadable.
    #[error("track unavailable: {}", .0.display())]
    TrackUnavailable(PathBuf),

    /// A trigger referenced a mapping record or scene that no longer exists.
    #[error("scene '{scene}' not found in mapping '{mapping}'")]
    SceneNotFound { mapping: String, scene: String },

    /// The audio or pad device failed.
    #[error("device error: {0}")]
    Device(String),

    /// A mapping record or binding table could not be read or written.
    #[error("persistence error for {}: {reason}", .path.display())]
    Persistence { path: PathBuf, reason: String },
}
